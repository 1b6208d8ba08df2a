use thiserror::Error;

/// Top-level error type for the `restomp-api` crate.
///
/// Covers every failure mode at the transport seam: connection
/// establishment, subscription management, and outbound sends.
/// `restomp-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Capability ──────────────────────────────────────────────────
    /// The transport does not support a required primitive.
    #[error("Transport capability missing: {0}")]
    Unsupported(&'static str),

    // ── Connection ──────────────────────────────────────────────────
    /// Opening the underlying connection failed.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The connection dropped after having been established.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// URL parsing error for the connection target.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Messaging ───────────────────────────────────────────────────
    /// The transport rejected a subscribe request.
    #[error("Subscribe failed for {destination}: {reason}")]
    Subscribe {
        destination: String,
        reason: String,
    },

    /// The transport rejected an unsubscribe request.
    #[error("Unsubscribe failed: {0}")]
    Unsubscribe(String),

    /// The transport rejected an outbound send.
    #[error("Send failed: {0}")]
    Send(String),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::ConnectionLost(_) | Self::Send(_)
        )
    }
}
