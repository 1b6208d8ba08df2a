// ── Core error types ──
//
// User-facing errors from restomp-core. Configuration violations are
// raised synchronously at the offending call and never retried; transport
// failures are surfaced through the user-supplied hooks instead, so they
// only appear here when a call races client teardown.

use restomp_api::Method;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Malformed route template {template:?}: {reason}")]
    MalformedTemplate { template: String, reason: String },

    #[error("Requests require a destination")]
    MissingDestination,

    #[error("{method} requests require a body")]
    MissingBody { method: Method },

    // ── Lifecycle errors ─────────────────────────────────────────────
    /// The client context has been torn down; the handle is dead.
    #[error("Client closed")]
    Closed,

    // ── Transport errors (wrapped, not exposed raw) ──────────────────
    #[error("Transport error: {0}")]
    Transport(#[from] restomp_api::Error),
}
