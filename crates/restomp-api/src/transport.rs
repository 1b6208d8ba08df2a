//! The transport seam.
//!
//! The client core drives a [`Transport`] — an already-framed STOMP-style
//! session owned by the embedding application — through four primitives:
//! `connect`, `subscribe`, `unsubscribe`, and `send`. Everything flowing the
//! other way (authentication success, inbound messages, errors, connection
//! loss) arrives asynchronously as [`TransportEvent`]s on an unbounded
//! channel created with [`event_channel`].
//!
//! The core never parses wire framing itself; implementing the framing is
//! the transport's job.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use crate::error::Error;
use crate::message::{Headers, Message};

// ── Credentials ──────────────────────────────────────────────────────

/// Login credentials handed to the transport on connect.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub login: Option<String>,
    pub password: Option<SecretString>,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            password: Some(SecretString::from(password.into())),
        }
    }
}

// ── SubscriptionId ───────────────────────────────────────────────────

/// Process-unique identifier for a subscription.
///
/// Minted by the client core when a subscription is created and preserved
/// across reconnects, so transport-level subscriptions re-derived after a
/// connection loss keep the same external identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── TransportEvent ───────────────────────────────────────────────────

/// Notifications flowing from the transport to the client core.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection is open and authenticated.
    Connected,

    /// An inbound message arrived on a subscribed destination.
    Message(Message),

    /// A non-fatal transport error, with whatever diagnostic the
    /// transport supplies.
    ConnectionError(String),

    /// The connection dropped. The core decides whether to reconnect.
    ConnectionLost(String),
}

/// Receiving half of the transport event channel.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Create the event channel pair for a transport.
///
/// The transport keeps the sender and pushes events into it; the receiver
/// is handed to the client core alongside the transport itself.
pub fn event_channel() -> (mpsc::UnboundedSender<TransportEvent>, TransportEvents) {
    mpsc::unbounded_channel()
}

// ── Transport ────────────────────────────────────────────────────────

/// A message-oriented transport over a persistent duplex connection.
///
/// All methods are fire-and-forget from the core's point of view: a
/// returned `Ok` means the transport accepted the operation, not that the
/// peer acknowledged it. Outcomes that matter to the core come back as
/// [`TransportEvent`]s.
pub trait Transport: Send {
    /// Open (or reopen) the underlying connection and authenticate.
    ///
    /// Success of the handshake is reported asynchronously via
    /// [`TransportEvent::Connected`].
    fn connect(&mut self, target: &Url, credentials: &Credentials) -> Result<(), Error>;

    /// Establish a subscription on `destination` under the given id.
    fn subscribe(
        &mut self,
        id: &SubscriptionId,
        destination: &str,
        headers: &Headers,
    ) -> Result<(), Error>;

    /// Tear down the subscription with the given id.
    fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), Error>;

    /// Send a message to `destination`.
    fn send(
        &mut self,
        destination: &str,
        headers: &Headers,
        body: Option<&str>,
    ) -> Result<(), Error>;
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_ids_are_unique() {
        let a = SubscriptionId::new();
        let b = SubscriptionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn subscription_id_display_round_trips() {
        let id = SubscriptionId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }

    #[test]
    fn credentials_redact_password_in_debug() {
        let creds = Credentials::new("admin", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
