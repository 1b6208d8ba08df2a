//! Active subscription tracking.
//!
//! Records live independently of the connection: on every transition into
//! ready, the client re-derives a fresh transport-level subscription for
//! each surviving record under its original id, so handles returned to
//! callers stay valid across reconnects.

use std::sync::Arc;

use restomp_api::{Headers, Message, SubscriptionId};

/// Handler invoked for every inbound message on a subscribed destination.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

// ── SubscriptionRecord ───────────────────────────────────────────────

/// One caller-visible subscription.
pub(crate) struct SubscriptionRecord {
    pub id: SubscriptionId,
    pub destination: String,
    pub headers: Headers,
    pub handler: MessageHandler,
}

impl std::fmt::Debug for SubscriptionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

// ── SubscriptionRegistry ─────────────────────────────────────────────

/// All active subscriptions, in creation order.
///
/// Creation order is the resubscription order after a reconnect. Accessed
/// exclusively from the client event loop, so a plain `Vec` suffices.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    records: Vec<SubscriptionRecord>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, record: SubscriptionRecord) {
        self.records.push(record);
    }

    /// Remove a record by id, returning it if it was present.
    pub(crate) fn remove(&mut self, id: &SubscriptionId) -> Option<SubscriptionRecord> {
        let pos = self.records.iter().position(|r| r.id == *id)?;
        Some(self.records.remove(pos))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &SubscriptionRecord> {
        self.records.iter()
    }

    /// Snapshot the handlers registered for a destination.
    ///
    /// A snapshot (rather than borrowed iteration) lets handlers
    /// reentrantly subscribe or unsubscribe during dispatch.
    pub(crate) fn handlers_for(&self, destination: &str) -> Vec<MessageHandler> {
        self.records
            .iter()
            .filter(|r| r.destination == destination)
            .map(|r| Arc::clone(&r.handler))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn record(destination: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            id: SubscriptionId::new(),
            destination: destination.to_owned(),
            headers: Headers::new(),
            handler: Arc::new(|_| {}),
        }
    }

    #[test]
    fn remove_is_by_id_and_returns_the_record() {
        let mut registry = SubscriptionRegistry::new();
        let a = record("alpha");
        let a_id = a.id;
        registry.insert(a);
        registry.insert(record("beta"));

        let removed = registry.remove(&a_id).expect("record present");
        assert_eq!(removed.destination, "alpha");
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&a_id).is_none());
    }

    #[test]
    fn iteration_preserves_creation_order() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert(record("one"));
        registry.insert(record("two"));
        registry.insert(record("three"));

        let order: Vec<_> = registry.iter().map(|r| r.destination.as_str()).collect();
        assert_eq!(order, vec!["one", "two", "three"]);
    }

    #[test]
    fn handlers_for_filters_by_destination() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert(record("items"));
        registry.insert(record("items"));
        registry.insert(record("users"));

        assert_eq!(registry.handlers_for("items").len(), 2);
        assert_eq!(registry.handlers_for("users").len(), 1);
        assert!(registry.handlers_for("absent").is_empty());
    }
}
