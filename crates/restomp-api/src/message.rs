//! Wire-level message types shared by transports and the client core.
//!
//! A [`Message`] is the unit of exchange in both directions: a destination
//! address, a flat header map, and an optional raw body. The core never
//! parses transport framing — transports hand it fully framed messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Header name carrying the CRUD method of a message.
pub const METHOD_HEADER: &str = "method";

/// Flat string-to-string header map, caller-suppliable, unique keys.
pub type Headers = HashMap<String, String>;

// ── Method ───────────────────────────────────────────────────────────

/// CRUD method of a request or inbound message.
///
/// Parsed case-insensitively from the `method` header; renders lowercase
/// on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Create,
    Read,
    Update,
    Replace,
    Delete,
}

impl Method {
    /// Mutating methods must carry a body.
    pub fn requires_body(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Replace)
    }
}

// ── Message ──────────────────────────────────────────────────────────

/// A message as seen at the transport seam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// `/`-delimited destination address. Doubles as subscription topic
    /// and as a path into the client's model tree.
    pub destination: String,

    /// Message headers. The `method` header, when present, selects CRUD
    /// semantics for model reconciliation.
    #[serde(default)]
    pub headers: Headers,

    /// Raw body, if any. Interpretation is up to the receiver.
    #[serde(default)]
    pub body: Option<String>,
}

impl Message {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Set the `method` header.
    pub fn with_method(mut self, method: Method) -> Self {
        self.headers
            .insert(METHOD_HEADER.to_owned(), method.to_string());
        self
    }

    /// Set the body from a JSON value.
    pub fn with_body(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// The CRUD method declared in the headers, if present and recognized.
    ///
    /// An unrecognized method string reads as absent — inbound messages
    /// are unreliable by nature of the transport.
    pub fn method(&self) -> Option<Method> {
        self.headers
            .get(METHOD_HEADER)
            .and_then(|m| m.parse().ok())
    }

    /// Parse the body as a JSON object or array.
    ///
    /// Returns `None` for an absent, empty, unparsable, or scalar body —
    /// malformed bodies degrade to "no data", never an error.
    pub fn parsed_body(&self) -> Option<serde_json::Value> {
        let raw = self.body.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) if value.is_object() || value.is_array() => Some(value),
            _ => None,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("REPLACE".parse::<Method>().ok(), Some(Method::Replace));
        assert_eq!("Create".parse::<Method>().ok(), Some(Method::Create));
        assert_eq!("delete".parse::<Method>().ok(), Some(Method::Delete));
        assert!("destroy".parse::<Method>().is_err());
    }

    #[test]
    fn method_renders_lowercase() {
        assert_eq!(Method::Update.to_string(), "update");
    }

    #[test]
    fn mutating_methods_require_body() {
        assert!(Method::Create.requires_body());
        assert!(Method::Update.requires_body());
        assert!(Method::Replace.requires_body());
        assert!(!Method::Read.requires_body());
        assert!(!Method::Delete.requires_body());
    }

    #[test]
    fn message_method_from_header() {
        let msg = Message::new("items/0").with_method(Method::Replace);
        assert_eq!(msg.method(), Some(Method::Replace));

        let mut msg = Message::new("items/0");
        msg.headers.insert(METHOD_HEADER.into(), "bogus".into());
        assert_eq!(msg.method(), None);
    }

    #[test]
    fn parsed_body_accepts_objects_and_arrays() {
        let msg = Message::new("items").with_body(&json!({"id": 1}));
        assert_eq!(msg.parsed_body(), Some(json!({"id": 1})));

        let msg = Message::new("items").with_body(&json!([1, 2]));
        assert_eq!(msg.parsed_body(), Some(json!([1, 2])));
    }

    #[test]
    fn parsed_body_rejects_scalars_and_garbage() {
        let mut msg = Message::new("items");
        msg.body = Some("42".into());
        assert_eq!(msg.parsed_body(), None);

        msg.body = Some("not json".into());
        assert_eq!(msg.parsed_body(), None);

        msg.body = Some("   ".into());
        assert_eq!(msg.parsed_body(), None);

        msg.body = None;
        assert_eq!(msg.parsed_body(), None);
    }
}
