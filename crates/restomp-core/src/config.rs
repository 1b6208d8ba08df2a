// ── Runtime client configuration ──
//
// Describes *how* the client should behave: connection target,
// credentials, the initial model tree, reconnect policy, routes, and the
// user-supplied lifecycle hooks. The embedding application constructs a
// `ClientConfig` and hands it to `Client::start` — the core never reads
// config files.

use std::time::Duration;

use restomp_api::Credentials;
use url::Url;

use crate::queue::PendingRequest;
use crate::routes::RouteTable;

/// Hook invoked when the connection becomes ready.
pub type ConnectHook = Box<dyn Fn() + Send>;

/// Hook invoked with whatever diagnostic the transport supplies.
pub type DiagnosticHook = Box<dyn Fn(&str) + Send>;

/// Hook invoked when a request is queued because the connection is not
/// ready yet (e.g. to show pending UI).
pub type PendingHook = Box<dyn Fn(&PendingRequest) + Send>;

/// Configuration for a single client instance.
pub struct ClientConfig {
    /// Connection target handed to the transport on every (re)connect.
    pub path: Url,

    /// Credentials handed to the transport on every (re)connect.
    pub credentials: Credentials,

    /// Initial model tree. Mutated in place by inbound CRUD messages;
    /// observed through [`Client::model`](crate::Client::model) snapshots.
    pub model: serde_json::Value,

    /// Reconnect automatically on connection loss. Default: true.
    pub auto_reconnect: bool,

    /// Cooldown window collapsing rapid reconnect attempts. Default: 2s.
    pub reconnect_cooldown: Duration,

    /// Caller-defined resource routes.
    pub routes: RouteTable,

    /// Invoked on every transition into ready.
    pub on_connect: Option<ConnectHook>,

    /// Invoked on transport-reported connection errors.
    pub on_connection_error: Option<DiagnosticHook>,

    /// Invoked on connection loss, before any auto-reconnect.
    pub on_close: Option<DiagnosticHook>,

    /// Invoked when an outbound request is queued rather than sent.
    pub on_pending: Option<PendingHook>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            path: "ws://localhost:8080".parse().expect("static URL is valid"),
            credentials: Credentials::default(),
            model: serde_json::Value::Object(serde_json::Map::new()),
            auto_reconnect: true,
            reconnect_cooldown: Duration::from_millis(2000),
            routes: RouteTable::new(),
            on_connect: None,
            on_connection_error: None,
            on_close: None,
            on_pending: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("path", &self.path.as_str())
            .field("credentials", &self.credentials)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("reconnect_cooldown", &self.reconnect_cooldown)
            .field("routes", &self.routes)
            .field("on_connect", &self.on_connect.is_some())
            .field("on_connection_error", &self.on_connection_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_pending", &self.on_pending.is_some())
            .finish_non_exhaustive()
    }
}
