// restomp-core: REST-like request routing and model synchronization
// over a STOMP-style transport.

pub mod client;
pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod routes;
mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{Client, ConnectionState, SubscriptionHandle};
pub use config::ClientConfig;
pub use error::CoreError;
pub use queue::PendingRequest;
pub use routes::{ParamKey, PathParams, PathPattern, RouteTable};

// Re-export the transport seam so embedders need only one crate.
pub use restomp_api::{
    event_channel, Credentials, Error as TransportError, Headers, Message, Method,
    SubscriptionId, Transport, TransportEvent, TransportEvents, METHOD_HEADER,
};
