// restomp-api: Transport seam and message types for the restomp messaging layer.

pub mod error;
pub mod message;
pub mod transport;

pub use error::Error;
pub use message::{Headers, Message, Method, METHOD_HEADER};
pub use transport::{
    event_channel, Credentials, SubscriptionId, Transport, TransportEvent, TransportEvents,
};
