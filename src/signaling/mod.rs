//! Signaling for the uplink session.
//!
//! - [`ws_transport`]: the WebSocket link itself
//! - [`channel`]: connection ownership, events and reconnect policy
//! - [`message`]: the JSON wire messages
//! - [`router`]: dispatch of inbound messages by kind

pub mod channel;
pub mod message;
pub mod router;
pub mod ws_transport;

pub use channel::*;
pub use message::*;
pub use router::*;
pub use ws_transport::*;
