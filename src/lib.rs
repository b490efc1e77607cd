//! mic-uplink: WebRTC microphone uplink client.
//!
//! Streams a local microphone track to a remote media endpoint over a
//! webrtc-rs peer connection negotiated on a WebSocket signaling channel.
//!
//! ## Features
//!
//! - **Session state machine**: permission, signaling, negotiation and
//!   teardown driven from one event queue
//! - **Two variants**: send-only uplink to a media server, or a two-way
//!   call routed by client id
//! - **STUN + TURN**: credentials fetched over HTTPS with a STUN fallback,
//!   server-pushed overrides
//! - **Reconnect policy**: off by default, fixed or exponential backoff

pub mod client_id;
pub mod config;
pub mod error;
pub mod ice;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use client_id::ClientId;
pub use config::{SessionConfig, SessionVariant};
pub use error::{Result, SessionError};
pub use session::{Intent, SessionController, SessionDeps, SessionSnapshot, SessionState};
