//! Session states and the read-only projection handed to the UI.

use std::fmt;

use crate::client_id::ClientId;

/// Session state machine states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    PermissionPending,
    SignalingConnecting,
    Ready,
    Negotiating,
    Streaming,
    Stopping,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::PermissionPending => "permission-pending",
            SessionState::SignalingConnecting => "signaling-connecting",
            SessionState::Ready => "ready",
            SessionState::Negotiating => "negotiating",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
            SessionState::Error => "error",
        }
    }

    /// A peer connection attempt owns (or is building) resources
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Negotiating | SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the UI collaborator observes. Only the controller writes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Human readable status line
    pub status: String,
    /// Signaling channel open
    pub connected: bool,
    /// Audio is flowing (or about to)
    pub streaming: bool,
    /// Append-only log of server messages
    pub server_messages: Vec<String>,
    pub client_id: ClientId,
}

impl SessionSnapshot {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            state: SessionState::Idle,
            status: status::IDLE.to_string(),
            connected: false,
            streaming: false,
            server_messages: Vec::new(),
            client_id,
        }
    }
}

/// Status lines shown to the user
pub mod status {
    pub const IDLE: &str = "Disconnected";
    pub const REQUESTING_PERMISSION: &str = "Requesting microphone permission...";
    pub const CONNECTING: &str = "Connecting to server...";
    pub const FETCHING_ICE: &str = "Fetching ICE servers...";
    pub const READY: &str = "Connected to server";
    pub const NOT_CONNECTED: &str = "Not connected to server";
    pub const NO_TARGET: &str = "Error: no peer to call";
    pub const STARTING: &str = "Starting audio stream...";
    pub const WAITING_ANSWER: &str = "Waiting for answer...";
    pub const ANSWERING: &str = "Answering incoming call...";
    pub const STREAM_STARTING: &str = "Audio stream starting";
    pub const STREAMING: &str = "Streaming audio to server";
    pub const STOPPING: &str = "Stopping stream...";
    pub const PEER_LOST: &str = "Audio connection lost";
    pub const CHANNEL_LOST: &str = "Disconnected from server";
    pub const CHANNEL_ERROR: &str = "Connection error";

    pub fn reconnecting(attempt: u32) -> String {
        format!("Reconnecting (attempt {})...", attempt)
    }
}
