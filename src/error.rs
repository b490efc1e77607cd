//! Error taxonomy for the uplink session.

use thiserror::Error;

/// Errors raised by the session collaborators.
///
/// The controller never hands these to the UI layer; it logs them and
/// projects them into a status string through [`SessionError::status_text`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("permission request failed: {0}")]
    Permission(String),

    #[error("signaling transport error: {0}")]
    Signaling(String),

    #[error("signaling channel closed: {0}")]
    SignalingClosed(String),

    #[error("ICE server fetch failed: {0}")]
    IceFetch(String),

    #[error("media capture failed: {0}")]
    Media(String),

    #[error("peer connection error: {0}")]
    PeerConnection(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// User-facing status line for this error.
    pub fn status_text(&self) -> String {
        match self {
            SessionError::PermissionDenied | SessionError::Permission(_) => {
                "Error: no microphone permission".to_string()
            }
            SessionError::Signaling(_) => "Connection error".to_string(),
            SessionError::SignalingClosed(_) => "Error: lost connection to server".to_string(),
            // Degraded mode, never shown as an error.
            SessionError::IceFetch(_) => "Connected to server".to_string(),
            SessionError::Media(_) => "Error: could not open the microphone".to_string(),
            SessionError::PeerConnection(_) | SessionError::Negotiation(_) => {
                "Error: could not start the audio stream".to_string()
            }
            SessionError::Remote(msg) => format!("Error: {}", msg),
            SessionError::InvalidConfig(_) => "Error: invalid configuration".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
