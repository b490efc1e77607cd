//! Session configuration.
//!
//! Plain struct with defaults matching the hosted media server, plus an
//! environment overlay for the demo binary.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::client_id::ClientId;
use crate::error::{Result, SessionError};
use crate::media::MediaConstraints;
use crate::peer::{IcePolicy, MediaDirection, OfferConstraints, PeerOptions};
use crate::signaling::{Backoff, ReconnectPolicy, SdpEncoding};

// ============================================================================
// Defaults
// ============================================================================

/// Host used when none is configured
pub const DEFAULT_HOST: &str = "localhost";

/// Subprotocol requested on the signaling socket
pub const DEFAULT_SUBPROTOCOL: &str = "protoo";

/// Timeout for the TURN credentials request
pub const DEFAULT_ICE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote candidates held while a negotiation is still in flight
pub const DEFAULT_EARLY_CANDIDATE_LIMIT: usize = 32;

const ENV_HOST: &str = "MIC_UPLINK_HOST";
const ENV_SIGNALING_URL: &str = "MIC_UPLINK_SIGNALING_URL";
const ENV_TURN_URL: &str = "MIC_UPLINK_TURN_URL";
const ENV_RECONNECT_ATTEMPTS: &str = "MIC_UPLINK_RECONNECT_ATTEMPTS";
const ENV_RECONNECT_DELAY_MS: &str = "MIC_UPLINK_RECONNECT_DELAY_MS";
const ENV_ICE_POLICY: &str = "MIC_UPLINK_ICE_POLICY";
const ENV_VARIANT: &str = "MIC_UPLINK_VARIANT";

// ============================================================================
// Variant
// ============================================================================

/// Which remote the session talks to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionVariant {
    /// Uplink to a media server acting as a passive audio sink
    SendOnly,
    /// Peer-to-peer call routed by client id over a shared channel
    TwoWayCall,
}

impl SessionVariant {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "send-only" | "sendonly" | "uplink" => Ok(SessionVariant::SendOnly),
            "call" | "two-way" | "two-way-call" => Ok(SessionVariant::TwoWayCall),
            other => Err(SessionError::InvalidConfig(format!("unknown session variant '{}'", other))),
        }
    }

    pub fn sdp_encoding(&self) -> SdpEncoding {
        match self {
            SessionVariant::SendOnly => SdpEncoding::Flat,
            SessionVariant::TwoWayCall => SdpEncoding::Nested,
        }
    }

    pub fn offer_constraints(&self) -> OfferConstraints {
        OfferConstraints {
            offer_to_receive_audio: *self == SessionVariant::TwoWayCall,
        }
    }

    pub fn direction(&self) -> MediaDirection {
        match self {
            SessionVariant::SendOnly => MediaDirection::SendOnly,
            SessionVariant::TwoWayCall => MediaDirection::SendRecv,
        }
    }
}

// ============================================================================
// SessionConfig
// ============================================================================

/// Everything a [`SessionController`](crate::session::SessionController) needs
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Signaling base URL; the client id is appended as the last segment
    pub signaling_url: String,
    /// WebSocket subprotocol, `None` to skip negotiation
    pub subprotocol: Option<String>,
    /// TURN credentials endpoint
    pub turn_credentials_url: String,
    pub variant: SessionVariant,
    /// Also ask for the camera capability
    pub request_camera: bool,
    /// Peer connection options (direction is taken from the variant)
    pub peer: PeerOptions,
    pub media: MediaConstraints,
    pub reconnect: ReconnectPolicy,
    pub ice_fetch_timeout: Duration,
    pub early_candidate_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::for_host(DEFAULT_HOST)
    }
}

impl SessionConfig {
    /// Endpoints of a media server at `host`
    pub fn for_host(host: &str) -> Self {
        Self {
            signaling_url: format!("wss://{}/api/webrtc/ws/webrtc", host),
            subprotocol: Some(DEFAULT_SUBPROTOCOL.to_string()),
            turn_credentials_url: format!("https://{}/api/webrtc/turn-credentials", host),
            variant: SessionVariant::SendOnly,
            request_camera: false,
            peer: PeerOptions::default(),
            media: MediaConstraints::default(),
            reconnect: ReconnectPolicy::disabled(),
            ice_fetch_timeout: DEFAULT_ICE_FETCH_TIMEOUT,
            early_candidate_limit: DEFAULT_EARLY_CANDIDATE_LIMIT,
        }
    }

    /// Defaults overlaid with `MIC_UPLINK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(ENV_HOST) {
            Some(host) => Self::for_host(&host),
            None => Self::default(),
        };

        if let Some(url) = lookup(ENV_SIGNALING_URL) {
            config.signaling_url = url;
        }
        if let Some(url) = lookup(ENV_TURN_URL) {
            config.turn_credentials_url = url;
        }
        if let Some(variant) = lookup(ENV_VARIANT) {
            config.variant = SessionVariant::parse(&variant)?;
        }
        if let Some(policy) = lookup(ENV_ICE_POLICY) {
            config.peer.ice_transport_policy = match policy.trim().to_ascii_lowercase().as_str() {
                "relay" => IcePolicy::Relay,
                "all" => IcePolicy::All,
                other => {
                    return Err(SessionError::InvalidConfig(format!("unknown ICE policy '{}'", other)));
                }
            };
        }

        let attempts: Option<u32> = lookup(ENV_RECONNECT_ATTEMPTS)
            .map(|v| parse_number(ENV_RECONNECT_ATTEMPTS, &v))
            .transpose()?;
        let delay_ms: Option<u64> = lookup(ENV_RECONNECT_DELAY_MS)
            .map(|v| parse_number(ENV_RECONNECT_DELAY_MS, &v))
            .transpose()?;
        if let Some(attempts) = attempts {
            config.reconnect.max_attempts = attempts;
        }
        if let Some(ms) = delay_ms {
            config.reconnect.backoff = Backoff::Fixed(Duration::from_millis(ms));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject unusable endpoints
    pub fn validate(&self) -> Result<()> {
        let signaling = parse_url("signaling URL", &self.signaling_url)?;
        if !matches!(signaling.scheme(), "ws" | "wss") {
            return Err(SessionError::InvalidConfig(format!(
                "signaling URL must use ws or wss, got '{}'",
                signaling.scheme()
            )));
        }
        parse_url("TURN credentials URL", &self.turn_credentials_url)?;
        if self.subprotocol.as_deref() == Some("") {
            return Err(SessionError::InvalidConfig("empty subprotocol".to_string()));
        }
        Ok(())
    }

    /// Full signaling URL for this client
    pub fn signaling_endpoint(&self, client_id: &ClientId) -> String {
        format!("{}/{}", self.signaling_url.trim_end_matches('/'), client_id)
    }

    /// Peer options with the direction implied by the variant
    pub fn peer_options(&self) -> PeerOptions {
        PeerOptions {
            direction: self.variant.direction(),
            ..self.peer.clone()
        }
    }
}

fn parse_url(what: &str, value: &str) -> Result<Url> {
    if value.trim().is_empty() {
        return Err(SessionError::InvalidConfig(format!("{} is empty", what)));
    }
    Url::parse(value).map_err(|e| SessionError::InvalidConfig(format!("invalid {} '{}': {}", what, value, e)))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SessionError::InvalidConfig(format!("{} must be a number, got '{}'", key, value)))
}
