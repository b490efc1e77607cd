//! Peer connection management for WebRTC.
//!
//! The session drives exactly one peer connection at a time through the
//! [`PeerConnector`] / [`PeerHandle`] seam; [`connection`] implements it on
//! top of webrtc-rs.

pub mod connection;

pub use connection::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ice::IceServerConfig;
use crate::media::LocalAudioTrack;

/// Peer connection states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// ICE candidate for signaling
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateInfo {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

/// Which half of the offer/answer exchange an SDP belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

/// Offer constraints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OfferConstraints {
    /// `false` when the remote is a passive audio sink
    pub offer_to_receive_audio: bool,
}

/// ICE candidate gathering policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IcePolicy {
    All,
    Relay,
}

/// Direction of the local audio transceiver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaDirection {
    SendOnly,
    SendRecv,
}

/// Peer connection construction options
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerOptions {
    pub ice_transport_policy: IcePolicy,
    pub max_bundle: bool,
    pub require_rtcp_mux: bool,
    pub ice_candidate_pool_size: u8,
    pub direction: MediaDirection,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            ice_transport_policy: IcePolicy::Relay,
            max_bundle: true,
            require_rtcp_mux: true,
            ice_candidate_pool_size: 0,
            direction: MediaDirection::SendOnly,
        }
    }
}

/// Called for every locally gathered ICE candidate
pub type IceCandidateCallback = Arc<dyn Fn(IceCandidateInfo) + Send + Sync>;

/// Called on every connection state transition
pub type ConnectionStateCallback = Arc<dyn Fn(PeerConnectionState) + Send + Sync>;

/// Builds peer connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn create(&self, ice_servers: &[IceServerConfig], options: &PeerOptions) -> Result<Box<dyn PeerHandle>>;
}

/// One live peer connection.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    async fn add_local_track(&self, track: &LocalAudioTrack) -> Result<()>;

    async fn create_offer(&self, constraints: OfferConstraints) -> Result<String>;

    async fn create_answer(&self) -> Result<String>;

    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<()>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidateInfo) -> Result<()>;

    fn on_ice_candidate(&self, callback: IceCandidateCallback);

    fn on_connection_state_change(&self, callback: ConnectionStateCallback);

    async fn close(&self) -> Result<()>;
}
