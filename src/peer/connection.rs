//! Single WebRTC peer connection.
//!
//! Wraps RTCPeerConnection from webrtc-rs and handles SDP/ICE exchange.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::TrackLocal;

use super::{
    ConnectionStateCallback, IceCandidateCallback, IceCandidateInfo, IcePolicy, MediaDirection,
    OfferConstraints, PeerConnectionState, PeerConnector, PeerHandle, PeerOptions, SdpKind,
};
use crate::error::{Result, SessionError};
use crate::ice::IceServerConfig;
use crate::media::LocalAudioTrack;

fn peer_err(what: &str, e: impl std::fmt::Display) -> SessionError {
    SessionError::PeerConnection(format!("{}: {}", what, e))
}

fn description(kind: SdpKind, sdp: &str) -> Result<RTCSessionDescription> {
    let desc = match kind {
        SdpKind::Offer => RTCSessionDescription::offer(sdp.to_string()),
        SdpKind::Answer => RTCSessionDescription::answer(sdp.to_string()),
    };
    desc.map_err(|e| SessionError::Negotiation(format!("invalid {} SDP: {}", kind.as_str(), e)))
}

/// Builds webrtc-rs peer connections from one shared API instance
pub struct WebRtcPeerConnector {
    api: API,
}

impl WebRtcPeerConnector {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| peer_err("failed to register codecs", e))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| peer_err("failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

/// Build the RTCConfiguration for a new connection
pub fn rtc_configuration(ice_servers: &[IceServerConfig], options: &PeerOptions) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers.iter().map(IceServerConfig::to_rtc_ice_server).collect(),
        ice_transport_policy: match options.ice_transport_policy {
            IcePolicy::All => RTCIceTransportPolicy::All,
            IcePolicy::Relay => RTCIceTransportPolicy::Relay,
        },
        bundle_policy: if options.max_bundle {
            RTCBundlePolicy::MaxBundle
        } else {
            RTCBundlePolicy::Balanced
        },
        rtcp_mux_policy: if options.require_rtcp_mux {
            RTCRtcpMuxPolicy::Require
        } else {
            RTCRtcpMuxPolicy::Negotiate
        },
        ice_candidate_pool_size: options.ice_candidate_pool_size,
        ..Default::default()
    }
}

#[async_trait]
impl PeerConnector for WebRtcPeerConnector {
    async fn create(&self, ice_servers: &[IceServerConfig], options: &PeerOptions) -> Result<Box<dyn PeerHandle>> {
        let peer_connection = self
            .api
            .new_peer_connection(rtc_configuration(ice_servers, options))
            .await
            .map_err(|e| peer_err("failed to create peer connection", e))?;

        debug!("Peer connection created with {} ICE server(s)", ice_servers.len());

        Ok(Box::new(WebRtcPeerHandle {
            peer_connection: Arc::new(peer_connection),
            direction: options.direction,
            has_audio: AtomicBool::new(false),
        }))
    }
}

/// Represents a single WebRTC peer connection
pub struct WebRtcPeerHandle {
    peer_connection: Arc<RTCPeerConnection>,
    direction: MediaDirection,
    has_audio: AtomicBool,
}

impl WebRtcPeerHandle {
    /// Get the peer connection for advanced usage
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

#[async_trait]
impl PeerHandle for WebRtcPeerHandle {
    async fn add_local_track(&self, track: &LocalAudioTrack) -> Result<()> {
        let direction = match self.direction {
            MediaDirection::SendOnly => RTCRtpTransceiverDirection::Sendonly,
            MediaDirection::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
        };

        self.peer_connection
            .add_transceiver_from_track(
                track.track().clone() as Arc<dyn TrackLocal + Send + Sync>,
                Some(RTCRtpTransceiverInit {
                    direction,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| peer_err("failed to add transceiver", e))?;

        self.has_audio.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_offer(&self, constraints: OfferConstraints) -> Result<String> {
        // Receiving audio without a local track needs its own transceiver
        if constraints.offer_to_receive_audio && !self.has_audio.load(Ordering::SeqCst) {
            self.peer_connection
                .add_transceiver_from_kind(
                    RTPCodecType::Audio,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(|e| peer_err("failed to add receive transceiver", e))?;
            self.has_audio.store(true, Ordering::SeqCst);
        }

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| peer_err("failed to create offer", e))?;

        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| peer_err("failed to create answer", e))?;

        Ok(answer.sdp)
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        self.peer_connection
            .set_local_description(description(kind, sdp)?)
            .await
            .map_err(|e| peer_err("failed to set local description", e))
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        self.peer_connection
            .set_remote_description(description(kind, sdp)?)
            .await
            .map_err(|e| peer_err("failed to set remote description", e))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidateInfo) -> Result<()> {
        let candidate_init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };

        self.peer_connection
            .add_ice_candidate(candidate_init)
            .await
            .map_err(|e| peer_err("failed to add ICE candidate", e))
    }

    fn on_ice_candidate(&self, callback: IceCandidateCallback) {
        self.peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let callback = callback.clone();
            Box::pin(async move {
                // None marks the end of gathering
                if let Some(init) = candidate.and_then(|c| c.to_json().ok()) {
                    callback(IceCandidateInfo {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    });
                }
            })
        }));
    }

    fn on_connection_state_change(&self, callback: ConnectionStateCallback) {
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let state = match s {
                    RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
                    RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
                    RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
                    RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
                    RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
                    _ => PeerConnectionState::New,
                };
                info!("Peer connection state: {:?}", state);
                callback(state);
                Box::pin(async {})
            }));
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| peer_err("failed to close peer connection", e))
    }
}
