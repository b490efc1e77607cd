//! In-memory collaborators for session tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::SessionSnapshot;
use crate::error::{Result, SessionError};
use crate::ice::{CredentialFetcher, IceServerConfig};
use crate::media::{
    Capability, LocalAudioTrack, LocalMediaTrackSet, MediaCapture, MediaConstraints, PermissionGate,
    PermissionOutcome,
};
use crate::peer::{
    ConnectionStateCallback, IceCandidateCallback, IceCandidateInfo, OfferConstraints, PeerConnectionState,
    PeerConnector, PeerHandle, PeerOptions, SdpKind,
};
use crate::signaling::{OutboundFrame, SignalingMessage, SignalingTransport, TransportFrame, TransportLink};

// ============================================================================
// Signaling transport
// ============================================================================

#[derive(Default)]
struct TransportState {
    opened: Vec<(String, Option<String>)>,
    failing_opens: usize,
    inbound: Option<mpsc::UnboundedSender<TransportFrame>>,
    outbound: Vec<mpsc::UnboundedReceiver<OutboundFrame>>,
    sent: Vec<OutboundFrame>,
}

/// Loopback transport: tests push inbound frames and read what was sent
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened_with(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().opened.clone()
    }

    /// Make the next `count` opens fail
    pub fn fail_next_opens(&self, count: usize) {
        self.state.lock().failing_opens = count;
    }

    pub fn push_text(&self, text: &str) {
        if let Some(tx) = &self.state.lock().inbound {
            let _ = tx.send(TransportFrame::Text(text.to_string()));
        }
    }

    /// Remote side closes the current link
    pub fn close_remote(&self, reason: Option<&str>) {
        if let Some(tx) = self.state.lock().inbound.take() {
            let _ = tx.send(TransportFrame::Closed(reason.map(str::to_string)));
        }
    }

    pub fn sent_frames(&self) -> Vec<OutboundFrame> {
        let mut state = self.state.lock();
        let mut drained = Vec::new();
        for rx in state.outbound.iter_mut() {
            while let Ok(frame) = rx.try_recv() {
                drained.push(frame);
            }
        }
        state.sent.extend(drained);
        state.sent.clone()
    }

    pub fn sent_messages(&self) -> Vec<SignalingMessage> {
        self.sent_frames()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Text(text) => SignalingMessage::parse(&text),
                OutboundFrame::Close => None,
            })
            .collect()
    }

    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent_messages().iter().map(|m| m.kind_name().to_string()).collect()
    }
}

#[async_trait]
impl SignalingTransport for MemoryTransport {
    async fn open(&self, url: &str, subprotocol: Option<&str>) -> Result<TransportLink> {
        let mut state = self.state.lock();
        state.opened.push((url.to_string(), subprotocol.map(str::to_string)));
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(SessionError::Signaling("connection refused".to_string()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        state.inbound = Some(in_tx);
        state.outbound.push(out_rx);
        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

// ============================================================================
// Peer connections
// ============================================================================

/// Observable state of one fake peer connection
#[derive(Default)]
pub struct FakePeer {
    index: usize,
    closed: AtomicBool,
    ice_servers: Vec<IceServerConfig>,
    options: Option<PeerOptions>,
    tracks: Mutex<Vec<String>>,
    offer_constraints: Mutex<Option<OfferConstraints>>,
    local: Mutex<Vec<(SdpKind, String)>>,
    remote: Mutex<Vec<(SdpKind, String)>>,
    candidates: Mutex<Vec<IceCandidateInfo>>,
    on_candidate: Mutex<Option<IceCandidateCallback>>,
    on_state: Mutex<Option<ConnectionStateCallback>>,
    snapshot_at_close: Mutex<Option<SessionSnapshot>>,
}

impl FakePeer {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ice_servers(&self) -> &[IceServerConfig] {
        &self.ice_servers
    }

    pub fn options(&self) -> Option<&PeerOptions> {
        self.options.as_ref()
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.lock().clone()
    }

    pub fn offer_constraints(&self) -> Option<OfferConstraints> {
        *self.offer_constraints.lock()
    }

    pub fn local_descriptions(&self) -> Vec<(SdpKind, String)> {
        self.local.lock().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<(SdpKind, String)> {
        self.remote.lock().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidateInfo> {
        self.candidates.lock().clone()
    }

    /// Session projection observed when the connection was closed
    pub fn snapshot_at_close(&self) -> Option<SessionSnapshot> {
        self.snapshot_at_close.lock().clone()
    }

    pub fn emit_candidate(&self, candidate: IceCandidateInfo) {
        let callback = self.on_candidate.lock().clone();
        if let Some(callback) = callback {
            callback(candidate);
        }
    }

    pub fn emit_state(&self, state: PeerConnectionState) {
        let callback = self.on_state.lock().clone();
        if let Some(callback) = callback {
            callback(state);
        }
    }
}

#[derive(Default)]
struct ConnectorState {
    peers: Vec<Arc<FakePeer>>,
    max_open: usize,
    fail_remote: bool,
    gather_on_local_description: bool,
    observer: Option<watch::Receiver<SessionSnapshot>>,
}

impl ConnectorState {
    fn open(&self) -> usize {
        self.peers.iter().filter(|p| !p.is_closed()).count()
    }
}

/// Peer connector that records every connection it builds
#[derive(Clone, Default)]
pub struct RecordingConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.state.lock().peers.len()
    }

    pub fn open_handles(&self) -> usize {
        self.state.lock().open()
    }

    /// Most connections open at the same time so far
    pub fn max_open(&self) -> usize {
        self.state.lock().max_open
    }

    pub fn peer(&self, index: usize) -> Arc<FakePeer> {
        self.state.lock().peers[index].clone()
    }

    pub fn last_peer(&self) -> Option<Arc<FakePeer>> {
        self.state.lock().peers.last().cloned()
    }

    /// Reject every remote description from now on
    pub fn fail_remote_descriptions(&self, fail: bool) {
        self.state.lock().fail_remote = fail;
    }

    /// Emit one local candidate while the local description is applied
    pub fn gather_on_local_description(&self, gather: bool) {
        self.state.lock().gather_on_local_description = gather;
    }

    /// Record the session projection whenever a connection closes
    pub fn observe(&self, receiver: watch::Receiver<SessionSnapshot>) {
        self.state.lock().observer = Some(receiver);
    }
}

#[async_trait]
impl PeerConnector for RecordingConnector {
    async fn create(&self, ice_servers: &[IceServerConfig], options: &PeerOptions) -> Result<Box<dyn PeerHandle>> {
        let mut state = self.state.lock();
        let peer = Arc::new(FakePeer {
            index: state.peers.len(),
            ice_servers: ice_servers.to_vec(),
            options: Some(options.clone()),
            ..Default::default()
        });
        state.peers.push(peer.clone());
        let open = state.open();
        state.max_open = state.max_open.max(open);

        Ok(Box::new(FakePeerHandle {
            peer,
            connector: self.clone(),
        }))
    }
}

struct FakePeerHandle {
    peer: Arc<FakePeer>,
    connector: RecordingConnector,
}

impl FakePeerHandle {
    fn fails_remote(&self) -> bool {
        self.connector.state.lock().fail_remote
    }
}

#[async_trait]
impl PeerHandle for FakePeerHandle {
    async fn add_local_track(&self, track: &LocalAudioTrack) -> Result<()> {
        self.peer.tracks.lock().push(track.id().to_string());
        Ok(())
    }

    async fn create_offer(&self, constraints: OfferConstraints) -> Result<String> {
        *self.peer.offer_constraints.lock() = Some(constraints);
        Ok(format!("v=0 fake-offer-{}", self.peer.index + 1))
    }

    async fn create_answer(&self) -> Result<String> {
        Ok(format!("v=0 fake-answer-{}", self.peer.index + 1))
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        self.peer.local.lock().push((kind, sdp.to_string()));
        let gather = self.connector.state.lock().gather_on_local_description;
        if gather {
            self.peer.emit_candidate(IceCandidateInfo {
                candidate: format!("candidate:local-{} 1 udp 2130706431 10.0.0.1 5000 typ host", self.peer.index),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            });
        }
        Ok(())
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        if self.fails_remote() {
            return Err(SessionError::Negotiation("remote description rejected".to_string()));
        }
        self.peer.remote.lock().push((kind, sdp.to_string()));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidateInfo) -> Result<()> {
        self.peer.candidates.lock().push(candidate.clone());
        Ok(())
    }

    fn on_ice_candidate(&self, callback: IceCandidateCallback) {
        *self.peer.on_candidate.lock() = Some(callback);
    }

    fn on_connection_state_change(&self, callback: ConnectionStateCallback) {
        *self.peer.on_state.lock() = Some(callback);
    }

    async fn close(&self) -> Result<()> {
        let observed = self
            .connector
            .state
            .lock()
            .observer
            .as_ref()
            .map(|rx| rx.borrow().clone());
        *self.peer.snapshot_at_close.lock() = observed;
        self.peer.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Media and permissions
// ============================================================================

/// Capture provider handing out real (silent) Opus tracks
#[derive(Clone, Default)]
pub struct FakeCapture {
    tracks: Arc<Mutex<Vec<LocalAudioTrack>>>,
    fail: Arc<AtomicBool>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.tracks.lock().len()
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.lock().iter().filter(|t| t.is_live()).count()
    }
}

#[async_trait]
impl MediaCapture for FakeCapture {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<LocalMediaTrackSet> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::Media("no input device".to_string()));
        }
        let mut tracks = self.tracks.lock();
        let track = LocalAudioTrack::opus(&format!("mic-{}", tracks.len() + 1), "fake-stream", &constraints.audio);
        tracks.push(track.clone());
        Ok(LocalMediaTrackSet::new(vec![track]))
    }
}

/// Permission gate with a fixed answer that records what was asked
#[derive(Clone)]
pub struct ScriptedPermissions {
    outcome: PermissionOutcome,
    requests: Arc<Mutex<Vec<Vec<Capability>>>>,
}

impl ScriptedPermissions {
    pub fn granting() -> Self {
        Self {
            outcome: PermissionOutcome::Granted,
            requests: Arc::default(),
        }
    }

    pub fn denying() -> Self {
        Self {
            outcome: PermissionOutcome::Denied,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<Vec<Capability>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PermissionGate for ScriptedPermissions {
    async fn request(&self, capabilities: &[Capability]) -> Result<PermissionOutcome> {
        self.requests.lock().push(capabilities.to_vec());
        Ok(self.outcome)
    }
}

// ============================================================================
// ICE credentials
// ============================================================================

/// Credentials endpoint with a canned reply
pub struct ScriptedCredentials {
    reply: Result<Vec<IceServerConfig>>,
    calls: AtomicUsize,
}

impl ScriptedCredentials {
    pub fn ok(servers: Vec<IceServerConfig>) -> Self {
        Self {
            reply: Ok(servers),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err(SessionError::IceFetch("HTTP 503".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialFetcher for ScriptedCredentials {
    async fn fetch_credentials(&self) -> Result<Vec<IceServerConfig>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}
