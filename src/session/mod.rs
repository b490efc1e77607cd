//! Session controller: the state machine tying signaling, ICE servers,
//! local media and the peer connection together.
//!
//! ```text
//! Idle -> PermissionPending -> SignalingConnecting -> Ready
//!      -> Negotiating -> Streaming -> Stopping -> Ready | Idle
//! ```
//!
//! `Error` is reachable from any state and only left through `init`.
//!
//! All collaborator callbacks (socket pumps, peer events, the negotiation
//! task) post into a single event queue that the controller drains in
//! arrival order, so every transition runs on one task.

mod attempt;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use state::*;

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};

use attempt::{BuildJob, PeerSession, Prepared};

use crate::client_id::ClientId;
use crate::config::{SessionConfig, SessionVariant};
use crate::error::{Result, SessionError};
use crate::ice::{CredentialFetcher, HttpCredentialFetcher, IceServerConfig, IceServerProvider};
use crate::media::{Capability, GrantAll, MediaCapture, OpusTrackCapture, PermissionGate, PermissionOutcome};
use crate::peer::{IceCandidateInfo, PeerConnectionState, PeerConnector, PeerHandle, SdpKind, WebRtcPeerConnector};
use crate::signaling::{
    ChannelEvent, ChannelEventKind, ChannelEventSink, MessageHandler, MessageRouter, SignalingChannel,
    SignalingMessage, SignalingTransport, WebSocketTransport,
};

/// Consecutive empty polls before [`SessionController::drain`] gives up
const DRAIN_IDLE_ROUNDS: usize = 8;

// ============================================================================
// Intents and events
// ============================================================================

/// What the UI layer can ask for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Start streaming. The call variant needs a target peer.
    Start { target: Option<ClientId> },
    Stop,
    Shutdown,
}

pub(crate) enum PeerEvent {
    LocalCandidate(IceCandidateInfo),
    State(PeerConnectionState),
}

pub(crate) enum SessionEvent {
    Channel(ChannelEvent),
    Peer { attempt: u64, event: PeerEvent },
    BuildComplete { attempt: u64, result: Result<Prepared> },
}

enum Step {
    Intent(Intent),
    Event(SessionEvent),
}

// ============================================================================
// Collaborators
// ============================================================================

/// External capabilities the controller orchestrates
pub struct SessionDeps {
    pub transport: Arc<dyn SignalingTransport>,
    pub peers: Arc<dyn PeerConnector>,
    pub media: Arc<dyn MediaCapture>,
    pub permissions: Arc<dyn PermissionGate>,
    pub credentials: Arc<dyn CredentialFetcher>,
}

impl SessionDeps {
    /// WebSocket signaling, webrtc-rs peers, Opus capture, HTTPS credentials
    pub fn live(config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            transport: Arc::new(WebSocketTransport),
            peers: Arc::new(WebRtcPeerConnector::new()?),
            media: Arc::new(OpusTrackCapture::new()),
            permissions: Arc::new(GrantAll),
            credentials: Arc::new(HttpCredentialFetcher::new(&config.turn_credentials_url)),
        })
    }
}

/// The attempt that has reached the controller
struct ActiveAttempt {
    session: PeerSession,
    /// We answered a remote offer
    answerer: bool,
    remote_applied: bool,
}

// ============================================================================
// SessionController
// ============================================================================

/// Owns the session and everything it holds: signaling channel, peer
/// connection, local tracks.
pub struct SessionController {
    config: SessionConfig,
    client_id: ClientId,
    state: SessionState,

    permissions: Arc<dyn PermissionGate>,
    media: Arc<dyn MediaCapture>,
    peers: Arc<dyn PeerConnector>,
    ice: Arc<IceServerProvider>,
    router: MessageRouter,
    channel: SignalingChannel,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,

    /// Id of the current attempt; bumped on teardown so late results go stale
    attempt: u64,
    /// Attempt id of the negotiation task still running, if any
    building: Option<u64>,
    active: Option<ActiveAttempt>,
    remote_peer: Option<ClientId>,
    description_sent: bool,
    local_candidates: Vec<IceCandidateInfo>,
    remote_candidates: VecDeque<IceCandidateInfo>,

    /// Channel went away unexpectedly; handled once teardown settles
    channel_lost: bool,
    settle_status: Option<String>,

    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        Self::with_client_id(config, deps, ClientId::process())
    }

    pub fn with_client_id(config: SessionConfig, deps: SessionDeps, client_id: ClientId) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let sink_tx = events_tx.clone();
        let sink: ChannelEventSink = Arc::new(move |event| {
            let _ = sink_tx.send(SessionEvent::Channel(event));
        });
        let channel = SignalingChannel::new(
            deps.transport,
            &config.signaling_endpoint(&client_id),
            config.subprotocol.as_deref(),
            config.reconnect,
            sink,
        );

        let ice = Arc::new(IceServerProvider::new(deps.credentials, config.ice_fetch_timeout));
        let router = MessageRouter::new(client_id.clone(), ice.clone());
        let (snapshot, _) = watch::channel(SessionSnapshot::new(client_id.clone()));

        Self {
            config,
            client_id,
            state: SessionState::Idle,
            permissions: deps.permissions,
            media: deps.media,
            peers: deps.peers,
            ice,
            router,
            channel,
            events_tx,
            events_rx,
            attempt: 0,
            building: None,
            active: None,
            remote_peer: None,
            description_sent: false,
            local_candidates: Vec::new(),
            remote_candidates: VecDeque::new(),
            channel_lost: false,
            settle_status: None,
            snapshot,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// ICE servers the next peer connection will be built with
    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.ice.current()
    }

    /// Watch the UI projection
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    // ------------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------------

    /// Ask for capture permission and open the signaling channel.
    ///
    /// Allowed from `Idle` and `Error`.
    pub async fn init(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Error => {}
            other => {
                warn!("init ignored in state {}", other);
                return;
            }
        }

        self.channel.close();
        self.channel_lost = false;
        self.transition(SessionState::PermissionPending, status::REQUESTING_PERMISSION);

        let mut capabilities = vec![Capability::Microphone];
        if self.config.request_camera {
            capabilities.push(Capability::Camera);
        }
        match self.permissions.request(&capabilities).await {
            Ok(PermissionOutcome::Granted) => {}
            Ok(PermissionOutcome::Denied) => return self.fail(SessionError::PermissionDenied),
            Err(e) => return self.fail(e),
        }

        self.transition(SessionState::SignalingConnecting, status::CONNECTING);
        if let Err(e) = self.channel.connect().await {
            self.fail(e);
        }
    }

    /// Start a streaming attempt. Ignored unless `Ready` with the channel
    /// connected and no attempt in flight.
    pub fn start(&mut self, target: Option<ClientId>) {
        if !self.channel.is_connected() {
            warn!("Start ignored: signaling channel not connected");
            if self.state != SessionState::Error {
                self.set_status(status::NOT_CONNECTED);
            }
            return;
        }
        if self.state != SessionState::Ready || self.has_attempt() {
            warn!("Start ignored in state {}", self.state);
            return;
        }

        let target = match (self.config.variant, target) {
            (SessionVariant::TwoWayCall, None) => {
                warn!("Start ignored: no peer to call");
                self.set_status(status::NO_TARGET);
                return;
            }
            (SessionVariant::TwoWayCall, target) => target,
            (SessionVariant::SendOnly, _) => None,
        };

        self.begin_attempt(target, None, status::STARTING);
    }

    /// Tear down the current attempt, if any
    pub async fn stop(&mut self) {
        if self.state.is_active() {
            info!("Stop requested");
            self.teardown(None).await;
        } else {
            debug!("Nothing to stop in state {}", self.state);
        }
    }

    /// Release everything and end in `Idle`: channel closed, handle
    /// closed, tracks stopped.
    pub async fn shutdown(&mut self) {
        info!("Shutting down session");
        self.channel.close();
        self.channel_lost = false;

        if self.state.is_active() {
            self.teardown(None).await;
        }
        while let Some(attempt) = self.building {
            match self.events_rx.recv().await {
                Some(SessionEvent::BuildComplete { attempt, result }) => {
                    self.on_build_complete(attempt, result).await;
                }
                Some(_) => {}
                None => {
                    warn!("Event queue closed while attempt {} was building", attempt);
                    break;
                }
            }
        }
        if let Some(active) = self.active.take() {
            active.session.release().await;
        }

        self.clear_attempt_state();
        self.transition(SessionState::Idle, status::IDLE);
    }

    pub async fn apply(&mut self, intent: Intent) {
        match intent {
            Intent::Start { target } => self.start(target),
            Intent::Stop => self.stop().await,
            Intent::Shutdown => self.shutdown().await,
        }
        self.refresh();
    }

    // ------------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------------

    /// Process intents and session events until shutdown.
    ///
    /// A closed intent channel counts as a shutdown request.
    pub async fn run(&mut self, mut intents: mpsc::Receiver<Intent>) {
        loop {
            let step = tokio::select! {
                intent = intents.recv() => Step::Intent(intent.unwrap_or(Intent::Shutdown)),
                Some(event) = self.events_rx.recv() => Step::Event(event),
            };

            match step {
                Step::Intent(Intent::Shutdown) => {
                    self.shutdown().await;
                    break;
                }
                Step::Intent(intent) => self.apply(intent).await,
                Step::Event(event) => self.handle_event(event).await,
            }
        }
    }

    /// Wait for one event and process it
    pub async fn process_next(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event).await;
        }
    }

    /// Process events until the queue stays empty for a few scheduler
    /// rounds.
    pub async fn drain(&mut self) {
        let mut idle_rounds = 0;
        while idle_rounds < DRAIN_IDLE_ROUNDS {
            match self.events_rx.try_recv() {
                Ok(event) => {
                    idle_rounds = 0;
                    self.handle_event(event).await;
                }
                Err(_) => {
                    idle_rounds += 1;
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Channel(event) => self.on_channel_event(event).await,
            SessionEvent::Peer { attempt, event } => self.on_peer_event(attempt, event).await,
            SessionEvent::BuildComplete { attempt, result } => self.on_build_complete(attempt, result).await,
        }
        self.refresh();
    }

    // ------------------------------------------------------------------------
    // Signaling channel
    // ------------------------------------------------------------------------

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        if event.epoch != self.channel.epoch() {
            debug!("Dropping event from replaced signaling link {}", event.epoch);
            return;
        }

        match event.kind {
            ChannelEventKind::Opened => {
                if self.state != SessionState::SignalingConnecting {
                    debug!("Channel opened in state {}", self.state);
                    return;
                }
                self.set_status(status::FETCHING_ICE);
                let servers = self.ice.fetch().await;
                debug!("{} ICE server(s) ready", servers.len());
                self.transition(SessionState::Ready, status::READY);
            }
            ChannelEventKind::Message(message) => {
                if matches!(
                    self.state,
                    SessionState::Idle | SessionState::Error | SessionState::PermissionPending
                ) {
                    debug!("Dropping '{}' in state {}", message.kind_name(), self.state);
                    return;
                }
                let router = self.router.clone();
                router.dispatch(self, message).await;
            }
            ChannelEventKind::Closed { reason } => self.on_channel_closed(reason).await,
            ChannelEventKind::Error(e) => {
                warn!("Signaling error: {}", e);
                if !matches!(self.state, SessionState::Idle | SessionState::Error) {
                    self.set_status(status::CHANNEL_ERROR);
                }
            }
            ChannelEventKind::ReconnectDue { attempt } => {
                if self.state != SessionState::SignalingConnecting {
                    return;
                }
                info!("Reconnecting to signaling server (attempt {})", attempt);
                if let Err(e) = self.channel.connect().await {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    self.after_channel_loss();
                }
            }
        }
    }

    async fn on_channel_closed(&mut self, reason: Option<String>) {
        if matches!(self.state, SessionState::Idle | SessionState::Error) {
            return;
        }
        warn!(
            "Signaling channel lost in state {}: {}",
            self.state,
            reason.as_deref().unwrap_or("no reason")
        );

        self.channel_lost = true;
        if self.state.is_active() {
            self.teardown(None).await;
        } else if self.state != SessionState::Stopping {
            self.settle();
        }
    }

    /// Apply the reconnect policy to a lost link. The link is retired
    /// first, so its `Closed` event is not handled a second time.
    fn after_channel_loss(&mut self) {
        self.channel_lost = false;
        self.channel.retire_lost_link();
        match self.channel.schedule_reconnect() {
            Some((attempt, _)) => {
                self.transition(SessionState::SignalingConnecting, status::reconnecting(attempt));
            }
            None if self.channel.policy().is_enabled() => {
                self.fail(SessionError::SignalingClosed("reconnect attempts exhausted".to_string()));
            }
            None => self.transition(SessionState::Idle, status::CHANNEL_LOST),
        }
    }

    fn send(&self, message: SignalingMessage) -> bool {
        let message = match (&self.config.variant, &self.remote_peer) {
            (SessionVariant::TwoWayCall, Some(peer)) => message.routed(&self.client_id, peer),
            _ => message,
        };
        self.channel.send(&message)
    }

    // ------------------------------------------------------------------------
    // Attempts
    // ------------------------------------------------------------------------

    fn has_attempt(&self) -> bool {
        self.active.is_some() || self.building.is_some()
    }

    fn begin_attempt(&mut self, remote_peer: Option<ClientId>, remote_offer: Option<String>, status: &str) {
        self.attempt += 1;
        let attempt = self.attempt;

        self.clear_attempt_state();
        self.building = Some(attempt);
        self.remote_peer = remote_peer;
        self.transition(SessionState::Negotiating, status);

        let job = BuildJob {
            attempt,
            remote_offer,
            ice_servers: self.ice.current(),
            options: self.config.peer_options(),
            constraints: self.config.media.clone(),
            offer_constraints: self.config.variant.offer_constraints(),
            peers: self.peers.clone(),
            media: self.media.clone(),
            events: self.events_tx.clone(),
        };
        debug!(
            "Attempt {}: building peer connection with {} ICE server(s)",
            attempt,
            job.ice_servers.len()
        );
        tokio::spawn(job.run());
    }

    async fn on_build_complete(&mut self, attempt: u64, result: Result<Prepared>) {
        if self.building == Some(attempt) {
            self.building = None;
        }

        if attempt != self.attempt || self.state != SessionState::Negotiating {
            if let Ok(prepared) = result {
                debug!("Discarding stale attempt {}", attempt);
                prepared.session.release().await;
            }
            if self.state == SessionState::Stopping && self.building.is_none() {
                self.settle();
            }
            return;
        }

        match result {
            Ok(prepared) => self.install(prepared).await,
            Err(e) => {
                error!("Attempt {} failed: {}", attempt, e);
                self.teardown(Some(e.status_text())).await;
            }
        }
    }

    /// Take ownership of a prepared attempt and send its description
    async fn install(&mut self, prepared: Prepared) {
        let Prepared {
            session,
            kind,
            local_sdp,
        } = prepared;
        let answerer = kind == SdpKind::Answer;
        self.active = Some(ActiveAttempt {
            session,
            answerer,
            remote_applied: answerer,
        });

        let description = SignalingMessage::description(kind, local_sdp, self.config.variant.sdp_encoding());
        if !self.send(description) {
            let e = SessionError::Signaling(format!("{} not sent", kind.as_str()));
            error!("Attempt {} failed: {}", self.attempt, e);
            self.teardown(Some(e.status_text())).await;
            return;
        }
        info!("Sent {} (attempt {})", kind.as_str(), self.attempt);

        self.description_sent = true;
        for candidate in std::mem::take(&mut self.local_candidates) {
            self.send(SignalingMessage::ice_candidate(candidate));
        }

        if answerer {
            self.flush_remote_candidates().await;
            self.set_status(status::STREAM_STARTING);
        } else {
            self.set_status(status::WAITING_ANSWER);
        }
    }

    fn active_handle(&self) -> Option<&dyn PeerHandle> {
        self.active.as_ref().and_then(|a| a.session.handle())
    }

    async fn apply_remote_candidate(&self, candidate: &IceCandidateInfo) {
        if let Some(handle) = self.active_handle() {
            if let Err(e) = handle.add_ice_candidate(candidate).await {
                warn!("Remote ICE candidate rejected: {}", e);
            }
        }
    }

    async fn flush_remote_candidates(&mut self) {
        let queued: Vec<_> = self.remote_candidates.drain(..).collect();
        if !queued.is_empty() {
            debug!("Applying {} queued remote candidate(s)", queued.len());
        }
        for candidate in &queued {
            self.apply_remote_candidate(candidate).await;
        }
    }

    /// Answer a renegotiation offer on the existing connection
    async fn answer_on_active(&self, offer: &str) -> Result<String> {
        let handle = self
            .active_handle()
            .ok_or_else(|| SessionError::Negotiation("no active peer connection".to_string()))?;
        handle.set_remote_description(SdpKind::Offer, offer).await?;
        let answer = handle.create_answer().await?;
        handle.set_local_description(SdpKind::Answer, &answer).await?;
        Ok(answer)
    }

    /// Close the active attempt. Settles into `Ready` or `Idle` unless a
    /// negotiation task is still running, in which case settling waits for
    /// its result.
    async fn teardown(&mut self, settle_status: Option<String>) {
        self.transition(SessionState::Stopping, status::STOPPING);
        self.attempt += 1;
        if settle_status.is_some() {
            self.settle_status = settle_status;
        }

        if let Some(active) = self.active.take() {
            active.session.release().await;
        }
        self.clear_attempt_state();

        if let Some(attempt) = self.building {
            debug!("Waiting for attempt {} to finish before settling", attempt);
            return;
        }
        self.settle();
    }

    fn clear_attempt_state(&mut self) {
        self.remote_peer = None;
        self.description_sent = false;
        self.local_candidates.clear();
        self.remote_candidates.clear();
    }

    /// The link may already be down with its `Closed` event still queued,
    /// so a lost link counts as channel loss too.
    fn settle(&mut self) {
        let settle_status = self.settle_status.take();
        if self.channel.is_connected() {
            self.channel_lost = false;
            let text = settle_status.unwrap_or_else(|| status::READY.to_string());
            self.transition(SessionState::Ready, text);
        } else if self.channel_lost || self.channel.link_lost() {
            self.after_channel_loss();
        } else {
            self.transition(SessionState::Idle, status::IDLE);
        }
    }

    // ------------------------------------------------------------------------
    // Peer connection
    // ------------------------------------------------------------------------

    async fn on_peer_event(&mut self, attempt: u64, event: PeerEvent) {
        if attempt != self.attempt {
            debug!("Dropping peer event from stale attempt {}", attempt);
            return;
        }

        match event {
            PeerEvent::LocalCandidate(candidate) => {
                if self.description_sent {
                    self.send(SignalingMessage::ice_candidate(candidate));
                } else {
                    self.local_candidates.push(candidate);
                }
            }
            PeerEvent::State(PeerConnectionState::Connected) => match self.state {
                SessionState::Negotiating if self.active.is_some() => {
                    self.transition(SessionState::Streaming, status::STREAMING);
                }
                SessionState::Streaming => self.set_status(status::STREAMING),
                _ => {}
            },
            PeerEvent::State(state @ (PeerConnectionState::Disconnected | PeerConnectionState::Failed)) => {
                if self.state.is_active() {
                    warn!("Peer connection {:?}, tearing down", state);
                    self.teardown(Some(status::PEER_LOST.to_string())).await;
                }
            }
            PeerEvent::State(state) => debug!("Peer connection state {:?}", state),
        }
    }

    // ------------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------------

    fn transition(&mut self, to: SessionState, status: impl Into<String>) {
        if self.state != to {
            info!("Session {} -> {}", self.state, to);
        }
        self.state = to;
        self.set_status(status);
    }

    fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        let state = self.state;
        let connected = self.channel.is_connected();
        self.snapshot.send_modify(|s| {
            s.state = state;
            s.status = status;
            s.connected = connected;
            s.streaming = state == SessionState::Streaming;
        });
    }

    fn refresh(&self) {
        let connected = self.channel.is_connected();
        self.snapshot.send_if_modified(|s| {
            let changed = s.connected != connected;
            s.connected = connected;
            changed
        });
    }

    fn fail(&mut self, error: SessionError) {
        error!("Session error: {}", error);
        self.transition(SessionState::Error, error.status_text());
    }
}

// ============================================================================
// Routed messages
// ============================================================================

#[async_trait]
impl MessageHandler for SessionController {
    async fn on_offer(&mut self, sdp: String, sender: Option<ClientId>) {
        if self.config.variant == SessionVariant::SendOnly {
            warn!("Inbound offer ignored by send-only session");
            return;
        }
        let sender = match sender {
            Some(sender) => sender,
            None => {
                warn!("Offer without sender dropped");
                return;
            }
        };

        if self.state == SessionState::Ready && !self.has_attempt() {
            info!("Incoming call from {}", sender);
            self.begin_attempt(Some(sender), Some(sdp), status::ANSWERING);
            return;
        }

        let same_peer = self.remote_peer.as_ref() == Some(&sender);
        if self.state.is_active() && same_peer && self.active.is_some() {
            info!("Renegotiation offer from {}", sender);
            match self.answer_on_active(&sdp).await {
                Ok(answer) => {
                    let encoding = self.config.variant.sdp_encoding();
                    self.send(SignalingMessage::description(SdpKind::Answer, answer, encoding));
                }
                Err(e) => {
                    error!("Renegotiation failed: {}", e);
                    self.teardown(Some(e.status_text())).await;
                }
            }
            return;
        }

        warn!("Busy in state {}, offer from {} dropped", self.state, sender);
    }

    async fn on_answer(&mut self, sdp: String) {
        let expected = self.state == SessionState::Negotiating
            && matches!(&self.active, Some(a) if !a.answerer && !a.remote_applied);
        if !expected {
            warn!("Unexpected answer in state {} dropped", self.state);
            return;
        }

        let applied = match self.active_handle() {
            Some(handle) => handle.set_remote_description(SdpKind::Answer, &sdp).await,
            None => return,
        };
        if let Err(e) = applied {
            error!("Failed to apply answer: {}", e);
            self.teardown(Some(e.status_text())).await;
            return;
        }

        if let Some(active) = self.active.as_mut() {
            active.remote_applied = true;
        }
        self.flush_remote_candidates().await;
        self.transition(SessionState::Streaming, status::STREAM_STARTING);
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidateInfo) {
        if matches!(&self.active, Some(a) if a.remote_applied) {
            self.apply_remote_candidate(&candidate).await;
            return;
        }

        if !self.has_attempt() || self.state == SessionState::Stopping {
            warn!("ICE candidate without an active peer connection dropped");
            return;
        }
        if self.remote_candidates.len() >= self.config.early_candidate_limit {
            warn!(
                "Early candidate queue full ({}), candidate dropped",
                self.config.early_candidate_limit
            );
            return;
        }
        debug!("Queued early remote candidate");
        self.remote_candidates.push_back(candidate);
    }

    async fn on_server_response(&mut self, text: String) {
        info!("Server: {}", text);
        self.snapshot.send_modify(|s| s.server_messages.push(text));
    }

    async fn on_remote_error(&mut self, text: String) {
        let e = SessionError::Remote(text);
        warn!("{}", e);
        if self.state == SessionState::Negotiating {
            self.teardown(Some(e.status_text())).await;
        } else {
            self.set_status(e.status_text());
        }
    }
}
