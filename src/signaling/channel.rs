//! Signaling control channel.
//!
//! Owns one transport link at a time. Inbound frames are parsed and
//! reported through the event sink in delivery order; failures never
//! cross the boundary as errors but as [`ChannelEventKind::Error`] /
//! [`ChannelEventKind::Closed`] events.
//!
//! Each link gets a new epoch so the owner can tell events of a replaced
//! link from current ones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::message::SignalingMessage;
use super::ws_transport::{OutboundFrame, SignalingTransport, TransportFrame};
use crate::error::Result;

/// Channel events, tagged with the epoch of the link that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub epoch: u64,
    pub kind: ChannelEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEventKind {
    Opened,
    Message(SignalingMessage),
    /// Unexpected close; an explicit `close()` never reports one.
    Closed { reason: Option<String> },
    Error(String),
    /// A scheduled reconnect is due
    ReconnectDue { attempt: u32 },
}

/// Receives channel events
pub type ChannelEventSink = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// Delay between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before attempt `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Reconnection policy. Disabled (zero attempts) by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            backoff: Backoff::Fixed(Duration::from_secs(3)),
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before `attempt`, or `None` once attempts are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.backoff.delay(attempt))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Connected link state
struct Link {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    connected: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

/// The signaling control channel
pub struct SignalingChannel {
    transport: Arc<dyn SignalingTransport>,
    url: String,
    subprotocol: Option<String>,
    sink: ChannelEventSink,
    policy: ReconnectPolicy,
    link: Option<Link>,
    epoch: u64,
    reconnect_attempt: u32,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl SignalingChannel {
    pub fn new(
        transport: Arc<dyn SignalingTransport>,
        url: &str,
        subprotocol: Option<&str>,
        policy: ReconnectPolicy,
        sink: ChannelEventSink,
    ) -> Self {
        Self {
            transport,
            url: url.to_string(),
            subprotocol: subprotocol.map(str::to_string),
            sink,
            policy,
            link: None,
            epoch: 0,
            reconnect_attempt: 0,
            reconnect_timer: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Epoch of the current (or last) link
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The externally observable "connected" flag
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .map(|l| l.connected.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// A link is held but the transport reported it closed. Stays true
    /// until the link is retired or replaced, even if the `Closed` event
    /// has not been handled yet.
    pub fn link_lost(&self) -> bool {
        self.link
            .as_ref()
            .map(|l| !l.connected.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Forget a lost link and move to a new epoch, so events still queued
    /// from it are recognised as stale. Returns `false` if there was no
    /// lost link.
    pub fn retire_lost_link(&mut self) -> bool {
        if !self.link_lost() {
            return false;
        }
        self.drop_link(false);
        self.epoch += 1;
        debug!("Retired lost signaling link, now at epoch {}", self.epoch);
        true
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Open a new link, replacing any existing one.
    ///
    /// On success an `Opened` event is emitted before any message of the
    /// new link.
    pub async fn connect(&mut self) -> Result<()> {
        self.drop_link(false);
        self.epoch += 1;
        let epoch = self.epoch;

        let link = match self.transport.open(&self.url, self.subprotocol.as_deref()).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Signaling connect failed: {}", e);
                return Err(e);
            }
        };

        let connected = Arc::new(AtomicBool::new(true));
        self.reconnect_attempt = 0;
        (self.sink)(ChannelEvent {
            epoch,
            kind: ChannelEventKind::Opened,
        });

        let pump = tokio::spawn(pump_inbound(link.inbound, epoch, connected.clone(), self.sink.clone()));
        self.link = Some(Link {
            outbound: link.outbound,
            connected,
            pump,
        });
        Ok(())
    }

    /// Queue a message. Returns `false` (and emits an `Error` event) if
    /// there is no open link.
    pub fn send(&self, message: &SignalingMessage) -> bool {
        let text = match message.to_wire() {
            Ok(t) => t,
            Err(e) => {
                warn!("Dropping outbound message: {}", e);
                return false;
            }
        };

        let sent = match &self.link {
            Some(link) if link.connected.load(Ordering::SeqCst) => {
                link.outbound.send(OutboundFrame::Text(text)).is_ok()
            }
            _ => false,
        };

        if sent {
            debug!("Sent '{}' message", message.kind_name());
        } else {
            warn!("Signaling channel not connected, '{}' not sent", message.kind_name());
            (self.sink)(ChannelEvent {
                epoch: self.epoch,
                kind: ChannelEventKind::Error("not connected".to_string()),
            });
        }
        sent
    }

    /// Arm the next reconnect attempt per policy. Returns the delay, or
    /// `None` when the policy is disabled or exhausted.
    pub fn schedule_reconnect(&mut self) -> Option<(u32, Duration)> {
        let attempt = self.reconnect_attempt + 1;
        let delay = self.policy.delay_for(attempt)?;
        self.reconnect_attempt = attempt;

        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        let sink = self.sink.clone();
        let epoch = self.epoch;
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink(ChannelEvent {
                epoch,
                kind: ChannelEventKind::ReconnectDue { attempt },
            });
        }));

        info!("Signaling reconnect attempt {} in {:?}", attempt, delay);
        Some((attempt, delay))
    }

    /// Close the link on purpose. No `Closed` event is reported for it.
    pub fn close(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        self.reconnect_attempt = 0;
        self.drop_link(true);
    }

    fn drop_link(&mut self, send_close: bool) {
        if let Some(link) = self.link.take() {
            link.connected.store(false, Ordering::SeqCst);
            link.pump.abort();
            if send_close {
                let _ = link.outbound.send(OutboundFrame::Close);
            }
            info!("Signaling channel closed (epoch {})", self.epoch);
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn pump_inbound(
    mut inbound: mpsc::UnboundedReceiver<TransportFrame>,
    epoch: u64,
    connected: Arc<AtomicBool>,
    sink: ChannelEventSink,
) {
    let emit = |kind| sink(ChannelEvent { epoch, kind });

    while let Some(frame) = inbound.recv().await {
        match frame {
            TransportFrame::Text(text) => {
                if let Some(message) = SignalingMessage::parse(&text) {
                    emit(ChannelEventKind::Message(message));
                }
            }
            TransportFrame::Error(e) => {
                warn!("Signaling transport error: {}", e);
                emit(ChannelEventKind::Error(e));
            }
            TransportFrame::Closed(reason) => {
                connected.store(false, Ordering::SeqCst);
                warn!("Signaling channel closed: {}", reason.as_deref().unwrap_or("no reason"));
                emit(ChannelEventKind::Closed { reason });
                return;
            }
        }
    }

    // Transport dropped its end without a close frame
    if connected.swap(false, Ordering::SeqCst) {
        emit(ChannelEventKind::Closed { reason: None });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::MemoryTransport;
    use crate::signaling::message::{MessageBody, SdpEncoding};
    use crate::peer::SdpKind;
    use parking_lot::Mutex;

    fn collecting_sink() -> (ChannelEventSink, Arc<Mutex<Vec<ChannelEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let sink: ChannelEventSink = Arc::new(move |ev| events_clone.lock().push(ev));
        (sink, events)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_backoff_delays() {
        let fixed = ReconnectPolicy::fixed(2, Duration::from_secs(3));
        assert_eq!(fixed.delay_for(1), Some(Duration::from_secs(3)));
        assert_eq!(fixed.delay_for(2), Some(Duration::from_secs(3)));
        assert_eq!(fixed.delay_for(3), None);
        assert!(!ReconnectPolicy::default().is_enabled());
        assert_eq!(ReconnectPolicy::default().delay_for(1), None);

        let exp = Backoff::Exponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(4),
        };
        assert_eq!(exp.delay(1), Duration::from_millis(500));
        assert_eq!(exp.delay(3), Duration::from_secs(2));
        assert_eq!(exp.delay(10), Duration::from_secs(4));
        assert_eq!(exp.delay(64), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_connect_emits_opened_then_messages_in_order() {
        let transport = MemoryTransport::new();
        let (sink, events) = collecting_sink();
        let mut channel = SignalingChannel::new(
            Arc::new(transport.clone()),
            "wss://host/api/webrtc/ws/webrtc/client-x",
            Some("protoo"),
            ReconnectPolicy::disabled(),
            sink,
        );

        channel.connect().await.unwrap();
        assert!(channel.is_connected());
        assert_eq!(transport.opened_with(), vec![(channel.url().to_string(), Some("protoo".to_string()))]);

        transport.push_text(r#"{"type":"error","error":"first"}"#);
        transport.push_text("garbage");
        transport.push_text(r#"{"type":"server-response","data":{"message":"second"}}"#);
        settle().await;

        let events = events.lock().clone();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, ChannelEventKind::Opened);
        assert!(matches!(
            &events[1].kind,
            ChannelEventKind::Message(m) if matches!(m.body, MessageBody::Error { .. })
        ));
        assert!(matches!(
            &events[2].kind,
            ChannelEventKind::Message(m) if matches!(m.body, MessageBody::ServerResponse { .. })
        ));
        assert!(events.iter().all(|e| e.epoch == 1));
    }

    #[tokio::test]
    async fn test_send_without_link_reports_error_event() {
        let (sink, events) = collecting_sink();
        let channel = SignalingChannel::new(
            Arc::new(MemoryTransport::new()),
            "wss://host/ws",
            None,
            ReconnectPolicy::disabled(),
            sink,
        );
        let offer = SignalingMessage::description(SdpKind::Offer, "v=0".into(), SdpEncoding::Flat);
        assert!(!channel.send(&offer));
        assert!(matches!(events.lock()[0].kind, ChannelEventKind::Error(_)));
    }

    #[tokio::test]
    async fn test_remote_close_clears_flag_and_reports() {
        let transport = MemoryTransport::new();
        let (sink, events) = collecting_sink();
        let mut channel = SignalingChannel::new(
            Arc::new(transport.clone()),
            "wss://host/ws",
            None,
            ReconnectPolicy::disabled(),
            sink,
        );
        channel.connect().await.unwrap();
        transport.close_remote(Some("server restart"));
        settle().await;

        assert!(!channel.is_connected());
        assert!(channel.link_lost());
        let last = events.lock().last().cloned().unwrap();
        assert_eq!(
            last.kind,
            ChannelEventKind::Closed {
                reason: Some("server restart".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_retire_lost_link_moves_to_new_epoch() {
        let transport = MemoryTransport::new();
        let (sink, _events) = collecting_sink();
        let mut channel = SignalingChannel::new(
            Arc::new(transport.clone()),
            "wss://host/ws",
            None,
            ReconnectPolicy::disabled(),
            sink,
        );
        channel.connect().await.unwrap();
        assert!(!channel.link_lost());
        assert!(!channel.retire_lost_link());
        assert_eq!(channel.epoch(), 1);

        transport.close_remote(None);
        settle().await;
        assert!(channel.retire_lost_link());
        assert_eq!(channel.epoch(), 2);
        assert!(!channel.link_lost());
        assert!(!channel.retire_lost_link());

        // Explicit close leaves nothing to retire
        channel.connect().await.unwrap();
        channel.close();
        assert!(!channel.link_lost());
    }

    #[tokio::test]
    async fn test_explicit_close_is_silent() {
        let transport = MemoryTransport::new();
        let (sink, events) = collecting_sink();
        let mut channel = SignalingChannel::new(
            Arc::new(transport.clone()),
            "wss://host/ws",
            None,
            ReconnectPolicy::disabled(),
            sink,
        );
        channel.connect().await.unwrap();
        channel.close();
        settle().await;

        assert!(!channel.is_connected());
        assert_eq!(transport.sent_frames().last(), Some(&OutboundFrame::Close));
        assert!(events
            .lock()
            .iter()
            .all(|e| !matches!(e.kind, ChannelEventKind::Closed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_schedule_respects_policy() {
        let (sink, events) = collecting_sink();
        let mut channel = SignalingChannel::new(
            Arc::new(MemoryTransport::new()),
            "wss://host/ws",
            None,
            ReconnectPolicy::fixed(1, Duration::from_secs(3)),
            sink,
        );

        assert_eq!(channel.schedule_reconnect(), Some((1, Duration::from_secs(3))));
        assert_eq!(channel.schedule_reconnect(), None);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(events
            .lock()
            .iter()
            .any(|e| e.kind == ChannelEventKind::ReconnectDue { attempt: 1 }));
    }
}
