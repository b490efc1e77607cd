//! One negotiation attempt.
//!
//! Building a peer connection takes several suspension points, so it runs
//! as its own task and reports back through the session event queue. The
//! result is tagged with the attempt id; the controller discards it if the
//! attempt was cancelled meanwhile.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc;

use super::{PeerEvent, SessionEvent};
use crate::error::{Result, SessionError};
use crate::ice::IceServerConfig;
use crate::media::{LocalMediaTrackSet, MediaCapture, MediaConstraints};
use crate::peer::{
    IceCandidateInfo, OfferConstraints, PeerConnectionState, PeerConnector, PeerHandle, PeerOptions, SdpKind,
};

/// The peer handle and local tracks owned by one attempt.
///
/// Call [`PeerSession::release`] to close them. Dropping an unreleased
/// session stops the tracks at once and hands the handle close to the
/// runtime, since async cleanup can't happen in drop.
pub struct PeerSession {
    handle: Option<Box<dyn PeerHandle>>,
    tracks: Option<LocalMediaTrackSet>,
}

impl PeerSession {
    fn new(handle: Box<dyn PeerHandle>) -> Self {
        Self {
            handle: Some(handle),
            tracks: None,
        }
    }

    pub fn handle(&self) -> Option<&dyn PeerHandle> {
        self.handle.as_deref()
    }

    /// Close the handle, then stop the tracks
    pub async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.close().await {
                warn!("Error closing peer connection: {}", e);
            }
        }
        if let Some(tracks) = self.tracks.take() {
            tracks.stop_all();
        }
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        if let Some(tracks) = self.tracks.take() {
            tracks.stop_all();
        }
        if let Some(handle) = self.handle.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = handle.close().await {
                            warn!("Error closing dropped peer connection: {}", e);
                        }
                    });
                }
                Err(_) => warn!("Peer connection dropped outside a runtime, not closed"),
            }
        }
    }
}

/// A negotiated-locally attempt, ready for its description to be sent
pub struct Prepared {
    pub session: PeerSession,
    pub kind: SdpKind,
    pub local_sdp: String,
}

/// Everything the build task needs, detached from the controller
pub(crate) struct BuildJob {
    pub attempt: u64,
    /// Set when answering an inbound offer
    pub remote_offer: Option<String>,
    pub ice_servers: Vec<IceServerConfig>,
    pub options: PeerOptions,
    pub constraints: MediaConstraints,
    pub offer_constraints: OfferConstraints,
    pub peers: Arc<dyn PeerConnector>,
    pub media: Arc<dyn MediaCapture>,
    pub events: mpsc::UnboundedSender<SessionEvent>,
}

impl BuildJob {
    pub async fn run(self) {
        let attempt = self.attempt;
        let events = self.events.clone();
        let result = self.build().await;
        if events.send(SessionEvent::BuildComplete { attempt, result }).is_err() {
            // Controller is gone; dropping the result releases it
            debug!("Negotiation {} finished after the session ended", attempt);
        }
    }

    async fn build(self) -> Result<Prepared> {
        let handle = self.peers.create(&self.ice_servers, &self.options).await?;

        let attempt = self.attempt;
        let tx = self.events.clone();
        handle.on_ice_candidate(Arc::new(move |candidate: IceCandidateInfo| {
            let _ = tx.send(SessionEvent::Peer {
                attempt,
                event: PeerEvent::LocalCandidate(candidate),
            });
        }));
        let tx = self.events.clone();
        handle.on_connection_state_change(Arc::new(move |state: PeerConnectionState| {
            let _ = tx.send(SessionEvent::Peer {
                attempt,
                event: PeerEvent::State(state),
            });
        }));

        let mut session = PeerSession::new(handle);
        match self.negotiate(&mut session).await {
            Ok((kind, local_sdp)) => Ok(Prepared {
                session,
                kind,
                local_sdp,
            }),
            Err(e) => {
                session.release().await;
                Err(e)
            }
        }
    }

    async fn negotiate(&self, session: &mut PeerSession) -> Result<(SdpKind, String)> {
        let tracks = self.media.get_user_media(&self.constraints).await?;
        let tracks = session.tracks.insert(tracks);
        let handle = match session.handle.as_deref() {
            Some(handle) => handle,
            None => return Err(SessionError::PeerConnection("handle already released".into())),
        };

        for track in tracks.tracks() {
            handle.add_local_track(track).await?;
        }

        let (kind, sdp) = match &self.remote_offer {
            None => (SdpKind::Offer, handle.create_offer(self.offer_constraints).await?),
            Some(offer) => {
                handle.set_remote_description(SdpKind::Offer, offer).await?;
                (SdpKind::Answer, handle.create_answer().await?)
            }
        };
        handle.set_local_description(kind, &sdp).await?;

        debug!("Attempt {}: local {} ready", self.attempt, kind.as_str());
        Ok((kind, sdp))
    }
}
