//! Local media: capture constraints, the local track set and the
//! collaborator traits for microphone capture and permissions.

pub mod permission;

pub use permission::*;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::Result;

/// Opus clock rate for the outgoing microphone track
pub const OPUS_CLOCK_RATE: u32 = 48000;

/// Audio capture constraints
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub channel_count: u16,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            channel_count: 1,
        }
    }
}

/// Capture constraints passed to the media provider (audio only)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: AudioConstraints,
}

/// One captured microphone track.
///
/// The webrtc track is what gets attached to the peer connection; the
/// device feeder writes samples into it until the track is stopped.
#[derive(Clone)]
pub struct LocalAudioTrack {
    id: String,
    track: Arc<TrackLocalStaticSample>,
    live: Arc<AtomicBool>,
}

impl LocalAudioTrack {
    pub fn new(id: &str, track: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            id: id.to_string(),
            track,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Build an Opus track for the given constraints
    pub fn opus(id: &str, stream_id: &str, constraints: &AudioConstraints) -> Self {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: OPUS_CLOCK_RATE,
                channels: constraints.channel_count,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            id.to_owned(),
            stream_id.to_owned(),
        ));
        Self::new(id, track)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn track(&self) -> &Arc<TrackLocalStaticSample> {
        &self.track
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track. Idempotent.
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("Local track '{}' stopped", self.id);
        }
    }
}

/// The set of local tracks owned by one streaming attempt
#[derive(Clone, Default)]
pub struct LocalMediaTrackSet {
    tracks: Vec<LocalAudioTrack>,
}

impl LocalMediaTrackSet {
    pub fn new(tracks: Vec<LocalAudioTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[LocalAudioTrack] {
        &self.tracks
    }

    pub fn live_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Microphone capture capability (`getUserMedia`).
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<LocalMediaTrackSet>;
}

/// Capture provider that hands out Opus sample tracks.
///
/// The audio device itself is outside this crate: whoever drives the
/// microphone picks up the most recent track with [`OpusTrackCapture::current_track`]
/// and writes encoded samples into it while it is live.
#[derive(Default)]
pub struct OpusTrackCapture {
    next_id: AtomicU64,
    current: Mutex<Option<LocalAudioTrack>>,
}

impl OpusTrackCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently acquired track, if it is still live
    pub fn current_track(&self) -> Option<LocalAudioTrack> {
        self.current.lock().clone().filter(|t| t.is_live())
    }
}

#[async_trait]
impl MediaCapture for OpusTrackCapture {
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<LocalMediaTrackSet> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let track = LocalAudioTrack::opus(&format!("mic-{}", n), "mic-uplink", &constraints.audio);
        *self.current.lock() = Some(track.clone());
        Ok(LocalMediaTrackSet::new(vec![track]))
    }
}
