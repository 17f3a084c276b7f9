use crate::error::CaptureError;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// One live capture track, ready to be bound to a peer connection.
#[derive(Clone)]
pub struct CaptureTrack {
    kind: TrackKind,
    track: Arc<TrackLocalStaticSample>,
}

impl CaptureTrack {
    pub fn new(kind: TrackKind, track: Arc<TrackLocalStaticSample>) -> Self {
        Self { kind, track }
    }

    /// Opus audio track (48 kHz, stereo capability as negotiated by the engine)
    pub fn opus(stream_id: &str) -> Self {
        Self::with_codec(TrackKind::Audio, MIME_TYPE_OPUS, stream_id)
    }

    pub fn vp8(stream_id: &str) -> Self {
        Self::with_codec(TrackKind::Video, MIME_TYPE_VP8, stream_id)
    }

    fn with_codec(kind: TrackKind, mime_type: &str, stream_id: &str) -> Self {
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            kind.to_string(),
            stream_id.to_owned(),
        );
        Self::new(kind, Arc::new(track))
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        self.track.id()
    }

    pub fn sample_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.track)
    }

    pub fn track_local(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.track) as Arc<dyn TrackLocal + Send + Sync>
    }
}

impl fmt::Debug for CaptureTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureTrack")
            .field("kind", &self.kind)
            .field("id", &self.id())
            .finish()
    }
}

/// Observes whether a [`MediaHandle`] has been released, without owning it.
#[derive(Debug, Clone)]
pub struct ReleaseTracker(Arc<AtomicBool>);

impl ReleaseTracker {
    pub fn is_released(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ownership of the live audio and video tracks of one session attempt.
///
/// Releasing stops every feeder task; it is idempotent and also runs on drop,
/// so a handle abandoned mid-handshake never keeps a device busy.
pub struct MediaHandle {
    tracks: Vec<CaptureTrack>,
    feeders: Vec<JoinHandle<()>>,
    released: Arc<AtomicBool>,
}

impl MediaHandle {
    /// Both an audio and a video track are required; partial grants fail.
    pub fn from_tracks(tracks: Vec<CaptureTrack>) -> Result<Self, CaptureError> {
        for kind in [TrackKind::Audio, TrackKind::Video] {
            if !tracks.iter().any(|t| t.kind() == kind) {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "no {kind} track granted"
                )));
            }
        }
        Ok(Self {
            tracks,
            feeders: Vec::new(),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Ties a task producing samples to the lifetime of this handle
    pub fn with_feeder(mut self, feeder: JoinHandle<()>) -> Self {
        self.feeders.push(feeder);
        self
    }

    pub fn tracks(&self) -> &[CaptureTrack] {
        &self.tracks
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn release_tracker(&self) -> ReleaseTracker {
        ReleaseTracker(Arc::clone(&self.released))
    }

    pub fn release(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        for feeder in self.feeders.drain(..) {
            feeder.abort();
        }
        tracing::debug!(target: "media", tracks = self.tracks.len(), "capture released");
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("tracks", &self.tracks)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Source of local audio+video capture.
#[async_trait]
pub trait DeviceCapture: Send + Sync {
    /// Requests simultaneous audio and video capture.
    async fn acquire(&self) -> Result<MediaHandle, CaptureError>;

    /// Stops all tracks of `handle`. Safe to call repeatedly.
    fn release(&self, handle: &mut MediaHandle) {
        handle.release();
    }
}
