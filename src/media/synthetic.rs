use crate::error::CaptureError;
use crate::media::capture::{CaptureTrack, DeviceCapture, MediaHandle};
use crate::utils::random_id;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Opus DTX silence frame
static OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];

/// 16x16 VP8 key frame, black
static VP8_BLANK: [u8; 32] = [
    0x50, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x10, 0x00, 0x10, 0x00, 0x00, 0x47, 0x08, 0x85, 0x85,
    0x88, 0x85, 0x84, 0x88, 0x02, 0x02, 0x00, 0x0c, 0x0d, 0x60, 0x00, 0xfe, 0xff, 0xab, 0x50,
    0x80, 0x00,
];

/// Capture backend that produces silent audio and blank video.
///
/// Used where no physical devices exist (headless runners, CI); it always
/// grants both streams.
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    pub audio_frame: Duration,
    pub video_frame: Duration,
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self {
            audio_frame: Duration::from_millis(20),
            video_frame: Duration::from_millis(33),
        }
    }
}

#[async_trait]
impl DeviceCapture for SyntheticCapture {
    async fn acquire(&self) -> Result<MediaHandle, CaptureError> {
        let stream_id = format!("capture-{}", random_id());
        let handle = MediaHandle::from_tracks(vec![
            CaptureTrack::opus(&stream_id),
            CaptureTrack::vp8(&stream_id),
        ])?;

        let audio = handle.tracks()[0].sample_track();
        let video = handle.tracks()[1].sample_track();
        let feeder = tokio::spawn(feed(audio, video, self.audio_frame, self.video_frame));

        tracing::info!(target: "media", stream_id = %stream_id, "synthetic capture started");
        Ok(handle.with_feeder(feeder))
    }
}

async fn feed(
    audio: Arc<TrackLocalStaticSample>,
    video: Arc<TrackLocalStaticSample>,
    audio_frame: Duration,
    video_frame: Duration,
) {
    let mut audio_tick = interval(audio_frame);
    let mut video_tick = interval(video_frame);
    audio_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    video_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let (track, sample) = tokio::select! {
            _ = audio_tick.tick() => (&audio, Sample {
                data: Bytes::from_static(&OPUS_SILENCE),
                duration: audio_frame,
                ..Default::default()
            }),
            _ = video_tick.tick() => (&video, Sample {
                data: Bytes::from_static(&VP8_BLANK),
                duration: video_frame,
                ..Default::default()
            }),
        };
        if let Err(err) = track.write_sample(&sample).await {
            tracing::trace!(target: "media", error = %err, "dropped synthetic sample");
        }
    }
}
