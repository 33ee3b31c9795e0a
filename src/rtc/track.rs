//! Outbound VP8 video track

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// RTP clock rate for VP8 is 90000 Hz
pub const VP8_CLOCK_RATE: u32 = 90000;

/// One encoded payload ready for the track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    pub data: Bytes,
    /// Number of frames the payload covers
    pub samples: u32,
}

impl MediaSample {
    /// A payload covering exactly one frame
    pub fn single(data: Bytes) -> Self {
        Self { data, samples: 1 }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("Sample queue is full")]
    Full,
    #[error("Track is closed")]
    Closed,
}

/// Bounded, non-blocking entry point of an outbound track
pub trait SampleSink: Send + Sync {
    /// Queue a sample if there is room
    fn try_push(&self, sample: MediaSample) -> Result<(), PushError>;

    fn capacity(&self) -> usize;
}

/// VP8 sample track with a bounded queue drained by a writer task
pub struct Vp8SampleTrack {
    track: Arc<TrackLocalStaticSample>,
    samples: mpsc::Sender<MediaSample>,
    capacity: usize,
}

impl Vp8SampleTrack {
    /// Create the track and start its writer task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(track_id: &str, stream_id: &str, fps: u32, capacity: usize) -> Self {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: VP8_CLOCK_RATE,
                ..Default::default()
            },
            track_id.to_owned(),
            stream_id.to_owned(),
        ));

        let (tx, rx) = mpsc::channel(capacity);
        let frame_duration = Duration::from_secs(1) / fps.max(1);
        tokio::spawn(write_samples(track.clone(), rx, frame_duration));

        Self {
            track,
            samples: tx,
            capacity,
        }
    }

    /// Get the underlying track for adding to peer connection
    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }
}

impl SampleSink for Vp8SampleTrack {
    fn try_push(&self, sample: MediaSample) -> Result<(), PushError> {
        self.samples.try_send(sample).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

async fn write_samples(
    track: Arc<TrackLocalStaticSample>,
    mut samples: mpsc::Receiver<MediaSample>,
    frame_duration: Duration,
) {
    while let Some(sample) = samples.recv().await {
        let sample = Sample {
            data: sample.data,
            duration: frame_duration * sample.samples,
            ..Default::default()
        };
        if let Err(e) = track.write_sample(&sample).await {
            tracing::warn!("Failed to write video sample: {}", e);
        }
    }
    tracing::debug!("Video track writer stopped");
}
