//! Streaming pipeline: inbound frames -> encoder -> video track
//!
//! Both loops are lossy. A full downstream queue means the item is
//! dropped and counted, never that the upstream producer waits.

use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::rtc::{MediaSample, PushError, SampleSink};
use crate::video::VideoFrame;

/// Every Nth forwarded sample is logged
const LOG_EVERY: u64 = 10;

/// Forward/drop counters, cumulative over the life of a session
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
    samples_forwarded: AtomicU64,
    samples_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
    pub samples_forwarded: u64,
    pub samples_dropped: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            samples_forwarded: self.samples_forwarded.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Running pipeline tasks and the token that stops them
pub(crate) struct PipelineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    pub(crate) fn spawn(
        frames: Arc<AsyncMutex<mpsc::Receiver<VideoFrame>>>,
        encoder_input: mpsc::Sender<VideoFrame>,
        encoded: mpsc::Receiver<Bytes>,
        sink: Arc<dyn SampleSink>,
        connected: Arc<AtomicBool>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        tracing::info!("Start streaming");
        let token = CancellationToken::new();

        let ingest = tokio::spawn(ingest(
            frames,
            encoder_input,
            connected.clone(),
            token.clone(),
            stats.clone(),
        ));
        let egress = tokio::spawn(egress(encoded, sink, connected, token.clone(), stats));

        Self {
            token,
            tasks: vec![ingest, egress],
        }
    }

    /// Cancel both loops without waiting for them
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel both loops and wait until they have exited
    pub(crate) async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("Pipeline task panicked: {}", e);
                }
            }
        }
        tracing::info!("Streaming stopped");
    }
}

/// Move raw frames from the session queue into the encoder
async fn ingest(
    frames: Arc<AsyncMutex<mpsc::Receiver<VideoFrame>>>,
    encoder_input: mpsc::Sender<VideoFrame>,
    connected: Arc<AtomicBool>,
    token: CancellationToken,
    stats: Arc<PipelineStats>,
) {
    let mut frames = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        frames = frames.lock() => frames,
    };

    while connected.load(Ordering::Acquire) {
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if !connected.load(Ordering::Acquire) {
            break;
        }

        match encoder_input.try_send(frame) {
            Ok(()) => {
                stats.frames_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Encoder input closed");
                break;
            }
        }
    }
    tracing::debug!("Ingest loop exited");
}

/// Move encoded payloads from the encoder onto the video track
async fn egress(
    mut encoded: mpsc::Receiver<Bytes>,
    sink: Arc<dyn SampleSink>,
    connected: Arc<AtomicBool>,
    token: CancellationToken,
    stats: Arc<PipelineStats>,
) {
    let mut index: u64 = 0;
    while connected.load(Ordering::Acquire) {
        let payload = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            payload = encoded.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        if !connected.load(Ordering::Acquire) {
            break;
        }

        if index % LOG_EVERY == 0 {
            tracing::debug!(len = payload.len(), index, "On frame");
        }
        index += 1;

        match sink.try_push(MediaSample::single(payload)) {
            Ok(()) => {
                stats.samples_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(PushError::Full) => {
                stats.samples_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(PushError::Closed) => {
                tracing::debug!("Video track closed");
                break;
            }
        }
    }
    tracing::debug!("Egress loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Sink with a fixed capacity that nobody drains
    struct StuckSink {
        capacity: usize,
        samples: Mutex<Vec<MediaSample>>,
    }

    impl SampleSink for StuckSink {
        fn try_push(&self, sample: MediaSample) -> Result<(), PushError> {
            let mut samples = self.samples.lock();
            if samples.len() >= self.capacity {
                return Err(PushError::Full);
            }
            samples.push(sample);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.capacity
        }
    }

    struct Fixture {
        frames_tx: mpsc::Sender<VideoFrame>,
        encoder_rx: mpsc::Receiver<VideoFrame>,
        encoded_tx: mpsc::Sender<Bytes>,
        sink: Arc<StuckSink>,
        connected: Arc<AtomicBool>,
        stats: Arc<PipelineStats>,
        handle: PipelineHandle,
    }

    fn fixture(encoder_capacity: usize, sink_capacity: usize) -> Fixture {
        let (frames_tx, frames_rx) = mpsc::channel(16);
        let (encoder_tx, encoder_rx) = mpsc::channel(encoder_capacity);
        let (encoded_tx, encoded_rx) = mpsc::channel(16);
        let sink = Arc::new(StuckSink {
            capacity: sink_capacity,
            samples: Mutex::new(Vec::new()),
        });
        let connected = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(PipelineStats::default());

        let handle = PipelineHandle::spawn(
            Arc::new(AsyncMutex::new(frames_rx)),
            encoder_tx,
            encoded_rx,
            sink.clone(),
            connected.clone(),
            stats.clone(),
        );

        Fixture {
            frames_tx,
            encoder_rx,
            encoded_tx,
            sink,
            connected,
            stats,
            handle,
        }
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_full_encoder_drops_frames() {
        let f = fixture(2, 8);

        for i in 0..5u8 {
            f.frames_tx.send(VideoFrame::new(vec![i])).await.unwrap();
        }

        let stats = f.stats.clone();
        wait_for(|| {
            let s = stats.snapshot();
            s.frames_forwarded + s.frames_dropped == 5
        })
        .await;

        let snapshot = f.stats.snapshot();
        assert_eq!(snapshot.frames_forwarded, 2);
        assert_eq!(snapshot.frames_dropped, 3);

        // The oldest frames made it, in order
        let mut encoder_rx = f.encoder_rx;
        assert_eq!(encoder_rx.recv().await.unwrap().data.as_ref(), &[0]);
        assert_eq!(encoder_rx.recv().await.unwrap().data.as_ref(), &[1]);

        f.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_sink_drops_samples_in_order() {
        let f = fixture(2, 3);

        for i in 0..6u8 {
            f.encoded_tx.send(Bytes::from(vec![i])).await.unwrap();
        }

        let stats = f.stats.clone();
        wait_for(|| {
            let s = stats.snapshot();
            s.samples_forwarded + s.samples_dropped == 6
        })
        .await;

        let samples = f.sink.samples.lock().clone();
        assert_eq!(samples.len(), 3);
        let order: Vec<u8> = samples.iter().map(|s| s.data[0]).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(samples.iter().all(|s| s.samples == 1));
        assert_eq!(f.stats.snapshot().samples_dropped, 3);

        f.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_parked_loops() {
        let f = fixture(2, 2);

        // No data ever arrives; both loops are parked on their reads
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::timeout(Duration::from_secs(1), f.handle.shutdown())
            .await
            .expect("loops should exit on cancellation");
    }

    #[tokio::test]
    async fn test_cleared_flag_stops_forwarding() {
        let f = fixture(4, 4);

        f.connected.store(false, Ordering::Release);
        f.frames_tx.send(VideoFrame::new(vec![1])).await.unwrap();
        f.encoded_tx.send(Bytes::from_static(b"x")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let snapshot = f.stats.snapshot();
        assert_eq!(snapshot.frames_forwarded, 0);
        assert_eq!(snapshot.samples_forwarded, 0);

        f.handle.shutdown().await;
    }
}
