//! VP8 encoder adapter
//!
//! The codec itself is opaque ([`FrameEncoder`]). The adapter runs it on a
//! dedicated thread between two bounded queues: raw frames in, encoded
//! payloads out.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::frame::{i420_frame_size, VideoFrame};
use crate::config::EncoderTuning;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to create encoder: {0}")]
    Create(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },
    #[error("Encoder worker error: {0}")]
    Worker(String),
}

/// Encoder configuration for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    /// Target frame rate
    pub fps: u32,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Speed/quality trade-off
    pub speed: u32,
    /// Relative weight of the Y, U and V planes
    pub plane_weights: [u32; 3],
    /// Target size of the Y, U and V planes
    pub plane_sizes: [usize; 3],
}

impl EncoderConfig {
    pub fn new(width: u32, height: u32, tuning: &EncoderTuning) -> Self {
        let plane = width as usize * height as usize;
        Self {
            width,
            height,
            fps: tuning.fps,
            bitrate_kbps: tuning.bitrate_kbps,
            speed: tuning.speed,
            plane_weights: [1, 1, 1],
            plane_sizes: [plane, plane, plane],
        }
    }

    /// Expected size of one raw I420 input frame
    pub fn frame_size(&self) -> usize {
        i420_frame_size(self.width, self.height)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// An opaque VP8 codec instance
///
/// Lives on the encoder thread for its whole life, so it doesn't need to be
/// `Send`.
pub trait FrameEncoder {
    /// Encode one raw frame into zero or more payloads
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Bytes>, EncoderError>;
}

/// Builds codec instances
pub trait EncoderFactory: Send + Sync {
    fn create(&self, config: &EncoderConfig) -> Result<Box<dyn FrameEncoder>, EncoderError>;
}

/// A running encoder with bounded input and output queues
pub struct EncoderAdapter {
    config: EncoderConfig,
    input: Mutex<Option<mpsc::Sender<VideoFrame>>>,
    output: Mutex<Option<mpsc::Receiver<Bytes>>>,
    input_capacity: usize,
    frames_encoded: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EncoderAdapter {
    /// Start the encoder thread and build the codec on it
    ///
    /// Returns once the codec exists, or with the factory's error.
    pub async fn spawn(
        factory: Arc<dyn EncoderFactory>,
        config: EncoderConfig,
        input_capacity: usize,
        output_capacity: usize,
    ) -> Result<Self, EncoderError> {
        let (input_tx, input_rx) = mpsc::channel::<VideoFrame>(input_capacity);
        let (output_tx, output_rx) = mpsc::channel::<Bytes>(output_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();
        let frames_encoded = Arc::new(AtomicU64::new(0));

        let worker_config = config.clone();
        let counter = frames_encoded.clone();
        let worker = thread::Builder::new()
            .name("vp8-encoder".to_owned())
            .spawn(move || {
                let codec = match factory.create(&worker_config) {
                    Ok(codec) => {
                        let _ = ready_tx.send(Ok(()));
                        codec
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_worker(codec, input_rx, output_tx, counter);
            })
            .map_err(|e| EncoderError::Worker(format!("Failed to spawn encoder thread: {}", e)))?;

        ready_rx
            .await
            .map_err(|_| EncoderError::Worker("Encoder thread exited during setup".to_owned()))??;

        tracing::info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate_kbps = config.bitrate_kbps,
            "VP8 encoder started"
        );

        Ok(Self {
            config,
            input: Mutex::new(Some(input_tx)),
            output: Mutex::new(Some(output_rx)),
            input_capacity,
            frames_encoded,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Sender for the raw frame queue, `None` once released
    pub fn input(&self) -> Option<mpsc::Sender<VideoFrame>> {
        self.input.lock().clone()
    }

    /// Take the encoded payload queue (only the first caller gets it)
    pub fn take_output(&self) -> Option<mpsc::Receiver<Bytes>> {
        self.output.lock().take()
    }

    pub fn input_capacity(&self) -> usize {
        self.input_capacity
    }

    /// Frames the codec has accepted so far
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded.load(Ordering::Relaxed)
    }

    /// Whether the encoder thread has exited
    pub fn is_finished(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(true, |worker| worker.is_finished())
    }

    /// Close the queues; the thread finishes the frame in hand and exits
    pub fn release(&self) {
        let had_input = self.input.lock().take().is_some();
        self.output.lock().take();
        self.worker.lock().take();
        if had_input {
            tracing::info!("VP8 encoder released");
        }
    }
}

impl Drop for EncoderAdapter {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_worker(
    mut codec: Box<dyn FrameEncoder>,
    mut input: mpsc::Receiver<VideoFrame>,
    output: mpsc::Sender<Bytes>,
    counter: Arc<AtomicU64>,
) {
    while let Some(frame) = input.blocking_recv() {
        match codec.encode(&frame) {
            Ok(payloads) => {
                counter.fetch_add(1, Ordering::Relaxed);
                for payload in payloads {
                    if output.blocking_send(payload).is_err() {
                        tracing::debug!("Encoder output closed, stopping worker");
                        return;
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to encode frame: {}", e),
        }
    }
    tracing::debug!("Encoder input closed, stopping worker");
}
