//! Session lifecycle
//!
//! A [`Session`] answers a remote offer, waits for ICE to connect, then runs
//! the streaming pipeline until it is stopped or the connection drops.
//!
//! ```text
//! Idle --start--> Connecting --ICE connected--> Streaming
//!   ^                 |                             |
//!   +------ stop / ICE failed|closed|disconnected --+
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::config::SessionConfig;
use crate::pipeline::{PipelineHandle, PipelineStats, PipelineStatsSnapshot};
use crate::rtc::{ConnectionState, PeerLink, SampleSink, SignalingError, TrackSpec, Transport};
use crate::video::{EncoderAdapter, EncoderConfig, EncoderError, EncoderFactory, FrameSender, VideoFrame};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

/// One outbound VP8 stream over one peer connection
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    encoders: Arc<dyn EncoderFactory>,
    connected: Arc<AtomicBool>,
    /// Bumped by every start; observers of older connections are ignored
    generation: AtomicU64,
    /// Serializes start and stop
    lifecycle: AsyncMutex<()>,
    connection: Mutex<Option<Arc<dyn PeerLink>>>,
    encoder: Mutex<Option<Arc<EncoderAdapter>>>,
    track: Mutex<Option<Arc<dyn SampleSink>>>,
    pipeline: Mutex<Option<PipelineHandle>>,
    frames_tx: mpsc::Sender<VideoFrame>,
    frames_rx: Arc<AsyncMutex<mpsc::Receiver<VideoFrame>>>,
    stats: Arc<PipelineStats>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        encoders: Arc<dyn EncoderFactory>,
    ) -> Self {
        let (frames_tx, frames_rx) = mpsc::channel(config.frame_queue_capacity.max(1));

        Self {
            inner: Arc::new(SessionInner {
                config,
                transport,
                encoders,
                connected: Arc::new(AtomicBool::new(false)),
                generation: AtomicU64::new(0),
                lifecycle: AsyncMutex::new(()),
                connection: Mutex::new(None),
                encoder: Mutex::new(None),
                track: Mutex::new(None),
                pipeline: Mutex::new(None),
                frames_tx,
                frames_rx: Arc::new(AsyncMutex::new(frames_rx)),
                stats: Arc::new(PipelineStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Producer handle for raw I420 frames
    pub fn frame_sender(&self) -> FrameSender {
        FrameSender::new(self.inner.frames_tx.clone())
    }

    /// Answer `remote_offer` and prepare to stream `width`x`height` frames
    ///
    /// A connected session is stopped first, then left alone for the
    /// configured cooldown so the old transport can release its sockets.
    /// On failure everything built so far is torn down again.
    pub async fn start(&self, remote_offer: &str, width: u32, height: u32) -> Result<String, SessionError> {
        if width == 0 || height == 0 {
            return Err(SessionError::InvalidDimensions { width, height });
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if self.inner.connected.load(Ordering::Acquire) {
            tracing::info!("Session already connected, restarting");
            self.inner.shutdown().await;
            tokio::time::sleep(self.inner.config.restart_cooldown()).await;
        } else if self.inner.has_resources() {
            // Started before but never connected
            self.inner.shutdown().await;
        }

        tracing::info!(width, height, generation, "=== Starting session ===");

        match self.inner.establish(remote_offer, width, height, generation).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                tracing::error!("Failed to start session: {}", e);
                self.inner.shutdown().await;
                Err(e)
            }
        }
    }

    /// Tear down the pipeline, encoder and connection
    ///
    /// Safe to call at any time, any number of times. Returns once both
    /// pipeline loops have exited.
    pub async fn stop(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.shutdown().await;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Whether the forwarding loops are running
    pub fn is_streaming(&self) -> bool {
        self.inner.pipeline.lock().is_some()
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl SessionInner {
    fn has_resources(&self) -> bool {
        self.encoder.lock().is_some() || self.connection.lock().is_some()
    }

    async fn establish(
        self: &Arc<Self>,
        remote_offer: &str,
        width: u32,
        height: u32,
        generation: u64,
    ) -> Result<String, SessionError> {
        let encoder_config = EncoderConfig::new(width, height, &self.config.encoder);
        let encoder = EncoderAdapter::spawn(
            self.encoders.clone(),
            encoder_config,
            self.config.encoder_input_capacity.max(1),
            self.config.encoder_output_capacity.max(1),
        )
        .await?;
        *self.encoder.lock() = Some(Arc::new(encoder));

        let connection = self.transport.connect(&self.config.ice_servers).await?;
        *self.connection.lock() = Some(connection.clone());

        let track = connection
            .add_video_track(&TrackSpec {
                track_id: self.config.track_id.clone(),
                stream_id: self.config.stream_id.clone(),
                fps: self.config.encoder.fps,
                capacity: self.config.sample_queue_capacity.max(1),
            })
            .await?;
        *self.track.lock() = Some(track);

        let observer: Weak<SessionInner> = Arc::downgrade(self);
        connection.on_state_change(Arc::new(move |state: ConnectionState| {
            if let Some(inner) = observer.upgrade() {
                inner.on_connection_state(generation, state);
            }
        }));

        connection.answer(remote_offer).await
    }

    fn on_connection_state(self: &Arc<Self>, generation: u64, state: ConnectionState) {
        tracing::info!("ICE Connection State has changed: {}", state);

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "Ignoring state change of a previous connection");
            return;
        }

        match state {
            ConnectionState::Connected => {
                if self.encoder.lock().is_none() {
                    tracing::warn!("Connected without an encoder, ignoring");
                    return;
                }
                self.connected.store(true, Ordering::Release);
                tracing::info!("ConnectionStateConnected");
                self.launch_pipeline();
            }
            state if state.is_terminal() => {
                self.connected.store(false, Ordering::Release);
                let inner = self.clone();
                tokio::spawn(async move {
                    let _lifecycle = inner.lifecycle.lock().await;
                    if inner.generation.load(Ordering::SeqCst) == generation {
                        inner.shutdown().await;
                    }
                });
            }
            _ => {}
        }
    }

    fn launch_pipeline(&self) {
        let mut pipeline = self.pipeline.lock();
        if pipeline.is_some() {
            return;
        }

        let Some(encoder) = self.encoder.lock().clone() else {
            return;
        };
        let Some(track) = self.track.lock().clone() else {
            tracing::warn!("Connected without a video track, not streaming");
            return;
        };
        let (Some(input), Some(output)) = (encoder.input(), encoder.take_output()) else {
            tracing::warn!("Encoder queues already taken, not streaming");
            return;
        };

        *pipeline = Some(PipelineHandle::spawn(
            self.frames_rx.clone(),
            input,
            output,
            track,
            self.connected.clone(),
            self.stats.clone(),
        ));
    }

    /// Caller must hold the lifecycle lock
    async fn shutdown(&self) {
        // Flip first so the loops stop forwarding before anything is freed
        self.connected.store(false, Ordering::Release);

        let pipeline = self.pipeline.lock().take();
        if let Some(pipeline) = pipeline {
            pipeline.shutdown().await;
        }

        let encoder = self.encoder.lock().take();
        let track = self.track.lock().take();
        let connection = self.connection.lock().take();

        if encoder.is_none() && connection.is_none() {
            return;
        }

        tracing::info!("=== Stopping session ===");
        if let Some(encoder) = encoder {
            encoder.release();
        }
        drop(track);
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                tracing::warn!("{}", e);
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Release);
        if let Some(pipeline) = self.pipeline.get_mut().take() {
            pipeline.cancel();
        }
    }
}
