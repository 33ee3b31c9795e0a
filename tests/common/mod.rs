#![allow(dead_code)]

//! Hand-written collaborators for driving a `Session` without a network

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use yuvcast::rtc::{
    ConnectionState, MediaSample, PeerLink, PushError, SampleSink, StateHandler, TrackSpec,
    Transport,
};
use yuvcast::video::{EncoderConfig, EncoderError, EncoderFactory, FrameEncoder, VideoFrame};
use yuvcast::SessionError;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll `check` in real time until it holds
pub async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

// ============ TRANSPORT ============

#[derive(Default)]
pub struct MockTransport {
    pub fail_connect: bool,
    pub fail_track: bool,
    pub fail_answer: bool,
    pub peers: Mutex<Vec<Arc<MockPeer>>>,
    pub ice_servers: Mutex<Vec<Vec<String>>>,
    pub connected_at: Mutex<Vec<Instant>>,
}

impl MockTransport {
    pub fn peer(&self, index: usize) -> Arc<MockPeer> {
        self.peers.lock()[index].clone()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, ice_servers: &[String]) -> Result<Arc<dyn PeerLink>, SessionError> {
        self.ice_servers.lock().push(ice_servers.to_vec());
        if self.fail_connect {
            return Err(SessionError::Transport("connect refused".to_owned()));
        }

        self.connected_at.lock().push(Instant::now());
        let peer = Arc::new(MockPeer {
            fail_track: self.fail_track,
            fail_answer: self.fail_answer,
            ..Default::default()
        });
        self.peers.lock().push(peer.clone());
        Ok(peer)
    }
}

#[derive(Default)]
pub struct MockPeer {
    pub fail_track: bool,
    pub fail_answer: bool,
    pub handler: Mutex<Option<StateHandler>>,
    pub sink: Mutex<Option<Arc<MockSink>>>,
    pub track_spec: Mutex<Option<TrackSpec>>,
    pub closed: AtomicBool,
    pub closed_at: Mutex<Option<Instant>>,
}

impl MockPeer {
    /// Report an ICE state change the way the transport would
    pub fn fire(&self, state: ConnectionState) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(state);
        }
    }

    pub fn sink(&self) -> Arc<MockSink> {
        self.sink.lock().clone().expect("track was added")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerLink for MockPeer {
    async fn add_video_track(&self, spec: &TrackSpec) -> Result<Arc<dyn SampleSink>, SessionError> {
        *self.track_spec.lock() = Some(spec.clone());
        if self.fail_track {
            return Err(SessionError::Transport("no track".to_owned()));
        }
        let sink = Arc::new(MockSink::new(spec.capacity));
        *self.sink.lock() = Some(sink.clone());
        Ok(sink)
    }

    fn on_state_change(&self, handler: StateHandler) {
        *self.handler.lock() = Some(handler);
    }

    async fn answer(&self, remote_offer: &str) -> Result<String, SessionError> {
        if self.fail_answer {
            return Err(SessionError::Transport("bad offer".to_owned()));
        }
        Ok(format!("answer:{}", remote_offer))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::SeqCst);
        *self.closed_at.lock() = Some(Instant::now());
        // Closing a real connection reports Closed to its own observer
        self.fire(ConnectionState::Closed);
        Ok(())
    }
}

// ============ TRACK ============

/// Bounded sample queue that only the test drains
pub struct MockSink {
    capacity: usize,
    queue: Mutex<Vec<MediaSample>>,
    max_queued: AtomicUsize,
}

impl MockSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(Vec::new()),
            max_queued: AtomicUsize::new(0),
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn max_queued(&self) -> usize {
        self.max_queued.load(Ordering::SeqCst)
    }

    pub fn drain(&self) -> Vec<MediaSample> {
        std::mem::take(&mut *self.queue.lock())
    }
}

impl SampleSink for MockSink {
    fn try_push(&self, sample: MediaSample) -> Result<(), PushError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(PushError::Full);
        }
        queue.push(sample);
        self.max_queued.fetch_max(queue.len(), Ordering::SeqCst);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============ ENCODER ============

/// Builds codecs that emit each frame unchanged as one payload
///
/// `create` runs on the encoder thread, outside the Tokio clock.
#[derive(Default)]
pub struct MockEncoderFactory {
    pub fail: bool,
    pub configs: Mutex<Vec<EncoderConfig>>,
    pub live: Arc<AtomicUsize>,
}

impl MockEncoderFactory {
    pub fn live_codecs(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl EncoderFactory for MockEncoderFactory {
    fn create(&self, config: &EncoderConfig) -> Result<Box<dyn FrameEncoder>, EncoderError> {
        self.configs.lock().push(config.clone());
        if self.fail {
            return Err(EncoderError::Create("codec unavailable".to_owned()));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(PassthroughEncoder {
            live: self.live.clone(),
        }))
    }
}

pub struct PassthroughEncoder {
    live: Arc<AtomicUsize>,
}

impl FrameEncoder for PassthroughEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Bytes>, EncoderError> {
        Ok(vec![frame.data.clone()])
    }
}

impl Drop for PassthroughEncoder {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
