//! Raw frames and the producer handle for the inbound queue

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One raw I420 image
///
/// Width and height are not carried: they are the dimensions the session
/// was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Get the frame size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Size in bytes of an I420 image (full-size luma, quarter-size chroma)
pub fn i420_frame_size(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
    luma + 2 * chroma
}

#[derive(Error, Debug)]
pub enum FrameSendError {
    #[error("Frame queue is full")]
    Full(VideoFrame),
    #[error("Frame queue is closed")]
    Closed(VideoFrame),
}

impl FrameSendError {
    /// Recover the frame that could not be queued
    pub fn into_frame(self) -> VideoFrame {
        match self {
            Self::Full(frame) | Self::Closed(frame) => frame,
        }
    }
}

/// Producer side of a session's inbound frame queue
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<VideoFrame>,
}

impl FrameSender {
    pub(crate) fn new(tx: mpsc::Sender<VideoFrame>) -> Self {
        Self { tx }
    }

    /// Queue a frame, waiting for room
    pub async fn send(&self, frame: VideoFrame) -> Result<(), FrameSendError> {
        self.tx
            .send(frame)
            .await
            .map_err(|e| FrameSendError::Closed(e.0))
    }

    /// Queue a frame without waiting
    pub fn try_send(&self, frame: VideoFrame) -> Result<(), FrameSendError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(frame) => FrameSendError::Full(frame),
            TrySendError::Closed(frame) => FrameSendError::Closed(frame),
        })
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Number of frames waiting in the queue
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
