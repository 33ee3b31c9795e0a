//! Video module
//! Raw frame plumbing and the VP8 encoder adapter

mod encoder;
mod frame;
#[cfg(feature = "vpx")]
mod vpx;

pub use encoder::{EncoderAdapter, EncoderConfig, EncoderError, EncoderFactory, FrameEncoder};
pub use frame::{i420_frame_size, FrameSendError, FrameSender, VideoFrame};
#[cfg(feature = "vpx")]
pub use vpx::{VpxEncoder, VpxEncoderFactory};
