//! Stream raw YUV frames to a browser as VP8 over WebRTC
//!
//! A [`Session`] answers a remote offer, and once ICE connects it pulls frames
//! from its [`FrameSender`] queue through a VP8 encoder onto an outbound
//! video track. Every queue on the way is bounded; a full queue drops the
//! newest item instead of blocking the producer.

mod config;
mod pipeline;
pub mod rtc;
mod session;
pub mod video;

pub use config::{ConfigError, EncoderTuning, SessionConfig, DEFAULT_STUN_SERVER};
pub use pipeline::{PipelineStats, PipelineStatsSnapshot};
pub use rtc::{ConnectionState, WebRtcTransport};
pub use session::{Session, SessionError};
pub use video::{FrameSendError, FrameSender, VideoFrame};
