//! libvpx-backed VP8 codec

use bytes::Bytes;
use vpx_encode::{Config, Encoder, VideoCodecId};

use super::encoder::{EncoderConfig, EncoderError, EncoderFactory, FrameEncoder};
use super::frame::VideoFrame;

/// Millisecond timebase for presentation timestamps
const TIMEBASE: [i32; 2] = [1, 1000];

/// Builds [`VpxEncoder`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct VpxEncoderFactory;

impl EncoderFactory for VpxEncoderFactory {
    fn create(&self, config: &EncoderConfig) -> Result<Box<dyn FrameEncoder>, EncoderError> {
        Ok(Box::new(VpxEncoder::new(config)?))
    }
}

pub struct VpxEncoder {
    encoder: Encoder,
    frame_size: usize,
    frame_duration_ms: i64,
    frame_count: i64,
}

impl VpxEncoder {
    pub fn new(config: &EncoderConfig) -> Result<Self, EncoderError> {
        let encoder = Encoder::new(Config {
            width: config.width,
            height: config.height,
            timebase: TIMEBASE,
            bitrate: config.bitrate_kbps,
            codec: VideoCodecId::VP8,
        })
        .map_err(|e| EncoderError::Create(format!("{:?}", e)))?;

        Ok(Self {
            encoder,
            frame_size: config.frame_size(),
            frame_duration_ms: 1000 / i64::from(config.fps.max(1)),
            frame_count: 0,
        })
    }
}

impl FrameEncoder for VpxEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<Bytes>, EncoderError> {
        if frame.size() != self.frame_size {
            return Err(EncoderError::FrameSize {
                expected: self.frame_size,
                actual: frame.size(),
            });
        }

        let pts = self.frame_count * self.frame_duration_ms;
        self.frame_count += 1;

        let packets = self
            .encoder
            .encode(pts, &frame.data)
            .map_err(|e| EncoderError::Encode(format!("{:?}", e)))?;

        Ok(packets
            .map(|packet| Bytes::copy_from_slice(packet.data))
            .collect())
    }
}
