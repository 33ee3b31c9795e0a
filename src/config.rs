use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Public STUN server used when nothing else is configured
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// VP8 tuning knobs applied to every encoder a session creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderTuning {
    /// Target frame rate
    pub fps: u32,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Speed/quality trade-off (higher is faster)
    pub speed: u32,
}

impl Default for EncoderTuning {
    fn default() -> Self {
        Self {
            fps: 20,
            bitrate_kbps: 1200,
            speed: 5,
        }
    }
}

/// Everything a [`Session`](crate::Session) needs besides its collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// ICE server URLs handed to every new peer connection
    pub ice_servers: Vec<String>,
    /// Pause between tearing down a live connection and building the next one
    pub restart_cooldown_ms: u64,
    /// Inbound raw frame queue (producer side)
    pub frame_queue_capacity: usize,
    pub encoder_input_capacity: usize,
    pub encoder_output_capacity: usize,
    /// Outbound sample queue in front of the video track
    pub sample_queue_capacity: usize,
    pub track_id: String,
    pub stream_id: String,
    pub encoder: EncoderTuning,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_owned()],
            restart_cooldown_ms: 2000,
            frame_queue_capacity: 2,
            encoder_input_capacity: 2,
            encoder_output_capacity: 2,
            sample_queue_capacity: 8,
            track_id: "video".to_owned(),
            stream_id: "pion2".to_owned(),
            encoder: EncoderTuning::default(),
        }
    }
}

impl SessionConfig {
    /// Parse a JSON config, filling missing fields with defaults
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("frame_queue_capacity", self.frame_queue_capacity),
            ("encoder_input_capacity", self.encoder_input_capacity),
            ("encoder_output_capacity", self.encoder_output_capacity),
            ("sample_queue_capacity", self.sample_queue_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be at least 1", name)));
            }
        }

        if self.encoder.fps == 0 {
            return Err(ConfigError::Invalid("encoder.fps must be at least 1".to_owned()));
        }

        Ok(())
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }
}
