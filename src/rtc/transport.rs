use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;

use super::track::SampleSink;
use crate::session::SessionError;

/// ICE connectivity as reported to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// States that end the current connection
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

impl From<RTCIceConnectionState> for ConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => Self::New,
            RTCIceConnectionState::Checking => Self::Checking,
            RTCIceConnectionState::Connected => Self::Connected,
            RTCIceConnectionState::Completed => Self::Completed,
            RTCIceConnectionState::Disconnected => Self::Disconnected,
            RTCIceConnectionState::Failed => Self::Failed,
            RTCIceConnectionState::Closed => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Parameters of the outbound video track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSpec {
    pub track_id: String,
    pub stream_id: String,
    pub fps: u32,
    /// Capacity of the sample queue in front of the track
    pub capacity: usize,
}

/// Creates peer connections
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, ice_servers: &[String]) -> Result<Arc<dyn PeerLink>, SessionError>;
}

/// One peer connection
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create one outbound VP8 track and attach it to the connection
    async fn add_video_track(&self, spec: &TrackSpec) -> Result<Arc<dyn SampleSink>, SessionError>;

    /// Register the ICE connection state observer
    fn on_state_change(&self, handler: StateHandler);

    /// Apply an encoded remote offer and return the encoded local answer
    async fn answer(&self, remote_offer: &str) -> Result<String, SessionError>;

    async fn close(&self) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(!ConnectionState::Checking.is_terminal());
    }

    #[test]
    fn test_from_ice_state() {
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Connected),
            ConnectionState::Connected
        );
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Unspecified),
            ConnectionState::New
        );
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }
}
