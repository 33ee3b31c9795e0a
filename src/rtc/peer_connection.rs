use async_trait::async_trait;
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

use super::signaling::{decode_description, encode_description};
use super::track::{SampleSink, Vp8SampleTrack};
use super::transport::{ConnectionState, PeerLink, StateHandler, TrackSpec, Transport};
use crate::session::SessionError;

/// Peer connections backed by webrtc-rs
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcTransport;

impl WebRtcTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    async fn connect(&self, ice_servers: &[String]) -> Result<Arc<dyn PeerLink>, SessionError> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()
            .map_err(|e| SessionError::Transport(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut m).map_err(|e| {
            SessionError::Transport(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = api.new_peer_connection(config).await.map_err(|e| {
            SessionError::Transport(format!("Failed to create peer connection: {}", e))
        })?;

        Ok(Arc::new(WebRtcPeer {
            pc: Arc::new(peer_connection),
        }))
    }
}

/// A webrtc-rs peer connection
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcPeer {
    pub fn peer_connection(&self) -> Arc<RTCPeerConnection> {
        self.pc.clone()
    }
}

#[async_trait]
impl PeerLink for WebRtcPeer {
    async fn add_video_track(&self, spec: &TrackSpec) -> Result<Arc<dyn SampleSink>, SessionError> {
        let track = Vp8SampleTrack::new(&spec.track_id, &spec.stream_id, spec.fps, spec.capacity);

        let rtp_sender = self
            .pc
            .add_track(track.track() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to add video track: {}", e)))?;

        // RTCP has to be read for interceptors (NACK, reports) to work
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        Ok(Arc::new(track))
    }

    fn on_state_change(&self, handler: StateHandler) {
        self.pc
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                handler(ConnectionState::from(state));
                Box::pin(async {})
            }));
    }

    async fn answer(&self, remote_offer: &str) -> Result<String, SessionError> {
        let offer = decode_description(remote_offer)?;

        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to create answer: {}", e)))?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to set local description: {}", e)))?;

        // Non-trickle signalling: the answer must carry every candidate
        let _ = gather_complete.recv().await;

        let local_desc = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| SessionError::Transport("No local description".to_owned()))?;

        Ok(encode_description(&local_desc)?)
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.pc
            .close()
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to close peer connection: {}", e)))
    }
}
