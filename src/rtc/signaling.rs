//! Copy/paste signalling: session descriptions as base64-encoded JSON

use base64::Engine;
use thiserror::Error;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Failed to decode session description: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid UTF-8 in session description: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Failed to parse session description: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a session description for transmission to the remote peer
pub fn encode_description(desc: &RTCSessionDescription) -> Result<String, SignalingError> {
    let sdp_json = serde_json::to_string(desc)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(sdp_json.as_bytes()))
}

/// Decode a session description received from the remote peer
pub fn decode_description(encoded: &str) -> Result<RTCSessionDescription, SignalingError> {
    let sdp_json = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    let sdp_str = String::from_utf8(sdp_json)?;
    Ok(serde_json::from_str(&sdp_str)?)
}
