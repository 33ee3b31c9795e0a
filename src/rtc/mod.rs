mod peer_connection;
mod signaling;
mod track;
mod transport;

pub use peer_connection::{WebRtcPeer, WebRtcTransport};
pub use signaling::{decode_description, encode_description, SignalingError};
pub use track::{MediaSample, PushError, SampleSink, Vp8SampleTrack, VP8_CLOCK_RATE};
pub use transport::{ConnectionState, PeerLink, StateHandler, TrackSpec, Transport};
