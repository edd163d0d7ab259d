//! RTMP server: chunked wire codec, AMF0 command framing, handshake,
//! server connection state machine, play/publish stream adapters, and an
//! outbound publishing client used by [`crate::glue::rtmp_publish`].

pub mod amf;
pub mod chunk;
pub mod client;
pub mod connection;
pub mod media;
pub mod message;
pub mod play_stream;
pub mod protocol;
pub mod publish_stream;

pub use connection::{RtmpConfig, RtmpServer, ServerConnection};
pub use message::{Event, MessageTypeId};
