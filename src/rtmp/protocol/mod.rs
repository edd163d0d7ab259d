//! Wire-level RTMP plumbing: handshake, chunk-stream constants, AMF0
//! command framing, encoder-compatibility quirks, and Enhanced RTMP
//! capability negotiation.

pub mod constants;
pub mod enhanced;
pub mod handshake;
pub mod message;
pub mod quirks;

pub use handshake::{Handshake, HandshakeRole};
pub use message::Command;
