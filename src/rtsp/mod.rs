//! RTSP server: DESCRIBE/SETUP/PLAY session state machine, SDP
//! generation, and RTP hand-off over UDP or interleaved TCP (spec §4.9,
//! §6.3), grounded on `marmikshah-rtsp-rs`'s `core` crate and generalized
//! from its single hard-coded mount to an arbitrary set of
//! [`mount::Mount`]s resolved against the same [`crate::element::ElementMapper`]
//! the RTMP front-end uses.

pub mod codec;
pub mod header;
pub mod mount;
pub mod processor;
pub mod rtp;
pub mod sdp;
pub mod server;
pub mod session;

pub use codec::{Frame, RtspCodec, RtspRequest, RtspResponse};
pub use header::{Header, Transport};
pub use mount::{Mount, MountRegistry};
pub use processor::ServerProcessor;
pub use server::{RtspConfig, RtspServer};
pub use session::{Session, SessionManager, SessionState};
