//! `streamcore` — the core of a multi-protocol live streaming media server.
//!
//! Publishers push audio/video in over RTMP, HTTP pull, local command
//! pipes, or recorded files. Every source is normalized into a uniform
//! [`tag::Tag`] stream, routed through a graph of named [`element::Element`]s,
//! and delivered to concurrent subscribers over RTMP, HTTP-FLV, or RTSP/RTP.
//!
//! Module map mirrors the component table this crate was built against:
//!
//! - [`selector`] — cooperative reactor (alarms, deferred closures)
//! - [`bytestream`] — segmented buffer with marker/restore
//! - [`log`] — fixed-block append-only record log
//! - [`tag`] — polymorphic media unit + distributor/filtering/switching
//! - [`element`] — named graph nodes, routing, capability negotiation
//! - [`exporter`] — cross-thread pacing between media and network sides
//! - [`rtmp`] — chunked codec, server connection, play/publish streams
//! - [`rtsp`] — DESCRIBE/SETUP/PLAY session state machine, SDP, RTP hand-off
//! - [`rpc`] — worker-threaded control-plane query pool
//! - [`glue`] — concrete publishing/importing elements
//! - [`stats`] — event emission interface (sinks are external)

pub mod bytestream;
pub mod config;
pub mod element;
pub mod error;
pub mod exporter;
pub mod glue;
pub mod log;
pub mod rpc;
pub mod rtmp;
pub mod rtsp;
pub mod selector;
pub mod stats;
pub mod tag;

pub use error::{Error, Result};
