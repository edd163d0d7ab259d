//! Play-side [`TagSink`]: adapts one subscriber's outbound RTMP chunk
//! stream to the [`Exporter`] pacing core (spec §4.6, §4.8.2).
//!
//! Grounded on `registry::store::StreamRegistry::subscribe` (catchup frames
//! + broadcast receiver) for the data path, generalized to drive an
//! [`Exporter`] instead of forwarding straight from a `broadcast::Receiver`
//! so flow control and drop policy apply uniformly across protocols.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::exporter::{CloseReason, Exporter, ExporterState, TagSink};
use crate::rtmp::chunk::ChunkEncoder;
use crate::rtmp::media::flv::FlvTag;
use crate::rtmp::message::MessageTypeId;
use crate::rtmp::protocol::constants::{CS_ID_AUDIO, CS_ID_METADATA, CS_ID_VIDEO};
use crate::tag::Tag;

/// One playing subscriber: owns the outbound chunk encoder state for this
/// connection's audio/video/metadata channels and feeds encoded bytes to
/// the connection's writer task via `out_tx`.
pub struct PlayStream {
    message_stream_id: u32,
    encoder: Mutex<ChunkEncoder>,
    out_tx: mpsc::UnboundedSender<Bytes>,
    closed: AtomicBool,
}

impl PlayStream {
    pub fn new(message_stream_id: u32, chunk_size: u32, out_tx: mpsc::UnboundedSender<Bytes>) -> Arc<Self> {
        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(chunk_size as usize);
        Arc::new(Self {
            message_stream_id,
            encoder: Mutex::new(encoder),
            out_tx,
            closed: AtomicBool::new(false),
        })
    }

    /// Runs the pacing loop for `exporter` until the subscriber's channel
    /// is closed or the stream's publisher goes away; `rx` is the element's
    /// per-request tag channel (see [`crate::element::Element::add_request`]).
    pub async fn run(self: Arc<Self>, exporter: Arc<Exporter>, mut rx: mpsc::UnboundedReceiver<Tag>) {
        exporter.set_state(ExporterState::Playing).await;
        let sink: Arc<dyn TagSink> = self.clone();

        while let Some(tag) = rx.recv().await {
            if matches!(tag, Tag::Eos { .. }) {
                break;
            }
            exporter.offer_tag(tag, sink.clone()).await;
        }
        exporter.set_state(ExporterState::Closed).await;
        self.closed.store(true, Ordering::Release);
    }

    fn encode_and_send(&self, chunk_stream_id: u32, timestamp_ms: u32, message_type: MessageTypeId, payload: &[u8]) {
        let bytes = self.encoder.lock().unwrap().encode(
            chunk_stream_id,
            self.message_stream_id,
            timestamp_ms,
            message_type,
            payload,
        );
        let _ = self.out_tx.send(bytes);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl TagSink for PlayStream {
    fn can_send_tag(&self) -> bool {
        // The connection's writer task owns an unbounded channel draining
        // as fast as the socket accepts bytes; back-pressure on a slow
        // client shows up as `out_tx`'s queue growing rather than this
        // returning false (see DESIGN.md, queue-vs-mutex translation).
        !self.closed.load(Ordering::Acquire)
    }

    fn send_tag(&self, tag: Tag) {
        let ts = tag.timestamp_ms().max(0) as u32;
        match &tag {
            Tag::Flv { data, .. } => {
                let message_type = if tag.meta().is_video() {
                    MessageTypeId::Video
                } else if tag.meta().is_audio() {
                    MessageTypeId::Audio
                } else {
                    return;
                };
                let cs_id = if tag.meta().is_video() { CS_ID_VIDEO } else { CS_ID_AUDIO };
                self.encode_and_send(cs_id, ts, message_type, data);
            }
            Tag::FlvHeader { data, .. } => {
                self.encode_and_send(CS_ID_METADATA, ts, MessageTypeId::DataAmf0, data);
            }
            _ => {}
        }
    }

    fn set_notify_ready(&self) {}
}

/// Categorizes why a playback session ended, for the `onStatus` message
/// the connection sends back before closing (spec §4.6's close reasons).
pub fn close_reason_status_level(reason: CloseReason) -> &'static str {
    match reason {
        CloseReason::ClientClosed | CloseReason::UpstreamEnded => "status",
        _ => "error",
    }
}

/// Helper for constructing the AVC-seq-header/keyframe checks used when
/// deciding whether a GOP cache entry should reset (shared with
/// `publish_stream`'s observer, re-exposed here for the connection layer's
/// metadata rewriting path).
pub fn is_keyframe(data: &[u8]) -> bool {
    FlvTag::video(0, Bytes::copy_from_slice(data)).is_keyframe()
}

pub type PlayStreamResult<T> = Result<T>;
