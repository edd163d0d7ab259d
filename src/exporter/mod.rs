//! Cross-thread pacing between the media side and the network side
//! (spec.md §4.6).
//!
//! Grounded on the original's `exporter.h`/`exporter.cc`: a mutex-guarded
//! queue straddles two `net::Selector`s, with the media side pushing tags
//! through flow control and the network side draining under
//! `CanSendTag()` back-pressure. Here both sides live on the same tokio
//! runtime, so the "mutex-guarded queue plus poke the other selector" is
//! realized as a `tokio::sync::Mutex<VecDeque<Tag>>` plus a
//! `SelectorHandle::post` wakeup — same shape, no real thread crossing
//! required.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::selector::SelectorHandle;
use crate::tag::{Tag, TagNormalizer};

/// Exporter lifecycle (spec §4.6 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterState {
    Created,
    LookingUp,
    Authorizing,
    Playing,
    Paused,
    Closed,
}

/// Typed close reason surfaced to stats and to the protocol layer
/// (spec §4.6: "STREAM NOT FOUND", "AUTHORIZATION FAILED", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    StreamNotFound,
    AuthorizationFailed,
    TooManyRequests,
    ReauthorizationFailed,
    TimeLimitReached,
    ClientClosed,
    UpstreamEnded,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StreamNotFound => "STREAM NOT FOUND",
            CloseReason::AuthorizationFailed => "AUTHORIZATION FAILED",
            CloseReason::TooManyRequests => "TOO MANY REQUESTS",
            CloseReason::ReauthorizationFailed => "REAUTHORIZATION FAILED",
            CloseReason::TimeLimitReached => "TIME LIMIT REACHED",
            CloseReason::ClientClosed => "CLIENT CLOSED",
            CloseReason::UpstreamEnded => "UPSTREAM ENDED",
        }
    }
}

/// Implemented by the protocol-specific sender (RTMP `PlayStream`, RTSP
/// RTP session, HTTP-FLV writer). Mirrors the original's `CanSendTag`/
/// `SendTag`/`SetNotifyReady` virtual hooks.
pub trait TagSink: Send + Sync {
    /// Whether the downstream transport currently has room to accept
    /// another tag without blocking.
    fn can_send_tag(&self) -> bool;
    /// Hand a tag to the transport. Only called when `can_send_tag()` was
    /// true.
    fn send_tag(&self, tag: Tag);
    /// Called once when `can_send_tag()` returned false, so the transport
    /// knows to call [`Exporter::notify_ready`] once it drains.
    fn set_notify_ready(&self);
}

struct Queue {
    tags: VecDeque<Tag>,
    video_ms: u64,
    total_ms: u64,
}

impl Queue {
    fn new() -> Self {
        Self { tags: VecDeque::new(), video_ms: 0, total_ms: 0 }
    }
}

/// The pacing/flow-control core. One `Exporter` serves one subscriber.
pub struct Exporter {
    state: Mutex<ExporterState>,
    queue: Mutex<Queue>,
    normalizer: Mutex<TagNormalizer>,
    flow_control_video_ms: u64,
    flow_control_total_ms: u64,
    network_selector: SelectorHandle,
    notify_pending: AtomicBool,
    dropping_video: AtomicBool,
}

impl Exporter {
    pub fn new(
        flow_control_video_ms: u64,
        flow_control_total_ms: u64,
        max_write_ahead_ms: i64,
        network_selector: SelectorHandle,
    ) -> Self {
        Self {
            state: Mutex::new(ExporterState::Created),
            queue: Mutex::new(Queue::new()),
            normalizer: Mutex::new(TagNormalizer::new(max_write_ahead_ms)),
            flow_control_video_ms,
            flow_control_total_ms,
            network_selector,
            notify_pending: AtomicBool::new(false),
            dropping_video: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> ExporterState {
        *self.state.lock().await
    }

    pub async fn set_state(&self, state: ExporterState) {
        *self.state.lock().await = state;
    }

    /// Media-side entry point: normalize `tag`'s timestamp, apply the
    /// drop policy, and enqueue survivors. Pokes the network selector once
    /// per empty-to-non-empty transition (spec §4.6).
    pub async fn offer_tag(self: &Arc<Self>, tag: Tag, sink: Arc<dyn TagSink>) {
        self.normalizer.lock().await.process_tag(&tag);

        let mut q = self.queue.lock().await;
        if self.should_drop(&tag, &q) {
            return;
        }

        let was_empty = q.tags.is_empty();
        let size = tag_pacing_weight_ms(&tag);
        q.video_ms += if tag.meta().is_video() { size } else { 0 };
        q.total_ms += size;
        q.tags.push_back(tag);
        drop(q);

        if was_empty {
            let this = Arc::clone(self);
            self.network_selector.post(move || {
                tokio::spawn(async move {
                    this.process_localized_tags(sink).await;
                });
            });
        }
    }

    /// Video interframes are dropped until the next resync-capable frame
    /// once the queue exceeds `flow_control_video_ms`; any droppable tag
    /// is dropped once the queue exceeds `flow_control_total_ms`
    /// (0 disables time-based dropping: HTTP download mode).
    fn should_drop(&self, tag: &Tag, q: &Queue) -> bool {
        if !tag.is_droppable() {
            return false;
        }
        if self.flow_control_total_ms > 0 && q.total_ms > self.flow_control_total_ms {
            return true;
        }
        if tag.meta().is_video() && q.video_ms > self.flow_control_video_ms {
            if tag.meta().can_resync() {
                self.dropping_video.store(false, Ordering::Relaxed);
                return false;
            }
            self.dropping_video.store(true, Ordering::Relaxed);
            return true;
        }
        if tag.meta().is_video() && self.dropping_video.load(Ordering::Relaxed) {
            if tag.meta().can_resync() {
                self.dropping_video.store(false, Ordering::Relaxed);
                return false;
            }
            return true;
        }
        false
    }

    /// Network-side drain: pop tags while `sink.can_send_tag()`, otherwise
    /// arm `set_notify_ready()` and return (spec §4.6
    /// `ProcessLocalizedTags`).
    pub async fn process_localized_tags(&self, sink: Arc<dyn TagSink>) {
        loop {
            if !sink.can_send_tag() {
                sink.set_notify_ready();
                self.notify_pending.store(true, Ordering::Release);
                return;
            }
            let tag = {
                let mut q = self.queue.lock().await;
                match q.tags.pop_front() {
                    Some(tag) => {
                        let w = tag_pacing_weight_ms(&tag);
                        q.total_ms = q.total_ms.saturating_sub(w);
                        if tag.meta().is_video() {
                            q.video_ms = q.video_ms.saturating_sub(w);
                        }
                        tag
                    }
                    None => return,
                }
            };
            sink.send_tag(tag);
        }
    }

    /// Called by the protocol layer once the outbound buffer has drained
    /// past `set_notify_ready()`'s trigger, resuming the drain loop.
    pub async fn notify_ready(&self, sink: Arc<dyn TagSink>) {
        if self.notify_pending.swap(false, Ordering::AcqRel) {
            self.process_localized_tags(sink).await;
        }
    }

    pub async fn queue_depth_ms(&self) -> u64 {
        self.queue.lock().await.total_ms
    }
}

/// Pacing weight for flow-control accounting: for ordinary media tags this
/// is the delta to the previous tag's timestamp is already reflected in
/// the normalizer; the queue tracks wall-clock milliseconds of buffered
/// media via tag size as a conservative proxy when duration is zero.
fn tag_pacing_weight_ms(tag: &Tag) -> u64 {
    let d = tag.duration_ms();
    if d > 0 {
        d as u64
    } else {
        1
    }
}

/// Rewrites FLV metadata as it passes through, per spec §4.6: seek/pause
/// capability flags reflect the controller, `cuePoints` is stripped
/// (subscribers get live playback, not file navigation), and `media`
/// names the current source.
pub fn rewrite_live_metadata(
    mut fields: serde_json::Map<String, serde_json::Value>,
    can_seek_to_end: bool,
    media_name: &str,
) -> serde_json::Map<String, serde_json::Value> {
    fields.insert("canSeekToEnd".into(), serde_json::Value::Bool(can_seek_to_end));
    fields.insert("unseekable".into(), serde_json::Value::Bool(true));
    fields.insert("unpausable".into(), serde_json::Value::Bool(false));
    fields.remove("cuePoints");
    fields.insert("media".into(), serde_json::Value::String(media_name.to_string()));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;
    use crate::tag::{Attributes, TagMeta};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex as TMutex;

    struct RecordingSink {
        can_send: AtomicBool,
        received: TMutex<Vec<Tag>>,
        notify_count: AtomicUsize,
    }

    impl TagSink for RecordingSink {
        fn can_send_tag(&self) -> bool {
            self.can_send.load(Ordering::Relaxed)
        }
        fn send_tag(&self, tag: Tag) {
            self.received.try_lock().unwrap().push(tag);
        }
        fn set_notify_ready(&self) {
            self.notify_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn meta(attrs: Attributes) -> TagMeta {
        TagMeta::new(attrs, 1, 0)
    }

    #[tokio::test]
    async fn droppable_video_is_dropped_past_threshold() {
        let selector = Selector::new();
        let handle = selector.handle();
        let exporter = Arc::new(Exporter::new(10, 0, 10_000, handle));
        let sink: Arc<dyn TagSink> = Arc::new(RecordingSink {
            can_send: AtomicBool::new(false),
            received: TMutex::new(Vec::new()),
            notify_count: AtomicUsize::new(0),
        });

        for i in 0..20 {
            let tag = Tag::Flv {
                meta: TagMeta::new(Attributes::VIDEO | Attributes::DROPPABLE, 1, i * 20),
                data: bytes::Bytes::new(),
            };
            exporter.offer_tag(tag, Arc::clone(&sink)).await;
        }

        assert!(exporter.queue_depth_ms().await <= 20, "drop policy should cap buffered video");
    }

    #[tokio::test]
    async fn non_droppable_tags_are_never_dropped() {
        let selector = Selector::new();
        let handle = selector.handle();
        let exporter = Arc::new(Exporter::new(1, 1, 10_000, handle));
        let sink: Arc<dyn TagSink> = Arc::new(RecordingSink {
            can_send: AtomicBool::new(false),
            received: TMutex::new(Vec::new()),
            notify_count: AtomicUsize::new(0),
        });

        for i in 0..50 {
            let tag = Tag::Flv {
                meta: meta(Attributes::AUDIO) ,
                data: bytes::Bytes::new(),
            };
            let mut tag = tag;
            tag.meta_mut().timestamp_ms = i * 20;
            exporter.offer_tag(tag, Arc::clone(&sink)).await;
        }
        assert_eq!(exporter.queue_depth_ms().await, 50);
    }

    #[test]
    fn metadata_rewrite_strips_cue_points() {
        let mut fields = serde_json::Map::new();
        fields.insert("cuePoints".into(), serde_json::Value::Array(vec![]));
        let out = rewrite_live_metadata(fields, true, "camera1");
        assert!(!out.contains_key("cuePoints"));
        assert_eq!(out["media"], "camera1");
        assert_eq!(out["canSeekToEnd"], true);
    }
}
