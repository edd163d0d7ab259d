//! Publish-side [`Element`]: one per currently-publishing RTMP stream.
//!
//! Grounded on `registry::store::StreamRegistry`/`registry::entry::StreamEntry`
//! (broadcast sender, cached sequence headers, GOP buffer for late joiners),
//! generalized from the registry's hard-coded FLV broadcast frame to the
//! generic [`Tag`] pipeline: publishing pushes `Tag`s into a [`TagDistributor`]
//! instead of a `tokio::sync::broadcast::Sender<BroadcastFrame>`, which is
//! what lets the same element also serve RTSP/HTTP-FLV subscribers later.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::element::{Element, RegistryError, Request, RequestId};
use crate::rtmp::media::flv::FlvTag;
use crate::tag::{Attributes, SourceChange, Tag, TagDistributor, TagMeta};

/// Single elementary flavour every RTMP-originated tag carries (spec §4.5
/// `flavour_mask` "MUST contain just 1 flavour_id" — RTMP has no
/// multi-flavour switching, unlike the original's bitrate-ladder sources).
const RTMP_FLAVOUR: u32 = 1;

/// Bound mirroring `GopBuffer::with_max_size`'s default (`registry/entry.rs`).
const DEFAULT_GOP_MAX_BYTES: usize = 4 * 1024 * 1024;

struct Gop {
    video_header: Option<Tag>,
    audio_header: Option<Tag>,
    metadata: Option<Tag>,
    frames: VecDeque<Tag>,
    size: usize,
    max_size: usize,
}

impl Gop {
    fn new() -> Self {
        Self {
            video_header: None,
            audio_header: None,
            metadata: None,
            frames: VecDeque::new(),
            size: 0,
            max_size: DEFAULT_GOP_MAX_BYTES,
        }
    }

    fn observe(&mut self, tag: &Tag) {
        match tag {
            Tag::Flv { data, .. } => {
                let flv = FlvTag::video(0, data.clone());
                if flv.is_avc_sequence_header() {
                    self.video_header = Some(tag.clone());
                    return;
                }
                let flv_audio = FlvTag::audio(0, data.clone());
                if flv_audio.is_aac_sequence_header() {
                    self.audio_header = Some(tag.clone());
                    return;
                }
                if tag.meta().is_video() {
                    if flv.is_keyframe() {
                        self.frames.clear();
                        self.size = 0;
                    }
                    self.push_frame(tag.clone());
                }
            }
            Tag::FlvHeader { .. } => self.metadata = Some(tag.clone()),
            _ => {}
        }
    }

    fn push_frame(&mut self, tag: Tag) {
        let size = tag.size() as usize;
        while self.size + size > self.max_size {
            let Some(old) = self.frames.pop_front() else { break };
            self.size = self.size.saturating_sub(old.size() as usize);
        }
        self.size += size;
        self.frames.push_back(tag);
    }

    fn catchup(&self) -> Vec<Tag> {
        let mut out = Vec::with_capacity(self.frames.len() + 3);
        out.extend(self.metadata.clone());
        out.extend(self.video_header.clone());
        out.extend(self.audio_header.clone());
        out.extend(self.frames.iter().cloned());
        out
    }
}

/// Owns one published stream's fan-out. Created when a `publish` command
/// succeeds, registered into the [`crate::element::ElementMapper`] under the
/// app/stream path, and torn down (`close_all_callbacks`) when the publisher
/// disconnects.
pub struct PublishStream {
    name: String,
    distributor: Mutex<TagDistributor>,
    gop: Mutex<Gop>,
}

impl PublishStream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            distributor: Mutex::new(TagDistributor::new()),
            gop: Mutex::new(Gop::new()),
        }
    }

    /// Media-side entry point: called by `ServerConnection` for every tag
    /// decoded off the publisher's RTMP chunk stream.
    pub fn push_tag(&self, tag: Tag) {
        self.gop.lock().unwrap().observe(&tag);
        self.distributor.lock().unwrap().distribute_tag(&tag);
    }

    pub fn subscriber_count(&self) -> usize {
        self.distributor.lock().unwrap().len()
    }

    /// Signals every current subscriber that the publisher is gone
    /// (`TagDistributor::CloseAllCallbacks`, spec §4.5).
    pub fn close(&self, forced: bool) {
        self.distributor.lock().unwrap().close_all_callbacks(forced);
    }
}

impl Element for PublishStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_request(&self, request: Request) -> Result<mpsc::UnboundedReceiver<Tag>, RegistryError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let bos = Tag::Bos { meta: TagMeta::new(Attributes::empty(), RTMP_FLAVOUR, 0) };
        let _ = tx.send(bos);
        let _ = tx.send(Tag::SourceStarted {
            meta: TagMeta::new(Attributes::empty(), RTMP_FLAVOUR, 0),
            change: SourceChange {
                source_element_name: self.name.clone(),
                path: self.name.clone(),
                is_final: true,
            },
            source_start_timestamp_ms: 0,
        });
        for tag in self.gop.lock().unwrap().catchup() {
            let _ = tx.send(tag);
        }

        self.distributor.lock().unwrap().add_callback(request.id, RTMP_FLAVOUR, tx);
        Ok(rx)
    }

    fn remove_request(&self, id: RequestId) {
        self.distributor.lock().unwrap().remove_callback(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Capabilities;
    use bytes::Bytes;

    fn video_tag(ts: i64, data: &[u8]) -> Tag {
        Tag::Flv {
            meta: TagMeta::new(Attributes::VIDEO | Attributes::DROPPABLE, RTMP_FLAVOUR, ts),
            data: Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn late_joiner_receives_cached_keyframe() {
        let stream = PublishStream::new("camera1");
        stream.push_tag(video_tag(0, &[0x17, 0x00, 0, 0, 0])); // avc seq header
        stream.push_tag(video_tag(33, &[0x17, 0x01, 0, 0, 0])); // keyframe

        let req = Request::new(crate::element::Path::new("live/camera1"), 1, "client", Capabilities::any());
        let mut rx = stream.add_request(req).unwrap();

        let mut kinds = Vec::new();
        while let Ok(tag) = rx.try_recv() {
            kinds.push(tag.kind());
        }
        assert!(kinds.contains(&crate::tag::TagKind::Flv));
    }

    #[test]
    fn close_notifies_every_subscriber() {
        let stream = PublishStream::new("camera1");
        let req = Request::new(crate::element::Path::new("live/camera1"), 1, "client", Capabilities::any());
        let mut rx = stream.add_request(req).unwrap();
        stream.close(true);

        let mut saw_eos = false;
        while let Ok(tag) = rx.try_recv() {
            if let Tag::Eos { forced, .. } = tag {
                saw_eos = true;
                assert!(forced);
            }
        }
        assert!(saw_eos);
    }
}
