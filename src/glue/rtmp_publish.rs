//! RTMP publishing element (spec §2's "Glue" row; grounded on
//! `original_source/.../rtmp_publishing/rtmp_publishing_element.cc`, which
//! pulls tags from a local element and republishes them to a remote RTMP
//! server as an outbound client).
//!
//! This is a sink, not a source: it consumes a local element's tag stream
//! via [`crate::element::ElementMapper::add_request`] and drives
//! [`crate::rtmp::client::PublishClient`] with it. It does not itself serve
//! requests, matching the original's one-way "save/forward" role.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::element::{Capabilities, ElementMapper, Path, Request};
use crate::error::Result;
use crate::exporter::TagSink;
use crate::rtmp::client::{PublishClient, PublishTarget};
use crate::tag::Tag;

/// Republishes the tag stream served at `source_path` by `mapper` to a
/// remote RTMP endpoint, reconnecting is left to the caller (the original's
/// `buildup_interval_sec`/`buildup_delay_sec` retry loop is a deployment
/// policy, not a structural requirement — see DESIGN.md).
pub struct RtmpPublishingElement {
    name: String,
    source_path: Path,
    session_id: u64,
}

impl RtmpPublishingElement {
    pub fn new(name: impl Into<String>, source_path: Path, session_id: u64) -> Self {
        Self { name: name.into(), source_path, session_id }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connects to `target`, subscribes to the source element, and forwards
    /// tags until the source closes or the connection is dropped. Runs to
    /// completion on the caller's task; spawn it if it shouldn't block.
    pub async fn run(self, mapper: Arc<ElementMapper>, target: PublishTarget) -> Result<()> {
        let request = Request::new(self.source_path.clone(), self.session_id, self.name.clone(), Capabilities::any());
        let mut rx: mpsc::UnboundedReceiver<Tag> = mapper.add_request(request).await?;

        let client = PublishClient::connect(target).await?;
        let sink: Arc<dyn TagSink> = client.clone();

        while let Some(tag) = rx.recv().await {
            if !sink.can_send_tag() {
                break;
            }
            let is_eos = matches!(tag, Tag::Eos { .. });
            sink.send_tag(tag);
            if is_eos {
                break;
            }
        }
        client.close();
        Ok(())
    }
}
