//! HTTP-client import element (spec §2's "Glue" row; grounded on
//! `original_source/.../http_client/http_client_element.cc`).
//!
//! Spec.md §1 scopes concrete HTTP/1.1 transport primitives out of this
//! crate's core. What's kept is the structural contract the original
//! element builds on top of an HTTP response body: a pull-based byte
//! source fed through a [`TagSplitter`] into the same [`TagDistributor`]
//! fan-out every source element uses. No concrete `ByteSource` is shipped;
//! wiring one up to a real HTTP client crate is left to the embedder.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::element::{Element, RegistryError, Request, RequestId};
use crate::glue::splitter::TagSplitter;
use crate::tag::{Attributes, SourceChange, Tag, TagDistributor, TagMeta};

const HTTP_IMPORT_FLAVOUR: u32 = 1;

/// Pull-based byte source the element drives to completion. Implemented
/// by whatever actually owns the HTTP connection; this crate only
/// specifies the contract (`next_chunk` returns `Ok(None)` at EOF).
pub trait ByteSource: Send {
    fn next_chunk(&mut self) -> std::io::Result<Option<bytes::Bytes>>;
}

/// One imported HTTP source, fanned out to subscribers exactly like
/// [`crate::rtmp::publish_stream::PublishStream`] fans out a publisher.
pub struct HttpClientElement {
    name: String,
    distributor: Mutex<TagDistributor>,
}

impl HttpClientElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            distributor: Mutex::new(TagDistributor::new()),
        }
    }

    fn push_tag(&self, tag: Tag) {
        self.distributor.lock().unwrap().distribute_tag(&tag);
    }

    /// Drains `source` on a blocking thread (the trait is synchronous, the
    /// same shape `original_source`'s HTTP client element uses for its
    /// underlying socket read loop), splitting each chunk through
    /// `splitter` and distributing the resulting tags.
    ///
    /// Returns once the source reports EOF or an I/O error; the element
    /// closes all subscribers either way.
    pub fn run(
        self: std::sync::Arc<Self>,
        mut source: Box<dyn ByteSource>,
        mut splitter: Box<dyn TagSplitter>,
    ) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || {
            loop {
                match source.next_chunk() {
                    Ok(Some(chunk)) => {
                        for tag in splitter.split(chunk, HTTP_IMPORT_FLAVOUR) {
                            self.push_tag(tag);
                        }
                    }
                    Ok(None) => {
                        tracing::info!(name = %self.name, "http import source reached eof");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(name = %self.name, error = %e, "http import source failed");
                        break;
                    }
                }
            }
            self.distributor.lock().unwrap().close_all_callbacks(false);
        })
    }
}

impl Element for HttpClientElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_request(&self, request: Request) -> Result<mpsc::UnboundedReceiver<Tag>, RegistryError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Tag::Bos { meta: TagMeta::new(Attributes::empty(), HTTP_IMPORT_FLAVOUR, 0) });
        let _ = tx.send(Tag::SourceStarted {
            meta: TagMeta::new(Attributes::empty(), HTTP_IMPORT_FLAVOUR, 0),
            change: SourceChange {
                source_element_name: self.name.clone(),
                path: self.name.clone(),
                is_final: true,
            },
            source_start_timestamp_ms: 0,
        });
        self.distributor.lock().unwrap().add_callback(request.id, HTTP_IMPORT_FLAVOUR, tx);
        Ok(rx)
    }

    fn remove_request(&self, id: RequestId) {
        self.distributor.lock().unwrap().remove_callback(id);
    }
}
