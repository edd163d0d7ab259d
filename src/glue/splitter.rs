//! Pluggable raw-bytes-to-[`Tag`] conversion shared by the import elements
//! (spec §2's "import/command elements" row), generalized from the
//! original's per-format `Splitter` hierarchy (`raw_tag_splitter.h` et al.)
//! down to the one structural contract this crate's glue layer needs: turn
//! a chunk of bytes from an external source into zero or more [`Tag`]s.

use bytes::Bytes;

use crate::tag::{Attributes, Tag, TagMeta};

/// Converts byte chunks read from an external source (subprocess stdout,
/// HTTP response body, ...) into [`Tag`]s. Stateful: a splitter may buffer
/// partial frames across calls.
pub trait TagSplitter: Send {
    fn split(&mut self, chunk: Bytes, flavour_mask: u32) -> Vec<Tag>;
}

/// Default splitter used when the caller doesn't know or care about the
/// underlying format: each chunk becomes one [`Tag::Raw`], timestamped at
/// zero. Real deployments supply a format-aware splitter (FLV, TS, ...);
/// this one exists so the glue elements are usable without one.
#[derive(Default)]
pub struct RawTagSplitter;

impl TagSplitter for RawTagSplitter {
    fn split(&mut self, chunk: Bytes, flavour_mask: u32) -> Vec<Tag> {
        vec![Tag::Raw {
            meta: TagMeta::new(Attributes::empty(), flavour_mask, 0),
            data: chunk,
        }]
    }
}
