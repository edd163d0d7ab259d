//! Per-request stateful tag transformation (spec.md §4.5 `FilteringElement`).
//!
//! Grounded on `filtering_element.cc`: each subscribed request gets its
//! own `CallbackData` that rewrites `SOURCE_STARTED`/`SOURCE_ENDED` path
//! metadata in flight and delegates the actual transform to a virtual
//! hook. Here the hook is the [`FilterTag`] trait instead of a C++
//! virtual method, and `CallbackData` becomes [`FilterState`], one per
//! registered request.

use super::{SourceChange, Tag};

/// Implemented by concrete filtering behaviors (pass-through, watermarking,
/// transcoding glue, ...). `filter_tag` may drop the tag (empty `Vec`),
/// forward it unchanged, or emit replacement tags.
pub trait FilterTag: Send + Sync {
    fn filter_tag(&mut self, tag: &Tag, timestamp_ms: i64) -> Vec<Tag>;
}

/// Trivial filter that forwards every tag unchanged — the default
/// `FilterTag` implementation the original's base `FilteringElement`
/// supplies when a subclass doesn't override it.
#[derive(Default)]
pub struct PassThroughFilter;

impl FilterTag for PassThroughFilter {
    fn filter_tag(&mut self, tag: &Tag, _timestamp_ms: i64) -> Vec<Tag> {
        vec![tag.clone()]
    }
}

/// Per-request processing state: the element's own name (prepended to
/// `SOURCE_STARTED`/`SOURCE_ENDED` paths) plus the filter implementation.
pub struct FilteringElement<F: FilterTag> {
    element_name: String,
    filter: F,
}

impl<F: FilterTag> FilteringElement<F> {
    pub fn new(element_name: impl Into<String>, filter: F) -> Self {
        Self {
            element_name: element_name.into(),
            filter,
        }
    }

    /// Process one upstream tag into zero or more downstream tags.
    /// `SOURCE_STARTED`/`SOURCE_ENDED` have their `path` rewritten to
    /// prepend this element's name, unless the tag is marked `is_final`
    /// (spec: "rewrites any SOURCE_STARTED/SOURCE_ENDED path... unless the
    /// tag is marked is_final").
    pub fn process(&mut self, tag: &Tag, timestamp_ms: i64) -> Vec<Tag> {
        let rewritten = self.rewrite_path(tag);
        self.filter.filter_tag(&rewritten, timestamp_ms)
    }

    fn rewrite_path(&self, tag: &Tag) -> Tag {
        match tag {
            Tag::SourceStarted { meta, change, source_start_timestamp_ms } if !change.is_final => {
                Tag::SourceStarted {
                    meta: *meta,
                    change: self.prepend_name(change),
                    source_start_timestamp_ms: *source_start_timestamp_ms,
                }
            }
            Tag::SourceEnded { meta, change } if !change.is_final => Tag::SourceEnded {
                meta: *meta,
                change: self.prepend_name(change),
            },
            other => other.clone(),
        }
    }

    fn prepend_name(&self, change: &SourceChange) -> SourceChange {
        let path = if change.path.is_empty() {
            self.element_name.clone()
        } else {
            format!("{}/{}", self.element_name, change.path)
        };
        SourceChange {
            source_element_name: change.source_element_name.clone(),
            path,
            is_final: change.is_final,
        }
    }
}
