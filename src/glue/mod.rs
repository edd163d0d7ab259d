//! Glue import/command elements (spec §2's "Glue" table row), supplemental
//! to spec.md's distillation and grounded on `examples/original_source`'s
//! `elements/standard_library/{rtmp_publishing,http_client}` and
//! `elements/command_library/command_element.cc`.

pub mod command;
pub mod http_client;
pub mod rtmp_publish;
pub mod splitter;

pub use command::CommandElement;
pub use http_client::{ByteSource, HttpClientElement};
pub use rtmp_publish::RtmpPublishingElement;
pub use splitter::{RawTagSplitter, TagSplitter};
