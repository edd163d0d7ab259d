//! Command-pipe import element (spec §2's "Glue" row; grounded on
//! `original_source/.../command_library/command_element.cc`, which spawns
//! a subprocess and treats its stdout as a media source).
//!
//! Generalized from the original's fixed splitter-by-format-name lookup to
//! the same pluggable [`TagSplitter`] contract [`crate::glue::http_client::HttpClientElement`]
//! uses, and from raw `popen`/`fork` to `tokio::process::Command` so it
//! composes with the rest of the crate's selector-free async IO.

use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::element::{Element, RegistryError, Request, RequestId};
use crate::error::{Error, Result};
use crate::glue::splitter::TagSplitter;
use crate::tag::{Attributes, SourceChange, Tag, TagDistributor, TagMeta};

const COMMAND_IMPORT_FLAVOUR: u32 = 1;
const READ_CHUNK_SIZE: usize = 8192;

/// One spawned import subprocess, fanned out like
/// [`crate::rtmp::publish_stream::PublishStream`] fans out a publisher.
pub struct CommandElement {
    name: String,
    distributor: Mutex<TagDistributor>,
}

impl CommandElement {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            distributor: Mutex::new(TagDistributor::new()),
        })
    }

    fn push_tag(&self, tag: Tag) {
        self.distributor.lock().unwrap().distribute_tag(&tag);
    }

    /// Spawns `command` with its stdout piped, reads it to completion on a
    /// background task, splitting output through `splitter` and
    /// distributing the resulting tags. The child's stdin/stderr are left
    /// at their default (inherited) disposition; callers who need to feed
    /// the child or capture diagnostics should configure `command` before
    /// calling this.
    pub fn spawn(
        self: &Arc<Self>,
        mut command: Command,
        mut splitter: Box<dyn TagSplitter>,
    ) -> Result<()> {
        command.stdout(std::process::Stdio::piped());
        let mut child: Child = command.spawn().map_err(Error::Io)?;
        let mut stdout = child.stdout.take().ok_or_else(|| Error::Protocol("command has no stdout pipe".into()))?;

        let this = self.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => {
                        tracing::info!(name = %this.name, "command import reached eof");
                        break;
                    }
                    Ok(n) => {
                        for tag in splitter.split(bytes::Bytes::copy_from_slice(&buf[..n]), COMMAND_IMPORT_FLAVOUR) {
                            this.push_tag(tag);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(name = %this.name, error = %e, "command import read failed");
                        break;
                    }
                }
            }
            match child.wait().await {
                Ok(status) => tracing::info!(name = %this.name, %status, "command import process exited"),
                Err(e) => tracing::warn!(name = %this.name, error = %e, "command import process wait failed"),
            }
            this.distributor.lock().unwrap().close_all_callbacks(false);
        });

        Ok(())
    }
}

impl Element for CommandElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_request(&self, request: Request) -> std::result::Result<mpsc::UnboundedReceiver<Tag>, RegistryError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Tag::Bos { meta: TagMeta::new(Attributes::empty(), COMMAND_IMPORT_FLAVOUR, 0) });
        let _ = tx.send(Tag::SourceStarted {
            meta: TagMeta::new(Attributes::empty(), COMMAND_IMPORT_FLAVOUR, 0),
            change: SourceChange {
                source_element_name: self.name.clone(),
                path: self.name.clone(),
                is_final: true,
            },
            source_start_timestamp_ms: 0,
        });
        self.distributor.lock().unwrap().add_callback(request.id, COMMAND_IMPORT_FLAVOUR, tx);
        Ok(rx)
    }

    fn remove_request(&self, id: RequestId) {
        self.distributor.lock().unwrap().remove_callback(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_element_starts_with_no_subscribers() {
        let element = CommandElement::new("import/cmd");
        assert_eq!(element.distributor.lock().unwrap().len(), 0);
    }
}
