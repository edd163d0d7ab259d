//! Segmented byte stream with marker/restore (spec.md §4.2).
//!
//! This is the only primitive the protocol codecs (`rtmp::chunk`,
//! `rtsp::codec`, `log::recorder`) use for back-off on "need more data"
//! paths: a codec calls [`MarkerBuf::mark`] before attempting to parse a
//! message, and [`MarkerBuf::restore`] to rewind if the buffer didn't hold
//! a complete message, without losing already-buffered bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A read/write cursor over a growable buffer that supports nested
/// mark/restore, matching `plixai-rtmp-rs`'s `Bytes`/`BytesMut` idiom
/// (`protocol::handshake`) rather than a hand-rolled ring buffer.
///
/// Markers stack: `mark()` pushes the current read position, `restore()`
/// pops and rewinds to it, `clear()` pops without rewinding. Reading past
/// marked data never discards it until every marker referencing it has
/// been cleared; writes never invalidate outstanding markers because they
/// only ever append past `buf.len()`.
#[derive(Debug, Default)]
pub struct MarkerBuf {
    buf: BytesMut,
    pos: usize,
    markers: Vec<usize>,
}

impl MarkerBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(cap),
            pos: 0,
            markers: Vec::new(),
        }
    }

    /// Number of bytes available to read from the current position.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Append bytes to the write tail. Never invalidates markers.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Push the current read position onto the marker stack.
    pub fn mark(&mut self) {
        self.markers.push(self.pos);
    }

    /// Rewind to the most recently pushed marker and pop it.
    ///
    /// Panics if there is no outstanding marker — a programming error in
    /// the caller, not a data condition.
    pub fn restore(&mut self) {
        let at = self
            .markers
            .pop()
            .unwrap_or_else(|| crate::error::bug("MarkerBuf::restore with no marker set"));
        self.pos = at;
    }

    /// Discard the most recently pushed marker without rewinding.
    pub fn clear_marker(&mut self) {
        self.markers
            .pop()
            .unwrap_or_else(|| crate::error::bug("MarkerBuf::clear_marker with no marker set"));
        self.compact_if_idle();
    }

    /// Peek at up to `len` unread bytes without advancing the cursor.
    pub fn peek(&self, len: usize) -> Option<&[u8]> {
        if self.remaining() < len {
            return None;
        }
        Some(&self.buf[self.pos..self.pos + len])
    }

    /// Read and consume exactly `len` bytes, or return `None` and leave the
    /// cursor untouched if not enough data is buffered yet.
    pub fn take(&mut self, len: usize) -> Option<Bytes> {
        if self.remaining() < len {
            return None;
        }
        let start = self.pos;
        self.pos += len;
        Some(Bytes::copy_from_slice(&self.buf[start..start + len]))
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn get_u16_be(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u24_be(&mut self) -> Option<u32> {
        self.take(3).map(|b| u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn get_u32_be(&mut self) -> Option<u32> {
        self.take(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Scan unread data for `needle`, returning the byte offset from the
    /// current position if found (used by `rtsp::codec` to find the blank
    /// line terminating a header block).
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        let hay = &self.buf[self.pos..];
        hay.windows(needle.len()).position(|w| w == needle)
    }

    /// Drop bytes already consumed by every outstanding marker. Called
    /// automatically once the marker stack empties; codecs never need to
    /// call this directly.
    fn compact_if_idle(&mut self) {
        if self.markers.is_empty() && self.pos > 0 {
            self.buf.advance(self.pos);
            self.pos = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }
}
