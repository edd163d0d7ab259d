//! Record framing within a block (spec.md §6.1: "codec-defined").
//!
//! Each record is framed as a 1-byte flags field (bit 0 = deflate-
//! compressed) followed by a `u32` little-endian payload length and the
//! payload itself. [`Recorder`] accumulates framed records into
//! fixed-size blocks, splitting a record's bytes across a block boundary
//! when it doesn't fit — mirroring `LogWriter`'s `buf_`/`recorder_`
//! pairing, where `recorder_.leftover()` is the tail of a record not yet
//! flushed into a full block.

use bytes::{Buf, BufMut, BytesMut};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

const FLAG_DEFLATE: u8 = 0x01;
const HEADER_LEN: usize = 1 + 4;

/// Packs records into fixed-size blocks, padding the final partial block
/// with zeros on `finalize_block` (spec §4.3: "finalize any partial block
/// (pad to block boundary)").
pub struct Recorder {
    block_size: usize,
    deflate: bool,
    /// Bytes of a complete block are appended here; `take_block` drains
    /// exactly `block_size` bytes once enough has accumulated.
    pending: BytesMut,
}

impl Recorder {
    pub fn new(block_size: u32, deflate: bool) -> Self {
        Self {
            block_size: block_size as usize,
            deflate,
            pending: BytesMut::new(),
        }
    }

    /// Bytes buffered but not yet forming a complete block.
    pub fn leftover(&self) -> usize {
        self.pending.len() % self.block_size
    }

    /// Frame `payload` as one record and append it to the pending byte
    /// stream. Does not itself know about block boundaries — block
    /// splitting is purely a matter of how many bytes `take_block` drains.
    pub fn push_record(&mut self, payload: &[u8]) {
        let (flag, body) = if self.deflate {
            (FLAG_DEFLATE, compress(payload))
        } else {
            (0u8, payload.to_vec())
        };
        self.pending.put_u8(flag);
        self.pending.put_u32_le(body.len() as u32);
        self.pending.put_slice(&body);
    }

    /// Drain exactly one `block_size` worth of bytes if available.
    pub fn take_block(&mut self) -> Option<BytesMut> {
        if self.pending.len() < self.block_size {
            return None;
        }
        Some(self.pending.split_to(self.block_size))
    }

    /// Pad the remaining bytes to a full block with zeros and drain it,
    /// used when closing the log with a partial block outstanding.
    pub fn finalize_block(&mut self) -> Option<BytesMut> {
        if self.pending.is_empty() {
            return None;
        }
        let pad = self.block_size - self.pending.len();
        self.pending.put_bytes(0, pad);
        self.take_block()
    }
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("in-memory encoder write cannot fail");
    enc.finish().expect("in-memory encoder finish cannot fail")
}

pub(super) fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;
    let mut dec = ZlibDecoder::new(data);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)?;
    Ok(out)
}

/// One decoded record header, as read back from a block by
/// [`super::reader::LogReader`].
pub struct RecordHeader {
    pub compressed: bool,
    pub len: u32,
}

pub(super) fn parse_header(buf: &[u8]) -> Option<RecordHeader> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let flags = buf[0];
    let mut len_bytes = &buf[1..5];
    let len = len_bytes.get_u32_le();
    Some(RecordHeader { compressed: flags & FLAG_DEFLATE != 0, len })
}

pub(super) const fn header_len() -> usize {
    HEADER_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain_one_block() {
        let mut rec = Recorder::new(32, false);
        rec.push_record(b"hello");
        assert!(rec.take_block().is_none(), "not yet a full block");
        rec.push_record(&[0u8; 32]);
        let block = rec.take_block();
        assert!(block.is_some());
        assert_eq!(block.unwrap().len(), 32);
    }

    #[test]
    fn finalize_pads_partial_block() {
        let mut rec = Recorder::new(64, false);
        rec.push_record(b"abc");
        let block = rec.finalize_block().unwrap();
        assert_eq!(block.len(), 64);
    }

    #[test]
    fn deflate_round_trips() {
        let mut rec = Recorder::new(4096, true);
        let payload = vec![7u8; 500];
        rec.push_record(&payload);
        let block = rec.finalize_block().unwrap();
        let header = parse_header(&block).unwrap();
        assert!(header.compressed);
        let body = &block[header_len()..header_len() + header.len as usize];
        let decompressed = decompress(body).unwrap();
        assert_eq!(decompressed, payload);
    }
}
