//! RTMP chunk-stream coder/decoder: type 0/1/2/3 chunk headers, extended
//! timestamps, and per-chunk-stream last-header state used to compact
//! later chunks of the same message type (spec §4.7; header-compaction
//! rules grounded on `rtmp_connection.cc`'s per-channel send/receive state
//! since `rtmp_coder.cc` itself wasn't in the retrieval pack).

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::message::MessageTypeId;

/// One assembled chunk-stream header, independent of which of the four
/// wire formats (fmt 0-3) produced it.
#[derive(Debug, Clone, Copy)]
struct ChunkHeader {
    timestamp: u32,
    message_length: u32,
    message_type_id: u8,
    message_stream_id: u32,
}

struct IncomingMessage {
    header: ChunkHeader,
    buf: BytesMut,
    extended_timestamp: bool,
}

/// Decodes an incoming byte stream into complete messages, reassembling
/// each chunk-stream's partial message across chunk boundaries.
pub struct ChunkDecoder {
    chunk_size: usize,
    last_header: HashMap<u32, ChunkHeader>,
    in_progress: HashMap<u32, IncomingMessage>,
}

/// A single reassembled message ready for the message layer.
pub struct RawMessage {
    pub chunk_stream_id: u32,
    pub message_stream_id: u32,
    pub timestamp: u32,
    pub message_type_id: u8,
    pub payload: Bytes,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: super::protocol::constants::DEFAULT_CHUNK_SIZE,
            last_header: HashMap::new(),
            in_progress: HashMap::new(),
        }
    }

    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = (size as usize).clamp(1, super::protocol::constants::MAX_CHUNK_SIZE);
    }

    /// Feed newly-received bytes; returns every message that became
    /// complete as a result. `buf`'s consumed prefix is advanced.
    pub fn feed(&mut self, buf: &mut Bytes) -> Result<Vec<RawMessage>> {
        let mut out = Vec::new();
        while let Some(msg) = self.decode_one(buf)? {
            out.push(msg);
        }
        Ok(out)
    }

    fn decode_one(&mut self, buf: &mut Bytes) -> Result<Option<RawMessage>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let mut cursor = buf.clone();

        let first = cursor[0];
        let fmt = first >> 6;
        let Some((chunk_stream_id, basic_len)) = decode_basic_header(&cursor) else {
            return Ok(None);
        };
        cursor.advance(basic_len);

        let header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            3 => 0,
            _ => unreachable!("fmt is 2 bits"),
        };
        if cursor.remaining() < header_len {
            return Ok(None);
        }

        let prev = self.last_header.get(&chunk_stream_id).copied();
        let mut header = match fmt {
            0 => {
                let timestamp = read_u24(&mut cursor);
                let message_length = read_u24(&mut cursor);
                let message_type_id = cursor.get_u8();
                let message_stream_id = cursor.get_u32_le();
                ChunkHeader { timestamp, message_length, message_type_id, message_stream_id }
            }
            1 => {
                let delta = read_u24(&mut cursor);
                let message_length = read_u24(&mut cursor);
                let message_type_id = cursor.get_u8();
                let base = prev.ok_or_else(|| Error::Protocol("fmt1 chunk with no prior header".into()))?;
                ChunkHeader {
                    timestamp: base.timestamp.wrapping_add(delta),
                    message_length,
                    message_type_id,
                    message_stream_id: base.message_stream_id,
                }
            }
            2 => {
                let delta = read_u24(&mut cursor);
                let base = prev.ok_or_else(|| Error::Protocol("fmt2 chunk with no prior header".into()))?;
                ChunkHeader {
                    timestamp: base.timestamp.wrapping_add(delta),
                    message_length: base.message_length,
                    message_type_id: base.message_type_id,
                    message_stream_id: base.message_stream_id,
                }
            }
            _ => prev.ok_or_else(|| Error::Protocol("fmt3 chunk with no prior header".into()))?,
        };

        let mut extended = false;
        let raw_field_is_sentinel = fmt == 0 && header.timestamp == 0x00FF_FFFF;
        if raw_field_is_sentinel || (fmt == 3 && prev.map(|p| p.timestamp).unwrap_or(0) == 0x00FF_FFFF) {
            if cursor.remaining() < 4 {
                return Ok(None);
            }
            let ext = cursor.get_u32();
            header.timestamp = ext;
            extended = true;
        }

        self.last_header.insert(chunk_stream_id, header);

        let entry = self.in_progress.entry(chunk_stream_id).or_insert_with(|| IncomingMessage {
            header,
            buf: BytesMut::with_capacity(header.message_length as usize),
            extended_timestamp: extended,
        });
        if entry.buf.is_empty() {
            entry.header = header;
        }

        let remaining_in_message = header.message_length as usize - entry.buf.len();
        let take = remaining_in_message.min(self.chunk_size);
        if cursor.remaining() < take {
            return Ok(None);
        }
        let chunk_consumed = basic_len + header_len + if extended { 4 } else { 0 } + take;
        let payload = cursor.copy_to_bytes(take);
        entry.buf.extend_from_slice(&payload);
        buf.advance(chunk_consumed);

        if entry.buf.len() == header.message_length as usize {
            let done = self.in_progress.remove(&chunk_stream_id).unwrap();
            Ok(Some(RawMessage {
                chunk_stream_id,
                message_stream_id: done.header.message_stream_id,
                timestamp: done.header.timestamp,
                message_type_id: done.header.message_type_id,
                payload: done.buf.freeze(),
            }))
        } else {
            Ok(None)
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `(chunk_stream_id, bytes_consumed)`, or `None` if `buf` doesn't
/// yet hold the full basic header.
fn decode_basic_header(buf: &Bytes) -> Option<(u32, usize)> {
    let first = buf[0];
    let fmt_bits = first & 0x3F;
    match fmt_bits {
        0 => {
            if buf.remaining() < 2 {
                return None;
            }
            Some((64 + buf[1] as u32, 2))
        }
        1 => {
            if buf.remaining() < 3 {
                return None;
            }
            Some((64 + buf[1] as u32 + (buf[2] as u32) * 256, 3))
        }
        id => Some((id as u32, 1)),
    }
}

fn read_u24(buf: &mut Bytes) -> u32 {
    let a = buf.get_u8() as u32;
    let b = buf.get_u8() as u32;
    let c = buf.get_u8() as u32;
    (a << 16) | (b << 8) | c
}

fn write_u24(out: &mut BytesMut, v: u32) {
    out.put_u8((v >> 16) as u8);
    out.put_u8((v >> 8) as u8);
    out.put_u8(v as u8);
}

/// Encodes outgoing messages as fmt-0 chunks (simplest correct encoding;
/// this crate never needs the bandwidth savings of fmt 1-3 on the send
/// side since every message carries its own stream id and type already).
pub struct ChunkEncoder {
    chunk_size: usize,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self { chunk_size: super::protocol::constants::DEFAULT_CHUNK_SIZE }
    }

    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.clamp(1, super::protocol::constants::MAX_CHUNK_SIZE);
    }

    pub fn encode(
        &self,
        chunk_stream_id: u32,
        message_stream_id: u32,
        timestamp: u32,
        message_type: MessageTypeId,
        payload: &[u8],
    ) -> Bytes {
        let mut out = BytesMut::with_capacity(payload.len() + payload.len() / self.chunk_size + 16);
        let extended = timestamp >= 0x00FF_FFFF;

        write_basic_header(&mut out, 0, chunk_stream_id);
        write_u24(&mut out, if extended { 0x00FF_FFFF } else { timestamp });
        write_u24(&mut out, payload.len() as u32);
        out.put_u8(message_type.to_byte());
        out.put_u32_le(message_stream_id);
        if extended {
            out.put_u32(timestamp);
        }

        for (i, chunk) in payload.chunks(self.chunk_size).enumerate() {
            if i > 0 {
                write_basic_header(&mut out, 3, chunk_stream_id);
                if extended {
                    out.put_u32(timestamp);
                }
            }
            out.put_slice(chunk);
        }
        out.freeze()
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_basic_header(out: &mut BytesMut, fmt: u8, chunk_stream_id: u32) {
    match chunk_stream_id {
        id if id < 64 => out.put_u8((fmt << 6) | id as u8),
        id if id < 320 => {
            out.put_u8(fmt << 6);
            out.put_u8((id - 64) as u8);
        }
        id => {
            let id = id - 64;
            out.put_u8((fmt << 6) | 1);
            out.put_u8((id & 0xFF) as u8);
            out.put_u8((id >> 8) as u8);
        }
    }
}
