//! RTSP wire codec: start-line, header block, `Content-Length` body, and
//! `$`-prefixed interleaved RTP/RTCP frame recognition (spec §4.9),
//! grounded on `marmikshah-rtsp-rs`'s `request.rs`/`response.rs` text
//! parsing, generalized into an incremental [`RtspCodec`] over a growable
//! buffer in the style of `rtmp::chunk::ChunkDecoder::feed`, since an RTSP
//! connection interleaves request/response text with raw media frames on
//! the same socket once `Transport: RTP/AVP/TCP` is negotiated.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::rtsp::header::Header;

pub const RTSP_VERSION: &str = "RTSP/1.0";

#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RtspRequest {
    pub fn header(&self, name: &str) -> Option<Header> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(k, v)| Header::parse(k, v))
    }

    pub fn cseq(&self) -> u32 {
        match self.header("CSeq") {
            Some(Header::CSeq(n)) => n,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RtspResponse {
    pub fn new(status_code: u16, reason: impl Into<String>) -> Self {
        Self { status_code, reason: reason.into(), headers: Vec::new(), body: Bytes::new() }
    }

    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push((header.raw_name(), header.value()));
        self
    }

    pub fn with_body(mut self, content_type: &str, body: Bytes) -> Self {
        self.headers.push(("Content-Type".to_string(), content_type.to_string()));
        self.headers.push(("Content-Length".to_string(), body.len().to_string()));
        self.body = body;
        self
    }

    pub fn encode(&self) -> Bytes {
        let mut out = format!("{RTSP_VERSION} {} {}\r\n", self.status_code, self.reason);
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        let mut bytes = BytesMut::from(out.as_bytes());
        bytes.extend_from_slice(&self.body);
        bytes.freeze()
    }
}

/// One decoded unit off an RTSP connection: a textual request, or an
/// interleaved RTP/RTCP frame carried under an already-SETUP channel
/// (RFC 2326 §10.12's `$<channel><len><payload>` framing).
#[derive(Debug, Clone)]
pub enum Frame {
    Request(RtspRequest),
    Interleaved { channel: u8, payload: Bytes },
}

/// Incremental decoder over a growable receive buffer. One instance per
/// connection, fed directly from the socket read loop.
#[derive(Default)]
pub struct RtspCodec {
    buf: BytesMut,
}

const INTERLEAVED_MARKER: u8 = b'$';

impl RtspCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the next fully-buffered [`Frame`], or `None` if more data is
    /// needed. Never blocks; callers loop this after every `feed`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        if self.buf[0] == INTERLEAVED_MARKER {
            if self.buf.len() < 4 {
                return Ok(None);
            }
            let channel = self.buf[1];
            let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
            if self.buf.len() < 4 + len {
                return Ok(None);
            }
            self.buf.advance(4);
            let payload = self.buf.split_to(len).freeze();
            return Ok(Some(Frame::Interleaved { channel, payload }));
        }

        let header_end = match find_header_terminator(&self.buf) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let content_length = {
            let head = std::str::from_utf8(&self.buf[..header_end])
                .map_err(|_| Error::Protocol("RTSP header block was not valid UTF-8".into()))?;
            parse_content_length(head)?
        };

        let total_len = header_end + 4 + content_length;
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let head = self.buf.split_to(header_end).freeze();
        self.buf.advance(4); // the blank-line CRLFCRLF
        let body = self.buf.split_to(content_length).freeze();

        let request = parse_request(&head, body)?;
        Ok(Some(Frame::Request(request)))
    }
}

fn find_header_terminator(buf: &BytesMut) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_content_length(head: &str) -> Result<usize> {
    for line in head.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                return value
                    .trim()
                    .parse()
                    .map_err(|_| Error::Protocol(format!("malformed Content-Length: {value}")));
            }
        }
    }
    Ok(0)
}

fn parse_request(head: &[u8], body: Bytes) -> Result<RtspRequest> {
    let head = std::str::from_utf8(head).map_err(|_| Error::Protocol("RTSP request was not valid UTF-8".into()))?;
    let mut lines = head.split("\r\n");
    let start_line = lines.next().filter(|l| !l.is_empty()).ok_or_else(|| Error::Protocol("empty RTSP request".into()))?;

    let mut parts = start_line.splitn(3, ' ');
    let method = parts.next().ok_or_else(|| Error::Protocol("missing RTSP method".into()))?.to_string();
    let uri = parts.next().ok_or_else(|| Error::Protocol("missing RTSP request URI".into()))?.to_string();
    let version = parts.next().ok_or_else(|| Error::Protocol("missing RTSP version".into()))?.to_string();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| Error::Protocol(format!("malformed RTSP header line: {line}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(RtspRequest { method, uri, version, headers, body })
}
