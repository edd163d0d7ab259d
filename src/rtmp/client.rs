//! Outbound RTMP publishing client: connects to a remote RTMP endpoint,
//! performs the client side of the handshake, issues `connect`/
//! `createStream`/`publish`, and forwards a [`Tag`] stream as chunk-encoded
//! audio/video/metadata messages.
//!
//! Mirrors [`crate::rtmp::play_stream::PlayStream`]'s [`TagSink`] adapter,
//! but as the connecting side rather than the accepting side, and used by
//! [`crate::glue::rtmp_publish::RtmpPublishingElement`] to re-publish this
//! server's media into a downstream RTMP ingest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use std::sync::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::exporter::TagSink;
use crate::rtmp::amf::{amf0, AmfValue};
use crate::rtmp::chunk::{ChunkDecoder, ChunkEncoder};
use crate::rtmp::connection::decode_event;
use crate::rtmp::message::{Event, MessageTypeId};
use crate::rtmp::protocol::constants::{CS_ID_AUDIO, CS_ID_COMMAND, CS_ID_METADATA, CS_ID_VIDEO, DEFAULT_CHUNK_SIZE};
use crate::rtmp::protocol::message::Command;
use crate::rtmp::protocol::{Handshake, HandshakeRole};
use crate::tag::Tag;

/// Target and tunables for an outbound publish (spec §2's "RTMP publishing
/// element"), the generalized counterpart of [`crate::rtmp::connection::RtmpConfig`]
/// for the connecting rather than the accepting side.
#[derive(Debug, Clone)]
pub struct PublishTarget {
    pub addr: std::net::SocketAddr,
    pub app: String,
    pub stream_key: String,
    pub chunk_size: u32,
    pub connect_timeout: Duration,
}

impl PublishTarget {
    pub fn new(addr: std::net::SocketAddr, app: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            addr,
            app: app.into(),
            stream_key: stream_key.into(),
            chunk_size: DEFAULT_CHUNK_SIZE as u32,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// A live outbound publish. Owns the chunk encoder state and funnels bytes
/// through the same single-writer-task shape as [`crate::rtmp::connection::ServerConnection`].
pub struct PublishClient {
    message_stream_id: u32,
    encoder: Mutex<ChunkEncoder>,
    out_tx: mpsc::UnboundedSender<Bytes>,
    closed: AtomicBool,
}

impl PublishClient {
    /// Connects, handshakes, and completes `connect`/`createStream`/`publish`
    /// against `target`. Returns a sink ready to receive the published [`Tag`]
    /// stream plus a background task handle driving the socket.
    pub async fn connect(target: PublishTarget) -> Result<Arc<Self>> {
        let socket = tokio::time::timeout(target.connect_timeout, TcpStream::connect(target.addr))
            .await
            .map_err(|_| Error::Protocol(format!("connect to {} timed out", target.addr)))??;
        socket.set_nodelay(true).ok();

        let (mut read_half, mut write_half) = tokio::io::split(socket);

        let mut handshake = Handshake::new(HandshakeRole::Client);
        if let Some(c0c1) = handshake.generate_initial() {
            write_half.write_all(&c0c1).await?;
        }
        let mut pending = BytesMut::new();
        let mut read_buf = [0u8; 4096];
        while !handshake.is_done() {
            let n = read_half.read(&mut read_buf).await?;
            if n == 0 {
                return Err(Error::Protocol("peer closed during handshake".into()));
            }
            pending.extend_from_slice(&read_buf[..n]);
            if pending.len() < handshake.bytes_needed() {
                continue;
            }
            let mut chunk = pending.split().freeze();
            if let Some(reply) = handshake.process(&mut chunk)? {
                write_half.write_all(&reply).await?;
            }
            pending.extend_from_slice(&chunk);
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();
        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(target.chunk_size as usize);

        let connect_cmd = Command::new(
            "connect",
            1.0,
            connect_command_object(&target.app),
            Vec::new(),
        );
        out_tx
            .send(encoder.encode(CS_ID_COMMAND, 0, 0, MessageTypeId::CommandAmf0, &amf0::encode_all(&connect_cmd.into_values())))
            .ok();
        out_tx
            .send(encoder.encode(
                CS_ID_COMMAND,
                0,
                0,
                MessageTypeId::CommandAmf0,
                &amf0::encode_all(&Command::new("createStream", 2.0, AmfValue::Null, Vec::new()).into_values()),
            ))
            .ok();

        tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let mut decoder = ChunkDecoder::new();
        let message_stream_id = wait_for_create_stream_result(&mut read_half, &mut decoder, &mut pending).await?;

        let publish_cmd = Command::new(
            "publish",
            3.0,
            AmfValue::Null,
            vec![AmfValue::String(target.stream_key.clone()), AmfValue::String("live".to_string())],
        );
        out_tx
            .send(encoder.encode(
                CS_ID_COMMAND,
                message_stream_id,
                0,
                MessageTypeId::CommandAmf0,
                &amf0::encode_all(&publish_cmd.into_values()),
            ))
            .ok();

        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });
        Ok(Arc::new(Self {
            message_stream_id,
            encoder: Mutex::new(encoder),
            out_tx,
            closed: AtomicBool::new(false),
        }))
    }

    fn encode_and_queue(&self, chunk_stream_id: u32, timestamp_ms: u32, message_type: MessageTypeId, payload: &[u8]) {
        let bytes = self.encoder.lock().unwrap().encode(chunk_stream_id, self.message_stream_id, timestamp_ms, message_type, payload);
        let _ = self.out_tx.send(bytes);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl TagSink for PublishClient {
    fn can_send_tag(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn send_tag(&self, tag: Tag) {
        let ts = tag.timestamp_ms().max(0) as u32;
        match &tag {
            Tag::Flv { data, .. } => {
                let (message_type, cs_id) = if tag.meta().is_video() {
                    (MessageTypeId::Video, CS_ID_VIDEO)
                } else if tag.meta().is_audio() {
                    (MessageTypeId::Audio, CS_ID_AUDIO)
                } else {
                    return;
                };
                self.encode_and_queue(cs_id, ts, message_type, data);
            }
            Tag::FlvHeader { data, .. } => {
                self.encode_and_queue(CS_ID_METADATA, ts, MessageTypeId::DataAmf0, data);
            }
            Tag::Eos { .. } => self.close(),
            _ => {}
        }
    }

    fn set_notify_ready(&self) {}
}

fn connect_command_object(app: &str) -> AmfValue {
    let mut obj = HashMap::new();
    obj.insert("app".to_string(), AmfValue::String(app.to_string()));
    obj.insert("type".to_string(), AmfValue::String("nonprivate".to_string()));
    obj.insert("flashVer".to_string(), AmfValue::String("FMLE/3.0".to_string()));
    AmfValue::Object(obj)
}

async fn wait_for_create_stream_result(
    read_half: &mut tokio::io::ReadHalf<TcpStream>,
    decoder: &mut ChunkDecoder,
    pending: &mut BytesMut,
) -> Result<u32> {
    let mut read_buf = [0u8; 4096];
    loop {
        let n = read_half.read(&mut read_buf).await?;
        if n == 0 {
            return Err(Error::Protocol("peer closed before createStream result".into()));
        }
        pending.extend_from_slice(&read_buf[..n]);
        let mut buf = pending.split().freeze();
        let messages = decoder.feed(&mut buf)?;
        pending.extend_from_slice(&buf);
        for raw in messages {
            if let Event::Command { command, .. } = decode_event(&raw)? {
                if command.name == "_result" {
                    if let Some(id) = command.arguments.first().and_then(AmfValue::as_number) {
                        return Ok(id as u32);
                    }
                } else if command.name == "_error" {
                    return Err(Error::Protocol("peer rejected connect/createStream".into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_defaults_chunk_size() {
        let t = PublishTarget::new("127.0.0.1:1935".parse().unwrap(), "live", "mystream");
        assert_eq!(t.chunk_size, DEFAULT_CHUNK_SIZE as u32);
    }
}
