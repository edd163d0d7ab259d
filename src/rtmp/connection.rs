//! RTMP server connection: one TCP socket's handshake, command dispatch,
//! and media forwarding (spec §8).
//!
//! Grounded on `server::listener::RtmpServer`/`session::state::SessionState`
//! for the accept loop and phase machine, generalized to route publish/play
//! requests through [`crate::element::ElementMapper`] instead of the flat
//! `StreamRegistry`, and to drive outbound media through [`PlayStream`] /
//! [`crate::exporter::Exporter`] instead of a raw `broadcast::Receiver`.
//! Every outbound byte, whether a command reply or paced media, funnels
//! through one `out_tx` channel into a single writer half so the socket
//! never needs more than one owner at a time.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};

use crate::element::{Capabilities, ElementMapper, Path, Request, RequestId};
use crate::error::{Error, Result};
use crate::exporter::Exporter;
use crate::rtmp::amf::{amf0, AmfValue};
use crate::rtmp::chunk::{ChunkDecoder, ChunkEncoder};
use crate::rtmp::message::{Event, MessageTypeId};
use crate::rtmp::play_stream::PlayStream;
use crate::rtmp::protocol::constants::{CS_ID_COMMAND, DEFAULT_CHUNK_SIZE, METHOD_ON_STATUS, METHOD_RESULT};
use crate::rtmp::protocol::message::Command;
use crate::rtmp::protocol::quirks::EncoderType;
use crate::rtmp::protocol::{Handshake, HandshakeRole};
use crate::rtmp::publish_stream::PublishStream;
use crate::selector::SelectorHandle;
use crate::tag::{Attributes, Tag, TagMeta};

const RTMP_FLAVOUR: u32 = 1;

/// Tunables for the RTMP front-end, the generalized counterpart of
/// `server::config::ServerConfig`.
#[derive(Debug, Clone)]
pub struct RtmpConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    pub chunk_size: u32,
    pub window_ack_size: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub tcp_nodelay: bool,
    pub flow_control_video_ms: u64,
    pub flow_control_total_ms: u64,
    pub max_write_ahead_ms: i64,
}

impl Default for RtmpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1935".parse().unwrap(),
            max_connections: 0,
            chunk_size: DEFAULT_CHUNK_SIZE as u32,
            window_ack_size: 2_500_000,
            connection_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            tcp_nodelay: true,
            flow_control_video_ms: 2_000,
            flow_control_total_ms: 4_000,
            max_write_ahead_ms: 10_000,
        }
    }
}

impl RtmpConfig {
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.min(crate::rtmp::protocol::constants::MAX_CHUNK_SIZE as u32);
        self
    }
}

/// Accepts RTMP connections and spawns one task per socket. Owns the
/// `ElementMapper` every publish/play request is routed through and the
/// `Selector` its exporters post pacing work onto.
pub struct RtmpServer {
    config: RtmpConfig,
    mapper: Arc<ElementMapper>,
    network_selector: SelectorHandle,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RtmpServer {
    pub fn new(config: RtmpConfig, mapper: Arc<ElementMapper>, network_selector: SelectorHandle) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };
        Self {
            config,
            mapper,
            network_selector,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "RTMP server listening");

        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => tracing::error!(error = %e, "failed to accept connection"),
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = match &self.connection_semaphore {
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "failed to configure socket");
                return;
            }
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let config = self.config.clone();
        let mapper = Arc::clone(&self.mapper);
        let selector = self.network_selector.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let conn = ServerConnection::new(session_id, socket, peer_addr, config, mapper, selector);
            if let Err(e) = conn.run().await {
                tracing::debug!(session_id, error = %e, "connection ended with error");
            }
            tracing::debug!(session_id, "connection closed");
        });
    }
}

struct ActivePublish {
    path: Path,
    stream: Arc<PublishStream>,
}

struct ActivePlay {
    path: Path,
    request_id: RequestId,
}

/// One RTMP connection's life from accept to close: drives the handshake,
/// decodes chunk-stream messages, dispatches AMF0 commands, and forwards
/// publish/play media through the element graph.
pub struct ServerConnection {
    session_id: u64,
    socket: Option<TcpStream>,
    peer_addr: SocketAddr,
    config: RtmpConfig,
    mapper: Arc<ElementMapper>,
    network_selector: SelectorHandle,
    app: Option<String>,
    encoder_type: EncoderType,
    next_message_stream_id: u32,
    publishing: HashMap<u32, ActivePublish>,
    playing: HashMap<u32, ActivePlay>,
    out_tx: mpsc::UnboundedSender<Bytes>,
    out_rx: Option<mpsc::UnboundedReceiver<Bytes>>,
}

impl ServerConnection {
    pub fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: RtmpConfig,
        mapper: Arc<ElementMapper>,
        network_selector: SelectorHandle,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        Self {
            session_id,
            socket: Some(socket),
            peer_addr,
            config,
            mapper,
            network_selector,
            app: None,
            encoder_type: EncoderType::Unknown,
            next_message_stream_id: 1,
            publishing: HashMap::new(),
            playing: HashMap::new(),
            out_tx,
            out_rx,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.do_handshake().await?;

        let socket = self.socket.take().expect("socket present for connection lifetime");
        let (mut read_half, mut write_half) = tokio::io::split(socket);
        let mut out_rx = self.out_rx.take().expect("out_rx taken once");

        let mut decoder = ChunkDecoder::new();
        let mut pending = BytesMut::new();
        let mut read_buf = [0u8; 8192];

        loop {
            tokio::select! {
                bytes = out_rx.recv() => {
                    match bytes {
                        Some(b) => write_half.write_all(&b).await?,
                        None => break,
                    }
                }
                n = read_half.read(&mut read_buf) => {
                    let n = n?;
                    if n == 0 {
                        break;
                    }
                    pending.extend_from_slice(&read_buf[..n]);
                    let mut buf = pending.split().freeze();
                    let messages = decoder.feed(&mut buf)?;
                    pending.extend_from_slice(&buf);
                    for raw in messages {
                        let event = decode_event(&raw)?;
                        self.handle_event(raw.message_stream_id, event, &mut decoder).await?;
                    }
                }
            }
        }

        self.teardown().await;
        Ok(())
    }

    async fn do_handshake(&mut self) -> Result<()> {
        let socket = self.socket.as_mut().expect("socket present during handshake");
        let mut handshake = Handshake::new(HandshakeRole::Server);
        handshake.generate_initial();

        let mut buf = BytesMut::with_capacity(4096);
        loop {
            let n = socket.read_buf(&mut buf).await?;
            if n == 0 {
                return Err(Error::Protocol("peer closed during handshake".into()));
            }
            let mut data = buf.clone().freeze();
            if let Some(response) = handshake.process(&mut data)? {
                socket.write_all(&response).await?;
            }
            buf = BytesMut::from(&data[..]);
            if handshake.is_done() {
                return Ok(());
            }
        }
    }

    async fn handle_event(&mut self, message_stream_id: u32, event: Event, decoder: &mut ChunkDecoder) -> Result<()> {
        match event {
            Event::Command { command, .. } => self.handle_command(message_stream_id, command).await?,
            Event::SetChunkSize(size) => decoder.set_chunk_size(size),
            Event::Audio { timestamp_ms, data, .. } => self.forward_media(message_stream_id, timestamp_ms, data, false),
            Event::Video { timestamp_ms, data, .. } => self.forward_media(message_stream_id, timestamp_ms, data, true),
            Event::Metadata { timestamp_ms, values, .. } => self.forward_metadata(message_stream_id, timestamp_ms, values),
            Event::WindowAckSize(_) | Event::Acknowledgement(_) | Event::SetPeerBandwidth { .. } | Event::UserControl { .. } | Event::Aggregate { .. } => {}
        }
        Ok(())
    }

    async fn handle_command(&mut self, message_stream_id: u32, command: Command) -> Result<()> {
        match command.name.as_str() {
            "connect" => self.handle_connect(command)?,
            "releaseStream" | "FCPublish" | "FCUnpublish" => {}
            "createStream" => self.handle_create_stream(command)?,
            "publish" => self.handle_publish(message_stream_id, command).await?,
            "play" => self.handle_play(message_stream_id, command).await?,
            "deleteStream" | "closeStream" => self.handle_delete_stream(message_stream_id).await,
            "pause" => {}
            _ => tracing::debug!(name = %command.name, "unhandled command"),
        }
        Ok(())
    }

    fn handle_connect(&mut self, command: Command) -> Result<()> {
        let app = command.command_object.get_string("app").unwrap_or("").to_string();
        let flash_ver = command.command_object.get_string("flashVer").unwrap_or("");
        self.encoder_type = EncoderType::from_flash_ver(flash_ver);
        self.app = Some(app);

        self.send_command(Command::new(
            METHOD_RESULT,
            command.transaction_id,
            connect_result_properties(),
            vec![connect_result_info()],
        ))
    }

    fn handle_create_stream(&mut self, command: Command) -> Result<()> {
        let stream_id = self.next_message_stream_id;
        self.next_message_stream_id += 1;
        self.send_command(Command::new(
            METHOD_RESULT,
            command.transaction_id,
            AmfValue::Null,
            vec![AmfValue::Number(stream_id as f64)],
        ))
    }

    async fn handle_publish(&mut self, message_stream_id: u32, command: Command) -> Result<()> {
        let stream_key = command.arguments.first().and_then(AmfValue::as_str).unwrap_or("").to_string();
        let app = self.app.clone().unwrap_or_default();
        let path = Path::new(format!("{app}/{stream_key}"));

        let publish_stream = Arc::new(PublishStream::new(stream_key.clone()));
        self.mapper.register_element(path.clone(), publish_stream.clone()).await;
        self.publishing.insert(message_stream_id, ActivePublish { path, stream: publish_stream });

        self.send_on_status(message_stream_id, "status", "NetStream.Publish.Start", &format!("{stream_key} is now published"))
    }

    async fn handle_play(&mut self, message_stream_id: u32, command: Command) -> Result<()> {
        let stream_key = command.arguments.first().and_then(AmfValue::as_str).unwrap_or("").to_string();
        let app = self.app.clone().unwrap_or_default();
        let path = Path::new(format!("{app}/{stream_key}"));

        let request = Request::new(path.clone(), self.session_id, self.peer_addr.to_string(), Capabilities { flavour_mask: RTMP_FLAVOUR });
        let request_id = request.id;
        let rx = match self.mapper.add_request(request).await {
            Ok(rx) => rx,
            Err(e) => {
                return self.send_on_status(message_stream_id, "error", "NetStream.Play.StreamNotFound", &e.to_string());
            }
        };

        self.playing.insert(message_stream_id, ActivePlay { path, request_id });
        self.send_on_status(message_stream_id, "status", "NetStream.Play.Start", &format!("{stream_key} is now playing"))?;

        let play_stream = PlayStream::new(message_stream_id, self.config.chunk_size, self.out_tx.clone());
        let exporter = Arc::new(Exporter::new(
            self.config.flow_control_video_ms,
            self.config.flow_control_total_ms,
            self.config.max_write_ahead_ms,
            self.network_selector.clone(),
        ));
        tokio::spawn(play_stream.run(exporter, rx));
        Ok(())
    }

    async fn handle_delete_stream(&mut self, message_stream_id: u32) {
        if let Some(publish) = self.publishing.remove(&message_stream_id) {
            publish.stream.close(false);
            self.mapper.unregister_element(&publish.path).await;
        }
        if let Some(play) = self.playing.remove(&message_stream_id) {
            self.mapper.remove_request(&play.path, play.request_id).await;
        }
    }

    fn forward_media(&mut self, message_stream_id: u32, timestamp_ms: u32, data: Bytes, is_video: bool) {
        let Some(publish) = self.publishing.get(&message_stream_id) else { return };
        let attrs = if is_video { Attributes::VIDEO | Attributes::DROPPABLE } else { Attributes::AUDIO };
        let tag = Tag::Flv {
            meta: TagMeta::new(attrs, RTMP_FLAVOUR, timestamp_ms as i64),
            data,
        };
        publish.stream.push_tag(tag);
    }

    fn forward_metadata(&mut self, message_stream_id: u32, timestamp_ms: u32, values: Vec<AmfValue>) {
        let Some(publish) = self.publishing.get(&message_stream_id) else { return };
        let data = amf0::encode_all(&values);
        let tag = Tag::FlvHeader {
            meta: TagMeta::new(Attributes::METADATA, RTMP_FLAVOUR, timestamp_ms as i64),
            data,
        };
        publish.stream.push_tag(tag);
    }

    /// Queues a command reply onto the shared outbound channel; the
    /// connection's single writer half is the only thing that ever touches
    /// the socket once the handshake completes.
    fn send_command(&self, command: Command) -> Result<()> {
        let payload = amf0::encode_all(&command.into_values());
        self.queue_message(CS_ID_COMMAND, 0, 0, MessageTypeId::CommandAmf0, &payload)
    }

    fn send_on_status(&self, message_stream_id: u32, level: &str, code: &str, description: &str) -> Result<()> {
        let mut info = HashMap::new();
        info.insert("level".to_string(), AmfValue::String(level.to_string()));
        info.insert("code".to_string(), AmfValue::String(code.to_string()));
        info.insert("description".to_string(), AmfValue::String(description.to_string()));
        let command = Command::new(METHOD_ON_STATUS, 0.0, AmfValue::Null, vec![AmfValue::Object(info)]);
        let payload = amf0::encode_all(&command.into_values());
        self.queue_message(CS_ID_COMMAND, message_stream_id, 0, MessageTypeId::CommandAmf0, &payload)
    }

    fn queue_message(&self, chunk_stream_id: u32, message_stream_id: u32, timestamp_ms: u32, message_type: MessageTypeId, payload: &[u8]) -> Result<()> {
        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(self.config.chunk_size as usize);
        let bytes = encoder.encode(chunk_stream_id, message_stream_id, timestamp_ms, message_type, payload);
        let _ = self.out_tx.send(bytes);
        Ok(())
    }

    async fn teardown(&mut self) {
        for (_, publish) in self.publishing.drain() {
            publish.stream.close(true);
            self.mapper.unregister_element(&publish.path).await;
        }
        for (_, play) in self.playing.drain() {
            self.mapper.remove_request(&play.path, play.request_id).await;
        }
    }
}

fn connect_result_properties() -> AmfValue {
    let mut props = HashMap::new();
    props.insert("fmsVer".to_string(), AmfValue::String("FMS/3,0,1,123".to_string()));
    props.insert("capabilities".to_string(), AmfValue::Number(31.0));
    AmfValue::Object(props)
}

fn connect_result_info() -> AmfValue {
    let mut info = HashMap::new();
    info.insert("level".to_string(), AmfValue::String("status".to_string()));
    info.insert("code".to_string(), AmfValue::String("NetConnection.Connect.Success".to_string()));
    info.insert("description".to_string(), AmfValue::String("Connection succeeded.".to_string()));
    info.insert("objectEncoding".to_string(), AmfValue::Number(0.0));
    AmfValue::Object(info)
}

pub(crate) fn decode_event(raw: &crate::rtmp::chunk::RawMessage) -> Result<Event> {
    use crate::rtmp::message::MessageTypeId as T;
    let Some(type_id) = T::from_byte(raw.message_type_id) else {
        return Err(Error::Protocol(format!("unknown message type id {}", raw.message_type_id)));
    };
    Ok(match type_id {
        T::CommandAmf0 | T::CommandAmf3 => {
            let values = amf0::decode_all(&raw.payload)?;
            let command = Command::from_values(values).ok_or_else(|| Error::Protocol("malformed command".into()))?;
            Event::Command { chunk_stream_id: raw.chunk_stream_id, message_stream_id: raw.message_stream_id, command }
        }
        T::DataAmf0 | T::DataAmf3 => Event::Metadata {
            message_stream_id: raw.message_stream_id,
            timestamp_ms: raw.timestamp,
            values: amf0::decode_all(&raw.payload)?,
        },
        T::Audio => Event::Audio { message_stream_id: raw.message_stream_id, timestamp_ms: raw.timestamp, data: raw.payload.clone() },
        T::Video => Event::Video { message_stream_id: raw.message_stream_id, timestamp_ms: raw.timestamp, data: raw.payload.clone() },
        T::SetChunkSize => Event::SetChunkSize(read_u32(&raw.payload)),
        T::WindowAckSize => Event::WindowAckSize(read_u32(&raw.payload)),
        T::SetPeerBandwidth => Event::SetPeerBandwidth {
            window_size: read_u32(&raw.payload),
            limit_type: raw.payload.get(4).copied().unwrap_or(0),
        },
        T::UserControl => Event::UserControl {
            event_type: u16::from_be_bytes([raw.payload.first().copied().unwrap_or(0), raw.payload.get(1).copied().unwrap_or(0)]),
            data: raw.payload.slice(2.min(raw.payload.len())..),
        },
        T::Acknowledgement => Event::Acknowledgement(read_u32(&raw.payload)),
        T::Aggregate => Event::Aggregate { message_stream_id: raw.message_stream_id, timestamp_ms: raw.timestamp, data: raw.payload.clone() },
        T::AbortMessage | T::SharedObjectAmf0 | T::SharedObjectAmf3 => {
            Event::UserControl { event_type: 0, data: raw.payload.clone() }
        }
    })
}

fn read_u32(payload: &[u8]) -> u32 {
    let mut b = [0u8; 4];
    let n = payload.len().min(4);
    b[..n].copy_from_slice(&payload[..n]);
    u32::from_be_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_chunk_size_is_capped() {
        let cfg = RtmpConfig::default().chunk_size(u32::MAX);
        assert_eq!(cfg.chunk_size, crate::rtmp::protocol::constants::MAX_CHUNK_SIZE as u32);
    }

    #[test]
    fn decodes_command_event() {
        use crate::rtmp::chunk::RawMessage;
        let values = vec![AmfValue::String("connect".into()), AmfValue::Number(1.0), AmfValue::Null];
        let payload = amf0::encode_all(&values);
        let raw = RawMessage {
            chunk_stream_id: 3,
            message_stream_id: 0,
            timestamp: 0,
            message_type_id: MessageTypeId::CommandAmf0.to_byte(),
            payload,
        };
        let event = decode_event(&raw).unwrap();
        match event {
            Event::Command { command, .. } => assert_eq!(command.name, "connect"),
            _ => panic!("expected command event"),
        }
    }
}
