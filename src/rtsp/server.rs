//! RTSP accept loop and per-connection driver, structured like
//! `rtmp::connection::RtmpServer`: one task per socket, one outbound byte
//! channel feeding a single writer half so responses and interleaved RTP
//! frames never race for the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;

use crate::element::ElementMapper;
use crate::error::Result;
use crate::rtsp::codec::{Frame, RtspCodec};
use crate::rtsp::mount::MountRegistry;
use crate::rtsp::processor::ServerProcessor;
use crate::rtsp::session::SessionManager;

/// Tunables for the RTSP front-end, the RTSP counterpart of
/// `rtmp::connection::RtmpConfig`.
#[derive(Debug, Clone)]
pub struct RtspConfig {
    pub bind_addr: SocketAddr,
    pub udp_bind_addr: SocketAddr,
    pub idle_timeout: Duration,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:554".parse().unwrap(),
            udp_bind_addr: "0.0.0.0:0".parse().unwrap(),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl RtspConfig {
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }
}

pub struct RtspServer {
    config: RtspConfig,
    mounts: Arc<MountRegistry>,
    sessions: Arc<SessionManager>,
    mapper: Arc<ElementMapper>,
}

impl RtspServer {
    pub fn new(config: RtspConfig, mounts: Arc<MountRegistry>, mapper: Arc<ElementMapper>) -> Self {
        Self { config, mounts, sessions: Arc::new(SessionManager::new()), mapper }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let udp_socket = Arc::new(UdpSocket::bind(self.config.udp_bind_addr).await?);
        tracing::info!(addr = %self.config.bind_addr, "RTSP server listening");

        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let processor = Arc::new(ServerProcessor::new(
                        self.mounts.clone(),
                        self.sessions.clone(),
                        self.mapper.clone(),
                        self.config.bind_addr,
                        udp_socket.clone(),
                    ));
                    tokio::spawn(serve_connection(socket, peer_addr, processor));
                }
                Err(e) => tracing::error!(error = %e, "failed to accept RTSP connection"),
            }
        }
    }
}

async fn serve_connection(socket: TcpStream, peer_addr: SocketAddr, processor: Arc<ServerProcessor>) {
    let (mut read_half, mut write_half) = tokio::io::split(socket);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();

    tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut codec = RtspCodec::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(peer = %peer_addr, error = %e, "rtsp connection read error");
                break;
            }
        };
        codec.feed(&buf[..n]);

        loop {
            match codec.next_frame() {
                Ok(Some(Frame::Request(request))) => {
                    let response = processor.handle(&request, peer_addr, &out_tx).await;
                    if out_tx.send(response.encode()).is_err() {
                        return;
                    }
                }
                Ok(Some(Frame::Interleaved { .. })) => {
                    // Clients don't send RTP back to this server; any
                    // interleaved frame here is RTCP receiver feedback,
                    // which this crate doesn't yet consume.
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(peer = %peer_addr, error = %e, "malformed rtsp frame, closing connection");
                    return;
                }
            }
        }
    }
    tracing::debug!(peer = %peer_addr, "rtsp connection closed");
}
