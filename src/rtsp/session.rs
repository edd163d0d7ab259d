//! RTSP session state machine (spec §4.9/§6.3), grounded on
//! `marmikshah-rtsp-rs`'s `session::{Session, SessionManager}`, generalized
//! in three ways SPEC_FULL.md calls for: `parking_lot::RwLock` is swapped
//! for `tokio::sync::RwLock` (this crate is tokio-native end to end, spec
//! §9 Design Notes), session state is keyed per track instead of one
//! transport for the whole presentation, and port allocation has an
//! interleaved-channel counterpart alongside the UDP-only pairs
//! `marmikshah-rtsp-rs` allocates.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::rtsp::header::Transport;
use crate::rtsp::rtp::RtpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Playing,
    Paused,
}

/// Where one track's RTP/RTCP pair lives once SETUP negotiates it.
#[derive(Debug, Clone)]
pub enum TransportContext {
    Udp { client_addr: SocketAddr, client_rtp_port: u16, client_rtcp_port: u16, server_rtp_port: u16, server_rtcp_port: u16 },
    Interleaved { rtp_channel: u8, rtcp_channel: u8 },
}

impl TransportContext {
    pub fn to_transport_header(&self, client_unicast_spec: &str) -> Transport {
        let mut t = Transport { spec: client_unicast_spec.to_string(), unicast: true, ..Default::default() };
        match self {
            TransportContext::Udp { client_rtp_port, client_rtcp_port, server_rtp_port, server_rtcp_port, .. } => {
                t.client_port = Some((*client_rtp_port, *client_rtcp_port));
                t.server_port = Some((*server_rtp_port, *server_rtcp_port));
            }
            TransportContext::Interleaved { rtp_channel, rtcp_channel } => {
                t.interleaved = Some((*rtp_channel, *rtcp_channel));
            }
        }
        t
    }
}

pub struct TrackState {
    pub context: TransportContext,
    /// Populated once PLAY starts forwarding media for this track; absent
    /// between SETUP and PLAY.
    pub rtp: Option<Arc<RtpTransport>>,
}

/// One client's RTSP presentation: its negotiated tracks and playback
/// state. `Session::id` is the value sent in the `Session:` header; it is
/// opaque to the client, matching `marmikshah-rtsp-rs`'s hex session-id idiom.
pub struct Session {
    pub id: String,
    pub uri_path: String,
    state: RwLock<SessionState>,
    tracks: RwLock<HashMap<usize, TrackState>>,
}

impl Session {
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    pub async fn setup_track(&self, index: usize, context: TransportContext) {
        self.tracks.write().await.insert(index, TrackState { context, rtp: None });
    }

    pub async fn bind_rtp(&self, index: usize, rtp: Arc<RtpTransport>) {
        if let Some(track) = self.tracks.write().await.get_mut(&index) {
            track.rtp = Some(rtp);
        }
    }

    pub async fn rtp_for_track(&self, index: usize) -> Option<Arc<RtpTransport>> {
        self.tracks.read().await.get(&index).and_then(|t| t.rtp.clone())
    }

    pub async fn track_contexts(&self) -> Vec<(usize, TransportContext)> {
        self.tracks.read().await.iter().map(|(i, t)| (*i, t.context.clone())).collect()
    }
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

const SERVER_RTP_PORT_MIN: u16 = 16_384;
const SERVER_RTP_PORT_MAX: u16 = 32_768;

/// Owns every live [`Session`] and the server-side RTP port/channel
/// allocators (`allocate_server_ports`/`allocate_interleaved_channels`
/// generalize `marmikshah-rtsp-rs`'s single `allocate_server_ports`).
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    next_rtp_port: AtomicU16,
    next_interleaved_channel: AtomicU8,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_rtp_port: AtomicU16::new(SERVER_RTP_PORT_MIN),
            next_interleaved_channel: AtomicU8::new(0),
        }
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(&self, uri_path: impl Into<String>) -> Arc<Session> {
        let id = format!("{:016x}", SESSION_COUNTER.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session {
            id: id.clone(),
            uri_path: uri_path.into(),
            state: RwLock::new(SessionState::Ready),
            tracks: RwLock::new(HashMap::new()),
        });
        self.sessions.write().await.insert(id, session.clone());
        session
    }

    pub async fn get(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions.read().await.get(id).cloned().ok_or_else(|| Error::Protocol(format!("no such RTSP session: {id}")))
    }

    pub async fn remove(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    /// Allocates an even RTP port with the following odd port as its RTCP
    /// companion (RFC 3550 §11), wrapping back to the start of the range
    /// once exhausted. A production deployment would track returned ports
    /// to avoid reuse collisions under load; this server trades that for
    /// a simpler monotonic-then-wrap scheme.
    pub fn allocate_server_ports(&self) -> (u16, u16) {
        loop {
            let port = self.next_rtp_port.fetch_add(2, Ordering::Relaxed);
            if port >= SERVER_RTP_PORT_MAX {
                self.next_rtp_port.store(SERVER_RTP_PORT_MIN, Ordering::Relaxed);
                continue;
            }
            return (port, port + 1);
        }
    }

    pub fn allocate_interleaved_channels(&self) -> (u8, u8) {
        let base = self.next_interleaved_channel.fetch_add(2, Ordering::Relaxed);
        (base, base + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_fetch_session() {
        let manager = SessionManager::new();
        let session = manager.create_session("/live/camera1").await;
        let fetched = manager.get(&session.id).await.unwrap();
        assert_eq!(fetched.uri_path, "/live/camera1");
        assert_eq!(fetched.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn missing_session_errors() {
        let manager = SessionManager::new();
        assert!(manager.get("deadbeef").await.is_err());
    }

    #[test]
    fn server_ports_are_even_rtp_odd_rtcp() {
        let manager = SessionManager::new();
        let (rtp, rtcp) = manager.allocate_server_ports();
        assert_eq!(rtp % 2, 0);
        assert_eq!(rtcp, rtp + 1);
    }

    #[test]
    fn interleaved_channels_pair_up() {
        let manager = SessionManager::new();
        let (a, b) = manager.allocate_interleaved_channels();
        assert_eq!(b, a + 1);
        let (c, _) = manager.allocate_interleaved_channels();
        assert_eq!(c, a + 2);
    }
}
