//! RTSP method dispatch (spec §4.9/§6.3), grounded on
//! `marmikshah-rtsp-rs`'s `protocol::handler::MethodHandler`, generalized
//! past its single hard-coded mount/UDP-unicast path to multiple
//! [`crate::rtsp::mount::Mount`]s and both UDP and interleaved-TCP
//! transports, and extended with ANNOUNCE/RECORD/REDIRECT/SET_PARAMETER
//! stub handling `marmikshah-rtsp-rs`'s handler does not implement (conformant
//! RFC 2326 responses; this server is a player-facing PLAY-only source,
//! so these report `501 Not Implemented` rather than pretending to
//! support ingest-by-RTSP).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::element::{Capabilities, ElementMapper, Request};
use crate::rtsp::codec::{RtspRequest, RtspResponse};
use crate::rtsp::header::{Header, SessionHeader, Transport};
use crate::rtsp::mount::{split_track_suffix, MountRegistry};
use crate::rtsp::rtp::{allocate_ssrc, RtpPacketizer, RtpSink, RtpTransport};
use crate::rtsp::session::{SessionManager, SessionState, TransportContext};
use crate::tag::Tag;

const SUPPORTED_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, GET_PARAMETER";

pub struct ServerProcessor {
    pub mounts: Arc<MountRegistry>,
    pub sessions: Arc<SessionManager>,
    pub mapper: Arc<ElementMapper>,
    pub server_addr: SocketAddr,
    /// Shared outbound socket for every UDP-transport track; servers bind
    /// one ephemeral socket and rely on `client_addr`/`client_port` in each
    /// `send_to` rather than one socket per track (RFC 2326 doesn't
    /// require per-track source ports on the server side for unicast).
    pub udp_socket: Arc<UdpSocket>,
}

impl ServerProcessor {
    pub fn new(mounts: Arc<MountRegistry>, sessions: Arc<SessionManager>, mapper: Arc<ElementMapper>, server_addr: SocketAddr, udp_socket: Arc<UdpSocket>) -> Self {
        Self { mounts, sessions, mapper, server_addr, udp_socket }
    }

    /// Dispatches one decoded request. `client_addr` is the connection's
    /// peer address, needed for UDP SETUP's `client_addr`/`client_port`
    /// pairing and as the client id passed to [`ElementMapper`]. `interleaved_out`
    /// is the connection's outbound byte sink, used only when a SETUP
    /// negotiates interleaved transport so RTP frames can be written back
    /// over the same TCP connection the request arrived on.
    pub async fn handle(
        &self,
        request: &RtspRequest,
        client_addr: SocketAddr,
        interleaved_out: &mpsc::UnboundedSender<Bytes>,
    ) -> RtspResponse {
        let cseq = request.cseq();
        let response = match request.method.as_str() {
            "OPTIONS" => self.handle_options(),
            "DESCRIBE" => self.handle_describe(request).await,
            "SETUP" => self.handle_setup(request, client_addr, interleaved_out).await,
            "PLAY" => self.handle_play(request).await,
            "PAUSE" => self.handle_pause(request).await,
            "TEARDOWN" => self.handle_teardown(request).await,
            "GET_PARAMETER" => self.handle_get_parameter(request).await,
            "ANNOUNCE" | "RECORD" | "REDIRECT" | "SET_PARAMETER" => RtspResponse::new(501, "Not Implemented"),
            _ => RtspResponse::new(501, "Not Implemented"),
        };
        response.with_header(Header::CSeq(cseq))
    }

    fn handle_options(&self) -> RtspResponse {
        RtspResponse::ok().with_header(Header::Public(SUPPORTED_METHODS.to_string()))
    }

    async fn handle_describe(&self, request: &RtspRequest) -> RtspResponse {
        let (base_path, _) = split_track_suffix(&request.uri);
        let Some(mount) = self.mounts.resolve(&base_path).await else {
            return RtspResponse::new(404, "Not Found");
        };
        let sdp = crate::rtsp::sdp::generate_sdp(&base_path, self.server_addr.ip(), &mount.tracks);
        RtspResponse::ok()
            .with_header(Header::ContentBase(format!("rtsp://{}{}/", self.server_addr, base_path)))
            .with_body("application/sdp", Bytes::from(sdp))
    }

    async fn handle_setup(&self, request: &RtspRequest, client_addr: SocketAddr, interleaved_out: &mpsc::UnboundedSender<Bytes>) -> RtspResponse {
        let (base_path, track_index) = split_track_suffix(&request.uri);
        let Some(mount) = self.mounts.resolve(&base_path).await else {
            return RtspResponse::new(404, "Not Found");
        };
        if mount.track(track_index).is_none() {
            return RtspResponse::new(404, "Not Found");
        }

        let Some(transport_value) = request.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case("transport")).map(|(_, v)| v.clone()) else {
            return RtspResponse::new(400, "Bad Request");
        };
        let Some(client_transport) = Transport::parse(&transport_value) else {
            return RtspResponse::new(461, "Unsupported Transport");
        };

        let session_id = match request.header("Session") {
            Some(Header::Session(s)) => s.id,
            _ => self.sessions.create_session(base_path.clone()).await.id,
        };
        let session = match self.sessions.get(&session_id).await {
            Ok(s) => s,
            Err(_) => self.sessions.create_session(base_path.clone()).await,
        };

        let (context, response_transport) = if client_transport.is_tcp() {
            let (rtp_ch, rtcp_ch) = client_transport.interleaved.unwrap_or_else(|| self.sessions.allocate_interleaved_channels());
            let ctx = TransportContext::Interleaved { rtp_channel: rtp_ch, rtcp_channel: rtcp_ch };
            (ctx.clone(), ctx.to_transport_header("RTP/AVP/TCP"))
        } else {
            let Some((client_rtp_port, client_rtcp_port)) = client_transport.client_port else {
                return RtspResponse::new(400, "Bad Request");
            };
            let (server_rtp_port, server_rtcp_port) = self.sessions.allocate_server_ports();
            let ctx = TransportContext::Udp { client_addr, client_rtp_port, client_rtcp_port, server_rtp_port, server_rtcp_port };
            (ctx.clone(), ctx.to_transport_header("RTP/AVP"))
        };

        session.setup_track(track_index, context.clone()).await;

        let track = mount.track(track_index).unwrap();
        let sink = match &context {
            TransportContext::Interleaved { rtp_channel, .. } => RtpSink::Interleaved { rtp_channel: *rtp_channel, out_tx: interleaved_out.clone() },
            TransportContext::Udp { client_addr, client_rtp_port, .. } => {
                RtpSink::Udp { socket: self.udp_socket.clone(), client_rtp_addr: SocketAddr::new(client_addr.ip(), *client_rtp_port) }
            }
        };
        let rtp = Arc::new(RtpTransport { packetizer: RtpPacketizer::new(track.payload_type, allocate_ssrc(), 0), sink });
        session.bind_rtp(track_index, rtp).await;

        RtspResponse::ok()
            .with_header(Header::Session(SessionHeader { id: session.id.clone(), timeout_secs: Some(60) }))
            .with_header(Header::Custom("Transport".to_string(), response_transport.to_value()))
    }

    async fn handle_play(&self, request: &RtspRequest) -> RtspResponse {
        let Some(session) = self.session_from_header(request).await else {
            return RtspResponse::new(454, "Session Not Found");
        };
        let (base_path, _) = split_track_suffix(&request.uri);
        let Some(mount) = self.mounts.resolve(&base_path).await else {
            return RtspResponse::new(404, "Not Found");
        };

        session.set_state(SessionState::Playing).await;
        self.spawn_media_pump(session.clone(), mount.element_path.clone());

        RtspResponse::ok().with_header(Header::Session(SessionHeader { id: session.id.clone(), timeout_secs: None }))
    }

    async fn handle_pause(&self, request: &RtspRequest) -> RtspResponse {
        let Some(session) = self.session_from_header(request).await else {
            return RtspResponse::new(454, "Session Not Found");
        };
        session.set_state(SessionState::Paused).await;
        RtspResponse::ok()
    }

    async fn handle_teardown(&self, request: &RtspRequest) -> RtspResponse {
        let Some(session) = self.session_from_header(request).await else {
            return RtspResponse::new(454, "Session Not Found");
        };
        self.sessions.remove(&session.id).await;
        RtspResponse::ok()
    }

    async fn handle_get_parameter(&self, request: &RtspRequest) -> RtspResponse {
        if self.session_from_header(request).await.is_none() {
            return RtspResponse::new(454, "Session Not Found");
        }
        RtspResponse::ok()
    }

    async fn session_from_header(&self, request: &RtspRequest) -> Option<Arc<crate::rtsp::session::Session>> {
        let Header::Session(s) = request.header("Session")? else { return None };
        self.sessions.get(&s.id).await.ok()
    }

    /// Subscribes the session's mount element and forwards every video/
    /// audio tag to the track's bound [`RtpTransport`], one RTP packet per
    /// tag (see `rtsp::rtp`'s module doc for the payloadization scope
    /// limit). Runs until the element closes the stream or the session is
    /// torn down.
    fn spawn_media_pump(&self, session: Arc<crate::rtsp::session::Session>, element_path: crate::element::Path) {
        let mapper = self.mapper.clone();
        tokio::spawn(async move {
            let request = Request::new(element_path, 0, format!("rtsp-{}", session.id), Capabilities::any());
            let mut rx = match mapper.add_request(request).await {
                Ok(rx) => rx,
                Err(e) => {
                    tracing::warn!(session = %session.id, error = %e, "rtsp play could not subscribe to element");
                    return;
                }
            };

            while let Some(tag) = rx.recv().await {
                if session.state().await != SessionState::Playing {
                    continue;
                }
                let (track_index, payload, marker) = match &tag {
                    Tag::Flv { meta, data } if meta.is_video() => (0usize, data.clone(), true),
                    Tag::Aac { meta, data } if meta.is_audio() => (1usize, data.clone(), true),
                    Tag::Eos { .. } => break,
                    _ => continue,
                };
                if let Some(rtp) = session.rtp_for_track(track_index).await {
                    let timestamp = tag.meta().timestamp_ms as u32;
                    rtp.send_tag_payload(&payload, timestamp, marker).await;
                }
            }
        });
    }
}
