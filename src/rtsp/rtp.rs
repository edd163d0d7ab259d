//! RTP packet framing and per-track delivery transport (spec §4.9's
//! "RTP/RTCP transport" row). This is protocol plumbing, not a codec: it
//! builds the generic 12-byte RTP header RFC 3550 §5.1 defines around
//! whatever payload the session hands it. Codec-specific payloadization
//! rules (H.264 FU-A fragmentation, AAC AU-header bundling, ...) are out
//! of scope (spec.md §1 Non-goals: "concrete codec byte parsers beyond
//! splitter/serializer contracts") — one media tag becomes one RTP packet.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const RTP_VERSION: u8 = 2;

/// Builds RTP packets for one track. Sequence number wraps per RFC 3550;
/// the initial sequence and SSRC are randomized by the caller (session
/// setup), not here, so tests can supply deterministic values.
pub struct RtpPacketizer {
    payload_type: u8,
    ssrc: u32,
    sequence: AtomicU16,
}

impl RtpPacketizer {
    pub fn new(payload_type: u8, ssrc: u32, initial_sequence: u16) -> Self {
        Self { payload_type, ssrc, sequence: AtomicU16::new(initial_sequence) }
    }

    /// Wraps `payload` in one RTP packet at `timestamp` (already in the
    /// track's clock-rate units). `marker` is set on the last packet of an
    /// access unit (spec: video keyframe boundary, audio frame boundary).
    pub fn packetize(&self, payload: &[u8], timestamp: u32, marker: bool) -> Bytes {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut out = BytesMut::with_capacity(12 + payload.len());

        let marker_bit = if marker { 0x80 } else { 0x00 };
        out.put_u8((RTP_VERSION << 6) & 0xC0);
        out.put_u8(marker_bit | (self.payload_type & 0x7F));
        out.put_u16(sequence);
        out.put_u32(timestamp);
        out.put_u32(self.ssrc);
        out.put_slice(payload);
        out.freeze()
    }
}

static NEXT_SSRC_SEED: AtomicU32 = AtomicU32::new(0x1234_5678);

/// Deterministic-enough SSRC allocator (spec doesn't require
/// cryptographic randomness, just per-session uniqueness).
pub fn allocate_ssrc() -> u32 {
    NEXT_SSRC_SEED.fetch_add(0x9E37_79B9, Ordering::Relaxed)
}

/// Where one track's RTP packets go once SETUP completes: a UDP pair
/// pointed at the client, or an interleaved channel pair multiplexed onto
/// the RTSP TCP connection itself (spec §4.9: "per-track transport
/// contexts — UDP pair or interleaved channel pair").
pub enum RtpSink {
    Udp { socket: Arc<UdpSocket>, client_rtp_addr: SocketAddr },
    Interleaved { rtp_channel: u8, out_tx: mpsc::UnboundedSender<Bytes> },
}

impl RtpSink {
    pub async fn send(&self, packet: Bytes) {
        match self {
            RtpSink::Udp { socket, client_rtp_addr } => {
                if let Err(e) = socket.send_to(&packet, client_rtp_addr).await {
                    tracing::warn!(error = %e, addr = %client_rtp_addr, "rtp udp send failed");
                }
            }
            RtpSink::Interleaved { rtp_channel, out_tx } => {
                let mut framed = BytesMut::with_capacity(4 + packet.len());
                framed.put_u8(b'$');
                framed.put_u8(*rtp_channel);
                framed.put_u16(packet.len() as u16);
                framed.extend_from_slice(&packet);
                let _ = out_tx.send(framed.freeze());
            }
        }
    }
}

/// One track's packetizer bound to its delivery transport. Owned by a
/// [`crate::rtsp::session::TrackState`] once SETUP has negotiated a
/// transport for the track.
pub struct RtpTransport {
    pub packetizer: RtpPacketizer,
    pub sink: RtpSink,
}

impl RtpTransport {
    pub async fn send_tag_payload(&self, payload: &[u8], timestamp: u32, marker: bool) {
        let packet = self.packetizer.packetize(payload, timestamp, marker);
        self.sink.send(packet).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packetizer_sets_version_and_increments_sequence() {
        let p = RtpPacketizer::new(96, 0xdead_beef, 1000);
        let a = p.packetize(b"payload-a", 0, false);
        let b = p.packetize(b"payload-b", 3000, true);

        assert_eq!(a[0] >> 6, RTP_VERSION);
        assert_eq!(a[1] & 0x7F, 96);
        assert_eq!(a[1] & 0x80, 0);
        assert_eq!(b[1] & 0x80, 0x80);

        let seq_a = u16::from_be_bytes([a[2], a[3]]);
        let seq_b = u16::from_be_bytes([b[2], b[3]]);
        assert_eq!(seq_b, seq_a.wrapping_add(1));
    }

    #[test]
    fn ssrc_allocator_yields_distinct_values() {
        let a = allocate_ssrc();
        let b = allocate_ssrc();
        assert_ne!(a, b);
    }
}
