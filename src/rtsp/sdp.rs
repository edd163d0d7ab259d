//! SDP generation for DESCRIBE responses (spec §4.9), grounded on
//! `marmikshah-rtsp-rs`'s SDP assembly in `protocol::handler::handle_describe`,
//! generalized from its single hard-coded H.264 video track to an
//! arbitrary ordered list of [`TrackDescriptor`]s, one `m=` line each.

/// One media track a [`crate::rtsp::mount::Mount`] serves, enough to
/// generate its `m=`/`a=rtpmap`/`a=fmtp` lines. Payload bytes themselves
/// are untouched — this crate treats `encoding_name`/`fmtp` as opaque
/// strings supplied by the embedder rather than deriving them from a
/// parsed codec configuration (spec.md §1 Non-goals).
#[derive(Debug, Clone)]
pub struct TrackDescriptor {
    pub media: &'static str,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub encoding_name: String,
    pub channels: Option<u32>,
    pub fmtp: Option<String>,
    pub control: String,
}

impl TrackDescriptor {
    pub fn video(payload_type: u8, clock_rate: u32, encoding_name: impl Into<String>, control: impl Into<String>) -> Self {
        Self {
            media: "video",
            payload_type,
            clock_rate,
            encoding_name: encoding_name.into(),
            channels: None,
            fmtp: None,
            control: control.into(),
        }
    }

    pub fn audio(payload_type: u8, clock_rate: u32, channels: u32, encoding_name: impl Into<String>, control: impl Into<String>) -> Self {
        Self {
            media: "audio",
            payload_type,
            clock_rate,
            encoding_name: encoding_name.into(),
            channels: Some(channels),
            fmtp: None,
            control: control.into(),
        }
    }

    pub fn fmtp(mut self, value: impl Into<String>) -> Self {
        self.fmtp = Some(value.into());
        self
    }
}

/// Builds the SDP body for a DESCRIBE reply: one session-level block
/// followed by one `m=` section per track, in the order they were
/// registered (RFC 2327 ordering rules: `v=`/`o=`/`s=`/`c=`/`t=` once,
/// then per-media `m=`/`a=` groups).
pub fn generate_sdp(session_name: &str, server_addr: std::net::IpAddr, tracks: &[TrackDescriptor]) -> String {
    let mut sdp = String::new();
    sdp.push_str("v=0\r\n");
    sdp.push_str(&format!("o=- 0 0 IN IP4 {server_addr}\r\n"));
    sdp.push_str(&format!("s={session_name}\r\n"));
    sdp.push_str(&format!("c=IN IP4 {server_addr}\r\n"));
    sdp.push_str("t=0 0\r\n");

    for track in tracks {
        sdp.push_str(&format!("m={} 0 RTP/AVP {}\r\n", track.media, track.payload_type));
        sdp.push_str("c=IN IP4 0.0.0.0\r\n");
        match track.channels {
            Some(channels) => sdp.push_str(&format!(
                "a=rtpmap:{} {}/{}/{}\r\n",
                track.payload_type, track.encoding_name, track.clock_rate, channels
            )),
            None => sdp.push_str(&format!("a=rtpmap:{} {}/{}\r\n", track.payload_type, track.encoding_name, track.clock_rate)),
        }
        if let Some(fmtp) = &track.fmtp {
            sdp.push_str(&format!("a=fmtp:{} {}\r\n", track.payload_type, fmtp));
        }
        sdp.push_str(&format!("a=control:{}\r\n", track.control));
    }
    sdp
}
