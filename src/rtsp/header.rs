//! Typed RTSP header fields (spec §4.9), grounded on
//! `marmikshah-rtsp-rs`'s `protocol::request`/`session::transport` for the
//! parsing idiom, generalized past its `client_port=`-only `Transport`
//! parse to the full tagged parameter set RFC 2326 §12.39 defines, since
//! spec §4.9 names interleaved (TCP) transport as a first-class case
//! alongside UDP unicast.

use std::fmt::Write as _;

/// One RTSP `Transport` header value. Unicast UDP, interleaved TCP, and the
/// server-assigned counterparts of both are represented; multicast
/// (`destination=`/`ttl=`) fields are carried but this server never
/// originates multicast sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transport {
    /// `RTP/AVP` or `RTP/AVP/TCP`.
    pub spec: String,
    pub unicast: bool,
    pub multicast: bool,
    pub destination: Option<String>,
    pub source: Option<String>,
    pub client_port: Option<(u16, u16)>,
    pub server_port: Option<(u16, u16)>,
    /// `interleaved=<rtp>-<rtcp>` channel pair, present for TCP transport.
    pub interleaved: Option<(u8, u8)>,
    pub ttl: Option<u8>,
    pub layers: Option<u8>,
    pub mode: Option<String>,
    pub append: bool,
    pub ssrc: Option<u32>,
}

impl Transport {
    pub fn is_tcp(&self) -> bool {
        self.spec.eq_ignore_ascii_case("RTP/AVP/TCP")
    }

    /// Parses a `Transport` header value's semicolon-separated parameter
    /// list (RFC 2326 §12.39). Unknown parameters are ignored rather than
    /// rejected, matching this crate's general leniency toward unfamiliar
    /// wire fields (spec §4.9 "unknown fields into Custom").
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let spec = parts.next()?.trim().to_string();
        if spec.is_empty() {
            return None;
        }
        let mut t = Transport { spec, ..Default::default() };

        for part in parts {
            let part = part.trim();
            let (key, val) = match part.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (part, None),
            };
            match key.to_ascii_lowercase().as_str() {
                "unicast" => t.unicast = true,
                "multicast" => t.multicast = true,
                "append" => t.append = true,
                "destination" => t.destination = val.map(str::to_string),
                "source" => t.source = val.map(str::to_string),
                "client_port" => t.client_port = val.and_then(parse_port_pair),
                "server_port" => t.server_port = val.and_then(parse_port_pair),
                "interleaved" => {
                    t.interleaved = val.and_then(|v| {
                        let (a, b) = v.split_once('-').unwrap_or((v, v));
                        Some((a.parse().ok()?, b.parse().ok()?))
                    })
                }
                "ttl" => t.ttl = val.and_then(|v| v.parse().ok()),
                "layers" => t.layers = val.and_then(|v| v.parse().ok()),
                "mode" => t.mode = val.map(|v| v.trim_matches('"').to_string()),
                "ssrc" => t.ssrc = val.and_then(|v| u32::from_str_radix(v, 16).ok()),
                _ => {}
            }
        }
        Some(t)
    }

    /// Serializes back to a `Transport` header value, used for the
    /// server's SETUP response (which echoes the client's transport plus
    /// the server-allocated port/channel pair).
    pub fn to_value(&self) -> String {
        let mut out = self.spec.clone();
        if self.unicast {
            out.push_str(";unicast");
        }
        if self.multicast {
            out.push_str(";multicast");
        }
        if let Some((a, b)) = self.client_port {
            let _ = write!(out, ";client_port={a}-{b}");
        }
        if let Some((a, b)) = self.server_port {
            let _ = write!(out, ";server_port={a}-{b}");
        }
        if let Some((a, b)) = self.interleaved {
            let _ = write!(out, ";interleaved={a}-{b}");
        }
        if let Some(ssrc) = self.ssrc {
            let _ = write!(out, ";ssrc={ssrc:08x}");
        }
        if let Some(mode) = &self.mode {
            let _ = write!(out, ";mode=\"{mode}\"");
        }
        out
    }
}

fn parse_port_pair(v: &str) -> Option<(u16, u16)> {
    let (a, b) = v.split_once('-')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

/// Parsed `Session` header: id plus optional `timeout=` suffix
/// (`Session: 4f3a2b91c7d5e6a0;timeout=60`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader {
    pub id: String,
    pub timeout_secs: Option<u64>,
}

impl SessionHeader {
    pub fn parse(value: &str) -> Self {
        match value.split_once(';') {
            Some((id, rest)) => {
                let timeout_secs = rest
                    .trim()
                    .strip_prefix("timeout=")
                    .and_then(|v| v.parse().ok());
                Self { id: id.trim().to_string(), timeout_secs }
            }
            None => Self { id: value.trim().to_string(), timeout_secs: None },
        }
    }

    pub fn to_value(&self) -> String {
        match self.timeout_secs {
            Some(secs) => format!("{};timeout={}", self.id, secs),
            None => self.id.clone(),
        }
    }
}

/// One typed request/response header (spec §4.9: "CSeq, Session, Transport
/// with the full tagged parameter set ..., unknown fields into Custom").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    CSeq(u32),
    Session(SessionHeaderValue),
    ContentLength(usize),
    ContentType(String),
    ContentBase(String),
    Public(String),
    Range(String),
    RtpInfo(String),
    Custom(String, String),
}

/// `Header::Session`'s payload, split out so [`Header`] can derive `Eq`
/// (`Transport` carries no float/NaN fields so this is just ergonomics).
pub type SessionHeaderValue = SessionHeader;

impl Header {
    pub fn name(&self) -> &'static str {
        match self {
            Header::CSeq(_) => "CSeq",
            Header::Session(_) => "Session",
            Header::ContentLength(_) => "Content-Length",
            Header::ContentType(_) => "Content-Type",
            Header::ContentBase(_) => "Content-Base",
            Header::Public(_) => "Public",
            Header::Range(_) => "Range",
            Header::RtpInfo(_) => "RTP-Info",
            Header::Custom(name, _) => {
                // Custom headers carry their own name; callers needing it
                // use `raw_name()` instead of this fixed-str API.
                let _ = name;
                "X-Custom"
            }
        }
    }

    /// Like [`Self::name`] but correct for [`Header::Custom`], returning an
    /// owned string since the other variants already have `'static` names.
    pub fn raw_name(&self) -> String {
        match self {
            Header::Custom(name, _) => name.clone(),
            other => other.name().to_string(),
        }
    }

    pub fn value(&self) -> String {
        match self {
            Header::CSeq(n) => n.to_string(),
            Header::Session(s) => s.to_value(),
            Header::ContentLength(n) => n.to_string(),
            Header::ContentType(s) | Header::ContentBase(s) | Header::Public(s) | Header::Range(s) | Header::RtpInfo(s) => s.clone(),
            Header::Custom(_, v) => v.clone(),
        }
    }

    /// Builds a typed [`Header`] from a raw `Name: Value` pair, recognizing
    /// the fields spec §4.9 calls out by name and folding everything else
    /// into [`Header::Custom`].
    pub fn parse(name: &str, value: &str) -> Header {
        match name.to_ascii_lowercase().as_str() {
            "cseq" => value.trim().parse().map(Header::CSeq).unwrap_or_else(|_| Header::Custom(name.to_string(), value.to_string())),
            "session" => Header::Session(SessionHeader::parse(value)),
            "content-length" => value.trim().parse().map(Header::ContentLength).unwrap_or_else(|_| Header::Custom(name.to_string(), value.to_string())),
            "content-type" => Header::ContentType(value.trim().to_string()),
            "content-base" => Header::ContentBase(value.trim().to_string()),
            "public" => Header::Public(value.trim().to_string()),
            "range" => Header::Range(value.trim().to_string()),
            "rtp-info" => Header::RtpInfo(value.trim().to_string()),
            _ => Header::Custom(name.to_string(), value.trim().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_round_trips_udp_unicast() {
        let t = Transport::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
        assert_eq!(t.client_port, Some((8000, 8001)));
        assert!(t.unicast);
        assert!(!t.is_tcp());
    }

    #[test]
    fn transport_parses_interleaved_tcp() {
        let t = Transport::parse("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap();
        assert!(t.is_tcp());
        assert_eq!(t.interleaved, Some((0, 1)));
    }

    #[test]
    fn session_header_parses_timeout_suffix() {
        let s = SessionHeader::parse("4f3a2b91c7d5e6a0;timeout=60");
        assert_eq!(s.id, "4f3a2b91c7d5e6a0");
        assert_eq!(s.timeout_secs, Some(60));
    }

    #[test]
    fn unknown_header_becomes_custom() {
        let h = Header::parse("X-Whatever", "value");
        assert!(matches!(h, Header::Custom(_, _)));
        assert_eq!(h.raw_name(), "X-Whatever");
    }
}
