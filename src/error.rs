//! Crate-wide error type
//!
//! Every fallible operation in this crate returns [`Result`]. Error variants
//! are hand-rolled (no `thiserror`) to match the rest of the codebase's
//! manual `Display`/`Error` impls (see `registry::error::RegistryError`).

use std::fmt;
use std::io;

use crate::element::RegistryError;
use crate::rpc::error::RpcError;

pub type Result<T> = std::result::Result<T, Error>;

/// Handshake-specific failures, kept separate so callers can match on them
/// without pulling in the rest of the error surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    InvalidVersion(u8),
    UnexpectedState,
    EchoMismatch,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidVersion(v) => write!(f, "invalid RTMP version byte: {v}"),
            HandshakeError::UnexpectedState => write!(f, "handshake message in unexpected state"),
            HandshakeError::EchoMismatch => write!(f, "handshake echo did not match"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// AMF0/AMF3 decode failures, kept separate from [`Error`] so the codec
/// layer can match on them without round-tripping through the whole
/// error surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    UnexpectedEof,
    UnknownMarker(u8),
    InvalidObjectEnd,
    InvalidReference(u16),
    InvalidUtf8,
    NestingTooDeep,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnexpectedEof => write!(f, "unexpected end of AMF buffer"),
            AmfError::UnknownMarker(m) => write!(f, "unknown AMF type marker {m:#04x}"),
            AmfError::InvalidObjectEnd => write!(f, "malformed AMF object-end marker"),
            AmfError::InvalidReference(i) => write!(f, "AMF reference index {i} out of range"),
            AmfError::InvalidUtf8 => write!(f, "AMF string was not valid UTF-8"),
            AmfError::NestingTooDeep => write!(f, "AMF value nested too deeply"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Malformed media-payload failures (AAC/AVC packet framing), kept
/// separate from [`Error`] like [`AmfError`]/[`HandshakeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaError {
    InvalidAacPacket,
    InvalidAvcPacket,
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidAacPacket => write!(f, "malformed AAC packet"),
            MediaError::InvalidAvcPacket => write!(f, "malformed AVC packet"),
        }
    }
}

impl std::error::Error for MediaError {}

/// Top-level error kind, matching spec.md §7's error taxonomy:
/// transient I/O is recovered locally and never reaches this type;
/// everything else propagates up as one of these variants.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Handshake(HandshakeError),
    Amf(AmfError),
    Media(MediaError),
    /// Malformed protocol framing (bad chunk header, oversized message,
    /// unparsable RTSP start-line, ...). Connections are closed on this.
    Protocol(String),
    /// A request's capability mask does not satisfy what an element
    /// advertises. Not fatal to the connection.
    Capability(String),
    /// Authorization or reauthorization failed; carries the categorical
    /// result string used verbatim in stats (spec §7).
    Authorization(&'static str),
    /// A log record could not be parsed; the reader counted it and the
    /// caller must decide whether to continue (spec §4.4, §7).
    LogCorrupt(String),
    /// No element provides the requested path.
    NotFound(String),
    Registry(RegistryError),
    Rpc(RpcError),
    /// An invariant the core relies on was violated. These are meant to be
    /// unreachable in correct code; `error::bug` panics instead of
    /// returning this for call sites that have no sensible recovery, but
    /// library entry points that can observe caller misuse return it.
    Invariant(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Handshake(e) => write!(f, "handshake error: {e}"),
            Error::Amf(e) => write!(f, "amf error: {e}"),
            Error::Media(e) => write!(f, "media error: {e}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Capability(msg) => write!(f, "capability mismatch: {msg}"),
            Error::Authorization(reason) => write!(f, "authorization failed: {reason}"),
            Error::LogCorrupt(msg) => write!(f, "log record corrupt: {msg}"),
            Error::NotFound(path) => write!(f, "no element provides path: {path}"),
            Error::Registry(e) => write!(f, "{e}"),
            Error::Rpc(e) => write!(f, "{e}"),
            Error::Invariant(msg) => write!(f, "invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Handshake(e) => Some(e),
            Error::Amf(e) => Some(e),
            Error::Media(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Rpc(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}

impl From<AmfError> for Error {
    fn from(e: AmfError) -> Self {
        Error::Amf(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self {
        Error::Rpc(e)
    }
}

/// Logs and panics for invariant violations that the core treats as fatal
/// (spec §7: "process aborts with a diagnostic"). Never called on paths
/// reachable by untrusted network input.
#[track_caller]
pub fn bug(msg: impl AsRef<str>) -> ! {
    tracing::error!(invariant = msg.as_ref(), "fatal invariant violation");
    panic!("invariant violated: {}", msg.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_variant() {
        let e = Error::Authorization("TOO MANY REQUESTS");
        assert_eq!(e.to_string(), "authorization failed: TOO MANY REQUESTS");
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
