//! Element graph and request routing (spec.md §3.3, unlabeled component
//! row "Element / ElementMapper").
//!
//! Generalizes `registry::store::StreamRegistry`'s flat `app/name` keying
//! (`registry::frame::StreamKey`) to an arbitrary named path, so the same
//! mapper serves RTMP (`app/stream`), RTSP (`/live/stream`), and glue
//! elements (`import/http/...`) uniformly, per SPEC_FULL.md §7.

pub mod error;
pub mod mapper;

pub use error::RegistryError;
pub use mapper::ElementMapper;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::tag::Tag;

/// A `/`-separated element path, e.g. `live/camera1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(pub String);

impl Path {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one outstanding [`Request`] without pointer aliasing —
/// replaces the original's `Request*`-as-key idiom (spec §9 Design Note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates process-unique [`RequestId`]s. One instance is shared by the
/// RTMP and RTSP server front-ends so ids never collide across protocols.
#[derive(Debug, Default)]
pub struct RequestIdAllocator;

impl RequestIdAllocator {
    pub fn next() -> RequestId {
        RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The tag types and flavor mask a requester is willing to accept
/// (spec §3.3 `caps`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub flavour_mask: u32,
}

impl Capabilities {
    pub fn any() -> Self {
        Self { flavour_mask: u32::MAX }
    }

    pub fn matches(&self, flavour_mask: u32) -> bool {
        self.flavour_mask & flavour_mask != 0
    }
}

/// Inputs to the (optional) authorizer invoked before a request is served
/// (spec §3.3 `auth_req`).
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub authorizer_name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Result of an authorization check (spec §3.3 `auth_reply`).
#[derive(Debug, Clone)]
pub struct AuthReply {
    pub allowed: bool,
    pub reauthorize_interval_ms: Option<u64>,
    pub time_limit_ms: Option<u64>,
}

impl AuthReply {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reauthorize_interval_ms: None,
            time_limit_ms: None,
        }
    }

    pub fn deny() -> Self {
        Self {
            allowed: false,
            reauthorize_interval_ms: None,
            time_limit_ms: None,
        }
    }
}

/// Serving parameters resolved from configuration for a given media name
/// (spec §3.3 `serving_info`).
#[derive(Debug, Clone)]
pub struct ServingInfo {
    pub media_name: String,
    pub authorizer_name: Option<String>,
    pub max_clients: Option<usize>,
    pub flow_control_video_ms: u64,
    pub flow_control_total_ms: u64,
}

/// A client's open media request, created when a PLAY/SETUP/GET arrives
/// and routed down through the element graph until it reaches a source
/// (spec §3.3).
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub path: Path,
    pub session_id: u64,
    pub client_id: String,
    pub affiliate_id: Option<String>,
    pub user_agent: Option<String>,
    pub caps: Capabilities,
    pub auth_req: Option<AuthRequest>,
    pub auth_reply: Option<AuthReply>,
    pub serving_info: Option<ServingInfo>,
}

impl Request {
    pub fn new(path: Path, session_id: u64, client_id: impl Into<String>, caps: Capabilities) -> Self {
        Self {
            id: RequestIdAllocator::next(),
            path,
            session_id,
            client_id: client_id.into(),
            affiliate_id: None,
            user_agent: None,
            caps,
            auth_req: None,
            auth_reply: None,
            serving_info: None,
        }
    }
}

/// A named node in the element graph. Sources, filters, switchers, and
/// glue importers/exporters all implement this (generalizes the
/// RTMP-only surface `registry::store::StreamRegistry` exposed).
pub trait Element: Send + Sync {
    fn name(&self) -> &str;

    /// Register `request` against this element, returning a channel the
    /// caller reads forwarded [`Tag`]s from. Errors propagate
    /// [`RegistryError`] (no such path, already publishing, ...).
    fn add_request(
        &self,
        request: Request,
    ) -> Result<tokio::sync::mpsc::UnboundedReceiver<Tag>, RegistryError>;

    fn remove_request(&self, id: RequestId);

    /// Returns the currently resolved [`ServingInfo`] for this element, if
    /// any (used to answer status/RPC queries without touching the hot
    /// tag-forwarding path).
    fn serving_info(&self) -> Option<ServingInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = RequestIdAllocator::next();
        let b = RequestIdAllocator::next();
        assert_ne!(a, b);
    }

    #[test]
    fn capabilities_any_matches_every_flavour() {
        let caps = Capabilities::any();
        assert!(caps.matches(0b1));
        assert!(caps.matches(0b1000_0000));
    }

    #[test]
    fn path_segments_skip_empty() {
        let p = Path::new("/live//camera1/");
        assert_eq!(p.segments().collect::<Vec<_>>(), vec!["live", "camera1"]);
    }
}
