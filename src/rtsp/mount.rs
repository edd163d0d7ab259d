//! Named RTSP mount points, generalizing `marmikshah-rtsp-rs`'s
//! `Mount`/`MountRegistry` (which paired one URI path with one
//! `Box<dyn Packetizer>`) into a path that resolves to an
//! [`crate::element::ElementMapper`] path plus the ordered track list
//! DESCRIBE/SETUP need, so the same element graph already serving RTMP
//! play requests can serve RTSP ones too (spec §4.9, §7).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::element::Path;
use crate::rtsp::sdp::TrackDescriptor;

/// One servable RTSP resource: a URI path mapped to an element-graph
/// [`Path`] plus the tracks its SDP should advertise.
#[derive(Debug, Clone)]
pub struct Mount {
    pub uri_path: String,
    pub element_path: Path,
    pub tracks: Vec<TrackDescriptor>,
}

impl Mount {
    pub fn new(uri_path: impl Into<String>, element_path: Path, tracks: Vec<TrackDescriptor>) -> Self {
        Self { uri_path: uri_path.into(), element_path, tracks }
    }

    pub fn track(&self, index: usize) -> Option<&TrackDescriptor> {
        self.tracks.get(index)
    }
}

#[derive(Default)]
pub struct MountRegistry {
    mounts: RwLock<HashMap<String, Arc<Mount>>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, mount: Mount) {
        let uri_path = mount.uri_path.clone();
        tracing::info!(path = %uri_path, tracks = mount.tracks.len(), "rtsp mount registered");
        self.mounts.write().await.insert(uri_path, Arc::new(mount));
    }

    pub async fn unregister(&self, uri_path: &str) {
        self.mounts.write().await.remove(uri_path);
    }

    pub async fn resolve(&self, uri_path: &str) -> Option<Arc<Mount>> {
        self.mounts.read().await.get(uri_path).cloned()
    }
}

/// Splits a request URI like `rtsp://host:554/live/camera1/trackID=1` into
/// the mount's base path (`/live/camera1`) and the track index (`1`),
/// defaulting to track 0 when no `trackID=` suffix is present (SETUP may
/// address either the aggregate presentation or one track directly, RFC
/// 2326 §10.4).
pub fn split_track_suffix(uri: &str) -> (String, usize) {
    let path = strip_scheme_and_host(uri);
    match path.rfind("/trackID=") {
        Some(pos) => {
            let (base, suffix) = path.split_at(pos);
            let index = suffix.trim_start_matches("/trackID=").parse().unwrap_or(0);
            (base.to_string(), index)
        }
        None => (path, 0),
    }
}

fn strip_scheme_and_host(uri: &str) -> String {
    if let Some(rest) = uri.strip_prefix("rtsp://") {
        match rest.find('/') {
            Some(pos) => rest[pos..].to_string(),
            None => "/".to_string(),
        }
    } else {
        uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_resolve_round_trips() {
        let registry = MountRegistry::new();
        registry
            .register(Mount::new("/live/camera1", Path::new("live/camera1"), vec![TrackDescriptor::video(96, 90_000, "H264", "trackID=0")]))
            .await;
        let mount = registry.resolve("/live/camera1").await.unwrap();
        assert_eq!(mount.tracks.len(), 1);
    }

    #[test]
    fn split_track_suffix_extracts_index() {
        assert_eq!(split_track_suffix("rtsp://host:554/live/camera1/trackID=1"), ("/live/camera1".to_string(), 1));
        assert_eq!(split_track_suffix("rtsp://host:554/live/camera1"), ("/live/camera1".to_string(), 0));
    }
}
