//! Event emission interface (spec §1 item 9, §4.11): the core emits
//! [`Event`]s, sinks decide what to do with them. Concrete aggregation
//! (`metrics::ServerStats`/`SessionStats`/`StreamStats`) lives alongside
//! the interface as one sink implementation among possible others
//! (tracing, a metrics exporter, a null sink in tests) rather than being
//! wired directly into the RTMP/RTSP connection code the way
//! `plixai-rtmp-rs`'s original `SessionStats`/`StreamStats` were.

pub mod metrics;

pub use metrics::{ServerStats, SessionStats, StreamStats};

use std::sync::Mutex;

/// One observable occurrence a [`Sink`] may care about. Carries just
/// enough identifying context (`session_id`/`stream_key`) for a sink to
/// attribute it, not the full tag/request payload — sinks are for
/// counting and alerting, not for re-deriving media content.
#[derive(Debug, Clone)]
pub enum Event {
    ConnectionOpened { session_id: u64, peer: String },
    ConnectionClosed { session_id: u64 },
    BytesReceived { session_id: u64, bytes: u64 },
    BytesSent { session_id: u64, bytes: u64 },
    VideoFrame { session_id: u64, keyframe: bool },
    AudioFrame { session_id: u64 },
    FrameDropped { session_id: u64 },
    StreamStarted { stream_key: String },
    StreamEnded { stream_key: String },
    AuthorizationResult { session_id: u64, result: &'static str },
}

/// Receives [`Event`]s as the core produces them. Implementations must not
/// block the caller for long; the core has no buffering of its own
/// between an event firing and `emit` being called.
pub trait Sink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards every event. Default for tests and for embedders that don't
/// need observability wired up yet.
pub struct NullSink;

impl Sink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Logs every event as a structured `tracing` record, the sink this crate
/// itself uses by default (matches the rest of the codebase's "observe
/// through tracing, aggregate externally" posture, spec §6.4).
pub struct TracingSink;

impl Sink for TracingSink {
    fn emit(&self, event: Event) {
        match event {
            Event::ConnectionOpened { session_id, peer } => tracing::info!(session_id, peer, "connection opened"),
            Event::ConnectionClosed { session_id } => tracing::info!(session_id, "connection closed"),
            Event::BytesReceived { session_id, bytes } => tracing::trace!(session_id, bytes, "bytes received"),
            Event::BytesSent { session_id, bytes } => tracing::trace!(session_id, bytes, "bytes sent"),
            Event::VideoFrame { session_id, keyframe } => tracing::trace!(session_id, keyframe, "video frame"),
            Event::AudioFrame { session_id } => tracing::trace!(session_id, "audio frame"),
            Event::FrameDropped { session_id } => tracing::debug!(session_id, "frame dropped"),
            Event::StreamStarted { stream_key } => tracing::info!(stream_key, "stream started"),
            Event::StreamEnded { stream_key } => tracing::info!(stream_key, "stream ended"),
            Event::AuthorizationResult { session_id, result } => tracing::info!(session_id, result, "authorization result"),
        }
    }
}

/// Aggregates events into a running [`ServerStats`] snapshot, the
/// `metrics` module's structs put to use as a concrete sink rather than
/// dead reference code. Per-session/per-stream detail
/// (`SessionStats`/`StreamStats`) is the embedder's to track from the same
/// event stream; this sink only rolls up the server-wide counters.
pub struct AggregatingSink {
    stats: Mutex<ServerStats>,
}

impl Default for AggregatingSink {
    fn default() -> Self {
        Self { stats: Mutex::new(ServerStats::new()) }
    }
}

impl AggregatingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ServerStats {
        self.stats.lock().unwrap().clone()
    }
}

impl Sink for AggregatingSink {
    fn emit(&self, event: Event) {
        let mut stats = self.stats.lock().unwrap();
        match event {
            Event::ConnectionOpened { .. } => {
                stats.total_connections += 1;
                stats.active_connections += 1;
            }
            Event::ConnectionClosed { .. } => {
                stats.active_connections = stats.active_connections.saturating_sub(1);
            }
            Event::BytesReceived { bytes, .. } => stats.total_bytes_received += bytes,
            Event::BytesSent { bytes, .. } => stats.total_bytes_sent += bytes,
            Event::StreamStarted { .. } => stats.active_streams += 1,
            Event::StreamEnded { .. } => stats.active_streams = stats.active_streams.saturating_sub(1),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregating_sink_tracks_connection_counts() {
        let sink = AggregatingSink::new();
        sink.emit(Event::ConnectionOpened { session_id: 1, peer: "127.0.0.1:1".into() });
        sink.emit(Event::ConnectionOpened { session_id: 2, peer: "127.0.0.1:2".into() });
        sink.emit(Event::ConnectionClosed { session_id: 1 });

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.active_connections, 1);
    }

    #[test]
    fn null_sink_drops_everything() {
        let sink = NullSink;
        sink.emit(Event::StreamStarted { stream_key: "live".into() });
    }
}
