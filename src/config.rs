//! Runtime configuration root.
//!
//! The core has no process-wide mutable flags (spec.md §9, Design Notes:
//! "Global flags ... Pass them as an immutable configuration struct").
//! [`RuntimeConfig`] is that struct: one field per ambient subsystem, each
//! with its own `Default` impl and a fluent builder
//! (see `rtmp::connection::RtmpConfig`, modeled on `plixai-rtmp-rs`'s
//! `server::config::ServerConfig`).

use std::time::Duration;

/// Options recognized by the persistent log storage (spec.md §6.4).
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Bytes per block; file size is always a multiple of this.
    pub block_size: u32,
    /// Blocks per file before rollover to the next `file_num`.
    pub blocks_per_file: u32,
    /// Stage the active file under `temp/` and rename on close.
    pub temporary_incomplete_file: bool,
    /// Deflate-compress each record payload.
    pub deflate: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            block_size: 1 << 20,
            blocks_per_file: 64,
            temporary_incomplete_file: false,
            deflate: false,
        }
    }
}

impl LogConfig {
    pub fn block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    pub fn blocks_per_file(mut self, n: u32) -> Self {
        self.blocks_per_file = n;
        self
    }

    pub fn temporary_incomplete_file(mut self, yes: bool) -> Self {
        self.temporary_incomplete_file = yes;
        self
    }

    pub fn deflate(mut self, yes: bool) -> Self {
        self.deflate = yes;
        self
    }
}

/// Pacing and flow-control thresholds shared by every [`crate::exporter::Exporter`]
/// (spec.md §4.6, §6.4).
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Default amount of time the normalizer will write ahead of real time.
    pub switching_default_write_ahead_ms: u64,
    /// Hard cap on write-ahead before the normalizer back-pressures.
    pub switching_max_write_ahead_ms: u64,
    /// Droppable video interframes are shed once the downstream queue
    /// exceeds this many milliseconds of buffered media.
    pub flow_control_video_ms: u64,
    /// Any droppable tag (audio or video) is shed past this threshold.
    /// Zero means HTTP download mode: no time-based shedding, only the
    /// depth-based pause/resume watermark applies.
    pub flow_control_total_ms: u64,
    /// HTTP-pull pacing: how far ahead of the consumer to prefetch.
    pub prefill_buffer_ms: u64,
    pub advance_media_ms: u64,
    pub media_http_maximum_tag_size: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            switching_default_write_ahead_ms: 3_000,
            switching_max_write_ahead_ms: 10_000,
            flow_control_video_ms: 2_000,
            flow_control_total_ms: 4_000,
            prefill_buffer_ms: 2_000,
            advance_media_ms: 5_000,
            media_http_maximum_tag_size: 4 * 1024 * 1024,
        }
    }
}

impl PacingConfig {
    pub fn flow_control_video_ms(mut self, ms: u64) -> Self {
        self.flow_control_video_ms = ms;
        self
    }

    pub fn flow_control_total_ms(mut self, ms: u64) -> Self {
        self.flow_control_total_ms = ms;
        self
    }

    pub fn switching_max_write_ahead_ms(mut self, ms: u64) -> Self {
        self.switching_max_write_ahead_ms = ms;
        self
    }
}

/// RPC execution pool sizing (spec.md §4.10, §6.4).
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub worker_count: usize,
    pub max_concurrent_queries: usize,
    pub worker_join_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_concurrent_queries: 1024,
            worker_join_timeout: Duration::from_secs(5),
        }
    }
}

impl RpcConfig {
    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    pub fn max_concurrent_queries(mut self, n: usize) -> Self {
        self.max_concurrent_queries = n;
        self
    }
}

/// Single configuration root threaded through constructors (spec.md §9,
/// Design Notes: "a single runtime config root owned by the reactor").
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub log: LogConfig,
    pub rtmp: crate::rtmp::RtmpConfig,
    pub rtsp: crate::rtsp::RtspConfig,
    pub pacing: PacingConfig,
    pub rpc: RpcConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_config_builder_chains() {
        let cfg = LogConfig::default()
            .block_size(4096)
            .blocks_per_file(4)
            .deflate(true);
        assert_eq!(cfg.block_size, 4096);
        assert_eq!(cfg.blocks_per_file, 4);
        assert!(cfg.deflate);
    }

    #[test]
    fn pacing_defaults_are_sane() {
        let cfg = PacingConfig::default();
        assert!(cfg.flow_control_video_ms < cfg.flow_control_total_ms);
        assert!(cfg.switching_default_write_ahead_ms < cfg.switching_max_write_ahead_ms);
    }
}
