//! Monotonic timestamp normalization across source discontinuities
//! (spec.md §4.5 `TagNormalizer`, §3.2 `StreamTimeCalculator`).
//!
//! Grounded on `tag.h`'s `StreamTimeCalculator`: tags arrive in a "broken"
//! stream — each `SOURCE_STARTED` resets the per-source timestamp origin,
//! but the normalizer's own output clock (`stream_time_ms`) must keep
//! increasing. `max_write_ahead_ms` additionally bounds how far the
//! normalizer is allowed to run ahead of real time before the caller
//! should apply back-pressure (delegated to `Exporter::pause`, not
//! performed here).

use super::Tag;

pub struct TagNormalizer {
    last_tag_ts: i64,
    stream_time_ms: i64,
    last_source_started_ts: i64,
    max_write_ahead_ms: i64,
    started: bool,
}

impl TagNormalizer {
    pub fn new(max_write_ahead_ms: i64) -> Self {
        Self {
            last_tag_ts: 0,
            stream_time_ms: 0,
            last_source_started_ts: 0,
            max_write_ahead_ms,
            started: false,
        }
    }

    pub fn stream_time_ms(&self) -> i64 {
        self.stream_time_ms
    }

    /// Milliseconds of media since the current source started.
    pub fn media_time_ms(&self) -> i64 {
        self.last_tag_ts - self.last_source_started_ts
    }

    /// Process one tag, returning the delta applied to `stream_time_ms`.
    /// `SOURCE_STARTED` resets the per-source origin without advancing the
    /// stream clock; every other tag advances `stream_time_ms` by the
    /// positive delta to the previous tag's timestamp, clamped to zero if
    /// the upstream jumped backwards (can happen across a source switch
    /// before the `SOURCE_STARTED` tag arrives).
    pub fn process_tag(&mut self, tag: &Tag) -> i64 {
        let ts = tag.timestamp_ms();

        if let Tag::SourceStarted { .. } = tag {
            self.last_source_started_ts = ts;
            self.last_tag_ts = ts;
            self.started = true;
            return 0;
        }

        if !self.started {
            self.last_source_started_ts = ts;
            self.last_tag_ts = ts;
            self.started = true;
            return 0;
        }

        let delta = (ts - self.last_tag_ts).max(0);
        self.last_tag_ts = ts;
        self.stream_time_ms += delta;
        delta
    }

    /// Whether the normalizer has run far enough ahead of `real_time_ms`
    /// that the caller should back-pressure further emission.
    pub fn should_pause(&self, real_time_ms: i64) -> bool {
        self.stream_time_ms - real_time_ms > self.max_write_ahead_ms
    }
}
