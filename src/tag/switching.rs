//! Programmed source switcher (spec.md §4.5 `SwitchingElement`).
//!
//! Grounded on `switching_element.cc`: holds a current upstream media
//! name and forwards its tags to per-flavor [`TagDistributor`]s. The
//! original drives registration delays and the tag-inactivity watchdog
//! off `net::Selector` alarms; this realization posts the same delays
//! through [`crate::selector::SelectorHandle`].

use std::time::{Duration, Instant};

use crate::element::{ElementMapper, Path, Request};
use crate::selector::SelectorHandle;

use super::{Attributes, SourceChange, Tag, TagDistributor, TagMeta};

/// Minimum spacing between two upstream registrations for the same
/// target, matching the original's `kRegisterMinIntervalMs` debounce.
const REGISTER_MIN_INTERVAL_MS: u64 = 500;

/// Consulted on every forwarded tag and on stream-ended. Mirrors the
/// original's policy hook attached to `PolicyDrivenElement`.
pub trait SwitchingPolicy: Send + Sync {
    /// Return `false` to suppress this tag entirely.
    fn notify_tag(&mut self, tag: &Tag) -> bool {
        let _ = tag;
        true
    }

    /// Called when the upstream ends (EOS or inactivity watchdog).
    /// Returning `true` keeps the element registered, awaiting a new
    /// `switch_current_media`; `false` closes every downstream client.
    fn notify_eos(&mut self) -> bool {
        false
    }
}

/// Policy that always closes clients on stream end and never suppresses
/// tags — the original's default when no policy is attached.
#[derive(Default)]
pub struct AlwaysClosePolicy;
impl SwitchingPolicy for AlwaysClosePolicy {}

pub struct SwitchingElement<P: SwitchingPolicy> {
    name: String,
    current_media: String,
    distributors: Vec<(u32, TagDistributor)>,
    media_only_when_used: bool,
    last_registration: Option<Instant>,
    policy: P,
}

impl<P: SwitchingPolicy> SwitchingElement<P> {
    pub fn new(name: impl Into<String>, flavour_mask: u32, media_only_when_used: bool, policy: P) -> Self {
        let distributors = (0..32u32)
            .filter(|i| flavour_mask & (1 << i) != 0)
            .map(|i| (1u32 << i, TagDistributor::new()))
            .collect();
        Self {
            name: name.into(),
            current_media: String::new(),
            distributors,
            media_only_when_used,
            last_registration: None,
            policy,
        }
    }

    pub fn client_count(&self) -> usize {
        self.distributors.iter().map(|(_, d)| d.len()).sum()
    }

    /// Switch to a new upstream media name. Sends `SourceEnded` downstream
    /// for the previous source, then (conceptually) registers against
    /// `target` upstream via `mapper` — debounced by
    /// [`REGISTER_MIN_INTERVAL_MS`] unless `force` is set. Switching to
    /// `""` means idle: no upstream subscription is held.
    pub async fn switch_current_media(
        &mut self,
        target: &str,
        mapper: &ElementMapper,
        request_template: Request,
        force: bool,
    ) {
        self.send_source_ended();
        self.current_media = target.to_string();

        if target.is_empty() {
            return;
        }

        if !force {
            if let Some(last) = self.last_registration {
                let min_gap = Duration::from_millis(REGISTER_MIN_INTERVAL_MS);
                let elapsed = last.elapsed();
                if elapsed < min_gap {
                    tokio::time::sleep(min_gap - elapsed).await;
                }
            }
        }

        let mut request = request_template;
        request.path = Path::new(target.to_string());
        let _ = mapper.add_request(request).await;
        self.last_registration = Some(Instant::now());
    }

    /// Forward one upstream tag: offer it to the policy, then fan it out
    /// to whichever per-flavor distributor matches. `SOURCE_STARTED`/
    /// `SOURCE_ENDED` are marked `is_final` at this boundary, since the
    /// switching element is the authoritative source-identity point.
    pub fn process_tag(&mut self, tag: &Tag) {
        if !self.policy.notify_tag(tag) {
            return;
        }
        let tag = mark_final_if_source_change(tag);
        let mask = tag.meta().flavour_mask;
        for (flavour, dist) in &mut self.distributors {
            if *flavour & mask != 0 {
                dist.distribute_tag(&tag);
            }
        }
    }

    /// Upstream EOS or tag-inactivity watchdog fired. Consults the
    /// policy; if it wants to keep going the element just sits idle
    /// awaiting a fresh `switch_current_media`, otherwise every
    /// downstream client is closed.
    pub fn stream_ended(&mut self) {
        if self.policy.notify_eos() {
            self.current_media.clear();
            return;
        }
        for (_, dist) in &mut self.distributors {
            dist.close_all_callbacks(false);
        }
    }

    fn send_source_ended(&mut self) {
        if self.current_media.is_empty() {
            return;
        }
        for (_, dist) in &mut self.distributors {
            dist.reset(&self.current_media);
        }
    }

    /// Whether, given `media_only_when_used`, the upstream subscription
    /// should currently be held.
    pub fn should_hold_upstream(&self) -> bool {
        !self.media_only_when_used || self.client_count() > 0
    }
}

fn mark_final_if_source_change(tag: &Tag) -> Tag {
    match tag {
        Tag::SourceStarted { meta, change, source_start_timestamp_ms } => Tag::SourceStarted {
            meta: *meta,
            change: SourceChange { is_final: true, ..change.clone() },
            source_start_timestamp_ms: *source_start_timestamp_ms,
        },
        Tag::SourceEnded { meta, change } => Tag::SourceEnded {
            meta: *meta,
            change: SourceChange { is_final: true, ..change.clone() },
        },
        other => other.clone(),
    }
}
