//! Alarm table backing [`super::Selector`].
//!
//! Grounded on `selector.cc`'s `alarms_` (a `multimap<int64, Alarm*>` keyed
//! by absolute fire time, plus a reverse map from alarm id to its current
//! key so a reschedule can find and remove the old entry). Rust's
//! `BTreeMap` doesn't allow duplicate keys, so the forward map is keyed on
//! `(Instant, u64)` — the alarm id breaks ties and keeps insertion order
//! stable when two alarms share a millisecond.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use super::Closure;

/// Opaque handle to a registered alarm. Carries no meaning beyond identity
/// and equality — callers store it and pass it back to reschedule/cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmId(pub(super) u64);

struct Pending {
    key: (Instant, u64),
    closure: Closure,
}

pub(super) struct AlarmTable {
    by_time: BTreeMap<(Instant, u64), u64>,
    by_id: HashMap<u64, Pending>,
}

impl AlarmTable {
    pub fn new() -> Self {
        Self {
            by_time: BTreeMap::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn register(&mut self, id: u64, delay: Duration, closure: Closure) {
        let key = (Instant::now() + delay, id);
        self.by_time.insert(key, id);
        self.by_id.insert(id, Pending { key, closure });
    }

    /// Reschedule fires the common "I just got data, push my idle timeout
    /// back" case without allocating a new id (spec §8: at most one
    /// outstanding firing per `AlarmId`). Rescheduling an id that already
    /// fired or was never registered is a silent no-op — the caller can't
    /// distinguish "fired already" from "raced the firing" anyway.
    pub fn reschedule(&mut self, id: u64, delay: Duration) {
        let Some(pending) = self.by_id.get_mut(&id) else {
            return;
        };
        self.by_time.remove(&pending.key);
        let new_key = (Instant::now() + delay, id);
        pending.key = new_key;
        self.by_time.insert(new_key, id);
    }

    pub fn cancel(&mut self, id: u64) {
        if let Some(pending) = self.by_id.remove(&id) {
            self.by_time.remove(&pending.key);
        }
    }

    /// Pop and run every alarm whose fire time is `<= now`.
    pub fn fire_due(&mut self, now: Instant) {
        loop {
            let Some((&key, &id)) = self.by_time.iter().next() else {
                break;
            };
            if key.0 > now {
                break;
            }
            self.by_time.remove(&key);
            if let Some(pending) = self.by_id.remove(&id) {
                (pending.closure)();
            }
        }
    }

    /// How long the reactor may sleep before the next alarm is due.
    /// `force_poll` mirrors `selector_high_alarm_precission`: when set, the
    /// caller never sleeps past a short fixed tick even with no alarms
    /// pending, trading CPU for tighter timer accuracy.
    pub fn time_until_next(&self, force_poll: bool) -> Duration {
        match self.by_time.keys().next() {
            Some((at, _)) => at.saturating_duration_since(Instant::now()),
            None if force_poll => Duration::from_millis(10),
            None => Duration::from_secs(1),
        }
    }
}
