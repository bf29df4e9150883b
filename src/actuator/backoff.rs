//! Per-pod cooldown and retry-backoff bookkeeping (§4.6 steps 3 and 7),
//! kept in memory by the single actuator process that owns reconciliation
//! for the whole cluster.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::store::PodIdentity;

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Tracks, per pod, the last successful patch time (for the cooldown rule)
/// and the number of consecutive transient failures (for exponential
/// backoff on retry).
#[derive(Default)]
pub struct BackoffTracker {
    last_patch: HashMap<PodIdentity, Instant>,
    attempts: HashMap<PodIdentity, u32>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time remaining before `cooldown` has elapsed since the last
    /// successful patch, or `None` if the pod is clear to patch now.
    pub fn cooldown_remaining(
        &self,
        id: &PodIdentity,
        cooldown: Duration,
        now: Instant,
    ) -> Option<Duration> {
        let last = *self.last_patch.get(id)?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }

    /// Records a successful patch, resetting the pod's retry count.
    pub fn record_success(&mut self, id: &PodIdentity, now: Instant) {
        self.last_patch.insert(id.clone(), now);
        self.attempts.remove(id);
    }

    /// Next exponential backoff delay for a transient failure: doubles per
    /// consecutive attempt, capped at five minutes.
    pub fn next_backoff(&mut self, id: &PodIdentity) -> Duration {
        let attempt = self.attempts.entry(id.clone()).or_insert(0);
        *attempt += 1;
        let secs = 2u64.saturating_pow((*attempt).min(32));
        Duration::from_secs(secs).min(MAX_BACKOFF)
    }

    /// Clears retry state after a permanent failure or a fresh desired
    /// value — no further automatic retry is owed.
    pub fn clear_attempts(&mut self, id: &PodIdentity) {
        self.attempts.remove(id);
    }

    pub fn forget(&mut self, id: &PodIdentity) {
        self.last_patch.remove(id);
        self.attempts.remove(id);
    }
}
