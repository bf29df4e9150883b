//! Per-pod Q-table: state -> per-action score, bounded to `QMaxStates`
//! entries via least-recently-updated eviction. Eviction never removes a
//! state currently pinned by an in-flight TD update.

use std::collections::HashMap;

use super::action::NUM_ACTIONS;

#[derive(Debug, Clone)]
struct StateEntry {
    scores: [f64; NUM_ACTIONS],
    last_touch: u64,
}

/// A bounded map from discrete state key to per-action Q-values.
#[derive(Debug, Clone)]
pub struct QTable {
    max_states: usize,
    entries: HashMap<String, StateEntry>,
    clock: u64,
    pinned: std::collections::HashSet<String>,
}

impl QTable {
    pub fn new(max_states: usize) -> Self {
        Self {
            max_states: max_states.max(1),
            entries: HashMap::new(),
            clock: 0,
            pinned: std::collections::HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Q-value for `(state, action)`, defaulting to 0.0 for unseen pairs.
    /// Does not touch recency or create an entry — use `touch` for that.
    pub fn get(&self, state: &str, action_index: usize) -> f64 {
        self.entries
            .get(state)
            .map(|e| e.scores[action_index])
            .unwrap_or(0.0)
    }

    /// All action scores for `state`, defaulting to all-zero.
    pub fn action_scores(&self, state: &str) -> [f64; NUM_ACTIONS] {
        self.entries
            .get(state)
            .map(|e| e.scores)
            .unwrap_or([0.0; NUM_ACTIONS])
    }

    /// Marks `state` as just-touched, creating it (evicting if necessary)
    /// if it did not already exist. Call this before reading scores for
    /// action selection so the state counts as recently used even if the
    /// TD update for it comes later.
    pub fn touch(&mut self, state: &str) {
        self.clock += 1;
        let clock = self.clock;
        if let Some(entry) = self.entries.get_mut(state) {
            entry.last_touch = clock;
            return;
        }
        self.evict_if_needed();
        self.entries.insert(
            state.to_string(),
            StateEntry {
                scores: [0.0; NUM_ACTIONS],
                last_touch: clock,
            },
        );
    }

    /// Sets `Q(state, action)`, creating the state if necessary.
    pub fn set(&mut self, state: &str, action_index: usize, value: f64) {
        self.touch(state);
        if let Some(entry) = self.entries.get_mut(state) {
            entry.scores[action_index] = value;
        }
    }

    /// Pins `state` so it survives eviction until `unpin` is called for it.
    /// Used while a TD update is in flight for that state. Unlike a
    /// borrowing guard, this only touches the pinned set, so the table
    /// itself is free to be read and written again immediately after.
    pub fn pin(&mut self, state: &str) {
        self.pinned.insert(state.to_string());
    }

    /// Releases a pin taken by `pin`. A no-op if `state` was not pinned.
    pub fn unpin(&mut self, state: &str) {
        self.pinned.remove(state);
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() >= self.max_states {
            let victim = self
                .entries
                .iter()
                .filter(|(key, _)| !self.pinned.contains(*key))
                .min_by_key(|(_, entry)| entry.last_touch)
                .map(|(key, _)| key.clone());

            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                }
                // Every entry is pinned; cannot evict further without
                // breaking an in-flight update. Stop trying this round.
                None => break,
            }
        }
    }
}
