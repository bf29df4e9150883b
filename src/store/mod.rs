//! Allocation state store (C2): the concurrency-safe mapping from pod
//! identity to in-memory runtime state that every other component reads
//! and writes through, never directly between themselves.

mod pod_state;

pub use pod_state::{PendingTransition, PodIdentity, PodRuntimeState};

use std::collections::HashSet;

use pod_state::PodStateMap;

/// Owns every managed pod's runtime state for one node agent. Not `Sync`
/// by design — the node agent's pipeline is single-threaded and owns this
/// store exclusively; there is no cross-task sharing to guard against.
pub struct AllocationStateStore {
    states: PodStateMap,
    /// Pods missing from the live set on the previous `prune` call; removed
    /// on the next call if still missing, giving one full cycle of grace
    /// before an entry is dropped (absorbs a single missed list/watch tick).
    pending_removal: HashSet<PodIdentity>,
    epsilon_start: f64,
    q_max_states: usize,
}

impl AllocationStateStore {
    pub fn new(epsilon_start: f64, q_max_states: usize) -> Self {
        Self {
            states: PodStateMap::new(),
            pending_removal: HashSet::new(),
            epsilon_start,
            q_max_states,
        }
    }

    /// Returns the existing runtime state for `id`, creating a fresh one
    /// (with a new pod's initial epsilon and bounded Q-table) if absent.
    pub fn get_or_create(&mut self, id: &PodIdentity) -> &mut PodRuntimeState {
        self.pending_removal.remove(id);
        self.states
            .entry(id.clone())
            .or_insert_with(|| PodRuntimeState::new(self.epsilon_start, self.q_max_states))
    }

    pub fn get(&self, id: &PodIdentity) -> Option<&PodRuntimeState> {
        self.states.get(id)
    }

    pub fn get_mut(&mut self, id: &PodIdentity) -> Option<&mut PodRuntimeState> {
        self.states.get_mut(id)
    }

    pub fn remove(&mut self, id: &PodIdentity) -> Option<PodRuntimeState> {
        self.pending_removal.remove(id);
        self.states.remove(id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// A consistent view of every tracked pod identity, taken once at the
    /// start of a cycle so the rest of the pipeline iterates a stable set.
    pub fn snapshot_ids(&self) -> Vec<PodIdentity> {
        let mut ids: Vec<PodIdentity> = self.states.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Largest per-pod Q-table entry count across every tracked pod, for
    /// the `q_table_size_max` gauge. Zero if no pod is tracked.
    pub fn max_q_table_size(&self) -> usize {
        self.states
            .values()
            .map(|runtime| runtime.q_table.len())
            .max()
            .unwrap_or(0)
    }

    /// Drops any tracked pod absent from `live_pods` for two consecutive
    /// calls (i.e. missing for at least one full cycle), returning the
    /// identities actually removed this call.
    pub fn prune(&mut self, live_pods: &HashSet<PodIdentity>) -> Vec<PodIdentity> {
        let missing_now: Vec<PodIdentity> = self
            .states
            .keys()
            .filter(|id| !live_pods.contains(*id))
            .cloned()
            .collect();

        let mut removed = Vec::new();
        for id in &missing_now {
            if self.pending_removal.contains(id) {
                self.states.remove(id);
                self.pending_removal.remove(id);
                removed.push(id.clone());
            } else {
                self.pending_removal.insert(id.clone());
            }
        }

        // Anything that reappeared in the live set is no longer a removal
        // candidate.
        self.pending_removal.retain(|id| missing_now.contains(id));

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str) -> PodIdentity {
        PodIdentity::new("default", name)
    }

    #[test]
    fn get_or_create_creates_once() {
        let mut store = AllocationStateStore::new(0.2, 100);
        store.get_or_create(&pod("a"));
        assert_eq!(store.len(), 1);
        store.get_or_create(&pod("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn prune_requires_two_consecutive_misses() {
        let mut store = AllocationStateStore::new(0.2, 100);
        store.get_or_create(&pod("a"));
        store.get_or_create(&pod("b"));

        let live: HashSet<PodIdentity> = [pod("b")].into_iter().collect();
        let removed_first = store.prune(&live);
        assert!(removed_first.is_empty());
        assert_eq!(store.len(), 2); // still present, just marked pending

        let removed_second = store.prune(&live);
        assert_eq!(removed_second, vec![pod("a")]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reappearing_pod_clears_pending_removal() {
        let mut store = AllocationStateStore::new(0.2, 100);
        store.get_or_create(&pod("a"));

        let empty: HashSet<PodIdentity> = HashSet::new();
        store.prune(&empty); // a is now pending removal

        let live: HashSet<PodIdentity> = [pod("a")].into_iter().collect();
        store.prune(&live); // a reappears before the second miss

        let removed = store.prune(&empty);
        // a should need a fresh two-miss cycle, not be removed immediately
        assert!(removed.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_ids_are_sorted() {
        let mut store = AllocationStateStore::new(0.2, 100);
        store.get_or_create(&pod("z"));
        store.get_or_create(&pod("a"));
        let ids = store.snapshot_ids();
        assert_eq!(ids, vec![pod("a"), pod("z")]);
    }

    #[test]
    fn max_q_table_size_is_zero_when_empty() {
        let store = AllocationStateStore::new(0.2, 100);
        assert_eq!(store.max_q_table_size(), 0);
    }

    #[test]
    fn max_q_table_size_reports_largest_tracked_pod() {
        let mut store = AllocationStateStore::new(0.2, 100);
        store.get_or_create(&pod("a")).q_table.set("s1", 0, 1.0);
        let busy = store.get_or_create(&pod("b"));
        busy.q_table.set("s1", 0, 1.0);
        busy.q_table.set("s2", 0, 1.0);
        assert_eq!(store.max_q_table_size(), 2);
    }
}
