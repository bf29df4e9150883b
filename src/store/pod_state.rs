use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::bidding::QTable;
use crate::sensor::CgroupCounters;

/// Stable identifier for a managed pod: namespace/name pair. Kept as a
/// small newtype (rather than a bare `String` key) so the store, the
/// market solver's sort key, and the actuator's queue key all agree on
/// identity without re-parsing a composite string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodIdentity {
    pub namespace: String,
    pub name: String,
}

impl PodIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Last transition the bidding agent made, needed to apply the deferred
/// Q-learning update on the following cycle.
#[derive(Debug, Clone)]
pub struct PendingTransition {
    pub state: String,
    pub action_index: usize,
}

/// In-memory, per-pod runtime state owned exclusively by one node agent.
/// Never shared across agents or across process boundaries.
#[derive(Debug, Clone)]
pub struct PodRuntimeState {
    pub started_at: Instant,

    /// Most recent cgroup counters and the wall-clock duration since the
    /// sample before that one (used to compute the next delta).
    pub last_counters: Option<(CgroupCounters, Duration)>,
    pub last_sample_at: Option<Instant>,

    /// Cached winning cgroup path template index from §4.1.
    pub cgroup_template: Option<usize>,

    pub smoothed_demand: f64,
    pub smoothed_allocation_millicores: f64,
    pub last_emitted_millicores: Option<f64>,

    /// The pod's observed CPU limit the first time it was seen, used by
    /// the startup grace rule.
    pub initial_observed_limit_millicores: Option<f64>,

    pub q_table: QTable,
    pub epsilon: f64,
    pub pending_transition: Option<PendingTransition>,

    pub consecutive_sensor_failures: u64,
    pub last_updated_at: Instant,
}

impl PodRuntimeState {
    pub fn new(epsilon_start: f64, q_max_states: usize) -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            last_counters: None,
            last_sample_at: None,
            cgroup_template: None,
            smoothed_demand: 0.0,
            smoothed_allocation_millicores: 0.0,
            last_emitted_millicores: None,
            initial_observed_limit_millicores: None,
            q_table: QTable::new(q_max_states),
            epsilon: epsilon_start,
            pending_transition: None,
            consecutive_sensor_failures: 0,
            last_updated_at: now,
        }
    }

    pub fn within_startup_grace(&self, grace: Duration) -> bool {
        self.started_at.elapsed() < grace
    }
}

pub(crate) type PodStateMap = HashMap<PodIdentity, PodRuntimeState>;
