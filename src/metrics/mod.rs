//! Minimal atomic counters and gauges for operational visibility.
//!
//! The actual scrape/export surface (a Prometheus endpoint, a metrics
//! scraping UI) is an external collaborator; this module only accumulates
//! the numbers the node agent loop and actuator are required to expose.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Per-node-agent counters and gauges, one instance per agent process.
#[derive(Clone, Default)]
pub struct AgentMetrics {
    pub samples_total: Arc<AtomicU64>,
    pub writes_total: Arc<AtomicU64>,
    pub reads_failed_total: Arc<AtomicU64>,
    pub cgroup_path_misses_total: Arc<AtomicU64>,
    pub overruns_total: Arc<AtomicU64>,
    pub invalid_bids_total: Arc<AtomicU64>,
    /// Shadow price from the most recently completed cycle, scaled by 1e6
    /// to store as an integer.
    pub shadow_price_micros: Arc<AtomicI64>,
    /// Current market regime: 0=uncongested, 1=congested, 2=overloaded.
    pub regime: Arc<AtomicI64>,
    /// Largest per-pod Q-table size (entry count) across every pod this
    /// agent currently tracks, sampled once per cycle. Bounded by
    /// `QMaxStates`; a gauge reading at that ceiling means eviction is
    /// actively trimming states for at least one pod.
    pub q_table_size_max: Arc<AtomicU64>,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sample(&self) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.reads_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cgroup_path_miss(&self) {
        self.cgroup_path_misses_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_bid(&self) {
        self.invalid_bids_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_shadow_price(&self, price: f64) {
        self.shadow_price_micros
            .store((price * 1_000_000.0) as i64, Ordering::Relaxed);
    }

    pub fn set_regime(&self, regime: crate::market::Regime) {
        let code = match regime {
            crate::market::Regime::Uncongested => 0,
            crate::market::Regime::Congested => 1,
            crate::market::Regime::Overloaded => 2,
        };
        self.regime.store(code, Ordering::Relaxed);
    }

    pub fn set_q_table_size_max(&self, size: usize) {
        self.q_table_size_max.store(size as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AgentMetricsSnapshot {
        AgentMetricsSnapshot {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            writes_total: self.writes_total.load(Ordering::Relaxed),
            reads_failed_total: self.reads_failed_total.load(Ordering::Relaxed),
            cgroup_path_misses_total: self.cgroup_path_misses_total.load(Ordering::Relaxed),
            overruns_total: self.overruns_total.load(Ordering::Relaxed),
            invalid_bids_total: self.invalid_bids_total.load(Ordering::Relaxed),
            shadow_price: self.shadow_price_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            regime: self.regime.load(Ordering::Relaxed),
            q_table_size_max: self.q_table_size_max.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time read of `AgentMetrics`, suitable for logging or exposing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentMetricsSnapshot {
    pub samples_total: u64,
    pub writes_total: u64,
    pub reads_failed_total: u64,
    pub cgroup_path_misses_total: u64,
    pub overruns_total: u64,
    pub invalid_bids_total: u64,
    pub shadow_price: f64,
    pub regime: i64,
    pub q_table_size_max: u64,
}

/// Per-actuator counters.
#[derive(Clone, Default)]
pub struct ActuatorMetrics {
    pub patches_applied_total: Arc<AtomicU64>,
    pub patches_failed_total: Arc<AtomicU64>,
    pub requeues_total: Arc<AtomicU64>,
    pub cooldown_skips_total: Arc<AtomicU64>,
}

impl ActuatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_applied(&self) {
        self.patches_applied_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.patches_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue(&self) {
        self.requeues_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cooldown_skip(&self) {
        self.cooldown_skips_total.fetch_add(1, Ordering::Relaxed);
    }
}
