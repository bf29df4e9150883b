use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

/// Root configuration for both the node agent and the cluster actuator.
///
/// Every field mirrors a tunable from the configuration table in the design
/// document; defaults match the values listed there exactly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MbcasConfig {
    /// Interval between cgroup counter samples.
    #[serde(with = "duration_secs")]
    pub sampling_interval: Duration,

    /// Period of the node agent's cycle (discover -> sample -> bid -> clear -> emit).
    #[serde(with = "duration_secs")]
    pub write_interval: Duration,

    /// Fraction of node-allocatable CPU withheld from the market as system reserve.
    pub system_reserve_percent: f64,

    /// Hard floor for any emitted allocation, in millicores.
    pub absolute_min_allocation_millicores: u64,

    /// Hard ceiling for any emitted allocation, in millicores.
    pub absolute_max_allocation_millicores: u64,

    /// EMA rate applied to the node agent's smoothed allocation when it rises.
    pub alpha_up: f64,
    /// EMA rate applied to the node agent's smoothed allocation when it falls.
    pub alpha_down: f64,

    /// EMA rate applied to the sensor's smoothed pressure signal when it rises.
    pub sensor_alpha_up: f64,
    /// EMA rate applied to the sensor's smoothed pressure signal when it falls.
    pub sensor_alpha_down: f64,

    /// Minimum relative change required for a cycle to emit a write.
    pub min_change_percent: f64,

    /// Window after pod start during which allocation may not drop below the
    /// pod's initially observed limit.
    #[serde(with = "duration_secs")]
    pub startup_grace_period: Duration,

    /// Minimum time between two successful patches to the same pod.
    #[serde(with = "duration_secs")]
    pub reconcile_cooldown: Duration,

    /// Maximum per-reconcile multiplicative increase over the current limit.
    pub max_step_up: f64,
    /// Maximum per-reconcile multiplicative decrease under the current limit.
    pub max_step_down: f64,

    /// Number of pods the actuator may reconcile concurrently.
    pub reconcile_concurrency: usize,

    /// Q-learning rate (alpha).
    pub q_learn_rate: f64,
    /// Q-learning discount factor (gamma).
    pub q_discount: f64,
    /// Initial exploration rate (epsilon).
    pub epsilon_start: f64,
    /// Floor for epsilon decay.
    pub epsilon_min: f64,
    /// Multiplicative per-update decay applied to epsilon.
    pub epsilon_decay: f64,
    /// Maximum number of Q-table states retained per pod.
    pub q_max_states: usize,

    /// Throttling ratio at which the sensor's pressure signal saturates to 1.0.
    pub throttle_saturation: f64,

    /// Namespaces never considered for management.
    pub excluded_namespaces: HashSet<String>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for MbcasConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(1),
            write_interval: Duration::from_secs(5),
            system_reserve_percent: 10.0,
            absolute_min_allocation_millicores: 100,
            absolute_max_allocation_millicores: 10_000,
            alpha_up: 0.2,
            alpha_down: 0.7,
            sensor_alpha_up: 0.3,
            sensor_alpha_down: 0.2,
            min_change_percent: 0.02,
            startup_grace_period: Duration::from_secs(60),
            reconcile_cooldown: Duration::from_secs(10),
            max_step_up: 1.5,
            max_step_down: 1.0 / 1.5,
            reconcile_concurrency: 4,
            q_learn_rate: 0.1,
            q_discount: 0.9,
            epsilon_start: 0.2,
            epsilon_min: 0.01,
            epsilon_decay: 0.999,
            q_max_states: 5000,
            throttle_saturation: 0.10,
            excluded_namespaces: default_excluded_namespaces(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_excluded_namespaces() -> HashSet<String> {
    ["kube-system", "mbcas-system"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Logging configuration, shared by both binaries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit structured JSON lines instead of the human-readable format.
    pub json: bool,
    /// Optional file path (supports a `{role}` placeholder); stdout if unset.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
