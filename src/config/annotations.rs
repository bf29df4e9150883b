//! Parsing of the `mbcas.io/*` pod annotations described in the platform
//! contract: opt-out, per-pod minimum override, SLO latency hint, and an
//! optional workload-type hint.

use std::collections::BTreeMap;

/// Optional workload-shape hint a pod owner can attach. Implementations MAY
/// use it to bias exploration/demand parameters; it never overrides the
/// hard safety caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadType {
    Idle,
    Steady,
    Bursty,
    Periodic,
    Ramping,
}

impl WorkloadType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "steady" => Some(Self::Steady),
            "bursty" => Some(Self::Bursty),
            "periodic" => Some(Self::Periodic),
            "ramping" => Some(Self::Ramping),
            _ => None,
        }
    }

    /// Multiplier nudging the starting exploration rate. Bursty/ramping
    /// workloads explore a little more eagerly; steady/idle workloads settle
    /// faster.
    pub fn epsilon_bias(self) -> f64 {
        match self {
            WorkloadType::Idle => 0.5,
            WorkloadType::Steady => 0.8,
            WorkloadType::Bursty => 1.5,
            WorkloadType::Periodic => 1.2,
            WorkloadType::Ramping => 1.3,
        }
    }
}

/// Decoded `mbcas.io/*` annotations for a single pod.
#[derive(Debug, Clone, Default)]
pub struct PodAnnotations {
    pub managed: bool,
    pub min_cpu_millicores: Option<u64>,
    pub target_latency_ms: Option<u32>,
    pub workload_type: Option<WorkloadType>,
}

const ANNOTATION_MANAGED: &str = "mbcas.io/managed";
const ANNOTATION_MIN_CPU: &str = "mbcas.io/min-cpu";
const ANNOTATION_TARGET_LATENCY: &str = "mbcas.io/target-latency-ms";
const ANNOTATION_WORKLOAD_TYPE: &str = "mbcas.io/workload-type";

impl PodAnnotations {
    /// Decode annotations from a pod's raw annotation map. Absent or
    /// unparseable values fall back to "no opinion" rather than erroring —
    /// a malformed hint should degrade gracefully, not take the pod out of
    /// management.
    pub fn parse(raw: &BTreeMap<String, String>) -> Self {
        let managed = raw
            .get(ANNOTATION_MANAGED)
            .map(|v| v != "false")
            .unwrap_or(true);

        let min_cpu_millicores = raw
            .get(ANNOTATION_MIN_CPU)
            .and_then(|v| parse_cpu_quantity(v));

        let target_latency_ms = raw
            .get(ANNOTATION_TARGET_LATENCY)
            .and_then(|v| v.parse::<u32>().ok());

        let workload_type = raw
            .get(ANNOTATION_WORKLOAD_TYPE)
            .and_then(|v| WorkloadType::parse(v));

        Self {
            managed,
            min_cpu_millicores,
            target_latency_ms,
            workload_type,
        }
    }
}

/// Parse a Kubernetes CPU quantity string ("500m", "1", "1.5") into millicores.
pub fn parse_cpu_quantity(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(stripped) = s.strip_suffix('m') {
        return stripped.parse::<u64>().ok();
    }
    s.parse::<f64>().ok().map(|cores| (cores * 1000.0) as u64)
}
