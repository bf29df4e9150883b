//! Cgroup demand sensor (component C1).
//!
//! Samples kernel throttling/usage counters from a pod's cgroup v2
//! `cpu.stat` file and turns the delta between successive samples into a
//! smoothed pressure signal in `[0, 1]` plus raw usage in millicores.
//!
//! The sensor itself is stateless: the previous counter sample and the
//! previously smoothed pressure value are owned by the allocation state
//! store (C2) and threaded through `sample()` by the caller, per the
//! "no process-level singletons" rule — only the math (path discovery,
//! parsing, the EMA) lives here.

pub mod cgroup;
pub(crate) mod smoothing;

mod error;
pub use error::CgroupError;

use std::fs;
use std::time::Duration;

pub use cgroup::{CgroupPathResolver, PodCgroupId, QosClass};

/// A raw counter sample read from `cpu.stat` at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CgroupCounters {
    pub throttled_usec: u64,
    pub usage_usec: u64,
}

/// Result of one sensor sample.
#[derive(Debug, Clone, Copy)]
pub struct DemandReading {
    /// Instantaneous throttling-based pressure in `[0, 1]`, before smoothing.
    pub raw_pressure: f64,
    /// EMA-smoothed pressure in `[0, 1]`.
    pub smoothed_pressure: f64,
    /// Instantaneous CPU usage rate in millicores.
    pub usage_millicores: f64,
    /// Raw counters read this sample, to feed back into the next call.
    pub counters: CgroupCounters,
    /// Which path template resolved, for caching by the caller.
    pub template_index: usize,
}

pub struct CgroupDemandSensor {
    resolver: CgroupPathResolver,
    alpha_up: f64,
    alpha_down: f64,
    throttle_saturation: f64,
}

impl CgroupDemandSensor {
    pub fn new(
        cgroup_root: impl Into<std::path::PathBuf>,
        alpha_up: f64,
        alpha_down: f64,
        throttle_saturation: f64,
    ) -> Self {
        Self {
            resolver: CgroupPathResolver::new(cgroup_root),
            alpha_up,
            alpha_down,
            throttle_saturation,
        }
    }

    /// Sample the pod's cgroup counters and derive a smoothed demand
    /// reading. `prev` is the last sample for this pod (`None` on first
    /// sight); `prev_smoothed` is the previously smoothed pressure
    /// (defaults to the raw pressure on first sight, so the very first
    /// reading does not smooth against an artificial zero).
    pub fn sample(
        &self,
        id: &PodCgroupId,
        cached_template: Option<usize>,
        prev: Option<(CgroupCounters, Duration)>,
        prev_smoothed: Option<f64>,
        elapsed_wall: Duration,
    ) -> Result<DemandReading, CgroupError> {
        let (path, template_index) = self
            .resolver
            .resolve(id, cached_template)
            .ok_or_else(|| CgroupError::Unavailable(id.pod_uid.clone()))?;

        let counters = read_cpu_stat(&path)?;

        let (raw_pressure, usage_millicores) = match prev {
            Some((prev_counters, prev_elapsed)) if !prev_elapsed.is_zero() => {
                let delta_throttled = counters
                    .throttled_usec
                    .saturating_sub(prev_counters.throttled_usec);
                let delta_usage = counters.usage_usec.saturating_sub(prev_counters.usage_usec);

                let ratio = if delta_usage == 0 {
                    0.0
                } else {
                    delta_throttled as f64 / delta_usage as f64
                };
                let pressure = (ratio / self.throttle_saturation).clamp(0.0, 1.0);

                let wall_usec = elapsed_wall.as_micros() as f64;
                let usage_mc = if wall_usec > 0.0 {
                    (delta_usage as f64 / wall_usec) * 1000.0
                } else {
                    0.0
                };

                (pressure, usage_mc)
            }
            _ => (0.0, 0.0),
        };

        let baseline = prev_smoothed.unwrap_or(raw_pressure);
        let smoothed_pressure =
            smoothing::ema_asymmetric(baseline, raw_pressure, self.alpha_up, self.alpha_down);

        Ok(DemandReading {
            raw_pressure,
            smoothed_pressure,
            usage_millicores,
            counters,
            template_index,
        })
    }
}

fn read_cpu_stat(dir: &std::path::Path) -> Result<CgroupCounters, CgroupError> {
    let path = dir.join("cpu.stat");
    let content = fs::read_to_string(&path).map_err(|e| CgroupError::Read {
        path: path.display().to_string(),
        file: "cpu.stat",
        reason: e.to_string(),
    })?;

    let throttled_usec = parse_stat_field(&content, "throttled_usec").ok_or_else(|| {
        CgroupError::Parse {
            path: path.display().to_string(),
            file: "cpu.stat",
            reason: "missing throttled_usec".to_string(),
        }
    })?;
    let usage_usec =
        parse_stat_field(&content, "usage_usec").ok_or_else(|| CgroupError::Parse {
            path: path.display().to_string(),
            file: "cpu.stat",
            reason: "missing usage_usec".to_string(),
        })?;

    Ok(CgroupCounters {
        throttled_usec,
        usage_usec,
    })
}

fn parse_stat_field(content: &str, field: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// `root` is the cgroup root; the pod's directory is derived from `id`
    /// using the same `cgroupfs_guaranteed` template the resolver tries,
    /// so tests write exactly where the sensor will look.
    fn pod_dir(root: &std::path::Path, pod_uid: &str) -> std::path::PathBuf {
        root.join("kubepods").join(format!("pod{pod_uid}"))
    }

    fn write_stat(dir: &std::path::Path, throttled: u64, usage: u64) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join("cpu.stat"),
            format!("usage_usec {usage}\nthrottled_usec {throttled}\nnr_periods 0\n"),
        )
        .unwrap();
    }

    #[test]
    fn no_throttling_yields_zero_pressure() {
        let tmp = std::env::temp_dir().join(format!("mbcas-sensor-{}-a", std::process::id()));
        let dir = pod_dir(&tmp, "pod-a");
        write_stat(&dir, 0, 500_000);

        let sensor = CgroupDemandSensor::new(&tmp, 0.3, 0.2, 0.10);
        let id = PodCgroupId {
            pod_uid: "pod-a".to_string(),
            qos: QosClass::Guaranteed,
        };
        let reading = sensor
            .sample(
                &id,
                None,
                Some((
                    CgroupCounters {
                        throttled_usec: 0,
                        usage_usec: 0,
                    },
                    Duration::from_secs(1),
                )),
                None,
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(reading.raw_pressure, 0.0);
        assert!((reading.usage_millicores - 500.0).abs() < 1e-6);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn full_throttling_saturates_pressure() {
        let tmp = std::env::temp_dir().join(format!("mbcas-sensor-{}-b", std::process::id()));
        let dir = pod_dir(&tmp, "pod-b");
        // throttled delta = usage delta => ratio 1.0 >> saturation 0.10
        write_stat(&dir, 1_000_000, 1_000_000);

        let sensor = CgroupDemandSensor::new(&tmp, 0.3, 0.2, 0.10);
        let id = PodCgroupId {
            pod_uid: "pod-b".to_string(),
            qos: QosClass::Guaranteed,
        };
        let reading = sensor
            .sample(
                &id,
                None,
                Some((
                    CgroupCounters {
                        throttled_usec: 0,
                        usage_usec: 0,
                    },
                    Duration::from_secs(1),
                )),
                None,
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(reading.raw_pressure, 1.0);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_cgroup_is_soft_error() {
        let tmp = std::env::temp_dir().join(format!("mbcas-sensor-{}-missing", std::process::id()));
        let sensor = CgroupDemandSensor::new(&tmp, 0.3, 0.2, 0.10);
        let id = PodCgroupId {
            pod_uid: "ghost".to_string(),
            qos: QosClass::Guaranteed,
        };
        let err = sensor.sample(&id, None, None, None, Duration::from_secs(1));
        assert!(matches!(err, Err(CgroupError::Unavailable(_))));
    }

    #[test]
    fn first_sight_has_no_prior_counters_and_reports_zero_pressure() {
        let tmp = std::env::temp_dir().join(format!("mbcas-sensor-{}-c", std::process::id()));
        let dir = pod_dir(&tmp, "pod-c");
        write_stat(&dir, 500, 10_000);

        let sensor = CgroupDemandSensor::new(&tmp, 0.3, 0.2, 0.10);
        let id = PodCgroupId {
            pod_uid: "pod-c".to_string(),
            qos: QosClass::Guaranteed,
        };
        let reading = sensor
            .sample(&id, None, None, None, Duration::from_secs(1))
            .unwrap();
        assert_eq!(reading.raw_pressure, 0.0);
        assert_eq!(reading.usage_millicores, 0.0);

        let _ = fs::remove_dir_all(&tmp);
    }
}
