use thiserror::Error;

/// Per-pod, per-cycle sensor errors. These are always soft: the caller
/// skips the pod for this cycle, bumps a failure counter, and continues —
/// they never unwind past the sensor boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CgroupError {
    #[error("no cgroup directory found for pod {0}")]
    Unavailable(String),

    #[error("failed to read {file} under {path}: {reason}")]
    Read {
        path: String,
        file: &'static str,
        reason: String,
    },

    #[error("failed to parse {file} contents under {path}: {reason}")]
    Parse {
        path: String,
        file: &'static str,
        reason: String,
    },
}
