//! Errors surfaced by the platform client. `PlatformUnavailable` is fatal at
//! startup and transient once the process is already running (§7); patch
//! failures are classified into the transient/permanent split the actuator
//! needs to decide whether to requeue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform feature unavailable: {0}")]
    Unavailable(String),

    #[error("pod {namespace}/{name} not found")]
    PodNotFound { namespace: String, name: String },

    #[error("kube api error: {0}")]
    Api(#[from] kube::Error),
}

/// Classification of a resize-patch failure, per §7's `ReconcileConflict`
/// vs `ReconcilePermanent` split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFailureKind {
    /// Optimistic concurrency conflict or timeout: requeue with backoff.
    Transient,
    /// Value rejected, pod gone, or container not found: no further retry
    /// until a new desired value arrives.
    Permanent,
}

impl PlatformError {
    pub fn classify_patch_failure(&self) -> PatchFailureKind {
        match self {
            PlatformError::Api(kube::Error::Api(resp)) => {
                if resp.code == 409 || resp.code == 408 || resp.code == 429 {
                    PatchFailureKind::Transient
                } else {
                    PatchFailureKind::Permanent
                }
            }
            PlatformError::PodNotFound { .. } => PatchFailureKind::Permanent,
            _ => PatchFailureKind::Transient,
        }
    }
}
