//! The seven-step reconcile procedure (§4.6) run once per dequeued pod
//! identity: eligibility check, delta, cooldown, step-limit clamp, patch,
//! and status update.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::{MbcasConfig, PodAnnotations};
use crate::k8s::{K8sClient, Phase, PlatformError, PodAllocationStatus, PodInfo};
use crate::metrics::ActuatorMetrics;
use crate::sensor::QosClass;
use crate::store::PodIdentity;

use super::backoff::BackoffTracker;
use super::queue::EventQueueHandle;

const RECONCILE_PATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to one dequeued identity, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No `PodAllocation` record exists (already deleted); nothing to do.
    AllocationMissing,
    /// Pod gone, terminating, Guaranteed QoS, or opted out; status Failed.
    Ineligible,
    /// Less than `ReconcileCooldown` since the last successful patch;
    /// requeued with the remaining delay.
    Cooldown,
    /// Patch applied; `clamped` records whether the step limit kicked in.
    Applied { clamped: bool },
    /// Transient patch failure; requeued with exponential backoff.
    Requeued,
    /// Permanent patch failure or invariant violation; status Failed, no
    /// further automatic retry.
    Failed,
}

pub async fn reconcile_one(
    client: &K8sClient,
    config: &MbcasConfig,
    metrics: &ActuatorMetrics,
    backoff: &Mutex<BackoffTracker>,
    queue: &EventQueueHandle,
    cancellation: &CancellationToken,
    id: &PodIdentity,
) -> Outcome {
    let allocation = match client.get_allocation(&id.namespace, &id.name).await {
        Ok(Some(a)) => a,
        Ok(None) => return Outcome::AllocationMissing,
        Err(err) => {
            tracing::warn!(pod = %id, error = %err, "failed to read PodAllocation record");
            return Outcome::Failed;
        }
    };

    let pod = match client.get_pod(&id.namespace, &id.name).await {
        Ok(pod) => Some(pod),
        Err(PlatformError::PodNotFound { .. }) => None,
        Err(err) => {
            tracing::warn!(pod = %id, error = %err, "failed to read pod");
            return Outcome::Failed;
        }
    };

    if let Some(reason) = eligibility_failure(pod.as_ref()) {
        backoff.lock().unwrap().forget(id);
        write_failed_status(client, id, &reason).await;
        return Outcome::Ineligible;
    }
    let pod = pod.expect("eligibility_failure returns Some when pod is None");

    let container_index = allocation.spec.container_index as usize;
    let Some(container) = pod.containers.get(container_index) else {
        write_failed_status(client, id, "container index out of range").await;
        return Outcome::Failed;
    };

    let now = Instant::now();
    if let Some(remaining) = backoff
        .lock()
        .unwrap()
        .cooldown_remaining(id, config.reconcile_cooldown, now)
    {
        metrics.record_cooldown_skip();
        queue.enqueue_after(id.clone(), remaining, cancellation.clone());
        return Outcome::Cooldown;
    }

    let current = container
        .limit_millicores
        .or(pod.observed_cpu_limit_millicores);
    let desired = allocation.spec.desired_cpu_limit_millicores;

    let (target, clamped) =
        step_limit_clamp(desired, current, config.max_step_up, config.max_step_down);

    let reason = if clamped {
        format!("step limit clamped {desired:.0}m to {target:.0}m")
    } else {
        String::new()
    };

    let container_name = container.name.clone();
    let applied_request = container.request_millicores;

    let patch_result = tokio::time::timeout(
        RECONCILE_PATCH_TIMEOUT,
        client.patch_cpu_limit(&id.namespace, &id.name, &container_name, target),
    )
    .await;

    match patch_result {
        Ok(Ok(())) => {
            backoff.lock().unwrap().record_success(id, now);
            metrics.record_applied();
            let status = PodAllocationStatus {
                applied_cpu_request_millicores: applied_request,
                applied_cpu_limit_millicores: Some(target),
                phase: Phase::Applied,
                shadow_price_cpu: 0.0, // ignored by the selective status patch
                reason,
                last_transition_time: Some(chrono::Utc::now()),
                tombstone_deadline: None,
            };
            write_status(client, id, &status).await;
            Outcome::Applied { clamped }
        }
        Ok(Err(err)) => handle_patch_failure(client, config, metrics, backoff, queue, cancellation, id, &err).await,
        Err(_timed_out) => {
            // A timeout is treated exactly like a transient API conflict.
            let delay = backoff.lock().unwrap().next_backoff(id);
            metrics.record_failed();
            queue.enqueue_after(id.clone(), delay, cancellation.clone());
            Outcome::Requeued
        }
    }
}

async fn handle_patch_failure(
    client: &K8sClient,
    _config: &MbcasConfig,
    metrics: &ActuatorMetrics,
    backoff: &Mutex<BackoffTracker>,
    queue: &EventQueueHandle,
    cancellation: &CancellationToken,
    id: &PodIdentity,
    err: &PlatformError,
) -> Outcome {
    metrics.record_failed();
    match err.classify_patch_failure() {
        crate::k8s::PatchFailureKind::Transient => {
            let delay = backoff.lock().unwrap().next_backoff(id);
            queue.enqueue_after(id.clone(), delay, cancellation.clone());
            Outcome::Requeued
        }
        crate::k8s::PatchFailureKind::Permanent => {
            backoff.lock().unwrap().clear_attempts(id);
            write_failed_status(client, id, &format!("patch rejected: {err}")).await;
            Outcome::Failed
        }
    }
}

/// Clamps `desired` into `[current / MaxStepDown, current · MaxStepUp]`
/// (§4.6, §9's symmetric-clamp resolution). With no current limit observed
/// yet (first allocation ever for this pod), there is nothing to clamp
/// against and `desired` is applied directly.
fn step_limit_clamp(
    desired: f64,
    current: Option<f64>,
    max_step_up: f64,
    max_step_down: f64,
) -> (f64, bool) {
    match current {
        Some(current) if current > 0.0 => {
            let floor = current * max_step_down;
            let ceiling = current * max_step_up;
            let target = desired.clamp(floor, ceiling);
            (target, (target - desired).abs() > 1e-6)
        }
        _ => (desired, false),
    }
}

fn eligibility_failure(pod: Option<&PodInfo>) -> Option<String> {
    match pod {
        None => Some("pod not found".to_string()),
        Some(p) if p.is_terminating() => Some("pod is terminating".to_string()),
        Some(p) if p.qos == QosClass::Guaranteed => {
            Some("pod is Guaranteed QoS, never managed".to_string())
        }
        Some(p) => {
            let annotations = PodAnnotations::parse(&p.annotations);
            if !annotations.managed {
                Some("pod opted out via mbcas.io/managed".to_string())
            } else {
                None
            }
        }
    }
}

async fn write_failed_status(client: &K8sClient, id: &PodIdentity, reason: &str) {
    let status = PodAllocationStatus {
        applied_cpu_request_millicores: None,
        applied_cpu_limit_millicores: None,
        phase: Phase::Failed,
        shadow_price_cpu: 0.0,
        reason: reason.to_string(),
        last_transition_time: Some(chrono::Utc::now()),
        tombstone_deadline: None,
    };
    write_status(client, id, &status).await;
}

async fn write_status(client: &K8sClient, id: &PodIdentity, status: &PodAllocationStatus) {
    if let Err(err) = client
        .patch_allocation_status(&id.namespace, &id.name, status)
        .await
    {
        tracing::warn!(pod = %id, error = %err, "failed to patch PodAllocation status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::k8s::{ContainerResources, PodPhase};

    fn running_pod() -> PodInfo {
        PodInfo {
            uid: "u1".to_string(),
            namespace: "default".to_string(),
            name: "p1".to_string(),
            node_name: Some("n1".to_string()),
            phase: PodPhase::Running,
            qos: QosClass::Burstable,
            deletion_timestamp: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            containers: vec![ContainerResources {
                name: "main".to_string(),
                request_millicores: Some(100.0),
                limit_millicores: Some(500.0),
            }],
            observed_cpu_limit_millicores: Some(500.0),
        }
    }

    #[test]
    fn guaranteed_qos_is_ineligible() {
        let mut pod = running_pod();
        pod.qos = QosClass::Guaranteed;
        assert!(eligibility_failure(Some(&pod)).is_some());
    }

    #[test]
    fn terminating_pod_is_ineligible() {
        let mut pod = running_pod();
        pod.deletion_timestamp = Some(chrono::Utc::now());
        assert!(eligibility_failure(Some(&pod)).is_some());
    }

    #[test]
    fn missing_pod_is_ineligible() {
        assert!(eligibility_failure(None).is_some());
    }

    #[test]
    fn opted_out_pod_is_ineligible() {
        let mut pod = running_pod();
        pod.annotations
            .insert("mbcas.io/managed".to_string(), "false".to_string());
        assert!(eligibility_failure(Some(&pod)).is_some());
    }

    #[test]
    fn eligible_pod_passes() {
        let pod = running_pod();
        assert!(eligibility_failure(Some(&pod)).is_none());
    }

    #[test]
    fn step_limit_clamps_large_increase_then_allows_further_growth_next_cycle() {
        // Scenario 7: current=200m, desired=1000m, MaxStepUp=1.5 -> 300m.
        let (target, clamped) = step_limit_clamp(1000.0, Some(200.0), 1.5, 1.0 / 1.5);
        assert!((target - 300.0).abs() < 1e-6);
        assert!(clamped);

        // Next cycle, cooldown elapsed, current is now the applied 300m.
        let (target, clamped) = step_limit_clamp(1000.0, Some(300.0), 1.5, 1.0 / 1.5);
        assert!((target - 450.0).abs() < 1e-6);
        assert!(clamped);
    }

    #[test]
    fn step_limit_clamp_bounds_runaway_growth_every_cycle() {
        // Scenario 8: repeated huge desired values never jump past what
        // MaxStepUp allows for the current limit, however large `desired`
        // amplifies to.
        let mut current = 100.0;
        for _ in 0..20 {
            let (target, _) = step_limit_clamp(10_000.0, Some(current), 1.5, 1.0 / 1.5);
            assert!(target <= current * 1.5 + 1e-6);
            current = target;
        }
    }

    #[test]
    fn step_limit_clamp_passes_through_when_no_current_limit_observed() {
        let (target, clamped) = step_limit_clamp(750.0, None, 1.5, 1.0 / 1.5);
        assert!((target - 750.0).abs() < 1e-9);
        assert!(!clamped);
    }

    #[test]
    fn step_limit_clamp_is_symmetric_downward() {
        let (target, clamped) = step_limit_clamp(10.0, Some(300.0), 1.5, 1.0 / 1.5);
        assert!((target - 200.0).abs() < 1e-6);
        assert!(clamped);
    }
}
