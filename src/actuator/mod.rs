//! Cluster actuator (component C6): watches `PodAllocation` records
//! cluster-wide and reconciles each desired allocation into a live
//! in-place container resize, with per-pod serialization, a bounded
//! worker pool, cooldowns, step-limit clamping, and backoff on failure.

mod backoff;
mod queue;
mod reconcile;
mod watch;

pub use backoff::BackoffTracker;
pub use queue::{EventQueue, EventQueueHandle};
pub use reconcile::Outcome;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::MbcasConfig;
use crate::k8s::K8sClient;
use crate::metrics::ActuatorMetrics;
use crate::store::PodIdentity;

/// Owns the watch task and the bounded worker pool. One instance serves
/// the whole cluster; there is no per-node sharding on the actuator side.
pub struct ClusterActuator {
    client: K8sClient,
    config: MbcasConfig,
    metrics: ActuatorMetrics,
    backoff: Arc<Mutex<BackoffTracker>>,
}

impl ClusterActuator {
    pub fn new(client: K8sClient, config: MbcasConfig, metrics: ActuatorMetrics) -> Self {
        Self {
            client,
            config,
            metrics,
            backoff: Arc::new(Mutex::new(BackoffTracker::new())),
        }
    }

    /// Runs the watch loop and worker pool until `cancellation` fires. An
    /// in-flight reconcile finishes its current patch before the loop
    /// exits (§5) — cancellation only stops new work from starting.
    pub async fn run(self, cancellation: CancellationToken) {
        let (mut queue, handle) = EventQueue::new();

        let watch_client = self.client.clone();
        let watch_handle = handle.clone();
        let watch_cancel = cancellation.clone();
        let watcher_task = tokio::spawn(watch::run(watch_client, watch_handle, watch_cancel));

        let inflight: Arc<Mutex<HashSet<PodIdentity>>> = Arc::new(Mutex::new(HashSet::new()));
        let semaphore = Arc::new(Semaphore::new(self.config.reconcile_concurrency.max(1)));

        loop {
            tokio::select! {
                maybe_id = queue.recv() => {
                    let Some(id) = maybe_id else { break; };
                    self.dispatch(id, &handle, &inflight, &semaphore, &cancellation).await;
                }
                _ = cancellation.cancelled() => {
                    tracing::info!("actuator received cancellation, exiting");
                    break;
                }
            }
        }

        watcher_task.abort();
    }

    /// Starts reconciling `id`, or — if a worker for the same pod is
    /// already running — re-enqueues it a moment later rather than running
    /// two reconciles for one pod concurrently (§5's per-pod key
    /// serialization).
    async fn dispatch(
        &self,
        id: PodIdentity,
        handle: &EventQueueHandle,
        inflight: &Arc<Mutex<HashSet<PodIdentity>>>,
        semaphore: &Arc<Semaphore>,
        cancellation: &CancellationToken,
    ) {
        if !inflight.lock().unwrap().insert(id.clone()) {
            handle.enqueue_after(id, Duration::from_millis(200), cancellation.clone());
            return;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                inflight.lock().unwrap().remove(&id);
                return;
            }
        };

        let client = self.client.clone();
        let config = self.config.clone();
        let metrics = self.metrics.clone();
        let backoff = self.backoff.clone();
        let worker_handle = handle.clone();
        let worker_cancel = cancellation.clone();
        let inflight = inflight.clone();
        let worker_id = id.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = reconcile::reconcile_one(
                &client,
                &config,
                &metrics,
                &backoff,
                &worker_handle,
                &worker_cancel,
                &worker_id,
            )
            .await;
            tracing::debug!(pod = %worker_id, outcome = ?outcome, "reconcile cycle finished");
            inflight.lock().unwrap().remove(&worker_id);
        });
    }
}
