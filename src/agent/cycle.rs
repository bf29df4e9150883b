//! The node agent's outer loop (§4.5, §5): ties the pure pipeline to the
//! platform client, drives one tick per `WriteInterval`, and enforces the
//! "cycle must complete, or time out, before the next tick" rule.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use crate::config::{MbcasConfig, PodAnnotations};
use crate::k8s::{is_managed, K8sClient, PodAllocationSpec, PodInfo};
use crate::metrics::AgentMetrics;
use crate::sensor::cgroup::PodCgroupId;
use crate::sensor::{CgroupCounters, CgroupDemandSensor};
use crate::store::{AllocationStateStore, PodIdentity};

use super::pipeline::{self, ManagedPod};

/// Drives the per-node agent pipeline on a fixed tick, one cycle at a time.
/// Owned exclusively by a single task — nothing about this type is `Sync`
/// by design (the allocation state store inside it is not either).
pub struct NodeAgentCycle {
    config: MbcasConfig,
    node_name: String,
    client: K8sClient,
    sensor: CgroupDemandSensor,
    store: AllocationStateStore,
    metrics: AgentMetrics,
    rng: StdRng,
    cycle_count: u64,
    /// Lightweight previous-sample cache for unmanaged pods, kept separate
    /// from the managed-pod store: these pods are never tracked by the
    /// bidding/Q-learning machinery, only sampled for their usage so it can
    /// be subtracted out of `NodeCapacity`.
    unmanaged_cache: HashMap<String, (CgroupCounters, Instant)>,
}

impl NodeAgentCycle {
    pub fn new(
        config: MbcasConfig,
        node_name: String,
        client: K8sClient,
        cgroup_root: impl Into<std::path::PathBuf>,
        metrics: AgentMetrics,
    ) -> Self {
        let sensor = CgroupDemandSensor::new(
            cgroup_root,
            config.sensor_alpha_up,
            config.sensor_alpha_down,
            config.throttle_saturation,
        );
        let store = AllocationStateStore::new(config.epsilon_start, config.q_max_states);
        Self {
            config,
            node_name,
            client,
            sensor,
            store,
            metrics,
            rng: StdRng::from_entropy(),
            cycle_count: 0,
            unmanaged_cache: HashMap::new(),
        }
    }

    /// Runs the tick loop until `cancellation` fires. An in-flight cycle is
    /// allowed to finish its current step before the loop exits.
    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.write_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = cancellation.cancelled() => {
                    tracing::info!("node agent received cancellation, exiting");
                    break;
                }
            }
        }
    }

    /// Runs exactly one cycle, enforcing the soft deadline
    /// `WriteInterval - 500ms`. An overrun skips emitting this cycle's
    /// results (the next tick starts a fresh cycle regardless) and bumps
    /// the overrun counter rather than blocking the tick loop.
    async fn tick(&mut self) {
        let soft_deadline = self
            .config
            .write_interval
            .saturating_sub(Duration::from_millis(500));

        match tokio::time::timeout(soft_deadline, self.run_once()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "node agent cycle failed");
            }
            Err(_) => {
                self.metrics.record_overrun();
                tracing::warn!(
                    soft_deadline_ms = soft_deadline.as_millis() as u64,
                    "node agent cycle overran its soft deadline, skipping to next tick"
                );
            }
        }
    }

    async fn run_once(&mut self) -> anyhow::Result<()> {
        // Step 1: discover + filter.
        let all_pods = self.client.list_node_pods(&self.node_name).await?;
        let excluded = &self.config.excluded_namespaces;
        let (managed, unmanaged): (Vec<PodInfo>, Vec<PodInfo>) =
            all_pods.into_iter().partition(|p| is_managed(p, excluded));

        // Step 2: prune.
        let live_ids: HashSet<PodIdentity> = managed
            .iter()
            .map(|p| PodIdentity::new(p.namespace.clone(), p.name.clone()))
            .collect();
        self.store.prune(&live_ids);

        // NodeCapacity derivation: allocatable minus reserve minus unmanaged usage.
        let allocatable = self
            .client
            .node_allocatable_cpu_millicores(&self.node_name)
            .await?;
        let unmanaged_usage = self.sample_unmanaged_usage(&unmanaged);
        let capacity = crate::market::node_capacity(
            allocatable,
            self.config.system_reserve_percent,
            unmanaged_usage,
        );

        let managed_pods: Vec<ManagedPod> = managed
            .iter()
            .filter_map(|info| self.to_managed_pod(info))
            .collect();

        let output = pipeline::run_cycle(
            &self.config,
            capacity,
            &self.sensor,
            &mut self.store,
            &managed_pods,
            &mut self.rng,
        );

        self.metrics.set_shadow_price(output.shadow_price);
        self.metrics.set_regime(output.regime);
        self.metrics
            .set_q_table_size_max(self.store.max_q_table_size());
        for _ in &output.sensor_failures {
            self.metrics.record_read_failure();
        }
        for _ in &output.invalid_bids {
            self.metrics.record_invalid_bid();
        }
        self.metrics.record_sample();

        for result in &output.results {
            if result.suppressed {
                continue;
            }
            self.emit(result, output.shadow_price).await;
        }

        self.cycle_count += 1;
        tracing::debug!(
            cycle = self.cycle_count,
            managed = managed_pods.len(),
            shadow_price = output.shadow_price,
            regime = output.regime.as_str(),
            "node agent cycle complete"
        );
        Ok(())
    }

    /// Monotonic count of cycles completed since this agent started,
    /// ordering the `PodAllocation` writes it emits (§5).
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    fn to_managed_pod(&self, info: &PodInfo) -> Option<ManagedPod> {
        let container = info.managed_container()?;
        let annotations = PodAnnotations::parse(&info.annotations);

        let request = container.request_millicores.unwrap_or(0.0);
        let limit = container
            .limit_millicores
            .unwrap_or(info.observed_cpu_limit_millicores.unwrap_or(request));

        let mut absolute_min = self.config.absolute_min_allocation_millicores as f64;
        if let Some(override_min) = annotations.min_cpu_millicores {
            absolute_min = absolute_min.max(override_min as f64);
        }

        Some(ManagedPod {
            id: PodIdentity::new(info.namespace.clone(), info.name.clone()),
            cgroup_id: PodCgroupId {
                pod_uid: info.uid.clone(),
                qos: info.qos,
            },
            request_millicores: request,
            limit_millicores: limit,
            observed_cpu_limit_millicores: info.observed_cpu_limit_millicores,
            absolute_min_allocation_millicores: absolute_min,
            absolute_max_allocation_millicores: self.config.absolute_max_allocation_millicores as f64,
            // No external SLO observer is wired in; always false per §6.
            slo_violation: false,
        })
    }

    /// Best-effort usage sample for pods this agent does not manage, purely
    /// to net them out of `NodeCapacity`. Failures are silently skipped —
    /// an unmanaged pod's cgroup going briefly unreadable should not stall
    /// the cycle or affect managed pods.
    fn sample_unmanaged_usage(&mut self, unmanaged: &[PodInfo]) -> f64 {
        let mut total = 0.0;
        let now = Instant::now();
        let mut seen = HashSet::new();

        for pod in unmanaged {
            if pod.phase != crate::k8s::PodPhase::Running || pod.is_terminating() {
                continue;
            }
            seen.insert(pod.uid.clone());

            let id = PodCgroupId {
                pod_uid: pod.uid.clone(),
                qos: pod.qos,
            };
            let prev = self.unmanaged_cache.get(&pod.uid).copied();
            let elapsed = prev
                .map(|(_, at)| now.duration_since(at))
                .unwrap_or(Duration::from_secs(0));

            if let Ok(reading) = self.sensor.sample(&id, None, prev.map(|(c, _)| (c, elapsed)), None, elapsed) {
                total += reading.usage_millicores;
                self.unmanaged_cache
                    .insert(pod.uid.clone(), (reading.counters, now));
            }
        }

        self.unmanaged_cache.retain(|uid, _| seen.contains(uid));
        total
    }

    async fn emit(&mut self, result: &pipeline::PodCycleResult, shadow_price: f64) {
        let spec = PodAllocationSpec {
            pod_uid: result.pod_uid.clone(),
            container_index: 0,
            desired_cpu_request_millicores: (0.9 * result.desired_allocation_millicores).round(),
            desired_cpu_limit_millicores: result.desired_allocation_millicores,
        };

        match self
            .client
            .upsert_allocation_spec(&result.id.namespace, &result.id.name, &spec)
            .await
        {
            Ok(()) => self.metrics.record_write(),
            Err(err) => {
                tracing::warn!(
                    pod = %result.id,
                    error = %err,
                    "failed to upsert PodAllocation spec"
                );
                return;
            }
        }

        if let Err(err) = self
            .client
            .patch_allocation_shadow_price(&result.id.namespace, &result.id.name, shadow_price)
            .await
        {
            tracing::warn!(
                pod = %result.id,
                error = %err,
                "failed to patch PodAllocation shadow price"
            );
        }
    }
}
