//! The node agent's single-threaded, I/O-free decision pipeline (§4.5,
//! steps 3-9 and 11): sample, two-pass bidding, clearing, smoothing,
//! hysteresis, and the deferred Q-learning update. Kept free of any
//! platform or filesystem access so it can be exercised directly against a
//! pre-sampled batch of pods.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::bidding::{reward, Action, Bid, BiddingAgent, BiddingInputs, QState, RewardInputs};
use crate::config::MbcasConfig;
use crate::market::{self, Regime};
use crate::sensor::cgroup::PodCgroupId;
use crate::sensor::{smoothing, CgroupDemandSensor};
use crate::store::{AllocationStateStore, PendingTransition, PodIdentity};

/// Everything the pipeline needs about one managed pod for a single cycle,
/// assembled by the caller from the platform's pod view and annotations.
#[derive(Debug, Clone)]
pub struct ManagedPod {
    pub id: PodIdentity,
    pub cgroup_id: PodCgroupId,
    pub request_millicores: f64,
    pub limit_millicores: f64,
    pub observed_cpu_limit_millicores: Option<f64>,
    pub absolute_min_allocation_millicores: f64,
    pub absolute_max_allocation_millicores: f64,
    /// True if an external observer reported an SLO breach for this pod
    /// this cycle (always false without an external observer, per §6).
    pub slo_violation: bool,
}

/// Final per-pod outcome of one cycle, ready for the emit step.
#[derive(Debug, Clone)]
pub struct PodCycleResult {
    pub id: PodIdentity,
    pub pod_uid: String,
    /// `A*`: the smoothed, clamped, startup-grace-adjusted allocation.
    pub desired_allocation_millicores: f64,
    /// Whether hysteresis suppressed emitting this value this cycle.
    pub suppressed: bool,
}

pub struct CycleOutput {
    pub results: Vec<PodCycleResult>,
    pub shadow_price: f64,
    pub regime: Regime,
    /// Pods skipped this cycle because the sensor sample failed.
    pub sensor_failures: Vec<PodIdentity>,
    pub invalid_bids: Vec<PodIdentity>,
}

/// A pod that was successfully sampled this cycle, paired with its current
/// Q-state and the raw readings the bidding agent and reward function need.
struct Sampled {
    pod: ManagedPod,
    state: QState,
    usage_millicores: f64,
    demand: f64,
}

/// Runs steps 3 through 9 and 11 of the node agent loop over one batch of
/// already-discovered, already-pruned managed pods.
pub fn run_cycle(
    config: &MbcasConfig,
    capacity_millicores: f64,
    sensor: &CgroupDemandSensor,
    store: &mut AllocationStateStore,
    pods: &[ManagedPod],
    rng: &mut impl Rng,
) -> CycleOutput {
    let mut sensor_failures = Vec::new();
    let mut invalid_bids = Vec::new();
    let uid_by_id: std::collections::HashMap<PodIdentity, String> = pods
        .iter()
        .map(|p| (p.id.clone(), p.cgroup_id.pod_uid.clone()))
        .collect();

    // Step 3: sample, and decide each pod's current Q-state while the
    // sample's still at hand. Pods whose sensor read fails are dropped for
    // the rest of this cycle but keep their stored runtime state.
    let mut sampled = Vec::with_capacity(pods.len());

    for pod in pods {
        let runtime = store.get_or_create(&pod.id);
        let now = Instant::now();
        let elapsed_wall = runtime
            .last_sample_at
            .map(|prev| now.duration_since(prev))
            .unwrap_or(Duration::from_secs(0));

        let reading = match sensor.sample(
            &pod.cgroup_id,
            runtime.cgroup_template,
            runtime.last_counters,
            Some(runtime.smoothed_demand),
            elapsed_wall,
        ) {
            Ok(reading) => reading,
            Err(_) => {
                runtime.consecutive_sensor_failures += 1;
                sensor_failures.push(pod.id.clone());
                continue;
            }
        };

        runtime.consecutive_sensor_failures = 0;
        runtime.cgroup_template = Some(reading.template_index);
        runtime.last_counters = Some((reading.counters, elapsed_wall));
        runtime.last_sample_at = Some(now);
        runtime.smoothed_demand = reading.smoothed_pressure;

        if runtime.initial_observed_limit_millicores.is_none() {
            let initial = pod
                .observed_cpu_limit_millicores
                .unwrap_or(pod.limit_millicores);
            runtime.initial_observed_limit_millicores = Some(initial);
            runtime.smoothed_allocation_millicores = initial;
        }

        let last_applied = runtime.smoothed_allocation_millicores;
        let state = QState::encode(reading.usage_millicores, reading.smoothed_pressure, last_applied);

        // Step 11 (part 1): score the transition selected last cycle now
        // that this cycle's resulting state/usage/demand are known.
        if let Some(pending) = runtime.pending_transition.take() {
            apply_td_update(
                runtime,
                config,
                &pending,
                &state,
                reading.usage_millicores,
                reading.smoothed_pressure,
                pod.slo_violation,
            );
        }
        runtime.epsilon = (runtime.epsilon * config.epsilon_decay).max(config.epsilon_min);

        sampled.push(Sampled {
            pod: pod.clone(),
            state,
            usage_millicores: reading.usage_millicores,
            demand: reading.smoothed_pressure,
        });
    }

    // Steps 4-5: pass 1 bidding and preview clearing with p=0.
    let (pass1_bids, _) = build_bids(&sampled, store, 0.0, rng, &mut invalid_bids);
    let preview = market::clear(capacity_millicores, &pass1_bids);

    // Steps 6-7: pass 2 bidding at the preview shadow price, final clearing.
    // The action chosen here is the transition this cycle actually acted on,
    // so it is what gets scored by the TD update next cycle.
    let (pass2_bids, pass2_actions) =
        build_bids(&sampled, store, preview.shadow_price, rng, &mut invalid_bids);
    let final_clear = market::clear(capacity_millicores, &pass2_bids);

    for (sample, (id, action)) in sampled.iter().zip(pass2_actions.iter()) {
        debug_assert_eq!(&sample.pod.id, id);
        if let Some(runtime) = store.get_mut(id) {
            runtime.pending_transition = Some(PendingTransition {
                state: sample.state.key(),
                action_index: action.index(),
            });
        }
    }

    // Step 8-9: smooth, clamp, startup grace, hysteresis.
    let mut results = Vec::with_capacity(final_clear.allocations.len());
    for (id, allocation) in &final_clear.allocations {
        let Some(runtime) = store.get_mut(id) else {
            continue;
        };

        let smoothed = smoothing::ema_asymmetric(
            runtime.smoothed_allocation_millicores,
            *allocation,
            config.alpha_up,
            config.alpha_down,
        );

        let mut desired = smoothed.clamp(
            config.absolute_min_allocation_millicores as f64,
            config.absolute_max_allocation_millicores as f64,
        );

        if runtime.within_startup_grace(config.startup_grace_period) {
            if let Some(initial) = runtime.initial_observed_limit_millicores {
                desired = desired.max(initial);
            }
        }

        runtime.smoothed_allocation_millicores = desired;

        let suppressed = match runtime.last_emitted_millicores {
            Some(last) if last > 0.0 => {
                let relative_change = (desired - last).abs() / last;
                relative_change < config.min_change_percent
            }
            _ => false,
        };

        if !suppressed {
            runtime.last_emitted_millicores = Some(desired);
        }

        results.push(PodCycleResult {
            id: id.clone(),
            pod_uid: uid_by_id.get(id).cloned().unwrap_or_default(),
            desired_allocation_millicores: desired,
            suppressed,
        });
    }

    CycleOutput {
        results,
        shadow_price: final_clear.shadow_price,
        regime: final_clear.regime,
        sensor_failures,
        invalid_bids,
    }
}

/// Builds one pass of bids for every sampled pod, returning the bids
/// themselves (for clearing) alongside the action chosen per pod (so the
/// caller can record exactly what was bid, not a guess at it).
fn build_bids(
    sampled: &[Sampled],
    store: &mut AllocationStateStore,
    shadow_price: f64,
    rng: &mut impl Rng,
    invalid_bids: &mut Vec<PodIdentity>,
) -> (Vec<(PodIdentity, Bid)>, Vec<(PodIdentity, Action)>) {
    let mut bids = Vec::with_capacity(sampled.len());
    let mut actions = Vec::with_capacity(sampled.len());

    for entry in sampled {
        let Some(runtime) = store.get_mut(&entry.pod.id) else {
            continue;
        };

        let action = BiddingAgent::select_action(
            &runtime.q_table,
            &entry.state,
            runtime.epsilon,
            shadow_price,
            rng,
        );
        runtime.q_table.touch(&entry.state.key());
        actions.push((entry.pod.id.clone(), action));

        let inputs = BiddingInputs {
            demand: entry.demand,
            usage: entry.usage_millicores,
            last_applied: runtime.smoothed_allocation_millicores,
            request: entry.pod.request_millicores,
            limit: entry.pod.limit_millicores,
            shadow_price,
            absolute_min_allocation: entry.pod.absolute_min_allocation_millicores,
            absolute_max_allocation: entry.pod.absolute_max_allocation_millicores,
        };

        match BiddingAgent::build_bid(action, inputs) {
            Ok(bid) => bids.push((entry.pod.id.clone(), bid)),
            Err(_) => invalid_bids.push(entry.pod.id.clone()),
        }
    }
    (bids, actions)
}

fn apply_td_update(
    runtime: &mut crate::store::PodRuntimeState,
    config: &MbcasConfig,
    pending: &PendingTransition,
    new_state: &QState,
    usage_millicores: f64,
    demand: f64,
    slo_violation: bool,
) {
    let r = reward(RewardInputs {
        allocation: runtime.smoothed_allocation_millicores,
        usage: usage_millicores,
        demand,
        slo_violation,
    });

    runtime.q_table.pin(&pending.state);
    let max_next = runtime
        .q_table
        .action_scores(&new_state.key())
        .into_iter()
        .fold(f64::NEG_INFINITY, f64::max);

    let old_q = runtime.q_table.get(&pending.state, pending.action_index);
    let target = r + config.q_discount * max_next;
    let updated = old_q + config.q_learn_rate * (target - old_q);
    runtime.q_table.set(&pending.state, pending.action_index, updated);
    runtime.q_table.unpin(&pending.state);
}
