//! The proportional-fairness / Nash-bargaining market clearing rule (§4.4):
//! turns a capacity and a set of per-pod bids into an allocation vector, a
//! shadow price, and the regime that produced them.

use crate::bidding::Bid;
use crate::store::PodIdentity;

use super::regime::Regime;

/// Result of clearing one market cycle.
#[derive(Debug, Clone)]
pub struct ClearOutcome {
    /// Allocations in the same pod order the solver cleared them in
    /// (sorted by pod identity, for determinism).
    pub allocations: Vec<(PodIdentity, f64)>,
    pub shadow_price: f64,
    pub regime: Regime,
}

/// Clears `bids` against `capacity`, returning a deterministic allocation.
///
/// A bid's `demand` already carries the bidding agent's own headroom and
/// throttle-amplification (§4.3), so it is used directly as the pod's
/// "need" for regime detection and for uncongested allocation — re-deriving
/// a second headroom term from it per §4.4's `h(d)` would double-count that
/// amplification and is not dimensionally sound (see the grounding ledger).
///
/// Crucially, `demand` is *not* pre-capped at the bid's own `max` (see
/// `Bid::new`): an agent asking for more than its own max still needs to
/// register as contributing to congestion, or cap-redistribution scenarios
/// where one pod's uncapped need alone exceeds capacity would be
/// misdetected as Uncongested. The `max` ceiling is enforced on the
/// allocation itself, by `proportional_surplus_clear`'s cap-handling below.
pub fn clear(capacity: f64, bids: &[(PodIdentity, Bid)]) -> ClearOutcome {
    if bids.is_empty() {
        return ClearOutcome {
            allocations: Vec::new(),
            shadow_price: 0.0,
            regime: Regime::Uncongested,
        };
    }

    let mut entries: Vec<(PodIdentity, Bid)> = bids.to_vec();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let n = entries.len() as f64;
    let sum_m: f64 = entries.iter().map(|(_, b)| b.min).sum();
    let sum_w: f64 = entries.iter().map(|(_, b)| b.weight).sum();

    if sum_m > capacity {
        let scale = if sum_m > 0.0 { capacity / sum_m } else { 0.0 };
        let allocations = entries
            .iter()
            .map(|(id, b)| (id.clone(), b.min * scale))
            .collect();
        let shadow_price = shadow_price_overloaded(sum_m, capacity, sum_w, n);
        return ClearOutcome {
            allocations,
            shadow_price,
            regime: Regime::Overloaded,
        };
    }

    let sum_needs: f64 = entries.iter().map(|(_, b)| b.demand).sum();

    if sum_needs <= capacity {
        // Regime detection above runs on each bid's uncapped need so an
        // agent wanting more than its own max still counts toward
        // congestion; the allocation handed back still respects that max.
        let allocations = entries
            .iter()
            .map(|(id, b)| (id.clone(), b.demand.min(b.max)))
            .collect();
        return ClearOutcome {
            allocations,
            shadow_price: 0.0,
            regime: Regime::Uncongested,
        };
    }

    let allocations = proportional_surplus_clear(capacity, &entries);
    let shadow_price = if capacity > 0.0 {
        (sum_needs - capacity) / capacity * (sum_w / n)
    } else {
        0.0
    };
    ClearOutcome {
        allocations,
        shadow_price,
        regime: Regime::Congested,
    }
}

fn shadow_price_overloaded(sum_m: f64, capacity: f64, sum_w: f64, n: f64) -> f64 {
    if capacity > 0.0 {
        (sum_m - capacity) / capacity * (sum_w / n)
    } else {
        0.0
    }
}

/// §4.4.1: repeatedly proposes a weighted split of the surplus above every
/// bid's `min`, capping agents whose proposal exceeds their `max` and
/// redistributing the remaining surplus among the still-uncapped agents.
/// Terminates in at most `n` rounds since each round either caps at least
/// one more agent or commits.
fn proportional_surplus_clear(
    capacity: f64,
    entries: &[(PodIdentity, Bid)],
) -> Vec<(PodIdentity, f64)> {
    let n = entries.len();
    let sum_m: f64 = entries.iter().map(|(_, b)| b.min).sum();
    let mut surplus = (capacity - sum_m).max(0.0);
    let mut allocations: Vec<f64> = entries.iter().map(|(_, b)| b.min).collect();
    let mut capped = vec![false; n];

    for _round in 0..=n {
        let uncapped: Vec<usize> = (0..n).filter(|&i| !capped[i]).collect();
        if uncapped.is_empty() {
            break;
        }
        let weight_sum: f64 = uncapped.iter().map(|&i| entries[i].1.weight).sum();
        if weight_sum <= 0.0 {
            break;
        }

        let mut any_newly_capped = false;
        for &i in &uncapped {
            let (_, bid) = &entries[i];
            let proposed = bid.min + surplus * bid.weight / weight_sum;
            if proposed > bid.max {
                allocations[i] = bid.max;
                surplus -= bid.max - bid.min;
                capped[i] = true;
                any_newly_capped = true;
            }
        }

        if !any_newly_capped {
            for &i in &uncapped {
                let (_, bid) = &entries[i];
                allocations[i] = bid.min + surplus * bid.weight / weight_sum;
            }
            break;
        }
    }

    entries
        .iter()
        .zip(allocations)
        .map(|((id, _), a)| (id.clone(), a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(n: &str) -> PodIdentity {
        PodIdentity::new("default", n)
    }

    fn bid(min: f64, max: f64, weight: f64, demand: f64) -> Bid {
        Bid::new(min, max, weight, demand).unwrap()
    }

    fn alloc_of<'a>(outcome: &'a ClearOutcome, name: &str) -> f64 {
        outcome
            .allocations
            .iter()
            .find(|(id, _)| id.name == name)
            .map(|(_, a)| *a)
            .unwrap()
    }

    #[test]
    fn two_pods_uncongested() {
        let bids = vec![
            (pod("a"), bid(100.0, 1000.0, 1.0, 600.0)),
            (pod("b"), bid(100.0, 1000.0, 1.0, 300.0)),
        ];
        let outcome = clear(1500.0, &bids);
        assert_eq!(outcome.regime, Regime::Uncongested);
        assert_eq!(outcome.shadow_price, 0.0);
        assert!((alloc_of(&outcome, "a") - 600.0).abs() < 1e-9);
        assert!((alloc_of(&outcome, "b") - 300.0).abs() < 1e-9);
    }

    #[test]
    fn two_pods_congested_equal_weight_splits_evenly() {
        let bids = vec![
            (pod("a"), bid(100.0, 1000.0, 1.0, 900.0)),
            (pod("b"), bid(100.0, 1000.0, 1.0, 900.0)),
        ];
        let outcome = clear(1000.0, &bids);
        assert_eq!(outcome.regime, Regime::Congested);
        assert!(outcome.shadow_price > 0.0);
        assert!((alloc_of(&outcome, "a") - 500.0).abs() < 1e-9);
        assert!((alloc_of(&outcome, "b") - 500.0).abs() < 1e-9);
    }

    #[test]
    fn two_pods_congested_weighted_two_to_one() {
        let bids = vec![
            (pod("a"), bid(100.0, 1000.0, 2.0, 900.0)),
            (pod("b"), bid(100.0, 1000.0, 1.0, 900.0)),
        ];
        let outcome = clear(1000.0, &bids);
        assert_eq!(outcome.regime, Regime::Congested);
        assert!((alloc_of(&outcome, "a") - 633.333).abs() < 1e-2);
        assert!((alloc_of(&outcome, "b") - 366.667).abs() < 1e-2);
    }

    #[test]
    fn cap_redistribution_gives_surplus_to_uncapped_bidder() {
        // A's own max is below its uncapped demand, so its need registers
        // as congestion even though B alone could fit; A caps out at its
        // own max and the surplus flows entirely to B.
        let bids = vec![
            (pod("a"), bid(100.0, 200.0, 2.0, 1000.0)),
            (pod("b"), bid(100.0, 2000.0, 1.0, 1000.0)),
        ];
        let outcome = clear(1500.0, &bids);
        assert_eq!(outcome.regime, Regime::Congested);
        assert!((alloc_of(&outcome, "a") - 200.0).abs() < 1e-9);
        assert!((alloc_of(&outcome, "b") - 1300.0).abs() < 1e-9);
    }

    #[test]
    fn cap_redistribution_when_needs_exceed_capacity() {
        // Same shape as above but capacity is tight enough that summed
        // needs exceed it, forcing the proportional surplus clearer to run.
        let bids = vec![
            (pod("a"), bid(100.0, 200.0, 2.0, 200.0)),
            (pod("b"), bid(100.0, 2000.0, 1.0, 2000.0)),
        ];
        let outcome = clear(1500.0, &bids);
        assert_eq!(outcome.regime, Regime::Congested);
        assert!((alloc_of(&outcome, "a") - 200.0).abs() < 1e-9);
        assert!((alloc_of(&outcome, "b") - 1300.0).abs() < 1e-9);
    }

    #[test]
    fn overloaded_scales_minimums_proportionally() {
        let bids = vec![
            (pod("a"), bid(200.0, 1000.0, 1.0, 200.0)),
            (pod("b"), bid(200.0, 1000.0, 1.0, 200.0)),
        ];
        let outcome = clear(300.0, &bids);
        assert_eq!(outcome.regime, Regime::Overloaded);
        assert!((alloc_of(&outcome, "a") - 150.0).abs() < 1e-9);
        assert!((alloc_of(&outcome, "b") - 150.0).abs() < 1e-9);
    }

    #[test]
    fn empty_bids_yield_empty_allocation_and_zero_price() {
        let outcome = clear(1000.0, &[]);
        assert!(outcome.allocations.is_empty());
        assert_eq!(outcome.shadow_price, 0.0);
    }

    #[test]
    fn sum_of_allocations_never_exceeds_capacity() {
        let bids = vec![
            (pod("a"), bid(100.0, 1000.0, 3.0, 900.0)),
            (pod("b"), bid(100.0, 1000.0, 1.0, 900.0)),
            (pod("c"), bid(100.0, 1000.0, 1.0, 900.0)),
        ];
        let outcome = clear(1200.0, &bids);
        let total: f64 = outcome.allocations.iter().map(|(_, a)| a).sum();
        assert!(total <= 1200.0 + 1e-6);
    }

    #[test]
    fn solver_is_deterministic() {
        let bids = vec![
            (pod("a"), bid(100.0, 1000.0, 2.0, 900.0)),
            (pod("b"), bid(100.0, 1000.0, 1.0, 900.0)),
        ];
        let first = clear(1000.0, &bids);
        let second = clear(1000.0, &bids);
        assert_eq!(first.allocations, second.allocations);
        assert_eq!(first.shadow_price, second.shadow_price);
        assert_eq!(first.regime, second.regime);
    }

    #[test]
    fn increasing_demand_never_decreases_allocation_when_uncongested() {
        let low = vec![(pod("a"), bid(100.0, 1000.0, 1.0, 400.0))];
        let high = vec![(pod("a"), bid(100.0, 1000.0, 1.0, 700.0))];
        let low_out = clear(1500.0, &low);
        let high_out = clear(1500.0, &high);
        assert!(alloc_of(&high_out, "a") >= alloc_of(&low_out, "a"));
    }

    #[test]
    fn doubling_all_minimums_scales_overloaded_allocations_equally() {
        let base = vec![
            (pod("a"), bid(200.0, 1000.0, 1.0, 200.0)),
            (pod("b"), bid(300.0, 1000.0, 1.0, 300.0)),
        ];
        let doubled = vec![
            (pod("a"), bid(400.0, 1000.0, 1.0, 400.0)),
            (pod("b"), bid(600.0, 1000.0, 1.0, 600.0)),
        ];
        let base_out = clear(300.0, &base);
        let doubled_out = clear(300.0, &doubled);
        assert_eq!(base_out.regime, Regime::Overloaded);
        assert_eq!(doubled_out.regime, Regime::Overloaded);
        let ratio_a = alloc_of(&doubled_out, "a") / alloc_of(&base_out, "a");
        let ratio_b = alloc_of(&doubled_out, "b") / alloc_of(&base_out, "b");
        assert!((ratio_a - ratio_b).abs() < 1e-9);
    }

    #[test]
    fn scaling_all_weights_leaves_allocations_unchanged() {
        let base = vec![
            (pod("a"), bid(100.0, 1000.0, 2.0, 900.0)),
            (pod("b"), bid(100.0, 1000.0, 1.0, 900.0)),
        ];
        let scaled = vec![
            (pod("a"), bid(100.0, 1000.0, 20.0, 900.0)),
            (pod("b"), bid(100.0, 1000.0, 10.0, 900.0)),
        ];
        let base_out = clear(1000.0, &base);
        let scaled_out = clear(1000.0, &scaled);
        assert!((alloc_of(&base_out, "a") - alloc_of(&scaled_out, "a")).abs() < 1e-6);
        assert!((alloc_of(&base_out, "b") - alloc_of(&scaled_out, "b")).abs() < 1e-6);
    }
}
