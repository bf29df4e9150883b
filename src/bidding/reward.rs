//! Reward function for the Q-learning update, applied one cycle after the
//! transition it scores (§4.3).

/// Inputs needed to score a transition. `allocation` and `usage` are both
/// in millicores; `demand` is the smoothed pressure signal in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct RewardInputs {
    pub allocation: f64,
    pub usage: f64,
    pub demand: f64,
    pub slo_violation: bool,
}

/// Computes the scalar reward for the transition that produced
/// `allocation` given the observed `usage`/`demand`/SLO state.
pub fn reward(inputs: RewardInputs) -> f64 {
    let RewardInputs {
        allocation: a,
        usage: u,
        demand: d,
        slo_violation,
    } = inputs;

    let mut r = 0.0;

    if u > 0.0 {
        r += if a >= u {
            10.0
        } else {
            -20.0 * (u - a) / u
        };
    } else {
        // No usage to compare against: treat as satisfied, not starved.
        r += 10.0;
    }

    r -= 30.0 * d;

    if slo_violation {
        r -= 100.0;
    }

    if u > 0.0 && a > 2.0 * u {
        r -= 5.0 * (a - 2.0 * u) / u;
    }

    if d < 0.01 {
        r += 5.0;
    }

    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generous_allocation_with_no_throttling_is_rewarded() {
        let r = reward(RewardInputs {
            allocation: 1000.0,
            usage: 500.0,
            demand: 0.0,
            slo_violation: false,
        });
        // +10 (a>=u) - 0 (throttle) + 5 (d<0.01) = 15
        assert!((r - 15.0).abs() < 1e-9);
    }

    #[test]
    fn starvation_is_penalized() {
        let r = reward(RewardInputs {
            allocation: 250.0,
            usage: 500.0,
            demand: 0.2,
            slo_violation: false,
        });
        // -20*(500-250)/500 - 30*0.2 = -10 - 6 = -16
        assert!((r - (-16.0)).abs() < 1e-9);
    }

    #[test]
    fn slo_violation_dominates() {
        let r = reward(RewardInputs {
            allocation: 1000.0,
            usage: 500.0,
            demand: 0.0,
            slo_violation: true,
        });
        assert!(r < -80.0);
    }

    #[test]
    fn waste_is_penalized() {
        let r = reward(RewardInputs {
            allocation: 3000.0,
            usage: 500.0,
            demand: 0.0,
            slo_violation: false,
        });
        // +10 - 5*(3000-1000)/500 + 5 = 15 - 20 = -5
        assert!((r - (-5.0)).abs() < 1e-9);
    }
}
