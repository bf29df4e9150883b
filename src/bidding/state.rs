//! The discrete 3-band Q-learning state: usage, throttling, and allocation
//! relative to usage. 27 canonical states, encoded as `"usage:throttle:alloc"`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageBand {
    Low,
    Medium,
    High,
}

impl UsageBand {
    fn from_usage_millicores(u: f64) -> Self {
        if u <= 500.0 {
            UsageBand::Low
        } else if u <= 1000.0 {
            UsageBand::Medium
        } else {
            UsageBand::High
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            UsageBand::Low => "low",
            UsageBand::Medium => "medium",
            UsageBand::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleBand {
    None,
    Some,
    High,
}

impl ThrottleBand {
    fn from_demand(d: f64) -> Self {
        if d <= 0.10 {
            ThrottleBand::None
        } else if d <= 0.30 {
            ThrottleBand::Some
        } else {
            ThrottleBand::High
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ThrottleBand::None => "none",
            ThrottleBand::Some => "some",
            ThrottleBand::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationBand {
    Low,
    Adequate,
    Excess,
}

impl AllocationBand {
    fn from_alloc_usage(a: f64, u: f64) -> Self {
        if a < u {
            AllocationBand::Low
        } else if a <= 2.0 * u {
            AllocationBand::Adequate
        } else {
            AllocationBand::Excess
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            AllocationBand::Low => "low",
            AllocationBand::Adequate => "adequate",
            AllocationBand::Excess => "excess",
        }
    }
}

/// The discrete state a bidding agent observes before choosing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QState {
    pub usage: UsageBand,
    pub throttle: ThrottleBand,
    pub alloc: AllocationBand,
}

impl QState {
    /// `u` = raw usage millicores, `d` = smoothed demand in [0,1],
    /// `a` = last applied allocation millicores.
    pub fn encode(u: f64, d: f64, a: f64) -> Self {
        Self {
            usage: UsageBand::from_usage_millicores(u),
            throttle: ThrottleBand::from_demand(d),
            alloc: AllocationBand::from_alloc_usage(a, u),
        }
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.usage.as_str(),
            self.throttle.as_str(),
            self.alloc.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_canonical_key() {
        let s = QState::encode(600.0, 0.2, 500.0);
        assert_eq!(s.key(), "medium:some:low");
    }

    #[test]
    fn band_boundaries_are_inclusive_on_the_low_side() {
        assert_eq!(UsageBand::from_usage_millicores(500.0), UsageBand::Low);
        assert_eq!(UsageBand::from_usage_millicores(500.1), UsageBand::Medium);
        assert_eq!(ThrottleBand::from_demand(0.10), ThrottleBand::None);
        assert_eq!(ThrottleBand::from_demand(0.30), ThrottleBand::Some);
        assert_eq!(AllocationBand::from_alloc_usage(100.0, 100.0), AllocationBand::Adequate);
        assert_eq!(AllocationBand::from_alloc_usage(200.0, 100.0), AllocationBand::Adequate);
        assert_eq!(AllocationBand::from_alloc_usage(200.1, 100.0), AllocationBand::Excess);
    }

    #[test]
    fn there_are_27_canonical_states() {
        let usages = [100.0, 600.0, 1500.0];
        let throttles = [0.0, 0.2, 0.5];
        let allocs = [50.0, 150.0, 999.0];
        let mut keys = std::collections::HashSet::new();
        for u in usages {
            for d in throttles {
                for a in allocs {
                    keys.insert(QState::encode(u, d, a).key());
                }
            }
        }
        assert_eq!(keys.len(), 27);
    }
}
