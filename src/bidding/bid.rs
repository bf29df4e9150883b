use thiserror::Error;

/// A per-pod bid consumed by the market solver. All fields are positive
/// millicore-denominated scalars except `weight`, which is a dimensionless
/// priority.
///
/// `demand` is only floored at `min`, never capped at `max`: the solver
/// needs to see a bid's uncapped need to tell an agent that wants more than
/// its own max from one that doesn't, and applies the `max` ceiling itself
/// during cap-handling (§4.4.1). A bid's `demand` can therefore exceed
/// `max` — the allocation the solver ultimately clears to never does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bid {
    pub min: f64,
    pub max: f64,
    pub weight: f64,
    pub demand: f64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum InvalidBid {
    #[error("bid min ({min}) exceeds max ({max})")]
    MinExceedsMax { min: f64, max: f64 },
    #[error("bid weight must be positive, got {0}")]
    NonPositiveWeight(f64),
}

impl Bid {
    pub fn new(min: f64, max: f64, weight: f64, demand: f64) -> Result<Self, InvalidBid> {
        if min > max {
            return Err(InvalidBid::MinExceedsMax { min, max });
        }
        if weight <= 0.0 {
            return Err(InvalidBid::NonPositiveWeight(weight));
        }
        Ok(Self {
            min,
            max: max.max(min),
            weight,
            demand: demand.max(min),
        })
    }
}
