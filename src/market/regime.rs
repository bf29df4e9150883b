//! The three clearing regimes a market cycle can land in, driven purely by
//! the relationship between aggregate demand and node capacity.

/// Which of the three clearing rules produced an allocation vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// `Σ need ≤ capacity`: every bid gets its full proposed need, `p = 0`.
    Uncongested,
    /// `Σ min ≤ capacity < Σ need`: proportional surplus clearing applies.
    Congested,
    /// `Σ min > capacity`: even minimums don't fit; baselines are scaled down.
    Overloaded,
}

impl Regime {
    pub fn as_str(self) -> &'static str {
        match self {
            Regime::Uncongested => "uncongested",
            Regime::Congested => "congested",
            Regime::Overloaded => "overloaded",
        }
    }
}
