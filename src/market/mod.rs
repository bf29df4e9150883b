//! Node-local market solver (C4): converts node capacity and a set of
//! per-pod bids into a feasible allocation vector plus a shadow price,
//! via a Nash-bargaining / proportional-fairness clearing rule.

mod capacity;
mod clearing;
mod regime;

pub use capacity::node_capacity;
pub use clearing::{clear, ClearOutcome};
pub use regime::Regime;
