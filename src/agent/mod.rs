//! Node agent (component C5): the per-node tick loop that samples demand,
//! runs the two-pass bidding/clearing market, smooths and clamps the
//! result, and emits `PodAllocation` updates.

mod cycle;
mod pipeline;

pub use cycle::NodeAgentCycle;
pub use pipeline::{run_cycle, CycleOutput, ManagedPod, PodCycleResult};
