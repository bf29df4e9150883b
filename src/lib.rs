//! MBCAS core: the closed-loop decision engine that re-sizes container CPU
//! limits by observed demand.
//!
//! The crate is split into the four subsystems from the design: a cgroup
//! demand sensor, a per-pod bidding agent, a node-local market solver, and a
//! cluster-wide reconciling actuator, plus the shared config/platform/store
//! plumbing that ties them together. The two binaries in `src/bin` each
//! drive one half of the system; both link against this library.

pub mod actuator;
pub mod agent;
pub mod bidding;
pub mod config;
pub mod k8s;
pub mod logging;
pub mod market;
pub mod metrics;
pub mod sensor;
pub mod store;

pub use config::MbcasConfig;
