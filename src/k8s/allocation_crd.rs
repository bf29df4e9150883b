//! The `PodAllocation` custom resource (§3): the authoritative, cluster-wide
//! cross-process record a node agent writes `spec` to and the actuator
//! writes `status` to.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired CPU allocation for one pod's managed container, produced by a
/// node agent cycle.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "mbcas.io",
    version = "v1",
    kind = "PodAllocation",
    plural = "podallocations",
    namespaced,
    status = "PodAllocationStatus",
    derive = "Default"
)]
pub struct PodAllocationSpec {
    /// Stable identifier of the pod this record targets (namespace/name is
    /// already carried by the resource's own metadata; this is the pod's
    /// platform UID, stable across a resize).
    pub pod_uid: String,
    /// Index into the pod's container list this allocation targets.
    #[serde(default)]
    pub container_index: u32,
    pub desired_cpu_request_millicores: f64,
    pub desired_cpu_limit_millicores: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Pending,
    Applied,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PodAllocationStatus {
    pub applied_cpu_request_millicores: Option<f64>,
    pub applied_cpu_limit_millicores: Option<f64>,
    pub phase: Phase,
    pub shadow_price_cpu: f64,
    pub reason: String,
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Set when the owning pod has disappeared; the record is deleted once
    /// this deadline passes, absorbing eventual-consistency races between
    /// the pod list and this resource's watch stream.
    pub tombstone_deadline: Option<DateTime<Utc>>,
}
