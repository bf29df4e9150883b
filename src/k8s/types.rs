//! Platform-facing pod view: the fields the filter, sensor, and bidding
//! agent need, decoupled from `k8s_openapi`'s verbose optional-everything
//! shape.

use std::collections::BTreeMap;

use crate::sensor::QosClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn from_str(s: &str) -> Self {
        match s {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

/// A single container's declared CPU request/limit, in millicores. Either
/// may be absent (a container can declare neither).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerResources {
    pub name: String,
    pub request_millicores: Option<f64>,
    pub limit_millicores: Option<f64>,
}

/// Everything the core pipeline needs to know about one pod, normalized
/// out of the platform's native pod representation.
#[derive(Debug, Clone)]
pub struct PodInfo {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub node_name: Option<String>,
    pub phase: PodPhase,
    pub qos: QosClass,
    pub deletion_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Per-container resources, in declaration order; container 0 is the
    /// one MBCAS manages unless a future annotation names another.
    pub containers: Vec<ContainerResources>,
    /// Observed current CPU limit of the managed container, in millicores,
    /// read back from the platform (drives startup-grace and step-limit
    /// calculations). `None` if the container declares no limit yet.
    pub observed_cpu_limit_millicores: Option<f64>,
}

impl PodInfo {
    pub fn is_terminating(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn managed_container(&self) -> Option<&ContainerResources> {
        self.containers.first()
    }
}
