//! The managed-pod filter (§7), applied verbatim: every clause must hold
//! for a pod to be picked up by the node agent.

use std::collections::HashSet;

use crate::config::PodAnnotations;
use crate::sensor::QosClass;

use super::types::{PodInfo, PodPhase};

pub fn is_managed(pod: &PodInfo, excluded_namespaces: &HashSet<String>) -> bool {
    if pod.phase != PodPhase::Running {
        return false;
    }
    if pod.is_terminating() {
        return false;
    }
    if pod.qos == QosClass::Guaranteed {
        return false;
    }
    if excluded_namespaces.contains(&pod.namespace) {
        return false;
    }

    let annotations = PodAnnotations::parse(&pod.annotations);
    if !annotations.managed {
        return false;
    }

    pod.containers
        .iter()
        .any(|c| c.request_millicores.is_some() || c.limit_millicores.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::types::ContainerResources;
    use std::collections::BTreeMap;

    fn base_pod() -> PodInfo {
        PodInfo {
            uid: "u1".to_string(),
            namespace: "default".to_string(),
            name: "p1".to_string(),
            node_name: Some("node-1".to_string()),
            phase: PodPhase::Running,
            qos: QosClass::Burstable,
            deletion_timestamp: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            containers: vec![ContainerResources {
                name: "main".to_string(),
                request_millicores: Some(100.0),
                limit_millicores: Some(500.0),
            }],
            observed_cpu_limit_millicores: Some(500.0),
        }
    }

    #[test]
    fn running_burstable_with_resources_is_managed() {
        let pod = base_pod();
        assert!(is_managed(&pod, &HashSet::new()));
    }

    #[test]
    fn guaranteed_qos_is_never_managed() {
        let mut pod = base_pod();
        pod.qos = QosClass::Guaranteed;
        assert!(!is_managed(&pod, &HashSet::new()));
    }

    #[test]
    fn non_running_phase_is_excluded() {
        let mut pod = base_pod();
        pod.phase = PodPhase::Pending;
        assert!(!is_managed(&pod, &HashSet::new()));
    }

    #[test]
    fn terminating_pod_is_excluded() {
        let mut pod = base_pod();
        pod.deletion_timestamp = Some(chrono::Utc::now());
        assert!(!is_managed(&pod, &HashSet::new()));
    }

    #[test]
    fn excluded_namespace_is_excluded() {
        let pod = base_pod();
        let excluded: HashSet<String> = ["default".to_string()].into_iter().collect();
        assert!(!is_managed(&pod, &excluded));
    }

    #[test]
    fn opt_out_annotation_is_excluded() {
        let mut pod = base_pod();
        pod.annotations
            .insert("mbcas.io/managed".to_string(), "false".to_string());
        assert!(!is_managed(&pod, &HashSet::new()));
    }

    #[test]
    fn no_cpu_request_or_limit_is_excluded() {
        let mut pod = base_pod();
        pod.containers = vec![ContainerResources::default()];
        assert!(!is_managed(&pod, &HashSet::new()));
    }
}
