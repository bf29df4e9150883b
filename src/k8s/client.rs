//! Thin wrapper around the `kube` crate: pod discovery (node-scoped for the
//! agent, cluster-wide for the actuator), the in-place resize subresource
//! patch, and CRUD over the `PodAllocation` custom resource.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, Config, Discovery};
use serde_json::json;

use crate::sensor::QosClass;

use super::allocation_crd::{PodAllocation, PodAllocationStatus};
use super::error::PlatformError;
use super::types::{ContainerResources, PodInfo, PodPhase};

/// Kubernetes client wrapper shared by both binaries.
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Connects using in-cluster config when running as a pod, falling back
    /// to the local kubeconfig otherwise (`kube::Config::infer` handles
    /// both transparently).
    pub async fn new() -> Result<Self> {
        let config = Config::infer()
            .await
            .context("failed to infer kube client configuration")?;
        let client = Client::try_from(config).context("failed to build kube client")?;
        Ok(Self { client })
    }

    /// Checks that the platform's in-place resize subresource is actually
    /// served before the actuator starts reconciling. Fails closed: absence
    /// is treated as fatal, per the platform contract.
    pub async fn detect_resize_subresource(&self) -> Result<()> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .context("failed to run API discovery")?;

        let supported = discovery.groups().any(|group| {
            group.recommended_resources().into_iter().any(|(resource, caps)| {
                resource.kind == "Pod" && caps.subresources.iter().any(|s| s.subresource == "resize")
            })
        });

        if !supported {
            anyhow::bail!(
                "platform does not expose the pod resize subresource; refusing to start"
            );
        }
        Ok(())
    }

    /// Pods assigned to `node_name`, served from the client's watch cache.
    pub async fn list_node_pods(&self, node_name: &str) -> Result<Vec<PodInfo>, PlatformError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
        let list = pods.list(&params).await?;
        Ok(list.items.iter().map(pod_info_from_k8s).collect())
    }

    /// Every pod in the cluster, for the cluster-scoped actuator.
    pub async fn list_all_pods(&self) -> Result<Vec<PodInfo>, PlatformError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(pod_info_from_k8s).collect())
    }

    /// Cluster-wide API handle for the `PodAllocation` CRD, used by the
    /// actuator to watch for spec changes.
    pub fn podallocations_api(&self) -> Api<PodAllocation> {
        Api::all(self.client.clone())
    }

    /// Allocatable CPU capacity of `node_name`, in millicores, feeding the
    /// per-cycle `NodeCapacity` derivation.
    pub async fn node_allocatable_cpu_millicores(&self, node_name: &str) -> Result<f64, PlatformError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes.get(node_name).await.map_err(|e| match e {
            kube::Error::Api(ref resp) if resp.code == 404 => PlatformError::Unavailable(format!(
                "node {node_name} not found"
            )),
            other => PlatformError::Api(other),
        })?;

        let quantity = node
            .status
            .as_ref()
            .and_then(|s| s.allocatable.as_ref())
            .and_then(|a| a.get("cpu"))
            .ok_or_else(|| {
                PlatformError::Unavailable(format!("node {node_name} reports no allocatable cpu"))
            })?;

        parse_cpu(&quantity.0).ok_or_else(|| {
            PlatformError::Unavailable(format!(
                "node {node_name} allocatable cpu quantity unparsable: {}",
                quantity.0
            ))
        })
    }

    pub async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodInfo, PlatformError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods.get(name).await.map_err(|e| match e {
            kube::Error::Api(ref resp) if resp.code == 404 => PlatformError::PodNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => PlatformError::Api(other),
        })?;
        Ok(pod_info_from_k8s(&pod))
    }

    /// Patches the named container's CPU limit through the platform's
    /// in-place resize subresource. Requests are left untouched (§4.6) so
    /// the patch can never change the pod's QoS class.
    pub async fn patch_cpu_limit(
        &self,
        namespace: &str,
        pod_name: &str,
        container_name: &str,
        limit_millicores: f64,
    ) -> Result<(), PlatformError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "spec": {
                "containers": [{
                    "name": container_name,
                    "resources": {
                        "limits": {
                            "cpu": format!("{}m", limit_millicores.round() as i64)
                        }
                    }
                }]
            }
        });

        pods.patch_subresource(
            "resize",
            pod_name,
            &PatchParams::default(),
            &Patch::Strategic(&patch),
        )
        .await?;
        Ok(())
    }

    pub async fn get_allocation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodAllocation>, PlatformError> {
        let api: Api<PodAllocation> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(alloc) => Ok(Some(alloc)),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(e) => Err(PlatformError::Api(e)),
        }
    }

    /// Creates or updates a `PodAllocation`'s spec (node-agent side only —
    /// the actuator never writes spec, per the ownership split in §5).
    pub async fn upsert_allocation_spec(
        &self,
        namespace: &str,
        name: &str,
        spec: &super::allocation_crd::PodAllocationSpec,
    ) -> Result<(), PlatformError> {
        let api: Api<PodAllocation> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "apiVersion": "mbcas.io/v1",
            "kind": "PodAllocation",
            "metadata": { "name": name },
            "spec": spec,
        });
        api.patch(
            name,
            &PatchParams::apply("mbcas-agent"),
            &Patch::Apply(&patch),
        )
        .await?;
        Ok(())
    }

    /// Updates the actuator-owned status fields (everything but
    /// `shadowPriceCpu`, which the node agent owns — see
    /// `patch_allocation_shadow_price`). Sending a selective merge patch
    /// rather than the whole status object means the two writers' patches
    /// touch disjoint keys and never race.
    pub async fn patch_allocation_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PodAllocationStatus,
    ) -> Result<(), PlatformError> {
        let api: Api<PodAllocation> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "status": {
                "applied_cpu_request_millicores": status.applied_cpu_request_millicores,
                "applied_cpu_limit_millicores": status.applied_cpu_limit_millicores,
                "phase": status.phase,
                "reason": status.reason,
                "last_transition_time": status.last_transition_time,
                "tombstone_deadline": status.tombstone_deadline,
            }
        });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    /// Updates only `status.shadowPriceCpu` (node-agent side only). The
    /// shadow price is a market-clearing output, not a reconciliation
    /// outcome, so the agent that computed it owns this one status field
    /// even though the actuator owns the rest of `status`.
    pub async fn patch_allocation_shadow_price(
        &self,
        namespace: &str,
        name: &str,
        shadow_price_cpu: f64,
    ) -> Result<(), PlatformError> {
        let api: Api<PodAllocation> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": { "shadow_price_cpu": shadow_price_cpu } });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    pub async fn delete_allocation(&self, namespace: &str, name: &str) -> Result<(), PlatformError> {
        let api: Api<PodAllocation> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(PlatformError::Api(e)),
        }
    }
}

fn pod_info_from_k8s(pod: &Pod) -> PodInfo {
    let meta = &pod.metadata;
    let spec = pod.spec.as_ref();
    let status = pod.status.as_ref();

    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::from_str)
        .unwrap_or(PodPhase::Unknown);

    let qos = status
        .and_then(|s| s.qos_class.as_deref())
        .map(|q| match q {
            "Guaranteed" => QosClass::Guaranteed,
            "BestEffort" => QosClass::BestEffort,
            _ => QosClass::Burstable,
        })
        .unwrap_or(QosClass::Burstable);

    let containers = spec
        .map(|s| {
            s.containers
                .iter()
                .map(|c| {
                    let resources = c.resources.as_ref();
                    ContainerResources {
                        name: c.name.clone(),
                        request_millicores: resources
                            .and_then(|r| r.requests.as_ref())
                            .and_then(|m| m.get("cpu"))
                            .and_then(|q| parse_cpu(&q.0)),
                        limit_millicores: resources
                            .and_then(|r| r.limits.as_ref())
                            .and_then(|m| m.get("cpu"))
                            .and_then(|q| parse_cpu(&q.0)),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let observed_cpu_limit_millicores = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .and_then(|_| containers.first())
        .and_then(|c: &ContainerResources| c.limit_millicores);

    PodInfo {
        uid: meta.uid.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        name: meta.name.clone().unwrap_or_default(),
        node_name: spec.and_then(|s| s.node_name.clone()),
        phase,
        qos,
        deletion_timestamp: meta.deletion_timestamp.as_ref().map(|t| t.0),
        labels: meta.labels.clone().unwrap_or_default().into_iter().collect(),
        annotations: meta
            .annotations
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect(),
        containers,
        observed_cpu_limit_millicores,
    }
}

fn parse_cpu(quantity: &str) -> Option<f64> {
    crate::config::parse_cpu_quantity(quantity).map(|m| m as f64)
}
