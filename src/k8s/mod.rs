//! Kubernetes integration (component C7): pod discovery, the in-place
//! resize subresource patch, the `PodAllocation` custom resource, and the
//! managed-pod filter from §7.

mod allocation_crd;
mod client;
mod error;
mod filter;
mod types;

pub use allocation_crd::{Phase, PodAllocation, PodAllocationSpec, PodAllocationStatus};
pub use client::K8sClient;
pub use error::{PatchFailureKind, PlatformError};
pub use filter::is_managed;
pub use types::{ContainerResources, PodInfo, PodPhase};
