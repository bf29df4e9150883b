//! Cluster-wide watch over `PodAllocation` records, translating each
//! applied (created or updated) object into a queued identity. The initial
//! relist the watcher performs on startup naturally seeds the queue with
//! every existing record, so no separate bootstrap list is needed.

use futures_util::StreamExt;
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;

use crate::k8s::K8sClient;
use crate::store::PodIdentity;

use super::queue::EventQueueHandle;

pub async fn run(client: K8sClient, queue: EventQueueHandle, cancellation: CancellationToken) {
    let api = client.podallocations_api();
    let stream = watcher(api, watcher::Config::default()).applied_objects();
    tokio::pin!(stream);

    loop {
        tokio::select! {
            next = stream.next() => {
                match next {
                    Some(Ok(allocation)) => {
                        let namespace = allocation.namespace().unwrap_or_default();
                        let name = allocation.name_any();
                        queue.enqueue(PodIdentity::new(namespace, name));
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "PodAllocation watch stream error, continuing");
                    }
                    None => {
                        tracing::warn!("PodAllocation watch stream ended unexpectedly");
                        break;
                    }
                }
            }
            _ = cancellation.cancelled() => break,
        }
    }
}
