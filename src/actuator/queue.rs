//! The event queue feeding the reconcile workers (§4.6): deduplicates
//! pending identities so a burst of watch events for the same pod collapses
//! to a single queued entry, and supports scheduling a delayed re-enqueue
//! for cooldown/backoff requeues.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::store::PodIdentity;

/// Receiving half of the event queue, owned by the actuator's run loop.
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<PodIdentity>,
    pending: Arc<Mutex<HashSet<PodIdentity>>>,
}

/// Cloneable sending half: the watch stream, and any worker scheduling a
/// delayed requeue, hold one of these.
#[derive(Clone)]
pub struct EventQueueHandle {
    tx: mpsc::UnboundedSender<PodIdentity>,
    pending: Arc<Mutex<HashSet<PodIdentity>>>,
}

impl EventQueue {
    pub fn new() -> (Self, EventQueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(HashSet::new()));
        (
            Self {
                rx,
                pending: pending.clone(),
            },
            EventQueueHandle { tx, pending },
        )
    }

    /// Waits for the next identity, clearing its pending marker so a future
    /// enqueue of the same identity is no longer coalesced away.
    pub async fn recv(&mut self) -> Option<PodIdentity> {
        let id = self.rx.recv().await?;
        self.pending.lock().unwrap().remove(&id);
        Some(id)
    }
}

impl EventQueueHandle {
    /// Enqueues `id` unless it is already waiting to be dequeued. Several
    /// watch events for the same pod arriving before it is picked up
    /// collapse into one queue entry — the worker that eventually handles
    /// it reads the pod's current state, so nothing is lost by dropping the
    /// duplicates (§5's "coalesce consecutive updates, latest wins").
    pub fn enqueue(&self, id: PodIdentity) {
        if self.pending.lock().unwrap().insert(id.clone()) {
            let _ = self.tx.send(id);
        }
    }

    /// Schedules `id` to be enqueued after `delay`, used for cooldown waits
    /// and backoff retries. Cancelled cleanly if `cancellation` fires first,
    /// so a shutdown does not leave orphaned timers.
    pub fn enqueue_after(&self, id: PodIdentity, delay: Duration, cancellation: CancellationToken) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => handle.enqueue(id),
                _ = cancellation.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str) -> PodIdentity {
        PodIdentity::new("default", name)
    }

    #[tokio::test]
    async fn duplicate_enqueue_before_dequeue_collapses_to_one() {
        let (mut queue, handle) = EventQueue::new();
        handle.enqueue(pod("a"));
        handle.enqueue(pod("a"));
        handle.enqueue(pod("a"));

        let first = queue.recv().await.unwrap();
        assert_eq!(first, pod("a"));

        // No second entry queued; the channel should now be empty modulo
        // the fact that a fresh enqueue after dequeue is allowed again.
        handle.enqueue(pod("a"));
        let second = queue.recv().await.unwrap();
        assert_eq!(second, pod("a"));
    }

    #[tokio::test]
    async fn distinct_identities_both_deliver() {
        let (mut queue, handle) = EventQueue::new();
        handle.enqueue(pod("a"));
        handle.enqueue(pod("b"));

        let mut seen = HashSet::new();
        seen.insert(queue.recv().await.unwrap());
        seen.insert(queue.recv().await.unwrap());
        assert!(seen.contains(&pod("a")));
        assert!(seen.contains(&pod("b")));
    }

    #[tokio::test]
    async fn enqueue_after_delivers_past_the_delay() {
        let (mut queue, handle) = EventQueue::new();
        handle.enqueue_after(pod("a"), Duration::from_millis(10), CancellationToken::new());
        let id = queue.recv().await.unwrap();
        assert_eq!(id, pod("a"));
    }

    #[tokio::test]
    async fn enqueue_after_is_skipped_on_cancellation() {
        let (mut queue, handle) = EventQueue::new();
        let token = CancellationToken::new();
        handle.enqueue_after(pod("a"), Duration::from_secs(5), token.clone());
        token.cancel();

        let result = tokio::time::timeout(Duration::from_millis(50), queue.recv()).await;
        assert!(result.is_err(), "no delivery should occur once cancelled");
    }
}
