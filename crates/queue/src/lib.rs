//! Per-conversation FIFO work queue.
//!
//! `enqueue(conversation_id, task)` returns a future resolving when the task
//! has run.  For one conversation id, tasks run strictly in enqueue order and
//! never overlap; tasks for different ids run independently.  A lane is
//! garbage-collected as soon as its pending work drains to zero, so the lane
//! map does not grow with the total number of conversations ever seen.
//!
//! The queue never retries anything.  Retry policy belongs to the caller.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The task panicked.  The lane itself survives and continues with the
    /// next enqueued task.
    #[error("queued task panicked")]
    TaskPanicked,
    /// The worker disappeared before delivering a result.  Not expected in
    /// normal operation.
    #[error("queue lane closed before the task completed")]
    LaneClosed,
}

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Lane {
    tx: mpsc::UnboundedSender<Job>,
    pending: usize,
}

/// FIFO serialization keyed by conversation id.
#[derive(Clone, Default)]
pub struct WorkQueue {
    lanes: Arc<Mutex<HashMap<String, Lane>>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `task` on the conversation's lane.  The returned future
    /// resolves with the task's output once every previously enqueued task
    /// for the same id has fully settled and `task` itself has run.
    pub fn enqueue<T, F>(
        &self,
        conversation_id: &str,
        task: F,
    ) -> impl Future<Output = Result<T, QueueError>> + use<T, F>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<Result<T, QueueError>>();

        let job: Job = Box::pin(async move {
            // A panicking task must not kill the lane worker; the panic is
            // converted into an error on the caller's future instead.
            let outcome = std::panic::AssertUnwindSafe(task).catch_unwind().await;
            let result = outcome.map_err(|_| {
                warn!("queued task panicked");
                QueueError::TaskPanicked
            });
            // The caller may have dropped its handle; the task still ran.
            let _ = done_tx.send(result);
        });

        {
            let mut lanes = self.lanes.lock().expect("lane map poisoned");
            match lanes.get_mut(conversation_id) {
                Some(lane) => {
                    lane.pending += 1;
                    // The worker only exits while holding this lock, so a
                    // lane present in the map always has a live receiver.
                    let _ = lane.tx.send(job);
                }
                None => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let _ = tx.send(job);
                    lanes.insert(
                        conversation_id.to_string(),
                        Lane { tx, pending: 1 },
                    );
                    self.spawn_worker(conversation_id.to_string(), rx);
                }
            }
        }

        async move { done_rx.await.map_err(|_| QueueError::LaneClosed)? }
    }

    /// Number of live lanes.  Drops back to zero once all pending work has
    /// drained.
    pub fn lane_count(&self) -> usize {
        self.lanes.lock().expect("lane map poisoned").len()
    }

    fn spawn_worker(&self, conversation_id: String, mut rx: mpsc::UnboundedReceiver<Job>) {
        let lanes = Arc::clone(&self.lanes);
        tokio::spawn(async move {
            loop {
                let Some(job) = rx.recv().await else {
                    break;
                };
                job.await;

                // Decrement-and-maybe-remove under the same lock enqueue
                // uses, so a concurrent enqueue either lands before the
                // check (pending > 0, worker continues) or after removal
                // (a fresh lane is created).
                let mut lanes = lanes.lock().expect("lane map poisoned");
                let drained = match lanes.get_mut(&conversation_id) {
                    Some(lane) => {
                        lane.pending -= 1;
                        lane.pending == 0
                    }
                    None => true,
                };
                if drained {
                    lanes.remove(&conversation_id);
                    debug!(conversation = %conversation_id, "queue lane drained");
                    break;
                }
            }
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
