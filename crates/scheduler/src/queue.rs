//! Per-document operation queue
//!
//! Operations that read and then rewrite relations (annotation delete,
//! relation create, attach, detach) must not interleave: two concurrent
//! deletes would otherwise both plan against the same snapshot and the
//! second would resurrect what the first removed. The queue runs them one at
//! a time in arrival order.

use crate::generation::GenerationTicket;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct OperationQueue {
    gate: Arc<Mutex<()>>,
    waiting: Arc<AtomicUsize>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations waiting for or holding the queue
    pub fn pending(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Run `op` once every earlier operation has finished
    ///
    /// Tokio's mutex is fair, so operations start in the order they queued.
    pub async fn run<F, T>(&self, action: &'static str, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let _pending = Pending::enter(&self.waiting);
        let _guard = self.gate.lock().await;
        tracing::trace!(action, "operation started");
        op.await
    }

    /// Like [`OperationQueue::run`] but skips `op` when `ticket` went stale
    /// while the operation was waiting its turn
    pub async fn run_current<F, T>(&self, action: &'static str, ticket: &GenerationTicket, op: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let _pending = Pending::enter(&self.waiting);
        let _guard = self.gate.lock().await;

        if ticket.is_current() {
            tracing::trace!(action, "operation started");
            Some(op.await)
        } else {
            tracing::debug!(action, generation = ticket.value(), "skipping operation for closed document");
            None
        }
    }
}

/// Counts one queued operation until dropped, even if its future is cancelled
struct Pending<'a>(&'a AtomicUsize);

impl<'a> Pending<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
