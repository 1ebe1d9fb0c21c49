//! Document generation guard
//!
//! Every open of a document starts a new generation. Async work captures a
//! [`GenerationTicket`] when it starts and checks it before applying its
//! result, so completions that arrive after the document was closed or
//! reopened are dropped instead of writing into the new state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct DocumentGeneration {
    counter: Arc<AtomicU64>,
}

impl DocumentGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Start a new generation, invalidating every outstanding ticket
    pub fn advance(&self) -> GenerationTicket {
        let value = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(generation = value, "document generation advanced");
        GenerationTicket { value, counter: Arc::clone(&self.counter) }
    }

    /// Ticket for the current generation
    pub fn ticket(&self) -> GenerationTicket {
        GenerationTicket { value: self.current(), counter: Arc::clone(&self.counter) }
    }
}

/// Snapshot of a generation taken when a task started
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    value: u64,
    counter: Arc<AtomicU64>,
}

impl GenerationTicket {
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Whether no newer generation has started since this ticket was taken
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.value
    }
}
