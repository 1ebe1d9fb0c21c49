//! Cancellation tokens for superseded work
//!
//! A page render, or any other task that a newer request replaces, holds a
//! [`CancellationToken`] and checks it at its suspension points. The
//! [`CancellationRegistry`] keeps one live token per key (a page number, a
//! request id) so starting new work for a key cancels the old work first.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation token for cooperative task cancellation
///
/// Clones share the same state: cancelling any clone cancels them all.
///
/// # Example
///
/// ```
/// use annotator_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every clone of it
    ///
    /// Idempotent. Wakes every task waiting in [`CancellationToken::cancelled`].
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// One live cancellation token per key
///
/// # Example
///
/// ```
/// use annotator_scheduler::CancellationRegistry;
///
/// let registry = CancellationRegistry::new();
/// let first = registry.replace(3_u32);
/// let second = registry.replace(3_u32);
///
/// assert!(first.is_cancelled());
/// assert!(!second.is_cancelled());
/// ```
#[derive(Debug)]
pub struct CancellationRegistry<K> {
    tokens: Mutex<HashMap<K, CancellationToken>>,
}

impl<K: Eq + Hash + Clone> CancellationRegistry<K> {
    pub fn new() -> Self {
        Self { tokens: Mutex::new(HashMap::new()) }
    }

    /// Cancel whatever is registered under `key` and register a fresh token
    pub fn replace(&self, key: K) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.tokens.lock().insert(key, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Cancel the token registered under `key`; returns `true` if one existed
    pub fn cancel(&self, key: &K) -> bool {
        match self.tokens.lock().remove(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered token; returns how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<CancellationToken> = self.tokens.lock().drain().map(|(_, t)| t).collect();
        for token in &drained {
            token.cancel();
        }
        drained.len()
    }

    /// Drop the registration for `key` if it still belongs to `token`
    ///
    /// Called when work completes; a newer registration is left alone.
    pub fn release(&self, key: &K, token: &CancellationToken) -> bool {
        let mut tokens = self.tokens.lock();
        match tokens.get(key) {
            Some(current) if Arc::ptr_eq(&current.state, &token.state) => {
                tokens.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, key: &K) -> Option<CancellationToken> {
        self.tokens.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for CancellationRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
