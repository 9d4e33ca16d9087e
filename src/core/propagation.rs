//! Change propagation: listener registry and the bounded notify fixed point.
//!
//! Listeners are rule modules. Each notification round hands every
//! registered listener one snapshot of newly committed assertions;
//! listeners assert and commit further facts, and the engine iterates
//! until the notification set stays empty or the depth bound trips. The
//! iteration is an explicit loop, not call-stack recursion, so the bound
//! is a checked error rather than stack exhaustion.

use std::sync::{Arc, Mutex};

use crate::core::error::TandemError;
use crate::core::model::Assertion;
use crate::core::store::{AssertionStore, StoreState};

pub type ListenerId = u64;

pub trait ChangeListener: Send + Sync {
    /// Receives one snapshot of newly committed assertions. Implementations
    /// may call `assert` and are expected to `commit` before returning.
    fn on_changes(&self, store: &AssertionStore, changed: &[Assertion])
    -> Result<(), TandemError>;
}

/// Closure adapter so rule modules without state can register a plain `Fn`.
pub struct FnListener<F>(pub F);

impl<F> ChangeListener for FnListener<F>
where
    F: Fn(&AssertionStore, &[Assertion]) -> Result<(), TandemError> + Send + Sync,
{
    fn on_changes(
        &self,
        store: &AssertionStore,
        changed: &[Assertion],
    ) -> Result<(), TandemError> {
        (self.0)(store, changed)
    }
}

/// Registered listeners in registration order. Handles are `Arc`s so each
/// round runs against a snapshot and listeners may mutate the registry
/// (or re-enter the store) without deadlocking a round in flight.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<RegistryEntries>,
}

#[derive(Default)]
struct RegistryEntries {
    next_id: ListenerId,
    listeners: Vec<(ListenerId, Arc<dyn ChangeListener>)>,
}

impl ListenerRegistry {
    pub fn add(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let mut entries = self.entries.lock().unwrap();
        let id = entries.next_id;
        entries.next_id += 1;
        entries.listeners.push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.listeners.len();
        entries.listeners.retain(|(lid, _)| *lid != id);
        entries.listeners.len() != before
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ChangeListener>> {
        self.entries
            .lock()
            .unwrap()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl AssertionStore {
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Convenience registration for closure listeners.
    pub fn add_listener_fn<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&AssertionStore, &[Assertion]) -> Result<(), TandemError> + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener(f)))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn clear_listeners(&self) {
        self.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Drives committed notifications to a fixed point.
    ///
    /// Each round snapshots and clears the visible notification set, then
    /// invokes every registered listener once with that snapshot. Listener
    /// commits refill the set; a non-empty set starts the next round with
    /// an incremented depth. Exceeding the configured threshold discards
    /// the pending set and fails with `PropagationOverflow`, the
    /// cycle-breaker for rule networks that would otherwise oscillate.
    pub fn notify_listeners_recursively(&self) -> Result<(), TandemError> {
        let limit = self.options.propagation_depth_threshold;
        let mut depth = 0usize;

        loop {
            let batch = {
                let mut inner = self.lock_inner();
                if inner.committed.is_empty() {
                    inner.state = StoreState::Buffering;
                    inner.last_propagation_depth = depth;
                    return Ok(());
                }
                depth += 1;
                inner.last_propagation_depth = depth;
                if depth > limit {
                    inner.committed.clear();
                    inner.state = StoreState::Buffering;
                    return Err(TandemError::PropagationOverflow { depth, limit });
                }
                inner.state = StoreState::Notifying;
                inner.committed.drain()
            };

            // The inner lock is released here so listeners can re-enter
            // the store; each round runs against a registry snapshot.
            for listener in self.listeners.snapshot() {
                if let Err(e) = listener.on_changes(self, &batch) {
                    let mut inner = self.lock_inner();
                    inner.state = StoreState::Buffering;
                    return Err(e);
                }
            }
        }
    }
}
