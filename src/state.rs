//! Shared state for one download run.
//!
//! All counters and the registry of in-flight transfers live behind one
//! mutex. A transfer holds a [`TransferSlot`] for as long as it runs; dropping
//! the slot deregisters it and frees its window slot, so every exit path of a
//! transfer releases exactly once. Cancellation drains the registry itself,
//! after which a late slot drop is a no-op. Each reset starts a new run
//! generation; a slot left over from an earlier generation never touches the
//! current run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Point-in-time view of a run's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// Transfers currently holding a window slot.
    pub active: usize,
    /// Highest value `active` reached during the run.
    pub peak_active: usize,
    /// Transfers that have settled, successfully or not.
    pub completed: usize,
    /// Resources discovered by the catalog.
    pub total: usize,
    /// Entries in the cancellation registry.
    pub registered: usize,
    /// Whether cancellation has been requested.
    pub cancelled: bool,
}

impl ProgressSnapshot {
    /// Returns `completed / total`, or 0 when nothing was found.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

#[derive(Debug)]
struct Registered {
    resource_id: String,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    active: usize,
    peak_active: usize,
    completed: usize,
    total: usize,
    cancel: CancellationToken,
    registry: HashMap<usize, Registered>,
}

/// Counters, cancellation flag and open-transfer registry for a run.
#[derive(Debug, Default)]
pub struct RunState {
    inner: Mutex<Inner>,
}

impl RunState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zeroes every counter, installs a fresh cancellation token and starts
    /// a new run generation.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let generation = inner.generation.wrapping_add(1);
        *inner = Inner {
            generation,
            ..Inner::default()
        };
    }

    /// Records how many resources the run will try to fetch.
    pub fn set_total(&self, total: usize) {
        self.lock().total = total;
    }

    /// Returns a handle to the run-wide cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.lock().cancel.clone()
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancel.is_cancelled()
    }

    /// Claims a window slot for the resource dispatched at `key`.
    ///
    /// Returns `None` if the run has already been cancelled.
    #[must_use]
    pub fn register(self: &Arc<Self>, key: usize, resource_id: &str) -> Option<TransferSlot> {
        let mut inner = self.lock();
        if inner.cancel.is_cancelled() {
            return None;
        }
        let token = inner.cancel.child_token();
        inner.registry.insert(
            key,
            Registered {
                resource_id: resource_id.to_string(),
                token: token.clone(),
            },
        );
        inner.active += 1;
        inner.peak_active = inner.peak_active.max(inner.active);
        Some(TransferSlot {
            state: Arc::clone(self),
            generation: inner.generation,
            key,
            token,
        })
    }

    /// Removes `key` from the registry, returning true if it was still there.
    ///
    /// A slot from an older generation releases nothing.
    fn release(&self, generation: u64, key: usize) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        if inner.registry.remove(&key).is_some() {
            inner.active = inner.active.saturating_sub(1);
            true
        } else {
            false
        }
    }

    /// Counts one settled transfer and returns the updated counters.
    pub fn record_settled(&self) -> ProgressSnapshot {
        let mut inner = self.lock();
        if inner.completed < inner.total {
            inner.completed += 1;
        }
        Self::snapshot_of(&inner)
    }

    /// Cancels the run, force-closing every registered transfer.
    ///
    /// Zeroes `active`, empties the registry and returns how many transfers
    /// were closed.
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.lock();
        inner.cancel.cancel();
        let closed = inner.registry.len();
        for (_, entry) in inner.registry.drain() {
            log::debug!("Closing transfer for resource {}", entry.resource_id);
            entry.token.cancel();
        }
        inner.active = 0;
        closed
    }

    /// Returns the current counters.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        Self::snapshot_of(&self.lock())
    }

    fn snapshot_of(inner: &Inner) -> ProgressSnapshot {
        ProgressSnapshot {
            active: inner.active,
            peak_active: inner.peak_active,
            completed: inner.completed,
            total: inner.total,
            registered: inner.registry.len(),
            cancelled: inner.cancel.is_cancelled(),
        }
    }

    /// Returns the resource ids of all registered transfers.
    #[must_use]
    pub fn registered_ids(&self) -> Vec<String> {
        self.lock()
            .registry
            .values()
            .map(|entry| entry.resource_id.clone())
            .collect()
    }
}

/// A claimed window slot, released on drop.
#[derive(Debug)]
pub struct TransferSlot {
    state: Arc<RunState>,
    generation: u64,
    key: usize,
    token: CancellationToken,
}

impl TransferSlot {
    /// Token that fires when this transfer is force-closed.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Dispatch index this slot was registered under.
    #[must_use]
    pub const fn key(&self) -> usize {
        self.key
    }
}

impl Drop for TransferSlot {
    fn drop(&mut self) {
        self.state.release(self.generation, self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_total(total: usize) -> Arc<RunState> {
        let state = Arc::new(RunState::new());
        state.set_total(total);
        state
    }

    #[test]
    fn register_and_drop_release_once() {
        let state = state_with_total(3);
        let a = state.register(0, "a").unwrap();
        let b = state.register(1, "b").unwrap();
        assert_eq!(state.snapshot().active, 2);
        assert_eq!(state.snapshot().registered, 2);

        drop(a);
        assert_eq!(state.snapshot().active, 1);
        assert!(!state.release(0, 0));
        assert_eq!(state.snapshot().active, 1);

        drop(b);
        let snap = state.snapshot();
        assert_eq!(snap.active, 0);
        assert_eq!(snap.peak_active, 2);
        assert_eq!(snap.registered, 0);
    }

    #[test]
    fn cancel_all_closes_every_registered_transfer() {
        let state = state_with_total(5);
        let slots: Vec<_> = (0..3)
            .map(|i| state.register(i, &format!("r{i}")).unwrap())
            .collect();

        assert_eq!(state.cancel_all(), 3);
        assert!(slots.iter().all(|s| s.token().is_cancelled()));

        let snap = state.snapshot();
        assert_eq!(snap.active, 0);
        assert_eq!(snap.registered, 0);
        assert!(snap.cancelled);

        // Late drops after cancellation must not underflow or double count.
        drop(slots);
        assert_eq!(state.snapshot().active, 0);
    }

    #[test]
    fn register_after_cancel_is_refused() {
        let state = state_with_total(2);
        state.cancel_all();
        assert!(state.register(0, "a").is_none());
        assert_eq!(state.snapshot().active, 0);
    }

    #[test]
    fn completed_never_exceeds_total() {
        let state = state_with_total(2);
        state.record_settled();
        state.record_settled();
        let snap = state.record_settled();
        assert_eq!(snap.completed, 2);
        assert!((snap.ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_installs_fresh_token() {
        let state = state_with_total(1);
        let old = state.cancel_token();
        state.cancel_all();
        state.reset();

        assert!(old.is_cancelled());
        assert!(!state.is_cancelled());
        assert_eq!(state.snapshot(), ProgressSnapshot::default());
    }

    #[test]
    fn slot_from_previous_run_leaves_new_run_alone() {
        let state = state_with_total(2);
        let stale = state.register(0, "old").unwrap();
        state.cancel_all();

        state.reset();
        state.set_total(2);
        let _live = state.register(0, "new").unwrap();

        drop(stale);
        let snap = state.snapshot();
        assert_eq!(snap.active, 1);
        assert_eq!(snap.registered, 1);
        assert_eq!(state.registered_ids(), vec!["new".to_string()]);
    }

    #[test]
    fn slot_from_previous_run_without_cancel_is_ignored() {
        let state = state_with_total(1);
        let stale = state.register(3, "old").unwrap();
        state.reset();
        let _live = state.register(3, "new").unwrap();

        drop(stale);
        assert_eq!(state.snapshot().active, 1);
    }

    #[test]
    fn ratio_of_empty_run_is_zero() {
        assert!(ProgressSnapshot::default().ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn registered_ids_lists_open_transfers() {
        let state = state_with_total(2);
        let _a = state.register(0, "alpha").unwrap();
        assert_eq!(state.registered_ids(), vec!["alpha".to_string()]);
    }
}
