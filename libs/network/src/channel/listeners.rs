//! Copy-on-write listener list
//!
//! Adds and removes swap in a new `Arc<Vec<_>>`; notifiers iterate a snapshot
//! taken without holding the lock, so a listener may register or unregister
//! from inside its own callback.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

pub struct ListenerSet<T: ?Sized> {
    listeners: RwLock<Arc<Vec<Arc<T>>>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. Returns `false` if that exact instance is already present.
    pub fn add(&self, listener: Arc<T>) -> bool {
        let mut guard = self.listeners.write();
        if guard.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            warn!("Listener already registered, ignoring");
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
        true
    }

    pub fn remove(&self, listener: &Arc<T>) -> bool {
        let mut guard = self.listeners.write();
        let before = guard.len();
        let next: Vec<_> = guard
            .iter()
            .filter(|l| !Arc::ptr_eq(l, listener))
            .cloned()
            .collect();
        let removed = next.len() != before;
        if removed {
            *guard = Arc::new(next);
        }
        removed
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.listeners.read().clone()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
