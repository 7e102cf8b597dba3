//! Observers of resource-set switches.
//!
//! Observers are delivered synchronously, in subscription order. Delivery
//! works on a snapshot of the list, so an observer may unsubscribe itself
//! (or subscribe others) while being notified.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::identity::PatchIdentity;

/// Receives switch notifications. Handlers must return promptly; they run on
/// the switching task.
pub trait PatchObserver: Send + Sync {
    fn on_patch_changing(&self, _from: &PatchIdentity, _to: &PatchIdentity) {}

    fn on_patch_changed(&self, _from: &PatchIdentity, _to: &PatchIdentity) {}

    fn on_switch_failed(&self, _from: &PatchIdentity, _to: &PatchIdentity, _error: &str) {}
}

/// Handle returned by [`ObserverList::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct ObserverList {
    next_id: AtomicU64,
    observers: RwLock<Vec<(ObserverId, Arc<dyn PatchObserver>)>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn PatchObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    pub fn notify_changing(&self, from: &PatchIdentity, to: &PatchIdentity) {
        for observer in self.snapshot() {
            observer.on_patch_changing(from, to);
        }
    }

    pub fn notify_changed(&self, from: &PatchIdentity, to: &PatchIdentity) {
        for observer in self.snapshot() {
            observer.on_patch_changed(from, to);
        }
    }

    pub fn notify_failed(&self, from: &PatchIdentity, to: &PatchIdentity, error: &str) {
        for observer in self.snapshot() {
            observer.on_switch_failed(from, to, error);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn PatchObserver>> {
        self.observers.read().iter().map(|(_, o)| o.clone()).collect()
    }
}
