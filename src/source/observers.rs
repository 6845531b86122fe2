//! Subscriber registry for data source events.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::runtime::{MaybeSend, MaybeSync};
use crate::types::SourceEvent;

/// Receives every [`SourceEvent`] of a data source it subscribed to.
///
/// Implemented for any `Fn(&SourceEvent)` closure. Callbacks run on whichever
/// thread applied the change, after the source's lock is released, so they
/// may call back into the source.
pub trait Observer: MaybeSend + MaybeSync {
    fn notify(&self, event: &SourceEvent);
}

impl<F> Observer for F
where
    F: Fn(&SourceEvent) + MaybeSend + MaybeSync,
{
    fn notify(&self, event: &SourceEvent) {
        self(event);
    }
}

type Entry = (u64, Arc<dyn Observer>);

#[derive(Default)]
pub(crate) struct ObserverSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl ObserverSet {
    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(self: &Arc<Self>, observer: Arc<dyn Observer>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push((id, observer));
        Subscription {
            id,
            set: Arc::downgrade(self),
            active: AtomicBool::new(true),
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Deliver `event` to a snapshot of the current subscribers.
    pub(crate) fn notify(&self, event: &SourceEvent) {
        let snapshot: Vec<Arc<dyn Observer>> = self
            .entries()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            observer.notify(event);
        }
    }

    pub(crate) fn clear(&self) {
        self.entries().clear();
    }

    fn contains(&self, id: u64) -> bool {
        self.entries().iter().any(|(entry_id, _)| *entry_id == id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Handle returned by `subscribe`. Dropping it leaves the observer
/// registered; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    set: Weak<ObserverSet>,
    active: AtomicBool,
}

impl Subscription {
    /// A handle that is already unsubscribed.
    pub(crate) fn inert() -> Self {
        Self {
            id: 0,
            set: Weak::new(),
            active: AtomicBool::new(false),
        }
    }

    /// Stop receiving events. Safe to call any number of times; returns
    /// whether this call removed the observer.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.set.upgrade().is_some_and(|set| set.remove(self.id))
    }

    /// Whether the observer is still registered. Turns false after
    /// `unsubscribe` and after the source is destroyed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
            && self.set.upgrade().is_some_and(|set| set.contains(self.id))
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
