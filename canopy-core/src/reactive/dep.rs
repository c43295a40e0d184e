//! Dependency Sets
//!
//! A `Dep` is the subscriber list owned by one observable value. It does not
//! own its subscribers: entries are weak references, keyed by subscriber id, so
//! the same watcher can never appear twice and a dropped watcher simply falls
//! out on the next notification.
//!
//! # Notification Order
//!
//! When the scheduler batches updates it orders the flush itself. When
//! batching is disabled (`Config::async_flush == false`) nothing reorders the
//! queue afterwards, so `notify` sorts subscribers by id before updating them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;
use super::watcher::{WeakWatcher, Watcher};
use crate::config;

/// Unique identifier for a dependency set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct DepInner {
    id: DepId,
    subs: RefCell<IndexMap<SubscriberId, WeakWatcher>>,
}

/// The set of watchers subscribed to one observable value.
///
/// Cloning a `Dep` yields another handle to the same set.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    /// Create an empty dependency set.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::next(),
                subs: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Get the dep's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Register the watcher currently collecting dependencies, if any.
    pub fn depend(&self) {
        if let Some(watcher) = ReactiveContext::current() {
            watcher.add_dep(self);
        }
    }

    /// Add a subscriber. Adding one that is already present is a no-op.
    pub fn add_sub(&self, watcher: &Watcher) {
        self.inner
            .subs
            .borrow_mut()
            .entry(watcher.id())
            .or_insert_with(|| watcher.downgrade());
    }

    /// Remove a subscriber.
    pub fn remove_sub(&self, id: SubscriberId) {
        self.inner.subs.borrow_mut().shift_remove(&id);
    }

    /// Notify every subscriber that the value changed.
    ///
    /// The subscriber currently collecting dependencies is skipped: a
    /// computation writing to state it has just read would otherwise queue
    /// itself again on every run.
    pub fn notify(&self) {
        // Stabilize the list first; updates may subscribe or unsubscribe.
        let mut subs: Vec<Watcher> = {
            let mut entries = self.inner.subs.borrow_mut();
            entries.retain(|_, weak| weak.is_alive());
            entries.values().filter_map(WeakWatcher::upgrade).collect()
        };

        if !config::async_flush() {
            subs.sort_by_key(Watcher::id);
        }

        let running = ReactiveContext::current_subscriber();
        tracing::trace!(dep = self.id().raw(), subscribers = subs.len(), "notify");

        for watcher in subs {
            if Some(watcher.id()) == running {
                tracing::trace!(watcher = %watcher.id(), "skipping self-notification");
                continue;
            }
            watcher.update();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .borrow()
            .values()
            .filter(|weak| weak.is_alive())
            .count()
    }

    /// Ids of the current subscribers, in subscription order.
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.inner.subs.borrow().keys().copied().collect()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id())
            .field("subscribers", &self.subscriber_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::WatcherOptions;
    use std::cell::Cell;

    fn counting_watcher(count: Rc<Cell<usize>>) -> Watcher {
        Watcher::new(
            move || {
                count.set(count.get() + 1);
                Ok(())
            },
            WatcherOptions::sync(),
        )
    }

    #[test]
    fn subscribing_twice_is_a_noop() {
        let dep = Dep::new();
        let watcher = Watcher::new(|| Ok(()), WatcherOptions::lazy());

        dep.add_sub(&watcher);
        dep.add_sub(&watcher);

        assert_eq!(dep.subscriber_count(), 1);
    }

    #[test]
    fn depend_uses_top_of_stack_only() {
        let dep = Dep::new();
        let outer = Watcher::new(|| Ok(()), WatcherOptions::lazy());
        let inner = Watcher::new(|| Ok(()), WatcherOptions::lazy());

        let _outer_ctx = ReactiveContext::enter(&outer);
        {
            let _inner_ctx = ReactiveContext::enter(&inner);
            dep.depend();
        }

        assert_eq!(dep.subscriber_ids(), vec![inner.id()]);
    }

    #[test]
    fn notify_updates_each_subscriber_once() {
        let dep = Dep::new();
        let runs = Rc::new(Cell::new(0));
        let watcher = counting_watcher(runs.clone());
        assert_eq!(runs.get(), 1);

        dep.add_sub(&watcher);
        dep.add_sub(&watcher);
        dep.notify();

        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn dropped_watchers_fall_out() {
        let dep = Dep::new();
        {
            let watcher = Watcher::new(|| Ok(()), WatcherOptions::lazy());
            dep.add_sub(&watcher);
            assert_eq!(dep.subscriber_count(), 1);
        }

        dep.notify();
        assert!(dep.subscriber_ids().is_empty());
    }

    #[test]
    fn dep_ids_are_unique() {
        assert_ne!(Dep::new().id(), Dep::new().id());
    }
}
