//! Subscriber identity.
//!
//! Every watcher (render function, computed property or user watch) gets a
//! `SubscriberId` when it is created. Ids are handed out in creation order, so
//! they double as the ordering key the scheduler uses when flushing: a parent
//! instance creates its render watcher before any of its children exist, which
//! puts parents ahead of children in every flush.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Ids are strictly increasing. Comparing two ids tells you which subscriber
/// was created first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_ids_follow_creation_order() {
        let first = SubscriberId::new();
        let second = SubscriberId::new();

        assert!(first < second);
        assert!(first.raw() < second.raw());
    }
}
