//! Computed Values
//!
//! A `Computed` is a cached derived value backed by a lazy watcher.
//!
//! # How Computed Values Work
//!
//! 1. On first access, the watcher evaluates the computation and caches the
//!    result.
//!
//! 2. When a dependency changes, the watcher is only marked dirty. Nothing is
//!    recomputed until somebody reads the value again.
//!
//! 3. When read from inside another watcher, the computed value forwards its
//!    own deps to the reader, so the reader re-runs whenever the computation's
//!    inputs change.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::watcher::{Watcher, WatcherOptions};
use crate::instance::Instance;

/// A lazily evaluated, memoized value.
pub struct Computed<T> {
    watcher: Watcher,
    value: Rc<RefCell<Option<T>>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a new computed value. The computation runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(compute, WatcherOptions::lazy())
    }

    /// Create a computed value owned by a component instance.
    ///
    /// Its watcher is torn down together with the instance.
    pub fn owned_by<F>(vm: &Instance, label: &str, compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_options(
            compute,
            WatcherOptions::lazy()
                .owned_by(vm)
                .label(format!("computed \"{}\"", label)),
        )
    }

    fn with_options<F>(compute: F, options: WatcherOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let value = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&value);
        let watcher = Watcher::new(
            move || {
                let next = compute();
                *slot.borrow_mut() = Some(next);
                Ok(())
            },
            WatcherOptions { lazy: true, ..options },
        );
        Self { watcher, value }
    }

    /// Get the current value, recomputing if a dependency changed.
    pub fn get(&self) -> T {
        if self.watcher.is_dirty() {
            self.watcher.evaluate();
        }
        if ReactiveContext::is_active() {
            self.watcher.depend();
        }
        self.value
            .borrow()
            .clone()
            .expect("evaluated computed should have a value")
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The backing watcher.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Stop tracking dependencies. The last cached value stays readable.
    pub fn dispose(&self) {
        self.watcher.teardown();
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            watcher: self.watcher.clone(),
            value: Rc::clone(&self.value),
        }
    }
}

impl<T: Debug> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &self.value.borrow())
            .field("dirty", &self.watcher.is_dirty())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
