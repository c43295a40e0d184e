//! Observable Values
//!
//! An `Observable` is the unit of reactive state. It holds a value and owns one
//! [`Dep`].
//!
//! # How Observables Work
//!
//! 1. When an observable is read while a watcher is collecting dependencies,
//!    that watcher subscribes to the observable's dep.
//!
//! 2. When the value is written, every subscriber is notified once. Batching
//!    several writes into one re-run is the scheduler's job, not the dep's.
//!
//! # Memory Layout
//!
//! Each observable consists of the value behind a `RefCell` and its dep, both
//! shared by every clone of the handle.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::dep::Dep;

struct ObservableInner<T> {
    value: RefCell<T>,
    dep: Dep,
}

/// A reactive slot holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Observable::new(0);
///
/// // Read the value (tracked)
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T: 'static> Observable<T> {
    /// Create a new observable with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                dep: Dep::new(),
            }),
        }
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.dep.depend();
        f(&self.inner.value.borrow())
    }

    /// Borrow the current value without establishing a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value and notify subscribers.
    ///
    /// Every call notifies, even if the new value equals the old one.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.borrow_mut();
            *guard = value;
        }
        self.inner.dep.notify();
    }

    /// Mutate the value in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut guard = self.inner.value.borrow_mut();
            f(&mut guard);
        }
        self.inner.dep.notify();
    }

    /// The dep owned by this observable.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Get the current value.
    ///
    /// If called while a watcher is collecting dependencies, this also
    /// subscribes that watcher.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: PartialEq + 'static> Observable<T> {
    /// Replace the value, notifying only if it changed.
    ///
    /// Returns whether subscribers were notified.
    pub fn set_if_changed(&self, value: T) -> bool {
        {
            let mut guard = self.inner.value.borrow_mut();
            if *guard == value {
                return false;
            }
            *guard = value;
        }
        self.inner.dep.notify();
        true
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("dep", &self.inner.dep.id())
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.inner.dep.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
