//! Watcher Implementation
//!
//! A Watcher is a subscriber: a computation that re-runs when any observable it
//! read during its last run changes. Render functions, computed properties and
//! user watches are all watchers that differ only in their options.
//!
//! # How Watchers Work
//!
//! 1. `get` pushes the watcher onto the reactive context stack and runs the
//!    getter. Every observable read during the run calls `add_dep`.
//!
//! 2. New subscriptions accumulate in `new_deps`. Once the run completes,
//!    `cleanup_deps` unsubscribes from every dep that was not read again and
//!    swaps the new set in. A dep that is read again is never unsubscribed and
//!    re-subscribed, so a dep's subscriber list only ever changes at the edges.
//!
//! 3. On notification, `update` decides what to do: lazy watchers just mark
//!    themselves dirty, sync watchers run immediately, everything else is
//!    queued on the scheduler.
//!
//! # Teardown
//!
//! `teardown` unsubscribes from every dep and deactivates the watcher. A run
//! that was already queued when the watcher was torn down becomes a no-op.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::subscriber::SubscriberId;
use crate::error::{self, Result};
use crate::instance::{Instance, WeakInstance};
use crate::scheduler;

/// The computation a watcher runs.
pub type Getter = Rc<dyn Fn() -> Result<()>>;

/// Callback invoked after a scheduled run, outside dependency collection.
pub type WatchCallback = Rc<dyn Fn() -> Result<()>>;

/// Hook the scheduler calls right before a queued run.
pub type BeforeRun = Rc<dyn Fn()>;

/// Options controlling how a watcher reacts to notifications.
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Computed-style: only mark dirty on notification, evaluate on demand.
    pub lazy: bool,
    /// Run synchronously on notification instead of queueing.
    pub sync: bool,
    /// Errors are reported as coming from a user-supplied watch.
    pub user: bool,
    /// This is the owner's render watcher.
    pub render: bool,
    /// The component instance owning this watcher.
    pub owner: Option<WeakInstance>,
    /// Called by the scheduler before each queued run.
    pub before: Option<BeforeRun>,
    /// Called after each run, outside dependency collection.
    pub callback: Option<WatchCallback>,
    /// Human readable name used in error reports.
    pub label: Option<String>,
}

impl WatcherOptions {
    /// Options for a lazily evaluated (computed) watcher.
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }

    /// Options for a watcher that re-runs synchronously on every notification.
    pub fn sync() -> Self {
        Self {
            sync: true,
            ..Self::default()
        }
    }

    /// Attach the watcher to a component instance.
    pub fn owned_by(mut self, vm: &Instance) -> Self {
        self.owner = Some(vm.downgrade());
        self
    }

    /// Set the label used in error reports.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the scheduler's pre-run hook.
    pub fn before<F>(mut self, before: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.before = Some(Rc::new(before));
        self
    }

    /// Set the post-run callback.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        self.callback = Some(Rc::new(callback));
        self
    }
}

struct WatcherInner {
    id: SubscriberId,
    label: String,
    getter: Getter,
    callback: Option<WatchCallback>,
    before: Option<BeforeRun>,
    owner: Option<WeakInstance>,
    lazy: bool,
    sync: bool,
    user: bool,
    render: bool,
    dirty: Cell<bool>,
    active: Cell<bool>,
    runs: Cell<usize>,
    deps: RefCell<IndexMap<DepId, Dep>>,
    new_deps: RefCell<IndexMap<DepId, Dep>>,
}

/// A re-runnable computation subscribed to the deps it reads.
///
/// Cloning a `Watcher` yields another handle to the same computation.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

/// Non-owning handle to a watcher, as stored by deps.
#[derive(Clone)]
pub struct WeakWatcher(Weak<WatcherInner>);

impl WeakWatcher {
    /// Upgrade to a strong handle if the watcher is still alive.
    pub fn upgrade(&self) -> Option<Watcher> {
        self.0.upgrade().map(|inner| Watcher { inner })
    }

    /// Whether the watcher is still alive.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Pops the context and reconciles subscriptions when a run ends.
struct Collection<'a> {
    watcher: &'a Watcher,
    _context: ReactiveContext,
}

impl Drop for Collection<'_> {
    fn drop(&mut self) {
        self.watcher.cleanup_deps();
    }
}

impl Watcher {
    /// Create a watcher around `getter`.
    ///
    /// Unless the watcher is lazy, the getter runs immediately to collect the
    /// initial dependencies. A render watcher is registered on its owner before
    /// that first run, so code inside the first render can already reach it.
    pub fn new<F>(getter: F, options: WatcherOptions) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        let id = SubscriberId::new();
        let label = options
            .label
            .unwrap_or_else(|| format!("watcher {}", id));

        let watcher = Self {
            inner: Rc::new(WatcherInner {
                id,
                label,
                getter: Rc::new(getter),
                callback: options.callback,
                before: options.before,
                owner: options.owner,
                lazy: options.lazy,
                sync: options.sync,
                user: options.user,
                render: options.render,
                dirty: Cell::new(options.lazy),
                active: Cell::new(true),
                runs: Cell::new(0),
                deps: RefCell::new(IndexMap::new()),
                new_deps: RefCell::new(IndexMap::new()),
            }),
        };

        if let Some(vm) = watcher.owner() {
            if watcher.inner.render {
                vm.set_render_watcher(watcher.clone());
            }
            vm.push_watcher(watcher.clone());
        }

        if !watcher.inner.lazy {
            watcher.get();
        }

        watcher
    }

    /// Get the watcher's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// The label used in error reports.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Create a non-owning handle.
    pub fn downgrade(&self) -> WeakWatcher {
        WeakWatcher(Rc::downgrade(&self.inner))
    }

    /// Whether two handles refer to the same watcher.
    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The owning component instance, if it is still alive.
    pub fn owner(&self) -> Option<Instance> {
        self.inner.owner.as_ref().and_then(WeakInstance::upgrade)
    }

    /// Run the getter, collecting a fresh set of dependencies.
    ///
    /// Errors returned by the getter are routed to the error reporting path of
    /// the owning instance.
    pub fn get(&self) {
        let result = {
            let _collection = Collection {
                watcher: self,
                _context: ReactiveContext::enter(self),
            };
            let getter = Rc::clone(&self.inner.getter);
            getter()
        };
        self.inner.runs.set(self.inner.runs.get() + 1);

        if let Err(err) = result {
            let info = format!("getter for {}", self.inner.label);
            error::handle_error(&err, self.owner().as_ref(), &info);
        }
    }

    /// Subscribe to `dep` as part of the current run.
    pub fn add_dep(&self, dep: &Dep) {
        if !self.inner.active.get() {
            return;
        }
        let id = dep.id();
        let fresh = {
            let mut new_deps = self.inner.new_deps.borrow_mut();
            if new_deps.contains_key(&id) {
                false
            } else {
                new_deps.insert(id, dep.clone());
                true
            }
        };
        if fresh && !self.inner.deps.borrow().contains_key(&id) {
            tracing::trace!(watcher = %self.id(), dep = id.raw(), "subscribe");
            dep.add_sub(self);
        }
    }

    /// Drop subscriptions that the last run no longer read.
    fn cleanup_deps(&self) {
        let collected = std::mem::take(&mut *self.inner.new_deps.borrow_mut());
        let previous = std::mem::replace(&mut *self.inner.deps.borrow_mut(), collected);
        let current = self.inner.deps.borrow();
        for (id, dep) in previous {
            if !current.contains_key(&id) {
                tracing::trace!(watcher = %self.id(), dep = id.raw(), "unsubscribe");
                dep.remove_sub(self.id());
            }
        }
    }

    /// React to a dependency change.
    pub fn update(&self) {
        if self.inner.lazy {
            self.inner.dirty.set(true);
        } else if self.inner.sync {
            self.run();
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Re-run the computation. Does nothing once torn down.
    pub fn run(&self) {
        if !self.inner.active.get() {
            return;
        }
        self.get();

        if let Some(callback) = self.inner.callback.clone() {
            let _quiet = ReactiveContext::untracked();
            if let Err(err) = callback() {
                let info = format!("callback for {}", self.inner.label);
                error::handle_error(&err, self.owner().as_ref(), &info);
            }
        }
    }

    /// Invoke the scheduler's pre-run hook, if any.
    pub fn run_before(&self) {
        if let Some(before) = self.inner.before.clone() {
            before();
        }
    }

    /// Re-run a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) {
        self.get();
        self.inner.dirty.set(false);
    }

    /// Make the watcher currently collecting depend on everything this one
    /// depends on.
    pub fn depend(&self) {
        let deps: Vec<Dep> = self.inner.deps.borrow().values().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from all deps and stop reacting to notifications.
    pub fn teardown(&self) {
        if !self.inner.active.get() {
            return;
        }
        if let Some(vm) = self.owner() {
            // The owner clears its whole list when it is being destroyed.
            if !vm.is_being_destroyed() {
                vm.remove_watcher(self.id());
            }
        }
        let deps = std::mem::take(&mut *self.inner.deps.borrow_mut());
        for dep in deps.values() {
            dep.remove_sub(self.id());
        }
        self.inner.new_deps.borrow_mut().clear();
        self.inner.active.set(false);
        tracing::trace!(watcher = %self.id(), "teardown");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn is_lazy(&self) -> bool {
        self.inner.lazy
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_user(&self) -> bool {
        self.inner.user
    }

    pub fn is_render(&self) -> bool {
        self.inner.render
    }

    /// Number of times the getter has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Number of deps subscribed to after the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Ids of the deps subscribed to after the last run.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.inner.deps.borrow().keys().copied().collect()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id())
            .field("label", &self.inner.label)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
