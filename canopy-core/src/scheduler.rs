//! Update Scheduler
//!
//! The scheduler batches watcher re-runs so that any number of writes within
//! one synchronous turn cause at most one re-run per watcher.
//!
//! # Algorithm
//!
//! 1. `queue_watcher` records a watcher once per flush (deduplicated by id).
//! 2. The host ends the turn with [`flush`]. The queue is sorted by subscriber
//!    id, which orders parents before children and user watchers before the
//!    render watcher of the same instance.
//! 3. Each watcher's `before` hook runs, then the watcher itself. Watchers
//!    queued while the flush is in progress are inserted after the one that is
//!    currently running, at their id position.
//! 4. A watcher that runs more than `Config::max_update_count` times within a
//!    single flush aborts the flush with a warning. Watchers never re-queue
//!    themselves directly (see `Dep::notify`), so this bounds cycles that pass
//!    through several watchers.
//! 5. After the queue drains, instances whose activation was deferred during
//!    patching get their `activated` hooks, then every instance whose render
//!    watcher ran gets `updated`, children first.
//!
//! With `Config::async_flush` disabled, the first queued watcher triggers the
//! flush immediately.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::config;
use crate::error;
use crate::instance::{lifecycle, Instance, LifecycleHook};
use crate::reactive::{SubscriberId, Watcher};

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    activated_children: Vec<Instance>,
    has: HashSet<SubscriberId>,
    circular: HashMap<SubscriberId, usize>,
    waiting: bool,
    flushing: bool,
    index: usize,
    callbacks: Vec<Box<dyn FnOnce()>>,
}

impl SchedulerState {
    fn reset(&mut self) -> (Vec<Instance>, Vec<Watcher>) {
        let activated = std::mem::take(&mut self.activated_children);
        let flushed = std::mem::take(&mut self.queue);
        self.has.clear();
        self.circular.clear();
        self.index = 0;
        self.waiting = false;
        self.flushing = false;
        (activated, flushed)
    }
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Queue a watcher for the next flush.
///
/// Watchers already in the queue are skipped, unless they already ran in the
/// current flush.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let flush_now = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.insert(id) {
            return false;
        }

        if !state.flushing {
            state.queue.push(watcher);
        } else {
            // Already flushing: splice in by id, never before the running one.
            let mut i = state.queue.len();
            while i > state.index + 1 && state.queue[i - 1].id() > id {
                i -= 1;
            }
            state.queue.insert(i, watcher);
        }
        tracing::trace!(watcher = %id, "queued");

        if state.waiting {
            return false;
        }
        state.waiting = true;
        !config::async_flush()
    });

    if flush_now {
        flush_scheduler_queue();
    }
}

/// Queue an instance whose activation must wait until patching completes.
pub fn queue_activated_component(vm: Instance) {
    // Mark inactive now so the patch in progress can rely on the flag.
    vm.set_inactive(Some(false));
    SCHEDULER.with(|state| state.borrow_mut().activated_children.push(vm));
}

/// Run `callback` at the end of the next flush.
pub fn next_tick<F>(callback: F)
where
    F: FnOnce() + 'static,
{
    SCHEDULER.with(|state| state.borrow_mut().callbacks.push(Box::new(callback)));
}

/// End the current turn: run every queued watcher, then the tick callbacks.
///
/// Callbacks may queue more work; flushing repeats until nothing is pending.
pub fn flush() {
    loop {
        let waiting = SCHEDULER.with(|state| {
            let state = state.borrow();
            (state.waiting || !state.activated_children.is_empty()) && !state.flushing
        });
        if waiting {
            flush_scheduler_queue();
        }

        let callbacks = SCHEDULER.with(|state| std::mem::take(&mut state.borrow_mut().callbacks));
        if callbacks.is_empty() {
            break;
        }
        for callback in callbacks {
            callback();
        }
    }
}

/// Whether watchers, deferred activations or callbacks are waiting for a
/// flush.
pub fn has_pending() -> bool {
    SCHEDULER.with(|state| {
        let state = state.borrow();
        !state.queue.is_empty() || !state.activated_children.is_empty() || !state.callbacks.is_empty()
    })
}

/// Ids of the watchers currently queued, in flush order.
pub fn queued_ids() -> Vec<SubscriberId> {
    SCHEDULER.with(|state| state.borrow().queue.iter().map(Watcher::id).collect())
}

/// Whether a flush is in progress.
pub fn is_flushing() -> bool {
    SCHEDULER.with(|state| state.borrow().flushing)
}

fn flush_scheduler_queue() {
    SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = true;
        state.index = 0;
        state.queue.sort_by_key(Watcher::id);
        tracing::trace!(queued = state.queue.len(), "flush");
    });

    let max_updates = config::with(|config| config.max_update_count);

    loop {
        let next = SCHEDULER.with(|state| {
            let state = state.borrow();
            state.queue.get(state.index).cloned()
        });
        let Some(watcher) = next else {
            break;
        };
        let id = watcher.id();

        watcher.run_before();
        SCHEDULER.with(|state| state.borrow_mut().has.remove(&id));
        watcher.run();

        let looping = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            *count > max_updates
        });
        if looping {
            let message = format!("You may have an infinite update loop in {}", watcher.label());
            error::warn(&message, watcher.owner().as_ref());
            break;
        }

        SCHEDULER.with(|state| state.borrow_mut().index += 1);
    }

    let (activated, flushed) = SCHEDULER.with(|state| state.borrow_mut().reset());

    call_activated_hooks(activated);
    call_updated_hooks(&flushed);
}

fn call_activated_hooks(queue: Vec<Instance>) {
    for vm in queue {
        vm.set_inactive(Some(true));
        lifecycle::activate_child_component(&vm, true);
    }
}

fn call_updated_hooks(queue: &[Watcher]) {
    for watcher in queue.iter().rev() {
        let Some(vm) = watcher.owner() else {
            continue;
        };
        let is_render = vm
            .render_watcher()
            .is_some_and(|render| render.ptr_eq(watcher));
        if is_render && vm.is_mounted() && !vm.is_destroyed() {
            lifecycle::call_hook(&vm, LifecycleHook::Updated);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Observable, WatcherOptions};
    use std::cell::Cell;
    use std::rc::Rc;

    fn queued_reader(source: &Observable<i32>, runs: Rc<Cell<usize>>) -> Watcher {
        let source = source.clone();
        Watcher::new(
            move || {
                source.get();
                runs.set(runs.get() + 1);
                Ok(())
            },
            WatcherOptions::default(),
        )
    }

    #[test]
    fn writes_in_one_turn_coalesce() {
        let source = Observable::new(0);
        let runs = Rc::new(Cell::new(0));
        let watcher = queued_reader(&source, runs.clone());

        source.set(1);
        source.set(2);
        source.set(3);
        assert_eq!(runs.get(), 1);
        assert_eq!(queued_ids(), vec![watcher.id()]);

        flush();
        assert_eq!(runs.get(), 2);
        assert!(!has_pending());
    }

    #[test]
    fn flush_orders_by_subscriber_id() {
        let source = Observable::new(0);
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        let make = |name: &'static str| {
            let (s, o) = (source.clone(), order.clone());
            Watcher::new(
                move || {
                    s.get();
                    o.borrow_mut().push(name);
                    Ok(())
                },
                WatcherOptions::default(),
            )
        };
        let first = make("first");
        let second = make("second");
        order.borrow_mut().clear();

        // Queue in reverse order.
        second.update();
        first.update();
        flush();

        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn torn_down_watcher_in_queue_is_skipped() {
        let source = Observable::new(0);
        let runs = Rc::new(Cell::new(0));
        let watcher = queued_reader(&source, runs.clone());

        source.set(1);
        watcher.teardown();
        flush();

        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn next_tick_runs_after_watchers() {
        let source = Observable::new(0);
        let runs = Rc::new(Cell::new(0));
        let _watcher = queued_reader(&source, runs.clone());

        let observed = Rc::new(Cell::new(0));
        let (r, o) = (runs.clone(), observed.clone());
        source.set(1);
        next_tick(move || o.set(r.get()));
        flush();

        assert_eq!(observed.get(), 2);
    }

    #[test]
    fn circular_updates_are_bounded() {
        let max_updates = 5;
        config::update(|config| config.max_update_count = max_updates);
        let a = Observable::new(0);
        let b = Observable::new(0);

        let (a1, b1) = (a.clone(), b.clone());
        let ping = Watcher::new(
            move || {
                let value = a1.get();
                b1.set(value + 1);
                Ok(())
            },
            WatcherOptions::default(),
        );
        let (a2, b2) = (a.clone(), b.clone());
        let _pong = Watcher::new(
            move || {
                let value = b2.get();
                a2.set(value + 1);
                Ok(())
            },
            WatcherOptions::default(),
        );
        let warnings = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = warnings.clone();
        config::set_warn_handler(Some(Rc::new(move |msg: &str, _vm: Option<&Instance>| {
            sink.borrow_mut().push(msg.to_string());
        })));

        let before = ping.run_count();
        flush();
        config::set_warn_handler(None);
        config::set(config::Config::default());

        assert_eq!(ping.run_count() - before, max_updates + 1);
        assert_eq!(warnings.borrow().len(), 1);
        assert!(warnings.borrow()[0].contains("infinite update loop"));
        assert!(!has_pending());
    }

    #[test]
    fn deferred_activation_is_pending_until_flushed() {
        let activated = Rc::new(Cell::new(0));
        let count = activated.clone();
        let vm = Instance::new(
            crate::instance::ComponentOptions::builder()
                .hook(LifecycleHook::Activated, move |_| {
                    count.set(count.get() + 1);
                    Ok(())
                })
                .build(),
            crate::instance::InstanceInit::root(),
        );

        queue_activated_component(vm.clone());
        assert!(has_pending());

        flush();
        assert!(!has_pending());
        assert_eq!(activated.get(), 1);
        assert_eq!(vm.inactive(), Some(false));
    }

    #[test]
    fn sync_config_flushes_immediately() {
        config::update(|config| config.async_flush = false);
        let source = Observable::new(0);
        let runs = Rc::new(Cell::new(0));
        let _watcher = queued_reader(&source, runs.clone());

        source.set(1);
        config::set(config::Config::default());

        assert_eq!(runs.get(), 2);
    }
}
