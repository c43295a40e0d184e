//! Reactive Context
//!
//! The reactive context tracks which computation is currently collecting
//! dependencies. When an observable is read, the watcher on top of this stack
//! subscribes to it.
//!
//! # Implementation
//!
//! We use a thread-local stack of watchers. Entering a context pushes, and the
//! returned guard pops when dropped. Because the pop lives in `Drop`, the stack
//! is restored on every exit path, including a panic unwinding through a render
//! function.
//!
//! An entry may also be empty. Lifecycle callbacks run inside an untracked
//! context so that reads they perform never subscribe the watcher that happens
//! to be running underneath them.

use std::cell::RefCell;

use super::subscriber::SubscriberId;
use super::watcher::Watcher;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given watcher.
    ///
    /// While this context is active, any observable that is read will register
    /// the watcher as a subscriber.
    pub fn enter(watcher: &Watcher) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Some(watcher.clone())));
        Self {
            subscriber_id: Some(watcher.id()),
        }
    }

    /// Enter a context in which reads are not tracked.
    pub fn untracked() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(None));
        Self {
            subscriber_id: None,
        }
    }

    /// Check if a watcher is currently collecting dependencies.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the watcher on top of the stack, if any.
    pub fn current() -> Option<Watcher> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.as_ref().map(Watcher::id))
        })
    }

    /// Number of entries on the stack, tracked or not.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.as_ref().map(Watcher::id),
                    self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}",
                    self.subscriber_id
                );
            }
        });
    }
}
