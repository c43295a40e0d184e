//! Instance events: `on`, `once`, `off` and `emit`.
//!
//! Listeners that a parent attaches through a placeholder's `on` data are
//! registered here as well, and reconciled whenever the parent re-renders.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::Instance;
use crate::error::{self, Result};
use crate::vdom::{Listener, Listeners};

type ListenerFn = dyn Fn(&Instance, &[Value]) -> Result<()>;

const HOOK_EVENT_PREFIX: &str = "hook:";

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

pub(crate) fn init_events(vm: &Instance) {
    let listeners = vm
        .placeholder()
        .and_then(|node| node.component_options().map(|o| o.listeners.clone()));
    if let Some(listeners) = listeners {
        update_component_listeners(vm, &listeners, None);
        *vm.inner.parent_listeners.borrow_mut() = listeners;
    }
}

/// Swap the listeners a parent attached: drop the ones from `old` that are
/// not in `new`, add the ones from `new` that are not in `old`.
pub(crate) fn update_component_listeners(vm: &Instance, new: &Listeners, old: Option<&Listeners>) {
    if let Some(old) = old {
        for (event, handlers) in old {
            for handler in handlers {
                let kept = new
                    .get(event)
                    .is_some_and(|list| list.iter().any(|h| same_listener(h, handler)));
                if !kept {
                    vm.off(Some(event), Some(handler));
                }
            }
        }
    }
    for (event, handlers) in new {
        for handler in handlers {
            let present = old
                .and_then(|old| old.get(event))
                .is_some_and(|list| list.iter().any(|h| same_listener(h, handler)));
            if !present {
                vm.on_shared(event, Rc::clone(handler));
            }
        }
    }
}

pub(crate) fn has_hook_event(vm: &Instance) -> bool {
    vm.inner.has_hook_event.get()
}

impl Instance {
    /// Listen for `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> Listener
    where
        F: Fn(&Instance, &[Value]) -> Result<()> + 'static,
    {
        let listener: Listener = Rc::new(listener);
        self.on_shared(event, Rc::clone(&listener));
        listener
    }

    /// Listen for `event` with an already shared listener.
    pub fn on_shared(&self, event: &str, listener: Listener) {
        self.inner
            .events
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(listener);
        if event.starts_with(HOOK_EVENT_PREFIX) {
            self.inner.has_hook_event.set(true);
        }
    }

    /// Listen for the next `event` only.
    pub fn once<F>(&self, event: &str, listener: F) -> Listener
    where
        F: Fn(&Instance, &[Value]) -> Result<()> + 'static,
    {
        let me: Rc<RefCell<Option<Weak<ListenerFn>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&me);
        let name = event.to_string();
        let wrapper: Listener = Rc::new(move |vm: &Instance, args: &[Value]| {
            let me = slot.borrow().as_ref().and_then(Weak::upgrade);
            if let Some(me) = me {
                vm.off(Some(&name), Some(&me));
            }
            listener(vm, args)
        });
        *me.borrow_mut() = Some(Rc::downgrade(&wrapper));
        self.on_shared(event, Rc::clone(&wrapper));
        wrapper
    }

    /// Remove listeners.
    ///
    /// Without an event, every listener goes. Without a listener, every
    /// listener for the event goes.
    pub fn off(&self, event: Option<&str>, listener: Option<&Listener>) {
        let mut events = self.inner.events.borrow_mut();
        match (event, listener) {
            (None, _) => events.clear(),
            (Some(event), None) => {
                events.shift_remove(event);
            }
            (Some(event), Some(listener)) => {
                if let Some(list) = events.get_mut(event) {
                    if let Some(pos) = list.iter().position(|l| same_listener(l, listener)) {
                        list.remove(pos);
                    }
                }
            }
        }
    }

    /// Call every listener for `event`. A failing listener is reported and
    /// the rest still run.
    pub fn emit(&self, event: &str, args: &[Value]) {
        let listeners = self.inner.events.borrow().get(event).cloned();
        let Some(listeners) = listeners else {
            return;
        };
        let info = format!("event handler for \"{}\"", event);
        for listener in listeners {
            error::invoke_with_error_handling(|| listener(self, args), Some(self), &info);
        }
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.events.borrow().get(event).map_or(0, Vec::len)
    }
}
