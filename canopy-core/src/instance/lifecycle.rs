//! Instance Lifecycle
//!
//! Mounting, updating, activation and destruction of component instances.
//!
//! # The active instance
//!
//! While an instance renders or patches, it is the *active instance*. Child
//! instances created from placeholders during that time take it as their
//! parent. [`ActiveInstanceGuard`] saves the previous active instance and
//! restores it when dropped, including while unwinding.
//!
//! # Activation
//!
//! Instances inside a kept-alive subtree are deactivated instead of destroyed.
//! `direct_inactive` records that an instance was deactivated on its own
//! account; such an instance is not re-activated by an ancestor's activation.
//! An instance below an inactive ancestor cannot be activated directly.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

use super::{events, render, Instance, LifecycleHook};
use crate::error::{self, format_component_name};
use crate::reactive::{ReactiveContext, Watcher, WatcherOptions};
use crate::vdom::{patch, Listeners, VNodeRef};

thread_local! {
    static ACTIVE_INSTANCE: RefCell<Option<Instance>> = const { RefCell::new(None) };
}

/// The instance currently rendering or patching.
pub fn active_instance() -> Option<Instance> {
    ACTIVE_INSTANCE.with(|active| active.borrow().clone())
}

/// Makes an instance the active instance for the guard's lifetime.
pub struct ActiveInstanceGuard {
    previous: Option<Instance>,
}

impl ActiveInstanceGuard {
    pub fn enter(vm: &Instance) -> Self {
        let previous = ACTIVE_INSTANCE.with(|active| active.replace(Some(vm.clone())));
        Self { previous }
    }
}

impl Drop for ActiveInstanceGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_INSTANCE.with(|active| *active.borrow_mut() = previous);
    }
}

/// Link a new instance into the instance tree.
pub(crate) fn init_lifecycle(vm: &Instance, parent: Option<Instance>) {
    let Some(mut parent) = parent else {
        return;
    };

    if vm.options().is_abstract {
        parent.push_abstract_child(vm);
    } else {
        while parent.options().is_abstract {
            match parent.parent() {
                Some(up) => parent = up,
                None => break,
            }
        }
        parent.push_child(vm);
    }
    vm.set_parent(Some(&parent));
}

/// Run the callbacks registered for `hook`, then emit `hook:<name>`.
///
/// Callbacks run untracked. A failing callback is reported and the remaining
/// ones still run.
pub fn call_hook(vm: &Instance, hook: LifecycleHook) {
    let _quiet = ReactiveContext::untracked();
    let info = format!("{} hook", hook.name());
    for callback in vm.options().hooks_for(hook) {
        let callback = Rc::clone(callback);
        error::invoke_with_error_handling(|| callback(vm), Some(vm), &info);
    }
    if events::has_hook_event(vm) {
        vm.emit(&format!("hook:{}", hook.name()), &[]);
    }
}

/// Set up the render watcher. Its first run renders and patches
/// synchronously.
pub(crate) fn mount_component(vm: &Instance) {
    if vm.options().render.is_none() {
        error::warn(
            "Failed to mount component: template or render function not defined.",
            Some(vm),
        );
    }
    call_hook(vm, LifecycleHook::BeforeMount);

    let render_vm = vm.downgrade();
    let before_vm = vm.downgrade();
    let options = WatcherOptions {
        render: true,
        ..WatcherOptions::default()
    }
    .owned_by(vm)
    .label(format!("render watcher for {}", format_component_name(Some(vm))))
    .before(move || {
        if let Some(vm) = before_vm.upgrade() {
            if vm.is_mounted() && !vm.is_destroyed() {
                call_hook(&vm, LifecycleHook::BeforeUpdate);
            }
        }
    });

    Watcher::new(
        move || {
            if let Some(vm) = render_vm.upgrade() {
                let vnode = vm.render();
                vm.update(vnode);
            }
            Ok(())
        },
        options,
    );

    // Component instances are marked mounted by their placeholder's insert
    // hook; a root has no placeholder.
    if vm.placeholder().is_none() {
        vm.set_mounted();
        tracing::debug!(uid = vm.uid(), "mounted");
        call_hook(vm, LifecycleHook::Mounted);
    }
}

/// Patch `vnode` against the instance's previous tree.
pub(crate) fn update(vm: &Instance, vnode: VNodeRef) {
    let previous = vm.replace_vnode(Some(Rc::clone(&vnode)));
    let _active = ActiveInstanceGuard::enter(vm);
    match previous {
        None => patch::patch(None, Some(&vnode)),
        Some(previous) => patch::patch(Some(&previous), Some(&vnode)),
    }
}

/// Tear down an instance. Re-entrant and repeated calls are no-ops.
pub(crate) fn destroy(vm: &Instance) {
    if vm.is_being_destroyed() {
        return;
    }
    call_hook(vm, LifecycleHook::BeforeDestroy);
    vm.inner.is_being_destroyed.set(true);
    tracing::debug!(uid = vm.uid(), "destroy");

    if let Some(parent) = vm.parent() {
        if !parent.is_being_destroyed() {
            parent.remove_child(vm);
        }
    }

    for watcher in vm.take_watchers() {
        watcher.teardown();
    }
    vm.data().release_vm();
    vm.inner.is_destroyed.set(true);

    let current = vm.vnode();
    {
        let _active = ActiveInstanceGuard::enter(vm);
        patch::patch(current.as_ref(), None);
    }

    // Children the teardown pass did not reach, such as cached instances
    // outside the tree, go with their parent.
    for child in vm.take_children() {
        child.destroy();
    }

    call_hook(vm, LifecycleHook::Destroyed);
    vm.off(None, None);

    if let Some(root) = vm.vnode() {
        root.set_parent(None);
    }
    if let Some(placeholder) = vm.placeholder() {
        placeholder.set_parent(None);
    }
}

/// Push a new placeholder's data into an existing child instance.
///
/// A re-render is forced when static slot content is involved (old or new),
/// or when scoped slots may have changed: unstable on either side, or a
/// different slot key.
pub fn update_child_component(
    vm: &Instance,
    props_data: &Map<String, Value>,
    listeners: &Listeners,
    parent_vnode: &VNodeRef,
    render_children: Option<Vec<VNodeRef>>,
) {
    let new_scoped = parent_vnode.data().and_then(|data| data.scoped_slots.clone());
    let old_scoped = vm.inner.scoped_slots.borrow().clone();
    let has_dynamic_scoped_slot = new_scoped.as_ref().is_some_and(|s| !s.stable)
        || old_scoped.as_ref().is_some_and(|s| !s.stable)
        || new_scoped.as_ref().and_then(|s| s.key.as_ref())
            != old_scoped.as_ref().and_then(|s| s.key.as_ref());

    let needs_force_update = render_children.is_some()
        || vm.inner.render_children.borrow().is_some()
        || has_dynamic_scoped_slot;

    vm.set_placeholder(Some(Rc::clone(parent_vnode)));
    if let Some(root) = vm.vnode() {
        root.set_parent(Some(Rc::clone(parent_vnode)));
    }
    *vm.inner.render_children.borrow_mut() = render_children.clone();

    let attrs = parent_vnode
        .data()
        .map(|data| data.attrs.clone())
        .unwrap_or_default();
    vm.attrs_field().set_if_changed(attrs);

    let old_listeners = vm.inner.parent_listeners.replace(listeners.clone());
    events::update_component_listeners(vm, listeners, Some(&old_listeners));

    for key in &vm.options().props {
        if let Some(prop) = vm.prop_field(key) {
            let value = props_data.get(key).cloned().unwrap_or(Value::Null);
            prop.set_if_changed(value);
        }
    }

    if needs_force_update {
        render::resolve_slots(vm, render_children.as_deref());
        vm.force_update();
    }
}

fn is_in_inactive_tree(vm: &Instance) -> bool {
    let mut current = vm.parent();
    while let Some(parent) = current {
        if parent.inactive() == Some(true) {
            return true;
        }
        current = parent.parent();
    }
    false
}

/// Activate `vm` and its descendants. `direct` marks a request made for
/// `vm` itself rather than inherited from an ancestor.
pub fn activate_child_component(vm: &Instance, direct: bool) {
    if direct {
        vm.set_direct_inactive(false);
        if is_in_inactive_tree(vm) {
            return;
        }
    } else if vm.is_direct_inactive() {
        return;
    }

    if vm.inactive() != Some(false) {
        vm.set_inactive(Some(false));
        tracing::debug!(uid = vm.uid(), direct, "activate");
        for child in vm.children() {
            activate_child_component(&child, false);
        }
        call_hook(vm, LifecycleHook::Activated);
    }
}

/// Deactivate `vm` and its descendants.
pub fn deactivate_child_component(vm: &Instance, direct: bool) {
    if direct {
        vm.set_direct_inactive(true);
        if is_in_inactive_tree(vm) {
            return;
        }
    }

    if vm.inactive() != Some(true) {
        vm.set_inactive(Some(true));
        tracing::debug!(uid = vm.uid(), direct, "deactivate");
        for child in vm.children() {
            deactivate_child_component(&child, false);
        }
        call_hook(vm, LifecycleHook::Deactivated);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
