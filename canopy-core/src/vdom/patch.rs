//! Patching
//!
//! The diff algorithm is a collaborator, not part of the runtime: whatever
//! implements [`Patch`] decides how trees map onto a real output. It only has
//! to call the node hooks at the right points:
//!
//! - `init` when a node is created
//! - `prepatch` when a node replaces an equivalent old node
//! - `insert` once the tree containing a new node is committed
//! - `destroy` when a node is removed
//!
//! [`TreePatcher`] is the built-in implementation. It keeps no output of its
//! own and only walks the trees to drive the hooks, which is all that
//! headless hosts and tests need.
//!
//! # Insert queue
//!
//! Nodes with `insert` hooks are queued while a tree is created and the queue
//! is flushed when the patch ends. When the patched tree is a component's
//! first tree, the queue is parked on the component's placeholder instead and
//! picked up by the patch that inserts that placeholder, so insert hooks run
//! children first and only once the whole tree is in place.

use std::cell::RefCell;
use std::rc::Rc;

use super::hooks;
use super::vnode::{VNode, VNodeRef};

/// Applies a new tree against an old one.
pub trait Patch {
    /// `old == None` creates `new`; `new == None` tears `old` down.
    fn patch(&self, old: Option<&VNodeRef>, new: Option<&VNodeRef>);
}

thread_local! {
    static PATCHER: RefCell<Rc<dyn Patch>> = RefCell::new(Rc::new(TreePatcher));
}

/// Replace the patcher used by every instance on this thread.
pub fn set_patcher(patcher: Rc<dyn Patch>) {
    PATCHER.with(|current| *current.borrow_mut() = patcher);
}

/// Patch with the current patcher.
pub fn patch(old: Option<&VNodeRef>, new: Option<&VNodeRef>) {
    let patcher = PATCHER.with(|current| Rc::clone(&current.borrow()));
    patcher.patch(old, new);
}

/// Structural patcher that drives node hooks without producing output.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreePatcher;

impl Patch for TreePatcher {
    fn patch(&self, old: Option<&VNodeRef>, new: Option<&VNodeRef>) {
        match (old, new) {
            (None, None) => {}
            (Some(old), None) => invoke_destroy_hook(old),
            (None, Some(new)) => {
                let mut queue = Vec::new();
                create_elm(new, &mut queue);
                invoke_insert_hook(new, queue, true);
            }
            (Some(old), Some(new)) => {
                let mut queue = Vec::new();
                if same_vnode(old, new) {
                    patch_vnode(old, new, &mut queue);
                } else {
                    create_elm(new, &mut queue);
                    invoke_destroy_hook(old);
                }
                invoke_insert_hook(new, queue, false);
            }
        }
    }
}

/// Whether `new` can be patched in place of `old`.
pub fn same_vnode(a: &VNode, b: &VNode) -> bool {
    a.key() == b.key()
        && a.tag() == b.tag()
        && a.is_comment() == b.is_comment()
        && a.data().is_some() == b.data().is_some()
}

fn create_elm(node: &VNodeRef, queue: &mut Vec<VNodeRef>) {
    if create_component(node, queue) {
        return;
    }
    for child in node.children().into_iter().flatten() {
        create_elm(child, queue);
    }
    if node.data().is_some_and(|data| data.hook.has_insert()) {
        queue.push(Rc::clone(node));
    }
}

/// Run `init`; report whether it produced a component instance.
fn create_component(node: &VNodeRef, queue: &mut Vec<VNodeRef>) -> bool {
    let Some(data) = node.data() else {
        return false;
    };
    if data.hook.has_init() {
        hooks::invoke_init(node);
    }
    if node.component_instance().is_none() {
        return false;
    }
    queue.extend(node.take_pending_insert());
    if data.hook.has_insert() {
        queue.push(Rc::clone(node));
    }
    true
}

fn patch_vnode(old: &VNodeRef, new: &VNodeRef, queue: &mut Vec<VNodeRef>) {
    if Rc::ptr_eq(old, new) {
        return;
    }
    if new.data().is_some_and(|data| data.hook.has_prepatch()) {
        hooks::invoke_prepatch(old, new);
    }
    if new.is_component() {
        return;
    }

    match (old.children(), new.children()) {
        (Some(old_children), Some(new_children)) => update_children(old_children, new_children, queue),
        (None, Some(new_children)) => {
            for child in new_children {
                create_elm(child, queue);
            }
        }
        (Some(old_children), None) => {
            for child in old_children {
                invoke_destroy_hook(child);
            }
        }
        (None, None) => {}
    }
}

fn update_children(old: &[VNodeRef], new: &[VNodeRef], queue: &mut Vec<VNodeRef>) {
    let mut used = vec![false; old.len()];
    for child in new {
        let matched = old.iter().enumerate().position(|(i, candidate)| {
            !used[i] && same_vnode(candidate, child)
        });
        match matched {
            Some(i) => {
                used[i] = true;
                patch_vnode(&old[i], child, queue);
            }
            None => create_elm(child, queue),
        }
    }
    for (i, child) in old.iter().enumerate() {
        if !used[i] {
            invoke_destroy_hook(child);
        }
    }
}

fn invoke_destroy_hook(node: &VNodeRef) {
    if node.data().is_some_and(|data| data.hook.has_destroy()) {
        hooks::invoke_destroy(node);
    }
    for child in node.children().into_iter().flatten() {
        invoke_destroy_hook(child);
    }
}

fn invoke_insert_hook(root: &VNodeRef, queue: Vec<VNodeRef>, initial: bool) {
    if initial {
        if let Some(placeholder) = root.parent() {
            placeholder.set_pending_insert(queue);
            return;
        }
    }
    for node in queue {
        hooks::invoke_insert(&node);
    }
}
