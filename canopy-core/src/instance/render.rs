//! Rendering an instance into a virtual tree.

use std::rc::Rc;

use indexmap::IndexMap;

use super::{ActiveInstanceGuard, Instance};
use crate::error;
use crate::vdom::{Factory, ScopedSlots, VNode, VNodeRef};

const DEFAULT_SLOT: &str = "default";

pub(crate) fn init_render(vm: &Instance) {
    let children = vm
        .placeholder()
        .and_then(|node| node.component_options().and_then(|o| o.children.clone()));
    resolve_slots(vm, children.as_deref());
    *vm.inner.render_children.borrow_mut() = children;
}

/// Group static slot content by slot name.
///
/// Nodes name their slot through `VNodeData::slot`; the rest go to
/// `default`. Groups made only of comments and whitespace are dropped.
pub(crate) fn resolve_slots(vm: &Instance, children: Option<&[VNodeRef]>) {
    *vm.inner.slots.borrow_mut() = group_slots(children);
}

pub(crate) fn group_slots(children: Option<&[VNodeRef]>) -> IndexMap<String, Vec<VNodeRef>> {
    let mut slots: IndexMap<String, Vec<VNodeRef>> = IndexMap::new();
    for child in children.into_iter().flatten() {
        let name = child
            .data()
            .and_then(|data| data.slot.clone())
            .unwrap_or_else(|| DEFAULT_SLOT.to_string());
        slots.entry(name).or_default().push(Rc::clone(child));
    }
    slots.retain(|_, nodes| !nodes.iter().all(|node| is_whitespace(node)));
    slots
}

fn is_whitespace(node: &VNode) -> bool {
    node.is_comment()
        || (node.tag().is_none() && node.text_content().is_some_and(|t| t.trim().is_empty()))
}

impl Instance {
    /// Run the render function and return the new tree.
    ///
    /// A missing render function renders an empty node. A failing one is
    /// reported and the previous tree (or an empty node) is returned, so the
    /// next patch leaves the instance as it was.
    pub fn render(&self) -> VNodeRef {
        let placeholder = self.placeholder();
        if let Some(node) = &placeholder {
            *self.inner.scoped_slots.borrow_mut() =
                node.data().and_then(|data| data.scoped_slots.clone());
        }

        let result = {
            let _active = ActiveInstanceGuard::enter(self);
            match self.options().render.clone() {
                Some(render) => render(&Factory::new(self)),
                None => Ok(VNode::empty()),
            }
        };

        let vnode = match result {
            Ok(vnode) => vnode,
            Err(err) => {
                error::handle_error(&err, Some(self), "render");
                self.vnode().unwrap_or_else(VNode::empty)
            }
        };
        vnode.set_parent(placeholder);
        vnode
    }

    /// Static slot content passed by the parent.
    pub fn slot(&self, name: &str) -> Option<Vec<VNodeRef>> {
        self.inner.slots.borrow().get(name).cloned()
    }

    /// Names of the non-empty static slots.
    pub fn slot_names(&self) -> Vec<String> {
        self.inner.slots.borrow().keys().cloned().collect()
    }

    /// Scoped slots passed by the parent's current placeholder.
    pub fn scoped_slots(&self) -> Option<ScopedSlots> {
        self.inner.scoped_slots.borrow().clone()
    }

    /// Static slot content the current placeholder carries.
    pub fn render_children(&self) -> Option<Vec<VNodeRef>> {
        self.inner.render_children.borrow().clone()
    }
}
