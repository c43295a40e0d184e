//! Virtual Node Hooks
//!
//! A node carries four hook lists, one per point of the patch algorithm:
//!
//! - `init`: the node is about to be created
//! - `prepatch`: the node replaces an equivalent old node
//! - `insert`: the node's subtree was committed
//! - `destroy`: the node was removed
//!
//! Several sources can contribute hooks to the same node. Their callbacks are
//! kept in order and each one runs, rather than one replacing another. The
//! component management hooks always come first.
//!
//! A failing hook is reported through the error path of the node's context
//! instance; the remaining hooks still run.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::create_component;
use super::vnode::VNodeRef;
use crate::error::{self, Result};

/// Hook receiving one node.
pub type NodeHook = Rc<dyn Fn(&VNodeRef) -> Result<()>>;

/// Hook receiving the old and the new node.
pub type PatchHook = Rc<dyn Fn(&VNodeRef, &VNodeRef) -> Result<()>>;

type HookList<H> = SmallVec<[H; 2]>;

/// Ordered hook lists for one node.
#[derive(Clone, Default)]
pub struct VNodeHooks {
    init: HookList<NodeHook>,
    prepatch: HookList<PatchHook>,
    insert: HookList<NodeHook>,
    destroy: HookList<NodeHook>,
    component_installed: bool,
}

impl VNodeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VNodeRef) -> Result<()> + 'static,
    {
        self.init.push(Rc::new(hook));
        self
    }

    pub fn on_prepatch<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VNodeRef, &VNodeRef) -> Result<()> + 'static,
    {
        self.prepatch.push(Rc::new(hook));
        self
    }

    pub fn on_insert<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VNodeRef) -> Result<()> + 'static,
    {
        self.insert.push(Rc::new(hook));
        self
    }

    pub fn on_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VNodeRef) -> Result<()> + 'static,
    {
        self.destroy.push(Rc::new(hook));
        self
    }

    /// Put the component management hooks in front of any other hooks.
    /// Installing twice has no effect.
    pub fn install_component_hooks(&mut self) {
        if self.component_installed {
            return;
        }
        self.init.insert(0, Rc::new(create_component::component_init));
        self.prepatch.insert(0, Rc::new(create_component::component_prepatch));
        self.insert.insert(0, Rc::new(create_component::component_insert));
        self.destroy.insert(0, Rc::new(create_component::component_destroy));
        self.component_installed = true;
    }

    pub fn has_component_hooks(&self) -> bool {
        self.component_installed
    }

    pub fn has_init(&self) -> bool {
        !self.init.is_empty()
    }

    pub fn has_prepatch(&self) -> bool {
        !self.prepatch.is_empty()
    }

    pub fn has_insert(&self) -> bool {
        !self.insert.is_empty()
    }

    pub fn has_destroy(&self) -> bool {
        !self.destroy.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !(self.has_init() || self.has_prepatch() || self.has_insert() || self.has_destroy())
    }
}

impl fmt::Debug for VNodeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNodeHooks")
            .field("init", &self.init.len())
            .field("prepatch", &self.prepatch.len())
            .field("insert", &self.insert.len())
            .field("destroy", &self.destroy.len())
            .field("component", &self.component_installed)
            .finish()
    }
}

fn run_node_hooks(node: &VNodeRef, hooks: &[NodeHook], info: &str) {
    for hook in hooks {
        if let Err(err) = hook(node) {
            error::handle_error(&err, node.context().as_ref(), info);
        }
    }
}

/// Run the `init` hooks of `node`.
pub fn invoke_init(node: &VNodeRef) {
    if let Some(data) = node.data() {
        run_node_hooks(node, &data.hook.init, "init hook");
    }
}

/// Run the `prepatch` hooks of `new`.
pub fn invoke_prepatch(old: &VNodeRef, new: &VNodeRef) {
    if let Some(data) = new.data() {
        for hook in &data.hook.prepatch {
            if let Err(err) = hook(old, new) {
                error::handle_error(&err, new.context().as_ref(), "prepatch hook");
            }
        }
    }
}

/// Run the `insert` hooks of `node`.
pub fn invoke_insert(node: &VNodeRef) {
    if let Some(data) = node.data() {
        run_node_hooks(node, &data.hook.insert, "insert hook");
    }
}

/// Run the `destroy` hooks of `node`.
pub fn invoke_destroy(node: &VNodeRef) {
    if let Some(data) = node.data() {
        run_node_hooks(node, &data.hook.destroy, "destroy hook");
    }
}
