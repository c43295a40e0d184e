//! Virtual Nodes
//!
//! Render functions describe the UI as a tree of [`VNode`]s. Components show
//! up in that tree as placeholder nodes whose hooks create, update, insert
//! and remove the component instance behind them.
//!
//! # Modules
//!
//! - `vnode`: the node type, its data and a serializable snapshot
//! - `hooks`: ordered hook lists and their invocation
//! - `create_element`: the factory handed to render functions
//! - `create_component`: placeholders and the component hooks
//! - `create_functional_component`: stateless components rendered inline
//! - `patch`: the patch seam and the built-in structural patcher
//! - `keep_alive`: caching instances across removal

mod create_component;
mod create_element;
mod create_functional_component;
pub mod hooks;
mod keep_alive;
pub mod patch;
mod vnode;

pub use create_component::{create_component, create_component_instance_for_vnode};
pub use create_element::{create_element, resolve_component, Factory, Tag};
pub use create_functional_component::FunctionalContext;
pub use hooks::{NodeHook, PatchHook, VNodeHooks};
pub use keep_alive::KeepAliveCache;
pub use patch::{set_patcher, Patch, TreePatcher};
pub use vnode::{
    ComponentVNodeOptions, Listener, Listeners, ModelBinding, NodeSnapshot, ScopedSlotFn,
    ScopedSlots, VNode, VNodeData, VNodeRef,
};
