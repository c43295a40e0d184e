//! Canopy Core
//!
//! This crate provides the core runtime for the Canopy reactive UI framework.
//! It implements:
//!
//! - Fine-grained dependency tracking (observables, deps, watchers)
//! - Batched, ordered re-rendering through a scheduler
//! - Component instances and their lifecycle
//! - The virtual-node hook protocol used by the patch algorithm
//!
//! Everything runs on one thread. Each thread has its own runtime state:
//! configuration, scheduler queue, active instance and context stack.
//!
//! # Architecture
//!
//! - `reactive`: dependency graph primitives
//! - `scheduler`: batching queue and the end-of-turn `flush`
//! - `instance`: component instances, options and lifecycle
//! - `vdom`: virtual nodes, the node factory, component hooks and patching
//! - `config`: runtime settings and handlers
//! - `error`: error type and the error reporting path
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_core::{scheduler, ComponentOptions, Instance, InstanceInit};
//! use serde_json::json;
//!
//! let counter = ComponentOptions::builder()
//!     .data(|_| json!({ "count": 0 }))
//!     .render(|h| Ok(h.element("span", None, vec![h.text(h.vm().get("count").to_string())])))
//!     .build();
//!
//! let vm = Instance::new(counter, InstanceInit::root());
//! vm.mount();
//!
//! vm.set("count", json!(1));
//! scheduler::flush();
//! // vm.vnode() now renders "1"
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod reactive;
pub mod scheduler;
pub mod vdom;

pub use config::Config;
pub use error::{Error, Result};
pub use instance::{ComponentOptions, Instance, InstanceInit, LifecycleHook, WeakInstance};
pub use vdom::{Factory, FunctionalContext, KeepAliveCache, VNode, VNodeData, VNodeRef};
