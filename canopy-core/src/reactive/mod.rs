//! Reactive Primitives
//!
//! This module implements the dependency graph: observable values, the
//! dependency sets they own, and the watchers that subscribe to them.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] is a container for mutable state. When its value is read
//! while a watcher is running, the watcher subscribes to it. When the value is
//! written, every subscriber is notified.
//!
//! ## Deps
//!
//! A [`Dep`] is the subscriber list of one observable. It holds watchers
//! weakly and never contains the same watcher twice.
//!
//! ## Watchers
//!
//! A [`Watcher`] is any computation that re-runs when what it read changes:
//! a component's render function, a computed property or a user watch. Each
//! run replaces the watcher's dependency set wholesale.
//!
//! ## The context stack
//!
//! [`ReactiveContext`] is the active-computation stack. Only the watcher on top
//! of the stack collects dependencies, so nested runs never leak reads into the
//! computation that started them.

mod computed;
mod context;
mod dep;
mod object;
mod observable;
mod subscriber;
mod watcher;

pub use computed::Computed;
pub use context::ReactiveContext;
pub use dep::{Dep, DepId};
pub use object::ReactiveObject;
pub use observable::Observable;
pub use subscriber::SubscriberId;
pub use watcher::{BeforeRun, Getter, WatchCallback, Watcher, WatcherOptions, WeakWatcher};
