//! Errors and the error reporting path.
//!
//! User code (render functions, lifecycle callbacks, vnode hooks, listeners,
//! watch callbacks) returns [`Result`]. A failure in one component never
//! unwinds into another: it is handed to [`handle_error`] together with the
//! owning instance and a description of the phase that failed, and execution
//! carries on with the remaining hooks and watchers.

use thiserror::Error;

use crate::config;
use crate::instance::Instance;
use crate::reactive::ReactiveContext;

/// Errors produced by the runtime or by user callbacks.
#[derive(Debug, Error)]
pub enum Error {
    /// A render function failed.
    #[error("render failed: {0}")]
    Render(String),

    /// A user callback (hook, listener, watcher) failed.
    #[error("{0}")]
    Callback(String),

    /// A component hook ran on a placeholder that carries no instance.
    #[error("component placeholder <{tag}> has no instance")]
    MissingInstance { tag: String },

    /// A component-only operation was applied to a plain element node.
    #[error("<{tag}> is not a component placeholder")]
    NotAComponent { tag: String },

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),
}

impl Error {
    /// Build a callback error from any displayable message.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Callback(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Report an error raised while running code on behalf of `vm`.
///
/// Ancestors get the first chance: each `error_captured` callback, from the
/// failing instance's parent upwards, may stop propagation by returning
/// `false`. Whatever is not captured reaches the global handler, or the log
/// when no handler is installed.
pub fn handle_error(err: &Error, vm: Option<&Instance>, info: &str) {
    // Reads inside error callbacks must not subscribe the failing watcher.
    let _quiet = ReactiveContext::untracked();

    if let Some(vm) = vm {
        let mut current = vm.parent();
        while let Some(ancestor) = current {
            for capture in ancestor.options().error_captured.iter() {
                if !capture(err, vm, info) {
                    return;
                }
            }
            current = ancestor.parent();
        }
    }

    global_handle_error(err, vm, info);
}

fn global_handle_error(err: &Error, vm: Option<&Instance>, info: &str) {
    match config::error_handler() {
        Some(handler) => handler(err, vm, info),
        None => tracing::error!(
            component = %format_component_name(vm),
            phase = info,
            error = %err,
            "unhandled error"
        ),
    }
}

/// Run `f`, reporting a failure instead of returning it.
pub fn invoke_with_error_handling<F>(f: F, vm: Option<&Instance>, info: &str)
where
    F: FnOnce() -> Result<()>,
{
    if let Err(err) = f() {
        handle_error(&err, vm, info);
    }
}

/// Surface a runtime warning to the host.
pub fn warn(message: &str, vm: Option<&Instance>) {
    if config::with(|config| config.silent) {
        return;
    }
    match config::warn_handler() {
        Some(handler) => handler(message, vm),
        None => tracing::warn!(component = %format_component_name(vm), "{}", message),
    }
}

/// Human readable component name for diagnostics.
pub fn format_component_name(vm: Option<&Instance>) -> String {
    match vm {
        None => "<anonymous>".to_string(),
        Some(vm) if vm.parent().is_none() => "<Root>".to_string(),
        Some(vm) => match vm.name() {
            Some(name) => format!("<{}>", name),
            None => "<Anonymous>".to_string(),
        },
    }
}
