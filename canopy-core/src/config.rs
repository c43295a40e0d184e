//! Runtime Configuration
//!
//! Configuration is per thread, like the rest of the runtime. Hosts either set
//! a [`Config`] value directly or load one from JSON:
//!
//! ```rust,ignore
//! let config = Config::from_json(r#"{ "async_flush": false }"#)?;
//! canopy_core::config::set(config);
//! ```
//!
//! Error and warning handlers are closures, so they live next to the
//! serializable settings rather than inside them.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::instance::Instance;

/// Receives errors that no `error_captured` callback handled.
pub type ErrorHandler = Rc<dyn Fn(&Error, Option<&Instance>, &str)>;

/// Receives runtime warnings.
pub type WarnHandler = Rc<dyn Fn(&str, Option<&Instance>)>;

const DEFAULT_RESERVED_TAGS: &[&str] = &[
    "html", "body", "div", "span", "p", "a", "img", "ul", "ol", "li", "h1", "h2", "h3",
    "h4", "h5", "h6", "section", "article", "header", "footer", "nav", "main", "aside",
    "button", "input", "label", "select", "option", "textarea", "form", "table", "thead",
    "tbody", "tr", "td", "th", "pre", "code", "em", "strong", "br", "hr", "svg", "template",
    "slot",
];

/// Serializable runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch watcher re-runs until `scheduler::flush`. When disabled, queued
    /// watchers flush immediately and deps notify in subscriber id order.
    pub async_flush: bool,
    /// Suppress warnings.
    pub silent: bool,
    /// How often one watcher may be re-queued within a single flush before
    /// the flush is aborted as an infinite update loop.
    pub max_update_count: usize,
    /// Tags treated as platform elements rather than component names.
    pub reserved_tags: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_flush: true,
            silent: false,
            max_update_count: 100,
            reserved_tags: DEFAULT_RESERVED_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::Config)
    }

    /// Whether `tag` names a platform element.
    pub fn is_reserved_tag(&self, tag: &str) -> bool {
        self.reserved_tags.iter().any(|reserved| reserved == tag)
    }
}

#[derive(Default)]
struct Handlers {
    error: Option<ErrorHandler>,
    warn: Option<WarnHandler>,
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
    static HANDLERS: RefCell<Handlers> = RefCell::new(Handlers::default());
}

/// Replace the current configuration.
pub fn set(config: Config) {
    CONFIG.with(|current| *current.borrow_mut() = config);
}

/// A copy of the current configuration.
pub fn get() -> Config {
    CONFIG.with(|current| current.borrow().clone())
}

/// Read the current configuration without copying it.
pub fn with<R>(f: impl FnOnce(&Config) -> R) -> R {
    CONFIG.with(|current| f(&current.borrow()))
}

/// Modify the current configuration in place.
pub fn update(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|current| f(&mut current.borrow_mut()));
}

pub fn async_flush() -> bool {
    with(|config| config.async_flush)
}

pub fn is_reserved_tag(tag: &str) -> bool {
    with(|config| config.is_reserved_tag(tag))
}

/// Install (or clear) the global error handler.
pub fn set_error_handler(handler: Option<ErrorHandler>) {
    HANDLERS.with(|handlers| handlers.borrow_mut().error = handler);
}

/// Install (or clear) the global warning handler.
pub fn set_warn_handler(handler: Option<WarnHandler>) {
    HANDLERS.with(|handlers| handlers.borrow_mut().warn = handler);
}

pub(crate) fn error_handler() -> Option<ErrorHandler> {
    HANDLERS.with(|handlers| handlers.borrow().error.clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    HANDLERS.with(|handlers| handlers.borrow().warn.clone())
}
