//! Component Options
//!
//! `ComponentOptions` is the immutable definition a component instance is
//! created from. Definitions are built once with [`ComponentOptionsBuilder`]
//! and shared behind `Rc`.
//!
//! # Composition
//!
//! [`ComponentOptions::extend`] merges a base definition with an extension
//! into a new definition. The result is cached per `(base, extension)` pair, so
//! extending the same pair twice yields the same `Rc`. Merge strategies:
//!
//! - lifecycle hooks, `error_captured` and `watch` handlers concatenate, base
//!   first
//! - `data` merges recursively, extension keys win
//! - `computed` and `components` merge by key, extension entries win
//! - `props` are the union, base order first
//! - `provide` merges like `data`; `inject` entries merge by key, extension
//!   entries win
//! - `name`, `render`, `functional`, `model` and `is_abstract` come from the
//!   extension when it sets them

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::Value;

use super::Instance;
use crate::config;
use crate::error::{self, Error, Result};
use crate::vdom::{Factory, FunctionalContext, VNodeRef};

/// Produces a component's virtual tree.
pub type RenderFn = Rc<dyn Fn(&Factory<'_>) -> Result<VNodeRef>>;

/// Renders a functional component. It has no instance; everything it needs
/// arrives in the [`FunctionalContext`].
pub type FunctionalRenderFn = Rc<dyn Fn(&Factory<'_>, &FunctionalContext) -> Result<VNodeRef>>;

/// Produces a fresh data object for a new instance.
pub type DataFn = Rc<dyn Fn(&Instance) -> Value>;

/// Produces the values an instance provides to its descendants.
pub type ProvideFn = Rc<dyn Fn(&Instance) -> Value>;

/// A lifecycle callback.
pub type HookFn = Rc<dyn Fn(&Instance) -> Result<()>>;

/// Receives errors raised in descendants. Returning `false` stops
/// propagation.
pub type ErrorCapturedFn = Rc<dyn Fn(&Error, &Instance, &str) -> bool>;

/// Derives a computed property.
pub type ComputedFn = Rc<dyn Fn(&Instance) -> Value>;

/// Called with `(new, old)` when a watched key changes.
pub type WatchHandler = Rc<dyn Fn(&Instance, &Value, &Value) -> Result<()>>;

static CID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_cid() -> u64 {
    CID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Named points in an instance's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleHook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl LifecycleHook {
    pub const ALL: [LifecycleHook; 10] = [
        LifecycleHook::BeforeCreate,
        LifecycleHook::Created,
        LifecycleHook::BeforeMount,
        LifecycleHook::Mounted,
        LifecycleHook::BeforeUpdate,
        LifecycleHook::Updated,
        LifecycleHook::Activated,
        LifecycleHook::Deactivated,
        LifecycleHook::BeforeDestroy,
        LifecycleHook::Destroyed,
    ];

    /// The hook's name, as used in `hook:<name>` events and error reports.
    pub fn name(self) -> &'static str {
        match self {
            LifecycleHook::BeforeCreate => "beforeCreate",
            LifecycleHook::Created => "created",
            LifecycleHook::BeforeMount => "beforeMount",
            LifecycleHook::Mounted => "mounted",
            LifecycleHook::BeforeUpdate => "beforeUpdate",
            LifecycleHook::Updated => "updated",
            LifecycleHook::Activated => "activated",
            LifecycleHook::Deactivated => "deactivated",
            LifecycleHook::BeforeDestroy => "beforeDestroy",
            LifecycleHook::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which prop and event a `model` binding on a placeholder maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOptions {
    pub prop: String,
    pub event: String,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            prop: "value".to_string(),
            event: "input".to_string(),
        }
    }
}

/// One injected value: the provided key it comes from and its fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Injection {
    pub from: String,
    pub default: Option<Value>,
}

/// Immutable definition of a component.
#[derive(Clone, Default)]
pub struct ComponentOptions {
    /// Unique definition id. Part of every placeholder tag.
    pub cid: u64,
    pub name: Option<String>,
    pub render: Option<RenderFn>,
    pub data: Option<DataFn>,
    /// Declared prop names.
    pub props: Vec<String>,
    pub computed: IndexMap<String, ComputedFn>,
    pub watch: IndexMap<String, Vec<WatchHandler>>,
    pub hooks: HashMap<LifecycleHook, Vec<HookFn>>,
    pub error_captured: Vec<ErrorCapturedFn>,
    /// Abstract components stay out of their parent's `children` and pass
    /// their own children up to the nearest non-abstract ancestor.
    pub is_abstract: bool,
    /// Locally registered components, by tag.
    pub components: IndexMap<String, Rc<ComponentOptions>>,
    /// Set for functional components, which render without an instance.
    pub functional: Option<FunctionalRenderFn>,
    /// Mapping for `model` bindings; `value`/`input` when unset.
    pub model: Option<ModelOptions>,
    pub provide: Option<ProvideFn>,
    /// Injected keys, by local name.
    pub inject: IndexMap<String, Injection>,
}

thread_local! {
    static EXTEND_CACHE: RefCell<HashMap<(u64, u64), Rc<ComponentOptions>>> =
        RefCell::new(HashMap::new());
}

impl ComponentOptions {
    /// Start building a definition.
    pub fn builder() -> ComponentOptionsBuilder {
        ComponentOptionsBuilder::default()
    }

    /// Whether this definition renders without an instance.
    pub fn is_functional(&self) -> bool {
        self.functional.is_some()
    }

    /// The prop and event a `model` binding maps to.
    pub fn model_options(&self) -> ModelOptions {
        self.model.clone().unwrap_or_default()
    }

    /// Callbacks registered for `hook`.
    pub fn hooks_for(&self, hook: LifecycleHook) -> &[HookFn] {
        self.hooks.get(&hook).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Compose `base` with `extension` into a new definition.
    pub fn extend(base: &Rc<ComponentOptions>, extension: &Rc<ComponentOptions>) -> Rc<ComponentOptions> {
        let key = (base.cid, extension.cid);
        if let Some(cached) = EXTEND_CACHE.with(|cache| cache.borrow().get(&key).cloned()) {
            return cached;
        }

        let merged = Rc::new(merge_options(base, extension));
        tracing::debug!(
            base = base.cid,
            extension = extension.cid,
            cid = merged.cid,
            "extended component options"
        );
        EXTEND_CACHE.with(|cache| cache.borrow_mut().insert(key, Rc::clone(&merged)));
        merged
    }
}

fn merge_options(base: &ComponentOptions, extension: &ComponentOptions) -> ComponentOptions {
    let mut hooks = base.hooks.clone();
    for (hook, callbacks) in &extension.hooks {
        hooks.entry(*hook).or_default().extend(callbacks.iter().cloned());
    }

    let mut watch = base.watch.clone();
    for (key, handlers) in &extension.watch {
        watch.entry(key.clone()).or_default().extend(handlers.iter().cloned());
    }

    let mut props = base.props.clone();
    for prop in &extension.props {
        if !props.contains(prop) {
            props.push(prop.clone());
        }
    }

    let mut computed = base.computed.clone();
    computed.extend(extension.computed.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut components = base.components.clone();
    components.extend(extension.components.iter().map(|(k, v)| (k.clone(), v.clone())));

    let data = merge_data_fn(base.data.clone(), extension.data.clone());
    let provide = merge_data_fn(base.provide.clone(), extension.provide.clone());

    let mut inject = base.inject.clone();
    inject.extend(extension.inject.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut error_captured = base.error_captured.clone();
    error_captured.extend(extension.error_captured.iter().cloned());

    ComponentOptions {
        cid: next_cid(),
        name: extension.name.clone().or_else(|| base.name.clone()),
        render: extension.render.clone().or_else(|| base.render.clone()),
        data,
        props,
        computed,
        watch,
        hooks,
        error_captured,
        is_abstract: base.is_abstract || extension.is_abstract,
        components,
        functional: extension.functional.clone().or_else(|| base.functional.clone()),
        model: extension.model.clone().or_else(|| base.model.clone()),
        provide,
        inject,
    }
}

fn merge_data_fn(
    parent: Option<Rc<dyn Fn(&Instance) -> Value>>,
    child: Option<Rc<dyn Fn(&Instance) -> Value>>,
) -> Option<Rc<dyn Fn(&Instance) -> Value>> {
    match (parent, child) {
        (Some(parent), Some(child)) => {
            let merged: DataFn = Rc::new(move |vm: &Instance| {
                let mut to = child(vm);
                merge_data(&mut to, parent(vm));
                to
            });
            Some(merged)
        }
        (parent, child) => child.or(parent),
    }
}

/// Fill keys missing from `to` with the ones from `from`, recursing into
/// nested objects present on both sides.
fn merge_data(to: &mut Value, from: Value) {
    let (Value::Object(to), Value::Object(from)) = (to, from) else {
        return;
    };
    for (key, from_value) in from {
        match to.get_mut(&key) {
            None => {
                to.insert(key, from_value);
            }
            Some(to_value) => {
                if to_value.is_object() && from_value.is_object() {
                    merge_data(to_value, from_value);
                }
            }
        }
    }
}

impl fmt::Debug for ComponentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentOptions")
            .field("cid", &self.cid)
            .field("name", &self.name)
            .field("props", &self.props)
            .field("has_render", &self.render.is_some())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("is_abstract", &self.is_abstract)
            .field("functional", &self.functional.is_some())
            .field("model", &self.model)
            .field("inject", &self.inject.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`ComponentOptions`].
///
/// ```rust,ignore
/// let counter = ComponentOptions::builder()
///     .name("counter")
///     .data(|_| json!({ "count": 0 }))
///     .render(|h| Ok(h.element("span", None, vec![h.text(h.vm().get("count").to_string())])))
///     .build();
/// ```
#[derive(Default)]
pub struct ComponentOptionsBuilder {
    options: ComponentOptions,
}

impl ComponentOptionsBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&Factory<'_>) -> Result<VNodeRef> + 'static,
    {
        self.options.render = Some(Rc::new(render));
        self
    }

    /// The data factory. It should return a JSON object.
    pub fn data<F>(mut self, data: F) -> Self
    where
        F: Fn(&Instance) -> Value + 'static,
    {
        self.options.data = Some(Rc::new(data));
        self
    }

    pub fn prop(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.options.props.contains(&name) {
            self.options.props.push(name);
        }
        self
    }

    pub fn computed<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Instance) -> Value + 'static,
    {
        self.options.computed.insert(name.into(), Rc::new(compute));
        self
    }

    pub fn watch<F>(mut self, key: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Instance, &Value, &Value) -> Result<()> + 'static,
    {
        self.options
            .watch
            .entry(key.into())
            .or_default()
            .push(Rc::new(handler));
        self
    }

    pub fn hook<F>(mut self, hook: LifecycleHook, callback: F) -> Self
    where
        F: Fn(&Instance) -> Result<()> + 'static,
    {
        self.options
            .hooks
            .entry(hook)
            .or_default()
            .push(Rc::new(callback));
        self
    }

    pub fn error_captured<F>(mut self, capture: F) -> Self
    where
        F: Fn(&Error, &Instance, &str) -> bool + 'static,
    {
        self.options.error_captured.push(Rc::new(capture));
        self
    }

    /// Make this a functional component rendered by `render`.
    pub fn functional<F>(mut self, render: F) -> Self
    where
        F: Fn(&Factory<'_>, &FunctionalContext) -> Result<VNodeRef> + 'static,
    {
        self.options.functional = Some(Rc::new(render));
        self
    }

    /// Map `model` bindings to `prop` and `event`.
    pub fn model(mut self, prop: impl Into<String>, event: impl Into<String>) -> Self {
        self.options.model = Some(ModelOptions {
            prop: prop.into(),
            event: event.into(),
        });
        self
    }

    /// Values offered to descendants. It should return a JSON object.
    pub fn provide<F>(mut self, provide: F) -> Self
    where
        F: Fn(&Instance) -> Value + 'static,
    {
        self.options.provide = Some(Rc::new(provide));
        self
    }

    /// Inject the provided value `key` under the same name.
    pub fn inject(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.inject_from(key.clone(), key, None)
    }

    /// Inject the provided value `from` as `key`, falling back to `default`.
    pub fn inject_from(
        mut self,
        key: impl Into<String>,
        from: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        self.options.inject.insert(
            key.into(),
            Injection {
                from: from.into(),
                default,
            },
        );
        self
    }

    pub fn abstract_component(mut self) -> Self {
        self.options.is_abstract = true;
        self
    }

    /// Register a component locally under `tag`.
    pub fn component(mut self, tag: impl Into<String>, options: Rc<ComponentOptions>) -> Self {
        self.options.components.insert(tag.into(), options);
        self
    }

    pub fn build(mut self) -> Rc<ComponentOptions> {
        for tag in self.options.components.keys() {
            if config::is_reserved_tag(tag) {
                error::warn(
                    &format!(
                        "Do not use built-in or reserved HTML elements as component id: {}",
                        tag
                    ),
                    None,
                );
            }
        }
        self.options.cid = next_cid();
        Rc::new(self.options)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
