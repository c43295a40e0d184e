//! Component Instances
//!
//! An [`Instance`] is the runtime object behind one live component. It owns
//! its reactive state, its watchers (the render watcher among them) and its
//! child instances.
//!
//! # Initialization
//!
//! `Instance::new` runs the same sequence for roots and children:
//!
//! 1. lifecycle links (parent, children, flags)
//! 2. events (listeners passed down by the parent placeholder)
//! 3. render state (static slots)
//! 4. `beforeCreate`
//! 5. injections from ancestors
//! 6. state: props, data, computed properties, option watchers
//! 7. provided values
//! 8. `created`
//!
//! Mounting is a separate step ([`Instance::mount`]); component placeholders
//! mount their instance from the `init` hook.
//!
//! # Ownership
//!
//! Parents own children. Abstract instances are owned by their direct parent
//! but are not listed in its `children`. Everything else (watchers, nodes,
//! the scheduler) refers to an instance weakly.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::{Map, Value};

mod events;
pub(crate) mod inject;
pub mod lifecycle;
mod options;
pub(crate) mod render;

pub use lifecycle::{active_instance, ActiveInstanceGuard};
pub use options::{
    ComponentOptions, ComponentOptionsBuilder, ComputedFn, DataFn, ErrorCapturedFn,
    FunctionalRenderFn, HookFn, Injection, LifecycleHook, ModelOptions, ProvideFn, RenderFn,
    WatchHandler,
};

use crate::error::{self, Result};
use crate::reactive::{
    Computed, Observable, ReactiveContext, ReactiveObject, SubscriberId, Watcher, WatcherOptions,
};
use crate::vdom::{Listener, Listeners, ScopedSlots, VNodeRef};

static UID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How a new instance is attached to the tree.
#[derive(Default)]
pub struct InstanceInit {
    /// The parent instance. Component placeholders use the active instance.
    pub parent: Option<Instance>,
    /// The placeholder node this instance renders for.
    pub parent_vnode: Option<VNodeRef>,
    /// Prop values for a root instance. Components take theirs from the
    /// placeholder.
    pub props_data: Map<String, Value>,
    /// Share an existing data object instead of calling the data factory.
    pub data: Option<Rc<ReactiveObject>>,
}

impl InstanceInit {
    /// A root instance without parent.
    pub fn root() -> Self {
        Self::default()
    }

    /// A child instance created for `placeholder`.
    pub fn component(placeholder: VNodeRef, parent: Option<Instance>) -> Self {
        Self {
            parent,
            parent_vnode: Some(placeholder),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: &Instance) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props_data = props;
        self
    }

    pub fn with_data(mut self, data: Rc<ReactiveObject>) -> Self {
        self.data = Some(data);
        self
    }
}

pub(crate) struct InstanceInner {
    uid: u64,
    options: Rc<ComponentOptions>,
    parent: RefCell<Option<WeakInstance>>,
    children: RefCell<Vec<Instance>>,
    abstract_children: RefCell<Vec<Instance>>,

    placeholder: RefCell<Option<VNodeRef>>,
    vnode: RefCell<Option<VNodeRef>>,
    render_watcher: RefCell<Option<Watcher>>,
    watchers: RefCell<Vec<Watcher>>,

    data: RefCell<Rc<ReactiveObject>>,
    props: RefCell<IndexMap<String, Observable<Value>>>,
    attrs: Observable<Map<String, Value>>,
    computed: RefCell<IndexMap<String, Computed<Value>>>,
    injected: RefCell<IndexMap<String, Observable<Value>>>,
    provided: RefCell<Map<String, Value>>,

    parent_listeners: RefCell<Listeners>,
    events: RefCell<IndexMap<String, Vec<Listener>>>,
    has_hook_event: Cell<bool>,

    slots: RefCell<IndexMap<String, Vec<VNodeRef>>>,
    scoped_slots: RefCell<Option<ScopedSlots>>,
    render_children: RefCell<Option<Vec<VNodeRef>>>,

    is_mounted: Cell<bool>,
    is_destroyed: Cell<bool>,
    is_being_destroyed: Cell<bool>,
    inactive: Cell<Option<bool>>,
    direct_inactive: Cell<bool>,
}

/// Handle to a component instance.
///
/// Cloning yields another handle to the same instance.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

/// Non-owning handle to an instance.
#[derive(Clone, Default)]
pub struct WeakInstance(Weak<InstanceInner>);

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(|inner| Instance { inner })
    }
}

impl fmt::Debug for WeakInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(vm) => write!(f, "WeakInstance({})", vm.uid()),
            None => f.write_str("WeakInstance(dropped)"),
        }
    }
}

impl Instance {
    /// Create and initialize an instance. It is not mounted yet.
    pub fn new(options: Rc<ComponentOptions>, init: InstanceInit) -> Instance {
        let uid = UID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let vm = Instance {
            inner: Rc::new(InstanceInner {
                uid,
                options,
                parent: RefCell::new(None),
                children: RefCell::new(Vec::new()),
                abstract_children: RefCell::new(Vec::new()),
                placeholder: RefCell::new(init.parent_vnode.clone()),
                vnode: RefCell::new(None),
                render_watcher: RefCell::new(None),
                watchers: RefCell::new(Vec::new()),
                data: RefCell::new(Rc::new(ReactiveObject::new())),
                props: RefCell::new(IndexMap::new()),
                attrs: Observable::new(Map::new()),
                computed: RefCell::new(IndexMap::new()),
                injected: RefCell::new(IndexMap::new()),
                provided: RefCell::new(Map::new()),
                parent_listeners: RefCell::new(Listeners::new()),
                events: RefCell::new(IndexMap::new()),
                has_hook_event: Cell::new(false),
                slots: RefCell::new(IndexMap::new()),
                scoped_slots: RefCell::new(None),
                render_children: RefCell::new(None),
                is_mounted: Cell::new(false),
                is_destroyed: Cell::new(false),
                is_being_destroyed: Cell::new(false),
                inactive: Cell::new(None),
                direct_inactive: Cell::new(false),
            }),
        };
        lifecycle::init_lifecycle(&vm, init.parent);
        tracing::debug!(uid, component = %error::format_component_name(Some(&vm)), "init");
        events::init_events(&vm);
        render::init_render(&vm);
        lifecycle::call_hook(&vm, LifecycleHook::BeforeCreate);
        inject::init_injections(&vm);
        vm.init_state(init.props_data, init.data);
        inject::init_provide(&vm);
        lifecycle::call_hook(&vm, LifecycleHook::Created);
        vm
    }

    fn init_state(&self, root_props: Map<String, Value>, shared: Option<Rc<ReactiveObject>>) {
        let options = Rc::clone(&self.inner.options);

        let props_data = self
            .placeholder()
            .and_then(|node| node.component_options().map(|o| o.props_data.clone()))
            .unwrap_or(root_props);
        {
            let mut props = self.inner.props.borrow_mut();
            for key in &options.props {
                let value = props_data.get(key).cloned().unwrap_or(Value::Null);
                props.insert(key.clone(), Observable::new(value));
            }
        }

        let data = match shared {
            Some(data) => data,
            None => Rc::new(self.initial_data()),
        };
        data.retain_vm();
        *self.inner.data.borrow_mut() = data;

        for (name, compute) in &options.computed {
            let weak = self.downgrade();
            let compute = Rc::clone(compute);
            let computed = Computed::owned_by(self, name, move || {
                weak.upgrade().map(|vm| compute(&vm)).unwrap_or(Value::Null)
            });
            self.inner.computed.borrow_mut().insert(name.clone(), computed);
        }

        for (key, handlers) in &options.watch {
            for handler in handlers {
                let key = key.clone();
                let handler = Rc::clone(handler);
                self.watch_with_label(
                    format!("watcher \"{}\"", key),
                    move |vm| vm.get(&key),
                    move |vm, new, old| handler(vm, new, old),
                );
            }
        }
    }

    fn initial_data(&self) -> ReactiveObject {
        let Some(factory) = self.inner.options.data.clone() else {
            return ReactiveObject::new();
        };
        let value = {
            let _quiet = ReactiveContext::untracked();
            factory(self)
        };
        match value {
            Value::Object(map) => ReactiveObject::from_map(map),
            _ => {
                error::warn("data functions should return an object", Some(self));
                ReactiveObject::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Identity and structure
    // ------------------------------------------------------------------

    pub fn uid(&self) -> u64 {
        self.inner.uid
    }

    pub fn options(&self) -> &Rc<ComponentOptions> {
        &self.inner.options
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.options.name.as_deref()
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn parent(&self) -> Option<Instance> {
        self.inner.parent.borrow().as_ref().and_then(WeakInstance::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: Option<&Instance>) {
        *self.inner.parent.borrow_mut() = parent.map(Instance::downgrade);
    }

    /// The topmost ancestor, or this instance when it has no parent.
    pub fn root(&self) -> Instance {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Non-abstract child instances, in creation order.
    pub fn children(&self) -> Vec<Instance> {
        self.inner.children.borrow().clone()
    }

    pub(crate) fn push_child(&self, child: &Instance) {
        self.inner.children.borrow_mut().push(child.clone());
    }

    pub(crate) fn push_abstract_child(&self, child: &Instance) {
        self.inner.abstract_children.borrow_mut().push(child.clone());
    }

    pub(crate) fn remove_child(&self, child: &Instance) {
        self.inner.children.borrow_mut().retain(|c| !c.ptr_eq(child));
        self.inner.abstract_children.borrow_mut().retain(|c| !c.ptr_eq(child));
    }

    /// Detach every child, abstract ones included.
    pub(crate) fn take_children(&self) -> Vec<Instance> {
        let mut children = std::mem::take(&mut *self.inner.children.borrow_mut());
        children.append(&mut self.inner.abstract_children.borrow_mut());
        children
    }

    /// The placeholder node this instance renders for (`None` for roots).
    pub fn placeholder(&self) -> Option<VNodeRef> {
        self.inner.placeholder.borrow().clone()
    }

    pub(crate) fn set_placeholder(&self, node: Option<VNodeRef>) {
        *self.inner.placeholder.borrow_mut() = node;
    }

    /// The tree produced by the last render.
    pub fn vnode(&self) -> Option<VNodeRef> {
        self.inner.vnode.borrow().clone()
    }

    pub(crate) fn replace_vnode(&self, node: Option<VNodeRef>) -> Option<VNodeRef> {
        self.inner.vnode.replace(node)
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.inner.render_watcher.borrow().clone()
    }

    pub(crate) fn set_render_watcher(&self, watcher: Watcher) {
        *self.inner.render_watcher.borrow_mut() = Some(watcher);
    }

    pub(crate) fn push_watcher(&self, watcher: Watcher) {
        self.inner.watchers.borrow_mut().push(watcher);
    }

    pub(crate) fn remove_watcher(&self, id: SubscriberId) {
        self.inner.watchers.borrow_mut().retain(|w| w.id() != id);
    }

    pub(crate) fn take_watchers(&self) -> Vec<Watcher> {
        std::mem::take(&mut *self.inner.watchers.borrow_mut())
    }

    /// All watchers owned by this instance, render watcher included.
    pub fn watchers(&self) -> Vec<Watcher> {
        self.inner.watchers.borrow().clone()
    }

    /// Watch a derived value. `handler` is called with `(new, old)` after
    /// each change, outside dependency collection.
    pub fn watch<G, H>(&self, getter: G, handler: H) -> Watcher
    where
        G: Fn(&Instance) -> Value + 'static,
        H: Fn(&Instance, &Value, &Value) -> Result<()> + 'static,
    {
        self.watch_with_label("user watcher".to_string(), getter, handler)
    }

    fn watch_with_label<G, H>(&self, label: String, getter: G, handler: H) -> Watcher
    where
        G: Fn(&Instance) -> Value + 'static,
        H: Fn(&Instance, &Value, &Value) -> Result<()> + 'static,
    {
        let current = Rc::new(RefCell::new(Value::Null));
        let previous = Rc::new(RefCell::new(Value::Null));

        let getter_vm = self.downgrade();
        let slot = Rc::clone(&current);
        let callback_vm = self.downgrade();
        let (new_slot, old_slot) = (Rc::clone(&current), Rc::clone(&previous));

        let options = WatcherOptions {
            user: true,
            ..WatcherOptions::default()
        }
        .owned_by(self)
        .label(label)
        .callback(move || {
            let new = new_slot.borrow().clone();
            let old = old_slot.replace(new.clone());
            let changed = new != old || new.is_object() || new.is_array();
            match callback_vm.upgrade() {
                Some(vm) if changed => handler(&vm, &new, &old),
                _ => Ok(()),
            }
        });

        let watcher = Watcher::new(
            move || {
                if let Some(vm) = getter_vm.upgrade() {
                    let value = getter(&vm);
                    *slot.borrow_mut() = value;
                }
                Ok(())
            },
            options,
        );
        *previous.borrow_mut() = current.borrow().clone();
        watcher
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Read a prop, injected value, computed property or data field, in that
    /// order. Missing keys read as `null` and still track the data object's
    /// key set.
    pub fn get(&self, key: &str) -> Value {
        let prop = self.inner.props.borrow().get(key).cloned();
        if let Some(prop) = prop {
            return prop.get();
        }
        if let Some(injected) = self.injected_field(key) {
            return injected.get();
        }
        let computed = self.inner.computed.borrow().get(key).cloned();
        if let Some(computed) = computed {
            return computed.get();
        }
        self.data().get(key).unwrap_or(Value::Null)
    }

    /// Write a data field. Writing a prop is allowed but warned about, since
    /// the parent overwrites it on its next render.
    pub fn set(&self, key: &str, value: Value) {
        let prop = self.inner.props.borrow().get(key).cloned();
        if let Some(prop) = prop {
            error::warn(
                &format!(
                    "Avoid mutating a prop directly since the value will be overwritten \
                     whenever the parent component re-renders. Prop being mutated: \"{}\"",
                    key
                ),
                Some(self),
            );
            prop.set(value);
            return;
        }
        if let Some(injected) = self.injected_field(key) {
            error::warn(
                &format!(
                    "Avoid mutating an injected value directly since the changes will be \
                     overwritten whenever the provided component re-renders. Injection being \
                     mutated: \"{}\"",
                    key
                ),
                Some(self),
            );
            injected.set(value);
            return;
        }
        if self.inner.computed.borrow().contains_key(key) {
            error::warn(&format!("Computed property \"{}\" was assigned to", key), Some(self));
            return;
        }
        self.data().set(key, value);
    }

    /// The root data object.
    pub fn data(&self) -> Rc<ReactiveObject> {
        Rc::clone(&self.inner.data.borrow())
    }

    /// Current value of a declared prop, tracked.
    pub fn prop(&self, key: &str) -> Option<Value> {
        let prop = self.inner.props.borrow().get(key).cloned();
        prop.map(|p| p.get())
    }

    pub(crate) fn prop_field(&self, key: &str) -> Option<Observable<Value>> {
        self.inner.props.borrow().get(key).cloned()
    }

    /// Placeholder attributes that were not consumed as props, tracked.
    pub fn attrs(&self) -> Map<String, Value> {
        self.inner.attrs.get()
    }

    pub(crate) fn attrs_field(&self) -> &Observable<Map<String, Value>> {
        &self.inner.attrs
    }

    /// The computed property `name`.
    pub fn computed(&self, name: &str) -> Option<Computed<Value>> {
        self.inner.computed.borrow().get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Lifecycle flags
    // ------------------------------------------------------------------

    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted.get()
    }

    pub(crate) fn set_mounted(&self) {
        self.inner.is_mounted.set(true);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed.get()
    }

    pub fn is_being_destroyed(&self) -> bool {
        self.inner.is_being_destroyed.get()
    }

    /// `None` until the instance is first activated or deactivated.
    pub fn inactive(&self) -> Option<bool> {
        self.inner.inactive.get()
    }

    pub(crate) fn set_inactive(&self, inactive: Option<bool>) {
        self.inner.inactive.set(inactive);
    }

    pub fn is_direct_inactive(&self) -> bool {
        self.inner.direct_inactive.get()
    }

    pub(crate) fn set_direct_inactive(&self, direct: bool) {
        self.inner.direct_inactive.set(direct);
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Create the render watcher and produce the first tree.
    pub fn mount(&self) -> &Self {
        lifecycle::mount_component(self);
        self
    }

    /// Patch `vnode` against the previous tree and make it current.
    pub fn update(&self, vnode: VNodeRef) {
        lifecycle::update(self, vnode);
    }

    /// Queue a re-render regardless of tracked state.
    pub fn force_update(&self) {
        if let Some(watcher) = self.render_watcher() {
            watcher.update();
        }
    }

    /// Tear the instance down. Calling it again does nothing.
    pub fn destroy(&self) {
        lifecycle::destroy(self);
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("uid", &self.uid())
            .field("name", &self.name())
            .field("children", &self.inner.children.borrow().len())
            .field("mounted", &self.is_mounted())
            .field("destroyed", &self.is_destroyed())
            .field("inactive", &self.inactive())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
