//! Virtual Nodes
//!
//! A `VNode` describes one node of the desired UI tree. Trees are immutable
//! once built, except for the links the runtime fills in while patching: the
//! instance behind a component placeholder, the placeholder a component's root
//! node belongs to, and the insert queue a child defers to its placeholder.
//!
//! # Ownership
//!
//! The tree owns its nodes (`Rc`). A placeholder refers to its instance
//! weakly; instances are owned by their parent instance. The back-link from a
//! component's root node to its placeholder is cleared when the instance is
//! destroyed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use super::hooks::VNodeHooks;
use crate::error::Result;
use crate::instance::{ComponentOptions, Instance, WeakInstance};

/// Shared handle to a virtual node.
pub type VNodeRef = Rc<VNode>;

/// A component event listener.
pub type Listener = Rc<dyn Fn(&Instance, &[Value]) -> Result<()>>;

/// Listeners keyed by event name.
pub type Listeners = IndexMap<String, Vec<Listener>>;

/// Renders a scoped slot from its slot props.
pub type ScopedSlotFn = Rc<dyn Fn(&Value) -> Vec<VNodeRef>>;

/// Scoped slots passed to a component.
///
/// `stable` marks slots whose set of names cannot change between renders, and
/// `key` identifies the slot content when it is conditional. Both decide
/// whether a child must be re-rendered when its parent re-renders.
#[derive(Clone, Default)]
pub struct ScopedSlots {
    pub slots: IndexMap<String, ScopedSlotFn>,
    pub stable: bool,
    pub key: Option<String>,
}

impl ScopedSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the slot set as stable.
    pub fn stable(mut self) -> Self {
        self.stable = true;
        self
    }

    /// Identify conditional slot content.
    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add a slot.
    pub fn slot<F>(mut self, name: impl Into<String>, render: F) -> Self
    where
        F: Fn(&Value) -> Vec<VNodeRef> + 'static,
    {
        self.slots.insert(name.into(), Rc::new(render));
        self
    }
}

/// A two-way binding on a component placeholder: the bound value and the
/// listener that receives updates. The component's model options decide
/// which prop and event it becomes.
#[derive(Clone)]
pub struct ModelBinding {
    pub value: Value,
    pub callback: Listener,
}

/// Attributes, listeners and hooks attached to a node.
#[derive(Clone, Default)]
pub struct VNodeData {
    pub key: Option<String>,
    pub attrs: Map<String, Value>,
    pub props: Map<String, Value>,
    /// Listeners. On a component placeholder these become component events.
    pub on: Listeners,
    /// Listeners a component placeholder keeps for its own element.
    pub native_on: Listeners,
    /// Name of the parent slot this node is passed into.
    pub slot: Option<String>,
    pub scoped_slots: Option<ScopedSlots>,
    pub hook: VNodeHooks,
    /// Two-way binding, turned into a prop and a listener for components.
    pub model: Option<ModelBinding>,
    /// Tag to create instead of the one given to the factory.
    pub is: Option<String>,
}

impl VNodeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: Value) -> Self {
        self.props.insert(name.into(), value);
        self
    }

    /// Add a listener.
    pub fn on<F>(mut self, event: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<()> + 'static,
    {
        self.on.entry(event.into()).or_default().push(Rc::new(listener));
        self
    }

    /// Add an already shared listener.
    pub fn on_shared(mut self, event: impl Into<String>, listener: Listener) -> Self {
        self.on.entry(event.into()).or_default().push(listener);
        self
    }

    pub fn slot(mut self, name: impl Into<String>) -> Self {
        self.slot = Some(name.into());
        self
    }

    pub fn scoped_slots(mut self, slots: ScopedSlots) -> Self {
        self.scoped_slots = Some(slots);
        self
    }

    pub fn hooks(mut self, hooks: VNodeHooks) -> Self {
        self.hook = hooks;
        self
    }

    /// Bind `value` two-way; `callback` receives the new value.
    pub fn model<F>(mut self, value: Value, callback: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<()> + 'static,
    {
        self.model = Some(ModelBinding {
            value,
            callback: Rc::new(callback),
        });
        self
    }

    /// Create `tag` instead of the factory's tag.
    pub fn is(mut self, tag: impl Into<String>) -> Self {
        self.is = Some(tag.into());
        self
    }
}

/// What a component placeholder carries for the instance it stands for.
#[derive(Clone)]
pub struct ComponentVNodeOptions {
    pub ctor: Rc<ComponentOptions>,
    pub props_data: Map<String, Value>,
    pub listeners: Listeners,
    pub tag: Option<String>,
    /// Static slot content; `None` when the placeholder has no children.
    pub children: Option<Vec<VNodeRef>>,
}

/// A node of the virtual tree.
pub struct VNode {
    tag: Option<String>,
    data: Option<VNodeData>,
    children: Option<Vec<VNodeRef>>,
    text: Option<String>,
    key: Option<String>,
    is_comment: bool,
    context: Option<WeakInstance>,
    component_options: Option<ComponentVNodeOptions>,
    component_instance: RefCell<Option<WeakInstance>>,
    parent: RefCell<Option<VNodeRef>>,
    keep_alive: Cell<bool>,
    pending_insert: RefCell<Vec<VNodeRef>>,
    fn_context: Option<WeakInstance>,
    fn_options: Option<Rc<ComponentOptions>>,
}

impl VNode {
    fn bare() -> Self {
        Self {
            tag: None,
            data: None,
            children: None,
            text: None,
            key: None,
            is_comment: false,
            context: None,
            component_options: None,
            component_instance: RefCell::new(None),
            parent: RefCell::new(None),
            keep_alive: Cell::new(false),
            pending_insert: RefCell::new(Vec::new()),
            fn_context: None,
            fn_options: None,
        }
    }

    /// A plain element node.
    pub fn element(
        tag: impl Into<String>,
        data: Option<VNodeData>,
        children: Vec<VNodeRef>,
        context: Option<&Instance>,
    ) -> VNodeRef {
        Rc::new(Self {
            tag: Some(tag.into()),
            key: data.as_ref().and_then(|d| d.key.clone()),
            data,
            children: Some(children),
            context: context.map(Instance::downgrade),
            ..Self::bare()
        })
    }

    /// A text node.
    pub fn text(text: impl Into<String>) -> VNodeRef {
        Rc::new(Self {
            text: Some(text.into()),
            ..Self::bare()
        })
    }

    /// An empty (comment) node, rendered when there is nothing to show.
    pub fn empty() -> VNodeRef {
        Rc::new(Self {
            text: Some(String::new()),
            is_comment: true,
            ..Self::bare()
        })
    }

    /// A component placeholder. It never has children of its own; slot
    /// content travels in `options.children`.
    pub fn component(
        tag: impl Into<String>,
        data: VNodeData,
        context: &Instance,
        options: ComponentVNodeOptions,
    ) -> VNodeRef {
        Rc::new(Self {
            tag: Some(tag.into()),
            key: data.key.clone(),
            data: Some(data),
            context: Some(context.downgrade()),
            component_options: Some(options),
            ..Self::bare()
        })
    }

    /// Copy of `self` marked as the output of the functional component
    /// `options` rendered in `context`. `slot` carries the placeholder's slot
    /// name over to the result.
    pub(crate) fn mark_functional(
        &self,
        context: &Instance,
        options: &Rc<ComponentOptions>,
        slot: Option<String>,
    ) -> VNodeRef {
        let mut data = self.data.clone();
        if let Some(slot) = slot {
            data.get_or_insert_with(VNodeData::default).slot = Some(slot);
        }
        Rc::new(Self {
            tag: self.tag.clone(),
            data,
            children: self.children.clone(),
            text: self.text.clone(),
            key: self.key.clone(),
            is_comment: self.is_comment,
            context: self.context.clone(),
            component_options: self.component_options.clone(),
            fn_context: Some(context.downgrade()),
            fn_options: Some(Rc::clone(options)),
            ..Self::bare()
        })
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn data(&self) -> Option<&VNodeData> {
        self.data.as_ref()
    }

    pub fn children(&self) -> Option<&[VNodeRef]> {
        self.children.as_deref()
    }

    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_comment(&self) -> bool {
        self.is_comment
    }

    /// The instance whose render produced this node.
    pub fn context(&self) -> Option<Instance> {
        self.context.as_ref().and_then(WeakInstance::upgrade)
    }

    pub fn component_options(&self) -> Option<&ComponentVNodeOptions> {
        self.component_options.as_ref()
    }

    pub fn is_component(&self) -> bool {
        self.component_options.is_some()
    }

    /// For the output of a functional component: the instance it was
    /// rendered in.
    pub fn functional_context(&self) -> Option<Instance> {
        self.fn_context.as_ref().and_then(WeakInstance::upgrade)
    }

    /// For the output of a functional component: its definition.
    pub fn functional_options(&self) -> Option<&Rc<ComponentOptions>> {
        self.fn_options.as_ref()
    }

    /// The instance behind this placeholder, if one was created and is alive.
    pub fn component_instance(&self) -> Option<Instance> {
        self.component_instance
            .borrow()
            .as_ref()
            .and_then(WeakInstance::upgrade)
    }

    pub fn set_component_instance(&self, vm: &Instance) {
        *self.component_instance.borrow_mut() = Some(vm.downgrade());
    }

    /// The placeholder this node is the rendered root of.
    pub fn parent(&self) -> Option<VNodeRef> {
        self.parent.borrow().clone()
    }

    pub fn set_parent(&self, parent: Option<VNodeRef>) {
        *self.parent.borrow_mut() = parent;
    }

    /// Whether removal should deactivate rather than destroy the instance.
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive.get()
    }

    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.keep_alive.set(keep_alive);
    }

    /// Hand over the insert queue a child component deferred to this
    /// placeholder during its initial patch.
    pub fn take_pending_insert(&self) -> Vec<VNodeRef> {
        std::mem::take(&mut *self.pending_insert.borrow_mut())
    }

    pub fn set_pending_insert(&self, queue: Vec<VNodeRef>) {
        *self.pending_insert.borrow_mut() = queue;
    }

    /// Serializable view of the tree, with component placeholders expanded
    /// into what their instances rendered.
    pub fn snapshot(&self) -> NodeSnapshot {
        if let Some(options) = &self.component_options {
            let rendered = self
                .component_instance()
                .and_then(|vm| vm.vnode())
                .map(|root| vec![root.snapshot()])
                .unwrap_or_default();
            return NodeSnapshot {
                component: Some(
                    options
                        .ctor
                        .name
                        .clone()
                        .or_else(|| options.tag.clone())
                        .unwrap_or_else(|| "anonymous".to_string()),
                ),
                key: self.key.clone(),
                children: rendered,
                ..NodeSnapshot::default()
            };
        }

        NodeSnapshot {
            tag: self.tag.clone(),
            text: self.text.clone(),
            key: self.key.clone(),
            comment: self.is_comment,
            attrs: self.data.as_ref().map(|d| d.attrs.clone()).unwrap_or_default(),
            children: self
                .children
                .iter()
                .flatten()
                .map(|child| child.snapshot())
                .collect(),
            component: None,
        }
    }

    /// The snapshot as a JSON value.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.snapshot()).unwrap_or(Value::Null)
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("text", &self.text)
            .field("children", &self.children.as_ref().map(Vec::len))
            .field("component", &self.is_component())
            .field("keep_alive", &self.keep_alive.get())
            .finish()
    }
}

/// A serializable description of a rendered tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub comment: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attrs: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}
