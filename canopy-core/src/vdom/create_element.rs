//! The Virtual Node Factory
//!
//! Render functions receive a [`Factory`] bound to the instance being
//! rendered. Every node it builds records that instance as its context.
//!
//! # Tag resolution
//!
//! A tag name resolves, in order, to:
//!
//! 1. a platform element, when `Config::reserved_tags` lists it
//! 2. a component registered in the rendering component's `components`
//! 3. the rendering component itself, when the tag is its own name
//! 4. an unknown element, kept as a plain element node
//!
//! `VNodeData::is` replaces the tag before resolution; an empty `is` gives
//! an empty node.

use std::rc::Rc;

use serde_json::Value;

use super::create_component::create_component;
use super::vnode::{VNode, VNodeData, VNodeRef};
use crate::config;
use crate::instance::{ComponentOptions, Instance};

/// What to create.
#[derive(Clone)]
pub enum Tag<'a> {
    /// An element or registered component name.
    Name(&'a str),
    /// A component definition used directly.
    Component(Rc<ComponentOptions>),
    /// Nothing: produces an empty node.
    None,
}

/// Creates nodes on behalf of a rendering instance.
pub struct Factory<'a> {
    context: &'a Instance,
}

impl<'a> Factory<'a> {
    pub fn new(context: &'a Instance) -> Self {
        Self { context }
    }

    /// The instance being rendered.
    pub fn vm(&self) -> &'a Instance {
        self.context
    }

    /// Create a node for `tag`.
    pub fn create(&self, tag: Tag<'_>, data: Option<VNodeData>, children: Vec<VNodeRef>) -> VNodeRef {
        create_element(self.context, tag, data, children)
    }

    /// Create an element, or a component when `tag` names one.
    pub fn element(&self, tag: &str, data: Option<VNodeData>, children: Vec<VNodeRef>) -> VNodeRef {
        self.create(Tag::Name(tag), data, children)
    }

    /// Create a component placeholder.
    pub fn component(
        &self,
        options: &Rc<ComponentOptions>,
        data: Option<VNodeData>,
        children: Vec<VNodeRef>,
    ) -> VNodeRef {
        self.create(Tag::Component(Rc::clone(options)), data, children)
    }

    pub fn text(&self, text: impl Into<String>) -> VNodeRef {
        VNode::text(text)
    }

    pub fn empty(&self) -> VNodeRef {
        VNode::empty()
    }

    /// Static slot content passed to the rendering instance, or nothing.
    pub fn slot(&self, name: &str) -> Vec<VNodeRef> {
        self.context.slot(name).unwrap_or_default()
    }

    /// Render a scoped slot with `props`, falling back to the static slot of
    /// the same name.
    pub fn scoped_slot(&self, name: &str, props: &Value) -> Vec<VNodeRef> {
        let scoped = self
            .context
            .scoped_slots()
            .and_then(|slots| slots.slots.get(name).cloned());
        match scoped {
            Some(render) => render(props),
            None => self.slot(name),
        }
    }
}

/// Create a node for `tag` in the context of `context`.
pub fn create_element(
    context: &Instance,
    tag: Tag<'_>,
    data: Option<VNodeData>,
    children: Vec<VNodeRef>,
) -> VNodeRef {
    let is = data.as_ref().and_then(|d| d.is.clone());
    let tag = match is.as_deref() {
        Some("") => Tag::None,
        Some(name) => Tag::Name(name),
        None => tag,
    };
    match tag {
        Tag::None => VNode::empty(),
        Tag::Component(options) => create_component(&options, data, context, children, None),
        Tag::Name(name) => {
            if config::is_reserved_tag(name) {
                return VNode::element(name, data, children, Some(context));
            }
            match resolve_component(context, name) {
                Some(options) => create_component(&options, data, context, children, Some(name)),
                None => {
                    tracing::trace!(tag = name, "unknown element");
                    VNode::element(name, data, children, Some(context))
                }
            }
        }
    }
}

/// Look up a component definition by tag for `vm`.
pub fn resolve_component(vm: &Instance, tag: &str) -> Option<Rc<ComponentOptions>> {
    let options = vm.options();
    if let Some(found) = options.components.get(tag) {
        return Some(Rc::clone(found));
    }
    if options.name.as_deref() == Some(tag) {
        return Some(Rc::clone(options));
    }
    None
}
