//! Component Placeholders
//!
//! A component appears in its parent's tree as a placeholder node. The
//! placeholder carries the component definition, the extracted props, the
//! component listeners and any static slot content, plus the four component
//! hooks that create, update, insert and remove the instance behind it.
//!
//! Functional components get no placeholder: they render on the spot and
//! their output takes the placeholder's place.

use std::rc::Rc;

use serde_json::{Map, Value};

use super::create_functional_component::create_functional_component;
use super::vnode::{ComponentVNodeOptions, Listener, ModelBinding, VNode, VNodeData, VNodeRef};
use crate::error::{Error, Result};
use crate::instance::{
    active_instance, lifecycle, ComponentOptions, Instance, InstanceInit, LifecycleHook,
};
use crate::scheduler;

/// Build a placeholder node for `ctor`.
///
/// A `model` binding becomes the prop and the leading listener named by the
/// component's model options (`value` and `input` by default). Declared props are taken from `data.props` first, then from `data.attrs`;
/// attributes used as props are removed from the attributes. `on` listeners
/// become component listeners and `native_on` becomes the placeholder's own
/// `on`. Abstract components keep nothing but the slot name.
pub fn create_component(
    ctor: &Rc<ComponentOptions>,
    data: Option<VNodeData>,
    context: &Instance,
    children: Vec<VNodeRef>,
    tag: Option<&str>,
) -> VNodeRef {
    let mut data = data.unwrap_or_default();

    if let Some(model) = data.model.take() {
        transform_model(ctor, &mut data, model);
    }

    let props_data = extract_props(&mut data, ctor);

    if ctor.is_functional() {
        return create_functional_component(ctor, props_data, data, context, children);
    }

    let listeners = std::mem::take(&mut data.on);
    data.on = std::mem::take(&mut data.native_on);

    if ctor.is_abstract {
        data = VNodeData {
            slot: data.slot.take(),
            ..VNodeData::default()
        };
    }
    data.hook.install_component_hooks();

    let name = ctor.name.as_deref().or(tag);
    let vtag = match name {
        Some(name) => format!("component-{}-{}", ctor.cid, name),
        None => format!("component-{}", ctor.cid),
    };

    VNode::component(
        vtag,
        data,
        context,
        ComponentVNodeOptions {
            ctor: Rc::clone(ctor),
            props_data,
            listeners,
            tag: tag.map(str::to_string),
            children: if children.is_empty() { None } else { Some(children) },
        },
    )
}

fn transform_model(ctor: &ComponentOptions, data: &mut VNodeData, model: ModelBinding) {
    let options = ctor.model_options();
    data.attrs.insert(options.prop, model.value);
    let listeners = data.on.entry(options.event).or_default();
    if !listeners.iter().any(|l| same_listener(l, &model.callback)) {
        listeners.insert(0, model.callback);
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

fn extract_props(data: &mut VNodeData, ctor: &ComponentOptions) -> Map<String, Value> {
    let mut res = Map::new();
    for key in &ctor.props {
        if let Some(value) = data.props.get(key) {
            res.insert(key.clone(), value.clone());
        } else if let Some(value) = data.attrs.remove(key) {
            res.insert(key.clone(), value);
        }
    }
    res
}

fn component_options(node: &VNodeRef) -> Result<&ComponentVNodeOptions> {
    node.component_options().ok_or_else(|| Error::NotAComponent {
        tag: node.tag().unwrap_or_default().to_string(),
    })
}

fn instance_of(node: &VNodeRef) -> Result<Instance> {
    node.component_instance().ok_or_else(|| Error::MissingInstance {
        tag: node.tag().unwrap_or_default().to_string(),
    })
}

/// Create the instance for a placeholder, parented to the active instance.
pub fn create_component_instance_for_vnode(node: &VNodeRef, parent: Option<Instance>) -> Result<Instance> {
    let options = component_options(node)?;
    Ok(Instance::new(
        Rc::clone(&options.ctor),
        InstanceInit::component(Rc::clone(node), parent),
    ))
}

pub(crate) fn component_init(node: &VNodeRef) -> Result<()> {
    if let Some(child) = node.component_instance() {
        if !child.is_destroyed() && node.is_keep_alive() {
            // Kept-alive instance coming back: treat as an update.
            return component_prepatch(node, node);
        }
    }

    let parent = active_instance().or_else(|| node.context());
    let child = create_component_instance_for_vnode(node, parent)?;
    node.set_component_instance(&child);
    child.mount();
    Ok(())
}

pub(crate) fn component_prepatch(old: &VNodeRef, new: &VNodeRef) -> Result<()> {
    let options = component_options(new)?;
    let child = instance_of(old)?;
    new.set_component_instance(&child);
    lifecycle::update_child_component(
        &child,
        &options.props_data,
        &options.listeners,
        new,
        options.children.clone(),
    );
    Ok(())
}

pub(crate) fn component_insert(node: &VNodeRef) -> Result<()> {
    let child = instance_of(node)?;
    if !child.is_mounted() {
        child.set_mounted();
        tracing::debug!(uid = child.uid(), "mounted");
        lifecycle::call_hook(&child, LifecycleHook::Mounted);
    }
    if node.is_keep_alive() {
        let context_mounted = node.context().is_some_and(|vm| vm.is_mounted());
        if context_mounted {
            // Activating now could touch a subtree the current patch is
            // still working on; wait for the flush.
            scheduler::queue_activated_component(child);
        } else {
            lifecycle::activate_child_component(&child, true);
        }
    }
    Ok(())
}

pub(crate) fn component_destroy(node: &VNodeRef) -> Result<()> {
    let Some(child) = node.component_instance() else {
        return Ok(());
    };
    if child.is_destroyed() {
        return Ok(());
    }
    // A cached instance outlives its placeholder, not its owner.
    let owner_destroyed = node.context().is_some_and(|vm| vm.is_being_destroyed())
        || child.parent().is_some_and(|vm| vm.is_being_destroyed());
    if node.is_keep_alive() && !owner_destroyed {
        lifecycle::deactivate_child_component(&child, true);
    } else {
        child.destroy();
    }
    Ok(())
}
