//! Functional Components
//!
//! A functional component has no instance, state or lifecycle. Its render
//! function runs while the parent renders, in the parent's context, and
//! receives a [`FunctionalContext`] with the props, data, children,
//! listeners and injections of the placeholder it replaces. Its output goes
//! straight into the parent's tree, marked with the functional definition
//! and the context it rendered in.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::create_element::Factory;
use super::vnode::{Listeners, ScopedSlots, VNode, VNodeData, VNodeRef};
use crate::error;
use crate::instance::{inject, render, ComponentOptions, Instance};

/// Everything a functional render function receives.
pub struct FunctionalContext {
    pub props: Map<String, Value>,
    pub data: VNodeData,
    pub children: Vec<VNodeRef>,
    pub listeners: Listeners,
    /// The instance the component is rendered in.
    pub parent: Instance,
    pub injections: Map<String, Value>,
}

impl FunctionalContext {
    /// Children grouped by slot name.
    pub fn slots(&self) -> IndexMap<String, Vec<VNodeRef>> {
        render::group_slots(Some(self.children.as_slice()))
    }

    pub fn scoped_slots(&self) -> Option<&ScopedSlots> {
        self.data.scoped_slots.as_ref()
    }
}

/// Render `ctor` in `context` and return its marked output.
///
/// With declared props, each one is taken from `props_data` (missing ones
/// are `null`). Without, the placeholder's attributes and props are passed
/// through as props.
pub(crate) fn create_functional_component(
    ctor: &Rc<ComponentOptions>,
    props_data: Map<String, Value>,
    data: VNodeData,
    context: &Instance,
    children: Vec<VNodeRef>,
) -> VNodeRef {
    let Some(render) = ctor.functional.clone() else {
        return VNode::empty();
    };

    let props = if ctor.props.is_empty() {
        let mut props = data.attrs.clone();
        props.extend(data.props.clone());
        props
    } else {
        ctor.props
            .iter()
            .map(|key| (key.clone(), props_data.get(key).cloned().unwrap_or(Value::Null)))
            .collect()
    };

    let injections = inject::resolve_inject(&ctor.inject, Some(context), Some(context.clone()));
    let slot = data.slot.clone();
    let fn_context = FunctionalContext {
        props,
        listeners: data.on.clone(),
        data,
        children,
        parent: context.clone(),
        injections,
    };

    match render(&Factory::new(context), &fn_context) {
        Ok(vnode) => vnode.mark_functional(context, ctor, slot),
        Err(err) => {
            error::handle_error(&err, Some(context), "render");
            VNode::empty()
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::instance::InstanceInit;
    use crate::Error;
    use serde_json::json;
    use std::cell::Cell;

    fn host() -> Instance {
        Instance::new(
            ComponentOptions::builder()
                .provide(|_| json!({"theme": "dark"}))
                .build(),
            InstanceInit::root(),
        )
    }

    #[test]
    fn declared_props_are_picked_from_props_data() {
        let ctor = ComponentOptions::builder()
            .prop("label")
            .prop("size")
            .functional(|h, ctx| Ok(h.text(ctx.props["label"].as_str().unwrap_or_default().to_string())))
            .build();
        let vm = host();
        let mut props_data = Map::new();
        props_data.insert("label".into(), json!("ok"));

        let node = create_functional_component(&ctor, props_data, VNodeData::new(), &vm, vec![]);

        assert_eq!(node.text_content(), Some("ok"));
        assert!(node.functional_context().is_some_and(|c| c.ptr_eq(&vm)));
        assert!(node.functional_options().is_some_and(|o| Rc::ptr_eq(o, &ctor)));
    }

    #[test]
    fn undeclared_props_come_from_attrs_and_props() {
        let seen = Rc::new(std::cell::RefCell::new(Map::new()));
        let sink = seen.clone();
        let ctor = ComponentOptions::builder()
            .functional(move |h, ctx| {
                *sink.borrow_mut() = ctx.props.clone();
                Ok(h.empty())
            })
            .build();
        let vm = host();
        let data = VNodeData::new().attr("id", json!("x")).prop("checked", json!(true));

        create_functional_component(&ctor, Map::new(), data, &vm, vec![]);

        assert_eq!(Value::Object(seen.borrow().clone()), json!({"id": "x", "checked": true}));
    }

    #[test]
    fn context_exposes_slots_injections_and_slot_name() {
        let ctor = ComponentOptions::builder()
            .inject("theme")
            .functional(|h, ctx| {
                let slots = ctx.slots();
                let mut children = slots.get("header").cloned().unwrap_or_default();
                children.push(h.text(ctx.injections["theme"].as_str().unwrap_or_default().to_string()));
                Ok(h.element("div", None, children))
            })
            .build();
        let vm = host();
        let header = VNode::element("h1", Some(VNodeData::new().slot("header")), vec![], None);
        let data = VNodeData::new().slot("aside");

        let node = create_functional_component(&ctor, Map::new(), data, &vm, vec![header]);

        assert_eq!(
            node.to_json(),
            json!({"tag": "div", "children": [{"tag": "h1"}, {"text": "dark"}]})
        );
        assert_eq!(node.data().and_then(|d| d.slot.as_deref()), Some("aside"));
    }

    #[test]
    fn render_errors_are_reported_against_the_parent() {
        let ctor = ComponentOptions::builder()
            .functional(|_, _| Err(Error::msg("bad functional")))
            .build();
        let vm = host();
        let reported = Rc::new(Cell::new(0));
        let r = reported.clone();
        config::set_error_handler(Some(Rc::new(move |_err: &Error, _vm: Option<&Instance>, info: &str| {
            assert_eq!(info, "render");
            r.set(r.get() + 1);
        })));

        let node = create_functional_component(&ctor, Map::new(), VNodeData::new(), &vm, vec![]);
        config::set_error_handler(None);

        assert!(node.is_comment());
        assert_eq!(reported.get(), 1);
    }
}
