//! Integration Tests for Components
//!
//! These tests mount small component trees through the built-in patcher and
//! check lifecycle ordering, slot updates, keep-alive behaviour and error
//! propagation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use canopy_core::instance::{active_instance, ActiveInstanceGuard};
use canopy_core::{
    config, scheduler, ComponentOptions, Error, Instance, InstanceInit, KeepAliveCache,
    LifecycleHook, VNodeData,
};
use serde_json::{json, Value};

type Log = Rc<RefCell<Vec<String>>>;

fn record(log: &Log, entry: impl Into<String>) -> impl Fn(&Instance) -> canopy_core::Result<()> {
    let log = log.clone();
    let entry = entry.into();
    move |_: &Instance| {
        log.borrow_mut().push(entry.clone());
        Ok(())
    }
}

/// Test that a kept-alive subtree is deactivated and re-activated, never
/// destroyed, when its placeholder leaves the tree and comes back.
#[test]
fn keep_alive_subtree_round_trip() {
    let log = Log::default();

    let badge = ComponentOptions::builder()
        .name("badge")
        .hook(LifecycleHook::Activated, record(&log, "badge activated"))
        .hook(LifecycleHook::Deactivated, record(&log, "badge deactivated"))
        .hook(LifecycleHook::Destroyed, record(&log, "badge destroyed"))
        .render(|h| Ok(h.element("p", None, vec![h.text("inner")])))
        .build();

    let panel = ComponentOptions::builder()
        .name("panel")
        .component("badge", badge)
        .hook(LifecycleHook::Activated, record(&log, "panel activated"))
        .hook(LifecycleHook::Deactivated, record(&log, "panel deactivated"))
        .hook(LifecycleHook::Destroyed, record(&log, "panel destroyed"))
        .render(|h| Ok(h.element("div", None, vec![h.element("badge", None, vec![])])))
        .build();

    let cache = Rc::new(RefCell::new(KeepAliveCache::new()));
    let c = cache.clone();
    let root = ComponentOptions::builder()
        .data(|_| json!({"show": true}))
        .component("panel", panel)
        .render(move |h| {
            let child = if h.vm().get("show") == json!(true) {
                c.borrow_mut().resolve("panel", h.element("panel", None, vec![]))
            } else {
                h.empty()
            };
            Ok(h.element("main", None, vec![child]))
        })
        .build();

    let vm = Instance::new(root, InstanceInit::root());
    vm.mount();
    let panel_vm = vm.children()[0].clone();
    let badge_vm = panel_vm.children()[0].clone();
    assert_eq!(panel_vm.name(), Some("panel"));
    assert_eq!(panel_vm.inactive(), Some(false));
    log.borrow_mut().clear();

    vm.set("show", json!(false));
    scheduler::flush();
    assert_eq!(*log.borrow(), vec!["badge deactivated", "panel deactivated"]);
    assert_eq!(badge_vm.inactive(), Some(true));

    log.borrow_mut().clear();
    vm.set("show", json!(true));
    scheduler::flush();
    assert_eq!(*log.borrow(), vec!["badge activated", "panel activated"]);
    assert_eq!(badge_vm.inactive(), Some(false));

    assert!(!panel_vm.is_destroyed());
    assert!(!badge_vm.is_destroyed());
    assert!(vm.children()[0].ptr_eq(&panel_vm));

    // Kept instances go with their owner.
    vm.destroy();
    assert!(panel_vm.is_destroyed());
    assert!(badge_vm.is_destroyed());
}

/// Test that a tag the platform reserves stays an element even when a
/// component is registered under the same name.
#[test]
fn reserved_tags_never_resolve_to_components() {
    let link = ComponentOptions::builder().name("link").build();
    let page = ComponentOptions::builder()
        .component("a", link)
        .render(|h| Ok(h.element("nav", None, vec![h.element("a", None, vec![])])))
        .build();

    let vm = Instance::new(page, InstanceInit::root());
    vm.mount();

    assert!(config::is_reserved_tag("a"));
    assert!(vm.children().is_empty());
    assert_eq!(
        vm.vnode().expect("tree").to_json(),
        json!({"tag": "nav", "children": [{"tag": "a"}]})
    );
}

/// Test that destroying an owner destroys its cached instances, in the tree
/// or out of it, and that neither re-renders afterwards.
#[test]
fn cached_instances_are_destroyed_with_their_owner() {
    let shared = canopy_core::reactive::Observable::new(0);
    let renders = Rc::new(RefCell::new(Vec::new()));

    let reader = |name: &'static str| {
        let (s, r) = (shared.clone(), renders.clone());
        ComponentOptions::builder()
            .name(name)
            .render(move |h| {
                r.borrow_mut().push(name);
                Ok(h.text(s.get().to_string()))
            })
            .build()
    };

    let cache = Rc::new(RefCell::new(KeepAliveCache::new()));
    let c = cache.clone();
    let root = ComponentOptions::builder()
        .data(|_| json!({"show": "panel"}))
        .component("panel", reader("panel"))
        .component("badge", reader("badge"))
        .render(move |h| {
            let name = h.vm().get("show").as_str().unwrap_or("panel").to_string();
            let child = c.borrow_mut().resolve(name.clone(), h.element(&name, None, vec![]));
            Ok(h.element("main", None, vec![child]))
        })
        .build();

    let vm = Instance::new(root, InstanceInit::root());
    vm.mount();
    let panel_vm = vm.children()[0].clone();

    vm.set("show", json!("badge"));
    scheduler::flush();
    let badge_vm = vm.children()[1].clone();
    assert_eq!(panel_vm.inactive(), Some(true));
    assert_eq!(badge_vm.inactive(), Some(false));
    assert_eq!(*renders.borrow(), vec!["panel", "badge"]);

    vm.destroy();
    shared.set(1);
    scheduler::flush();

    assert!(panel_vm.is_destroyed());
    assert!(badge_vm.is_destroyed());
    assert!(vm.children().is_empty());
    assert_eq!(*renders.borrow(), vec!["panel", "badge"]);
}

/// Test that evicting an entry whose instance is still in the tree keeps
/// the instance alive and patchable.
#[test]
fn lru_eviction_spares_instances_in_the_tree() {
    let errors = Rc::new(Cell::new(0));
    let e = errors.clone();
    config::set_error_handler(Some(Rc::new(move |_err: &Error, _vm: Option<&Instance>, _info: &str| {
        e.set(e.get() + 1);
    })));

    let panel = ComponentOptions::builder()
        .name("panel")
        .render(|h| Ok(h.element("div", None, vec![])))
        .build();
    let badge = ComponentOptions::builder()
        .name("badge")
        .render(|h| Ok(h.element("span", None, vec![])))
        .build();

    let cache = Rc::new(RefCell::new(KeepAliveCache::with_max(1)));
    let c = cache.clone();
    let root = ComponentOptions::builder()
        .data(|_| json!({"tick": 0}))
        .component("panel", panel)
        .component("badge", badge)
        .render(move |h| {
            h.vm().get("tick");
            let mut cache = c.borrow_mut();
            let first = cache.resolve("a", h.element("panel", None, vec![]));
            let second = cache.resolve("b", h.element("badge", None, vec![]));
            Ok(h.element("main", None, vec![first, second]))
        })
        .build();

    let vm = Instance::new(root, InstanceInit::root());
    vm.mount();
    let children = vm.children();
    assert_eq!(children.len(), 2);

    vm.set("tick", json!(1));
    scheduler::flush();
    config::set_error_handler(None);

    assert_eq!(errors.get(), 0);
    assert_eq!(vm.children().len(), 2);
    for (before, after) in children.iter().zip(vm.children()) {
        assert!(before.ptr_eq(&after));
        assert!(!after.is_destroyed());
    }
    assert_eq!(cache.borrow().keys(), vec!["b"]);
}

/// Test that a `model` binding passes the value down as a prop and turns
/// the child's input event into an update of the parent.
#[test]
fn model_binding_round_trip() {
    let text_input = ComponentOptions::builder()
        .name("text-input")
        .prop("value")
        .render(|h| Ok(h.element("input", Some(VNodeData::new().attr("value", h.vm().get("value"))), vec![])))
        .build();

    let form = ComponentOptions::builder()
        .data(|_| json!({"text": "hi"}))
        .component("text-input", text_input)
        .render(|h| {
            let parent = h.vm().downgrade();
            let data = VNodeData::new().model(h.vm().get("text"), move |_, args: &[Value]| {
                if let Some(parent) = parent.upgrade() {
                    parent.set("text", args.first().cloned().unwrap_or(Value::Null));
                }
                Ok(())
            });
            Ok(h.element("form", None, vec![h.element("text-input", Some(data), vec![])]))
        })
        .build();

    let vm = Instance::new(form, InstanceInit::root());
    vm.mount();
    let input = vm.children()[0].clone();
    assert_eq!(input.prop("value"), Some(json!("hi")));
    assert_eq!(input.listener_count("input"), 1);

    input.emit("input", &[json!("bye")]);
    scheduler::flush();

    assert_eq!(vm.get("text"), json!("bye"));
    assert_eq!(input.prop("value"), Some(json!("bye")));
}

/// Test that switching `is` replaces the component behind a placeholder.
#[test]
fn dynamic_is_switches_components() {
    let alpha = ComponentOptions::builder().name("alpha").render(|h| Ok(h.text("a"))).build();
    let beta = ComponentOptions::builder().name("beta").render(|h| Ok(h.text("b"))).build();
    let host = ComponentOptions::builder()
        .data(|_| json!({"view": "alpha"}))
        .component("alpha", alpha)
        .component("beta", beta)
        .render(|h| {
            let view = h.vm().get("view").as_str().unwrap_or_default().to_string();
            let data = VNodeData::new().is(view);
            Ok(h.element("div", None, vec![h.element("component", Some(data), vec![])]))
        })
        .build();

    let vm = Instance::new(host, InstanceInit::root());
    vm.mount();
    let first = vm.children()[0].clone();
    assert_eq!(first.name(), Some("alpha"));

    vm.set("view", json!("beta"));
    scheduler::flush();

    assert!(first.is_destroyed());
    assert_eq!(vm.children().len(), 1);
    assert_eq!(vm.children()[0].name(), Some("beta"));
}

/// Test that a functional component renders inline, with no instance of
/// its own, and follows its parent's updates and provided values.
#[test]
fn functional_component_renders_inline() {
    let label = ComponentOptions::builder()
        .name("fancy-label")
        .prop("text")
        .inject("theme")
        .functional(|h, ctx| {
            let text = format!(
                "{} ({})",
                ctx.props["text"].as_str().unwrap_or_default(),
                ctx.injections["theme"].as_str().unwrap_or_default()
            );
            Ok(h.element("span", None, vec![h.text(text)]))
        })
        .build();

    let page = ComponentOptions::builder()
        .data(|_| json!({"caption": "one"}))
        .provide(|_| json!({"theme": "dark"}))
        .component("fancy-label", label)
        .render(|h| {
            let data = VNodeData::new().attr("text", h.vm().get("caption"));
            Ok(h.element("main", None, vec![h.element("fancy-label", Some(data), vec![])]))
        })
        .build();

    let vm = Instance::new(page, InstanceInit::root());
    vm.mount();
    assert!(vm.children().is_empty());
    assert_eq!(
        vm.vnode().expect("tree").to_json(),
        json!({"tag": "main", "children": [{"tag": "span", "children": [{"text": "one (dark)"}]}]})
    );

    vm.set("caption", json!("two"));
    scheduler::flush();
    assert_eq!(
        vm.vnode().expect("tree").to_json(),
        json!({"tag": "main", "children": [{"tag": "span", "children": [{"text": "two (dark)"}]}]})
    );
}

/// Test that a descendant component reads what an ancestor provides, and
/// that writing an injected value warns.
#[test]
fn provided_values_reach_descendants() {
    let warnings = Rc::new(RefCell::new(Vec::new()));
    let sink = warnings.clone();
    config::set_warn_handler(Some(Rc::new(move |msg: &str, _vm: Option<&Instance>| {
        sink.borrow_mut().push(msg.to_string());
    })));

    let leaf = ComponentOptions::builder()
        .name("leaf")
        .inject("locale")
        .render(|h| Ok(h.text(h.vm().get("locale").as_str().unwrap_or_default().to_string())))
        .build();
    let middle = ComponentOptions::builder()
        .name("middle")
        .component("leaf", leaf)
        .render(|h| Ok(h.element("div", None, vec![h.element("leaf", None, vec![])])))
        .build();
    let app = ComponentOptions::builder()
        .provide(|_| json!({"locale": "fr"}))
        .component("middle", middle)
        .render(|h| Ok(h.element("main", None, vec![h.element("middle", None, vec![])])))
        .build();

    let vm = Instance::new(app, InstanceInit::root());
    vm.mount();
    let leaf_vm = vm.children()[0].children()[0].clone();
    assert_eq!(leaf_vm.get("locale"), json!("fr"));

    leaf_vm.set("locale", json!("de"));
    config::set_warn_handler(None);

    assert_eq!(leaf_vm.get("locale"), json!("de"));
    assert_eq!(warnings.borrow().len(), 1);
    assert!(warnings.borrow()[0].contains("Avoid mutating an injected value"));
}

/// Test that new static slot content forces the child to re-render even
/// though none of its own state changed.
#[test]
fn static_slot_content_forces_child_render() {
    let child_renders = Rc::new(Cell::new(0));
    let r = child_renders.clone();
    let card = ComponentOptions::builder()
        .name("card")
        .render(move |h| {
            r.set(r.get() + 1);
            Ok(h.element("div", None, h.slot("default")))
        })
        .build();

    let parent = ComponentOptions::builder()
        .data(|_| json!({"label": "first"}))
        .component("card", card)
        .render(|h| {
            let label = h.vm().get("label").as_str().unwrap_or_default().to_string();
            Ok(h.element("section", None, vec![h.element("card", None, vec![h.text(label)])]))
        })
        .build();

    let vm = Instance::new(parent, InstanceInit::root());
    vm.mount();
    assert_eq!(child_renders.get(), 1);

    vm.set("label", json!("second"));
    scheduler::flush();

    assert_eq!(child_renders.get(), 2);
    let tree = vm.vnode().expect("parent tree").to_json();
    assert_eq!(
        tree,
        json!({
            "tag": "section",
            "children": [{
                "component": "card",
                "children": [{"tag": "div", "children": [{"text": "second"}]}]
            }]
        })
    );
}

/// Test that a child without slot content is not re-rendered by its parent.
#[test]
fn unchanged_child_is_not_re_rendered() {
    let child_renders = Rc::new(Cell::new(0));
    let r = child_renders.clone();
    let leaf = ComponentOptions::builder()
        .name("leaf")
        .prop("value")
        .render(move |h| {
            r.set(r.get() + 1);
            Ok(h.text(h.vm().get("value").to_string()))
        })
        .build();

    let parent = ComponentOptions::builder()
        .data(|_| json!({"value": 1, "unrelated": 0}))
        .component("leaf", leaf)
        .render(|h| {
            h.vm().get("unrelated");
            let data = VNodeData::new().attr("value", h.vm().get("value"));
            Ok(h.element("div", None, vec![h.element("leaf", Some(data), vec![])]))
        })
        .build();

    let vm = Instance::new(parent, InstanceInit::root());
    vm.mount();
    let leaf_vm = vm.children()[0].clone();
    assert_eq!(leaf_vm.prop("value"), Some(json!(1)));

    vm.set("unrelated", json!(1));
    scheduler::flush();
    assert_eq!(child_renders.get(), 1);

    vm.set("value", json!(2));
    scheduler::flush();
    assert_eq!(child_renders.get(), 2);
    assert_eq!(leaf_vm.prop("value"), Some(json!(2)));
    assert!(leaf_vm.attrs().is_empty());
}

/// Test that an instance created during another instance's render is
/// parented to that instance, and that the previous active instance comes
/// back afterwards.
#[test]
fn nested_instantiation_captures_rendering_parent() {
    let created: Rc<RefCell<Option<Instance>>> = Rc::new(RefCell::new(None));
    let slot = created.clone();
    let inner = ComponentOptions::builder().name("x").build();
    let outer = ComponentOptions::builder()
        .name("y")
        .render(move |h| {
            if slot.borrow().is_none() {
                let init = InstanceInit {
                    parent: active_instance(),
                    ..InstanceInit::default()
                };
                *slot.borrow_mut() = Some(Instance::new(inner.clone(), init));
            }
            Ok(h.empty())
        })
        .build();

    let bystander = Instance::new(ComponentOptions::builder().build(), InstanceInit::root());
    let _guard = ActiveInstanceGuard::enter(&bystander);

    let y = Instance::new(outer, InstanceInit::root());
    y.mount();

    let x = created.borrow().clone().expect("x was created");
    assert!(x.parent().is_some_and(|p| p.ptr_eq(&y)));
    assert!(active_instance().is_some_and(|vm| vm.ptr_eq(&bystander)));
}

/// Test that children created from placeholders are parented to the
/// instance whose tree contains them.
#[test]
fn placeholder_children_belong_to_rendering_instance() {
    let leaf = ComponentOptions::builder()
        .name("leaf")
        .render(|h| Ok(h.element("i", None, vec![])))
        .build();
    let middle = ComponentOptions::builder()
        .name("middle")
        .component("leaf", leaf)
        .render(|h| Ok(h.element("div", None, vec![h.element("leaf", None, vec![])])))
        .build();
    let root = ComponentOptions::builder()
        .component("middle", middle)
        .render(|h| Ok(h.element("main", None, vec![h.element("middle", None, vec![])])))
        .build();

    let vm = Instance::new(root, InstanceInit::root());
    vm.mount();

    let middle_vm = vm.children()[0].clone();
    let leaf_vm = middle_vm.children()[0].clone();
    assert_eq!(middle_vm.name(), Some("middle"));
    assert!(leaf_vm.parent().is_some_and(|p| p.ptr_eq(&middle_vm)));
    assert!(leaf_vm.root().ptr_eq(&vm));
    assert!(middle_vm.is_mounted() && leaf_vm.is_mounted());
    assert!(active_instance().is_none());
}

/// Test lifecycle ordering: mounted children first, destroyed children
/// first, and a second destroy changes nothing.
#[test]
fn lifecycle_order_and_idempotent_destroy() {
    let log = Log::default();
    let child = ComponentOptions::builder()
        .name("child")
        .hook(LifecycleHook::Created, record(&log, "child created"))
        .hook(LifecycleHook::Mounted, record(&log, "child mounted"))
        .hook(LifecycleHook::BeforeDestroy, record(&log, "child beforeDestroy"))
        .hook(LifecycleHook::Destroyed, record(&log, "child destroyed"))
        .render(|h| Ok(h.element("span", None, vec![])))
        .build();
    let parent = ComponentOptions::builder()
        .name("parent")
        .component("child", child)
        .hook(LifecycleHook::Created, record(&log, "parent created"))
        .hook(LifecycleHook::BeforeMount, record(&log, "parent beforeMount"))
        .hook(LifecycleHook::Mounted, record(&log, "parent mounted"))
        .hook(LifecycleHook::BeforeDestroy, record(&log, "parent beforeDestroy"))
        .hook(LifecycleHook::Destroyed, record(&log, "parent destroyed"))
        .render(|h| Ok(h.element("div", None, vec![h.element("child", None, vec![])])))
        .build();

    let vm = Instance::new(parent, InstanceInit::root());
    vm.mount();
    assert_eq!(
        *log.borrow(),
        vec![
            "parent created",
            "parent beforeMount",
            "child created",
            "child mounted",
            "parent mounted"
        ]
    );

    let child_vm = vm.children()[0].clone();
    log.borrow_mut().clear();
    vm.destroy();
    let after_first: Vec<String> = log.borrow().clone();
    vm.destroy();

    assert_eq!(
        after_first,
        vec![
            "parent beforeDestroy",
            "child beforeDestroy",
            "child destroyed",
            "parent destroyed"
        ]
    );
    assert_eq!(*log.borrow(), after_first);
    assert!(vm.is_destroyed() && child_vm.is_destroyed());
    assert!(vm.children().is_empty());
    assert!(vm.watchers().is_empty());
    assert!(vm.placeholder().is_none());
}

/// Test that the parent flushes before the child and `updated` runs child
/// first.
#[test]
fn parents_flush_before_children() {
    let log = Log::default();
    let shared = canopy_core::reactive::Observable::new(0);

    let (s, l) = (shared.clone(), log.clone());
    let child = ComponentOptions::builder()
        .name("child")
        .hook(LifecycleHook::BeforeUpdate, record(&log, "child beforeUpdate"))
        .hook(LifecycleHook::Updated, record(&log, "child updated"))
        .render(move |h| {
            l.borrow_mut().push("child render".into());
            Ok(h.text(s.get().to_string()))
        })
        .build();

    let (s, l) = (shared.clone(), log.clone());
    let parent = ComponentOptions::builder()
        .component("child", child)
        .hook(LifecycleHook::BeforeUpdate, record(&log, "parent beforeUpdate"))
        .hook(LifecycleHook::Updated, record(&log, "parent updated"))
        .render(move |h| {
            l.borrow_mut().push("parent render".into());
            Ok(h.element("div", Some(VNodeData::new().attr("n", json!(s.get()))), vec![h.element("child", None, vec![])]))
        })
        .build();

    let vm = Instance::new(parent, InstanceInit::root());
    vm.mount();
    log.borrow_mut().clear();

    shared.set(1);
    scheduler::flush();

    assert_eq!(
        *log.borrow(),
        vec![
            "parent beforeUpdate",
            "parent render",
            "child beforeUpdate",
            "child render",
            "child updated",
            "parent updated"
        ]
    );
}

/// Test that `error_captured` on an ancestor intercepts a child's failure.
#[test]
fn ancestors_capture_child_errors() {
    let captured = Rc::new(RefCell::new(Vec::new()));
    let global = Rc::new(Cell::new(0));

    let g = global.clone();
    config::set_error_handler(Some(Rc::new(move |_err: &Error, _vm: Option<&Instance>, _info: &str| {
        g.set(g.get() + 1);
    })));

    let child = ComponentOptions::builder()
        .name("fragile")
        .hook(LifecycleHook::Mounted, |_| Err(Error::msg("mount failed")))
        .render(|h| Ok(h.empty()))
        .build();
    let sink = captured.clone();
    let parent = ComponentOptions::builder()
        .component("fragile", child)
        .error_captured(move |err, vm, info| {
            sink.borrow_mut().push(format!("{} {}: {}", vm.name().unwrap_or("?"), info, err));
            false
        })
        .render(|h| Ok(h.element("div", None, vec![h.element("fragile", None, vec![])])))
        .build();

    let vm = Instance::new(parent, InstanceInit::root());
    vm.mount();
    config::set_error_handler(None);

    assert_eq!(*captured.borrow(), vec!["fragile mounted hook: mount failed".to_string()]);
    assert_eq!(global.get(), 0);
    assert!(vm.children()[0].is_mounted());
}

/// Test that component listeners receive emitted events and are replaced on
/// parent re-render.
#[test]
fn component_events_reach_parent_listeners() {
    let received = Rc::new(RefCell::new(Vec::new()));
    let button = ComponentOptions::builder()
        .name("counter-button")
        .render(|h| Ok(h.element("button", None, vec![])))
        .build();

    let sink = received.clone();
    let parent = ComponentOptions::builder()
        .data(|_| json!({"tick": 0}))
        .component("counter-button", button)
        .render(move |h| {
            h.vm().get("tick");
            let sink = sink.clone();
            let data = VNodeData::new().on("press", move |_, args: &[Value]| {
                sink.borrow_mut().push(args.to_vec());
                Ok(())
            });
            Ok(h.element("div", None, vec![h.element("counter-button", Some(data), vec![])]))
        })
        .build();

    let vm = Instance::new(parent, InstanceInit::root());
    vm.mount();
    let button_vm = vm.children()[0].clone();
    button_vm.emit("press", &[json!(1)]);
    assert_eq!(button_vm.listener_count("press"), 1);

    vm.set("tick", json!(1));
    scheduler::flush();
    assert_eq!(button_vm.listener_count("press"), 1);

    button_vm.emit("press", &[json!(2)]);
    assert_eq!(*received.borrow(), vec![vec![json!(1)], vec![json!(2)]]);
}
