//! Provide and inject.
//!
//! An instance offers values to its whole subtree through `provide`.
//! Descendants name the keys they want with `inject`; each key is looked up
//! on the closest ancestor providing it. Injected values are resolved once,
//! when the instance is created.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{Injection, Instance};
use crate::error;
use crate::reactive::{Observable, ReactiveContext};

/// Resolve `inject` by walking from `start` up through its ancestors.
///
/// Keys nobody provides take their default; keys without a default are
/// warned about and left out.
pub(crate) fn resolve_inject(
    inject: &IndexMap<String, Injection>,
    vm: Option<&Instance>,
    start: Option<Instance>,
) -> Map<String, Value> {
    let mut result = Map::new();
    for (key, injection) in inject {
        let mut source = start.clone();
        let mut found = None;
        while let Some(current) = source {
            if let Some(value) = current.provided(&injection.from) {
                found = Some(value);
                break;
            }
            source = current.parent();
        }
        match found.or_else(|| injection.default.clone()) {
            Some(value) => {
                result.insert(key.clone(), value);
            }
            None => error::warn(&format!("Injection \"{}\" not found", key), vm),
        }
    }
    result
}

pub(crate) fn init_injections(vm: &Instance) {
    let inject = &vm.options().inject;
    if inject.is_empty() {
        return;
    }
    let resolved = resolve_inject(inject, Some(vm), vm.parent());
    let mut injected = vm.inner.injected.borrow_mut();
    for (key, value) in resolved {
        injected.insert(key, Observable::new(value));
    }
}

pub(crate) fn init_provide(vm: &Instance) {
    let Some(provide) = vm.options().provide.clone() else {
        return;
    };
    let value = {
        let _quiet = ReactiveContext::untracked();
        provide(vm)
    };
    match value {
        Value::Object(map) => *vm.inner.provided.borrow_mut() = map,
        _ => error::warn("provide functions should return an object", Some(vm)),
    }
}

impl Instance {
    /// A value this instance provides to its descendants.
    pub fn provided(&self, key: &str) -> Option<Value> {
        self.inner.provided.borrow().get(key).cloned()
    }

    /// An injected value, tracked.
    pub fn injected(&self, key: &str) -> Option<Value> {
        let field = self.inner.injected.borrow().get(key).cloned();
        field.map(|f| f.get())
    }

    pub(crate) fn injected_field(&self, key: &str) -> Option<Observable<Value>> {
        self.inner.injected.borrow().get(key).cloned()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::instance::{ComponentOptions, InstanceInit};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn nearest_provider_wins() {
        let root = Instance::new(
            ComponentOptions::builder()
                .provide(|_| json!({"theme": "dark", "locale": "en"}))
                .build(),
            InstanceInit::root(),
        );
        let middle = Instance::new(
            ComponentOptions::builder()
                .provide(|_| json!({"theme": "light"}))
                .build(),
            InstanceInit::root().with_parent(&root),
        );
        let leaf = Instance::new(
            ComponentOptions::builder()
                .inject("theme")
                .inject("locale")
                .inject_from("lang", "locale", None)
                .build(),
            InstanceInit::root().with_parent(&middle),
        );

        assert_eq!(leaf.get("theme"), json!("light"));
        assert_eq!(leaf.get("locale"), json!("en"));
        assert_eq!(leaf.injected("lang"), Some(json!("en")));
    }

    #[test]
    fn own_provide_is_not_visible_to_self() {
        let vm = Instance::new(
            ComponentOptions::builder()
                .provide(|_| json!({"token": 1}))
                .inject_from("token", "token", Some(json!(0)))
                .build(),
            InstanceInit::root(),
        );
        assert_eq!(vm.injected("token"), Some(json!(0)));
        assert_eq!(vm.provided("token"), Some(json!(1)));
    }

    #[test]
    fn provide_sees_initialized_state() {
        let vm = Instance::new(
            ComponentOptions::builder()
                .data(|_| json!({"count": 3}))
                .provide(|vm| json!({"initial": vm.get("count")}))
                .build(),
            InstanceInit::root(),
        );
        assert_eq!(vm.provided("initial"), Some(json!(3)));
    }

    #[test]
    fn missing_injection_warns() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        config::set_warn_handler(Some(Rc::new(move |msg: &str, _vm: Option<&Instance>| {
            sink.borrow_mut().push(msg.to_string());
        })));
        let vm = Instance::new(ComponentOptions::builder().inject("store").build(), InstanceInit::root());
        config::set_warn_handler(None);

        assert_eq!(*warnings.borrow(), vec!["Injection \"store\" not found".to_string()]);
        assert_eq!(vm.injected("store"), None);
        assert_eq!(vm.get("store"), Value::Null);
    }
}
