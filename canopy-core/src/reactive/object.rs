//! Reactive data objects.
//!
//! A component's root data is a keyed collection of observable JSON values.
//! Reading a key that does not exist yet subscribes to the object's own key
//! dep, so adding that key later re-runs the reader.
//!
//! The same data object may back several instances. `vm_count` records how
//! many live instances use it as their root data.

use std::cell::{Cell, RefCell};
use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::dep::Dep;
use super::observable::Observable;

/// Observable root data of a component instance.
pub struct ReactiveObject {
    fields: RefCell<IndexMap<String, Observable<Value>>>,
    keys: Dep,
    vm_count: Cell<usize>,
}

impl ReactiveObject {
    /// Create an empty data object.
    pub fn new() -> Self {
        Self {
            fields: RefCell::new(IndexMap::new()),
            keys: Dep::new(),
            vm_count: Cell::new(0),
        }
    }

    /// Create a data object from a JSON map.
    pub fn from_map(map: Map<String, Value>) -> Self {
        let object = Self::new();
        {
            let mut fields = object.fields.borrow_mut();
            for (key, value) in map {
                fields.insert(key, Observable::new(value));
            }
        }
        object
    }

    /// Read a field, tracking the read.
    pub fn get(&self, key: &str) -> Option<Value> {
        let field = self.fields.borrow().get(key).cloned();
        match field {
            Some(observable) => Some(observable.get()),
            None => {
                self.keys.depend();
                None
            }
        }
    }

    /// Read a field without tracking.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        self.fields
            .borrow()
            .get(key)
            .map(Observable::get_untracked)
    }

    /// Write a field, adding it if it does not exist.
    pub fn set(&self, key: &str, value: Value) {
        let field = self.fields.borrow().get(key).cloned();
        match field {
            Some(observable) => observable.set(value),
            None => {
                self.fields
                    .borrow_mut()
                    .insert(key.to_string(), Observable::new(value));
                self.keys.notify();
            }
        }
    }

    /// Remove a field, notifying both its readers and key-set readers.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.fields.borrow_mut().shift_remove(key)?;
        let value = removed.get_untracked();
        removed.dep().notify();
        self.keys.notify();
        Some(value)
    }

    /// The observable backing `key`, if present.
    pub fn field(&self, key: &str) -> Option<Observable<Value>> {
        self.fields.borrow().get(key).cloned()
    }

    /// Current keys, tracking the key set.
    pub fn keys(&self) -> Vec<String> {
        self.keys.depend();
        self.fields.borrow().keys().cloned().collect()
    }

    /// Untracked JSON copy of the whole object.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .borrow()
            .iter()
            .map(|(key, field)| (key.clone(), field.get_untracked()))
            .collect();
        Value::Object(map)
    }

    /// Number of live instances using this object as root data.
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    pub(crate) fn retain_vm(&self) {
        self.vm_count.set(self.vm_count.get() + 1);
    }

    pub(crate) fn release_vm(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("value", &self.to_json())
            .field("vm_count", &self.vm_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Watcher, WatcherOptions};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn object(value: Value) -> Rc<ReactiveObject> {
        match value {
            Value::Object(map) => Rc::new(ReactiveObject::from_map(map)),
            _ => unreachable!("test data must be an object"),
        }
    }

    #[test]
    fn get_and_set_fields() {
        let data = object(json!({"count": 0}));
        assert_eq!(data.get("count"), Some(json!(0)));

        data.set("count", json!(3));
        assert_eq!(data.to_json(), json!({"count": 3}));
    }

    #[test]
    fn adding_a_missing_key_notifies_readers() {
        let data = object(json!({}));
        let runs = Rc::new(Cell::new(0));
        let (d, r) = (data.clone(), runs.clone());
        let _watcher = Watcher::new(
            move || {
                d.get("late");
                r.set(r.get() + 1);
                Ok(())
            },
            WatcherOptions::sync(),
        );

        data.set("late", json!(true));
        assert_eq!(runs.get(), 2);

        // Now subscribed to the field itself.
        data.set("late", json!(false));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn vm_count_saturates() {
        let data = ReactiveObject::new();
        data.retain_vm();
        data.release_vm();
        data.release_vm();
        assert_eq!(data.vm_count(), 0);
    }
}
