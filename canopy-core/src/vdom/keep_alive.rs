//! Keep-Alive Cache
//!
//! Keeps component instances alive while their placeholders leave the tree.
//! A render function passes each candidate placeholder through
//! [`KeepAliveCache::resolve`]; when the key was seen before, the cached
//! instance is moved onto the new placeholder, which is then marked
//! keep-alive. Removing a keep-alive placeholder deactivates its instance and
//! re-inserting it activates the instance again.
//!
//! The cache is least-recently-used: with a maximum set, resolving a new key
//! beyond the limit evicts the oldest entry. An evicted instance that is out
//! of the tree is destroyed; one still in the tree loses its keep-alive mark
//! and is destroyed like any other child once its placeholder goes away.
//! Cached instances are children of the instance that rendered them and are
//! destroyed with it.

use std::fmt;

use indexmap::IndexMap;

use super::vnode::VNodeRef;

#[derive(Default)]
pub struct KeepAliveCache {
    entries: IndexMap<String, VNodeRef>,
    max: Option<usize>,
}

impl KeepAliveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `max` entries.
    pub fn with_max(max: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            max: Some(max),
        }
    }

    /// Route `vnode` through the cache under `key`. Non-component nodes are
    /// returned untouched.
    pub fn resolve(&mut self, key: impl Into<String>, vnode: VNodeRef) -> VNodeRef {
        if !vnode.is_component() {
            return vnode;
        }
        let key = key.into();

        if let Some(cached) = self.entries.shift_remove(&key) {
            if let Some(vm) = cached.component_instance() {
                if !vm.is_destroyed() {
                    vnode.set_component_instance(&vm);
                }
            }
        }
        vnode.set_keep_alive(true);
        self.entries.insert(key.clone(), VNodeRef::clone(&vnode));

        if let Some(max) = self.max {
            while self.entries.len() > max {
                let Some(oldest) = self.entries.keys().next().cloned() else {
                    break;
                };
                if oldest == key {
                    break;
                }
                self.prune(&oldest);
            }
        }
        vnode
    }

    /// Drop `key` from the cache.
    ///
    /// A deactivated instance is destroyed. An instance still in the tree is
    /// left alone, and so is one whose entry was resolved by a render that
    /// has not been patched yet.
    pub fn prune(&mut self, key: &str) {
        let Some(entry) = self.entries.shift_remove(key) else {
            return;
        };
        let Some(vm) = entry.component_instance() else {
            return;
        };
        let pending = !vm
            .placeholder()
            .is_some_and(|placeholder| VNodeRef::ptr_eq(&placeholder, &entry));
        if pending {
            return;
        }
        if vm.inactive() == Some(true) {
            tracing::debug!(key, uid = vm.uid(), "prune keep-alive entry");
            vm.destroy();
        } else {
            entry.set_keep_alive(false);
        }
    }

    /// Drop every entry, destroying the instances that are out of the tree.
    pub fn clear(&mut self) {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for key in keys {
            self.prune(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Cached keys, least recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl fmt::Debug for KeepAliveCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAliveCache")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .field("max", &self.max)
            .finish()
    }
}
