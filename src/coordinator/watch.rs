//! Concurrent observation maps
//!
//! The ack map and the connections map are written by the observation layer
//! while the coordinator reads them. The coordinator iterates each map once
//! per computation and tolerates interleaved writes; anything it misses is
//! picked up on the next invocation.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// A concurrent map with canonical (sorted) iteration order.
#[derive(Debug, Default)]
pub struct WatchableMap<K, V> {
    inner: RwLock<BTreeMap<K, V>>,
}

impl<K: Ord + Clone, V: Clone> WatchableMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get_key(&self, key: &K) -> Option<V> {
        self.inner.read().unwrap().get(key).cloned()
    }

    pub fn set_key(&self, key: K, value: V) {
        self.inner.write().unwrap().insert(key, value);
    }

    pub fn delete_key(&self, key: &K) {
        self.inner.write().unwrap().remove(key);
    }

    /// Visit every entry in key order under the read lock.
    pub fn read_all<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        for (key, value) in self.inner.read().unwrap().iter() {
            visitor(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}
