//! Key-scoped mutable state with per-entry locking.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// A map whose entries are individually lockable, so concurrent updates
/// contend only when they touch the same key. The outer lock is held just
/// long enough to find or create an entry.
pub struct KeyedState<K, V> {
    entries: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K: Eq + Hash + Clone, V> KeyedState<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Runs `f` against the entry for `key`, creating it first if needed.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> R
    where
        V: Default,
    {
        let entry = {
            let entries = self.entries.read();
            entries.get(key).cloned()
        };
        let entry = match entry {
            Some(entry) => entry,
            None => self
                .entries
                .write()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(V::default())))
                .clone(),
        };
        let mut guard = entry.lock();
        f(&mut guard)
    }

    /// Replaces the entry for `key` wholesale. Callers racing an in-flight
    /// `update` on the same key must serialize externally; the engine only
    /// replaces during recompute.
    pub fn replace(&self, key: K, value: V) {
        self.entries
            .write()
            .insert(key, Arc::new(Mutex::new(value)));
    }

    /// Clones the current value for `key`.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.entries
            .read()
            .get(key)
            .map(|entry| entry.lock().clone())
    }

    /// Removes and returns the value for `key`.
    pub fn remove(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.entries
            .write()
            .remove(key)
            .map(|entry| entry.lock().clone())
    }

    /// Removes every entry whose key matches the predicate.
    pub fn remove_matching(&self, pred: impl Fn(&K) -> bool) {
        self.entries.write().retain(|k, _| !pred(k));
    }

    /// Clones all entries.
    pub fn snapshot(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.lock().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<K: Eq + Hash + Clone, V> Default for KeyedState<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
