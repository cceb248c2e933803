// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Callback registry fed by watch streams.
//!
//! Steps that wait for a resource register a callback under the resource's
//! namespace and name; the watch loop calls [`WatchRegistry::notify`] for every
//! applied object. Callbacks run on the notifying task and must not block.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked with each watched update of a resource.
pub type WatchCallback<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Handle returned by [`WatchRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type CallbackList<K> = Vec<(CallbackId, WatchCallback<K>)>;

/// Callbacks keyed by `(namespace, name)`.
pub struct WatchRegistry<K> {
    callbacks: Mutex<HashMap<(String, String), CallbackList<K>>>,
    next_id: AtomicU64,
}

impl<K> Default for WatchRegistry<K> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<K> WatchRegistry<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, namespace: &str, name: &str, callback: WatchCallback<K>) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((namespace.to_string(), name.to_string()))
            .or_default()
            .push((id, callback));
        id
    }

    /// Removes a callback. Unknown ids are ignored.
    pub fn unregister(&self, namespace: &str, name: &str, id: CallbackId) {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (namespace.to_string(), name.to_string());
        if let Some(list) = callbacks.get_mut(&key) {
            list.retain(|(existing, _)| *existing != id);
            if list.is_empty() {
                callbacks.remove(&key);
            }
        }
    }

    /// Delivers `resource` to every callback registered for it.
    ///
    /// Returns the number of callbacks invoked. The registry lock is released
    /// before any callback runs, so callbacks may unregister themselves.
    pub fn notify(&self, namespace: &str, name: &str, resource: &K) -> usize {
        let targets: Vec<WatchCallback<K>> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in &targets {
            callback(resource);
        }
        targets.len()
    }

    /// Number of callbacks registered for a resource.
    #[must_use]
    pub fn registered(&self, namespace: &str, name: &str) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .map_or(0, Vec::len)
    }
}
