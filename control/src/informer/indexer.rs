//! Index view over an informer cache
//!
//! Index functions are evaluated against the kube reflector [`Store`] on
//! every query; nothing is materialized beyond the store itself.

use super::InformerResource;
use crate::error::{InformerError, Result};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::Resource;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tracing::warn;

/// Name of the index keyed by object namespace
pub const NAMESPACE_INDEX: &str = "namespace";

/// Computes the index values of an object
pub type IndexFunc<K> = Arc<dyn Fn(&K) -> Vec<String> + Send + Sync>;

/// Named index functions
pub type Indexers<K> = HashMap<String, IndexFunc<K>>;

/// Index an object by its namespace (empty for cluster-scoped objects)
pub fn meta_namespace_index_func<K: Resource>(obj: &K) -> Vec<String> {
    vec![obj.meta().namespace.clone().unwrap_or_default()]
}

/// Indexers containing only the namespace index
pub fn namespace_indexers<K: InformerResource>() -> Indexers<K> {
    let func: IndexFunc<K> = Arc::new(meta_namespace_index_func::<K>);
    HashMap::from([(NAMESPACE_INDEX.to_string(), func)])
}

/// Cache key of an object: `namespace/name`, or `name` when cluster-scoped
pub fn meta_namespace_key<K: Resource>(obj: &K) -> String {
    let meta = obj.meta();
    let name = meta.name.clone().unwrap_or_default();
    match meta.namespace.as_deref() {
        Some(namespace) if !namespace.is_empty() => format!("{}/{}", namespace, name),
        _ => name,
    }
}

fn safe_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during read, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Read-only, indexed access to an informer's cache
pub struct Indexer<K: InformerResource> {
    store: Store<K>,
    indexers: Arc<RwLock<Indexers<K>>>,
}

impl<K: InformerResource> Clone for Indexer<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            indexers: self.indexers.clone(),
        }
    }
}

impl<K: InformerResource> Indexer<K> {
    pub fn new(store: Store<K>, indexers: Arc<RwLock<Indexers<K>>>) -> Self {
        Self { store, indexers }
    }

    /// All cached objects
    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    /// Look up an object by `namespace/name` or `name`
    pub fn get_by_key(&self, key: &str) -> Option<Arc<K>> {
        let object_ref = match key.split_once('/') {
            Some((namespace, name)) => ObjectRef::new(name).within(namespace),
            None => ObjectRef::new(key),
        };
        self.store.get(&object_ref)
    }

    /// Objects whose `index_name` values include `value`
    pub fn by_index(&self, index_name: &str, value: &str) -> Result<Vec<Arc<K>>> {
        let indexers = safe_read(&self.indexers);
        let func = indexers
            .get(index_name)
            .ok_or_else(|| InformerError::IndexNotFound(index_name.to_string()))?;

        Ok(self
            .store
            .state()
            .into_iter()
            .filter(|obj| func(obj.as_ref()).iter().any(|v| v == value))
            .collect())
    }

    /// Cache keys of the objects matched by [`Indexer::by_index`]
    pub fn index_keys(&self, index_name: &str, value: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .by_index(index_name, value)?
            .iter()
            .map(|obj| meta_namespace_key(obj.as_ref()))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Every distinct value produced by an index, sorted
    pub fn list_index_func_values(&self, index_name: &str) -> Vec<String> {
        let indexers = safe_read(&self.indexers);
        let Some(func) = indexers.get(index_name) else {
            return Vec::new();
        };

        self.store
            .state()
            .iter()
            .flat_map(|obj| func(obj.as_ref()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = safe_read(&self.indexers).keys().cloned().collect();
        names.sort();
        names
    }
}
