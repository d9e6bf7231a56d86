//! Named store instances.
//!
//! One store per resource key, shared by every view that renders it. Tests
//! build their own registry so nothing leaks between them.

use crate::base::BaseStore;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::fetch::{ListFetcher, OneFetcher, PageFetcher};
use crate::list::ListStore;
use crate::paginated::PaginatedStore;
use ootd_protocol::Entity;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A store the registry can reset without knowing its entity type.
pub trait RegisteredStore: Any + Send + Sync {
    /// Drops local data and in-flight responses.
    fn reset(&self);

    /// Upcasts for typed lookup.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Entity> RegisteredStore for PaginatedStore<T> {
    fn reset(&self) {
        self.clear_data();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: Entity> RegisteredStore for ListStore<T> {
    fn reset(&self) {
        self.clear();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: Entity> RegisteredStore for BaseStore<T> {
    fn reset(&self) {
        self.clear();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Factory and cache for store instances.
#[derive(Default)]
pub struct StoreRegistry {
    config: StoreConfig,
    stores: Mutex<HashMap<String, Arc<dyn RegisteredStore>>>,
}

impl StoreRegistry {
    /// Creates a registry whose stores use `config`.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Config handed to new stores.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the store registered under `name`, creating it with `make`.
    ///
    /// Fails if `name` is already taken by a store of another type.
    pub fn get_or_create<S, F>(&self, name: &str, make: F) -> StoreResult<Arc<S>>
    where
        S: RegisteredStore,
        F: FnOnce(&StoreConfig) -> S,
    {
        let mut stores = self.stores.lock();
        if let Some(existing) = stores.get(name) {
            return Arc::clone(existing)
                .into_any()
                .downcast::<S>()
                .map_err(|_| StoreError::Registry { name: name.to_string() });
        }
        debug!(store = name, "registering store");
        let store = Arc::new(make(&self.config));
        stores.insert(name.to_string(), Arc::clone(&store) as Arc<dyn RegisteredStore>);
        Ok(store)
    }

    /// Paginated store for `name`.
    pub fn paginated<T: Entity>(
        &self,
        name: &str,
        fetcher: Arc<dyn PageFetcher<T>>,
    ) -> StoreResult<Arc<PaginatedStore<T>>> {
        self.get_or_create(name, |config| PaginatedStore::new(name, fetcher, config.clone()))
    }

    /// List store for `name`.
    pub fn list<T: Entity>(&self, name: &str, fetcher: Arc<dyn ListFetcher<T>>) -> StoreResult<Arc<ListStore<T>>> {
        self.get_or_create(name, |config| ListStore::new(name, fetcher, config.clone()))
    }

    /// Single-resource store for `name`.
    pub fn base<T: Entity>(&self, name: &str, fetcher: Arc<dyn OneFetcher<T>>) -> StoreResult<Arc<BaseStore<T>>> {
        self.get_or_create(name, |config| BaseStore::new(name, fetcher, config.clone()))
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.stores.lock().contains_key(name)
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }

    /// Forgets the store under `name`. Holders keep their handle.
    pub fn remove(&self, name: &str) -> bool {
        self.stores.lock().remove(name).is_some()
    }

    /// Resets every store, as on sign-out.
    pub fn reset_all(&self) {
        let stores: Vec<_> = self.stores.lock().values().cloned().collect();
        debug!(count = stores.len(), "resetting all stores");
        for store in stores {
            store.reset();
        }
    }
}
