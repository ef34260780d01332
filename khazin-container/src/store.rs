//! Lifetime stores: per-lifetime instance caches.
//!
//! - Singleton store: one map for the whole container
//! - Scoped store: same shape, one per [`Scope`](crate::scope::Scope)
//! - Transient / Factory: no store at all
//!
//! Evicted instances that opted into [`Disposable`] are disposed exactly
//! once; a failing disposal is logged and never blocks the others.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, KhazinError, Result, ScopeNotActiveError};
use crate::key::ServiceKey;
use crate::lifetime::Lifetime;
use crate::scope::ScopeId;
use crate::strategy::{DisposeFn, Instance};

/// Capability for services that hold releasable resources.
///
/// Opt in per registration with
/// [`CreationStrategy::with_disposal`](crate::strategy::CreationStrategy::with_disposal)
/// or [`Container::register_disposable_instance`](crate::container::Container::register_disposable_instance).
pub trait Disposable: Send + Sync + 'static {
    /// Releases the resource. Errors are logged by the container, never propagated.
    fn dispose(&self) -> std::result::Result<(), BoxError>;
}

/// A cached instance plus its disposal hook.
#[derive(Clone)]
pub(crate) struct StoredInstance {
    pub instance: Instance,
    pub disposer: Option<DisposeFn>,
}

impl StoredInstance {
    pub fn new(instance: Instance, disposer: Option<DisposeFn>) -> Self {
        Self { instance, disposer }
    }

    /// Runs the disposal hook, swallowing errors and panics.
    pub fn dispose(self, key: &ServiceKey) {
        let Some(disposer) = self.disposer else {
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| disposer(&self.instance))) {
            Ok(Ok(())) => trace!(key = %key, "Disposed instance"),
            Ok(Err(error)) => warn!(key = %key, %error, "Disposal failed; continuing"),
            Err(_) => warn!(key = %key, "Disposal panicked; continuing"),
        }
    }
}

/// Key → instance cache shared by the singleton and scoped stores.
#[derive(Default)]
pub(crate) struct InstanceStore {
    instances: Mutex<HashMap<ServiceKey, StoredInstance>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ServiceKey) -> Option<Instance> {
        self.instances
            .lock()
            .get(key)
            .map(|stored| stored.instance.clone())
    }

    pub fn has(&self, key: &ServiceKey) -> bool {
        self.instances.lock().contains_key(key)
    }

    /// Stores `stored`, disposing whatever it replaced.
    pub fn set(&self, key: ServiceKey, stored: StoredInstance) {
        let previous = self.instances.lock().insert(key.clone(), stored);
        if let Some(previous) = previous {
            previous.dispose(&key);
        }
    }

    /// Stores `stored` unless the key is already cached; returns the
    /// instance that ends up in the store.
    pub fn get_or_insert(&self, key: ServiceKey, stored: StoredInstance) -> Instance {
        self.instances
            .lock()
            .entry(key)
            .or_insert(stored)
            .instance
            .clone()
    }

    /// Evicts and disposes one instance. Returns `true` if one was cached.
    pub fn remove(&self, key: &ServiceKey) -> bool {
        let evicted = self.instances.lock().remove(key);
        match evicted {
            Some(stored) => {
                stored.dispose(key);
                true
            }
            None => false,
        }
    }

    /// Disposes every instance and empties the store.
    pub fn dispose_all(&self) {
        let drained: Vec<(ServiceKey, StoredInstance)> = self.instances.lock().drain().collect();
        for (key, stored) in drained {
            stored.dispose(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }
}

/// Instance cache owned by one scope.
pub(crate) struct ScopedStore {
    id: ScopeId,
    store: InstanceStore,
}

impl ScopedStore {
    pub fn new(id: ScopeId) -> Self {
        Self {
            id,
            store: InstanceStore::new(),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }
}

#[derive(Default)]
struct ScopeTable {
    stores: HashMap<ScopeId, Arc<ScopedStore>>,
    active: Option<ScopeId>,
}

/// Routes cache reads and writes to the store matching a lifetime.
#[derive(Default)]
pub(crate) struct LifetimeManager {
    singletons: InstanceStore,
    scopes: Mutex<ScopeTable>,
}

impl LifetimeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached instance for `key`, if its lifetime caches at all.
    ///
    /// # Errors
    /// [`KhazinError::ScopeNotActive`] for a scoped key with no active scope.
    pub fn get(&self, key: &ServiceKey, lifetime: Lifetime) -> Result<Option<Instance>> {
        match lifetime {
            Lifetime::Singleton => Ok(self.singletons.get(key)),
            Lifetime::Scoped => Ok(self.active_store(key)?.store().get(key)),
            Lifetime::Transient | Lifetime::Factory => Ok(None),
        }
    }

    /// Caches `stored` per its lifetime and returns the instance callers
    /// should see (an already cached one wins).
    pub fn store(&self, key: &ServiceKey, lifetime: Lifetime, stored: StoredInstance) -> Result<Instance> {
        match lifetime {
            Lifetime::Singleton => Ok(self.singletons.get_or_insert(key.clone(), stored)),
            Lifetime::Scoped => Ok(self
                .active_store(key)?
                .store()
                .get_or_insert(key.clone(), stored)),
            Lifetime::Transient | Lifetime::Factory => Ok(stored.instance),
        }
    }

    /// Stores a pre-built singleton, replacing (and disposing) any previous one.
    pub fn set_singleton(&self, key: ServiceKey, stored: StoredInstance) {
        self.singletons.set(key, stored);
    }

    pub fn singletons(&self) -> &InstanceStore {
        &self.singletons
    }

    /// Creates the store for `id` and makes it the active scope.
    ///
    /// Returns the previously active scope.
    pub fn enter_scope(&self, id: ScopeId) -> Option<ScopeId> {
        let mut table = self.scopes.lock();
        table
            .stores
            .entry(id)
            .or_insert_with(|| Arc::new(ScopedStore::new(id)));
        let previous = table.active.replace(id);
        debug!(scope = %id, previous = ?previous, "Entered scope");
        previous
    }

    /// Disposes and discards the store of `id`.
    ///
    /// If `id` was active, `restore` becomes active again when its store is
    /// still alive. Returns `false` when the scope was already gone.
    pub fn exit_scope(&self, id: ScopeId, restore: Option<ScopeId>) -> bool {
        let removed = {
            let mut table = self.scopes.lock();
            let removed = table.stores.remove(&id);
            if table.active == Some(id) {
                table.active = restore.filter(|prior| table.stores.contains_key(prior));
            }
            removed
        };

        match removed {
            Some(store) => {
                debug!(scope = %id, instances = store.store().len(), "Exiting scope");
                store.store().dispose_all();
                true
            }
            None => false,
        }
    }

    pub fn active_scope(&self) -> Option<ScopeId> {
        self.scopes.lock().active
    }

    /// Evicts `key` from the singleton store and every scoped store.
    pub fn remove_instance(&self, key: &ServiceKey) {
        self.singletons.remove(key);

        let stores: Vec<Arc<ScopedStore>> = self.scopes.lock().stores.values().cloned().collect();
        for store in stores {
            store.store().remove(key);
        }
    }

    /// Disposes every scope, then every singleton.
    pub fn dispose_all(&self) {
        let stores: Vec<Arc<ScopedStore>> = {
            let mut table = self.scopes.lock();
            table.active = None;
            table.stores.drain().map(|(_, store)| store).collect()
        };
        for store in stores {
            debug!(scope = %store.id(), "Disposing scope");
            store.store().dispose_all();
        }

        self.singletons.dispose_all();
    }

    fn active_store(&self, key: &ServiceKey) -> Result<Arc<ScopedStore>> {
        let table = self.scopes.lock();
        table
            .active
            .and_then(|id| table.stores.get(&id).cloned())
            .ok_or_else(|| {
                KhazinError::ScopeNotActive(ScopeNotActiveError { key: key.clone() })
            })
    }
}
