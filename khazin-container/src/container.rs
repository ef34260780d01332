//! # The Container: heart of Khazin
//!
//! Registers services, resolves them through the engine, and manages the
//! lifetime of what it created.
//!
//! # Architecture
//! ```text
//! ContainerBuilder  ──build()──>  Container ──create_scope()──> Scope
//!                                    │
//!                      resolve / resolve_async / lazy
//!                                    │
//!                                    ▼
//!          Registry · LifetimeManager · DependencyAnalyzer
//!          CircularDependencyDetector · Interceptors
//! ```
//!
//! `Container` is a cheap handle: clones share the same registrations and
//! caches.
//!
//! The resolution stack is shared by the whole container, so one container
//! assumes one logical resolution flow at a time. Resolving the same
//! service concurrently from several threads can be reported as a cycle.
//!
//! # Examples
//! ```rust
//! use khazin_container::prelude::*;
//! use std::sync::Arc;
//!
//! struct Logger;
//! struct Database {
//!     logger: Arc<Logger>,
//! }
//!
//! let container = Container::new();
//! container
//!     .register(
//!         ServiceKey::of::<Logger>(),
//!         CreationStrategy::constructor(Signature::new(), |_| Ok(Logger)),
//!         Lifetime::Singleton,
//!     )
//!     .unwrap()
//!     .register(
//!         ServiceKey::of::<Database>(),
//!         CreationStrategy::constructor(Signature::new().param::<Logger>("logger"), |args| {
//!             Ok(Database { logger: args.get("logger")? })
//!         }),
//!         Lifetime::Singleton,
//!     )
//!     .unwrap();
//!
//! let db = container.resolve::<Database>().unwrap();
//! let logger = container.resolve::<Logger>().unwrap();
//! assert!(Arc::ptr_eq(&db.logger, &logger));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::engine::ContainerInner;
use crate::error::{BoxError, KhazinError, Result};
use crate::graph::GraphValidator;
use crate::interceptor::Interceptor;
use crate::key::ServiceKey;
use crate::lazy::{Lazy, LazyHandle, Resolver, downcast};
use crate::lifetime::Lifetime;
use crate::provider::Provider;
use crate::registry::Registration;
use crate::scope::{Scope, ScopeId};
use crate::settings::ContainerSettings;
use crate::store::{Disposable, LifetimeManager, StoredInstance};
use crate::strategy::{CreationStrategy, Instance, disposer_for};

// ============================================================
// ContainerBuilder
// ============================================================

/// Builds a [`Container`] from settings, interceptors and providers.
///
/// # Examples
/// ```rust,ignore
/// let container = Container::builder()
///     .max_depth(64)
///     .interceptor(Interceptor::on_error(|key, err| eprintln!("{key}: {err}")))
///     .provider(DatabaseProvider)
///     .build()?;
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    settings: ContainerSettings,
    interceptors: Vec<Interceptor>,
    providers: Vec<Box<dyn Provider>>,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Replaces every setting at once.
    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.settings.max_depth = max_depth;
        self
    }

    /// Allow re-registering keys without an explicit override.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.settings.allow_override = allow;
        self
    }

    pub fn auto_wiring(mut self, enabled: bool) -> Self {
        self.settings.auto_wiring = enabled;
        self
    }

    /// In strict mode `build()` also validates the dependency graph.
    pub fn strict_mode(mut self, enabled: bool) -> Self {
        self.settings.strict_mode = enabled;
        self
    }

    pub fn suggestion_limit(mut self, limit: usize) -> Self {
        self.settings.suggestion_limit = limit;
        self
    }

    pub fn interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn provider(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Builds the container.
    ///
    /// # Errors
    /// - [`KhazinError::InvalidConfiguration`] for conflicting settings
    /// - whatever a provider's registration returns
    /// - graph validation errors, in strict mode
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        self.settings.validate()?;

        let container = Container {
            inner: ContainerInner::new(self.settings),
        };
        for interceptor in self.interceptors {
            container.add_interceptor(interceptor);
        }
        for provider in &self.providers {
            container.add_provider(provider.as_ref())?;
        }

        if container.inner.settings.strict_mode {
            container.validate()?;
        }

        info!(registered = container.len(), "Container built");
        Ok(container)
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Thread-safe dependency injection container.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// A container with default settings.
    pub fn new() -> Self {
        Self {
            inner: ContainerInner::new(ContainerSettings::default()),
        }
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// # Errors
    /// [`KhazinError::InvalidConfiguration`] for conflicting settings.
    pub fn with_settings(settings: ContainerSettings) -> Result<Self> {
        Self::builder().settings(settings).build()
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.inner.settings
    }

    // ── Registration ──

    /// Registers `strategy` under `key`.
    ///
    /// Overrides only when `allow_override` is set in the settings.
    pub fn register(
        &self,
        key: impl Into<ServiceKey>,
        strategy: CreationStrategy,
        lifetime: Lifetime,
    ) -> Result<&Self> {
        self.register_with(key, strategy, lifetime, false)
    }

    /// Registers `strategy` under `key`, replacing an existing registration
    /// when `allow_override` (or the container setting) is set.
    ///
    /// Replacing a registration evicts and disposes its cached instance.
    ///
    /// # Errors
    /// [`KhazinError::Registration`] for a duplicate without override.
    pub fn register_with(
        &self,
        key: impl Into<ServiceKey>,
        strategy: CreationStrategy,
        lifetime: Lifetime,
        allow_override: bool,
    ) -> Result<&Self> {
        self.insert(Registration::new(key.into(), strategy, lifetime), allow_override)?;
        Ok(self)
    }

    /// Registers a factory that resolves its own dependencies.
    ///
    /// ```rust
    /// use khazin_container::prelude::*;
    /// use std::sync::Arc;
    ///
    /// struct Config { url: String }
    /// struct Pool { url: String }
    ///
    /// let container = Container::new();
    /// container
    ///     .register_instance(ServiceKey::of::<Config>(), Arc::new(Config { url: "pg://".into() }))
    ///     .unwrap()
    ///     .register_factory(ServiceKey::of::<Pool>(), Lifetime::Singleton, |r| {
    ///         let config = resolve::<Config>(r)?;
    ///         Ok(Pool { url: config.url.clone() })
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(container.resolve::<Pool>().unwrap().url, "pg://");
    /// ```
    pub fn register_factory<T, F>(&self, key: impl Into<ServiceKey>, lifetime: Lifetime, factory: F) -> Result<&Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register_factory_with(key, lifetime, factory, false)
    }

    /// [`register_factory`](Self::register_factory) with an explicit
    /// override flag.
    pub fn register_factory_with<T, F>(
        &self,
        key: impl Into<ServiceKey>,
        lifetime: Lifetime,
        factory: F,
        allow_override: bool,
    ) -> Result<&Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        let resolver = self.inner.resolver();
        let strategy = CreationStrategy::factory(Default::default(), move |_| factory(resolver.as_ref()));
        self.register_with(key, strategy, lifetime, allow_override)
    }

    /// Registers an asynchronous factory. Only `resolve_async` can create it.
    pub fn register_async_factory<T, F, Fut>(
        &self,
        key: impl Into<ServiceKey>,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<&Self>
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<dyn Resolver>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        let resolver = self.inner.resolver();
        let strategy =
            CreationStrategy::async_factory(Default::default(), move |_| factory(resolver.clone()));
        self.register(key, strategy, lifetime)
    }

    /// Registers a pre-built instance as a singleton.
    pub fn register_instance<T: Send + Sync + 'static>(&self, key: impl Into<ServiceKey>, instance: Arc<T>) -> Result<&Self> {
        self.insert_instance(key.into(), instance, None, false)
    }

    /// [`register_instance`](Self::register_instance) with an explicit
    /// override flag. Overriding disposes the previous cached instance.
    pub fn register_instance_with<T: Send + Sync + 'static>(
        &self,
        key: impl Into<ServiceKey>,
        instance: Arc<T>,
        allow_override: bool,
    ) -> Result<&Self> {
        self.insert_instance(key.into(), instance, None, allow_override)
    }

    /// Like [`register_instance`](Self::register_instance), and the
    /// instance is disposed when evicted or when the container is disposed.
    pub fn register_disposable_instance<T: Disposable>(
        &self,
        key: impl Into<ServiceKey>,
        instance: Arc<T>,
    ) -> Result<&Self> {
        self.insert_instance(key.into(), instance, Some(disposer_for::<T>()), false)
    }

    fn insert_instance<T: Send + Sync + 'static>(
        &self,
        key: ServiceKey,
        instance: Arc<T>,
        disposer: Option<crate::strategy::DisposeFn>,
        allow_override: bool,
    ) -> Result<&Self> {
        let strategy = CreationStrategy::instance(instance.clone()).with_disposer(disposer.clone());
        self.insert(Registration::new(key.clone(), strategy, Lifetime::Singleton), allow_override)?;
        self.inner
            .lifetimes
            .set_singleton(key, StoredInstance::new(instance, disposer));
        Ok(self)
    }

    fn insert(&self, registration: Registration, allow_override: bool) -> Result<()> {
        let key = registration.key.clone();
        let allow_override = allow_override || self.inner.settings.allow_override;

        let replaced = self.inner.registry.write().register(registration, allow_override)?;
        if let Some(replaced) = replaced {
            debug!(key = %key, "Overrode registration; evicting cached instance");
            self.forget(&replaced);
        }
        Ok(())
    }

    /// Drops the cached instances and analysis of a removed registration.
    fn forget(&self, registration: &Registration) {
        self.inner.lifetimes.remove_instance(&registration.key);
        self.inner.analyzer.evict(registration.strategy.id());
    }

    /// Makes `alias` resolve to `key`.
    ///
    /// # Errors
    /// [`KhazinError::ServiceNotFound`] when `key` is not registered.
    pub fn alias(&self, key: impl Into<ServiceKey>, alias: impl Into<ServiceKey>) -> Result<&Self> {
        let key = key.into();
        let mut registry = self.inner.registry.write();
        if registry.register_alias(alias.into(), &key) {
            Ok(self)
        } else {
            Err(self.inner.not_found(&registry, &key, None))
        }
    }

    /// Swaps the strategy of an existing registration, keeping its lifetime.
    ///
    /// # Errors
    /// [`KhazinError::ServiceNotFound`] when `key` is not registered.
    pub fn replace(&self, key: impl Into<ServiceKey>, strategy: CreationStrategy) -> Result<&Self> {
        let key = key.into();
        let existing = {
            let registry = self.inner.registry.read();
            match registry.get(&key) {
                Some(registration) => registration,
                None => return Err(self.inner.not_found(&registry, &key, None)),
            }
        };
        self.insert(
            Registration::new(existing.key.clone(), strategy, existing.lifetime),
            true,
        )?;
        Ok(self)
    }

    /// Removes a registration and disposes its cached instances.
    ///
    /// Returns `false` when nothing was registered under `key`.
    pub fn unregister(&self, key: impl Into<ServiceKey>) -> bool {
        let removed = self.inner.registry.write().remove(&key.into());
        match removed {
            Some(registration) => {
                self.forget(&registration);
                true
            }
            None => false,
        }
    }

    /// Removes every registration of `lifetime`, or all of them for `None`.
    pub fn clear(&self, lifetime: Option<Lifetime>) {
        let removed = self.inner.registry.write().clear(lifetime);
        for registration in &removed {
            self.forget(registration);
        }
        if lifetime.is_none() {
            self.inner.analyzer.clear_cache();
        }
    }

    pub fn add_interceptor(&self, interceptor: Interceptor) -> &Self {
        self.inner.interceptors.add(interceptor);
        self
    }

    /// Lets `provider` register its services.
    pub fn add_provider(&self, provider: &dyn Provider) -> Result<&Self> {
        debug!(provider = provider.name(), "Adding provider");
        provider.register(self)?;
        Ok(self)
    }

    // ── Introspection ──

    pub fn is_registered(&self, key: impl Into<ServiceKey>) -> bool {
        self.inner.registry.read().contains(&key.into())
    }

    /// Alias of [`is_registered`](Self::is_registered).
    pub fn has(&self, key: impl Into<ServiceKey>) -> bool {
        self.is_registered(key)
    }

    pub fn get_registration(&self, key: impl Into<ServiceKey>) -> Option<Arc<Registration>> {
        self.inner.registry.read().get(&key.into())
    }

    pub fn get_all_registrations(&self) -> HashMap<ServiceKey, Arc<Registration>> {
        self.inner.registry.read().snapshot()
    }

    /// Number of registrations (aliases not counted).
    pub fn len(&self) -> usize {
        self.inner.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current depth of the resolution stack.
    pub fn resolution_depth(&self) -> usize {
        self.inner.detector.depth()
    }

    pub fn active_scope(&self) -> Option<ScopeId> {
        self.inner.lifetimes.active_scope()
    }

    /// Forgets every cached dependency analysis.
    pub fn clear_analysis_cache(&self) {
        self.inner.analyzer.clear_cache();
    }

    /// Checks the declared graph without creating anything.
    ///
    /// Reports the first required eager dependency that is not registered,
    /// or the first cycle made only of eager edges.
    #[instrument(skip(self), name = "graph_validation")]
    pub fn validate(&self) -> Result<()> {
        let registrations: Vec<Arc<Registration>> = self.inner.registry.read().registrations().cloned().collect();

        let mut edges = HashMap::with_capacity(registrations.len());
        for registration in &registrations {
            let descriptors = self
                .inner
                .analyzer
                .analyze(&registration.strategy, &registration.key)?;
            let registry = self.inner.registry.read();
            let eager: Vec<ServiceKey> = descriptors
                .iter()
                .filter(|d| d.is_eager() && !d.optional)
                .map(|d| registry.canonical(&d.key))
                .collect();
            edges.insert(registration.key.clone(), eager);
        }

        GraphValidator::new(edges, self.inner.settings.suggestion_limit).validate()
    }

    pub(crate) fn lifetimes(&self) -> &LifetimeManager {
        &self.inner.lifetimes
    }

    // ── Resolution ──

    /// Resolves `key` through the synchronous pipeline.
    ///
    /// # Errors
    /// - [`KhazinError::ServiceNotFound`]: not registered
    /// - [`KhazinError::CircularDependency`]: eager cycle or depth limit
    /// - [`KhazinError::Resolution`]: async registration, veto, or
    ///   creation failure
    /// - [`KhazinError::ScopeNotActive`]: scoped service without a scope
    #[instrument(skip_all, fields(key = %key))]
    pub fn resolve_key(&self, key: &ServiceKey) -> Result<Instance> {
        self.inner.resolve_instance(key, None)
    }

    /// Resolves the service registered under the type key of `T`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_by::<T>(ServiceKey::of::<T>())
    }

    /// Resolves `key` and downcasts it to `T`.
    pub fn resolve_by<T: Send + Sync + 'static>(&self, key: impl Into<ServiceKey>) -> Result<Arc<T>> {
        let key = key.into();
        downcast(&key, self.resolve_key(&key)?)
    }

    /// Resolves `key` through the asynchronous pipeline, which accepts
    /// synchronous and asynchronous registrations alike.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn resolve_key_async(&self, key: &ServiceKey) -> Result<Instance> {
        self.inner.resolve_instance_async(key, None).await
    }

    pub async fn resolve_async<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_by_async::<T>(ServiceKey::of::<T>()).await
    }

    pub async fn resolve_by_async<T: Send + Sync + 'static>(&self, key: impl Into<ServiceKey>) -> Result<Arc<T>> {
        let key = key.into();
        let instance = self.resolve_key_async(&key).await?;
        downcast(&key, instance)
    }

    /// Like [`resolve`](Self::resolve), but "not found" and resolution
    /// failures become `Ok(None)`. Other errors still propagate.
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        recover(self.resolve::<T>())
    }

    pub fn try_resolve_by<T: Send + Sync + 'static>(&self, key: impl Into<ServiceKey>) -> Result<Option<Arc<T>>> {
        recover(self.resolve_by::<T>(key))
    }

    /// Like [`try_resolve`](Self::try_resolve), with a fallback value.
    pub fn try_resolve_or<T: Send + Sync + 'static>(&self, default: Arc<T>) -> Result<Arc<T>> {
        Ok(self.try_resolve::<T>()?.unwrap_or(default))
    }

    pub async fn try_resolve_async<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        recover(self.resolve_async::<T>().await)
    }

    /// A handle that resolves `key` on first use. Touches neither the
    /// resolution stack nor any cache.
    pub fn lazy(&self, key: impl Into<ServiceKey>) -> LazyHandle {
        self.inner.lazy_handle(key.into())
    }

    pub fn resolve_lazy<T: Send + Sync + 'static>(&self) -> Lazy<T> {
        Lazy::new(self.lazy(ServiceKey::of::<T>()))
    }

    /// Pre-creates singletons: the given keys, or every synchronous
    /// singleton when `keys` is empty. Failures are logged and skipped.
    ///
    /// Returns how many services were created or already cached.
    pub fn warmup(&self, keys: &[ServiceKey]) -> usize {
        let targets = self.warmup_targets(keys, false);
        let mut warmed = 0;
        for key in &targets {
            match self.resolve_key(key) {
                Ok(_) => warmed += 1,
                Err(error) => warn!(key = %key, %error, "Warmup failed; skipping"),
            }
        }
        info!(warmed, requested = targets.len(), "Warmup finished");
        warmed
    }

    /// Async counterpart of [`warmup`](Self::warmup); includes
    /// asynchronous singletons.
    pub async fn warmup_async(&self, keys: &[ServiceKey]) -> usize {
        let targets = self.warmup_targets(keys, true);
        let mut warmed = 0;
        for key in &targets {
            match self.resolve_key_async(key).await {
                Ok(_) => warmed += 1,
                Err(error) => warn!(key = %key, %error, "Warmup failed; skipping"),
            }
        }
        info!(warmed, requested = targets.len(), "Warmup finished");
        warmed
    }

    fn warmup_targets(&self, keys: &[ServiceKey], include_async: bool) -> Vec<ServiceKey> {
        if !keys.is_empty() {
            return keys.to_vec();
        }
        self.inner
            .registry
            .read()
            .registrations()
            .filter(|r| r.lifetime.is_singleton() && (include_async || !r.is_async))
            .map(|r| r.key.clone())
            .collect()
    }

    // ── Scopes & teardown ──

    /// Creates an inactive scope; call [`Scope::enter`] or
    /// [`Scope::entered`] to activate it.
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.clone())
    }

    /// Disposes every cached instance and clears registrations and
    /// interceptors. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(registered = self.len(), "Disposing container");
        self.inner.lifetimes.dispose_all();
        self.inner.registry.write().clear(None);
        self.inner.analyzer.clear_cache();
        self.inner.interceptors.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

fn recover<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_recoverable() => {
            debug!(%error, "Recovered resolution failure");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

#[async_trait]
impl Resolver for Container {
    fn resolve_key(&self, key: &ServiceKey) -> Result<Instance> {
        Container::resolve_key(self, key)
    }

    async fn resolve_key_async(&self, key: &ServiceKey) -> Result<Instance> {
        Container::resolve_key_async(self, key).await
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.len())
            .field("active_scope", &self.active_scope())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder};
    pub use crate::error::{BoxError, KhazinError, Result};
    pub use crate::interceptor::Interceptor;
    pub use crate::key::{GenericKey, ServiceKey};
    pub use crate::lazy::{Lazy, LazyHandle, Resolver, resolve, resolve_async};
    pub use crate::lifetime::Lifetime;
    pub use crate::provider::Provider;
    pub use crate::scope::Scope;
    pub use crate::settings::ContainerSettings;
    pub use crate::store::Disposable;
    pub use crate::strategy::{Arguments, CreationStrategy, Signature};
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
