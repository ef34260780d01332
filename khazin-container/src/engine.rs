//! The resolution engine.
//!
//! Both pipelines share one shape:
//!
//! ```text
//! alias ─> lookup ─> before hooks ─> enter stack ─> cache check ──hit──> done
//!                                                      │miss
//!                                                      ▼
//!                 exit stack <─ after hooks <─ store <─ create <─ dependencies
//! ```
//!
//! The stack entry is a drop guard, so it is unwound on every exit path,
//! including a cancelled async resolve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use khazin_support::rendering::{shorten_type_name, suggest_similar};

use crate::analyzer::{DependencyAnalyzer, DependencyDescriptor};
use crate::circular::CircularDependencyDetector;
use crate::error::{BoxError, KhazinError, Result, ServiceNotFoundError};
use crate::interceptor::Interceptors;
use crate::key::ServiceKey;
use crate::lazy::{LazyHandle, Resolver};
use crate::registry::{Registration, Registry};
use crate::settings::ContainerSettings;
use crate::store::{LifetimeManager, StoredInstance};
use crate::strategy::{Argument, Arguments, BoxFuture, Creator, Instance, ParamDefault};

const MAX_SUGGESTIONS: usize = 3;

pub(crate) struct ContainerInner {
    pub settings: ContainerSettings,
    pub registry: RwLock<Registry>,
    pub lifetimes: LifetimeManager,
    pub analyzer: DependencyAnalyzer,
    pub detector: CircularDependencyDetector,
    pub interceptors: Interceptors,
    pub disposed: AtomicBool,
    this: Weak<ContainerInner>,
}

impl ContainerInner {
    pub fn new(settings: ContainerSettings) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            detector: CircularDependencyDetector::new(settings.max_depth),
            settings,
            registry: RwLock::new(Registry::new()),
            lifetimes: LifetimeManager::new(),
            analyzer: DependencyAnalyzer::new(),
            interceptors: Interceptors::new(),
            disposed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    /// A resolver that does not keep the container alive.
    pub fn resolver(&self) -> Arc<dyn Resolver> {
        Arc::new(WeakResolver {
            inner: self.this.clone(),
        })
    }

    pub fn lazy_handle(&self, key: ServiceKey) -> LazyHandle {
        LazyHandle::new(key, self.resolver())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // ── Synchronous pipeline ──

    pub fn resolve_instance(&self, requested: &ServiceKey, required_by: Option<&ServiceKey>) -> Result<Instance> {
        let (key, registration) = self.lookup(requested, required_by)?;

        if registration.is_async {
            return Err(KhazinError::resolution(
                key,
                "registered with an asynchronous creation strategy; use resolve_async",
            ));
        }

        self.interceptors.run_before(&key, &registration)?;

        let _guard = self.detector.enter(&key)?;

        if let Some(cached) = self.lifetimes.get(&key, registration.lifetime)? {
            trace!(key = %key, lifetime = %registration.lifetime, "Cache hit");
            return Ok(cached);
        }

        let descriptors = self.analyzer.analyze(&registration.strategy, &key)?;
        let mut args = Arguments::new(key.clone());
        for dependency in descriptors.iter() {
            if let Some(argument) = self.resolve_dependency(&key, dependency)? {
                args.insert(dependency.name.clone(), argument);
            }
        }
        fill_defaults(&registration, &mut args);

        let created = match registration.strategy.creator() {
            Creator::Sync(create) => create(&args),
            Creator::Async(_) => {
                return Err(KhazinError::resolution(
                    key,
                    "asynchronous creation strategy; use resolve_async",
                ));
            }
        };

        let instance = match created {
            Ok(instance) => instance,
            Err(error) => return Err(self.creation_failed(key, error)),
        };

        let instance = self.lifetimes.store(
            &key,
            registration.lifetime,
            StoredInstance::new(instance, registration.strategy.disposer()),
        )?;

        Ok(self.interceptors.run_after(&key, instance))
    }

    fn resolve_dependency(&self, owner: &ServiceKey, dependency: &DependencyDescriptor) -> Result<Option<Argument>> {
        if let Some(argument) = self.unresolvable_dependency(owner, dependency)? {
            return Ok(argument);
        }
        if dependency.lazy {
            return Ok(Some(Argument::Lazy(self.lazy_handle(dependency.key.clone()))));
        }
        self.resolve_instance(&dependency.key, Some(owner))
            .map(|instance| Some(Argument::Instance(instance)))
    }

    // ── Asynchronous pipeline ──

    pub fn resolve_instance_async<'a>(
        &'a self,
        requested: &'a ServiceKey,
        required_by: Option<&'a ServiceKey>,
    ) -> BoxFuture<'a, Result<Instance>> {
        Box::pin(async move {
            let (key, registration) = self.lookup(requested, required_by)?;

            self.interceptors.run_before_async(&key, &registration).await?;

            let _guard = self.detector.enter(&key)?;

            if let Some(cached) = self.lifetimes.get(&key, registration.lifetime)? {
                trace!(key = %key, lifetime = %registration.lifetime, "Cache hit");
                return Ok(cached);
            }

            let descriptors = self.analyzer.analyze(&registration.strategy, &key)?;
            let mut args = Arguments::new(key.clone());
            for dependency in descriptors.iter() {
                if let Some(argument) = self.resolve_dependency_async(&key, dependency).await? {
                    args.insert(dependency.name.clone(), argument);
                }
            }
            fill_defaults(&registration, &mut args);

            let created = match registration.strategy.creator() {
                Creator::Sync(create) => create(&args),
                Creator::Async(create) => create(args).await,
            };

            let instance = match created {
                Ok(instance) => instance,
                Err(error) => {
                    let error = match error.downcast::<KhazinError>() {
                        Ok(engine_error) => return Err(*engine_error),
                        Err(error) => error,
                    };
                    self.interceptors.run_error_async(&key, error.as_ref()).await;
                    return Err(KhazinError::resolution_from(key, error));
                }
            };

            let instance = self.lifetimes.store(
                &key,
                registration.lifetime,
                StoredInstance::new(instance, registration.strategy.disposer()),
            )?;

            Ok(self.interceptors.run_after_async(&key, instance).await)
        })
    }

    async fn resolve_dependency_async(
        &self,
        owner: &ServiceKey,
        dependency: &DependencyDescriptor,
    ) -> Result<Option<Argument>> {
        if let Some(argument) = self.unresolvable_dependency(owner, dependency)? {
            return Ok(argument);
        }
        if dependency.lazy {
            return Ok(Some(Argument::Lazy(self.lazy_handle(dependency.key.clone()))));
        }
        self.resolve_instance_async(&dependency.key, Some(owner))
            .await
            .map(|instance| Some(Argument::Instance(instance)))
    }

    // ── Shared steps ──

    /// Follows aliases and fetches the registration.
    fn lookup(&self, requested: &ServiceKey, required_by: Option<&ServiceKey>) -> Result<(ServiceKey, Arc<Registration>)> {
        let registry = self.registry.read();
        let key = registry.canonical(requested);
        match registry.get(&key) {
            Some(registration) => Ok((key, registration)),
            None => Err(self.not_found(&registry, requested, required_by)),
        }
    }

    /// Settles dependencies whose key is not registered: optional ones
    /// fall back to their default (or are omitted), required ones fail.
    ///
    /// `Ok(None)` means the dependency is registered and must be resolved.
    fn unresolvable_dependency(
        &self,
        owner: &ServiceKey,
        dependency: &DependencyDescriptor,
    ) -> Result<Option<Option<Argument>>> {
        let registry = self.registry.read();
        if registry.contains(&dependency.key) {
            return Ok(None);
        }
        if dependency.optional {
            trace!(owner = %owner, dependency = %dependency.key, "Optional dependency not registered");
            return Ok(Some(dependency.default.clone().map(Argument::Default)));
        }
        Err(self.not_found(&registry, &dependency.key, Some(owner)))
    }

    pub fn not_found(&self, registry: &Registry, key: &ServiceKey, required_by: Option<&ServiceKey>) -> KhazinError {
        let labels = registry.labels();
        let available: Vec<&str> = labels.iter().map(String::as_str).collect();
        let suggestions = suggest_similar(&key.label(), &available, MAX_SUGGESTIONS)
            .iter()
            .map(|label| shorten_type_name(label))
            .collect();

        KhazinError::ServiceNotFound(ServiceNotFoundError {
            requested: key.clone(),
            required_by: required_by.cloned(),
            registered: registry.sample(self.settings.suggestion_limit),
            registered_total: registry.len(),
            suggestions,
        })
    }

    /// Engine errors raised inside a creator pass through untouched;
    /// anything else is shown to the error hooks and wrapped.
    fn creation_failed(&self, key: ServiceKey, error: BoxError) -> KhazinError {
        match error.downcast::<KhazinError>() {
            Ok(engine_error) => *engine_error,
            Err(error) => {
                self.interceptors.run_error(&key, error.as_ref());
                KhazinError::resolution_from(key, error)
            }
        }
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            trace!("Last container handle dropped; disposing cached instances");
            self.lifetimes.dispose_all();
        }
    }
}

/// Declared default values the creator sees for parameters that were not injected.
fn fill_defaults(registration: &Registration, args: &mut Arguments) {
    for param in registration.strategy.signature().params() {
        if let ParamDefault::Value(value) = &param.default
            && !args.contains(&param.name)
        {
            args.insert(param.name.clone(), Argument::Default(value.clone()));
        }
    }
}

/// [`Resolver`] over a weak container reference, used by lazy handles.
pub(crate) struct WeakResolver {
    inner: Weak<ContainerInner>,
}

impl WeakResolver {
    fn upgrade(&self, key: &ServiceKey) -> Result<Arc<ContainerInner>> {
        self.inner
            .upgrade()
            .ok_or_else(|| KhazinError::resolution(key.clone(), "container was dropped"))
    }
}

#[async_trait]
impl Resolver for WeakResolver {
    fn resolve_key(&self, key: &ServiceKey) -> Result<Instance> {
        self.upgrade(key)?.resolve_instance(key, None)
    }

    async fn resolve_key_async(&self, key: &ServiceKey) -> Result<Instance> {
        let inner = self.upgrade(key)?;
        inner.resolve_instance_async(key, None).await
    }
}
