//! Lazy handles: deferred resolution used to break dependency cycles.
//!
//! A [`LazyHandle`] is produced without touching the resolution stack or
//! any cache. Only [`LazyHandle::get`] (or `get_async`) runs a normal
//! resolution; the first result is kept for the handle's lifetime and
//! shared by all of its clones.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::trace;

use crate::error::{KhazinError, Result};
use crate::key::ServiceKey;
use crate::strategy::Instance;

/// Resolves type-erased instances by key.
///
/// This is what lazy handles call back into. Separated from the container
/// so a handle can hold a weak reference instead of the container itself.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `key` through the synchronous pipeline.
    fn resolve_key(&self, key: &ServiceKey) -> Result<Instance>;

    /// Resolves `key` through the asynchronous pipeline.
    async fn resolve_key_async(&self, key: &ServiceKey) -> Result<Instance>;
}

/// Resolve a typed service from a [`Resolver`].
pub fn resolve<T: Send + Sync + 'static>(resolver: &dyn Resolver) -> Result<Arc<T>> {
    let key = ServiceKey::of::<T>();
    let instance = resolver.resolve_key(&key)?;
    downcast(&key, instance)
}

/// Async counterpart of [`resolve`].
pub async fn resolve_async<T: Send + Sync + 'static>(resolver: &dyn Resolver) -> Result<Arc<T>> {
    let key = ServiceKey::of::<T>();
    let instance = resolver.resolve_key_async(&key).await?;
    downcast(&key, instance)
}

pub(crate) fn downcast<T: Send + Sync + 'static>(key: &ServiceKey, instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| {
        KhazinError::resolution(
            key.clone(),
            format!("type mismatch: expected {}", type_name::<T>()),
        )
    })
}

struct LazyInner {
    key: ServiceKey,
    resolver: Arc<dyn Resolver>,
    cell: OnceCell<Instance>,
}

/// Type-erased deferred resolution of one key.
#[derive(Clone)]
pub struct LazyHandle {
    inner: Arc<LazyInner>,
}

impl LazyHandle {
    pub fn new(key: ServiceKey, resolver: Arc<dyn Resolver>) -> Self {
        trace!(key = %key, "Created lazy handle");
        Self {
            inner: Arc::new(LazyInner {
                key,
                resolver,
                cell: OnceCell::new(),
            }),
        }
    }

    /// The key this handle resolves.
    pub fn key(&self) -> &ServiceKey {
        &self.inner.key
    }

    /// `true` once the first resolution succeeded.
    pub fn is_resolved(&self) -> bool {
        self.inner.cell.get().is_some()
    }

    /// Resolves on first call; afterwards returns the cached instance.
    ///
    /// A failed resolution is not cached: the next call retries.
    pub fn get(&self) -> Result<Instance> {
        if let Some(instance) = self.inner.cell.get() {
            return Ok(instance.clone());
        }

        // Resolved outside the cell: the resolution may itself read this
        // handle (lazy cycles), which must not block on initialization.
        let instance = self.inner.resolver.resolve_key(&self.inner.key)?;
        Ok(self.inner.cell.get_or_init(|| instance).clone())
    }

    /// Async counterpart of [`get`](Self::get).
    pub async fn get_async(&self) -> Result<Instance> {
        if let Some(instance) = self.inner.cell.get() {
            return Ok(instance.clone());
        }

        let instance = self.inner.resolver.resolve_key_async(&self.inner.key).await?;
        Ok(self.inner.cell.get_or_init(|| instance).clone())
    }
}

impl fmt::Debug for LazyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lazy({}, resolved: {})",
            self.inner.key,
            self.is_resolved()
        )
    }
}

/// Typed view over a [`LazyHandle`].
///
/// # Examples
/// ```rust,ignore
/// struct Parent {
///     child: Lazy<Child>,
/// }
///
/// let child: Arc<Child> = parent.child.get()?;
/// ```
pub struct Lazy<T> {
    handle: LazyHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Lazy<T> {
    pub fn new(handle: LazyHandle) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> Result<Arc<T>> {
        downcast(self.handle.key(), self.handle.get()?)
    }

    pub async fn get_async(&self) -> Result<Arc<T>> {
        downcast(self.handle.key(), self.handle.get_async().await?)
    }

    pub fn key(&self) -> &ServiceKey {
        self.handle.key()
    }

    pub fn is_resolved(&self) -> bool {
        self.handle.is_resolved()
    }

    pub fn handle(&self) -> &LazyHandle {
        &self.handle
    }
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.handle)
    }
}
