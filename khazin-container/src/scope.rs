//! Resolution scopes.
//!
//! A [`Scope`] owns the cache for [`Lifetime::Scoped`](crate::lifetime::Lifetime::Scoped)
//! registrations while it is active. Exactly one scope is active per
//! container; entering a scope while another is active makes the new one
//! active and the old one active again once the new one exits.
//!
//! ```rust
//! use khazin_container::prelude::*;
//!
//! struct RequestContext;
//!
//! let container = Container::new();
//! container
//!     .register_factory(ServiceKey::of::<RequestContext>(), Lifetime::Scoped, |_| Ok(RequestContext))
//!     .unwrap();
//!
//! let scope = container.create_scope().entered();
//! let a = scope.resolve::<RequestContext>().unwrap();
//! let b = scope.resolve::<RequestContext>().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::container::Container;
use crate::error::{KhazinError, Result, ScopeNotActiveError};
use crate::key::ServiceKey;
use crate::lazy::downcast;
use crate::strategy::Instance;

/// Process-unique scope identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// A resolution boundary with its own scoped-instance cache.
///
/// Created inactive by [`Container::create_scope`]. The scope exits (and
/// disposes its instances) on [`exit`](Scope::exit) or when dropped.
pub struct Scope {
    id: ScopeId,
    container: Container,
    previous: Mutex<Option<ScopeId>>,
    entered: AtomicBool,
}

impl Scope {
    pub(crate) fn new(container: Container) -> Self {
        Self {
            id: ScopeId::next(),
            container,
            previous: Mutex::new(None),
            entered: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Makes this the container's active scope.
    pub fn enter(&self) -> &Self {
        let prior = self.container.lifetimes().enter_scope(self.id);
        if !self.entered.swap(true, Ordering::AcqRel) {
            *self.previous.lock() = prior.filter(|prior| *prior != self.id);
        }
        self
    }

    /// Enters the scope and returns it, for `let scope = c.create_scope().entered();`.
    pub fn entered(self) -> Self {
        self.enter();
        self
    }

    /// Disposes the scope's instances and reactivates the scope that was
    /// active before this one was entered.
    ///
    /// Returns `false` if the scope was not entered.
    pub fn exit(&self) -> bool {
        if !self.entered.swap(false, Ordering::AcqRel) {
            return false;
        }
        let previous = self.previous.lock().take();
        self.container.lifetimes().exit_scope(self.id, previous)
    }

    /// `true` while this scope is the container's active scope.
    pub fn is_active(&self) -> bool {
        self.container.active_scope() == Some(self.id)
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Resolves `key` within this scope.
    ///
    /// # Errors
    /// [`KhazinError::ScopeNotActive`] unless this scope is active.
    pub fn resolve_key(&self, key: &ServiceKey) -> Result<Instance> {
        self.ensure_active(key)?;
        self.container.resolve_key(key)
    }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = ServiceKey::of::<T>();
        downcast(&key, self.resolve_key(&key)?)
    }

    pub async fn resolve_key_async(&self, key: &ServiceKey) -> Result<Instance> {
        self.ensure_active(key)?;
        self.container.resolve_key_async(key).await
    }

    pub async fn resolve_async<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let instance = self.resolve_key_async(&key).await?;
        downcast(&key, instance)
    }

    fn ensure_active(&self, key: &ServiceKey) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(KhazinError::ScopeNotActive(ScopeNotActiveError { key: key.clone() }))
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.exit();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("entered", &self.entered.load(Ordering::Acquire))
            .finish()
    }
}
