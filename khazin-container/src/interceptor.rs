//! Interceptor hooks woven through the resolution pipeline.
//!
//! | Kind   | Runs                                   | Effect                         |
//! |--------|----------------------------------------|--------------------------------|
//! | before | after lookup, before the stack entry   | `false` vetoes the resolution  |
//! | after  | after creation and caching             | `Some(x)` replaces the result  |
//! | error  | when a creation strategy fails         | observe only                   |
//!
//! Hooks run in registration order. Asynchronous hooks are awaited by the
//! asynchronous pipeline and skipped by the synchronous one. A panicking
//! hook is not caught.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{KhazinError, Result};
use crate::key::ServiceKey;
use crate::registry::Registration;
use crate::strategy::{BoxFuture, Instance};

pub type BeforeFn = Arc<dyn Fn(&ServiceKey, &Registration) -> bool + Send + Sync>;
pub type AsyncBeforeFn =
    Arc<dyn Fn(ServiceKey, Arc<Registration>) -> BoxFuture<'static, bool> + Send + Sync>;
pub type AfterFn = Arc<dyn Fn(&ServiceKey, &Instance) -> Option<Instance> + Send + Sync>;
pub type AsyncAfterFn =
    Arc<dyn Fn(ServiceKey, Instance) -> BoxFuture<'static, Option<Instance>> + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(&ServiceKey, &(dyn Error + 'static)) + Send + Sync>;
/// Async error hooks receive the rendered error message.
pub type AsyncErrorFn = Arc<dyn Fn(ServiceKey, String) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
pub enum BeforeHook {
    Sync(BeforeFn),
    Async(AsyncBeforeFn),
}

#[derive(Clone)]
pub enum AfterHook {
    Sync(AfterFn),
    Async(AsyncAfterFn),
}

#[derive(Clone)]
pub enum ErrorHook {
    Sync(ErrorFn),
    Async(AsyncErrorFn),
}

/// Which hook list an interceptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptorKind {
    Before,
    After,
    Error,
}

impl fmt::Display for InterceptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorKind::Before => write!(f, "before"),
            InterceptorKind::After => write!(f, "after"),
            InterceptorKind::Error => write!(f, "error"),
        }
    }
}

/// A hook ready to be added with
/// [`Container::add_interceptor`](crate::container::Container::add_interceptor).
///
/// # Examples
/// ```rust
/// use khazin_container::interceptor::Interceptor;
///
/// // Refuse anything named "forbidden"
/// let guard = Interceptor::before(|key, _| key.name() != Some("forbidden"));
///
/// // Log failures
/// let audit = Interceptor::on_error(|key, error| eprintln!("{key}: {error}"));
/// ```
#[derive(Clone)]
pub enum Interceptor {
    Before(BeforeHook),
    After(AfterHook),
    Error(ErrorHook),
}

impl Interceptor {
    pub fn before<F>(hook: F) -> Self
    where
        F: Fn(&ServiceKey, &Registration) -> bool + Send + Sync + 'static,
    {
        Interceptor::Before(BeforeHook::Sync(Arc::new(hook)))
    }

    pub fn before_async<F, Fut>(hook: F) -> Self
    where
        F: Fn(ServiceKey, Arc<Registration>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let hook: AsyncBeforeFn = Arc::new(
            move |key: ServiceKey, registration: Arc<Registration>| -> BoxFuture<'static, bool> {
                Box::pin(hook(key, registration))
            },
        );
        Interceptor::Before(BeforeHook::Async(hook))
    }

    pub fn after<F>(hook: F) -> Self
    where
        F: Fn(&ServiceKey, &Instance) -> Option<Instance> + Send + Sync + 'static,
    {
        Interceptor::After(AfterHook::Sync(Arc::new(hook)))
    }

    pub fn after_async<F, Fut>(hook: F) -> Self
    where
        F: Fn(ServiceKey, Instance) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Instance>> + Send + 'static,
    {
        let hook: AsyncAfterFn = Arc::new(
            move |key: ServiceKey, instance: Instance| -> BoxFuture<'static, Option<Instance>> {
                Box::pin(hook(key, instance))
            },
        );
        Interceptor::After(AfterHook::Async(hook))
    }

    pub fn on_error<F>(hook: F) -> Self
    where
        F: Fn(&ServiceKey, &(dyn Error + 'static)) + Send + Sync + 'static,
    {
        Interceptor::Error(ErrorHook::Sync(Arc::new(hook)))
    }

    pub fn on_error_async<F, Fut>(hook: F) -> Self
    where
        F: Fn(ServiceKey, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: AsyncErrorFn = Arc::new(
            move |key: ServiceKey, message: String| -> BoxFuture<'static, ()> {
                Box::pin(hook(key, message))
            },
        );
        Interceptor::Error(ErrorHook::Async(hook))
    }

    pub fn kind(&self) -> InterceptorKind {
        match self {
            Interceptor::Before(_) => InterceptorKind::Before,
            Interceptor::After(_) => InterceptorKind::After,
            Interceptor::Error(_) => InterceptorKind::Error,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(
            self,
            Interceptor::Before(BeforeHook::Async(_))
                | Interceptor::After(AfterHook::Async(_))
                | Interceptor::Error(ErrorHook::Async(_))
        )
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interceptor({}, async: {})", self.kind(), self.is_async())
    }
}

/// The three ordered hook lists of a container.
#[derive(Default)]
pub(crate) struct Interceptors {
    before: RwLock<Vec<BeforeHook>>,
    after: RwLock<Vec<AfterHook>>,
    error: RwLock<Vec<ErrorHook>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, interceptor: Interceptor) {
        debug!(kind = %interceptor.kind(), is_async = interceptor.is_async(), "Added interceptor");
        match interceptor {
            Interceptor::Before(hook) => self.before.write().push(hook),
            Interceptor::After(hook) => self.after.write().push(hook),
            Interceptor::Error(hook) => self.error.write().push(hook),
        }
    }

    pub fn len(&self, kind: InterceptorKind) -> usize {
        match kind {
            InterceptorKind::Before => self.before.read().len(),
            InterceptorKind::After => self.after.read().len(),
            InterceptorKind::Error => self.error.read().len(),
        }
    }

    pub fn clear(&self) {
        self.before.write().clear();
        self.after.write().clear();
        self.error.write().clear();
    }

    /// # Errors
    /// [`KhazinError::Resolution`] when a hook vetoes.
    pub fn run_before(&self, key: &ServiceKey, registration: &Registration) -> Result<()> {
        let hooks = self.before.read().clone();
        for hook in hooks {
            if let BeforeHook::Sync(hook) = hook
                && !hook(key, registration)
            {
                return Err(veto(key));
            }
        }
        Ok(())
    }

    pub async fn run_before_async(&self, key: &ServiceKey, registration: &Arc<Registration>) -> Result<()> {
        let hooks = self.before.read().clone();
        for hook in hooks {
            let allowed = match hook {
                BeforeHook::Sync(hook) => hook(key, registration),
                BeforeHook::Async(hook) => hook(key.clone(), registration.clone()).await,
            };
            if !allowed {
                return Err(veto(key));
            }
        }
        Ok(())
    }

    pub fn run_after(&self, key: &ServiceKey, instance: Instance) -> Instance {
        let hooks = self.after.read().clone();
        let mut current = instance;
        for hook in hooks {
            if let AfterHook::Sync(hook) = hook
                && let Some(replacement) = hook(key, &current)
            {
                trace!(key = %key, "After-interceptor replaced instance");
                current = replacement;
            }
        }
        current
    }

    pub async fn run_after_async(&self, key: &ServiceKey, instance: Instance) -> Instance {
        let hooks = self.after.read().clone();
        let mut current = instance;
        for hook in hooks {
            let replacement = match hook {
                AfterHook::Sync(hook) => hook(key, &current),
                AfterHook::Async(hook) => hook(key.clone(), current.clone()).await,
            };
            if let Some(replacement) = replacement {
                trace!(key = %key, "After-interceptor replaced instance");
                current = replacement;
            }
        }
        current
    }

    pub fn run_error(&self, key: &ServiceKey, error: &(dyn Error + 'static)) {
        let hooks = self.error.read().clone();
        for hook in hooks {
            if let ErrorHook::Sync(hook) = hook {
                hook(key, error);
            }
        }
    }

    pub async fn run_error_async(&self, key: &ServiceKey, error: &(dyn Error + Send + Sync + 'static)) {
        let hooks = self.error.read().clone();
        for hook in hooks {
            match hook {
                ErrorHook::Sync(hook) => hook(key, error),
                ErrorHook::Async(hook) => hook(key.clone(), error.to_string()).await,
            }
        }
    }
}

fn veto(key: &ServiceKey) -> KhazinError {
    debug!(key = %key, "Resolution vetoed by before-interceptor");
    KhazinError::resolution(key.clone(), "vetoed by before-interceptor")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifetime::Lifetime;
    use crate::strategy::{CreationStrategy, Signature};
    use parking_lot::Mutex;

    fn registration(name: &str) -> Arc<Registration> {
        Arc::new(Registration::new(
            ServiceKey::named(name),
            CreationStrategy::constructor(Signature::new(), |_| Ok(0u8)),
            Lifetime::Transient,
        ))
    }

    #[test]
    fn before_hooks_run_in_order_and_can_veto() {
        let interceptors = Interceptors::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let log = log.clone();
            interceptors.add(Interceptor::before(move |_, _| {
                log.lock().push(tag);
                true
            }));
        }
        interceptors.add(Interceptor::before(|key, _| key.name() != Some("secret")));

        let reg = registration("public");
        assert!(interceptors.run_before(&reg.key, &reg).is_ok());
        assert_eq!(*log.lock(), ["first", "second"]);

        let reg = registration("secret");
        let err = interceptors.run_before(&reg.key, &reg).unwrap_err();
        assert!(err.to_string().contains("secret"));
        assert!(err.to_string().contains("vetoed"));
    }

    #[test]
    fn after_hooks_replace_instance() {
        let interceptors = Interceptors::new();
        interceptors.add(Interceptor::after(|_, _| None));
        interceptors.add(Interceptor::after(|_, _| Some(Arc::new(42u32) as Instance)));

        let result = interceptors.run_after(&ServiceKey::named("n"), Arc::new(1u32));
        assert_eq!(*result.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn sync_pipeline_skips_async_hooks() {
        let interceptors = Interceptors::new();
        interceptors.add(Interceptor::before_async(|_, _| async { false }));

        let reg = registration("any");
        assert!(interceptors.run_before(&reg.key, &reg).is_ok());
        assert_eq!(interceptors.len(InterceptorKind::Before), 1);
    }

    #[test]
    fn error_hooks_observe() {
        let interceptors = Interceptors::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            interceptors.add(Interceptor::on_error(move |key, error| {
                seen.lock().push(format!("{key}: {error}"));
            }));
        }

        let cause: crate::error::BoxError = "disk full".into();
        interceptors.run_error(&ServiceKey::named("writer"), cause.as_ref());
        assert_eq!(*seen.lock(), ["writer: disk full"]);
    }

    #[tokio::test]
    async fn async_pipeline_awaits_both_kinds() {
        let interceptors = Interceptors::new();
        interceptors.add(Interceptor::after(|_, _| Some(Arc::new(1u32) as Instance)));
        interceptors.add(Interceptor::after_async(|_, current| async move {
            let n = *current.downcast::<u32>().ok()?;
            Some(Arc::new(n + 10) as Instance)
        }));

        let result = interceptors
            .run_after_async(&ServiceKey::named("n"), Arc::new(0u32))
            .await;
        assert_eq!(*result.downcast::<u32>().unwrap(), 11);

        interceptors.add(Interceptor::before_async(|_, _| async { false }));
        let reg = registration("any");
        assert!(interceptors.run_before_async(&reg.key, &reg).await.is_err());

        interceptors.clear();
        assert_eq!(interceptors.len(InterceptorKind::After), 0);
    }
}
