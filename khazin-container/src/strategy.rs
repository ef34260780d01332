//! Creation strategies: how a registration produces its instance.
//!
//! A [`CreationStrategy`] pairs a declared [`Signature`] (what the
//! strategy needs) with a creator closure (how the instance is built from
//! the resolved [`Arguments`]). The signature is declared explicitly at
//! configuration time; the [`DependencyAnalyzer`](crate::analyzer::DependencyAnalyzer)
//! turns it into dependency descriptors.
//!
//! # Examples
//! ```rust
//! use khazin_container::strategy::{CreationStrategy, Signature};
//! use std::sync::Arc;
//!
//! struct Clock;
//! struct Scheduler {
//!     clock: Arc<Clock>,
//!     workers: usize,
//! }
//!
//! let strategy = CreationStrategy::constructor(
//!     Signature::new()
//!         .param::<Clock>("clock")
//!         .with_default("workers", 4usize),
//!     |args| {
//!         Ok(Scheduler {
//!             clock: args.get::<Clock>("clock")?,
//!             workers: args.value::<usize>("workers")?,
//!         })
//!     },
//! );
//! assert!(!strategy.is_async());
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BoxError, KhazinError, Result};
use crate::key::{ServiceKey, TypeTag};
use crate::lazy::{Lazy, LazyHandle};
use crate::store::Disposable;

/// A resolved, type-erased service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Boxed future used by the asynchronous pipeline.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) type SyncCreateFn =
    Arc<dyn Fn(&Arguments) -> std::result::Result<Instance, BoxError> + Send + Sync>;

pub(crate) type AsyncCreateFn = Arc<
    dyn Fn(Arguments) -> BoxFuture<'static, std::result::Result<Instance, BoxError>>
        + Send
        + Sync,
>;

pub(crate) type DisposeFn =
    Arc<dyn Fn(&Instance) -> std::result::Result<(), BoxError> + Send + Sync>;

// ═══════════════════════════════════════════
// Signature
// ═══════════════════════════════════════════

/// Declared type of a strategy parameter.
#[derive(Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// An injectable service.
    Service(ServiceKey),
    /// A plain configuration value, never injected.
    Primitive(TypeTag),
    /// `Option<T>`: injected when registered, omitted otherwise.
    Optional(Box<TypeExpr>),
    /// `Lazy<T>`: injected as a handle resolved on first use.
    Lazy(Box<TypeExpr>),
}

impl TypeExpr {
    /// Classifies `T`: one of the builtin value types becomes
    /// [`TypeExpr::Primitive`], anything else a [`TypeExpr::Service`].
    pub fn of<T: ?Sized + 'static>() -> Self {
        let tag = TypeTag::of::<T>();
        if is_primitive(tag.type_id()) {
            TypeExpr::Primitive(tag)
        } else {
            TypeExpr::Service(ServiceKey::Type(tag))
        }
    }

    /// A service expression for an arbitrary key.
    pub fn key(key: impl Into<ServiceKey>) -> Self {
        TypeExpr::Service(key.into())
    }

    /// Wraps this expression in `Option`.
    pub fn optional(self) -> Self {
        TypeExpr::Optional(Box::new(self))
    }

    /// Wraps this expression in `Lazy`.
    pub fn lazy(self) -> Self {
        TypeExpr::Lazy(Box::new(self))
    }
}

impl fmt::Debug for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Service(key) => write!(f, "{key}"),
            TypeExpr::Primitive(tag) => write!(f, "{tag}"),
            TypeExpr::Optional(inner) => write!(f, "Option<{inner:?}>"),
            TypeExpr::Lazy(inner) => write!(f, "Lazy<{inner:?}>"),
        }
    }
}

fn is_primitive(id: TypeId) -> bool {
    [
        TypeId::of::<String>(),
        TypeId::of::<&'static str>(),
        TypeId::of::<str>(),
        TypeId::of::<bool>(),
        TypeId::of::<char>(),
        TypeId::of::<()>(),
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<i128>(),
        TypeId::of::<isize>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<u128>(),
        TypeId::of::<usize>(),
        TypeId::of::<f32>(),
        TypeId::of::<f64>(),
        TypeId::of::<Vec<u8>>(),
    ]
    .contains(&id)
}

/// Default of a strategy parameter.
#[derive(Clone)]
pub enum ParamDefault {
    /// No default: the parameter is required.
    Required,
    /// A default value; the parameter is not injected unless optional.
    Value(Instance),
    /// Explicit "inject this even though it has a default" marker.
    Inject,
}

impl fmt::Debug for ParamDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamDefault::Required => write!(f, "Required"),
            ParamDefault::Value(_) => write!(f, "Value(..)"),
            ParamDefault::Inject => write!(f, "Inject"),
        }
    }
}

/// One declared parameter of a creation strategy.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: Arc<str>,
    /// `None` means "not annotated": never injected.
    pub annotation: Option<TypeExpr>,
    pub default: ParamDefault,
}

impl Parameter {
    pub fn new(name: impl Into<Arc<str>>, annotation: Option<TypeExpr>, default: ParamDefault) -> Self {
        Self {
            name: name.into(),
            annotation,
            default,
        }
    }
}

/// Ordered parameter list of a creation strategy.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    /// An empty signature (no dependencies).
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw parameter.
    pub fn push(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    /// Required parameter of type `T`.
    pub fn param<T: ?Sized + 'static>(self, name: &str) -> Self {
        self.push(Parameter::new(name, Some(TypeExpr::of::<T>()), ParamDefault::Required))
    }

    /// Required parameter targeting an explicit key.
    pub fn key(self, name: &str, key: impl Into<ServiceKey>) -> Self {
        self.push(Parameter::new(name, Some(TypeExpr::key(key)), ParamDefault::Required))
    }

    /// `Option<T>` parameter.
    pub fn optional<T: ?Sized + 'static>(self, name: &str) -> Self {
        self.push(Parameter::new(
            name,
            Some(TypeExpr::of::<T>().optional()),
            ParamDefault::Required,
        ))
    }

    /// `Option<_>` parameter targeting an explicit key.
    pub fn optional_key(self, name: &str, key: impl Into<ServiceKey>) -> Self {
        self.push(Parameter::new(
            name,
            Some(TypeExpr::key(key).optional()),
            ParamDefault::Required,
        ))
    }

    /// `Lazy<T>` parameter.
    pub fn lazy<T: ?Sized + 'static>(self, name: &str) -> Self {
        self.push(Parameter::new(
            name,
            Some(TypeExpr::of::<T>().lazy()),
            ParamDefault::Required,
        ))
    }

    /// `Lazy<_>` parameter targeting an explicit key.
    pub fn lazy_key(self, name: &str, key: impl Into<ServiceKey>) -> Self {
        self.push(Parameter::new(
            name,
            Some(TypeExpr::key(key).lazy()),
            ParamDefault::Required,
        ))
    }

    /// `Option<Lazy<T>>` parameter.
    pub fn optional_lazy<T: ?Sized + 'static>(self, name: &str) -> Self {
        self.push(Parameter::new(
            name,
            Some(TypeExpr::of::<T>().lazy().optional()),
            ParamDefault::Required,
        ))
    }

    /// Parameter of type `T` carrying the force-inject marker.
    pub fn inject<T: ?Sized + 'static>(self, name: &str) -> Self {
        self.push(Parameter::new(name, Some(TypeExpr::of::<T>()), ParamDefault::Inject))
    }

    /// Parameter of type `T` with a default value; not injected.
    pub fn with_default<T: Send + Sync + 'static>(self, name: &str, value: T) -> Self {
        self.push(Parameter::new(
            name,
            Some(TypeExpr::of::<T>()),
            ParamDefault::Value(Arc::new(value)),
        ))
    }

    /// Parameter with no type annotation; never injected.
    pub fn untyped(self, name: &str, default: ParamDefault) -> Self {
        self.push(Parameter::new(name, None, default))
    }

    /// Declared parameters in order.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

// ═══════════════════════════════════════════
// Arguments
// ═══════════════════════════════════════════

/// A value handed to a creator for one parameter.
#[derive(Clone)]
pub enum Argument {
    /// A resolved dependency.
    Instance(Instance),
    /// A deferred dependency.
    Lazy(LazyHandle),
    /// The parameter's declared default.
    Default(Instance),
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Instance(_) => write!(f, "Instance(..)"),
            Argument::Lazy(handle) => write!(f, "{handle:?}"),
            Argument::Default(_) => write!(f, "Default(..)"),
        }
    }
}

/// Resolved arguments passed to a creator, addressed by parameter name.
///
/// Optional dependencies that were not registered are simply absent.
#[derive(Debug)]
pub struct Arguments {
    key: ServiceKey,
    slots: Vec<(Arc<str>, Argument)>,
}

impl Arguments {
    pub(crate) fn new(key: ServiceKey) -> Self {
        Self {
            key,
            slots: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: Arc<str>, argument: Argument) {
        self.slots.push((name, argument));
    }

    /// The key of the service being created.
    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    /// Raw access to one argument.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.slots
            .iter()
            .find(|(slot, _)| slot.as_ref() == name)
            .map(|(_, argument)| argument)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.argument(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Parameter names in the order they were resolved.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(name, _)| name.as_ref())
    }

    /// A resolved instance (or default value) of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        match self.optional::<T>(name)? {
            Some(value) => Ok(value),
            None => Err(self.error(format!("missing argument `{name}`"))),
        }
    }

    /// Like [`get`](Self::get), but an absent argument is `None`.
    pub fn optional<T: Send + Sync + 'static>(&self, name: &str) -> Result<Option<Arc<T>>> {
        match self.argument(name) {
            None => Ok(None),
            Some(Argument::Instance(instance) | Argument::Default(instance)) => instance
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| self.mismatch::<T>(name)),
            Some(Argument::Lazy(_)) => Err(self.error(format!(
                "argument `{name}` is lazy; use Arguments::lazy"
            ))),
        }
    }

    /// A lazy handle for a `Lazy<T>` parameter.
    pub fn lazy<T: Send + Sync + 'static>(&self, name: &str) -> Result<Lazy<T>> {
        match self.optional_lazy::<T>(name)? {
            Some(lazy) => Ok(lazy),
            None => Err(self.error(format!("missing argument `{name}`"))),
        }
    }

    /// Like [`lazy`](Self::lazy), but an absent argument is `None`.
    pub fn optional_lazy<T: Send + Sync + 'static>(&self, name: &str) -> Result<Option<Lazy<T>>> {
        match self.argument(name) {
            None => Ok(None),
            Some(Argument::Lazy(handle)) => Ok(Some(Lazy::new(handle.clone()))),
            Some(_) => Err(self.error(format!("argument `{name}` is not lazy"))),
        }
    }

    /// A cloned value, typically a declared default.
    pub fn value<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T> {
        self.get::<T>(name).map(|value| (*value).clone())
    }

    fn mismatch<T: 'static>(&self, name: &str) -> KhazinError {
        self.error(format!(
            "argument `{name}` is not a {}",
            std::any::type_name::<T>()
        ))
    }

    fn error(&self, reason: String) -> KhazinError {
        KhazinError::resolution(self.key.clone(), reason)
    }
}

// ═══════════════════════════════════════════
// CreationStrategy
// ═══════════════════════════════════════════

/// Process-unique identity of a creation strategy.
///
/// Dependency analysis is cached per strategy id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrategyId(u64);

impl StrategyId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// What kind of callable a strategy wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Construct a type from its declared dependencies.
    Constructor,
    /// Invoke a factory callable.
    Factory,
    /// Hand out a pre-built instance.
    Instance,
}

#[derive(Clone)]
pub(crate) enum Creator {
    Sync(SyncCreateFn),
    Async(AsyncCreateFn),
}

/// How a registration produces its instance.
#[derive(Clone)]
pub struct CreationStrategy {
    id: StrategyId,
    kind: StrategyKind,
    signature: Arc<Signature>,
    creator: Creator,
    disposer: Option<DisposeFn>,
    produces: Option<TypeTag>,
}

impl CreationStrategy {
    fn from_parts(kind: StrategyKind, signature: Signature, creator: Creator, produces: Option<TypeTag>) -> Self {
        Self {
            id: StrategyId::next(),
            kind,
            signature: Arc::new(signature),
            creator,
            disposer: None,
            produces,
        }
    }

    /// Constructs `T` from the arguments declared in `signature`.
    pub fn constructor<T, F>(signature: Signature, create: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_parts(
            StrategyKind::Constructor,
            signature,
            Creator::Sync(wrap_sync(create)),
            Some(TypeTag::of::<T>()),
        )
    }

    /// Invokes a synchronous factory callable.
    pub fn factory<T, F>(signature: Signature, create: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Arguments) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_parts(
            StrategyKind::Factory,
            signature,
            Creator::Sync(wrap_sync(create)),
            Some(TypeTag::of::<T>()),
        )
    }

    /// Invokes an asynchronous factory callable.
    ///
    /// Registrations using it can only be resolved through the
    /// asynchronous pipeline.
    pub fn async_factory<T, F, Fut>(signature: Signature, create: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        let creator: AsyncCreateFn = Arc::new(
            move |args: Arguments| -> BoxFuture<'static, std::result::Result<Instance, BoxError>> {
                let fut = create(args);
                Box::pin(async move { fut.await.map(|value| Arc::new(value) as Instance) })
            },
        );
        Self::from_parts(
            StrategyKind::Factory,
            signature,
            Creator::Async(creator),
            Some(TypeTag::of::<T>()),
        )
    }

    /// Hands out `instance` on every call.
    pub fn instance<T: Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self::from_instance(instance, Some(TypeTag::of::<T>()))
    }

    pub(crate) fn from_instance(instance: Instance, produces: Option<TypeTag>) -> Self {
        let creator: SyncCreateFn =
            Arc::new(move |_: &Arguments| Ok::<Instance, BoxError>(instance.clone()));
        Self::from_parts(StrategyKind::Instance, Signature::new(), Creator::Sync(creator), produces)
    }

    /// Opts the produced instances into disposal.
    ///
    /// Instances that are not a `T` (e.g. replaced by an after-interceptor)
    /// are left alone.
    pub fn with_disposal<T: Disposable>(mut self) -> Self {
        self.disposer = Some(disposer_for::<T>());
        self
    }

    pub(crate) fn with_disposer(mut self, disposer: Option<DisposeFn>) -> Self {
        self.disposer = disposer;
        self
    }

    pub fn id(&self) -> StrategyId {
        self.id
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// `true` when the creator is asynchronous. Fixed at construction.
    pub fn is_async(&self) -> bool {
        matches!(self.creator, Creator::Async(_))
    }

    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    /// The type this strategy produces, when known.
    pub fn produces(&self) -> Option<TypeTag> {
        self.produces
    }

    pub(crate) fn creator(&self) -> &Creator {
        &self.creator
    }

    pub(crate) fn disposer(&self) -> Option<DisposeFn> {
        self.disposer.clone()
    }
}

impl fmt::Debug for CreationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationStrategy")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("signature", &self.signature)
            .field("is_async", &self.is_async())
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

fn wrap_sync<T, F>(create: F) -> SyncCreateFn
where
    T: Send + Sync + 'static,
    F: Fn(&Arguments) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
{
    Arc::new(move |args: &Arguments| create(args).map(|value| Arc::new(value) as Instance))
}

pub(crate) fn disposer_for<T: Disposable>() -> DisposeFn {
    Arc::new(|instance: &Instance| match instance.clone().downcast::<T>() {
        Ok(service) => service.dispose(),
        Err(_) => Ok(()),
    })
}
