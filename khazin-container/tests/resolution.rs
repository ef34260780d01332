//! End-to-end resolution behavior through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use khazin_container::interceptor::Interceptor;
use khazin_container::prelude::*;
use khazin_container::strategy::Instance;

#[derive(Debug)]
struct Logger;

#[derive(Debug)]
struct Database {
    logger: Arc<Logger>,
}

#[derive(Debug)]
struct Widget;

#[derive(Debug)]
struct ScopedThing;

#[derive(Debug)]
struct P;
#[derive(Debug)]
struct Q;

struct A {
    b: Lazy<B>,
}

struct B {
    a: Lazy<A>,
}

fn logger_and_database() -> Container {
    let container = Container::new();
    container
        .register(
            ServiceKey::of::<Logger>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(Logger)),
            Lifetime::Singleton,
        )
        .unwrap()
        .register(
            ServiceKey::of::<Database>(),
            CreationStrategy::constructor(Signature::new().param::<Logger>("logger"), |args| {
                Ok(Database {
                    logger: args.get("logger")?,
                })
            }),
            Lifetime::Singleton,
        )
        .unwrap();
    container
}

fn eager_cycle(lifetime: Lifetime) -> Container {
    let container = Container::new();
    container
        .register(
            ServiceKey::of::<P>(),
            CreationStrategy::constructor(Signature::new().param::<Q>("q"), |_| Ok(P)),
            lifetime,
        )
        .unwrap()
        .register(
            ServiceKey::of::<Q>(),
            CreationStrategy::constructor(Signature::new().param::<P>("p"), |_| Ok(Q)),
            lifetime,
        )
        .unwrap();
    container
}

fn lazy_cycle() -> Container {
    let container = Container::new();
    container
        .register(
            ServiceKey::of::<A>(),
            CreationStrategy::constructor(Signature::new().lazy::<B>("b"), |args| {
                Ok(A { b: args.lazy("b")? })
            }),
            Lifetime::Singleton,
        )
        .unwrap()
        .register(
            ServiceKey::of::<B>(),
            CreationStrategy::constructor(Signature::new().lazy::<A>("a"), |args| {
                Ok(B { a: args.lazy("a")? })
            }),
            Lifetime::Singleton,
        )
        .unwrap();
    container
}

// ── Lifetimes ──

#[test]
fn singleton_identity_and_shared_dependency() {
    let container = logger_and_database();

    let first = container.resolve::<Database>().unwrap();
    let second = container.resolve::<Database>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let logger = container.resolve::<Logger>().unwrap();
    assert!(Arc::ptr_eq(&first.logger, &logger));
}

#[test]
fn transient_distinctness() {
    let container = Container::new();
    container
        .register(
            ServiceKey::of::<Widget>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(Widget)),
            Lifetime::Transient,
        )
        .unwrap();

    let first = container.resolve::<Widget>().unwrap();
    let second = container.resolve::<Widget>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn factory_lifetime_runs_strategy_every_time() {
    let calls = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    {
        let calls = calls.clone();
        container
            .register_factory(ServiceKey::of::<Widget>(), Lifetime::Factory, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Widget)
            })
            .unwrap();
    }

    for _ in 0..3 {
        container.resolve::<Widget>().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn scope_isolation() {
    let container = Container::new();
    container
        .register(
            ServiceKey::of::<ScopedThing>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(ScopedThing)),
            Lifetime::Scoped,
        )
        .unwrap();

    let s1 = container.create_scope().entered();
    let a = s1.resolve::<ScopedThing>().unwrap();
    let b = s1.resolve::<ScopedThing>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    s1.exit();

    let s2 = container.create_scope().entered();
    let c = s2.resolve::<ScopedThing>().unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
}

#[test]
fn scoped_without_scope_is_rejected() {
    let container = Container::new();
    container
        .register(
            ServiceKey::of::<ScopedThing>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(ScopedThing)),
            Lifetime::Scoped,
        )
        .unwrap();

    let err = container.resolve::<ScopedThing>().unwrap_err();
    assert!(matches!(err, KhazinError::ScopeNotActive(_)));
    assert_eq!(container.resolution_depth(), 0);
}

#[test]
fn scope_exit_disposes_scoped_instances() {
    struct Transaction(Arc<AtomicUsize>);
    impl Disposable for Transaction {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let rolled_back = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    {
        let rolled_back = rolled_back.clone();
        container
            .register(
                "tx",
                CreationStrategy::constructor(Signature::new(), move |_| {
                    Ok(Transaction(rolled_back.clone()))
                })
                .with_disposal::<Transaction>(),
                Lifetime::Scoped,
            )
            .unwrap();
    }

    {
        let scope = container.create_scope().entered();
        scope.resolve_key(&ServiceKey::named("tx")).unwrap();
        scope.resolve_key(&ServiceKey::named("tx")).unwrap();
    }
    assert_eq!(rolled_back.load(Ordering::SeqCst), 1);
}

// ── Cycles ──

#[test]
fn eager_cycle_is_detected() {
    let container = eager_cycle(Lifetime::Transient);

    let err = container.resolve::<P>().unwrap_err();
    match &err {
        KhazinError::CircularDependency(e) => {
            assert!(e.chain.contains(&ServiceKey::of::<P>()));
            assert!(e.chain.contains(&ServiceKey::of::<Q>()));
        }
        other => panic!("expected CircularDependency, got {other:?}"),
    }

    let message = err.to_string();
    assert!(message.contains("P → Q → P"));
}

#[test]
fn lazy_cycle_round_trips_identity() {
    let container = lazy_cycle();

    let a = container.resolve::<A>().unwrap();
    let b = a.b.get().unwrap();
    let a_again = b.a.get().unwrap();

    assert!(Arc::ptr_eq(&a, &a_again));
    assert!(Arc::ptr_eq(&b, &container.resolve::<B>().unwrap()));
}

#[test]
fn depth_limit_guards_long_chains() {
    let container = Container::builder().max_depth(3).build().unwrap();
    for i in 0..5 {
        let next = format!("link-{}", i + 1);
        let signature = if i < 4 {
            Signature::new().key("next", next)
        } else {
            Signature::new()
        };
        container
            .register(
                format!("link-{i}"),
                CreationStrategy::constructor(signature, |_| Ok(Widget)),
                Lifetime::Transient,
            )
            .unwrap();
    }

    match container.resolve_by::<Widget>("link-0").unwrap_err() {
        KhazinError::CircularDependency(e) => assert_eq!(e.depth_limit, Some(3)),
        other => panic!("expected depth limit, got {other:?}"),
    }
    assert!(container.resolve_by::<Widget>("link-2").is_ok());
}

// ── Stack balance ──

#[test]
fn stack_balanced_after_success_and_failure() {
    let container = eager_cycle(Lifetime::Singleton);
    container
        .register_factory("failing", Lifetime::Transient, |_| -> std::result::Result<Widget, BoxError> {
            Err("boom".into())
        })
        .unwrap()
        .register(
            ServiceKey::of::<Widget>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(Widget)),
            Lifetime::Transient,
        )
        .unwrap();

    assert_eq!(container.resolution_depth(), 0);
    let _ = container.resolve::<P>();
    assert_eq!(container.resolution_depth(), 0);
    let _ = container.resolve_by::<Widget>("failing");
    assert_eq!(container.resolution_depth(), 0);
    let _ = container.resolve::<Widget>();
    assert_eq!(container.resolution_depth(), 0);
    let _ = container.resolve_by::<Widget>("never_registered");
    assert_eq!(container.resolution_depth(), 0);
}

// ── Missing services ──

#[test]
fn missing_service_is_reported_by_name() {
    let container = logger_and_database();

    let err = container.resolve_by::<Widget>("never_registered").unwrap_err();
    assert!(matches!(err, KhazinError::ServiceNotFound(_)));

    let message = err.to_string();
    assert!(message.contains("never_registered"));
    assert!(message.contains("Database"));
    assert!(message.contains("Logger"));
}

#[test]
fn missing_dependency_names_requirer() {
    let container = Container::new();
    container
        .register(
            ServiceKey::of::<Database>(),
            CreationStrategy::constructor(Signature::new().param::<Logger>("logger"), |args| {
                Ok(Database {
                    logger: args.get("logger")?,
                })
            }),
            Lifetime::Singleton,
        )
        .unwrap();

    match container.resolve::<Database>().unwrap_err() {
        KhazinError::ServiceNotFound(e) => {
            assert_eq!(e.requested, ServiceKey::of::<Logger>());
            assert_eq!(e.required_by, Some(ServiceKey::of::<Database>()));
        }
        other => panic!("expected ServiceNotFound, got {other:?}"),
    }
}

#[test]
fn not_found_sample_is_bounded() {
    let container = Container::builder().suggestion_limit(2).build().unwrap();
    for i in 0..5 {
        container
            .register(
                format!("svc-{i}"),
                CreationStrategy::constructor(Signature::new(), |_| Ok(Widget)),
                Lifetime::Transient,
            )
            .unwrap();
    }

    match container.resolve_by::<Widget>("absent").unwrap_err() {
        KhazinError::ServiceNotFound(e) => {
            assert_eq!(e.registered.len(), 2);
            assert_eq!(e.registered_total, 5);
            assert!(e.to_string().contains("(+3 more)"));
        }
        other => panic!("expected ServiceNotFound, got {other:?}"),
    }
}

// ── Optional dependencies and defaults ──

#[test]
fn optional_missing_is_omitted_and_defaults_are_passed() {
    struct Reporter {
        mailer: Option<Arc<Widget>>,
        retries: u32,
    }

    let container = Container::new();
    container
        .register(
            "reporter",
            CreationStrategy::constructor(
                Signature::new()
                    .optional::<Widget>("mailer")
                    .with_default("retries", 3u32),
                |args| {
                    Ok(Reporter {
                        mailer: args.optional("mailer")?,
                        retries: args.value("retries")?,
                    })
                },
            ),
            Lifetime::Transient,
        )
        .unwrap();

    let reporter = container.resolve_by::<Reporter>("reporter").unwrap();
    assert!(reporter.mailer.is_none());
    assert_eq!(reporter.retries, 3);

    container
        .register(
            ServiceKey::of::<Widget>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(Widget)),
            Lifetime::Singleton,
        )
        .unwrap();
    let reporter = container.resolve_by::<Reporter>("reporter").unwrap();
    assert!(reporter.mailer.is_some());
}

#[test]
fn generic_keys_are_distinct_services() {
    struct User;
    struct Order;
    struct Repository(&'static str);

    let container = Container::new();
    container
        .register(
            GenericKey::new("Repository").arg::<User>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(Repository("users"))),
            Lifetime::Singleton,
        )
        .unwrap()
        .register(
            GenericKey::new("Repository").arg::<Order>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(Repository("orders"))),
            Lifetime::Singleton,
        )
        .unwrap();

    let users = container
        .resolve_by::<Repository>(GenericKey::new("Repository").arg::<User>())
        .unwrap();
    let orders = container
        .resolve_by::<Repository>(GenericKey::new("Repository").arg::<Order>())
        .unwrap();
    assert_eq!(users.0, "users");
    assert_eq!(orders.0, "orders");
}

// ── Lazy entry point ──

#[test]
fn lazy_request_touches_nothing_until_used() {
    let calls = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    {
        let calls = calls.clone();
        container
            .register_factory(ServiceKey::of::<Widget>(), Lifetime::Transient, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Widget)
            })
            .unwrap();
    }

    let lazy = container.resolve_lazy::<Widget>();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(container.resolution_depth(), 0);

    let first = lazy.get().unwrap();
    let second = lazy.get().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ── Interceptors ──

#[test]
fn interceptors_veto_replace_and_observe() {
    let observed = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container
        .register(
            ServiceKey::of::<Widget>(),
            CreationStrategy::constructor(Signature::new(), |_| Ok(Widget)),
            Lifetime::Transient,
        )
        .unwrap()
        .register("forbidden", CreationStrategy::constructor(Signature::new(), |_| Ok(Widget)), Lifetime::Transient)
        .unwrap()
        .register(
            "number",
            CreationStrategy::constructor(Signature::new(), |_| Ok(1u32)),
            Lifetime::Transient,
        )
        .unwrap()
        .register_factory("broken", Lifetime::Transient, |_| -> std::result::Result<Widget, BoxError> {
            Err("wire cut".into())
        })
        .unwrap();

    container
        .add_interceptor(Interceptor::before(|key, _| key.name() != Some("forbidden")))
        .add_interceptor(Interceptor::after(|key, _| {
            (key.name() == Some("number")).then(|| Arc::new(99u32) as Instance)
        }));
    {
        let observed = observed.clone();
        container.add_interceptor(Interceptor::on_error(move |_, error| {
            assert_eq!(error.to_string(), "wire cut");
            observed.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let vetoed = container.resolve_by::<Widget>("forbidden").unwrap_err();
    assert!(matches!(vetoed, KhazinError::Resolution(_)));
    assert!(vetoed.to_string().contains("forbidden"));

    assert_eq!(*container.resolve_by::<u32>("number").unwrap(), 99);

    let failed = container.resolve_by::<Widget>("broken").unwrap_err();
    assert!(matches!(failed, KhazinError::Resolution(_)));
    assert!(failed.to_string().contains("wire cut"));
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    assert!(container.resolve::<Widget>().is_ok());
    assert_eq!(container.resolution_depth(), 0);
}

// ── Disposal ──

#[test]
fn dispose_releases_every_singleton_once() {
    struct Pool(Arc<AtomicUsize>, bool);
    impl Disposable for Pool {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            if self.1 { Err("already closed".into()) } else { Ok(()) }
        }
    }

    let closed = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container
        .register_disposable_instance("primary", Arc::new(Pool(closed.clone(), true)))
        .unwrap()
        .register_disposable_instance("replica", Arc::new(Pool(closed.clone(), false)))
        .unwrap();

    container.dispose();
    container.dispose();
    assert_eq!(closed.load(Ordering::SeqCst), 2);
    assert!(!container.is_registered("primary"));
}

// ── Async pipeline ──

#[tokio::test]
async fn sync_pipeline_rejects_async_registration() {
    let container = Container::new();
    container
        .register_async_factory(ServiceKey::of::<Widget>(), Lifetime::Singleton, |_| async {
            Ok(Widget)
        })
        .unwrap();

    let err = container.resolve::<Widget>().unwrap_err();
    assert!(matches!(err, KhazinError::Resolution(_)));
    assert!(err.to_string().contains("resolve_async"));

    let a = container.resolve_async::<Widget>().await.unwrap();
    let b = container.resolve_async::<Widget>().await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn async_pipeline_handles_mixed_graphs() {
    let container = logger_and_database();
    container
        .register(
            "report",
            CreationStrategy::async_factory(Signature::new().param::<Database>("db"), |args| async move {
                let db: Arc<Database> = args.get("db")?;
                Ok(Arc::strong_count(&db.logger) > 0)
            }),
            Lifetime::Transient,
        )
        .unwrap();

    let report = container.resolve_by_async::<bool>("report").await.unwrap();
    assert!(*report);

    let db = container.resolve_async::<Database>().await.unwrap();
    assert!(Arc::ptr_eq(&db, &container.resolve::<Database>().unwrap()));
}

#[tokio::test]
async fn async_eager_cycle_and_stack_balance() {
    let container = eager_cycle(Lifetime::Transient);
    let err = container.resolve_async::<P>().await.unwrap_err();
    assert!(matches!(err, KhazinError::CircularDependency(_)));
    assert_eq!(container.resolution_depth(), 0);
}

#[tokio::test]
async fn async_lazy_cycle_round_trips_identity() {
    let container = lazy_cycle();

    let a = container.resolve_async::<A>().await.unwrap();
    let b = a.b.get_async().await.unwrap();
    let a_again = b.a.get_async().await.unwrap();
    assert!(Arc::ptr_eq(&a, &a_again));
}

#[tokio::test]
async fn async_interceptors_are_awaited() {
    let container = Container::new();
    container
        .register(
            "number",
            CreationStrategy::constructor(Signature::new(), |_| Ok(1u32)),
            Lifetime::Transient,
        )
        .unwrap()
        .add_interceptor(Interceptor::after_async(|_, instance| async move {
            let n = *instance.downcast::<u32>().ok()?;
            Some(Arc::new(n * 10) as Instance)
        }));

    assert_eq!(*container.resolve_by_async::<u32>("number").await.unwrap(), 10);
    // the sync pipeline skips async hooks
    assert_eq!(*container.resolve_by::<u32>("number").unwrap(), 1);
}

#[tokio::test]
async fn try_resolve_async_recovers_missing() {
    let container = Container::new();
    assert!(container.try_resolve_async::<Widget>().await.unwrap().is_none());
}

#[tokio::test]
async fn warmup_async_includes_async_singletons() {
    let container = Container::new();
    container
        .register_async_factory(ServiceKey::of::<Widget>(), Lifetime::Singleton, |_| async {
            Ok(Widget)
        })
        .unwrap();

    assert_eq!(container.warmup(&[]), 0);
    assert_eq!(container.warmup_async(&[]).await, 1);
}

// ── Ordering and cancellation ──

fn recording_graph() -> (Container, Arc<parking_lot::Mutex<Vec<&'static str>>>) {
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let container = Container::new();
    for name in ["a", "m", "z"] {
        let order = order.clone();
        container
            .register_factory(name, Lifetime::Transient, move |_| {
                order.lock().push(name);
                Ok(Widget)
            })
            .unwrap();
    }
    container
        .register(
            "root",
            CreationStrategy::constructor(
                Signature::new().key("z", "z").key("a", "a").key("m", "m"),
                |_| Ok(Widget),
            ),
            Lifetime::Transient,
        )
        .unwrap();
    (container, order)
}

#[test]
fn dependencies_resolve_in_declaration_order() {
    let (container, order) = recording_graph();
    container.resolve_by::<Widget>("root").unwrap();
    assert_eq!(*order.lock(), vec!["z", "a", "m"]);
}

#[tokio::test]
async fn async_dependencies_resolve_in_declaration_order() {
    let (container, order) = recording_graph();
    container.resolve_by_async::<Widget>("root").await.unwrap();
    assert_eq!(*order.lock(), vec!["z", "a", "m"]);
}

#[tokio::test]
async fn cancelled_async_resolve_unwinds_stack() {
    struct Outer;
    struct Inner;

    let container = Container::new();
    container
        .register_async_factory(ServiceKey::of::<Inner>(), Lifetime::Singleton, |_| {
            std::future::pending::<std::result::Result<Inner, BoxError>>()
        })
        .unwrap()
        .register(
            ServiceKey::of::<Outer>(),
            CreationStrategy::constructor(Signature::new().param::<Inner>("inner"), |_| Ok(Outer)),
            Lifetime::Singleton,
        )
        .unwrap();

    let outcome = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        container.resolve_async::<Outer>(),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(container.resolution_depth(), 0);
}
