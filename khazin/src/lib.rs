//! # Khazin: Dependency Injection Resolution Engine for Rust
//!
//! Register services with a lifetime, resolve them synchronously or
//! asynchronously, break dependency cycles with lazy handles, and scope
//! per-request instances.
//!
//! ```rust
//! use khazin::prelude::*;
//! use std::sync::Arc;
//!
//! struct Parent {
//!     child: Lazy<Child>,
//! }
//! struct Child {
//!     parent: Lazy<Parent>,
//! }
//!
//! let container = Container::new();
//! container
//!     .register(
//!         ServiceKey::of::<Parent>(),
//!         CreationStrategy::constructor(Signature::new().lazy::<Child>("child"), |args| {
//!             Ok(Parent { child: args.lazy("child")? })
//!         }),
//!         Lifetime::Singleton,
//!     )
//!     .unwrap()
//!     .register(
//!         ServiceKey::of::<Child>(),
//!         CreationStrategy::constructor(Signature::new().lazy::<Parent>("parent"), |args| {
//!             Ok(Child { parent: args.lazy("parent")? })
//!         }),
//!         Lifetime::Singleton,
//!     )
//!     .unwrap();
//!
//! let parent = container.resolve::<Parent>().unwrap();
//! let child = parent.child.get().unwrap();
//! assert!(Arc::ptr_eq(&child.parent.get().unwrap(), &parent));
//! ```

pub use khazin_container::*;
pub use khazin_support::{rendering, telemetry};
