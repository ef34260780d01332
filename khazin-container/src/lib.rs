//! Resolution engine for the Khazin DI container.
//!
//! Registrations, lifetime stores, dependency analysis, cycle detection
//! with lazy cycle breaking, interceptors, scopes, and the synchronous and
//! asynchronous resolution pipelines.

pub mod analyzer;
pub mod circular;
pub mod container;
mod engine;
pub mod error;
mod graph;
pub mod interceptor;
pub mod key;
pub mod lazy;
pub mod lifetime;
pub mod provider;
pub mod registry;
pub mod scope;
pub mod settings;
pub mod store;
pub mod strategy;

pub use container::{Container, ContainerBuilder, prelude};
pub use error::{KhazinError, Result};
pub use key::{GenericKey, ServiceKey};
pub use lazy::{Lazy, LazyHandle};
pub use lifetime::Lifetime;
pub use scope::Scope;
