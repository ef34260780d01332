//! Provider trait: a module of related service registrations.
//!
//! Providers group registrations by concern so that a container is
//! populated from a handful of modules rather than one long block.
//!
//! # Examples
//! ```rust
//! use khazin_container::prelude::*;
//!
//! struct Clock;
//! struct TimeProvider;
//!
//! impl Provider for TimeProvider {
//!     fn register(&self, container: &Container) -> Result<()> {
//!         container.register(
//!             ServiceKey::of::<Clock>(),
//!             CreationStrategy::constructor(Signature::new(), |_| Ok(Clock)),
//!             Lifetime::Singleton,
//!         )?;
//!         Ok(())
//!     }
//! }
//!
//! let container = Container::builder().provider(TimeProvider).build().unwrap();
//! assert!(container.is_registered(ServiceKey::of::<Clock>()));
//! ```

use crate::container::Container;
use crate::error::Result;

/// A module that registers related services into a container.
pub trait Provider: Send + Sync {
    /// Registers this module's services.
    ///
    /// # Errors
    /// Whatever registration fails with, typically a duplicate key.
    fn register(&self, container: &Container) -> Result<()>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KhazinError;
    use crate::lifetime::Lifetime;
    use crate::strategy::{CreationStrategy, Signature};

    struct Greeting(&'static str);

    struct GreetingProvider;

    impl Provider for GreetingProvider {
        fn register(&self, container: &Container) -> Result<()> {
            container
                .register(
                    "greeting",
                    CreationStrategy::constructor(Signature::new(), |_| Ok(Greeting("hello"))),
                    Lifetime::Singleton,
                )?
                .alias("greeting", "salutation")?;
            Ok(())
        }
    }

    #[test]
    fn provider_registers_services() {
        let container = Container::new();
        container.add_provider(&GreetingProvider).unwrap();

        assert!(container.is_registered("greeting"));
        let greeting = container.resolve_by::<Greeting>("salutation").unwrap();
        assert_eq!(greeting.0, "hello");
    }

    #[test]
    fn provider_twice_is_a_duplicate() {
        let container = Container::new();
        container.add_provider(&GreetingProvider).unwrap();
        let err = container.add_provider(&GreetingProvider).unwrap_err();
        assert!(matches!(err, KhazinError::Registration(_)));
    }

    #[test]
    fn provider_has_name() {
        assert!(GreetingProvider.name().contains("GreetingProvider"));
    }
}
