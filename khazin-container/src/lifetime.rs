//! Instance caching policies.
//!
//! A [`Lifetime`] determines how long a resolved instance lives:
//! - [`Lifetime::Singleton`]: one instance for the container's lifetime
//! - [`Lifetime::Scoped`]: one instance per active [`Scope`](crate::scope::Scope)
//! - [`Lifetime::Transient`]: new instance every time
//! - [`Lifetime::Factory`]: the strategy runs every time, never cached
use std::fmt;

/// Defines the caching policy of a registration.
///
/// # Examples
/// ```
/// use khazin_container::lifetime::Lifetime;
///
/// assert!(Lifetime::Singleton.is_cached());
/// assert!(!Lifetime::Factory.is_cached());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// One instance shared across the whole container.
    ///
    /// Created on first resolve, disposed with the container.
    Singleton,

    /// One instance per scope (e.g., per request).
    ///
    /// Created on first resolve within the active scope, disposed when
    /// that scope exits.
    Scoped,

    /// New instance created on every resolve call.
    #[default]
    Transient,

    /// The creation strategy is invoked on every resolve.
    ///
    /// Caches like [`Lifetime::Transient`]; documents that the strategy
    /// itself is not idempotent.
    Factory,
}

impl Lifetime {
    /// Returns `true` if instances of this lifetime are stored in a cache.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Lifetime::Singleton | Lifetime::Scoped)
    }

    /// Returns `true` for the container-wide lifetime.
    #[inline]
    pub fn is_singleton(&self) -> bool {
        matches!(self, Lifetime::Singleton)
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Singleton => write!(f, "Singleton"),
            Lifetime::Scoped => write!(f, "Scoped"),
            Lifetime::Transient => write!(f, "Transient"),
            Lifetime::Factory => write!(f, "Factory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_is_cached() {
        assert!(Lifetime::Singleton.is_cached());
        assert!(Lifetime::Scoped.is_cached());
        assert!(!Lifetime::Transient.is_cached());
        assert!(!Lifetime::Factory.is_cached());
    }

    #[test]
    fn default_is_transient() {
        assert_eq!(Lifetime::default(), Lifetime::Transient);
    }

    #[test]
    fn lifetime_display() {
        assert_eq!(format!("{}", Lifetime::Singleton), "Singleton");
        assert_eq!(format!("{}", Lifetime::Scoped), "Scoped");
        assert_eq!(format!("{}", Lifetime::Transient), "Transient");
        assert_eq!(format!("{}", Lifetime::Factory), "Factory");
    }

    #[test]
    fn lifetime_from_config_value() {
        let lifetime: Lifetime = serde_json::from_str("\"scoped\"").unwrap();
        assert_eq!(lifetime, Lifetime::Scoped);
    }
}
