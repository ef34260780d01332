//! Error types for Khazin container operations.
//!
//! Every error names the offending [`ServiceKey`] and, where it helps,
//! a hint about how to fix the registration graph.

use std::fmt;

use khazin_support::rendering::{render_chain, render_sample};

use crate::key::ServiceKey;

/// Error type user creation strategies and disposal hooks return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Khazin operations.
#[derive(Debug, thiserror::Error)]
pub enum KhazinError {
    /// Requested service (or a required dependency) was never registered.
    #[error("{}", .0)]
    ServiceNotFound(ServiceNotFoundError),

    /// Eager re-entrant resolution, or the resolution depth limit was hit.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// Service was already registered and override was not requested.
    #[error("{}", .0)]
    Registration(RegistrationError),

    /// Dependency analysis, creation, or a before-interceptor failed.
    #[error(transparent)]
    Resolution(ResolutionError),

    /// Scoped resolution attempted with no active scope.
    #[error("{}", .0)]
    ScopeNotActive(ScopeNotActiveError),

    /// Mutually exclusive or out-of-range container settings.
    #[error("Invalid container configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl KhazinError {
    /// Builds a [`KhazinError::Resolution`] with no underlying cause.
    pub fn resolution(key: ServiceKey, reason: impl Into<String>) -> Self {
        KhazinError::Resolution(ResolutionError {
            key,
            reason: reason.into(),
            source: None,
        })
    }

    /// Wraps an underlying cause into a [`KhazinError::Resolution`].
    pub fn resolution_from(key: ServiceKey, source: BoxError) -> Self {
        KhazinError::Resolution(ResolutionError {
            key,
            reason: "creation strategy failed".to_string(),
            source: Some(source),
        })
    }

    /// Returns the offending key, when the error is tied to one.
    pub fn key(&self) -> Option<&ServiceKey> {
        match self {
            KhazinError::ServiceNotFound(e) => Some(&e.requested),
            KhazinError::CircularDependency(e) => e.chain.last(),
            KhazinError::Registration(e) => Some(&e.key),
            KhazinError::Resolution(e) => Some(&e.key),
            KhazinError::ScopeNotActive(e) => Some(&e.key),
            KhazinError::InvalidConfiguration { .. } => None,
        }
    }

    /// `true` for the two kinds `try_resolve` turns into a default.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KhazinError::ServiceNotFound(_) | KhazinError::Resolution(_)
        )
    }
}

/// Error when a service was not registered.
///
/// Includes a bounded sample of what IS registered, plus close matches.
#[derive(Debug)]
pub struct ServiceNotFoundError {
    /// The service that was requested
    pub requested: ServiceKey,
    /// What required this service (if raised for a dependency)
    pub required_by: Option<ServiceKey>,
    /// Bounded sample of registered keys
    pub registered: Vec<ServiceKey>,
    /// Total number of registrations the sample was taken from
    pub registered_total: usize,
    /// Similar registered names (for "did you mean?" suggestions)
    pub suggestions: Vec<String>,
}

impl fmt::Display for ServiceNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service not found: {}", self.requested)?;

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        let sample: Vec<String> = self.registered.iter().map(ToString::to_string).collect();
        write!(
            f,
            "\n  Registered: {}",
            render_sample(&sample, self.registered_total)
        )?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Did you forget to register {}?",
            self.requested
        )
    }
}

/// Error when a circular dependency is detected.
///
/// Shows the full resolution chain so you can see WHERE the cycle is.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// The in-flight stack followed by the key that was re-entered.
    /// Example: [A, B, A]
    pub chain: Vec<ServiceKey>,
    /// Set when the depth guard fired instead of a true cycle.
    pub depth_limit: Option<usize>,
}

impl CircularDependencyError {
    /// The key whose resolution was refused.
    pub fn key(&self) -> Option<&ServiceKey> {
        self.chain.last()
    }
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<String> = self.chain.iter().map(ToString::to_string).collect();

        match self.depth_limit {
            Some(limit) => {
                write!(f, "Resolution depth limit ({limit}) exceeded:\n  ")?;
                write!(f, "{}", render_chain(&chain))?;
                write!(
                    f,
                    "\n  Hint: Check for unbounded dependency chains or raise max_depth"
                )
            }
            None => {
                write!(f, "Circular dependency detected:\n  ")?;
                write!(f, "{}", render_chain(&chain))?;
                write!(
                    f,
                    "\n  Hint: Consider using lazy injection or restructuring your dependencies"
                )
            }
        }
    }
}

/// Error when trying to register a service that already exists.
#[derive(Debug)]
pub struct RegistrationError {
    pub key: ServiceKey,
    pub reason: String,
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registration of {} failed: {}", self.key, self.reason)?;
        write!(
            f,
            "\n  Hint: Pass override = true to replace it, or enable allow_override in settings"
        )
    }
}

/// Error raised while analysing, creating, or intercepting a service.
#[derive(Debug)]
pub struct ResolutionError {
    pub key: ServiceKey,
    pub reason: String,
    pub source: Option<BoxError>,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to resolve {}: {}", self.key, self.reason)?;
        if let Some(ref source) = self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Error when a scoped service is resolved outside an active scope.
#[derive(Debug)]
pub struct ScopeNotActiveError {
    pub key: ServiceKey,
}

impl fmt::Display for ScopeNotActiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No active scope while resolving {}", self.key)?;
        write!(
            f,
            "\n  Hint: Resolve scoped services through an entered scope (container.create_scope().entered())"
        )
    }
}

/// Convenient Result type for Khazin operations.
pub type Result<T> = std::result::Result<T, KhazinError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    struct Mailer;

    #[test]
    fn service_not_found_display() {
        let err = KhazinError::ServiceNotFound(ServiceNotFoundError {
            requested: ServiceKey::named("never_registered"),
            required_by: Some(ServiceKey::of::<Mailer>()),
            registered: vec![ServiceKey::named("clock")],
            registered_total: 3,
            suggestions: vec![],
        });

        let msg = format!("{err}");
        assert!(msg.contains("never_registered"));
        assert!(msg.contains("Required by: Mailer"));
        assert!(msg.contains("clock (+2 more)"));
    }

    #[test]
    fn circular_dependency_display() {
        let err = KhazinError::CircularDependency(CircularDependencyError {
            chain: vec![
                ServiceKey::named("A"),
                ServiceKey::named("B"),
                ServiceKey::named("A"),
            ],
            depth_limit: None,
        });

        let msg = format!("{err}");
        assert!(msg.contains("Circular"));
        assert!(msg.contains("A → B → A"));
        assert_eq!(err.key(), Some(&ServiceKey::named("A")));
    }

    #[test]
    fn depth_limit_display() {
        let err = CircularDependencyError {
            chain: vec![ServiceKey::named("deep")],
            depth_limit: Some(4),
        };
        assert!(err.to_string().contains("depth limit (4)"));
    }

    #[test]
    fn resolution_keeps_source() {
        let cause: BoxError = "connection refused".into();
        let err = KhazinError::resolution_from(ServiceKey::of::<Mailer>(), cause);

        assert!(err.to_string().contains("connection refused"));
        assert!(err.source().is_some());
        assert!(err.is_recoverable());
    }

    #[test]
    fn scope_not_active_names_key() {
        let err = KhazinError::ScopeNotActive(ScopeNotActiveError {
            key: ServiceKey::named("request_ctx"),
        });
        assert!(err.to_string().contains("request_ctx"));
        assert!(!err.is_recoverable());
    }
}
