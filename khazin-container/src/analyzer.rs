//! Dependency analysis: declared signature to dependency descriptors.
//!
//! For each parameter, in declaration order:
//! 1. No annotation → skipped
//! 2. Primitive value type → skipped (configuration, not a service)
//! 3. `Option<T>` → targets `T`, marked optional
//! 4. `Lazy<T>` → targets `T`, marked lazy (combines with optional)
//! 5. Included when required, force-injected, or optional
//!
//! Results are cached per [`StrategyId`] until [`DependencyAnalyzer::clear_cache`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::error::{KhazinError, Result};
use crate::key::ServiceKey;
use crate::strategy::{CreationStrategy, Instance, ParamDefault, Parameter, StrategyId, TypeExpr};

/// One injectable parameter of a creation strategy.
#[derive(Clone)]
pub struct DependencyDescriptor {
    pub name: Arc<str>,
    pub key: ServiceKey,
    pub optional: bool,
    pub lazy: bool,
    /// Carried the force-inject marker.
    pub injected: bool,
    /// Declared default value, if any.
    pub default: Option<Instance>,
}

impl DependencyDescriptor {
    /// `true` when the dependency is resolved immediately (not lazy).
    pub fn is_eager(&self) -> bool {
        !self.lazy
    }
}

impl fmt::Debug for DependencyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyDescriptor")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("optional", &self.optional)
            .field("lazy", &self.lazy)
            .field("injected", &self.injected)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Turns strategy signatures into dependency descriptors, with caching.
#[derive(Default)]
pub struct DependencyAnalyzer {
    cache: DashMap<StrategyId, Arc<[DependencyDescriptor]>>,
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzes `strategy`, which is registered under `key`.
    ///
    /// # Errors
    /// [`KhazinError::Resolution`] when two parameters share a name.
    pub fn analyze(&self, strategy: &CreationStrategy, key: &ServiceKey) -> Result<Arc<[DependencyDescriptor]>> {
        if let Some(cached) = self.cache.get(&strategy.id()) {
            return Ok(cached.clone());
        }

        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();

        for param in strategy.signature().params() {
            if !seen.insert(param.name.clone()) {
                return Err(KhazinError::resolution(
                    key.clone(),
                    format!("duplicate parameter `{}` in signature", param.name),
                ));
            }
            if let Some(descriptor) = describe(param) {
                descriptors.push(descriptor);
            }
        }

        trace!(key = %key, dependencies = descriptors.len(), "Analyzed signature");

        let descriptors: Arc<[DependencyDescriptor]> = descriptors.into();
        self.cache.insert(strategy.id(), descriptors.clone());
        Ok(descriptors)
    }

    /// Forgets every cached analysis.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Forgets the analysis of one strategy.
    pub fn evict(&self, id: StrategyId) {
        self.cache.remove(&id);
    }

    #[cfg(test)]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl fmt::Debug for DependencyAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyAnalyzer")
            .field("cached", &self.cache.len())
            .finish()
    }
}

fn describe(param: &Parameter) -> Option<DependencyDescriptor> {
    let annotation = param.annotation.as_ref()?;

    if matches!(annotation, TypeExpr::Primitive(_)) {
        return None;
    }

    let mut optional = false;
    let mut lazy = false;
    let mut current = annotation;
    let key = loop {
        match current {
            TypeExpr::Optional(inner) => {
                optional = true;
                current = inner;
            }
            TypeExpr::Lazy(inner) => {
                lazy = true;
                current = inner;
            }
            TypeExpr::Service(key) => break key.clone(),
            // Option<String> and friends: still a value, not a service
            TypeExpr::Primitive(_) => return None,
        }
    };

    let (default, injected) = match &param.default {
        ParamDefault::Required => (None, false),
        ParamDefault::Inject => (None, true),
        ParamDefault::Value(value) => (Some(value.clone()), false),
    };

    let included = default.is_none() || injected || optional;
    included.then(|| DependencyDescriptor {
        name: param.name.clone(),
        key,
        optional,
        lazy,
        injected,
        default,
    })
}
