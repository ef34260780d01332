//! Static dependency graph validation.
//!
//! Walks the declared signatures without creating anything:
//! - every required eager dependency must be registered
//! - no cycle may consist of eager edges only
//!
//! Lazy and optional edges are left out of the graph: lazy edges are how
//! cycles are broken, and optional edges may legitimately be missing.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use khazin_support::rendering::{shorten_type_name, suggest_similar};

use crate::error::{CircularDependencyError, KhazinError, ServiceNotFoundError};
use crate::key::ServiceKey;

/// Depth-first validator over `key → eager dependencies` edges.
///
/// Keeps a `visiting` set plus the current path; meeting a key that is
/// still being visited closes a cycle.
pub(crate) struct GraphValidator {
    edges: HashMap<ServiceKey, Vec<ServiceKey>>,
    visiting: HashSet<ServiceKey>,
    validated: HashSet<ServiceKey>,
    path: Vec<ServiceKey>,
    sample_limit: usize,
}

impl GraphValidator {
    pub fn new(edges: HashMap<ServiceKey, Vec<ServiceKey>>, sample_limit: usize) -> Self {
        Self {
            edges,
            visiting: HashSet::new(),
            validated: HashSet::new(),
            path: Vec::new(),
            sample_limit,
        }
    }

    /// # Errors
    /// - [`KhazinError::CircularDependency`]: eager cycle
    /// - [`KhazinError::ServiceNotFound`]: missing required dependency
    #[instrument(skip(self), name = "graph_walk")]
    pub fn validate(&mut self) -> Result<(), KhazinError> {
        let mut keys: Vec<ServiceKey> = self.edges.keys().cloned().collect();
        // deterministic reports
        keys.sort_by_cached_key(ToString::to_string);

        debug!(services = keys.len(), "Starting dependency graph validation");

        for key in keys {
            self.visit(&key)?;
        }

        debug!("Dependency graph validation passed");
        Ok(())
    }

    fn visit(&mut self, key: &ServiceKey) -> Result<(), KhazinError> {
        if self.validated.contains(key) {
            return Ok(());
        }

        if self.visiting.contains(key) {
            let start = self.path.iter().position(|k| k == key).unwrap_or(0);
            let mut chain = self.path[start..].to_vec();
            chain.push(key.clone());

            warn!(cycle = ?chain, "Eager dependency cycle");
            return Err(KhazinError::CircularDependency(CircularDependencyError {
                chain,
                depth_limit: None,
            }));
        }

        let Some(dependencies) = self.edges.get(key).cloned() else {
            return Err(self.missing(key));
        };

        self.visiting.insert(key.clone());
        self.path.push(key.clone());

        for dependency in &dependencies {
            self.visit(dependency)?;
        }

        self.path.pop();
        self.visiting.remove(key);
        self.validated.insert(key.clone());
        Ok(())
    }

    fn missing(&self, key: &ServiceKey) -> KhazinError {
        let labels: Vec<String> = self.edges.keys().map(ServiceKey::label).collect();
        let available: Vec<&str> = labels.iter().map(String::as_str).collect();

        let mut registered: Vec<ServiceKey> = self.edges.keys().cloned().collect();
        registered.sort_by_cached_key(ToString::to_string);
        registered.truncate(self.sample_limit);

        KhazinError::ServiceNotFound(ServiceNotFoundError {
            requested: key.clone(),
            required_by: self.path.last().cloned(),
            registered,
            registered_total: self.edges.len(),
            suggestions: suggest_similar(&key.label(), &available, 3)
                .iter()
                .map(|label| shorten_type_name(label))
                .collect(),
        })
    }
}
