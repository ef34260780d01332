//! Circular dependency detection over the in-flight resolution stack.
//!
//! [`CircularDependencyDetector::enter`] pushes a key and hands back a
//! [`ResolutionGuard`]; dropping the guard pops it again, so the stack is
//! unwound on success, on error, and when an async resolve is cancelled.

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{CircularDependencyError, KhazinError, Result};
use crate::key::ServiceKey;

/// Tracks the keys currently being resolved.
#[derive(Debug)]
pub struct CircularDependencyDetector {
    stack: Mutex<Vec<ServiceKey>>,
    max_depth: usize,
}

impl CircularDependencyDetector {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
            max_depth,
        }
    }

    /// Pushes `key` onto the stack.
    ///
    /// # Errors
    /// [`KhazinError::CircularDependency`] when `key` is already in flight,
    /// or the stack already holds `max_depth` keys.
    pub fn enter(&self, key: &ServiceKey) -> Result<ResolutionGuard<'_>> {
        let mut stack = self.stack.lock();

        if stack.contains(key) {
            let mut chain = stack.clone();
            chain.push(key.clone());
            warn!(key = %key, depth = stack.len(), "Circular dependency detected");
            return Err(KhazinError::CircularDependency(CircularDependencyError {
                chain,
                depth_limit: None,
            }));
        }

        if stack.len() >= self.max_depth {
            let mut chain = stack.clone();
            chain.push(key.clone());
            warn!(key = %key, max_depth = self.max_depth, "Resolution depth limit reached");
            return Err(KhazinError::CircularDependency(CircularDependencyError {
                chain,
                depth_limit: Some(self.max_depth),
            }));
        }

        stack.push(key.clone());
        Ok(ResolutionGuard { detector: self })
    }

    /// Pops the top of the stack. No-op on an empty stack.
    pub fn exit(&self) {
        self.stack.lock().pop();
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    pub fn is_resolving(&self, key: &ServiceKey) -> bool {
        self.stack.lock().contains(key)
    }

    /// Snapshot of the stack, outermost first.
    pub fn chain(&self) -> Vec<ServiceKey> {
        self.stack.lock().clone()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Pops its entry from the resolution stack when dropped.
#[must_use = "dropping the guard immediately exits the resolution"]
pub struct ResolutionGuard<'a> {
    detector: &'a CircularDependencyDetector,
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        self.detector.exit();
    }
}
