//! Registration table: one [`Registration`] per live [`ServiceKey`].
//!
//! The registry maps keys to creation strategies plus their lifetime,
//! and keeps aliases (extra keys that resolve to an existing one).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{KhazinError, RegistrationError, Result};
use crate::key::ServiceKey;
use crate::lifetime::Lifetime;
use crate::strategy::CreationStrategy;

/// Binding of one key to a creation strategy and lifetime.
#[derive(Clone)]
pub struct Registration {
    pub key: ServiceKey,
    pub strategy: CreationStrategy,
    pub lifetime: Lifetime,
    /// Derived once from the strategy when the registration is built.
    pub is_async: bool,
    /// `true` when this registration replaced an earlier one.
    pub overridden: bool,
}

impl Registration {
    pub fn new(key: ServiceKey, strategy: CreationStrategy, lifetime: Lifetime) -> Self {
        let is_async = strategy.is_async();
        Self {
            key,
            strategy,
            lifetime,
            is_async,
            overridden: false,
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("kind", &self.strategy.kind())
            .field("is_async", &self.is_async)
            .field("overridden", &self.overridden)
            .finish()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    registrations: HashMap<ServiceKey, Arc<Registration>>,
    aliases: HashMap<ServiceKey, ServiceKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `registration`, returning the one it replaced.
    ///
    /// # Errors
    /// [`KhazinError::Registration`] if the key is taken and
    /// `allow_override` is false.
    pub fn register(
        &mut self,
        mut registration: Registration,
        allow_override: bool,
    ) -> Result<Option<Arc<Registration>>> {
        let key = registration.key.clone();

        if self.registrations.contains_key(&key) {
            if !allow_override {
                return Err(KhazinError::Registration(RegistrationError {
                    key,
                    reason: "already registered".to_string(),
                }));
            }
            registration.overridden = true;
        }

        // a real registration shadows an alias of the same name
        self.aliases.remove(&key);

        debug!(
            key = %key,
            lifetime = %registration.lifetime,
            is_async = registration.is_async,
            "Registered service"
        );
        Ok(self.registrations.insert(key, Arc::new(registration)))
    }

    /// Makes `alias` resolve to `target`. Returns `false` when `target`
    /// is not registered.
    pub fn register_alias(&mut self, alias: ServiceKey, target: &ServiceKey) -> bool {
        let target = self.canonical(target);
        if !self.registrations.contains_key(&target) {
            return false;
        }

        debug!(alias = %alias, target = %target, "Registered alias");
        self.aliases.insert(alias, target);
        true
    }

    /// Follows an alias, if `key` is one.
    pub fn canonical(&self, key: &ServiceKey) -> ServiceKey {
        match self.aliases.get(key) {
            Some(target) => {
                trace!(from = %key, to = %target, "Following alias");
                target.clone()
            }
            None => key.clone(),
        }
    }

    /// Looks up a registration by key, following aliases.
    pub fn get(&self, key: &ServiceKey) -> Option<Arc<Registration>> {
        self.registrations.get(&self.canonical(key)).cloned()
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.registrations.contains_key(&self.canonical(key))
    }

    /// Removes the registration `key` resolves to, along with every alias
    /// pointing at it.
    pub fn remove(&mut self, key: &ServiceKey) -> Option<Arc<Registration>> {
        let target = self.canonical(key);
        let removed = self.registrations.remove(&target)?;
        self.aliases.retain(|_, to| *to != target);
        debug!(key = %target, "Unregistered service");
        Some(removed)
    }

    /// Removes every registration matching `lifetime` (all when `None`).
    pub fn clear(&mut self, lifetime: Option<Lifetime>) -> Vec<Arc<Registration>> {
        let doomed: Vec<ServiceKey> = self
            .registrations
            .iter()
            .filter(|(_, reg)| lifetime.is_none_or(|l| reg.lifetime == l))
            .map(|(key, _)| key.clone())
            .collect();

        let removed: Vec<Arc<Registration>> = doomed
            .iter()
            .filter_map(|key| self.registrations.remove(key))
            .collect();
        self.aliases.retain(|_, to| self.registrations.contains_key(to));

        debug!(removed = removed.len(), lifetime = ?lifetime, "Cleared registrations");
        removed
    }

    /// All registrations, without aliases.
    pub fn snapshot(&self) -> HashMap<ServiceKey, Arc<Registration>> {
        self.registrations.clone()
    }

    pub fn registrations(&self) -> impl Iterator<Item = &Arc<Registration>> {
        self.registrations.values()
    }

    /// Up to `limit` registered keys, sorted by name.
    pub fn sample(&self, limit: usize) -> Vec<ServiceKey> {
        let mut keys: Vec<ServiceKey> = self.registrations.keys().cloned().collect();
        keys.sort_by_cached_key(ToString::to_string);
        keys.truncate(limit);
        keys
    }

    /// Full labels of every registered key and alias.
    pub fn labels(&self) -> Vec<String> {
        self.registrations
            .keys()
            .chain(self.aliases.keys())
            .map(ServiceKey::label)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
