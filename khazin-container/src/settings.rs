//! Container settings.
//!
//! Loadable from any serde format; missing fields take their defaults.
//!
//! ```rust
//! use khazin_container::settings::ContainerSettings;
//!
//! let settings = ContainerSettings::default();
//! assert_eq!(settings.max_depth, 1000);
//! assert!(!settings.allow_override);
//! ```

use serde::Deserialize;

use crate::error::{KhazinError, Result};

pub const DEFAULT_MAX_DEPTH: usize = 1000;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Resolution stack depth at which resolution is refused.
    pub max_depth: usize,
    /// Allow re-registering a key without an explicit override flag.
    pub allow_override: bool,
    /// Hint for registration front-ends: register unknown types on demand.
    pub auto_wiring: bool,
    /// Hint for registration front-ends: refuse implicit registrations.
    pub strict_mode: bool,
    /// How many registered keys a "not found" error lists.
    pub suggestion_limit: usize,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            allow_override: false,
            auto_wiring: false,
            strict_mode: false,
            suggestion_limit: DEFAULT_SUGGESTION_LIMIT,
        }
    }
}

impl ContainerSettings {
    /// # Errors
    /// [`KhazinError::InvalidConfiguration`] for `auto_wiring` together
    /// with `strict_mode`, or a zero `max_depth`.
    pub fn validate(&self) -> Result<()> {
        if self.auto_wiring && self.strict_mode {
            return Err(KhazinError::InvalidConfiguration {
                reason: "auto_wiring and strict_mode are mutually exclusive".to_string(),
            });
        }
        if self.max_depth == 0 {
            return Err(KhazinError::InvalidConfiguration {
                reason: "max_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
