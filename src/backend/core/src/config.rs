//! Configuration management.
//!
//! Values come from an optional file plus `CRM_AUTHZ__*` environment
//! variables, e.g. `CRM_AUTHZ__CACHE__RESOLVE_TIMEOUT=250ms`. Every field has
//! a default, so an empty environment yields a working configuration.

use serde::Deserialize;

use crate::cache::AuthorizationCacheConfig;
use crate::error::{AuthzError, Result};
use crate::rbac::access::DEFAULT_ADMIN_USER_ID;
use crate::telemetry::{self, LoggingConfig};

const ENV_PREFIX: &str = "CRM_AUTHZ";

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Access control configuration
    #[serde(default)]
    pub authz: AuthzConfig,

    /// Authorization cache configuration
    #[serde(default)]
    pub cache: AuthorizationCacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// User id that bypasses all permission checks
    #[serde(default = "default_admin_user_id")]
    pub admin_user_id: String,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            admin_user_id: default_admin_user_id(),
        }
    }
}

fn default_admin_user_id() -> String {
    DEFAULT_ADMIN_USER_ID.to_string()
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Install the global tracing subscriber described by `logging`.
    pub fn init_logging(&self) -> Result<()> {
        telemetry::init_logging(&self.logging)
            .map_err(|e| AuthzError::Configuration(format!("logging: {e}")))
    }
}
