//! Telemetry: structured logging for the authorization core.
//!
//! Metrics are emitted through the `metrics` facade at the call sites
//! (`authz_cache_*`, `authz_admin_bypass_total`, `authz_errors_total`); the
//! embedding service installs the recorder and exporter.
//!
//! # Example
//!
//! ```rust,no_run
//! use crm_authz::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! config.init_logging().expect("Failed to initialize logging");
//! ```

pub mod logging;

pub use logging::{build_filter, build_subscriber, init_logging, LogFormat, LoggingConfig};
