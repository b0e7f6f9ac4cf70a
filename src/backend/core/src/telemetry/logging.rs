//! Structured logging for the authorization core.
//!
//! Cache hits and resolutions are logged at `debug`, invalidations at `info`,
//! provider timeouts at `warn` and provider failures at `error`. The default
//! filter keeps `crm_authz::cache` at `info` so per-lookup hit lines stay off
//! even when the global level is raised to `debug` for the embedding service.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Level for everything without a module override
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Overrides keyed by module path, e.g. `crm_authz::cache = "debug"`
    #[serde(default = "default_module_levels")]
    pub module_levels: HashMap<String, String>,

    /// Add file and line to each event
    #[serde(default)]
    pub include_location: bool,

    /// Emit an event when a span closes, with its busy/idle timings.
    /// Useful for timing `resolve_authorization` flights.
    #[serde(default)]
    pub span_timings: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            module_levels: default_module_levels(),
            include_location: false,
            span_timings: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_module_levels() -> HashMap<String, String> {
    HashMap::from([("crm_authz::cache".to_string(), "info".to_string())])
}

/// Build the level filter: the global level plus one directive per module.
pub fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(format!("{module}={level}").parse()?);
    }
    Ok(filter)
}

fn fmt_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(true);

    match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Build the subscriber without installing it.
pub fn build_subscriber(
    config: &LoggingConfig,
) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let filter = build_filter(config)?;
    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(config)))
}

/// Install the global tracing subscriber.
///
/// Fails if the filter is malformed or a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    build_subscriber(config)?.try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;

    #[test]
    fn test_defaults_keep_cache_at_info() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.module_levels["crm_authz::cache"], "info");
    }

    #[test]
    fn test_build_filter_rejects_bad_directive() {
        let mut config = LoggingConfig::default();
        config
            .module_levels
            .insert("crm_authz::rbac".to_string(), "debug".to_string());
        assert!(build_filter(&config).is_ok());

        config
            .module_levels
            .insert("crm_authz::rbac".to_string(), "verbose".to_string());
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_every_format_builds_and_logs() {
        for format in [LogFormat::Json, LogFormat::Pretty, LogFormat::Compact] {
            let config = LoggingConfig {
                format,
                include_location: true,
                span_timings: true,
                ..LoggingConfig::default()
            };
            let subscriber = build_subscriber(&config).unwrap();
            tracing::subscriber::with_default(subscriber, || {
                let span = tracing::info_span!("resolve_authorization", flight_id = 1);
                let _entered = span.enter();
                AuthzError::invalid_identity("user_id", "must not be empty").log();
                tracing::info!(removed = true, "Invalidated authorization cache entry");
            });
        }
    }

    #[test]
    fn test_log_format_deserialize() {
        let format: LogFormat = serde_json::from_str("\"compact\"").unwrap();
        assert_eq!(format, LogFormat::Compact);
    }
}
