//! Error handling for the authorization core.
//!
//! This module provides:
//! - A single error type covering identity validation, dependency failures and denials
//! - Stable machine-readable error codes with numeric values and categories
//! - Severity levels that drive log levels
//! - Error logging with tracing integration and a metrics counter
//!
//! A failed dependency is always an error, never an empty permission set.
//! Callers at the HTTP boundary must treat every `Err` from this crate as a
//! deny.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crm_authz::error::{AuthzError, Result};
//!
//! fn gate(allowed: bool) -> Result<()> {
//!     if !allowed {
//!         return Err(AuthzError::permission_denied("u-1", "org-1", "CUSTOMER_MANAGEMENT:READ"));
//!     }
//!     Ok(())
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Boxed source error accepted from dependencies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source error as stored, shareable between every caller of one resolution.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by the HTTP layer for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Identity Errors (1000-1099)
    InvalidIdentity,
    InvalidDataScope,

    // Authorization Errors (1100-1199)
    PermissionDenied,

    // Dependency Errors (2000-2099)
    DependencyUnavailable,
    DependencyTimeout,

    // Configuration Errors (5000-5099)
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::InvalidIdentity => 1000,
            Self::InvalidDataScope => 1001,

            Self::PermissionDenied => 1100,

            Self::DependencyUnavailable => 2000,
            Self::DependencyTimeout => 2001,

            Self::ConfigurationError => 5000,
        }
    }

    /// Get the stable string form used in logs and metric labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidIdentity => "INVALID_IDENTITY",
            Self::InvalidDataScope => "INVALID_DATA_SCOPE",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            Self::DependencyTimeout => "DEPENDENCY_TIMEOUT",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// Check if retrying the same call may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DependencyUnavailable | Self::DependencyTimeout)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "identity",
            1100..=1199 => "authorization",
            2000..=2099 => "dependency",
            5000..=5099 => "configuration",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad identifiers, denials)
    Low,
    /// Operational issues (timeouts)
    Medium,
    /// Backing store failures
    High,
    /// Misconfiguration that prevents startup
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::InvalidIdentity
            | ErrorCode::InvalidDataScope
            | ErrorCode::PermissionDenied => Self::Low,

            ErrorCode::DependencyTimeout => Self::Medium,

            ErrorCode::DependencyUnavailable => Self::High,

            ErrorCode::ConfigurationError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The error type for the authorization core.
///
/// Cloneable so that one failed resolution can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, Error)]
pub enum AuthzError {
    /// A user or organization identifier was empty or malformed.
    #[error("invalid {field}: {reason}")]
    InvalidIdentity {
        field: &'static str,
        reason: &'static str,
    },

    /// A data scope name did not match any known scope.
    #[error("unknown data scope: {0}")]
    InvalidDataScope(String),

    /// The user lacks the required permission.
    #[error("permission denied: user={user_id}, org={organization_id}, permission={permission}")]
    PermissionDenied {
        user_id: String,
        organization_id: String,
        permission: String,
    },

    /// The role data provider failed while resolving an authorization.
    #[error("role data provider unavailable during {operation}")]
    DependencyUnavailable {
        operation: &'static str,
        #[source]
        source: SharedError,
    },

    /// The role data provider did not answer within the configured timeout.
    #[error("role data provider timed out during {operation} after {timeout:?}")]
    DependencyTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AuthzError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an invalid identity error.
    pub fn invalid_identity(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidIdentity { field, reason }
    }

    /// Wrap a provider failure.
    pub fn dependency(operation: &'static str, source: impl Into<BoxError>) -> Self {
        let source: BoxError = source.into();
        Self::DependencyUnavailable {
            operation,
            source: Arc::from(source),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(
        user_id: impl Into<String>,
        organization_id: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self::PermissionDenied {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            permission: permission.into(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidIdentity { .. } => ErrorCode::InvalidIdentity,
            Self::InvalidDataScope(_) => ErrorCode::InvalidDataScope,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::DependencyUnavailable { .. } => ErrorCode::DependencyUnavailable,
            Self::DependencyTimeout { .. } => ErrorCode::DependencyTimeout,
            Self::Configuration(_) => ErrorCode::ConfigurationError,
        }
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code())
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Log the error at a level derived from its severity and count it.
    pub fn log(&self) {
        let code = self.code();
        match self.severity() {
            ErrorSeverity::Low => {
                debug!(error_code = %code, category = code.category(), "{}", self);
            }
            ErrorSeverity::Medium => {
                warn!(error_code = %code, category = code.category(), "{}", self);
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = code.category(),
                    source = ?std::error::Error::source(self),
                    "{}",
                    self
                );
            }
        }
        counter!("authz_errors_total", "code" => code.as_str()).increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<config::ConfigError> for AuthzError {
    fn from(error: config::ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_code_numeric_and_category() {
        assert_eq!(ErrorCode::InvalidIdentity.numeric_code(), 1000);
        assert_eq!(ErrorCode::InvalidIdentity.category(), "identity");
        assert_eq!(ErrorCode::PermissionDenied.category(), "authorization");
        assert_eq!(ErrorCode::DependencyTimeout.category(), "dependency");
        assert_eq!(ErrorCode::ConfigurationError.category(), "configuration");
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::DependencyUnavailable.is_retryable());
        assert!(ErrorCode::DependencyTimeout.is_retryable());
        assert!(!ErrorCode::InvalidIdentity.is_retryable());
        assert!(!ErrorCode::PermissionDenied.is_retryable());
    }

    #[test]
    fn test_dependency_error_keeps_source() {
        let err = AuthzError::dependency(
            "get_role_assignments",
            anyhow::anyhow!("connection refused"),
        );
        assert_eq!(err.code(), ErrorCode::DependencyUnavailable);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.is_retryable());
        let source = err.source().expect("source should be kept");
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn test_clone_shares_source() {
        let err = AuthzError::dependency("get_permissions", anyhow::anyhow!("reset"));
        let copy = err.clone();
        assert_eq!(copy.code(), ErrorCode::DependencyUnavailable);
        assert_eq!(copy.source().unwrap().to_string(), "reset");
        assert_eq!(copy.to_string(), err.to_string());
    }

    #[test]
    fn test_error_display() {
        let err = AuthzError::invalid_identity("user_id", "must not be empty");
        assert_eq!(err.to_string(), "invalid user_id: must not be empty");

        let err = AuthzError::permission_denied("u-1", "org-1", "OPPORTUNITY:READ");
        assert!(err.to_string().contains("OPPORTUNITY:READ"));
        assert_eq!(err.severity(), ErrorSeverity::Low);

        let err = AuthzError::DependencyTimeout {
            operation: "get_permissions",
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("get_permissions"));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::DependencyUnavailable).unwrap();
        assert_eq!(json, "\"DEPENDENCY_UNAVAILABLE\"");
        assert_eq!(ErrorCode::DependencyUnavailable.to_string(), "DEPENDENCY_UNAVAILABLE");
    }

    #[test]
    fn test_log_all_severities() {
        AuthzError::invalid_identity("organization_id", "must not be empty").log();
        AuthzError::DependencyTimeout {
            operation: "get_permissions",
            timeout: Duration::from_secs(1),
        }
        .log();
        AuthzError::dependency("get_permissions", anyhow::anyhow!("boom")).log();
        AuthzError::Configuration("bad".to_string()).log();
    }
}
