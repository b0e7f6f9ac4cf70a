#![allow(clippy::result_large_err)]
//! # CRM Authz
//!
//! Authorization core for a multi-tenant CRM.
//!
//! ## Architecture
//!
//! - **Provider**: `RoleDataProvider` supplies role assignments and role grants
//! - **Resolver**: joins them into an `EffectiveAuthorization` per (user, organization)
//! - **Cache**: single-flight, explicitly invalidated authorization cache
//! - **Access Control**: permission checks, administrator bypass and data-scope tab visibility
//! - **Telemetry**: structured logging and `metrics` counters
//!
//! Every `Err` from this crate means the request must be denied.

pub mod cache;
pub mod config;
pub mod error;
pub mod rbac;
pub mod telemetry;

pub use error::{AuthzError, ErrorCode, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{
        AuthorizationCache, AuthorizationCacheConfig, AuthorizationCacheConfigBuilder, CacheKey,
        CacheStats,
    };
    pub use crate::config::{AuthzConfig, Config};
    pub use crate::error::{AuthzError, ErrorCode, ErrorSeverity, Result};
    pub use crate::rbac::{
        AccessControl, DataScope, EffectiveAuthorization, InMemoryRoleDataProvider,
        OrganizationId, PermissionCatalog, PermissionDefinition, PermissionDefinitionItem,
        PermissionId, PermissionResolver, RoleAssignment, RoleDataProvider, RoleId,
        RolePermissionView, TabVisibility, UserId,
    };
    pub use crate::telemetry::{init_logging, LogFormat, LoggingConfig};
}
