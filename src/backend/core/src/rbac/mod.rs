//! Role-Based Access Control (RBAC) for a multi-tenant CRM.
//!
//! This module provides:
//! - **Models**: typed ids, data scopes, role assignments and the effective
//!   authorization of a user in one organization
//! - **Provider**: the contract to the role service, plus an in-memory store
//! - **Resolver**: joins assignments with grants into an effective authorization
//! - **Access control**: permission checks, administrator bypass and data-scope
//!   tab visibility
//! - **Definitions**: the permission catalog shown on role-configuration screens
//!
//! # Usage
//!
//! ```rust,ignore
//! use crm_authz::rbac::{AccessControl, InMemoryRoleDataProvider, DataScope};
//!
//! let provider = InMemoryRoleDataProvider::new();
//! provider.define_role("sales", DataScope::OwnOnly, ["CUSTOMER_MANAGEMENT:READ"]);
//! provider.assign_role("alice", "org1", "sales");
//!
//! let cache = Arc::new(AuthorizationCache::new(Arc::new(provider)));
//! let access = AccessControl::new(cache);
//! let allowed = access
//!     .has_permission(&"alice".into(), &"org1".into(), &"CUSTOMER_MANAGEMENT:READ".into())
//!     .await?;
//! ```

pub mod access;
pub mod definition;
pub mod models;
pub mod provider;
pub mod resolver;

pub use access::{AccessControl, DEFAULT_ADMIN_USER_ID};
pub use definition::{PermissionCatalog, PermissionDefinition, PermissionDefinitionItem};
pub use models::{
    DataScope, EffectiveAuthorization, OrganizationId, PermissionId, RoleAssignment, RoleId,
    RolePermissionView, TabVisibility, UserId,
};
pub use provider::{InMemoryRoleDataProvider, RoleDataProvider};
pub use resolver::PermissionResolver;
