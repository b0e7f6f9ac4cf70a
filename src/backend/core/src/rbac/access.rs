//! Permission checks and data-scope tab visibility.
//!
//! `AccessControl` is what request handlers call. It answers from the
//! [`AuthorizationCache`] and lets the reserved administrator through without
//! touching the cache at all.

use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::models::{OrganizationId, PermissionId, RolePermissionView, TabVisibility, UserId};
use super::provider::RoleDataProvider;
use crate::cache::AuthorizationCache;
use crate::config::Config;
use crate::error::{AuthzError, Result};

/// User id that bypasses every permission check unless configured otherwise.
pub const DEFAULT_ADMIN_USER_ID: &str = "admin";

/// Authorization entry point for request handlers.
#[derive(Debug, Clone)]
pub struct AccessControl {
    cache: Arc<AuthorizationCache>,
    admin_user_id: UserId,
}

impl AccessControl {
    /// Create access control over a cache, with the default administrator id.
    pub fn new(cache: Arc<AuthorizationCache>) -> Self {
        Self {
            cache,
            admin_user_id: UserId::new(DEFAULT_ADMIN_USER_ID),
        }
    }

    /// Create access control with a custom administrator id.
    pub fn with_admin(cache: Arc<AuthorizationCache>, admin_user_id: impl Into<UserId>) -> Self {
        Self {
            cache,
            admin_user_id: admin_user_id.into(),
        }
    }

    /// Build the cache and access control from loaded configuration.
    pub fn from_config(provider: Arc<dyn RoleDataProvider>, config: &Config) -> Result<Self> {
        let admin_user_id = UserId::new(config.authz.admin_user_id.clone());
        admin_user_id
            .validate()
            .map_err(|e| AuthzError::Configuration(format!("authz.admin_user_id: {e}")))?;

        let cache = AuthorizationCache::with_config(provider, config.cache.clone());
        Ok(Self::with_admin(Arc::new(cache), admin_user_id))
    }

    pub fn cache(&self) -> &Arc<AuthorizationCache> {
        &self.cache
    }

    pub fn admin_user_id(&self) -> &UserId {
        &self.admin_user_id
    }

    /// Check whether `user_id` is the reserved administrator.
    pub fn is_admin(&self, user_id: &UserId) -> bool {
        *user_id == self.admin_user_id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission checks
    // ─────────────────────────────────────────────────────────────────────────

    /// Check if a user holds a permission in an organization.
    ///
    /// Provider failures are returned as errors, never as `false`.
    #[instrument(skip_all, fields(user_id = %user_id, organization_id = %organization_id, permission = %permission))]
    pub async fn has_permission(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permission: &PermissionId,
    ) -> Result<bool> {
        validate(user_id, organization_id)?;
        if self.bypass(user_id) {
            return Ok(true);
        }

        let authorization = self
            .cache
            .get_effective_authorization(user_id, organization_id)
            .await?;
        let allowed = authorization.grants(permission);
        debug!(allowed, "Permission check");
        Ok(allowed)
    }

    /// Like [`has_permission`](Self::has_permission), but a deny is an
    /// `Err(PermissionDenied)`.
    pub async fn require_permission(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permission: &PermissionId,
    ) -> Result<()> {
        if self.has_permission(user_id, organization_id, permission).await? {
            return Ok(());
        }
        let err = AuthzError::permission_denied(
            user_id.as_str(),
            organization_id.as_str(),
            permission.as_str(),
        );
        err.log();
        Err(err)
    }

    /// True if the user holds at least one of `permissions`. An empty list is a deny.
    #[instrument(skip_all, fields(user_id = %user_id, organization_id = %organization_id, count = permissions.len()))]
    pub async fn has_any_permission(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permissions: &[PermissionId],
    ) -> Result<bool> {
        validate(user_id, organization_id)?;
        if self.bypass(user_id) {
            return Ok(true);
        }

        let authorization = self
            .cache
            .get_effective_authorization(user_id, organization_id)
            .await?;
        Ok(permissions.iter().any(|p| authorization.grants(p)))
    }

    /// True if the user holds every one of `permissions`. An empty list is an allow.
    #[instrument(skip_all, fields(user_id = %user_id, organization_id = %organization_id, count = permissions.len()))]
    pub async fn has_all_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permissions: &[PermissionId],
    ) -> Result<bool> {
        validate(user_id, organization_id)?;
        if self.bypass(user_id) {
            return Ok(true);
        }

        let authorization = self
            .cache
            .get_effective_authorization(user_id, organization_id)
            .await?;
        Ok(permissions.iter().all(|p| authorization.grants(p)))
    }

    /// Union of permissions granted by the user's roles.
    ///
    /// The administrator bypass does not apply: this reports actual grants.
    pub async fn permission_ids(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<HashSet<PermissionId>> {
        let authorization = self
            .cache
            .get_effective_authorization(user_id, organization_id)
            .await?;
        Ok(authorization.permission_ids())
    }

    /// The user's roles with their scopes and grants, in role service order.
    pub async fn role_permissions(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Vec<RolePermissionView>> {
        let authorization = self
            .cache
            .get_effective_authorization(user_id, organization_id)
            .await?;
        Ok(authorization.role_permissions.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tab visibility
    // ─────────────────────────────────────────────────────────────────────────

    /// Decide which data-scope tabs to show for `permission`, given the
    /// user's role permissions.
    ///
    /// Only roles that grant `permission` contribute. Flags are widened, never
    /// narrowed, so role order does not matter.
    pub fn tab_visibility(
        &self,
        user_id: &UserId,
        permission: &PermissionId,
        role_permissions: &[RolePermissionView],
    ) -> Result<TabVisibility> {
        user_id.validate()?;
        if self.bypass(user_id) {
            return Ok(TabVisibility::full());
        }

        let mut tabs = TabVisibility::default();
        for role in role_permissions.iter().filter(|role| role.grants(permission)) {
            tabs.widen(role.data_scope);
            if tabs == TabVisibility::full() {
                break;
            }
        }
        Ok(tabs)
    }

    /// [`tab_visibility`](Self::tab_visibility) over the cached role permissions.
    #[instrument(skip_all, fields(user_id = %user_id, organization_id = %organization_id, permission = %permission))]
    pub async fn tab_visibility_for(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        permission: &PermissionId,
    ) -> Result<TabVisibility> {
        validate(user_id, organization_id)?;
        if self.bypass(user_id) {
            return Ok(TabVisibility::full());
        }

        let authorization = self
            .cache
            .get_effective_authorization(user_id, organization_id)
            .await?;
        let tabs = self.tab_visibility(user_id, permission, &authorization.role_permissions)?;
        debug!(all_tab = tabs.all_tab, dept_tab = tabs.dept_tab, "Tab visibility");
        Ok(tabs)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Invalidation
    // ─────────────────────────────────────────────────────────────────────────

    /// Drop the cached authorization of one user in one organization.
    ///
    /// Call after any change to the user's roles or their grants.
    pub fn invalidate_authorization(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<bool> {
        self.cache.invalidate(user_id, organization_id)
    }

    /// Drop every cached authorization of an organization.
    pub fn invalidate_organization(&self, organization_id: &OrganizationId) -> Result<usize> {
        self.cache.invalidate_organization(organization_id)
    }

    fn bypass(&self, user_id: &UserId) -> bool {
        if !self.is_admin(user_id) {
            return false;
        }
        counter!("authz_admin_bypass_total").increment(1);
        debug!("Administrator bypass");
        true
    }
}

fn validate(user_id: &UserId, organization_id: &OrganizationId) -> Result<()> {
    user_id.validate()?;
    organization_id.validate()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::rbac::models::DataScope;
    use crate::rbac::provider::InMemoryRoleDataProvider;

    const READ: &str = "CUSTOMER_MANAGEMENT:READ";
    const DELETE: &str = "CUSTOMER_MANAGEMENT:DELETE";

    fn setup() -> (InMemoryRoleDataProvider, AccessControl) {
        let provider = InMemoryRoleDataProvider::new();
        provider.define_role("sales", DataScope::OwnOnly, [READ]);
        provider.define_role("lead", DataScope::DeptAndChild, [READ, DELETE]);
        provider.assign_role("alice", "org1", "sales");

        let cache = AuthorizationCache::new(Arc::new(provider.clone()));
        (provider, AccessControl::new(Arc::new(cache)))
    }

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn org1() -> OrganizationId {
        OrganizationId::new("org1")
    }

    fn perm(id: &str) -> PermissionId {
        PermissionId::new(id)
    }

    #[tokio::test]
    async fn test_has_permission() {
        let (_, access) = setup();
        assert!(access.has_permission(&alice(), &org1(), &perm(READ)).await.unwrap());
        assert!(!access.has_permission(&alice(), &org1(), &perm(DELETE)).await.unwrap());
        assert!(!access
            .has_permission(&alice(), &OrganizationId::new("org2"), &perm(READ))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_admin_bypass_skips_cache() {
        let (_, access) = setup();
        let admin = UserId::new(DEFAULT_ADMIN_USER_ID);

        assert!(access.has_permission(&admin, &org1(), &perm("ANYTHING")).await.unwrap());
        assert!(access.has_all_permissions(&admin, &org1(), &[perm("X"), perm("Y")]).await.unwrap());
        assert_eq!(
            access.tab_visibility_for(&admin, &org1(), &perm(READ)).await.unwrap(),
            TabVisibility::full()
        );
        assert!(access.cache().is_empty());
        assert_eq!(access.cache().stats().resolutions, 0);
    }

    #[tokio::test]
    async fn test_admin_still_requires_valid_organization() {
        let (_, access) = setup();
        let err = access
            .has_permission(&UserId::new("admin"), &OrganizationId::new(""), &perm(READ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidIdentity);
    }

    #[tokio::test]
    async fn test_custom_admin_id() {
        let provider = InMemoryRoleDataProvider::new();
        let cache = Arc::new(AuthorizationCache::new(Arc::new(provider)));
        let access = AccessControl::with_admin(cache, "root");

        assert!(access.is_admin(&UserId::new("root")));
        assert!(!access.is_admin(&UserId::new("admin")));
        assert!(!access.has_permission(&UserId::new("admin"), &org1(), &perm(READ)).await.unwrap());
    }

    #[tokio::test]
    async fn test_require_permission() {
        let (_, access) = setup();
        access.require_permission(&alice(), &org1(), &perm(READ)).await.unwrap();

        let err = access
            .require_permission(&alice(), &org1(), &perm(DELETE))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_any_and_all() {
        let (_, access) = setup();
        let both = [perm(READ), perm(DELETE)];

        assert!(access.has_any_permission(&alice(), &org1(), &both).await.unwrap());
        assert!(!access.has_all_permissions(&alice(), &org1(), &both).await.unwrap());
        assert!(!access.has_any_permission(&alice(), &org1(), &[]).await.unwrap());
        assert!(access.has_all_permissions(&alice(), &org1(), &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_role_change_visible_after_invalidation() {
        let (provider, access) = setup();
        assert!(!access.has_permission(&alice(), &org1(), &perm(DELETE)).await.unwrap());

        provider.assign_role("alice", "org1", "lead");
        // Still cached until invalidated.
        assert!(!access.has_permission(&alice(), &org1(), &perm(DELETE)).await.unwrap());

        assert!(access.invalidate_authorization(&alice(), &org1()).unwrap());
        assert!(access.has_permission(&alice(), &org1(), &perm(DELETE)).await.unwrap());
    }

    #[tokio::test]
    async fn test_permission_ids_and_role_permissions() {
        let (provider, access) = setup();
        provider.assign_role("alice", "org1", "lead");

        let ids = access.permission_ids(&alice(), &org1()).await.unwrap();
        assert_eq!(ids, [perm(READ), perm(DELETE)].into_iter().collect());

        let roles = access.role_permissions(&alice(), &org1()).await.unwrap();
        let order: Vec<&str> = roles.iter().map(|r| r.role_id.as_str()).collect();
        assert_eq!(order, vec!["sales", "lead"]);

        // Real grants only: the administrator holds no roles here.
        let admin_ids = access
            .permission_ids(&UserId::new("admin"), &org1())
            .await
            .unwrap();
        assert!(admin_ids.is_empty());
    }

    #[test]
    fn test_tab_visibility_rules() {
        let (_, access) = setup();
        let p = perm(READ);
        let roles = vec![
            RolePermissionView::new("own", DataScope::OwnOnly, [perm(READ)]),
            RolePermissionView::new("dept", DataScope::DeptAndChild, [perm(READ)]),
            RolePermissionView::new("all-other", DataScope::All, [perm(DELETE)]),
        ];

        let tabs = access.tab_visibility(&alice(), &p, &roles).unwrap();
        assert_eq!(tabs, TabVisibility { all_tab: false, dept_tab: true });

        let custom = vec![RolePermissionView::new("custom", DataScope::DeptCustom, [perm(READ)])];
        assert_eq!(access.tab_visibility(&alice(), &p, &custom).unwrap(), TabVisibility::full());

        assert_eq!(access.tab_visibility(&alice(), &p, &[]).unwrap(), TabVisibility::default());
        assert_eq!(
            access.tab_visibility(&UserId::new("admin"), &p, &[]).unwrap(),
            TabVisibility::full()
        );
        assert!(access.tab_visibility(&UserId::new(""), &p, &roles).is_err());
    }

    #[tokio::test]
    async fn test_tab_visibility_for_uses_cache() {
        let (provider, access) = setup();
        provider.assign_role("alice", "org1", "lead");

        let tabs = access.tab_visibility_for(&alice(), &org1(), &perm(DELETE)).await.unwrap();
        assert_eq!(tabs, TabVisibility { all_tab: false, dept_tab: true });
        assert!(access.cache().contains(&alice(), &org1()));
    }

    #[test]
    fn test_from_config_rejects_blank_admin() {
        let mut config = Config::default();
        config.authz.admin_user_id = " ".to_string();
        let provider: Arc<dyn RoleDataProvider> = Arc::new(InMemoryRoleDataProvider::new());

        let err = AccessControl::from_config(provider.clone(), &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);

        config.authz.admin_user_id = "root".to_string();
        let access = AccessControl::from_config(provider, &config).unwrap();
        assert_eq!(access.admin_user_id().as_str(), "root");
    }
}
