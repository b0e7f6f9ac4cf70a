//! The role data contract consumed by the authorization cache, and an
//! in-memory implementation of it.
//!
//! Role storage is owned by an external service. The cache only needs two
//! questions answered: which roles a user holds in an organization, and which
//! permissions those roles grant.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::models::{DataScope, OrganizationId, PermissionId, RoleAssignment, RoleId, UserId};

// ═══════════════════════════════════════════════════════════════════════════════
// Contract
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of role assignments and role grants.
#[async_trait]
pub trait RoleDataProvider: Send + Sync {
    /// Roles held by a user in an organization, in the provider's order.
    ///
    /// A user without roles yields an empty list, not an error.
    async fn get_role_assignments(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> anyhow::Result<Vec<RoleAssignment>>;

    /// Permissions granted to each of the given roles.
    ///
    /// Roles absent from the returned map grant nothing.
    async fn get_permissions(
        &self,
        role_ids: &[RoleId],
    ) -> anyhow::Result<HashMap<RoleId, Vec<PermissionId>>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Provider
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct StoredRole {
    data_scope: DataScope,
    permissions: Vec<PermissionId>,
}

/// Thread-safe role store backed by `DashMap`.
///
/// Mutations here do not invalidate any cache; callers pair them with
/// `AccessControl::invalidate_authorization` the same way the real role
/// service does.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoleDataProvider {
    /// Roles indexed by role id.
    roles: Arc<DashMap<RoleId, StoredRole>>,

    /// Assignments keyed by (user, organization), in assignment order.
    assignments: Arc<DashMap<(UserId, OrganizationId), Vec<RoleId>>>,
}

impl InMemoryRoleDataProvider {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a role.
    pub fn define_role<I, P>(&self, role_id: impl Into<RoleId>, data_scope: DataScope, permissions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionId>,
    {
        let role_id = role_id.into();
        debug!(role_id = %role_id, data_scope = %data_scope, "Defining role");
        self.roles.insert(
            role_id,
            StoredRole {
                data_scope,
                permissions: permissions.into_iter().map(Into::into).collect(),
            },
        );
    }

    /// Replace the permissions of an existing role. Returns `false` if the role is unknown.
    pub fn set_role_permissions<I, P>(&self, role_id: &RoleId, permissions: I) -> bool
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionId>,
    {
        match self.roles.get_mut(role_id) {
            Some(mut role) => {
                role.permissions = permissions.into_iter().map(Into::into).collect();
                true
            }
            None => false,
        }
    }

    /// Remove a role and every assignment of it.
    pub fn remove_role(&self, role_id: &RoleId) -> bool {
        let removed = self.roles.remove(role_id).is_some();
        if removed {
            for mut entry in self.assignments.iter_mut() {
                entry.value_mut().retain(|r| r != role_id);
            }
        }
        removed
    }

    /// Assign a role to a user within an organization. Re-assigning is a no-op.
    pub fn assign_role(
        &self,
        user_id: impl Into<UserId>,
        organization_id: impl Into<OrganizationId>,
        role_id: impl Into<RoleId>,
    ) {
        let role_id = role_id.into();
        let mut roles = self
            .assignments
            .entry((user_id.into(), organization_id.into()))
            .or_default();
        if !roles.contains(&role_id) {
            roles.push(role_id);
        }
    }

    /// Remove a user's assignment of a role in an organization.
    pub fn unassign_role(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role_id: &RoleId,
    ) -> bool {
        let key = (user_id.clone(), organization_id.clone());
        match self.assignments.get_mut(&key) {
            Some(mut roles) => {
                let before = roles.len();
                roles.retain(|r| r != role_id);
                roles.len() != before
            }
            None => false,
        }
    }
}

#[async_trait]
impl RoleDataProvider for InMemoryRoleDataProvider {
    async fn get_role_assignments(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> anyhow::Result<Vec<RoleAssignment>> {
        let key = (user_id.clone(), organization_id.clone());
        let role_ids = self
            .assignments
            .get(&key)
            .map(|r| r.clone())
            .unwrap_or_default();

        Ok(role_ids
            .into_iter()
            .filter_map(|role_id| {
                let data_scope = self.roles.get(&role_id)?.data_scope;
                Some(RoleAssignment { role_id, data_scope })
            })
            .collect())
    }

    async fn get_permissions(
        &self,
        role_ids: &[RoleId],
    ) -> anyhow::Result<HashMap<RoleId, Vec<PermissionId>>> {
        Ok(role_ids
            .iter()
            .filter_map(|role_id| {
                self.roles
                    .get(role_id)
                    .map(|role| (role_id.clone(), role.permissions.clone()))
            })
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
