//! Aggregation of role assignments and role grants into an effective
//! authorization.
//!
//! The resolver is pure: identical inputs always produce identical output, and
//! it never performs I/O. The cache relies on this to store resolutions.

use std::collections::{HashMap, HashSet};

use super::models::{
    EffectiveAuthorization, OrganizationId, PermissionId, RoleAssignment, RoleId,
    RolePermissionView, UserId,
};

/// Joins role assignments with the permissions granted to each role.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionResolver;

impl PermissionResolver {
    /// Build the effective authorization for one (user, organization) pair.
    ///
    /// Roles missing from `grants` get an empty permission set. Assignment
    /// order is preserved and a repeated role id keeps its first occurrence.
    pub fn resolve(
        user_id: UserId,
        organization_id: OrganizationId,
        assignments: Vec<RoleAssignment>,
        grants: &HashMap<RoleId, HashSet<PermissionId>>,
    ) -> EffectiveAuthorization {
        let mut seen = HashSet::with_capacity(assignments.len());
        let role_permissions = assignments
            .into_iter()
            .filter(|assignment| seen.insert(assignment.role_id.clone()))
            .map(|assignment| {
                let permission_ids = grants
                    .get(&assignment.role_id)
                    .cloned()
                    .unwrap_or_default();
                RolePermissionView {
                    role_id: assignment.role_id,
                    data_scope: assignment.data_scope,
                    permission_ids,
                }
            })
            .collect();

        EffectiveAuthorization {
            user_id,
            organization_id,
            role_permissions,
        }
    }

    /// Collapse the role service's list-shaped grants into permission sets.
    pub fn group_grants(
        grants: HashMap<RoleId, Vec<PermissionId>>,
    ) -> HashMap<RoleId, HashSet<PermissionId>> {
        grants
            .into_iter()
            .map(|(role_id, permissions)| (role_id, permissions.into_iter().collect()))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
