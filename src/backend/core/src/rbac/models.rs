//! RBAC data models: identifiers, data scopes, role assignments and the
//! effective authorization view cached per (user, organization).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthzError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Reject identifiers that cannot be used as a cache key component.
///
/// Control characters are reserved for key separators.
fn validate_identifier(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AuthzError::invalid_identity(field, "must not be empty"));
    }
    if value.chars().any(char::is_control) {
        return Err(AuthzError::invalid_identity(
            field,
            "must not contain control characters",
        ));
    }
    Ok(())
}

/// Strongly-typed user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that this id is non-empty and usable as a key component.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("user_id", &self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed organization (tenant) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that this id is non-empty and usable as a key component.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("organization_id", &self.0)
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrganizationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrganizationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed role identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed permission identifier, e.g. `CUSTOMER_MANAGEMENT:READ`.
///
/// Permission ids are opaque: matching is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionId(pub String);

impl PermissionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PermissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PermissionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Data Scope
// ═══════════════════════════════════════════════════════════════════════════════

/// The breadth of records a role may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataScope {
    /// Every record in the organization.
    All,
    /// The user's department and its sub-departments.
    DeptAndChild,
    /// An explicitly configured set of departments.
    DeptCustom,
    /// Only records owned by the user.
    #[serde(rename = "SELF")]
    OwnOnly,
}

impl DataScope {
    /// Canonical name as stored by the role service.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::DeptAndChild => "DEPT_AND_CHILD",
            Self::DeptCustom => "DEPT_CUSTOM",
            Self::OwnOnly => "SELF",
        }
    }

    /// Whether a role with this scope unlocks the "all" tab.
    pub const fn shows_all_tab(&self) -> bool {
        matches!(self, Self::All | Self::DeptCustom)
    }

    /// Whether a role with this scope unlocks the "department" tab.
    pub const fn shows_dept_tab(&self) -> bool {
        matches!(self, Self::All | Self::DeptCustom | Self::DeptAndChild)
    }
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataScope {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ALL" => Ok(Self::All),
            "DEPT_AND_CHILD" => Ok(Self::DeptAndChild),
            "DEPT_CUSTOM" => Ok(Self::DeptCustom),
            "SELF" => Ok(Self::OwnOnly),
            other => Err(AuthzError::InvalidDataScope(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Assignment
// ═══════════════════════════════════════════════════════════════════════════════

/// A role held by a user in one organization, as reported by the role service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// The assigned role.
    pub role_id: RoleId,
    /// Data visibility granted by the role.
    pub data_scope: DataScope,
}

impl RoleAssignment {
    pub fn new(role_id: impl Into<RoleId>, data_scope: DataScope) -> Self {
        Self {
            role_id: role_id.into(),
            data_scope,
        }
    }
}

/// A role assignment joined with the permissions its role grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissionView {
    /// The assigned role.
    pub role_id: RoleId,
    /// Data visibility granted by the role.
    pub data_scope: DataScope,
    /// Permissions granted by the role.
    pub permission_ids: HashSet<PermissionId>,
}

impl RolePermissionView {
    pub fn new(
        role_id: impl Into<RoleId>,
        data_scope: DataScope,
        permission_ids: impl IntoIterator<Item = PermissionId>,
    ) -> Self {
        Self {
            role_id: role_id.into(),
            data_scope,
            permission_ids: permission_ids.into_iter().collect(),
        }
    }

    /// Check if this role grants a specific permission.
    pub fn grants(&self, permission: &PermissionId) -> bool {
        self.permission_ids.contains(permission)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Effective Authorization
// ═══════════════════════════════════════════════════════════════════════════════

/// Merged view of every role a user holds in one organization.
///
/// Role order follows the role service; role ids are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAuthorization {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role_permissions: Vec<RolePermissionView>,
}

impl EffectiveAuthorization {
    /// An authorization with no roles.
    pub fn empty(user_id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            user_id,
            organization_id,
            role_permissions: Vec::new(),
        }
    }

    /// True when the user holds no roles in the organization.
    pub fn is_empty(&self) -> bool {
        self.role_permissions.is_empty()
    }

    /// Union of the permission sets of all roles.
    pub fn permission_ids(&self) -> HashSet<PermissionId> {
        self.role_permissions
            .iter()
            .flat_map(|role| role.permission_ids.iter().cloned())
            .collect()
    }

    /// Check if any role grants a specific permission.
    pub fn grants(&self, permission: &PermissionId) -> bool {
        self.role_permissions.iter().any(|role| role.grants(permission))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tab Visibility
// ═══════════════════════════════════════════════════════════════════════════════

/// Which data-scope tabs a list or detail view should offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabVisibility {
    /// The organization-wide tab.
    pub all_tab: bool,
    /// The department tab.
    pub dept_tab: bool,
}

impl TabVisibility {
    /// Both tabs visible.
    pub const fn full() -> Self {
        Self {
            all_tab: true,
            dept_tab: true,
        }
    }

    /// Widen visibility with the scope of one granting role. Never narrows.
    pub fn widen(&mut self, scope: DataScope) {
        self.all_tab |= scope.shows_all_tab();
        self.dept_tab |= scope.shows_dept_tab();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(UserId::new("u-1").validate().is_ok());
        assert!(OrganizationId::new("100001").validate().is_ok());

        let err = UserId::new("").validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid user_id: must not be empty");

        let err = OrganizationId::new("   ").validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid organization_id: must not be empty");

        assert!(UserId::new("u\u{1f}1").validate().is_err());
        assert!(OrganizationId::new("org\n1").validate().is_err());
    }

    #[test]
    fn test_data_scope_tabs() {
        assert!(DataScope::All.shows_all_tab());
        assert!(DataScope::DeptCustom.shows_all_tab());
        assert!(!DataScope::DeptAndChild.shows_all_tab());
        assert!(!DataScope::OwnOnly.shows_all_tab());

        assert!(DataScope::All.shows_dept_tab());
        assert!(DataScope::DeptCustom.shows_dept_tab());
        assert!(DataScope::DeptAndChild.shows_dept_tab());
        assert!(!DataScope::OwnOnly.shows_dept_tab());
    }

    #[test]
    fn test_data_scope_names() {
        assert_eq!("SELF".parse::<DataScope>().unwrap(), DataScope::OwnOnly);
        assert_eq!("DEPT_AND_CHILD".parse::<DataScope>().unwrap(), DataScope::DeptAndChild);
        assert!("dept".parse::<DataScope>().is_err());

        let json = serde_json::to_string(&DataScope::OwnOnly).unwrap();
        assert_eq!(json, "\"SELF\"");
        let scope: DataScope = serde_json::from_str("\"DEPT_CUSTOM\"").unwrap();
        assert_eq!(scope, DataScope::DeptCustom);
    }

    #[test]
    fn test_effective_authorization_union() {
        let auth = EffectiveAuthorization {
            user_id: UserId::new("u-1"),
            organization_id: OrganizationId::new("org-1"),
            role_permissions: vec![
                RolePermissionView::new("sales", DataScope::OwnOnly, ["A".into(), "B".into()]),
                RolePermissionView::new("manager", DataScope::All, ["B".into(), "C".into()]),
            ],
        };

        let ids = auth.permission_ids();
        assert_eq!(ids.len(), 3);
        assert!(auth.grants(&PermissionId::new("C")));
        assert!(!auth.grants(&PermissionId::new("D")));
        assert!(!auth.is_empty());
    }

    #[test]
    fn test_tab_visibility_widen_is_monotonic() {
        let mut tabs = TabVisibility::default();
        tabs.widen(DataScope::All);
        tabs.widen(DataScope::OwnOnly);
        assert_eq!(tabs, TabVisibility::full());
    }
}
