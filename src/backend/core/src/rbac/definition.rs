//! Permission definition catalog.
//!
//! Role-configuration screens render a tree of menu items, each listing the
//! permissions it controls. The tree is static per deployment and is loaded
//! from JSON; [`PermissionDefinitionItem::apply_grants`] projects a role's
//! granted permissions onto it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::models::PermissionId;
use crate::error::{AuthzError, Result};

/// A single permission shown in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub id: PermissionId,
    pub name: String,

    /// Whether the permission is granted in the current projection.
    #[serde(default)]
    pub enable: bool,

    /// Enterprise-edition permission.
    #[serde(default)]
    pub license: bool,
}

impl PermissionDefinition {
    pub fn new(id: impl Into<PermissionId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enable: false,
            license: false,
        }
    }

    pub fn licensed(mut self) -> Self {
        self.license = true;
        self
    }
}

/// A menu node grouping permissions and nested sub-menus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinitionItem {
    pub id: String,
    pub name: String,

    /// Enterprise-edition menu.
    #[serde(default)]
    pub license: bool,

    /// Whether every permission below this node is granted.
    #[serde(default)]
    pub enable: bool,

    #[serde(default)]
    pub permissions: Vec<PermissionDefinition>,

    #[serde(default)]
    pub children: Vec<PermissionDefinitionItem>,
}

impl PermissionDefinitionItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            license: false,
            enable: false,
            permissions: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_permission(mut self, permission: PermissionDefinition) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn with_child(mut self, child: PermissionDefinitionItem) -> Self {
        self.children.push(child);
        self
    }

    pub fn licensed(mut self) -> Self {
        self.license = true;
        self
    }

    /// Mark each permission enabled iff granted, then derive item flags.
    ///
    /// An item is enabled when it has at least one permission or child and
    /// all of them are enabled.
    pub fn apply_grants(&mut self, granted: &HashSet<PermissionId>) -> bool {
        for permission in &mut self.permissions {
            permission.enable = granted.contains(&permission.id);
        }
        // Every child must be visited, so no short-circuit here.
        let children_enabled = self
            .children
            .iter_mut()
            .fold(true, |all, child| child.apply_grants(granted) && all);

        let has_entries = !self.permissions.is_empty() || !self.children.is_empty();
        self.enable = has_entries
            && children_enabled
            && self.permissions.iter().all(|p| p.enable);
        self.enable
    }

    /// A copy with enterprise-only items and permissions removed.
    pub fn without_licensed(&self) -> Option<Self> {
        if self.license {
            return None;
        }
        Some(Self {
            id: self.id.clone(),
            name: self.name.clone(),
            license: false,
            enable: self.enable,
            permissions: self
                .permissions
                .iter()
                .filter(|p| !p.license)
                .cloned()
                .collect(),
            children: self
                .children
                .iter()
                .filter_map(PermissionDefinitionItem::without_licensed)
                .collect(),
        })
    }

    /// Every permission id below this node, depth first.
    pub fn permission_ids(&self) -> Vec<PermissionId> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<PermissionId>) {
        ids.extend(self.permissions.iter().map(|p| p.id.clone()));
        for child in &self.children {
            child.collect_ids(ids);
        }
    }
}

/// The full catalog: a forest of top-level menu items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCatalog {
    pub items: Vec<PermissionDefinitionItem>,
}

impl PermissionCatalog {
    /// Parse a catalog from its JSON array form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| AuthzError::Configuration(format!("invalid permission catalog: {e}")))
    }

    /// Project a granted set onto a copy of the catalog.
    pub fn with_grants(&self, granted: &HashSet<PermissionId>) -> Self {
        let mut catalog = self.clone();
        for item in &mut catalog.items {
            item.apply_grants(granted);
        }
        catalog
    }

    /// A copy without enterprise-only entries.
    pub fn without_licensed(&self) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter_map(PermissionDefinitionItem::without_licensed)
                .collect(),
        }
    }

    pub fn permission_ids(&self) -> Vec<PermissionId> {
        self.items.iter().flat_map(|item| item.permission_ids()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer_menu() -> PermissionDefinitionItem {
        PermissionDefinitionItem::new("CUSTOMER", "Customers")
            .with_permission(PermissionDefinition::new("CUSTOMER_MANAGEMENT:READ", "Read"))
            .with_permission(PermissionDefinition::new("CUSTOMER_MANAGEMENT:ADD", "Add"))
            .with_child(
                PermissionDefinitionItem::new("CUSTOMER_POOL", "Customer pool")
                    .with_permission(PermissionDefinition::new("CUSTOMER_POOL:READ", "Read")),
            )
            .with_child(
                PermissionDefinitionItem::new("CUSTOMER_EXPORT", "Export")
                    .licensed()
                    .with_permission(PermissionDefinition::new("CUSTOMER_MANAGEMENT:EXPORT", "Export")),
            )
    }

    fn granted(ids: &[&str]) -> HashSet<PermissionId> {
        ids.iter().map(|id| PermissionId::new(*id)).collect()
    }

    #[test]
    fn test_apply_grants_partial() {
        let mut menu = customer_menu();
        let enabled = menu.apply_grants(&granted(&["CUSTOMER_MANAGEMENT:READ", "CUSTOMER_POOL:READ"]));

        assert!(!enabled);
        assert!(menu.permissions[0].enable);
        assert!(!menu.permissions[1].enable);
        assert!(menu.children[0].enable);
        assert!(!menu.children[1].enable);
    }

    #[test]
    fn test_apply_grants_full() {
        let mut menu = customer_menu();
        let all: HashSet<_> = menu.permission_ids().into_iter().collect();
        assert!(menu.apply_grants(&all));

        // Revoking clears previously enabled flags.
        assert!(!menu.apply_grants(&HashSet::new()));
        assert!(menu.permissions.iter().all(|p| !p.enable));
    }

    #[test]
    fn test_empty_item_is_never_enabled() {
        let mut item = PermissionDefinitionItem::new("EMPTY", "Empty");
        assert!(!item.apply_grants(&granted(&["ANY"])));
    }

    #[test]
    fn test_without_licensed() {
        let mut menu = customer_menu();
        menu.permissions.push(PermissionDefinition::new("CUSTOMER_MANAGEMENT:MERGE", "Merge").licensed());

        let community = menu.without_licensed().unwrap();
        assert_eq!(community.permission_ids().len(), 3);
        assert_eq!(community.children.len(), 1);
        assert!(!community
            .permission_ids()
            .contains(&PermissionId::new("CUSTOMER_MANAGEMENT:EXPORT")));
        assert!(!community
            .permission_ids()
            .contains(&PermissionId::new("CUSTOMER_MANAGEMENT:MERGE")));

        assert!(PermissionDefinitionItem::new("X", "X").licensed().without_licensed().is_none());
    }

    #[test]
    fn test_permission_ids_depth_first() {
        let ids: Vec<String> = customer_menu()
            .permission_ids()
            .into_iter()
            .map(|p| p.0)
            .collect();
        assert_eq!(
            ids,
            vec![
                "CUSTOMER_MANAGEMENT:READ",
                "CUSTOMER_MANAGEMENT:ADD",
                "CUSTOMER_POOL:READ",
                "CUSTOMER_MANAGEMENT:EXPORT",
            ]
        );
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"[
            {
                "id": "OPPORTUNITY",
                "name": "Opportunities",
                "permissions": [
                    {"id": "OPPORTUNITY_MANAGEMENT:READ", "name": "Read"},
                    {"id": "OPPORTUNITY_MANAGEMENT:DELETE", "name": "Delete", "license": true}
                ]
            }
        ]"#;

        let catalog = PermissionCatalog::from_json(json).unwrap();
        assert_eq!(catalog.items.len(), 1);
        assert_eq!(catalog.permission_ids().len(), 2);
        assert_eq!(catalog.without_licensed().permission_ids().len(), 1);

        let projected = catalog.with_grants(&granted(&["OPPORTUNITY_MANAGEMENT:READ"]));
        assert!(projected.items[0].permissions[0].enable);
        assert!(!projected.items[0].enable);

        assert!(PermissionCatalog::from_json("{").is_err());
    }
}
