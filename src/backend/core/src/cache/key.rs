//! Composite cache keys for per-tenant authorization entries.
//!
//! A key is `user_id`, the ASCII unit separator (U+001F), then
//! `organization_id`. Identifier validation rejects control characters, so the
//! separator can never appear inside either part and two distinct pairs can
//! never produce the same key.

use std::fmt;

use crate::error::Result;
use crate::rbac::models::{OrganizationId, UserId};

/// Separator between the user and organization parts of a key.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Cache key for one (user, organization) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key after validating both identifiers.
    pub fn new(user_id: &UserId, organization_id: &OrganizationId) -> Result<Self> {
        user_id.validate()?;
        organization_id.validate()?;
        Ok(Self::compose(user_id, organization_id))
    }

    fn compose(user_id: &UserId, organization_id: &OrganizationId) -> Self {
        let mut key = String::with_capacity(user_id.as_str().len() + organization_id.as_str().len() + 1);
        key.push_str(user_id.as_str());
        key.push(KEY_SEPARATOR);
        key.push_str(organization_id.as_str());
        Self(key)
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The user part of the key.
    pub fn user_id(&self) -> &str {
        self.split().0
    }

    /// The organization part of the key.
    pub fn organization_id(&self) -> &str {
        self.split().1
    }

    /// Check whether this key belongs to the given organization.
    pub fn belongs_to(&self, organization_id: &OrganizationId) -> bool {
        self.organization_id() == organization_id.as_str()
    }

    fn split(&self) -> (&str, &str) {
        self.0.split_once(KEY_SEPARATOR).unwrap_or((&self.0, ""))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id(), self.organization_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user: &str, org: &str) -> CacheKey {
        CacheKey::new(&UserId::new(user), &OrganizationId::new(org)).unwrap()
    }

    #[test]
    fn test_key_parts() {
        let k = key("u-1", "org-1");
        assert_eq!(k.user_id(), "u-1");
        assert_eq!(k.organization_id(), "org-1");
        assert!(k.belongs_to(&OrganizationId::new("org-1")));
        assert!(!k.belongs_to(&OrganizationId::new("org-2")));
        assert_eq!(k.to_string(), "u-1:org-1");
    }

    #[test]
    fn test_colon_ids_do_not_collide() {
        assert_ne!(key("a", "b:c"), key("a:b", "c"));
        assert_ne!(key("a", "b:c").as_str(), key("a:b", "c").as_str());
    }

    #[test]
    fn test_separator_in_id_is_rejected() {
        let user = UserId::new(format!("a{}b", KEY_SEPARATOR));
        assert!(CacheKey::new(&user, &OrganizationId::new("c")).is_err());
        assert!(CacheKey::new(&UserId::new(""), &OrganizationId::new("c")).is_err());
        assert!(CacheKey::new(&UserId::new("a"), &OrganizationId::new("")).is_err());
    }
}
