//! Per-tenant authorization cache.
//!
//! This module caches one [`EffectiveAuthorization`] per (user, organization)
//! pair in front of a [`RoleDataProvider`]:
//!
//! - **Lazy resolution**: the first lookup after an invalidation asks the
//!   provider and stores the result
//! - **Single-flight**: concurrent misses on the same key share one provider
//!   round trip and all observe its outcome, success or failure
//! - **Explicit invalidation**: entries live until invalidated; an optional TTL
//!   can bound staleness
//! - **No negative caching of failures**: a failed flight is dropped from the
//!   map, so the next lookup starts a new one
//!
//! # Architecture
//!
//! ```text
//! get_effective_authorization(user, org)
//!        │
//!        ▼
//!  ┌──────────────┐  Ready    ┌──────────────────────────┐
//!  │ DashMap slot ├──────────►│ Arc<EffectiveAuthorization>
//!  └──────┬───────┘           └──────────────────────────┘
//!         │ Pending: await the shared flight
//!         │ Vacant / expired: start a flight, store it as Pending
//!         ▼
//!  RoleDataProvider ──► PermissionResolver ──► Ready
//! ```
//!
//! A flight is a [`Shared`] future. It makes progress while at least one
//! caller awaits it; a caller that is dropped leaves the flight to the others,
//! and a later caller resumes it from the map.
//!
//! Invalidation removes the slot from the map. A flight still running for a
//! removed slot completes for the callers already waiting on it, but is never
//! promoted to `Ready`; later lookups start a fresh flight.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crm_authz::cache::AuthorizationCache;
//!
//! let cache = AuthorizationCache::new(provider);
//! let auth = cache.get_effective_authorization(&user_id, &org_id).await?;
//! cache.invalidate(&user_id, &org_id)?;
//! ```

pub mod key;

pub use key::{CacheKey, KEY_SEPARATOR};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, info, instrument, Instrument};

use crate::error::{AuthzError, Result};
use crate::rbac::models::{EffectiveAuthorization, OrganizationId, RoleId, UserId};
use crate::rbac::provider::RoleDataProvider;
use crate::rbac::resolver::PermissionResolver;

/// Upper bound on configured shards.
const MAX_SHARDS: usize = 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Authorization cache configuration.
///
/// The defaults keep entries until they are invalidated and wait on the
/// provider without a deadline.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationCacheConfig {
    /// Deadline for each provider call
    #[serde(default, with = "humantime_serde")]
    pub resolve_timeout: Option<Duration>,

    /// Maximum age of a cached entry
    #[serde(default, with = "humantime_serde")]
    pub time_to_live: Option<Duration>,

    /// Shard count for concurrent access, rounded up to a power of two in 2..=1024
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
}

fn default_shard_count() -> usize {
    16
}

impl Default for AuthorizationCacheConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: None,
            time_to_live: None,
            shard_count: default_shard_count(),
        }
    }
}

impl AuthorizationCacheConfig {
    /// Create a new cache configuration builder.
    pub fn builder() -> AuthorizationCacheConfigBuilder {
        AuthorizationCacheConfigBuilder::default()
    }

    /// The shard amount actually handed to the map.
    pub fn effective_shards(&self) -> usize {
        self.shard_count.clamp(2, MAX_SHARDS).next_power_of_two()
    }
}

/// Builder for cache configuration.
#[derive(Debug, Default)]
pub struct AuthorizationCacheConfigBuilder {
    config: AuthorizationCacheConfig,
}

impl AuthorizationCacheConfigBuilder {
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.config.resolve_timeout = Some(timeout);
        self
    }

    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.config.time_to_live = Some(ttl);
        self
    }

    pub fn shard_count(mut self, shards: usize) -> Self {
        self.config.shard_count = shards;
        self
    }

    pub fn build(self) -> AuthorizationCacheConfig {
        self.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Authorization cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of resolved entries currently cached
    pub entries: u64,

    /// Lookups answered from the cache
    pub hits: u64,

    /// Provider round trips started
    pub resolutions: u64,

    /// Provider round trips that failed or timed out
    pub failures: u64,

    /// Invalidation calls, including no-op ones
    pub invalidations: u64,

    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

impl CacheStats {
    /// Calculate the hit rate.
    pub fn calculate_hit_rate(&mut self) {
        let total = self.hits + self.resolutions;
        self.hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    resolutions: AtomicU64,
    failures: AtomicU64,
    invalidations: AtomicU64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorization Cache
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct Resolved {
    value: Arc<EffectiveAuthorization>,
    resolved_at: Instant,
}

type Flight = Shared<BoxFuture<'static, Result<Resolved>>>;

/// One key's state. `flight_id` tells a promotion or cleanup whether the slot
/// still belongs to the flight that produced it.
enum Slot {
    Pending { flight_id: u64, flight: Flight },
    Ready { flight_id: u64, resolved: Resolved },
}

impl Slot {
    fn is_pending(&self, id: u64) -> bool {
        matches!(self, Slot::Pending { flight_id, .. } if *flight_id == id)
    }
}

/// Caches effective authorizations keyed by (user, organization).
pub struct AuthorizationCache {
    provider: Arc<dyn RoleDataProvider>,

    entries: DashMap<CacheKey, Slot>,

    config: AuthorizationCacheConfig,

    counters: Arc<Counters>,

    next_flight: AtomicU64,
}

impl AuthorizationCache {
    /// Create a cache with the default (unbounded, no timeout) configuration.
    pub fn new(provider: Arc<dyn RoleDataProvider>) -> Self {
        Self::with_config(provider, AuthorizationCacheConfig::default())
    }

    /// Create a cache with an explicit configuration.
    pub fn with_config(provider: Arc<dyn RoleDataProvider>, config: AuthorizationCacheConfig) -> Self {
        Self {
            provider,
            entries: DashMap::with_shard_amount(config.effective_shards()),
            config,
            counters: Arc::new(Counters::default()),
            next_flight: AtomicU64::new(0),
        }
    }

    /// Get the effective authorization for a user in an organization.
    ///
    /// Returns the cached value when present. Otherwise joins, or starts, the
    /// single flight for this key: every concurrent caller receives the same
    /// `Arc` on success and a clone of the same error on failure. Failures are
    /// never cached.
    #[instrument(skip_all, fields(user_id = %user_id, organization_id = %organization_id))]
    pub async fn get_effective_authorization(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Arc<EffectiveAuthorization>> {
        let key = CacheKey::new(user_id, organization_id)?;

        let (flight_id, flight) = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let joined = match occupied.get() {
                    Slot::Ready { resolved, .. } if !self.is_expired(resolved) => {
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        counter!("authz_cache_hits_total").increment(1);
                        debug!("Authorization cache hit");
                        return Ok(Arc::clone(&resolved.value));
                    }
                    Slot::Ready { .. } => None,
                    Slot::Pending { flight_id, flight } => Some((*flight_id, flight.clone())),
                };
                match joined {
                    Some(joined) => {
                        debug!("Joining in-flight resolution");
                        joined
                    }
                    None => {
                        debug!("Authorization cache entry expired");
                        let (id, flight) = self.start_flight(user_id, organization_id);
                        occupied.insert(Slot::Pending {
                            flight_id: id,
                            flight: flight.clone(),
                        });
                        (id, flight)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let (id, flight) = self.start_flight(user_id, organization_id);
                vacant.insert(Slot::Pending {
                    flight_id: id,
                    flight: flight.clone(),
                });
                (id, flight)
            }
        };

        match flight.await {
            Ok(resolved) => {
                if let Some(mut slot) = self.entries.get_mut(&key) {
                    if slot.is_pending(flight_id) {
                        *slot = Slot::Ready {
                            flight_id,
                            resolved: resolved.clone(),
                        };
                    }
                }
                Ok(resolved.value)
            }
            Err(err) => {
                self.entries.remove_if(&key, |_, slot| slot.is_pending(flight_id));
                Err(err)
            }
        }
    }

    /// Drop the cached entry for one (user, organization) pair.
    ///
    /// Returns whether an entry was present. Lookups issued after this call
    /// returns always resolve again.
    #[instrument(skip_all, fields(user_id = %user_id, organization_id = %organization_id))]
    pub fn invalidate(&self, user_id: &UserId, organization_id: &OrganizationId) -> Result<bool> {
        let key = CacheKey::new(user_id, organization_id)?;
        let removed = self.entries.remove(&key).is_some();

        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        counter!("authz_cache_invalidations_total", "scope" => "user").increment(1);
        info!(removed, "Invalidated authorization cache entry");
        Ok(removed)
    }

    /// Drop every cached entry of one organization.
    #[instrument(skip_all, fields(organization_id = %organization_id))]
    pub fn invalidate_organization(&self, organization_id: &OrganizationId) -> Result<usize> {
        organization_id.validate()?;

        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !key.belongs_to(organization_id);
            if !keep {
                removed += 1;
            }
            keep
        });

        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        counter!("authz_cache_invalidations_total", "scope" => "organization").increment(1);
        info!(removed, "Invalidated organization authorization cache entries");
        Ok(removed)
    }

    /// Drop every cached entry.
    #[instrument(skip(self))]
    pub fn invalidate_all(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();

        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        counter!("authz_cache_invalidations_total", "scope" => "all").increment(1);
        info!(removed, "Cleared authorization cache");
        removed
    }

    /// Check whether a live resolved entry exists for the pair.
    pub fn contains(&self, user_id: &UserId, organization_id: &OrganizationId) -> bool {
        let Ok(key) = CacheKey::new(user_id, organization_id) else {
            return false;
        };
        self.entries.get(&key).is_some_and(|slot| match &*slot {
            Slot::Ready { resolved, .. } => !self.is_expired(resolved),
            Slot::Pending { .. } => false,
        })
    }

    /// Number of resolved entries, expired ones included until next touched.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Ready { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            entries: self.len() as u64,
            hits: self.counters.hits.load(Ordering::Relaxed),
            resolutions: self.counters.resolutions.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            hit_rate: 0.0,
        };
        stats.calculate_hit_rate();
        stats
    }

    /// Get the active configuration.
    pub fn config(&self) -> &AuthorizationCacheConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn is_expired(&self, resolved: &Resolved) -> bool {
        self.config
            .time_to_live
            .is_some_and(|ttl| resolved.resolved_at.elapsed() >= ttl)
    }

    /// Build a flight. Nothing runs until a caller polls it.
    fn start_flight(&self, user_id: &UserId, organization_id: &OrganizationId) -> (u64, Flight) {
        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let span = debug_span!(
            "resolve_authorization",
            flight_id = id,
            user_id = %user_id,
            organization_id = %organization_id
        );
        let resolution = Resolution {
            provider: Arc::clone(&self.provider),
            timeout: self.config.resolve_timeout,
            counters: Arc::clone(&self.counters),
            user_id: user_id.clone(),
            organization_id: organization_id.clone(),
        };
        (id, resolution.run().instrument(span).boxed().shared())
    }
}

impl std::fmt::Debug for AuthorizationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCache")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything one flight needs, owned so the flight outlives any one caller.
struct Resolution {
    provider: Arc<dyn RoleDataProvider>,
    timeout: Option<Duration>,
    counters: Arc<Counters>,
    user_id: UserId,
    organization_id: OrganizationId,
}

impl Resolution {
    async fn run(self) -> Result<Resolved> {
        self.counters.resolutions.fetch_add(1, Ordering::Relaxed);
        counter!("authz_cache_resolutions_total").increment(1);
        let started = Instant::now();

        match self.load().await {
            Ok(authorization) => {
                debug!(
                    roles = authorization.role_permissions.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Resolved effective authorization"
                );
                Ok(Resolved {
                    value: Arc::new(authorization),
                    resolved_at: Instant::now(),
                })
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                counter!("authz_cache_failures_total", "code" => err.code().as_str()).increment(1);
                err.log();
                Err(err)
            }
        }
    }

    async fn load(&self) -> Result<EffectiveAuthorization> {
        let assignments = self
            .call(
                "get_role_assignments",
                self.provider
                    .get_role_assignments(&self.user_id, &self.organization_id),
            )
            .await?;

        if assignments.is_empty() {
            return Ok(EffectiveAuthorization::empty(
                self.user_id.clone(),
                self.organization_id.clone(),
            ));
        }

        let role_ids: Vec<RoleId> = assignments.iter().map(|a| a.role_id.clone()).collect();
        let grants = self
            .call("get_permissions", self.provider.get_permissions(&role_ids))
            .await?;

        Ok(PermissionResolver::resolve(
            self.user_id.clone(),
            self.organization_id.clone(),
            assignments,
            &PermissionResolver::group_grants(grants),
        ))
    }

    /// Await one provider call, applying the configured deadline.
    async fn call<T, F>(&self, operation: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let outcome = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, future)
                .await
                .map_err(|_| AuthzError::DependencyTimeout { operation, timeout })?,
            None => future.await,
        };
        outcome.map_err(|e| AuthzError::dependency(operation, e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
