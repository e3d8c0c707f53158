//! Credential model, store seam, and the process-local credential cache.
//!
//! The cache is an explicitly-constructed component handed by reference to
//! whatever needs it — never a module-level global — so TTL and eviction are
//! visible in tests. A cache miss is a signal to fall through to the
//! [`CredentialStore`], not an error.
//!
//! Access tokens are never logged; log fields carry a short SHA-256
//! fingerprint instead.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::models::TenantId;
use crate::core::platform::Platform;
use crate::error::{PulseError, Result};

/// How long a credential stays servable from the cache.
///
/// Independent of the token's own `expires_at`, which is upstream metadata
/// and advisory only for this layer.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(300);

// =============================================================================
// Credential
// =============================================================================

/// Per-tenant, per-platform access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub tenant: TenantId,
    pub platform: Platform,
    pub access_token: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Upstream token expiry. Advisory; TTL enforcement is the cache's own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Short fingerprint of the access token, safe for log fields.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.access_token)
    }

    /// Whether the upstream says this token is past its own expiry.
    #[must_use]
    pub fn is_upstream_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at < Utc::now())
    }
}

/// SHA-256 fingerprint of a token, truncated to 16 hex chars.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

// =============================================================================
// Credential Store
// =============================================================================

/// Persisted source of truth for credentials.
///
/// Implementations return only credentials whose integration is connected;
/// a disconnected or missing integration reads as `None`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(
        &self,
        tenant: TenantId,
        platform: Platform,
    ) -> Result<Option<Credential>>;
}

// =============================================================================
// Credential Cache
// =============================================================================

#[derive(Debug, Clone)]
struct CachedCredential {
    credential: Credential,
    cached_at: Instant,
}

/// Process-local, TTL-bounded cache in front of the credential store.
///
/// Safe for concurrent `get`/`put` from multiple in-flight fetches. A
/// miss-then-put race producing two identical `put`s for the same key is
/// tolerated — last write wins and the entries are equivalent.
pub struct CredentialCache {
    ttl: Duration,
    entries: RwLock<HashMap<(TenantId, Platform), CachedCredential>>,
}

impl CredentialCache {
    /// Create a cache with the default 5-minute TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CREDENTIAL_TTL)
    }

    /// Create a cache with a custom TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached credential if it is within TTL. Never fails; an
    /// expired or absent entry is a miss.
    #[must_use]
    pub fn get(&self, tenant: TenantId, platform: Platform) -> Option<Credential> {
        let entries = self.entries.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let cached = entries.get(&(tenant, platform))?;
        if cached.cached_at.elapsed() < self.ttl {
            Some(cached.credential.clone())
        } else {
            None
        }
    }

    /// Insert or refresh a cached credential.
    pub fn put(&self, credential: Credential) {
        let key = (credential.tenant, credential.platform);
        tracing::debug!(
            tenant = %credential.tenant,
            platform = %credential.platform,
            token = %credential.fingerprint(),
            "credential cached"
        );
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            key,
            CachedCredential {
                credential,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop cached entries for a tenant: one platform, or all of them when
    /// `platform` is `None` (integration edited or deleted).
    pub fn invalidate(&self, tenant: TenantId, platform: Option<Platform>) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match platform {
            Some(p) => {
                entries.remove(&(tenant, p));
            }
            None => {
                entries.retain(|(t, _), _| *t != tenant);
            }
        }
    }

    /// Invalidate the cached entry if `fresh` carries a different token than
    /// the one cached. Returns true when an invalidation happened.
    pub fn invalidate_if_changed(&self, fresh: &Credential) -> bool {
        let changed = self
            .get(fresh.tenant, fresh.platform)
            .is_some_and(|cached| cached.fingerprint() != fresh.fingerprint());
        if changed {
            tracing::info!(
                tenant = %fresh.tenant,
                platform = %fresh.platform,
                token = %fresh.fingerprint(),
                "credential rotated, dropping cached entry"
            );
            self.invalidate(fresh.tenant, Some(fresh.platform));
        }
        changed
    }

    /// Number of live entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get-or-fetch: cache hit, else fall through to the store and cache the
    /// result. A store miss maps to `CredentialUnavailable`.
    ///
    /// # Errors
    ///
    /// Returns `CredentialUnavailable` when the store has no connected
    /// credential, or the store's own error on lookup failure.
    pub async fn resolve(
        &self,
        store: &dyn CredentialStore,
        tenant: TenantId,
        platform: Platform,
    ) -> Result<Credential> {
        if let Some(credential) = self.get(tenant, platform) {
            return Ok(credential);
        }

        let credential = store
            .get_credential(tenant, platform)
            .await?
            .ok_or_else(|| PulseError::CredentialUnavailable {
                tenant: tenant.0,
                platform: platform.api_name().to_string(),
            })?;

        self.put(credential.clone());
        Ok(credential)
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}
