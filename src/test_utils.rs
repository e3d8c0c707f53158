//! Test utilities for socialpulse.
//!
//! Shared factories and in-memory collaborators for unit and integration
//! tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::credentials::{Credential, CredentialStore};
use crate::core::models::{NormalizedResponse, Period, TenantId};
use crate::core::platform::Platform;
use crate::error::Result;

// =============================================================================
// Test Data Factories
// =============================================================================

/// Create a test credential with a fixed token.
#[must_use]
pub fn make_test_credential(tenant: i64, platform: Platform) -> Credential {
    Credential {
        tenant: TenantId(tenant),
        platform,
        access_token: format!("test-token-{tenant}-{platform}"),
        refresh_token: None,
        expires_at: None,
    }
}

/// Create a normalized response carrying a single lifetime metric.
#[must_use]
pub fn make_test_response(metric: &str, value: f64) -> NormalizedResponse {
    let mut response = NormalizedResponse::new();
    response.insert(metric, Period::Lifetime, value);
    response
}

/// Create a file-backed response cache in a fresh temp directory. The
/// directory guard must outlive the cache.
#[must_use]
pub fn make_temp_response_cache() -> (crate::storage::response_cache::ResponseCache, tempfile::TempDir)
{
    let dir = tempfile::TempDir::new().expect("tempdir");
    let cache =
        crate::storage::response_cache::ResponseCache::open(&dir.path().join("cache.sqlite"))
            .expect("open cache");
    (cache, dir)
}

// =============================================================================
// In-Memory Credential Store
// =============================================================================

/// Credential store backed by a plain map, for tests that don't want a
/// database. Counts lookups so tests can assert the credential cache
/// actually avoided a store round-trip.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    entries: Mutex<HashMap<(TenantId, Platform), Credential>>,
    lookups: std::sync::atomic::AtomicUsize,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a credential.
    pub fn insert(&self, credential: Credential) {
        self.entries
            .lock()
            .expect("lock")
            .insert((credential.tenant, credential.platform), credential);
    }

    /// Remove a credential, simulating a disconnected integration.
    pub fn remove(&self, tenant: TenantId, platform: Platform) {
        self.entries.lock().expect("lock").remove(&(tenant, platform));
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credential(
        &self,
        tenant: TenantId,
        platform: Platform,
    ) -> Result<Option<Credential>> {
        self.lookups
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .expect("lock")
            .get(&(tenant, platform))
            .cloned())
    }
}

/// Credential store whose lookups always fail, for exercising store-error
/// paths.
pub struct FailingCredentialStore;

#[async_trait]
impl CredentialStore for FailingCredentialStore {
    async fn get_credential(
        &self,
        _tenant: TenantId,
        _platform: Platform,
    ) -> Result<Option<Credential>> {
        Err(anyhow::anyhow!("credential store offline").into())
    }
}
