//! Integration tests for the credential cache over the SQLite-backed
//! store: TTL boundaries, connected-only reads, and invalidation on
//! credential rotation.

use std::time::Duration;

use chrono::Utc;

use socialpulse::core::credentials::{Credential, CredentialCache};
use socialpulse::core::models::TenantId;
use socialpulse::core::platform::Platform;
use socialpulse::error::ErrorClass;
use socialpulse::storage::credential_store::{IntegrationStatus, SqliteCredentialStore};

fn make_credential(tenant: i64, platform: Platform, token: &str) -> Credential {
    Credential {
        tenant: TenantId(tenant),
        platform,
        access_token: token.to_string(),
        refresh_token: None,
        expires_at: None,
    }
}

#[tokio::test]
async fn resolve_reads_only_connected_rows() {
    let store = SqliteCredentialStore::open_in_memory().expect("open");
    let cache = CredentialCache::new();

    store
        .upsert_credential(&make_credential(1, Platform::LinkedIn, "tok"))
        .expect("upsert");
    store
        .set_status(TenantId(1), Platform::LinkedIn, IntegrationStatus::Revoked)
        .expect("revoke");

    let err = cache
        .resolve(&store, TenantId(1), Platform::LinkedIn)
        .await
        .expect_err("revoked row must not serve");
    assert_eq!(err.classify(), ErrorClass::CredentialUnavailable);
}

#[tokio::test]
async fn ttl_boundary_hit_then_miss() {
    let store = SqliteCredentialStore::open_in_memory().expect("open");
    store
        .upsert_credential(&make_credential(1, Platform::Facebook, "tok"))
        .expect("upsert");

    let cache = CredentialCache::with_ttl(Duration::from_millis(80));
    cache
        .resolve(&store, TenantId(1), Platform::Facebook)
        .await
        .expect("first resolve");

    // Inside the TTL: served from cache.
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(cache.get(TenantId(1), Platform::Facebook).is_some());

    // Past the TTL: the same entry is a miss.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(cache.get(TenantId(1), Platform::Facebook).is_none());

    // A fresh resolve falls through to the store and re-caches.
    cache
        .resolve(&store, TenantId(1), Platform::Facebook)
        .await
        .expect("resolve after expiry");
    assert!(cache.get(TenantId(1), Platform::Facebook).is_some());
}

#[tokio::test]
async fn rotation_invalidates_and_next_resolve_sees_new_token() {
    let store = SqliteCredentialStore::open_in_memory().expect("open");
    let cache = CredentialCache::new();

    store
        .upsert_credential(&make_credential(1, Platform::X, "old-token"))
        .expect("upsert");
    cache
        .resolve(&store, TenantId(1), Platform::X)
        .await
        .expect("resolve old");

    // Integration edited: new token lands in the store.
    let rotated = make_credential(1, Platform::X, "new-token");
    store.upsert_credential(&rotated).expect("rotate");

    assert!(cache.invalidate_if_changed(&rotated));

    let resolved = cache
        .resolve(&store, TenantId(1), Platform::X)
        .await
        .expect("resolve new");
    assert_eq!(resolved.access_token, "new-token");
}

#[tokio::test]
async fn tenant_wide_invalidation_on_integration_delete() {
    let store = SqliteCredentialStore::open_in_memory().expect("open");
    let cache = CredentialCache::new();

    for platform in [Platform::Facebook, Platform::X] {
        store
            .upsert_credential(&make_credential(1, platform, "tok"))
            .expect("upsert");
        cache
            .resolve(&store, TenantId(1), platform)
            .await
            .expect("resolve");
    }

    // Tenant deletes their integrations; every cached entry must go.
    cache.invalidate(TenantId(1), None);
    store
        .set_status(TenantId(1), Platform::Facebook, IntegrationStatus::Disconnected)
        .expect("disconnect");

    assert!(cache.get(TenantId(1), Platform::Facebook).is_none());
    assert!(cache.get(TenantId(1), Platform::X).is_none());

    let err = cache
        .resolve(&store, TenantId(1), Platform::Facebook)
        .await
        .expect_err("disconnected");
    assert_eq!(err.classify(), ErrorClass::CredentialUnavailable);
}

#[tokio::test]
async fn upstream_expiry_is_advisory_only() {
    let store = SqliteCredentialStore::open_in_memory().expect("open");
    let cache = CredentialCache::new();

    let mut credential = make_credential(1, Platform::Facebook, "tok");
    credential.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
    store.upsert_credential(&credential).expect("upsert");

    // The cache serves it regardless; expiry handling is the upstream
    // call's concern (it will come back 401 and follow the fallback path).
    let resolved = cache
        .resolve(&store, TenantId(1), Platform::Facebook)
        .await
        .expect("resolve");
    assert!(resolved.is_upstream_expired());
    assert!(cache.get(TenantId(1), Platform::Facebook).is_some());
}
