//! `SQLite`-backed credential store.
//!
//! Source of truth for per-tenant platform credentials. Reads serve only
//! rows whose integration status is `connected`; edits from the integration
//! management surface land here and the in-process credential cache is
//! invalidated by the caller.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::core::credentials::{Credential, CredentialStore};
use crate::core::models::TenantId;
use crate::core::platform::Platform;
use crate::error::{PulseError, Result};
use crate::storage::schema::run_migrations;

// =============================================================================
// Integration Status
// =============================================================================

/// Connection state of a tenant's platform integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationStatus {
    /// Credential is live and servable.
    Connected,
    /// Integration disabled by the tenant.
    Disconnected,
    /// Upstream revoked the grant; re-authorization required.
    Revoked,
}

impl IntegrationStatus {
    /// Stable string used in the persisted row.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Revoked => "revoked",
        }
    }
}

// =============================================================================
// Sqlite Credential Store
// =============================================================================

/// Credential store over the `credentials` table.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Create or open a store at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)
            .map_err(|e| anyhow::anyhow!("open credential db: {e}"))?;
        run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be opened or
    /// migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| anyhow::anyhow!("open in-memory db: {e}"))?;
        run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a credential row, marking it connected.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub fn upsert_credential(&self, credential: &Credential) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO credentials \
                 (tenant_id, platform, access_token, refresh_token, expires_at, status, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 'connected', ?6) \
             ON CONFLICT (tenant_id, platform) DO UPDATE SET \
                 access_token = excluded.access_token, \
                 refresh_token = excluded.refresh_token, \
                 expires_at = excluded.expires_at, \
                 status = 'connected', \
                 updated_at = excluded.updated_at",
            params![
                credential.tenant.0,
                credential.platform.api_name(),
                credential.access_token,
                credential.refresh_token,
                credential.expires_at.map(|at| at.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| anyhow::anyhow!("upsert credential: {e}"))?;
        Ok(())
    }

    /// Update the status of an existing integration. Returns whether a row
    /// was touched.
    ///
    /// # Errors
    /// Returns an error if the statement fails.
    pub fn set_status(
        &self,
        tenant: TenantId,
        platform: Platform,
        status: IntegrationStatus,
    ) -> Result<bool> {
        let conn = self.lock_conn();
        let updated = conn
            .execute(
                "UPDATE credentials SET status = ?1, updated_at = ?2 \
                 WHERE tenant_id = ?3 AND platform = ?4",
                params![
                    status.as_str(),
                    Utc::now().to_rfc3339(),
                    tenant.0,
                    platform.api_name()
                ],
            )
            .map_err(|e| anyhow::anyhow!("set credential status: {e}"))?;
        Ok(updated > 0)
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read_connected(
        &self,
        tenant: TenantId,
        platform: Platform,
    ) -> Result<Option<Credential>> {
        let conn = self.lock_conn();
        let row = conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at FROM credentials \
                 WHERE tenant_id = ?1 AND platform = ?2 AND status = 'connected'",
                params![tenant.0, platform.api_name()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| anyhow::anyhow!("read credential: {e}"))?;

        let Some((access_token, refresh_token, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at = match expires_at {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| {
                        PulseError::Config(format!(
                            "invalid expires_at for tenant {tenant} on {platform}: {e}"
                        ))
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Some(Credential {
            tenant,
            platform,
            access_token,
            refresh_token,
            expires_at,
        }))
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get_credential(
        &self,
        tenant: TenantId,
        platform: Platform,
    ) -> Result<Option<Credential>> {
        self.read_connected(tenant, platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_credential(tenant: i64, platform: Platform, token: &str) -> Credential {
        Credential {
            tenant: TenantId(tenant),
            platform,
            access_token: token.to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let store = SqliteCredentialStore::open_in_memory().expect("open");
        let credential = make_credential(1, Platform::Facebook, "tok-a");

        store.upsert_credential(&credential).expect("upsert");

        let loaded = store
            .get_credential(TenantId(1), Platform::Facebook)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded, credential);
    }

    #[tokio::test]
    async fn missing_row_reads_as_none() {
        let store = SqliteCredentialStore::open_in_memory().expect("open");
        let loaded = store
            .get_credential(TenantId(1), Platform::LinkedIn)
            .await
            .expect("get");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn disconnected_row_is_not_served() {
        let store = SqliteCredentialStore::open_in_memory().expect("open");
        let credential = make_credential(1, Platform::X, "tok-a");
        store.upsert_credential(&credential).expect("upsert");

        assert!(
            store
                .set_status(TenantId(1), Platform::X, IntegrationStatus::Disconnected)
                .expect("set status")
        );

        let loaded = store
            .get_credential(TenantId(1), Platform::X)
            .await
            .expect("get");
        assert!(loaded.is_none());

        // Re-connecting by upsert serves it again.
        store.upsert_credential(&credential).expect("re-upsert");
        assert!(
            store
                .get_credential(TenantId(1), Platform::X)
                .await
                .expect("get")
                .is_some()
        );
    }

    #[tokio::test]
    async fn upsert_replaces_token() {
        let store = SqliteCredentialStore::open_in_memory().expect("open");
        store
            .upsert_credential(&make_credential(1, Platform::Instagram, "old"))
            .expect("first");
        store
            .upsert_credential(&make_credential(1, Platform::Instagram, "new"))
            .expect("second");

        let loaded = store
            .get_credential(TenantId(1), Platform::Instagram)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.access_token, "new");
    }

    #[tokio::test]
    async fn expires_at_roundtrips() {
        let store = SqliteCredentialStore::open_in_memory().expect("open");
        let mut credential = make_credential(1, Platform::Facebook, "tok");
        credential.expires_at = Some(
            DateTime::parse_from_rfc3339("2026-09-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        store.upsert_credential(&credential).expect("upsert");

        let loaded = store
            .get_credential(TenantId(1), Platform::Facebook)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.expires_at, credential.expires_at);
    }
}
