//! Persisted response cache.
//!
//! Stores the last-known-good normalized response per (tenant, platform,
//! resource), with a fetch status and a last-fetched timestamp. Entries are
//! never expired by age alone — staleness is surfaced to the caller, but a
//! stale entry remains servable indefinitely as a fallback.
//!
//! Failure semantics follow the read-mostly contract: a failed write never
//! fails the overall fetch (the fresh data already reached the caller), and
//! a failed read is a miss. Both are logged and swallowed.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::core::models::{CacheKey, FetchStatus, NormalizedResponse};
use crate::error::{PulseError, Result};
use crate::storage::schema::run_migrations;

/// Staleness thresholds for cached data.
pub const STALENESS_FRESH_SECS: u64 = 300; // 5 minutes
pub const STALENESS_STALE_SECS: u64 = 1800; // 30 minutes

// =============================================================================
// Staleness
// =============================================================================

/// How old a cached payload is, for display purposes.
///
/// Informational only: even `VeryStale` data is served when the live fetch
/// fails, because a few-minutes-old number beats a blank cell in the
/// reporting UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Less than 5 minutes old.
    Fresh,
    /// 5 to 30 minutes old — display with a stale-data badge.
    Stale,
    /// More than 30 minutes old — display with a strong warning badge.
    VeryStale,
}

impl Staleness {
    /// Determine staleness from age in seconds.
    #[must_use]
    pub const fn from_age_secs(age_secs: u64) -> Self {
        if age_secs < STALENESS_FRESH_SECS {
            Self::Fresh
        } else if age_secs < STALENESS_STALE_SECS {
            Self::Stale
        } else {
            Self::VeryStale
        }
    }

    /// Label for events and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::VeryStale => "very_stale",
        }
    }
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Telemetry counters for cache operations.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Number of cache reads (hit or miss).
    pub reads: AtomicU64,
    /// Number of cache writes.
    pub writes: AtomicU64,
    /// Number of reads that served a fallback after a failed live fetch.
    pub fallback_hits: AtomicU64,
    /// Number of swallowed write failures.
    pub write_failures: AtomicU64,
}

impl CacheMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            fallback_hits: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    /// Record a fallback serve, for telemetry on upstream degradation.
    pub fn record_fallback_hit(&self) {
        self.fallback_hits.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// One persisted response with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: NormalizedResponse,
    pub fetch_status: FetchStatus,
    pub last_fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry.
    #[must_use]
    pub fn age(&self) -> Duration {
        let age = Utc::now() - self.last_fetched_at;
        Duration::from_secs(age.num_seconds().max(0).unsigned_abs())
    }

    /// Staleness level of the entry.
    #[must_use]
    pub fn staleness(&self) -> Staleness {
        Staleness::from_age_secs(self.age().as_secs())
    }

    /// Whether this entry may substitute for a failed live fetch.
    #[must_use]
    pub fn is_servable(&self) -> bool {
        self.fetch_status == FetchStatus::Success
    }
}

// =============================================================================
// Response Cache
// =============================================================================

/// `SQLite`-backed response cache. Safe to share across concurrent fetch
/// sessions; statements are short and serialized on an internal lock.
pub struct ResponseCache {
    conn: Mutex<Connection>,
    metrics: CacheMetrics,
}

impl ResponseCache {
    /// Create or open a cache database at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)
            .map_err(|e| anyhow::anyhow!("open cache db: {e}"))?;
        run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            metrics: CacheMetrics::new(),
        })
    }

    /// Open an in-memory cache database (for testing).
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
            metrics: CacheMetrics::new(),
        })
    }

    /// Telemetry counters.
    #[must_use]
    pub const fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Read the cached entry for a key. A read failure is logged and
    /// reported as a miss.
    #[must_use]
    pub fn get_data(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        match self.try_get_data(key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Read the cached entry for a key, surfacing storage errors.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on query failure or an undecodable payload.
    pub fn try_get_data(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let conn = self.lock_conn();

        let row = conn
            .query_row(
                "SELECT payload_json, fetch_status, last_fetched_at FROM response_cache \
                 WHERE tenant_id = ?1 AND platform = ?2 AND resource_id = ?3",
                params![key.tenant.0, key.platform.api_name(), key.resource.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| PulseError::CacheUnavailable(format!("read {key}: {e}")))?;

        let Some((payload_json, status, fetched_at)) = row else {
            return Ok(None);
        };

        let payload: NormalizedResponse = serde_json::from_str(&payload_json)
            .map_err(|e| PulseError::CacheUnavailable(format!("decode {key}: {e}")))?;
        let last_fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .map_err(|e| PulseError::CacheUnavailable(format!("timestamp {key}: {e}")))?
            .with_timezone(&Utc);

        Ok(Some(CacheEntry {
            key: key.clone(),
            payload,
            fetch_status: FetchStatus::from_str_lossy(&status),
            last_fetched_at,
        }))
    }

    /// Write-through a response. Last-write-wins per key; a failure is
    /// logged and swallowed so it can never fail the fetch that produced
    /// the data.
    pub fn store_data(&self, key: &CacheKey, payload: &NormalizedResponse, status: FetchStatus) {
        if let Err(e) = self.try_store_data(key, payload, status) {
            self.metrics.write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key = %key, error = %e, "cache write failed, continuing");
        }
    }

    /// Write-through a response, surfacing storage errors.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on serialization or statement failure.
    pub fn try_store_data(
        &self,
        key: &CacheKey,
        payload: &NormalizedResponse,
        status: FetchStatus,
    ) -> Result<()> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| PulseError::CacheUnavailable(format!("encode {key}: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO response_cache \
                 (tenant_id, platform, resource_id, payload_json, fetch_status, last_fetched_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT (tenant_id, platform, resource_id) DO UPDATE SET \
                 payload_json = excluded.payload_json, \
                 fetch_status = excluded.fetch_status, \
                 last_fetched_at = excluded.last_fetched_at",
            params![
                key.tenant.0,
                key.platform.api_name(),
                key.resource.as_str(),
                payload_json,
                status.as_str(),
                now
            ],
        )
        .map_err(|e| PulseError::CacheUnavailable(format!("write {key}: {e}")))?;

        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, status = status.as_str(), "cache entry stored");
        Ok(())
    }

    /// Delete the entry for a key. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` on statement failure.
    pub fn clear(&self, key: &CacheKey) -> Result<bool> {
        let conn = self.lock_conn();
        let deleted = conn
            .execute(
                "DELETE FROM response_cache \
                 WHERE tenant_id = ?1 AND platform = ?2 AND resource_id = ?3",
                params![key.tenant.0, key.platform.api_name(), key.resource.as_str()],
            )
            .map_err(|e| PulseError::CacheUnavailable(format!("clear {key}: {e}")))?;
        Ok(deleted > 0)
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
