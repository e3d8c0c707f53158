//! Persistence: the response cache, credential rows, schema migrations,
//! and filesystem paths.

pub mod credential_store;
pub mod paths;
pub mod response_cache;
pub mod schema;

pub use credential_store::{IntegrationStatus, SqliteCredentialStore};
pub use paths::AppPaths;
pub use response_cache::{
    CacheEntry, CacheMetrics, ResponseCache, STALENESS_FRESH_SECS, STALENESS_STALE_SECS, Staleness,
};
pub use schema::run_migrations;
