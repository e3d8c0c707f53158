//! Core data models and shared infrastructure.

pub mod config;
pub mod credentials;
pub mod http;
pub mod logging;
pub mod models;
pub mod platform;

pub use config::{AggregatorConfig, ConfigFile};
pub use credentials::{
    Credential, CredentialCache, CredentialStore, DEFAULT_CREDENTIAL_TTL, token_fingerprint,
};
pub use models::{
    CacheKey, FetchStatus, NormalizedResponse, Period, ResourceId, ResourceIdentity, TenantId,
    TimeRange,
};
pub use platform::Platform;
