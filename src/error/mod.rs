//! Error types for socialpulse.
//!
//! Uses `thiserror` for structured error types. Every upstream failure is
//! mapped into a small fixed [`ErrorClass`] taxonomy derived from HTTP
//! status; the class is the single piece of information the orchestrator
//! needs to decide whether a stale cached response may be served in place
//! of the live one.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout the crate.
pub type Result<T, E = PulseError> = std::result::Result<T, E>;

// =============================================================================
// Error Class
// =============================================================================

/// Classification of a failure, derived from upstream HTTP status or the
/// failing layer.
///
/// Drives the serve-stale fallback decision via
/// [`ErrorClass::should_serve_stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// No connected credential could be resolved for the tenant/platform.
    CredentialUnavailable,
    /// Upstream rejected the credential (HTTP 401).
    Unauthorized,
    /// Upstream denied access to the resource (HTTP 403).
    Forbidden,
    /// The resource does not exist upstream (HTTP 404).
    NotFound,
    /// Upstream rate limit hit (HTTP 429).
    RateLimited,
    /// Upstream 5xx, timeout, or transport failure.
    Upstream,
    /// Response parsed but is missing expected fields.
    Malformed,
    /// Response cache read/write failure. Always recovered locally.
    CacheUnavailable,
}

impl ErrorClass {
    /// Whether a failure of this class may be answered from the response
    /// cache.
    ///
    /// This is the single fallback-policy table: a cache substitution makes
    /// sense only when the upstream said no but a previously-good answer
    /// exists. A malformed response or a missing credential is a local
    /// problem a stale payload would only mask.
    #[must_use]
    pub const fn should_serve_stale(self) -> bool {
        matches!(
            self,
            Self::Unauthorized
                | Self::Forbidden
                | Self::NotFound
                | Self::RateLimited
                | Self::Upstream
        )
    }

    /// Short label for logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CredentialUnavailable => "credential_unavailable",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Upstream => "upstream",
            Self::Malformed => "malformed",
            Self::CacheUnavailable => "cache_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an upstream HTTP status code.
#[must_use]
pub fn classify_status(status: reqwest::StatusCode) -> ErrorClass {
    match status.as_u16() {
        401 => ErrorClass::Unauthorized,
        403 => ErrorClass::Forbidden,
        404 => ErrorClass::NotFound,
        429 => ErrorClass::RateLimited,
        _ => ErrorClass::Upstream,
    }
}

// =============================================================================
// Crate Error
// =============================================================================

/// Main error type for socialpulse operations.
#[derive(Error, Debug)]
pub enum PulseError {
    // ==========================================================================
    // Credential errors
    // ==========================================================================
    /// No connected credential row exists for the tenant/platform pair.
    #[error("no connected credential for tenant {tenant} on {platform}")]
    CredentialUnavailable { tenant: i64, platform: String },

    // ==========================================================================
    // Classified upstream errors
    // ==========================================================================
    /// Upstream rejected the access token.
    #[error("unauthorized by {platform} (HTTP 401)")]
    Unauthorized { platform: String },

    /// Upstream denied access to the resource.
    #[error("forbidden by {platform} (HTTP 403)")]
    Forbidden { platform: String },

    /// Resource does not exist upstream.
    #[error("resource {resource} not found on {platform} (HTTP 404)")]
    NotFound { platform: String, resource: String },

    /// Upstream rate limit hit.
    #[error("rate limited by {platform}")]
    RateLimited {
        platform: String,
        retry_after: Option<Duration>,
    },

    /// Upstream 5xx or otherwise unexpected status.
    #[error("upstream error from {platform}: {message}")]
    UpstreamError {
        platform: String,
        status: Option<u16>,
        message: String,
    },

    /// Request exceeded the bounded per-call timeout.
    #[error("request timeout after {seconds}s for {platform}")]
    Timeout { platform: String, seconds: u64 },

    /// Transport-level failure (DNS, connect, TLS).
    #[error("network error for {platform}: {message}")]
    Network { platform: String, message: String },

    /// Response parsed as JSON but lacks fields the normalizer requires.
    #[error("malformed {platform} response: {message}")]
    Malformed { platform: String, message: String },

    // ==========================================================================
    // Local errors
    // ==========================================================================
    /// Response cache read/write failure. Never surfaced to the consumer.
    #[error("response cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Unknown platform name.
    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    /// Unknown metric group for a platform.
    #[error("unknown metric group '{group}' for {platform}")]
    UnknownMetricGroup { platform: String, group: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PulseError {
    /// Map this error to its [`ErrorClass`].
    #[must_use]
    pub const fn classify(&self) -> ErrorClass {
        match self {
            Self::CredentialUnavailable { .. } => ErrorClass::CredentialUnavailable,
            Self::Unauthorized { .. } => ErrorClass::Unauthorized,
            Self::Forbidden { .. } => ErrorClass::Forbidden,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Malformed { .. } | Self::Json(_) => ErrorClass::Malformed,
            Self::CacheUnavailable(_) => ErrorClass::CacheUnavailable,
            // Timeouts, transport failures, and local faults all degrade the
            // same way an upstream 5xx does.
            Self::UpstreamError { .. }
            | Self::Timeout { .. }
            | Self::Network { .. }
            | Self::InvalidPlatform(_)
            | Self::UnknownMetricGroup { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Other(_) => ErrorClass::Upstream,
        }
    }

    /// Build the classified error for a non-success upstream status.
    #[must_use]
    pub fn from_status(
        platform: &str,
        resource: &str,
        status: reqwest::StatusCode,
        retry_after: Option<Duration>,
        body: &str,
    ) -> Self {
        match classify_status(status) {
            ErrorClass::Unauthorized => Self::Unauthorized {
                platform: platform.to_string(),
            },
            ErrorClass::Forbidden => Self::Forbidden {
                platform: platform.to_string(),
            },
            ErrorClass::NotFound => Self::NotFound {
                platform: platform.to_string(),
                resource: resource.to_string(),
            },
            ErrorClass::RateLimited => Self::RateLimited {
                platform: platform.to_string(),
                retry_after,
            },
            _ => Self::UpstreamError {
                platform: platform.to_string(),
                status: Some(status.as_u16()),
                message: truncate_body(body),
            },
        }
    }
}

/// Keep upstream error bodies loggable without dragging whole payloads
/// through the error chain.
fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}
