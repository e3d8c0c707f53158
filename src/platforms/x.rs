//! X (Twitter API v2) account metrics client.
//!
//! Flat `public_metrics` counters from the user lookup endpoint. Both
//! metric groups hit the same endpoint but project different counters, so
//! each group's failure stays its own.

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::credentials::Credential;
use crate::core::http::get_json;
use crate::core::models::{NormalizedResponse, Period, ResourceId, TimeRange};
use crate::core::platform::Platform;
use crate::error::{PulseError, Result};
use crate::platforms::PlatformClient;

// =============================================================================
// API Response Types
// =============================================================================

/// Response from `/users/{id}?user.fields=public_metrics`.
#[derive(Debug, Deserialize)]
struct UserLookupResponse {
    data: UserData,
}

#[derive(Debug, Deserialize)]
struct UserData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    public_metrics: PublicMetrics,
}

#[derive(Debug, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    followers_count: i64,
    #[serde(default)]
    following_count: i64,
    #[serde(default)]
    tweet_count: i64,
    #[serde(default)]
    listed_count: i64,
}

// =============================================================================
// Client
// =============================================================================

/// Client for X account metrics.
pub struct XClient {
    http: reqwest::Client,
    base: String,
}

impl XClient {
    /// Create a client against the production API.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, Platform::X.api_base().to_string())
    }

    /// Create a client against a custom base URL (used by tests).
    #[must_use]
    pub const fn with_base_url(http: reqwest::Client, base: String) -> Self {
        Self { http, base }
    }

    async fn lookup_user(
        &self,
        credential: &Credential,
        resource: &ResourceId,
    ) -> Result<UserLookupResponse> {
        let url = format!("{}/users/{}", self.base, resource);
        let query = [("user.fields", "public_metrics".to_string())];

        get_json(
            &self.http,
            Platform::X,
            resource.as_str(),
            &url,
            &credential.access_token,
            &query,
        )
        .await
    }
}

#[async_trait]
impl PlatformClient for XClient {
    fn platform(&self) -> Platform {
        Platform::X
    }

    async fn fetch_metric_group(
        &self,
        credential: &Credential,
        resource: &ResourceId,
        group: &str,
        _time_range: &TimeRange,
    ) -> Result<NormalizedResponse> {
        if !matches!(group, "followers" | "engagement") {
            return Err(PulseError::UnknownMetricGroup {
                platform: Platform::X.api_name().to_string(),
                group: group.to_string(),
            });
        }

        let response = self.lookup_user(credential, resource).await?;
        let metrics = &response.data.public_metrics;

        let projected: [(&str, i64); 2] = if group == "followers" {
            [
                ("followers_count", metrics.followers_count),
                ("following_count", metrics.following_count),
            ]
        } else {
            [
                ("tweet_count", metrics.tweet_count),
                ("listed_count", metrics.listed_count),
            ]
        };

        let mut normalized = NormalizedResponse::new();
        #[allow(clippy::cast_precision_loss)]
        for (metric, value) in projected {
            normalized.insert(metric, Period::Lifetime, value as f64);
        }

        normalized.identity.id = response.data.id.or_else(|| Some(resource.to_string()));
        normalized.identity.name = response.data.name;
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_lookup_parses() {
        let response: UserLookupResponse = serde_json::from_str(
            r#"{"data": {"id": "12", "name": "Acme", "username": "acme",
                "public_metrics": {"followers_count": 1200, "following_count": 80,
                                   "tweet_count": 5400, "listed_count": 3}}}"#,
        )
        .expect("parse");

        assert_eq!(response.data.public_metrics.followers_count, 1200);
        assert_eq!(response.data.name.as_deref(), Some("Acme"));
    }

    #[test]
    fn missing_public_metrics_is_a_parse_error() {
        let result: std::result::Result<UserLookupResponse, _> =
            serde_json::from_str(r#"{"data": {"id": "12"}}"#);
        assert!(result.is_err());
    }
}
