//! Instagram (Meta Graph API) business account metrics client.
//!
//! Same insights envelope as Facebook, different metric names and an
//! all-day bucketing. One `/{ig_user_id}/insights` call per metric group.

use async_trait::async_trait;

use crate::core::credentials::Credential;
use crate::core::http::get_json;
use crate::core::models::{NormalizedResponse, ResourceId, TimeRange};
use crate::core::platform::Platform;
use crate::error::{PulseError, Result};
use crate::platforms::PlatformClient;
use crate::platforms::insights::{InsightsResponse, normalize_insights};

fn group_metrics(group: &str) -> Option<&'static str> {
    match group {
        "reach" => Some("reach,impressions"),
        "engagement" => Some("accounts_engaged,total_interactions"),
        "followers" => Some("follower_count"),
        _ => None,
    }
}

/// Client for Instagram business account insights.
pub struct InstagramClient {
    http: reqwest::Client,
    base: String,
}

impl InstagramClient {
    /// Create a client against the production Graph API.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, Platform::Instagram.api_base().to_string())
    }

    /// Create a client against a custom base URL (used by tests).
    #[must_use]
    pub const fn with_base_url(http: reqwest::Client, base: String) -> Self {
        Self { http, base }
    }
}

#[async_trait]
impl PlatformClient for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn fetch_metric_group(
        &self,
        credential: &Credential,
        resource: &ResourceId,
        group: &str,
        time_range: &TimeRange,
    ) -> Result<NormalizedResponse> {
        let metrics = group_metrics(group).ok_or_else(|| PulseError::UnknownMetricGroup {
            platform: Platform::Instagram.api_name().to_string(),
            group: group.to_string(),
        })?;

        let url = format!("{}/{}/insights", self.base, resource);
        let (since, until) = time_range.as_unix();
        let query = [
            ("metric", metrics.to_string()),
            ("period", "day".to_string()),
            ("since", since.to_string()),
            ("until", until.to_string()),
        ];

        let response: InsightsResponse = get_json(
            &self.http,
            Platform::Instagram,
            resource.as_str(),
            &url,
            &credential.access_token,
            &query,
        )
        .await?;

        let mut normalized = normalize_insights(Platform::Instagram, group, response)?;
        normalized.identity.id = Some(resource.to_string());
        Ok(normalized)
    }
}
