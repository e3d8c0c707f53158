//! Facebook (Meta Graph API) page metrics client.
//!
//! Issues one `/{page_id}/insights` call per metric group. Insight values
//! arrive as nested arrays of time-bucketed values; normalization lives in
//! [`crate::platforms::insights`].

use async_trait::async_trait;

use crate::core::credentials::Credential;
use crate::core::http::get_json;
use crate::core::models::{NormalizedResponse, ResourceId, TimeRange};
use crate::core::platform::Platform;
use crate::error::{PulseError, Result};
use crate::platforms::PlatformClient;
use crate::platforms::insights::{InsightsResponse, normalize_insights};

/// Which upstream metrics one group maps to, and the period the insights
/// call is bucketed by.
struct GroupSpec {
    metrics: &'static str,
    period: &'static str,
}

fn group_spec(group: &str) -> Option<GroupSpec> {
    match group {
        "reach" => Some(GroupSpec {
            metrics: "page_impressions,page_impressions_unique",
            period: "day",
        }),
        "engagement" => Some(GroupSpec {
            metrics: "page_post_engagements,page_engaged_users",
            period: "day",
        }),
        "followers" => Some(GroupSpec {
            metrics: "page_fans",
            period: "lifetime",
        }),
        "clicks" => Some(GroupSpec {
            metrics: "page_total_actions,page_consumptions",
            period: "day",
        }),
        _ => None,
    }
}

/// Client for Facebook page insights.
pub struct FacebookClient {
    http: reqwest::Client,
    base: String,
}

impl FacebookClient {
    /// Create a client against the production Graph API.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, Platform::Facebook.api_base().to_string())
    }

    /// Create a client against a custom base URL (used by tests).
    #[must_use]
    pub const fn with_base_url(http: reqwest::Client, base: String) -> Self {
        Self { http, base }
    }
}

#[async_trait]
impl PlatformClient for FacebookClient {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn fetch_metric_group(
        &self,
        credential: &Credential,
        resource: &ResourceId,
        group: &str,
        time_range: &TimeRange,
    ) -> Result<NormalizedResponse> {
        let spec = group_spec(group).ok_or_else(|| PulseError::UnknownMetricGroup {
            platform: Platform::Facebook.api_name().to_string(),
            group: group.to_string(),
        })?;

        let url = format!("{}/{}/insights", self.base, resource);
        let (since, until) = time_range.as_unix();
        let query = [
            ("metric", spec.metrics.to_string()),
            ("period", spec.period.to_string()),
            ("since", since.to_string()),
            ("until", until.to_string()),
        ];

        let response: InsightsResponse = get_json(
            &self.http,
            Platform::Facebook,
            resource.as_str(),
            &url,
            &credential.access_token,
            &query,
        )
        .await?;

        let mut normalized = normalize_insights(Platform::Facebook, group, response)?;
        normalized.identity.id = Some(resource.to_string());
        Ok(normalized)
    }
}
