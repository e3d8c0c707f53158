//! LinkedIn organization metrics client.
//!
//! Unlike the Graph platforms, LinkedIn reports flat counters: follower
//! counts from `networkSizes` and lifetime share statistics from
//! `organizationalEntityShareStatistics`. Everything normalizes under
//! `Period::Lifetime`.

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

/// Response from `/networkSizes/{urn}?edgeType=COMPANY_FOLLOWED_BY_MEMBER`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkSizeResponse {
    first_degree_size: i64,
}

/// Response from `/organizationalEntityShareStatistics`.
#[derive(Debug, Deserialize)]
struct ShareStatisticsResponse {
    elements: Vec<ShareStatisticsElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareStatisticsElement {
    total_share_statistics: ShareStatistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareStatistics {
    #[serde(default)]
    share_count: i64,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    comment_count: i64,
    #[serde(default)]
    click_count: i64,
    #[serde(default)]
    impression_count: i64,
    #[serde(default)]
    engagement: f64,
}

// =============================================================================
// Client
// =============================================================================

/// Client for LinkedIn organization pages.
pub struct LinkedInClient {
    http: reqwest::Client,
    base: String,
}

impl LinkedInClient {
    /// Create a client against the production API.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, Platform::LinkedIn.api_base().to_string())
    }

    /// Create a client against a custom base URL (used by tests).
    #[must_use]
    pub const fn with_base_url(http: reqwest::Client, base: String) -> Self {
        Self { http, base }
    }

    async fn fetch_followers(
        &self,
        credential: &Credential,
        resource: &ResourceId,
    ) -> Result<NormalizedResponse> {
        let url = format!("{}/networkSizes/{}", self.base, resource);
        let query = [("edgeType", "COMPANY_FOLLOWED_BY_MEMBER".to_string())];

        let response: NetworkSizeResponse = get_json(
            &self.http,
            Platform::LinkedIn,
            resource.as_str(),
            &url,
            &credential.access_token,
            &query,
        )
        .await?;

        let mut normalized = NormalizedResponse::new();
        #[allow(clippy::cast_precision_loss)]
        normalized.insert(
            "followers",
            Period::Lifetime,
            response.first_degree_size as f64,
        );
        normalized.identity.id = Some(resource.to_string());
        Ok(normalized)
    }

    async fn fetch_shares(
        &self,
        credential: &Credential,
        resource: &ResourceId,
    ) -> Result<NormalizedResponse> {
        let url = format!("{}/organizationalEntityShareStatistics", self.base);
        let query = [
            ("q", "organizationalEntity".to_string()),
            ("organizationalEntity", resource.to_string()),
        ];

        let response: ShareStatisticsResponse = get_json(
            &self.http,
            Platform::LinkedIn,
            resource.as_str(),
            &url,
            &credential.access_token,
            &query,
        )
        .await?;

        let stats = response
            .elements
            .into_iter()
            .next()
            .map(|e| e.total_share_statistics)
            .ok_or_else(|| PulseError::Malformed {
                platform: Platform::LinkedIn.api_name().to_string(),
                message: "share statistics response has no elements".to_string(),
            })?;

        let mut normalized = NormalizedResponse::new();
        #[allow(clippy::cast_precision_loss)]
        {
            normalized.insert("share_count", Period::Lifetime, stats.share_count as f64);
            normalized.insert("like_count", Period::Lifetime, stats.like_count as f64);
            normalized.insert("comment_count", Period::Lifetime, stats.comment_count as f64);
            normalized.insert("click_count", Period::Lifetime, stats.click_count as f64);
            normalized.insert(
                "impression_count",
                Period::Lifetime,
                stats.impression_count as f64,
            );
        }
        normalized.insert("engagement", Period::Lifetime, stats.engagement);
        normalized.identity.id = Some(resource.to_string());
        Ok(normalized)
    }
}

#[async_trait]
impl PlatformClient for LinkedInClient {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn fetch_metric_group(
        &self,
        credential: &Credential,
        resource: &ResourceId,
        group: &str,
        _time_range: &TimeRange,
    ) -> Result<NormalizedResponse> {
        match group {
            "followers" => self.fetch_followers(credential, resource).await,
            "shares" => self.fetch_shares(credential, resource).await,
            _ => Err(PulseError::UnknownMetricGroup {
                platform: Platform::LinkedIn.api_name().to_string(),
                group: group.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_size_parses() {
        let response: NetworkSizeResponse =
            serde_json::from_str(r#"{"firstDegreeSize": 980}"#).expect("parse");
        assert_eq!(response.first_degree_size, 980);
    }

    #[test]
    fn share_statistics_default_missing_counters() {
        let response: ShareStatisticsResponse = serde_json::from_str(
            r#"{"elements": [{"totalShareStatistics": {"shareCount": 12, "engagement": 0.042}}]}"#,
        )
        .expect("parse");

        let stats = &response.elements[0].total_share_statistics;
        assert_eq!(stats.share_count, 12);
        assert_eq!(stats.like_count, 0);
        assert!((stats.engagement - 0.042).abs() < f64::EPSILON);
    }
}
