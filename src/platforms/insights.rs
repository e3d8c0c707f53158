//! Graph API insights response shape, shared by the Facebook and Instagram
//! clients.
//!
//! Insight responses are nested arrays of time-bucketed values:
//!
//! ```json
//! {"data": [{"name": "page_fans", "period": "lifetime",
//!            "values": [{"value": 1204, "end_time": "..."}]}]}
//! ```
//!
//! Normalization takes the latest value per (metric, period). Conversion to
//! the common shape happens here, once, at the client boundary — nothing
//! downstream sees raw insight JSON.

use serde::Deserialize;

use crate::core::models::{NormalizedResponse, Period};
use crate::core::platform::Platform;
use crate::error::{PulseError, Result};

/// Top-level insights envelope.
#[derive(Debug, Deserialize)]
pub struct InsightsResponse {
    pub data: Vec<InsightMetric>,
}

/// One metric's time-bucketed series.
#[derive(Debug, Deserialize)]
pub struct InsightMetric {
    pub name: String,
    pub period: String,

    #[serde(default)]
    pub values: Vec<InsightValue>,
}

/// One time bucket. `value` may be a number or a per-type breakdown object;
/// only numeric values are normalized.
#[derive(Debug, Deserialize)]
pub struct InsightValue {
    #[serde(default)]
    pub value: serde_json::Value,

    #[serde(default)]
    pub end_time: Option<String>,
}

/// Normalize an insights envelope, taking the latest numeric value per
/// metric.
///
/// # Errors
///
/// Returns `Malformed` when the envelope carries no insight data at all —
/// an empty `data` array means the group's metrics do not exist for this
/// resource, which downstream code cannot distinguish from a partial
/// outage without this signal.
pub fn normalize_insights(
    platform: Platform,
    group: &str,
    response: InsightsResponse,
) -> Result<NormalizedResponse> {
    if response.data.is_empty() {
        return Err(PulseError::Malformed {
            platform: platform.api_name().to_string(),
            message: format!("no insight data for group '{group}'"),
        });
    }

    let mut normalized = NormalizedResponse::new();

    for metric in response.data {
        let Some(period) = Period::from_api(&metric.period) else {
            tracing::debug!(
                platform = %platform,
                metric = %metric.name,
                period = %metric.period,
                "skipping unknown insight period"
            );
            continue;
        };

        // Buckets arrive oldest-first; the last numeric bucket is the
        // latest value.
        let latest = metric.values.iter().rev().find_map(|v| v.value.as_f64());
        if let Some(value) = latest {
            normalized.insert(metric.name, period, value);
        }
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> InsightsResponse {
        serde_json::from_str(json).expect("parse insights")
    }

    #[test]
    fn takes_latest_value_per_metric() {
        let response = parse(
            r#"{"data": [
                {"name": "page_impressions", "period": "day", "values": [
                    {"value": 100, "end_time": "2026-08-01T07:00:00+0000"},
                    {"value": 140, "end_time": "2026-08-02T07:00:00+0000"}
                ]},
                {"name": "page_fans", "period": "lifetime", "values": [
                    {"value": 1204}
                ]}
            ]}"#,
        );

        let normalized =
            normalize_insights(Platform::Facebook, "reach", response).expect("normalize");

        assert_eq!(normalized.get("page_impressions", Period::Day), Some(140.0));
        assert_eq!(normalized.get("page_fans", Period::Lifetime), Some(1204.0));
    }

    #[test]
    fn empty_data_is_malformed() {
        let response = parse(r#"{"data": []}"#);
        let err = normalize_insights(Platform::Instagram, "reach", response).expect_err("err");
        assert_eq!(err.classify(), crate::error::ErrorClass::Malformed);
    }

    #[test]
    fn skips_object_valued_buckets() {
        let response = parse(
            r#"{"data": [
                {"name": "page_fans_by_like_source", "period": "day", "values": [
                    {"value": {"search": 3, "feed": 9}}
                ]},
                {"name": "page_fans", "period": "lifetime", "values": [
                    {"value": 55}
                ]}
            ]}"#,
        );

        let normalized =
            normalize_insights(Platform::Facebook, "followers", response).expect("normalize");

        assert!(normalized.get("page_fans_by_like_source", Period::Day).is_none());
        assert_eq!(normalized.get("page_fans", Period::Lifetime), Some(55.0));
    }

    #[test]
    fn skips_unknown_periods() {
        let response = parse(
            r#"{"data": [
                {"name": "page_fans", "period": "quarter", "values": [{"value": 10}]},
                {"name": "page_fans", "period": "week", "values": [{"value": 12}]}
            ]}"#,
        );

        let normalized =
            normalize_insights(Platform::Facebook, "followers", response).expect("normalize");

        assert_eq!(normalized.get("page_fans", Period::Week), Some(12.0));
        assert_eq!(normalized.metric_count(), 1);
    }

    #[test]
    fn metric_with_no_numeric_buckets_is_omitted() {
        let response = parse(
            r#"{"data": [
                {"name": "page_impressions", "period": "day", "values": []}
            ]}"#,
        );

        let normalized =
            normalize_insights(Platform::Facebook, "reach", response).expect("normalize");
        assert!(normalized.is_empty());
    }
}
