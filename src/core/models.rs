//! Core data models.
//!
//! The central type is [`NormalizedResponse`]: every platform client
//! converts its upstream's idiosyncratic shape into this one structure at
//! the client boundary, so the orchestrator, cache, and consumers never see
//! raw platform JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::platform::Platform;

// =============================================================================
// Identifiers
// =============================================================================

/// A tenant (company) identifier. The unit of data isolation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A platform-side resource identifier (page id, profile id, organization
/// URN).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uniquely identifies one cached response and one fetch session target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub tenant: TenantId,
    pub platform: Platform,
    pub resource: ResourceId,
}

impl CacheKey {
    #[must_use]
    pub fn new(tenant: TenantId, platform: Platform, resource: impl Into<ResourceId>) -> Self {
        Self {
            tenant,
            platform,
            resource: resource.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.tenant, self.platform, self.resource)
    }
}

// =============================================================================
// Time Range
// =============================================================================

/// Inclusive time range for a metrics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeRange {
    /// Range covering the last `days` days, ending now.
    #[must_use]
    pub fn last_days(days: i64) -> Self {
        let until = Utc::now();
        Self {
            since: until - ChronoDuration::days(days),
            until,
        }
    }

    /// Unix timestamps for platforms that take epoch-second query params.
    #[must_use]
    pub fn as_unix(&self) -> (i64, i64) {
        (self.since.timestamp(), self.until.timestamp())
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::last_days(28)
    }
}

// =============================================================================
// Period
// =============================================================================

/// Aggregation period of one metric value.
///
/// Graph API insights are bucketed per period; flat-counter platforms
/// (LinkedIn, X) report lifetime totals.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Days28,
    Lifetime,
}

impl Period {
    /// Canonical name as used by the Graph API `period` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Days28 => "days_28",
            Self::Lifetime => "lifetime",
        }
    }

    /// Parse a Graph API period string. Unknown periods map to `None`.
    #[must_use]
    pub fn from_api(s: &str) -> Option<Self> {
        match s {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "days_28" => Some(Self::Days28),
            "lifetime" => Some(Self::Lifetime),
            _ => None,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Normalized Response
// =============================================================================

/// Identity fields for the fetched resource (page name, profile handle).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ResourceIdentity {
    /// Merge identity fields, preferring already-present values.
    fn fill_from(&mut self, other: Self) {
        if self.id.is_none() {
            self.id = other.id;
        }
        if self.name.is_none() {
            self.name = other.name;
        }
    }
}

/// The common response shape all platform clients converge to:
/// `{metric name -> {period -> latest value}}` plus identity fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    #[serde(default)]
    pub identity: ResourceIdentity,

    #[serde(default)]
    pub metrics: BTreeMap<String, BTreeMap<Period, f64>>,
}

impl NormalizedResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest value for a metric/period pair.
    pub fn insert(&mut self, metric: impl Into<String>, period: Period, value: f64) {
        self.metrics.entry(metric.into()).or_default().insert(period, value);
    }

    /// Look up a metric value.
    #[must_use]
    pub fn get(&self, metric: &str, period: Period) -> Option<f64> {
        self.metrics.get(metric).and_then(|m| m.get(&period)).copied()
    }

    /// Merge `other` into this response. Per-metric-period values are
    /// last-write-wins; identity fields already present are kept.
    pub fn merge(&mut self, other: Self) {
        self.identity.fill_from(other.identity);
        for (metric, periods) in other.metrics {
            let entry = self.metrics.entry(metric).or_default();
            for (period, value) in periods {
                entry.insert(period, value);
            }
        }
    }

    /// Whether any metric values are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Number of distinct metrics.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }
}

// =============================================================================
// Fetch Status
// =============================================================================

/// Outcome recorded with a persisted cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Error,
}

impl FetchStatus {
    /// Stable string used in the persisted row.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Parse a persisted status string. Unknown values read as `Error` so a
    /// corrupt row is never mistaken for servable data.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        if s == "success" { Self::Success } else { Self::Error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_display() {
        let key = CacheKey::new(TenantId(42), Platform::Facebook, "page-7");
        assert_eq!(key.to_string(), "42:facebook:page-7");
    }

    #[test]
    fn period_roundtrip() {
        for period in [Period::Day, Period::Week, Period::Days28, Period::Lifetime] {
            assert_eq!(Period::from_api(period.as_str()), Some(period));
        }
        assert_eq!(Period::from_api("fortnight"), None);
    }

    #[test]
    fn normalized_response_insert_and_get() {
        let mut resp = NormalizedResponse::new();
        resp.insert("page_fans", Period::Lifetime, 1204.0);
        resp.insert("page_impressions", Period::Day, 310.0);

        assert_eq!(resp.get("page_fans", Period::Lifetime), Some(1204.0));
        assert_eq!(resp.get("page_impressions", Period::Week), None);
        assert_eq!(resp.metric_count(), 2);
    }

    #[test]
    fn merge_is_last_write_wins_per_metric() {
        let mut base = NormalizedResponse::new();
        base.insert("followers", Period::Lifetime, 100.0);
        base.identity.name = Some("Acme".to_string());

        let mut update = NormalizedResponse::new();
        update.insert("followers", Period::Lifetime, 120.0);
        update.insert("engagement", Period::Day, 9.0);
        update.identity.name = Some("Other".to_string());
        update.identity.id = Some("p1".to_string());

        base.merge(update);

        assert_eq!(base.get("followers", Period::Lifetime), Some(120.0));
        assert_eq!(base.get("engagement", Period::Day), Some(9.0));
        // Existing identity fields win; missing ones are filled.
        assert_eq!(base.identity.name.as_deref(), Some("Acme"));
        assert_eq!(base.identity.id.as_deref(), Some("p1"));
    }

    #[test]
    fn fetch_status_lossy_parse() {
        assert_eq!(FetchStatus::from_str_lossy("success"), FetchStatus::Success);
        assert_eq!(FetchStatus::from_str_lossy("error"), FetchStatus::Error);
        assert_eq!(FetchStatus::from_str_lossy("garbage"), FetchStatus::Error);
    }

    #[test]
    fn time_range_unix_ordering() {
        let range = TimeRange::last_days(7);
        let (since, until) = range.as_unix();
        assert!(since < until);
    }
}
