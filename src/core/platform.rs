//! Platform descriptors.
//!
//! Defines the supported social media platforms and their metadata: API base
//! URLs, per-platform timeouts, and the metric groups each platform exposes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PulseError, Result};

// =============================================================================
// Platform Enum
// =============================================================================

/// Supported social media platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    LinkedIn,
    X,
}

impl Platform {
    /// All platforms in display order.
    pub const ALL: &'static [Self] = &[Self::Facebook, Self::Instagram, Self::LinkedIn, Self::X];

    /// Canonical lowercase name, used in cache keys, credential rows, and
    /// log fields.
    #[must_use]
    pub const fn api_name(self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::LinkedIn => "linkedin",
            Self::X => "x",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::LinkedIn => "LinkedIn",
            Self::X => "X",
        }
    }

    /// Parse from the canonical name.
    pub fn from_api_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.api_name() == lower)
            .copied()
            .ok_or_else(|| PulseError::InvalidPlatform(name.to_string()))
    }

    /// Upstream API base URL.
    #[must_use]
    pub const fn api_base(self) -> &'static str {
        match self {
            Self::Facebook | Self::Instagram => "https://graph.facebook.com/v19.0",
            Self::LinkedIn => "https://api.linkedin.com/v2",
            Self::X => "https://api.x.com/2",
        }
    }

    /// Bounded timeout for one metric-group fetch against this platform.
    ///
    /// Graph API insight queries are noticeably slower than the flat-counter
    /// endpoints, so they get more headroom.
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        match self {
            Self::Facebook | Self::Instagram => Duration::from_secs(15),
            Self::LinkedIn | Self::X => Duration::from_secs(10),
        }
    }

    /// Metric groups this platform exposes, one upstream call each.
    #[must_use]
    pub const fn default_metric_groups(self) -> &'static [&'static str] {
        match self {
            Self::Facebook => &["reach", "engagement", "followers", "clicks"],
            Self::Instagram => &["reach", "engagement", "followers"],
            Self::LinkedIn => &["followers", "shares"],
            Self::X => &["followers", "engagement"],
        }
    }

    /// Whether `group` is a known metric group for this platform.
    #[must_use]
    pub fn supports_metric_group(self, group: &str) -> bool {
        self.default_metric_groups().contains(&group)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_name())
    }
}
