//! Platform clients.
//!
//! One client per platform, each translating a (credential, resource,
//! metric group, time range) tuple into a single upstream call and a
//! [`NormalizedResponse`] or a classified error. Clients never retry:
//! retry and fallback policy belong to the orchestrator, so that
//! serve-stale and retry-with-backoff are never conflated.

pub mod facebook;
pub mod insights;
pub mod instagram;
pub mod linkedin;
pub mod x;

use async_trait::async_trait;

use crate::core::credentials::Credential;
use crate::core::http::{DEFAULT_TIMEOUT, build_client};
use crate::core::models::{NormalizedResponse, ResourceId, TimeRange};
use crate::core::platform::Platform;
use crate::error::Result;

pub use facebook::FacebookClient;
pub use instagram::InstagramClient;
pub use linkedin::LinkedInClient;
pub use x::XClient;

// =============================================================================
// Platform Client Trait
// =============================================================================

/// A client for one platform's metrics API.
///
/// One call fetches exactly one metric group; fan-out across groups is the
/// orchestrator's job, which keeps each call's failure blast radius to a
/// single group.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// The platform this client talks to.
    fn platform(&self) -> Platform;

    /// Fetch one metric group for a resource.
    ///
    /// # Errors
    ///
    /// Returns a classified error; never retries internally.
    async fn fetch_metric_group(
        &self,
        credential: &Credential,
        resource: &ResourceId,
        group: &str,
        time_range: &TimeRange,
    ) -> Result<NormalizedResponse>;
}

// =============================================================================
// Client Registry
// =============================================================================

/// All platform clients over one shared HTTP client.
pub struct ClientRegistry {
    facebook: FacebookClient,
    instagram: InstagramClient,
    linkedin: LinkedInClient,
    x: XClient,
}

impl ClientRegistry {
    /// Build a registry from a shared HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            facebook: FacebookClient::new(http.clone()),
            instagram: InstagramClient::new(http.clone()),
            linkedin: LinkedInClient::new(http.clone()),
            x: XClient::new(http),
        }
    }

    /// Build a registry with a default-configured HTTP client.
    ///
    /// # Errors
    ///
    /// Returns error if client construction fails.
    pub fn with_default_client() -> Result<Self> {
        Ok(Self::new(build_client(DEFAULT_TIMEOUT)?))
    }

    /// Build a registry with every client pointed at one base URL, for
    /// tests against a mock upstream.
    #[must_use]
    pub fn with_base_url(http: reqwest::Client, base: &str) -> Self {
        Self {
            facebook: FacebookClient::with_base_url(http.clone(), base.to_string()),
            instagram: InstagramClient::with_base_url(http.clone(), base.to_string()),
            linkedin: LinkedInClient::with_base_url(http.clone(), base.to_string()),
            x: XClient::with_base_url(http, base.to_string()),
        }
    }

    /// Dispatch to the client for a platform.
    #[must_use]
    pub fn client_for(&self, platform: Platform) -> &dyn PlatformClient {
        match platform {
            Platform::Facebook => &self.facebook,
            Platform::Instagram => &self.instagram,
            Platform::LinkedIn => &self.linkedin,
            Platform::X => &self.x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_dispatches_every_platform() {
        let registry = ClientRegistry::with_default_client().expect("registry");
        for platform in Platform::ALL {
            assert_eq!(registry.client_for(*platform).platform(), *platform);
        }
    }
}
