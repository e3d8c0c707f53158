//! HTTP client utilities.
//!
//! Provides a shared HTTP client for all platform clients, plus the single
//! place where an upstream response is turned into either parsed JSON or a
//! classified error.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::core::platform::Platform;
use crate::error::{PulseError, Result};

/// Default timeout for HTTP requests. Per-platform overrides come from
/// [`Platform::default_timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("socialpulse/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PulseError::Network {
            platform: "client".to_string(),
            message: e.to_string(),
        })
}

/// Get or create a default HTTP client.
pub fn default_client() -> Result<Client> {
    build_client(DEFAULT_TIMEOUT)
}

/// Issue an authenticated GET and deserialize the JSON body.
///
/// Non-success statuses become the matching classified error; a body that is
/// not valid JSON for `T` becomes `Malformed`. No retries happen here — the
/// orchestrator owns retry and fallback decisions.
///
/// # Errors
///
/// Returns a classified error on transport failure, non-2xx status, or
/// undecodable body.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    platform: Platform,
    resource: &str,
    url: &str,
    token: &str,
    query: &[(&str, String)],
) -> Result<T> {
    let response = client
        .get(url)
        .bearer_auth(token)
        .query(query)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                PulseError::Timeout {
                    platform: platform.api_name().to_string(),
                    seconds: platform.default_timeout().as_secs(),
                }
            } else {
                PulseError::Network {
                    platform: platform.api_name().to_string(),
                    message: e.to_string(),
                }
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        return Err(PulseError::from_status(
            platform.api_name(),
            resource,
            status,
            retry_after,
            &body,
        ));
    }

    response.json().await.map_err(|e| PulseError::Malformed {
        platform: platform.api_name().to_string(),
        message: e.to_string(),
    })
}

/// Read a `Retry-After` seconds header if the upstream sent one.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_succeeds() {
        assert!(build_client(Duration::from_secs(5)).is_ok());
        assert!(default_client().is_ok());
    }
}
