//! Shared harness for integration tests.
//!
//! Wires an orchestrator against a wiremock upstream with in-memory
//! collaborators, so each test only states its mock responses and
//! assertions.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use wiremock::MockServer;

use socialpulse::core::credentials::{CredentialCache, CredentialStore};
use socialpulse::core::platform::Platform;
use socialpulse::orchestrator::{FetchOrchestrator, SessionEvent, SessionHandle};
use socialpulse::platforms::ClientRegistry;
use socialpulse::storage::response_cache::ResponseCache;
use socialpulse::test_utils::{InMemoryCredentialStore, make_test_credential};

/// Orchestrator plus all its collaborators, pointed at a mock upstream.
pub struct Harness {
    pub server: MockServer,
    pub orchestrator: FetchOrchestrator,
    pub store: Arc<InMemoryCredentialStore>,
    pub credential_cache: Arc<CredentialCache>,
    pub response_cache: Arc<ResponseCache>,
}

impl Harness {
    /// Harness with a generous per-group timeout.
    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5)).await
    }

    /// Harness with a custom per-group timeout.
    pub async fn with_timeout(timeout: Duration) -> Self {
        let server = MockServer::start().await;
        let http = reqwest::Client::new();
        let clients = Arc::new(ClientRegistry::with_base_url(http, &server.uri()));

        let store = Arc::new(InMemoryCredentialStore::new());
        let credential_cache = Arc::new(CredentialCache::new());
        let response_cache = Arc::new(ResponseCache::open_in_memory().expect("open cache"));

        let orchestrator = FetchOrchestrator::new(
            Arc::clone(&credential_cache),
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            clients,
            Arc::clone(&response_cache),
        )
        .with_timeout(timeout);

        Self {
            server,
            orchestrator,
            store,
            credential_cache,
            response_cache,
        }
    }

    /// Seed a connected credential for a tenant/platform pair.
    pub fn seed_credential(&self, tenant: i64, platform: Platform) {
        self.store.insert(make_test_credential(tenant, platform));
    }
}

/// Drain events from a subscription until the terminal event arrives.
pub async fn collect_until_complete(
    rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("session did not complete in time")
            .expect("event channel closed before completion");
        let is_complete = matches!(event, SessionEvent::Complete { .. });
        events.push(event);
        if is_complete {
            return events;
        }
    }
}

/// Poll until the session reports complete, without subscribing.
pub async fn wait_until_complete(handle: &SessionHandle) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !handle.is_complete() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session did not complete in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
