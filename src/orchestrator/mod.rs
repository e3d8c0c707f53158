//! Progressive fetch orchestrator.
//!
//! Given a tenant + platform + resource + metric groups, issues one
//! platform-client call per group, tracks per-group state, and emits
//! incremental updates to subscribers as each group resolves — the UI can
//! show "followers: 1,204" while "engagement" is still in flight.
//!
//! Groups are independent: a failure in one group never cancels or blocks
//! the others. A failed group falls back to the persisted response cache
//! when its error class allows it (see
//! [`ErrorClass::should_serve_stale`](crate::error::ErrorClass::should_serve_stale)).

pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::core::config::AggregatorConfig;
use crate::core::credentials::{Credential, CredentialCache, CredentialStore};
use crate::core::models::{CacheKey, FetchStatus, NormalizedResponse, TenantId, TimeRange};
use crate::core::platform::Platform;
use crate::error::{ErrorClass, PulseError, Result};
use crate::platforms::ClientRegistry;
use crate::storage::credential_store::SqliteCredentialStore;
use crate::storage::response_cache::ResponseCache;

pub use session::{GroupPayload, MetricGroupState, SessionEvent, SessionHandle, SessionState};

/// Default capacity of a session's event channel. Sized for the worst case
/// of every group emitting two updates plus the terminal event, with slack
/// for slow subscribers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

type InFlightMap = Mutex<HashMap<CacheKey, Weak<SessionHandle>>>;

// =============================================================================
// Fetch Orchestrator
// =============================================================================

/// Fans metric-group fetches out per session and applies the
/// serve-stale-on-failure policy.
///
/// Explicitly constructed and passed by reference; owns no global state.
pub struct FetchOrchestrator {
    credential_cache: Arc<CredentialCache>,
    credential_store: Arc<dyn CredentialStore>,
    clients: Arc<ClientRegistry>,
    response_cache: Arc<ResponseCache>,
    timeout_override: Option<Duration>,
    channel_capacity: usize,
    in_flight: Arc<InFlightMap>,
}

impl FetchOrchestrator {
    /// Create an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        credential_cache: Arc<CredentialCache>,
        credential_store: Arc<dyn CredentialStore>,
        clients: Arc<ClientRegistry>,
        response_cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            credential_cache,
            credential_store,
            clients,
            response_cache,
            timeout_override: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build a fully-wired orchestrator from resolved configuration: the
    /// SQLite-backed stores on the configured database, a
    /// default-configured HTTP client, and a credential cache with the
    /// configured TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache database cannot be opened or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &AggregatorConfig) -> Result<Self> {
        let credential_cache = Arc::new(CredentialCache::with_ttl(config.credential_ttl));
        let credential_store = Arc::new(SqliteCredentialStore::open(&config.cache_db_path)?);
        let clients = Arc::new(ClientRegistry::with_default_client()?);
        let response_cache = Arc::new(ResponseCache::open(&config.cache_db_path)?);

        let mut orchestrator = Self::new(credential_cache, credential_store, clients, response_cache);
        if let Some(timeout) = config.timeout {
            orchestrator = orchestrator.with_timeout(timeout);
        }
        Ok(orchestrator)
    }

    /// Override the per-group timeout instead of using each platform's
    /// default.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Override the event channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// The shared response cache, for consumers that need direct reads.
    #[must_use]
    pub fn response_cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.response_cache)
    }

    /// Start a fetch session for the platform's default metric groups.
    ///
    /// Must be called within a tokio runtime.
    pub fn start_default(
        &self,
        tenant: TenantId,
        platform: Platform,
        resource: &str,
        time_range: TimeRange,
    ) -> Arc<SessionHandle> {
        self.start(
            tenant,
            platform,
            resource,
            platform.default_metric_groups(),
            time_range,
        )
    }

    /// Start a fetch session.
    ///
    /// Concurrent `start` calls for the same key and group set coalesce
    /// into one in-flight session: callers get the same handle and can
    /// subscribe independently. A completed or cancelled session is never
    /// reused — retry is a new session.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        &self,
        tenant: TenantId,
        platform: Platform,
        resource: &str,
        groups: &[&str],
        time_range: TimeRange,
    ) -> Arc<SessionHandle> {
        let key = CacheKey::new(tenant, platform, resource);

        let mut requested: Vec<String> = groups.iter().map(|g| (*g).to_string()).collect();
        requested.sort_unstable();
        requested.dedup();

        {
            let mut in_flight = lock_in_flight(&self.in_flight);
            if let Some(existing) = in_flight.get(&key).and_then(Weak::upgrade)
                && !existing.is_complete()
                && !existing.is_cancelled()
                && existing.group_names() == requested
            {
                tracing::debug!(key = %key, "coalescing duplicate session start");
                return existing;
            }

            let handle = Arc::new(SessionHandle::new(
                key.clone(),
                &requested.iter().map(String::as_str).collect::<Vec<_>>(),
                self.channel_capacity,
            ));
            in_flight.insert(key.clone(), Arc::downgrade(&handle));
            drop(in_flight);

            tracing::info!(key = %key, groups = ?requested, "fetch session started");
            handle.emit_initial_pending();

            tokio::spawn(run_session(SessionContext {
                handle: Arc::clone(&handle),
                credential_cache: Arc::clone(&self.credential_cache),
                credential_store: Arc::clone(&self.credential_store),
                clients: Arc::clone(&self.clients),
                response_cache: Arc::clone(&self.response_cache),
                in_flight: Arc::clone(&self.in_flight),
                key,
                time_range,
                timeout: self
                    .timeout_override
                    .unwrap_or_else(|| platform.default_timeout()),
            }));

            handle
        }
    }
}

// =============================================================================
// Session Driver
// =============================================================================

struct SessionContext {
    handle: Arc<SessionHandle>,
    credential_cache: Arc<CredentialCache>,
    credential_store: Arc<dyn CredentialStore>,
    clients: Arc<ClientRegistry>,
    response_cache: Arc<ResponseCache>,
    in_flight: Arc<InFlightMap>,
    key: CacheKey,
    time_range: TimeRange,
    timeout: Duration,
}

async fn run_session(ctx: SessionContext) {
    let groups = ctx.handle.group_names();

    // No group-level fetch is attempted without a credential: a resolution
    // failure terminates every group at once.
    let credential = match ctx
        .credential_cache
        .resolve(ctx.credential_store.as_ref(), ctx.key.tenant, ctx.key.platform)
        .await
    {
        Ok(credential) => credential,
        Err(e) => {
            tracing::warn!(key = %ctx.key, error = %e, "credential resolution failed");
            for group in &groups {
                ctx.handle
                    .set_group_state(group, MetricGroupState::Failed(ErrorClass::CredentialUnavailable));
            }
            finish_session(&ctx, None);
            return;
        }
    };

    let mut tasks = Vec::with_capacity(groups.len());
    for group in groups {
        let task = tokio::spawn(run_group(GroupContext {
            handle: Arc::clone(&ctx.handle),
            clients: Arc::clone(&ctx.clients),
            response_cache: Arc::clone(&ctx.response_cache),
            credential: credential.clone(),
            key: ctx.key.clone(),
            group: group.clone(),
            time_range: ctx.time_range,
            timeout: ctx.timeout,
        }));
        tasks.push((group, task));
    }

    let (group_order, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = futures::future::join_all(handles).await;

    let mut live_merged = NormalizedResponse::new();
    let mut live_count = 0usize;
    for (group, result) in group_order.into_iter().zip(results) {
        match result {
            Ok(Some(live)) => {
                live_merged.merge(live);
                live_count += 1;
            }
            Ok(None) => {}
            Err(e) => {
                // A panicked group task must not leave its group pending.
                tracing::error!(key = %ctx.key, group = %group, error = %e, "group task aborted");
                ctx.handle
                    .set_group_state(&group, MetricGroupState::Failed(ErrorClass::Upstream));
            }
        }
    }

    let live = (live_count > 0).then_some(live_merged);
    finish_session(&ctx, live);
}

/// Write-through and emit the terminal event.
///
/// Write-through happens only when every group succeeded (live or
/// substituted) and carries only live data — substituted payloads are never
/// re-persisted as if they were fresh. Cancellation does not suppress the
/// write: the data is still valuable to the next reader.
fn finish_session(ctx: &SessionContext, live: Option<NormalizedResponse>) {
    let state = ctx.handle.current_state();
    let all_succeeded = state
        .groups
        .values()
        .all(|s| matches!(s, MetricGroupState::Succeeded(_)));

    if all_succeeded && let Some(live) = live {
        ctx.response_cache
            .store_data(&ctx.key, &live, FetchStatus::Success);
    }

    ctx.handle.finish();
    tracing::info!(
        key = %ctx.key,
        failed = state.failed_groups().len(),
        "fetch session complete"
    );

    let mut in_flight = lock_in_flight(&ctx.in_flight);
    if let Some(stored) = in_flight.get(&ctx.key)
        && stored.as_ptr() == Arc::as_ptr(&ctx.handle)
    {
        in_flight.remove(&ctx.key);
    }
}

// =============================================================================
// Group Runner
// =============================================================================

struct GroupContext {
    handle: Arc<SessionHandle>,
    clients: Arc<ClientRegistry>,
    response_cache: Arc<ResponseCache>,
    credential: Credential,
    key: CacheKey,
    group: String,
    time_range: TimeRange,
    timeout: Duration,
}

/// Drive one metric group to a terminal state. Returns the live payload
/// when the group succeeded against the upstream, `None` when it failed or
/// was answered from cache.
async fn run_group(ctx: GroupContext) -> Option<NormalizedResponse> {
    ctx.handle.set_group_state(&ctx.group, MetricGroupState::Loading);

    let client = ctx.clients.client_for(ctx.key.platform);
    let result = match tokio::time::timeout(
        ctx.timeout,
        client.fetch_metric_group(&ctx.credential, &ctx.key.resource, &ctx.group, &ctx.time_range),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(PulseError::Timeout {
            platform: ctx.key.platform.api_name().to_string(),
            seconds: ctx.timeout.as_secs(),
        }),
    };

    match result {
        Ok(data) => {
            tracing::debug!(key = %ctx.key, group = %ctx.group, "group fetch succeeded");
            ctx.handle.set_group_state(
                &ctx.group,
                MetricGroupState::Succeeded(GroupPayload::live(data.clone())),
            );
            Some(data)
        }
        Err(e) => {
            let class = e.classify();
            tracing::warn!(
                key = %ctx.key,
                group = %ctx.group,
                class = %class,
                error = %e,
                "group fetch failed"
            );

            if class.should_serve_stale()
                && let Some(entry) = ctx.response_cache.get_data(&ctx.key)
                && entry.is_servable()
            {
                ctx.response_cache.metrics().record_fallback_hit();
                let staleness = entry.staleness();
                tracing::info!(
                    key = %ctx.key,
                    group = %ctx.group,
                    staleness = staleness.as_str(),
                    "serving stale cache entry for failed group"
                );
                ctx.handle.set_group_state(
                    &ctx.group,
                    MetricGroupState::Succeeded(GroupPayload {
                        data: entry.payload,
                        served_from_cache: true,
                        last_fetched_at: Some(entry.last_fetched_at),
                        staleness: Some(staleness),
                    }),
                );
                return None;
            }

            ctx.handle
                .set_group_state(&ctx.group, MetricGroupState::Failed(class));
            None
        }
    }
}

fn lock_in_flight(
    in_flight: &InFlightMap,
) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Weak<SessionHandle>>> {
    in_flight
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
