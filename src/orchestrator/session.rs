//! Fetch session state and event surface.
//!
//! A session tracks one (tenant, platform, resource) fetch across its
//! metric groups. Per-group state transitions are strictly monotonic:
//! `Pending → Loading → {Succeeded | Failed}`, never backward, enforced
//! here rather than trusted to callers.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::core::models::{CacheKey, NormalizedResponse};
use crate::error::ErrorClass;
use crate::storage::response_cache::Staleness;

// =============================================================================
// Group State
// =============================================================================

/// Payload delivered for a succeeded group, live or cache-substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPayload {
    pub data: NormalizedResponse,

    /// True when a failed live fetch was answered from the response cache.
    pub served_from_cache: bool,

    /// When the substituted payload was originally fetched. `None` for live
    /// data.
    pub last_fetched_at: Option<DateTime<Utc>>,

    /// Staleness badge for substituted data. `None` for live data.
    pub staleness: Option<Staleness>,
}

impl GroupPayload {
    /// Wrap a live fetch result.
    #[must_use]
    pub const fn live(data: NormalizedResponse) -> Self {
        Self {
            data,
            served_from_cache: false,
            last_fetched_at: None,
            staleness: None,
        }
    }
}

/// State of one metric group within a session.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricGroupState {
    Pending,
    Loading,
    Succeeded(GroupPayload),
    Failed(ErrorClass),
}

impl MetricGroupState {
    /// Whether this state ends the group's lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }

    /// Label for logs and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Loading => "loading",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }

    /// Ordering rank used to enforce monotonic transitions.
    const fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Loading => 1,
            Self::Succeeded(_) | Self::Failed(_) => 2,
        }
    }
}

// =============================================================================
// Session Events
// =============================================================================

/// Event delivered to subscribers as groups resolve.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// One group changed state.
    GroupUpdate {
        group: String,
        state: MetricGroupState,
    },
    /// Every group reached a terminal state.
    Complete {
        /// Merge of every succeeded group's payload, live and substituted.
        merged: NormalizedResponse,
        /// Groups that ended `Failed`, with their error class.
        failed_groups: Vec<(String, ErrorClass)>,
    },
}

// =============================================================================
// Session State Snapshot
// =============================================================================

/// Snapshot of a session, for late subscribers to catch up without
/// re-fetching.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub key: CacheKey,
    pub groups: BTreeMap<String, MetricGroupState>,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    /// Whether every group is terminal.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.groups.values().all(MetricGroupState::is_terminal)
    }

    /// Merge of every succeeded group's payload.
    #[must_use]
    pub fn merged_payload(&self) -> NormalizedResponse {
        let mut merged = NormalizedResponse::new();
        for state in self.groups.values() {
            if let MetricGroupState::Succeeded(payload) = state {
                merged.merge(payload.data.clone());
            }
        }
        merged
    }

    /// Groups that ended `Failed`.
    #[must_use]
    pub fn failed_groups(&self) -> Vec<(String, ErrorClass)> {
        self.groups
            .iter()
            .filter_map(|(group, state)| match state {
                MetricGroupState::Failed(class) => Some((group.clone(), *class)),
                _ => None,
            })
            .collect()
    }
}

// =============================================================================
// Session Handle
// =============================================================================

/// Handle to one running (or finished) fetch session.
///
/// Cloneable by `Arc`; the orchestrator keeps a weak reference for
/// coalescing, the consumer holds the strong one.
pub struct SessionHandle {
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    cancelled: AtomicBool,
    complete: AtomicBool,
}

impl SessionHandle {
    pub(crate) fn new(key: CacheKey, groups: &[&str], channel_capacity: usize) -> Self {
        let group_states = groups
            .iter()
            .map(|g| ((*g).to_string(), MetricGroupState::Pending))
            .collect();
        let (events, _) = broadcast::channel(channel_capacity);

        Self {
            state: RwLock::new(SessionState {
                key,
                groups: group_states,
                created_at: Utc::now(),
            }),
            events,
            cancelled: AtomicBool::new(false),
            complete: AtomicBool::new(false),
        }
    }

    /// Subscribe to session events. Events emitted before subscribing are
    /// not replayed; use [`SessionHandle::current_state`] to catch up.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Synchronous snapshot of the session.
    #[must_use]
    pub fn current_state(&self) -> SessionState {
        self.read_state().clone()
    }

    /// The session's cache key.
    #[must_use]
    pub fn key(&self) -> CacheKey {
        self.read_state().key.clone()
    }

    /// Stop delivering notifications. In-flight upstream calls run to
    /// completion and may still write through to the response cache.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        tracing::debug!(key = %self.read_state().key, "session cancelled by caller");
    }

    /// Whether the caller cancelled this session.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether every group reached a terminal state.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    /// Requested group names.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        self.read_state().groups.keys().cloned().collect()
    }

    /// Transition a group, enforcing monotonicity. Returns whether the
    /// transition was applied. A refused transition is a bug upstream, so
    /// it logs at warn.
    pub(crate) fn set_group_state(&self, group: &str, next: MetricGroupState) -> bool {
        let applied = {
            let mut state = self
                .state
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match state.groups.get_mut(group) {
                Some(current) if next.rank() > current.rank() => {
                    *current = next.clone();
                    true
                }
                Some(current) => {
                    tracing::warn!(
                        group,
                        from = current.as_str(),
                        to = next.as_str(),
                        "refusing non-monotonic group transition"
                    );
                    false
                }
                None => {
                    tracing::warn!(group, "transition for unknown group");
                    false
                }
            }
        };

        if applied {
            self.emit(SessionEvent::GroupUpdate {
                group: group.to_string(),
                state: next,
            });
        }
        applied
    }

    /// Mark the session complete and emit the terminal event.
    pub(crate) fn finish(&self) {
        self.complete.store(true, Ordering::SeqCst);
        let (merged, failed_groups) = {
            let state = self.read_state();
            (state.merged_payload(), state.failed_groups())
        };
        self.emit(SessionEvent::Complete {
            merged,
            failed_groups,
        });
    }

    /// Deliver an event unless the consumer detached.
    fn emit(&self, event: SessionEvent) {
        if self.is_cancelled() {
            return;
        }
        // A send error only means no subscriber is currently listening.
        let _ = self.events.send(event);
    }

    pub(crate) fn emit_initial_pending(&self) {
        let groups: Vec<String> = self.group_names();
        for group in groups {
            self.emit(SessionEvent::GroupUpdate {
                group,
                state: MetricGroupState::Pending,
            });
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Period, TenantId};
    use crate::core::platform::Platform;

    fn make_handle(groups: &[&str]) -> SessionHandle {
        let key = CacheKey::new(TenantId(1), Platform::Facebook, "page-1");
        SessionHandle::new(key, groups, 16)
    }

    fn payload(value: f64) -> GroupPayload {
        let mut data = NormalizedResponse::new();
        data.insert("metric", Period::Day, value);
        GroupPayload::live(data)
    }

    #[test]
    fn groups_start_pending() {
        let handle = make_handle(&["followers", "engagement"]);
        let state = handle.current_state();

        assert_eq!(state.groups.len(), 2);
        assert!(
            state
                .groups
                .values()
                .all(|s| *s == MetricGroupState::Pending)
        );
        assert!(!state.is_complete());
    }

    #[test]
    fn forward_transitions_apply() {
        let handle = make_handle(&["followers"]);

        assert!(handle.set_group_state("followers", MetricGroupState::Loading));
        assert!(handle.set_group_state("followers", MetricGroupState::Succeeded(payload(1.0))));
        assert!(handle.current_state().is_complete());
    }

    #[test]
    fn terminal_states_do_not_revert() {
        let handle = make_handle(&["followers"]);

        handle.set_group_state("followers", MetricGroupState::Loading);
        handle.set_group_state("followers", MetricGroupState::Failed(ErrorClass::Upstream));

        assert!(!handle.set_group_state("followers", MetricGroupState::Loading));
        assert!(
            !handle.set_group_state("followers", MetricGroupState::Succeeded(payload(2.0)))
        );

        match &handle.current_state().groups["followers"] {
            MetricGroupState::Failed(class) => assert_eq!(*class, ErrorClass::Upstream),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn loading_does_not_revert_to_pending() {
        let handle = make_handle(&["followers"]);
        handle.set_group_state("followers", MetricGroupState::Loading);
        assert!(!handle.set_group_state("followers", MetricGroupState::Pending));
    }

    #[test]
    fn unknown_group_is_refused() {
        let handle = make_handle(&["followers"]);
        assert!(!handle.set_group_state("engagement", MetricGroupState::Loading));
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let handle = make_handle(&["followers"]);
        let mut rx = handle.subscribe();

        handle.set_group_state("followers", MetricGroupState::Loading);
        handle.set_group_state("followers", MetricGroupState::Succeeded(payload(9.0)));
        handle.finish();

        match rx.recv().await.expect("loading event") {
            SessionEvent::GroupUpdate { group, state } => {
                assert_eq!(group, "followers");
                assert_eq!(state, MetricGroupState::Loading);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.expect("succeeded event") {
            SessionEvent::GroupUpdate { state, .. } => {
                assert!(matches!(state, MetricGroupState::Succeeded(_)));
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.expect("complete event") {
            SessionEvent::Complete { merged, failed_groups } => {
                assert_eq!(merged.get("metric", Period::Day), Some(9.0));
                assert!(failed_groups.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_session_stops_delivering() {
        let handle = make_handle(&["followers"]);
        let mut rx = handle.subscribe();

        handle.cancel();
        handle.set_group_state("followers", MetricGroupState::Loading);
        handle.finish();

        // State still advanced, but nothing was delivered.
        assert!(handle.is_complete());
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn merged_payload_unions_succeeded_groups() {
        let handle = make_handle(&["a", "b", "c"]);

        let mut first = NormalizedResponse::new();
        first.insert("followers", Period::Lifetime, 10.0);
        let mut second = NormalizedResponse::new();
        second.insert("engagement", Period::Day, 5.0);

        handle.set_group_state("a", MetricGroupState::Succeeded(GroupPayload::live(first)));
        handle.set_group_state("b", MetricGroupState::Succeeded(GroupPayload::live(second)));
        handle.set_group_state("c", MetricGroupState::Failed(ErrorClass::RateLimited));

        let state = handle.current_state();
        let merged = state.merged_payload();
        assert_eq!(merged.get("followers", Period::Lifetime), Some(10.0));
        assert_eq!(merged.get("engagement", Period::Day), Some(5.0));
        assert_eq!(state.failed_groups(), vec![("c".to_string(), ErrorClass::RateLimited)]);
    }
}
