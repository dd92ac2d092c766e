//! Call correlation.
//!
//! Every outbound call that expects an answer is registered here under its
//! [`CallId`] before it is transmitted. The delivery task completes it when
//! the matching response arrives; callers that give up purge it.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `insert` | Register a responder, refused once closed |
//! | `complete` | Remove and resolve, no-op for unknown ids |
//! | `purge` | Remove without resolving |
//! | `close_and_fail_all` | Refuse new calls, fail every pending one |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::CallId;
use crate::protocol::RemoteError;

use super::gate::Gate;

// ============================================================================
// IdSequence
// ============================================================================

/// Monotonic call ID generator shared by a connection and its sessions.
#[derive(Debug)]
pub struct IdSequence(AtomicU64);

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSequence {
    /// Creates a sequence starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Allocates the next ID.
    #[inline]
    pub fn next(&self) -> CallId {
        CallId::new(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Shared slot a gated call parks its outcome in.
pub type OutcomeSlot = Arc<Mutex<Option<Result<Value>>>>;

/// Where a call's outcome goes.
pub(crate) enum Responder {
    /// A caller awaiting the outcome.
    Waiter(oneshot::Sender<Result<Value>>),
    /// Best-effort: park the outcome and release an external gate.
    Gate { gate: Gate, slot: OutcomeSlot },
}

impl Responder {
    fn deliver(self, outcome: Result<Value>) {
        match self {
            Self::Waiter(tx) => {
                let _ = tx.send(outcome);
            }
            Self::Gate { gate, slot } => {
                *slot.lock() = Some(outcome);
                gate.release();
            }
        }
    }
}

// ============================================================================
// GatedCall
// ============================================================================

/// Handle to a call whose completion releases a caller-supplied gate.
#[derive(Debug, Clone)]
pub struct GatedCall {
    id: CallId,
    slot: OutcomeSlot,
}

impl GatedCall {
    pub(crate) fn new(id: CallId, slot: OutcomeSlot) -> Self {
        Self { id, slot }
    }

    /// Returns the call ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Takes the outcome once the gate has been released.
    pub fn take_outcome(&self) -> Option<Result<Value>> {
        self.slot.lock().take()
    }
}

// ============================================================================
// CallRegistry
// ============================================================================

struct PendingCall {
    method: String,
    responder: Responder,
}

#[derive(Default)]
struct RegistryState {
    pending: FxHashMap<CallId, PendingCall>,
    closed: bool,
}

/// Pending-call table of one connection or session.
#[derive(Default)]
pub struct CallRegistry {
    state: Mutex<RegistryState>,
}

impl fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CallRegistry")
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl CallRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call. Returns `false` if the registry is closed.
    pub(crate) fn insert(&self, id: CallId, method: &str, responder: Responder) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                responder,
            },
        );
        true
    }

    /// Registers a waiter and returns its receiver.
    pub fn insert_waiter(
        &self,
        id: CallId,
        method: &str,
    ) -> Option<oneshot::Receiver<Result<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.insert(id, method, Responder::Waiter(tx)).then_some(rx)
    }

    /// Resolves a pending call with a response outcome.
    ///
    /// Returns `false` if no call is registered under `id`; such responses
    /// are stale and dropped.
    pub fn complete(&self, id: CallId, outcome: std::result::Result<Value, RemoteError>) -> bool {
        let Some(call) = self.state.lock().pending.remove(&id) else {
            return false;
        };

        let outcome = outcome.map_err(|remote| Error::protocol(&call.method, remote.describe()));
        call.responder.deliver(outcome);
        true
    }

    /// Resolves a pending call with a local error.
    pub fn fail(&self, id: CallId, error: Error) -> bool {
        let Some(call) = self.state.lock().pending.remove(&id) else {
            return false;
        };

        call.responder.deliver(Err(error));
        true
    }

    /// Removes a pending call without resolving it.
    pub fn purge(&self, id: CallId) -> bool {
        self.state.lock().pending.remove(&id).is_some()
    }

    /// Closes the registry and fails every pending call with a target closed error.
    ///
    /// Returns the number of calls failed.
    pub fn close_and_fail_all(&self) -> usize {
        let drained: Vec<PendingCall> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.drain().map(|(_, call)| call).collect()
        };

        let count = drained.len();
        for call in drained {
            let error = Error::target_closed(&call.method);
            call.responder.deliver(Err(error));
        }

        if count > 0 {
            debug!(count, "Failed pending calls on close");
        }
        count
    }

    /// Awaits a registered waiter, purging it on timeout.
    pub(crate) async fn wait(
        &self,
        id: CallId,
        method: &str,
        rx: oneshot::Receiver<Result<Value>>,
        limit: Duration,
    ) -> Result<Value> {
        match timeout(limit, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::target_closed(method)),
            Err(_) => {
                self.purge(id);
                debug!(call_id = %id, method, "Purged timed-out call");
                Err(Error::request_timeout(id, method, limit.as_millis() as u64))
            }
        }
    }

    /// Returns `true` once the registry refuses new calls.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` if no calls are pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CallId) -> bool {
        self.state.lock().pending.contains_key(&id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    fn remote_error(message: &str) -> RemoteError {
        RemoteError {
            code: Some(-32000),
            message: message.to_string(),
            data: None,
        }
    }

    #[test]
    fn test_id_sequence_is_monotonic() {
        let ids = IdSequence::new();
        let first = ids.next();
        let second = ids.next();

        assert_eq!(first.as_u64(), 1);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_complete_resolves_waiter() {
        let registry = CallRegistry::new();
        let id = CallId::new(7);
        let rx = registry.insert_waiter(id, "Page.getFrameTree").expect("open");

        assert!(registry.complete(id, Ok(json!({ "frameTree": { "frame": {} } }))));
        assert!(!registry.contains(id));

        let result = rx.await.expect("delivered").expect("success");
        assert!(result.get("frameTree").is_some());
    }

    #[tokio::test]
    async fn test_remote_error_carries_method() {
        let registry = CallRegistry::new();
        let id = CallId::new(1);
        let rx = registry.insert_waiter(id, "Page.navigate").expect("open");

        registry.complete(id, Err(remote_error("Cannot navigate")));

        let err = rx.await.expect("delivered").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Protocol error (Page.navigate): Cannot navigate"
        );
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let registry = CallRegistry::new();
        assert!(!registry.complete(CallId::new(99), Ok(json!({}))));
    }

    #[tokio::test]
    async fn test_wait_timeout_purges_entry() {
        let registry = CallRegistry::new();
        let id = CallId::new(3);
        let rx = registry.insert_waiter(id, "Page.navigate").expect("open");

        let err = registry
            .wait(id, "Page.navigate", rx, Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(!registry.contains(id));
        assert!(!registry.complete(id, Ok(json!({}))));
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_refuses_new() {
        let registry = CallRegistry::new();
        let rx = registry.insert_waiter(CallId::new(1), "Runtime.enable").expect("open");

        assert_eq!(registry.close_and_fail_all(), 1);
        assert!(registry.is_closed());

        let err = rx.await.expect("delivered").unwrap_err();
        assert!(matches!(err, Error::TargetClosed { .. }));
        assert!(registry.insert_waiter(CallId::new(2), "Runtime.enable").is_none());
    }

    #[test]
    fn test_gated_call_parks_outcome() {
        let registry = CallRegistry::new();
        let gate = Gate::new();
        let slot = OutcomeSlot::default();
        let id = CallId::new(5);

        assert!(registry.insert(
            id,
            "Page.enable",
            Responder::Gate {
                gate: gate.clone(),
                slot: Arc::clone(&slot),
            },
        ));
        let call = GatedCall::new(id, slot);
        assert!(call.take_outcome().is_none());

        registry.complete(id, Ok(json!({})));

        assert!(gate.is_released());
        assert!(call.take_outcome().is_some_and(|outcome| outcome.is_ok()));
    }

    proptest! {
        #[test]
        fn prop_each_call_resolves_at_most_once(
            registered in 1u64..40,
            completions in prop::collection::vec(0u64..60, 0..120),
        ) {
            let registry = CallRegistry::new();
            let mut receivers: Vec<_> = (1..=registered)
                .map(|n| registry.insert_waiter(CallId::new(n), "Page.enable").expect("open"))
                .collect();

            let mut resolved = std::collections::HashSet::new();
            for n in completions {
                let delivered = registry.complete(CallId::new(n), Ok(json!({ "n": n })));
                let first_time = (1..=registered).contains(&n) && resolved.insert(n);
                prop_assert_eq!(delivered, first_time);
                prop_assert!(!registry.contains(CallId::new(n)));
            }

            for (index, rx) in receivers.iter_mut().enumerate() {
                let n = index as u64 + 1;
                let received = rx.try_recv().is_ok();
                prop_assert_eq!(received, resolved.contains(&n));
            }
            prop_assert_eq!(registry.len(), registered as usize - resolved.len());
        }
    }
}
