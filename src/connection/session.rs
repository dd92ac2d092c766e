//! Session bound to one target.
//!
//! A session shares its connection's transport and call ID space but keeps
//! its own pending calls and listeners. Every outbound call carries the
//! session ID so responses and events route back here.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, SessionId, SubscriptionId};
use crate::protocol::{Command, Envelope, ProtocolEvent, TargetCommand};

use super::core::ConnectionInner;
use super::emitter::EventEmitter;
use super::gate::Gate;
use super::options::ConnectionOptions;
use super::registry::{CallRegistry, GatedCall, OutcomeSlot, Responder};

// ============================================================================
// CdpSession
// ============================================================================

/// A logical channel to one target, multiplexed over a [`Connection`](super::Connection).
///
/// Cloning shares the same session.
#[derive(Clone)]
pub struct CdpSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    session_id: SessionId,
    target_type: String,
    /// Cleared on close.
    connection: RwLock<Option<Weak<ConnectionInner>>>,
    callbacks: CallRegistry,
    emitter: EventEmitter<ProtocolEvent>,
    options: ConnectionOptions,
}

impl fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpSession")
            .field("session_id", &self.inner.session_id)
            .field("target_type", &self.inner.target_type)
            .field("pending", &self.inner.callbacks.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl CdpSession {
    pub(crate) fn new(
        connection: Weak<ConnectionInner>,
        session_id: SessionId,
        target_type: String,
        options: ConnectionOptions,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                session_id,
                target_type,
                connection: RwLock::new(Some(connection)),
                callbacks: CallRegistry::new(),
                emitter: EventEmitter::new(),
                options,
            }),
        }
    }

    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Returns the target type (`page`, `iframe`, `worker`, ...).
    #[inline]
    #[must_use]
    pub fn target_type(&self) -> &str {
        &self.inner.target_type
    }

    /// Returns the options inherited from the connection.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Returns `true` once the session has been closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.connection.read().is_none()
    }

    /// Returns the number of pending session calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.callbacks.len()
    }

    fn connection(&self, method: &str) -> Result<Arc<ConnectionInner>> {
        self.inner
            .connection
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|connection| !connection.is_closed())
            .ok_or_else(|| self.closed_error(method))
    }

    #[inline]
    fn closed_error(&self, method: &str) -> Error {
        Error::session_closed(method, &self.inner.target_type)
    }
}

// ============================================================================
// CdpSession - Sending
// ============================================================================

impl CdpSession {
    /// Sends a call and waits for its result with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session was closed
    /// - [`Error::Protocol`] if the remote end answered with an error
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::TargetClosed`] if the session closed while waiting
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, self.inner.options.command_timeout)
            .await
    }

    /// Sends a call and waits up to `limit` for its result.
    ///
    /// A zero `limit` uses the default command timeout.
    ///
    /// # Errors
    ///
    /// See [`CdpSession::send`].
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        limit: Duration,
    ) -> Result<Value> {
        let limit = self.inner.options.resolve_command_timeout(limit);
        let (id, rx) = {
            let connection = self.connection(method)?;
            connection
                .dispatch_waiting(
                    &self.inner.callbacks,
                    method,
                    &params,
                    Some(&self.inner.session_id),
                )
                .map_err(|e| match e {
                    Error::TargetClosed { .. } => self.closed_error(method),
                    other => other,
                })?
        };

        self.inner.callbacks.wait(id, method, rx, limit).await
    }

    /// Sends a typed command and waits for its result.
    ///
    /// # Errors
    ///
    /// See [`CdpSession::send`].
    pub async fn send_command(&self, command: Command) -> Result<Value> {
        let (method, params) = command.into_parts()?;
        self.send(&method, params).await
    }

    /// Sends a call without registering for its response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session was closed.
    pub fn send_and_forget(&self, method: &str, params: Value) -> Result<CallId> {
        let connection = self.connection(method)?;
        connection.dispatch_and_forget(method, &params, Some(&self.inner.session_id))
    }

    /// Sends a typed command without registering for its response.
    ///
    /// # Errors
    ///
    /// See [`CdpSession::send_and_forget`].
    pub fn send_command_and_forget(&self, command: Command) -> Result<CallId> {
        let (method, params) = command.into_parts()?;
        self.send_and_forget(&method, params)
    }

    /// Sends a call whose outcome releases `gate` instead of blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session was closed.
    pub fn send_with_gate(&self, method: &str, params: Value, gate: &Gate) -> Result<GatedCall> {
        let connection = self.connection(method)?;
        let slot = OutcomeSlot::default();
        let responder = Responder::Gate {
            gate: gate.clone(),
            slot: Arc::clone(&slot),
        };

        let id = connection
            .dispatch(
                &self.inner.callbacks,
                method,
                &params,
                Some(&self.inner.session_id),
                Some(responder),
            )
            .map_err(|e| match e {
                Error::TargetClosed { .. } => self.closed_error(method),
                other => other,
            })?;

        Ok(GatedCall::new(id, slot))
    }

    /// Asks the browser to detach this session.
    ///
    /// Teardown follows when the detach broadcast arrives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session was already closed.
    pub fn detach(&self) -> Result<()> {
        let command = Command::Target(TargetCommand::DetachFromTarget {
            session_id: self.inner.session_id.clone(),
        });
        let (method, params) = command.into_parts()?;

        let connection = self.connection(&method)?;
        connection.dispatch_and_forget(&method, &params, None)?;

        debug!(session_id = %self.inner.session_id, "Detach requested");
        Ok(())
    }
}

// ============================================================================
// CdpSession - Routing & Lifecycle
// ============================================================================

impl CdpSession {
    /// Subscribes to session events by method name.
    pub fn on<F>(&self, method: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&ProtocolEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.on(method, listener)
    }

    /// Removes a session listener.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.emitter.off(id)
    }

    /// Routes one envelope addressed to this session.
    pub(crate) fn on_message(&self, mut envelope: Envelope) {
        if let Some(id) = envelope.id {
            if !self.inner.callbacks.complete(id, envelope.into_outcome()) {
                debug!(session_id = %self.inner.session_id, call_id = %id, "Stale response dropped");
            }
            return;
        }

        match envelope.method.take() {
            Some(method) => {
                let event = ProtocolEvent::decode(&method, envelope.take_params());
                self.inner.emitter.emit(&event);
            }
            None => warn!(session_id = %self.inner.session_id, "Session frame has neither id nor method"),
        }
    }

    /// Tears the session down.
    ///
    /// Fails every pending call and publishes [`ProtocolEvent::Disconnected`]
    /// to session listeners. Later calls do nothing.
    pub(crate) fn on_closed(&self) {
        if self.inner.connection.write().take().is_none() {
            return;
        }

        self.inner.callbacks.close_and_fail_all();
        debug!(session_id = %self.inner.session_id, "Session closed");

        self.inner.emitter.emit(&ProtocolEvent::Disconnected);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::connection::Connection;
    use crate::error::Error;
    use crate::identifiers::SessionId;
    use crate::protocol::ProtocolEvent;
    use crate::protocol::event::method;
    use crate::testing::{RecordingTransport, attach_frame, detach_frame, init_tracing};

    fn two_sessions() -> (Connection, RecordingTransport) {
        init_tracing();
        let transport = RecordingTransport::new();
        let connection = Connection::new(Arc::new(transport.clone()), Default::default());
        connection.on_message(&attach_frame("A", "page"));
        connection.on_message(&attach_frame("B", "iframe"));
        (connection, transport)
    }

    #[tokio::test]
    async fn test_calls_are_tagged_with_session_id() {
        let (connection, mut transport) = two_sessions();
        let session = connection.session(&SessionId::new("A")).expect("session");

        let caller = {
            let session = session.clone();
            tokio::spawn(async move { session.send("Runtime.enable", json!({})).await })
        };

        let call = transport.next_call().await;
        assert_eq!(call["sessionId"], "A");
        assert_eq!(session.pending_count(), 1);
        assert_eq!(connection.pending_count(), 0);

        connection.on_message(&json!({ "id": call["id"], "result": {}, "sessionId": "A" }).to_string());
        caller.await.expect("join").expect("result");
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_session_isolation() {
        let (connection, mut transport) = two_sessions();
        let a = connection.session(&SessionId::new("A")).expect("a");
        let b = connection.session(&SessionId::new("B")).expect("b");

        let a_events = Arc::new(AtomicUsize::new(0));
        let b_events = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&a_events);
        a.on(method::FRAME_DETACHED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&b_events);
        b.on(method::FRAME_DETACHED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let caller = {
            let b = b.clone();
            tokio::spawn(async move { b.send("Page.enable", json!({})).await })
        };
        let id = transport.next_call().await["id"].clone();

        // A response for B's call id tagged with A's session is not B's.
        connection.on_message(&json!({ "id": id, "result": {}, "sessionId": "A" }).to_string());
        assert_eq!(b.pending_count(), 1);

        connection.on_message(
            &json!({ "method": "Page.frameDetached", "params": { "frameId": "F" }, "sessionId": "A" })
                .to_string(),
        );
        assert_eq!(a_events.load(Ordering::SeqCst), 1);
        assert_eq!(b_events.load(Ordering::SeqCst), 0);

        connection.on_message(&json!({ "id": id, "result": {}, "sessionId": "B" }).to_string());
        caller.await.expect("join").expect("result");
    }

    #[tokio::test]
    async fn test_detach_broadcast_fails_pending_and_notifies() {
        let (connection, mut transport) = two_sessions();
        let session = connection.session(&SessionId::new("A")).expect("session");

        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disconnects);
        session.on(method::DISCONNECTED, move |event| {
            assert!(matches!(event, ProtocolEvent::Disconnected));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let caller = {
            let session = session.clone();
            tokio::spawn(async move { session.send("Page.reload", json!({})).await })
        };
        transport.next_call().await;

        connection.on_message(&detach_frame("A"));
        connection.on_message(&detach_frame("A"));

        let err = caller.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::TargetClosed { .. }));
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_after_close_fails_without_io() {
        let (connection, mut transport) = two_sessions();
        let session = connection.session(&SessionId::new("B")).expect("session");
        connection.on_message(&detach_frame("B"));

        let err = session.send_and_forget("Page.enable", json!({})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Protocol error (Page.enable): Session closed. Most likely the iframe has been closed."
        );
        assert!(transport.try_next_call().is_none());
    }

    #[tokio::test]
    async fn test_detach_sends_on_root_channel() {
        let (connection, mut transport) = two_sessions();
        let session = connection.session(&SessionId::new("A")).expect("session");

        session.detach().expect("detach");

        let call = transport.next_call().await;
        assert_eq!(call["method"], "Target.detachFromTarget");
        assert_eq!(call["params"]["sessionId"], "A");
        assert!(call.get("sessionId").is_none());
    }
}
