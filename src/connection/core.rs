//! Connection multiplexing sessions over one transport.
//!
//! # Routing
//!
//! Each inbound frame is handled in this order:
//!
//! | Frame | Handling |
//! |-------|----------|
//! | `Target.attachedToTarget` | Register a new session |
//! | `Target.detachedFromTarget` | Tear down and unregister the session |
//! | has `sessionId` | Forward to that session |
//! | has `id` | Complete a pending connection-level call |
//! | has `method` | Publish to connection listeners |
//!
//! # Delivery
//!
//! One delivery task per connection drains inbound frames in arrival order
//! and routes each synchronously. Listeners run on that task and must not
//! await protocol calls inline; they spawn instead.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, SessionId, SubscriptionId, TargetId};
use crate::protocol::{
    ATTACHED_TO_TARGET, AttachedToTarget, Command, DETACHED_FROM_TARGET, DetachedFromTarget,
    Envelope, OutboundCall, ProtocolEvent, TargetCommand,
};
use crate::transport::{Transport, WebSocketTransport};

use super::emitter::EventEmitter;
use super::gate::Gate;
use super::options::ConnectionOptions;
use super::registry::{CallRegistry, GatedCall, IdSequence, OutcomeSlot, Responder};
use super::session::CdpSession;

// ============================================================================
// Connection
// ============================================================================

/// A protocol connection over one transport.
///
/// Cloning shares the same connection.
///
/// # Example
///
/// ```ignore
/// let connection = Connection::connect(ws_url, ConnectionOptions::new()).await?;
/// let session = connection.create_session(&target_id).await?;
/// let tree = session.send("Page.getFrameTree", json!({})).await?;
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// Shared connection state.
pub(crate) struct ConnectionInner {
    /// Outbound half of the transport.
    transport: Arc<dyn Transport>,
    /// Call IDs shared with every session.
    ids: IdSequence,
    /// Connection-level pending calls.
    callbacks: CallRegistry,
    /// Active sessions.
    sessions: RwLock<FxHashMap<SessionId, CdpSession>>,
    /// Connection-level listeners.
    emitter: EventEmitter<ProtocolEvent>,
    /// Set once by `dispose`.
    closed: AtomicBool,
    /// Configuration shared with sessions.
    options: ConnectionOptions,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.inner.transport)
            .field("sessions", &self.session_count())
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Construction
// ============================================================================

impl Connection {
    /// Creates a connection without a delivery task.
    ///
    /// Inbound frames must be fed through [`Connection::on_message`].
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, options: ConnectionOptions) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                transport,
                ids: IdSequence::new(),
                callbacks: CallRegistry::new(),
                sessions: RwLock::new(FxHashMap::default()),
                emitter: EventEmitter::new(),
                closed: AtomicBool::new(false),
                options,
            }),
        }
    }

    /// Creates a connection and spawns its delivery task.
    ///
    /// The task routes every frame from `inbound` in order and disposes the
    /// connection when the channel ends.
    #[must_use]
    pub fn attach(
        transport: Arc<dyn Transport>,
        inbound: mpsc::UnboundedReceiver<String>,
        options: ConnectionOptions,
    ) -> Self {
        let slow_mo = options.slow_mo;
        let connection = Self::new(transport, options);

        tokio::spawn(Self::run_delivery_loop(
            Arc::downgrade(&connection.inner),
            inbound,
            slow_mo,
        ));

        connection
    }

    /// Connects to a DevTools WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is not a WebSocket URL
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(url: &str, options: ConnectionOptions) -> Result<Self> {
        let (transport, inbound) = WebSocketTransport::connect(url).await?;
        Ok(Self::attach(Arc::new(transport), inbound, options))
    }

    /// Delivery loop draining inbound frames.
    async fn run_delivery_loop(
        inner: Weak<ConnectionInner>,
        mut inbound: mpsc::UnboundedReceiver<String>,
        slow_mo: Duration,
    ) {
        while let Some(text) = inbound.recv().await {
            if !slow_mo.is_zero() {
                sleep(slow_mo).await;
            }

            let Some(inner) = inner.upgrade() else {
                break;
            };
            Self { inner }.on_message(&text);
        }

        if let Some(inner) = inner.upgrade() {
            Self { inner }.dispose();
        }

        debug!("Delivery loop terminated");
    }
}

// ============================================================================
// Connection - Sending
// ============================================================================

impl Connection {
    /// Sends a call and waits for its result with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection was disposed
    /// - [`Error::Protocol`] if the remote end answered with an error
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::TargetClosed`] if the connection closed while waiting
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, self.inner.options.command_timeout)
            .await
    }

    /// Sends a call and waits up to `limit` for its result.
    ///
    /// A zero `limit` uses the default command timeout. A timed-out call is
    /// purged, so a late response for it is dropped.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        limit: Duration,
    ) -> Result<Value> {
        let limit = self.inner.options.resolve_command_timeout(limit);
        let (id, rx) = self
            .inner
            .dispatch_waiting(&self.inner.callbacks, method, &params, None)
            .map_err(|e| self.closed_or(e))?;

        self.inner.callbacks.wait(id, method, rx, limit).await
    }

    /// Sends a typed command and waits for its result.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub async fn send_command(&self, command: Command) -> Result<Value> {
        let (method, params) = command.into_parts()?;
        self.send(&method, params).await
    }

    /// Sends a call without registering for its response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection was disposed.
    pub fn send_and_forget(&self, method: &str, params: Value) -> Result<CallId> {
        self.ensure_open()?;
        self.inner.dispatch_and_forget(method, &params, None)
    }

    /// Sends a call whose outcome releases `gate` instead of blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection was disposed.
    pub fn send_with_gate(&self, method: &str, params: Value, gate: &Gate) -> Result<GatedCall> {
        self.ensure_open()?;
        let slot = OutcomeSlot::default();
        let responder = Responder::Gate {
            gate: gate.clone(),
            slot: Arc::clone(&slot),
        };

        let id = self
            .inner
            .dispatch(&self.inner.callbacks, method, &params, None, Some(responder))
            .map_err(|e| self.closed_or(e))?;

        Ok(GatedCall::new(id, slot))
    }

    /// Attaches to a target in flat mode and returns its session.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`] if no attach broadcast registered the session
    /// - Any error from [`Connection::send`]
    pub async fn create_session(&self, target_id: &TargetId) -> Result<CdpSession> {
        let command = Command::Target(TargetCommand::AttachToTarget {
            target_id: target_id.clone(),
            flatten: true,
        });

        let result = self.send_command(command).await?;
        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .map(SessionId::from)
            .ok_or_else(|| Error::protocol("Target.attachToTarget", "response has no sessionId"))?;

        self.session(&session_id)
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    #[inline]
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    #[inline]
    fn closed_or(&self, error: Error) -> Error {
        if self.is_closed() {
            Error::ConnectionClosed
        } else {
            error
        }
    }
}

// ============================================================================
// Connection - Routing
// ============================================================================

impl Connection {
    /// Routes one inbound text frame.
    ///
    /// Malformed frames are logged and dropped.
    pub fn on_message(&self, text: &str) {
        trace!(len = text.len(), "Frame received");

        let mut envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Failed to parse inbound frame");
                return;
            }
        };

        if matches!(envelope.method.as_deref(), Some(ATTACHED_TO_TARGET)) {
            self.on_attached_to_target(envelope.take_params());
            return;
        }
        if matches!(envelope.method.as_deref(), Some(DETACHED_FROM_TARGET)) {
            self.on_detached_from_target(envelope.take_params());
            return;
        }

        if let Some(session_id) = envelope.session_id.clone() {
            match self.session(&session_id) {
                Some(session) => session.on_message(envelope),
                None => debug!(session_id = %session_id, "Frame for unknown session dropped"),
            }
            return;
        }

        if let Some(id) = envelope.id {
            if !self.inner.callbacks.complete(id, envelope.into_outcome()) {
                debug!(call_id = %id, "Stale response dropped");
            }
            return;
        }

        match envelope.method.take() {
            Some(method) => {
                let event = ProtocolEvent::decode(&method, envelope.take_params());
                self.inner.emitter.emit(&event);
            }
            None => warn!("Inbound frame has neither id nor method"),
        }
    }

    fn on_attached_to_target(&self, params: Value) {
        let attached: AttachedToTarget = match serde_json::from_value(params) {
            Ok(attached) => attached,
            Err(e) => {
                warn!(error = %e, "Malformed attach broadcast");
                return;
            }
        };

        if self.is_closed() {
            return;
        }

        let session = CdpSession::new(
            Arc::downgrade(&self.inner),
            attached.session_id.clone(),
            attached.target_info.target_type.clone(),
            self.inner.options.clone(),
        );

        debug!(
            session_id = %attached.session_id,
            target_type = %attached.target_info.target_type,
            "Session attached"
        );
        self.inner
            .sessions
            .write()
            .insert(attached.session_id, session);
    }

    fn on_detached_from_target(&self, params: Value) {
        let detached: DetachedFromTarget = match serde_json::from_value(params) {
            Ok(detached) => detached,
            Err(e) => {
                warn!(error = %e, "Malformed detach broadcast");
                return;
            }
        };

        let removed = self.inner.sessions.write().remove(&detached.session_id);
        match removed {
            Some(session) => {
                debug!(session_id = %detached.session_id, "Session detached");
                session.on_closed();
            }
            None => debug!(session_id = %detached.session_id, "Detach for unknown session"),
        }
    }
}

// ============================================================================
// Connection - Events & Lifecycle
// ============================================================================

impl Connection {
    /// Subscribes to connection-level events by method name.
    pub fn on<F>(&self, method: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&ProtocolEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.on(method, listener)
    }

    /// Removes a connection-level listener.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.emitter.off(id)
    }

    /// Closes the connection.
    ///
    /// Fails every pending call, closes every session, closes the transport
    /// and publishes [`ProtocolEvent::Disconnected`]. Later calls do nothing.
    pub fn dispose(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.callbacks.close_and_fail_all();

        let sessions: Vec<CdpSession> = self.inner.sessions.write().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.on_closed();
        }

        self.inner.transport.close();
        debug!("Connection disposed");

        self.inner.emitter.emit(&ProtocolEvent::Disconnected);
    }

    /// Returns the session registered under `session_id`.
    #[must_use]
    pub fn session(&self, session_id: &SessionId) -> Option<CdpSession> {
        self.inner.sessions.read().get(session_id).cloned()
    }

    /// Returns the number of active sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Returns the number of pending connection-level calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.callbacks.len()
    }

    /// Returns `true` once the connection has been disposed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns the connection options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }
}

// ============================================================================
// ConnectionInner - Dispatch
// ============================================================================

impl ConnectionInner {
    /// Allocates an ID, registers `responder` and transmits the call.
    ///
    /// Registration happens before transmission so a fast response always
    /// finds its entry.
    pub(crate) fn dispatch(
        &self,
        registry: &CallRegistry,
        method: &str,
        params: &Value,
        session_id: Option<&SessionId>,
        responder: Option<Responder>,
    ) -> Result<CallId> {
        let id = self.ids.next();
        let text = OutboundCall {
            id,
            method,
            params,
            session_id,
        }
        .to_text()?;

        let registered = responder.is_some();
        if let Some(responder) = responder
            && !registry.insert(id, method, responder)
        {
            return Err(Error::target_closed(method));
        }

        if let Err(e) = self.transport.send(text) {
            if registered {
                registry.purge(id);
            }
            return Err(e);
        }

        trace!(call_id = %id, method, session_id = ?session_id, "Frame sent");
        Ok(id)
    }

    /// Dispatches a call with a oneshot waiter.
    pub(crate) fn dispatch_waiting(
        &self,
        registry: &CallRegistry,
        method: &str,
        params: &Value,
        session_id: Option<&SessionId>,
    ) -> Result<(CallId, tokio::sync::oneshot::Receiver<Result<Value>>)> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let id = self.dispatch(registry, method, params, session_id, Some(Responder::Waiter(tx)))?;
        Ok((id, rx))
    }

    /// Transmits a call no one waits for.
    pub(crate) fn dispatch_and_forget(
        &self,
        method: &str,
        params: &Value,
        session_id: Option<&SessionId>,
    ) -> Result<CallId> {
        self.dispatch(&self.callbacks, method, params, session_id, None)
    }

    /// Returns `true` once the connection has been disposed.
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use crate::testing::{RecordingTransport, attach_frame, detach_frame, init_tracing};

    fn connection() -> (Connection, RecordingTransport) {
        init_tracing();
        let transport = RecordingTransport::new();
        let connection = Connection::new(Arc::new(transport.clone()), ConnectionOptions::new());
        (connection, transport)
    }

    #[tokio::test]
    async fn test_response_unblocks_caller() {
        let (connection, mut transport) = connection();

        let caller = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.send("Page.getFrameTree", json!({})).await })
        };

        let call = transport.next_call().await;
        assert_eq!(call["method"], "Page.getFrameTree");
        let id = call["id"].as_u64().expect("id");

        connection.on_message(&json!({ "id": id, "result": { "frameTree": { "frame": {} } } }).to_string());

        let result = caller.await.expect("join").expect("result");
        assert!(result.get("frameTree").is_some());
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_reaches_caller() {
        let (connection, mut transport) = connection();

        let caller = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.send("Target.getTargets", json!({})).await })
        };

        let id = transport.next_call().await["id"].as_u64().expect("id");
        connection.on_message(
            &json!({ "id": id, "error": { "code": -32601, "message": "Method not found" } })
                .to_string(),
        );

        let err = caller.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("Target.getTargets"));
    }

    #[tokio::test]
    async fn test_timeout_purges_and_drops_late_response() {
        let (connection, mut transport) = connection();

        let err = connection
            .send_with_timeout("Page.navigate", json!({ "url": "about:blank" }), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(connection.pending_count(), 0);

        let late_id = transport.next_call().await["id"].as_u64().expect("id");

        let other = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.send("Runtime.enable", json!({})).await })
        };
        let other_id = transport.next_call().await["id"].as_u64().expect("id");

        connection.on_message(&json!({ "id": late_id, "result": {} }).to_string());
        assert_eq!(connection.pending_count(), 1);

        connection.on_message(&json!({ "id": other_id, "result": { "ok": true } }).to_string());
        let result = other.await.expect("join").expect("result");
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn test_ids_unique_across_sessions() {
        let (connection, mut transport) = connection();
        connection.on_message(&attach_frame("S1", "page"));

        let session = connection.session(&SessionId::new("S1")).expect("session");
        session.send_and_forget("Page.enable", json!({})).expect("send");
        connection.send_and_forget("Target.setDiscoverTargets", json!({})).expect("send");

        let first = transport.next_call().await;
        let second = transport.next_call().await;
        assert_eq!(first["sessionId"], "S1");
        assert!(second.get("sessionId").is_none());
        assert_ne!(first["id"], second["id"]);
    }

    #[tokio::test]
    async fn test_attach_and_detach_manage_sessions() {
        let (connection, _transport) = connection();

        connection.on_message(&attach_frame("S1", "page"));
        assert_eq!(connection.session_count(), 1);
        let session = connection.session(&SessionId::new("S1")).expect("session");
        assert_eq!(session.target_type(), "page");

        connection.on_message(&detach_frame("S1"));
        assert_eq!(connection.session_count(), 0);
        assert!(session.is_closed());

        let err = session.send("Page.enable", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed { .. }));
    }

    #[tokio::test]
    async fn test_broadcast_event_reaches_listeners() {
        let (connection, _transport) = connection();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        connection.on("Target.targetCreated", move |event| {
            assert!(matches!(event, ProtocolEvent::Other { .. }));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        connection.on_message(
            &json!({ "method": "Target.targetCreated", "params": { "targetInfo": {} } }).to_string(),
        );
        connection.on_message("not json");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let (connection, transport) = connection();
        let disconnects = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&disconnects);
        connection.on(crate::protocol::event::method::DISCONNECTED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let caller = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.send("Browser.getVersion", json!({})).await })
        };
        tokio::task::yield_now().await;
        while connection.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        connection.on_message(&attach_frame("S1", "page"));
        let session = connection.session(&SessionId::new("S1")).expect("session");

        connection.dispose();
        connection.dispose();

        let err = caller.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::TargetClosed { .. }));
        assert!(session.is_closed());
        assert!(transport.is_closed());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        let err = connection.send("Browser.getVersion", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_create_session() {
        let (connection, mut transport) = connection();

        let caller = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.create_session(&TargetId::new("T1")).await })
        };

        let call = transport.next_call().await;
        assert_eq!(call["method"], "Target.attachToTarget");
        assert_eq!(call["params"]["flatten"], true);

        connection.on_message(&attach_frame("S9", "page"));
        connection.on_message(&json!({ "id": call["id"], "result": { "sessionId": "S9" } }).to_string());

        let session = caller.await.expect("join").expect("session");
        assert_eq!(session.id().as_str(), "S9");
    }

    #[tokio::test]
    async fn test_delivery_loop_routes_and_disposes() {
        init_tracing();
        let transport = RecordingTransport::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connection = Connection::attach(
            Arc::new(transport.clone()),
            inbound_rx,
            ConnectionOptions::new(),
        );

        inbound_tx.send(attach_frame("S1", "page")).expect("send");
        drop(inbound_tx);

        for _ in 0..100 {
            if connection.is_closed() {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }

        assert!(connection.is_closed());
        assert!(transport.is_closed());
        assert_eq!(connection.session_count(), 0);
    }
}
