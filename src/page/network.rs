//! Network request tracking for one session.
//!
//! The manager follows `Network.*` events to know which request carries a
//! frame's navigation and what response it received.
//!
//! # Interception
//!
//! With interception on, `Fetch.enable` pauses every request. A request is
//! only surfaced once both its `Network.requestWillBeSent` and its
//! `Fetch.requestPaused` arrived, in either order, and must then be resolved
//! with [`NetworkRequest::resolve`] or one of its shorthands. `data:` URLs
//! are never paused.
//!
//! | Setting | Commands |
//! |---------|----------|
//! | [`NetworkManager::set_request_interception`] | `Network.setCacheDisabled`, `Fetch.enable` / `Fetch.disable` |
//! | [`NetworkManager::authenticate`] | same, answers `Fetch.authRequired` |
//! | [`NetworkManager::set_offline_mode`] | `Network.emulateNetworkConditions` |
//! | [`NetworkManager::set_user_agent`] | `Network.setUserAgentOverride` |
//! | [`NetworkManager::set_cache_enabled`] | `Network.setCacheDisabled` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::interception::{ContinueOverrides, Credentials, FulfillResponse, RequestAction};
use crate::connection::{CdpSession, EventEmitter, NamedEvent};
use crate::error::{Error, Result};
use crate::identifiers::{FrameId, InterceptionId, LoaderId, RequestId, SubscriptionId};
use crate::protocol::event::method;
use crate::protocol::{
    AuthChallengeResponse, AuthRequired, AuthResponse, Command, ErrorReason, FetchCommand,
    LoadingFailed, NetworkCommand, ProtocolEvent, RequestPattern, RequestPaused,
    RequestWillBeSent, ResponsePayload, ResponseReceived,
};

// ============================================================================
// NetworkResponse
// ============================================================================

/// Response headers received for a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkResponse {
    /// Response URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status text.
    pub status_text: String,
    /// Response headers.
    pub headers: FxHashMap<String, Value>,
    /// `ip:port` of the server, when reported.
    pub remote_address: Option<String>,
    /// Served from the disk cache.
    pub from_disk_cache: bool,
    /// Served by a service worker.
    pub from_service_worker: bool,
}

impl From<ResponsePayload> for NetworkResponse {
    fn from(payload: ResponsePayload) -> Self {
        let remote_address = payload.remote_ip_address.map(|ip| match payload.remote_port {
            Some(port) => format!("{ip}:{port}"),
            None => ip,
        });

        Self {
            url: payload.url,
            status: payload.status,
            status_text: payload.status_text,
            headers: payload.headers,
            remote_address,
            from_disk_cache: payload.from_disk_cache,
            from_service_worker: payload.from_service_worker,
        }
    }
}

impl NetworkResponse {
    /// Returns `true` for a 2xx status.
    #[inline]
    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// NetworkRequest
// ============================================================================

/// A tracked request. Cloning shares the same request.
#[derive(Clone)]
pub struct NetworkRequest {
    inner: Arc<RequestInner>,
}

struct RequestInner {
    session: CdpSession,
    interception_id: Option<InterceptionId>,
    allow_interception: bool,
    request_id: RequestId,
    loader_id: LoaderId,
    frame_id: Option<FrameId>,
    url: String,
    method: String,
    resource_type: Option<String>,
    headers: FxHashMap<String, Value>,
    post_data: Option<String>,
    redirect_chain: Vec<NetworkRequest>,
    state: RwLock<RequestState>,
}

#[derive(Default)]
struct RequestState {
    response: Option<NetworkResponse>,
    failure_text: Option<String>,
    from_memory_cache: bool,
    interception_handled: bool,
}

impl fmt::Debug for NetworkRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkRequest")
            .field("request_id", &self.inner.request_id)
            .field("url", &self.inner.url)
            .field("navigation", &self.is_navigation_request())
            .finish_non_exhaustive()
    }
}

impl NetworkRequest {
    fn new(
        session: CdpSession,
        event: RequestWillBeSent,
        interception_id: Option<InterceptionId>,
        allow_interception: bool,
        redirect_chain: Vec<NetworkRequest>,
    ) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                session,
                interception_id,
                allow_interception,
                request_id: event.request_id,
                loader_id: event.loader_id,
                frame_id: event.frame_id,
                url: event.request.url,
                method: event.request.method,
                resource_type: event.resource_type,
                headers: event.request.headers,
                post_data: event.request.post_data,
                redirect_chain,
                state: RwLock::new(RequestState::default()),
            }),
        }
    }

    /// Returns the request ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.inner.request_id
    }

    /// Returns the loader that issued the request.
    #[inline]
    #[must_use]
    pub fn loader_id(&self) -> &LoaderId {
        &self.inner.loader_id
    }

    /// Returns the frame that issued the request.
    #[inline]
    #[must_use]
    pub fn frame_id(&self) -> Option<&FrameId> {
        self.inner.frame_id.as_ref()
    }

    /// Returns the request URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Returns the HTTP method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// Returns the resource type (`Document`, `Script`, ...).
    #[inline]
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.inner.resource_type.as_deref()
    }

    /// Returns the request headers.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &FxHashMap<String, Value> {
        &self.inner.headers
    }

    /// Returns the request body.
    #[inline]
    #[must_use]
    pub fn post_data(&self) -> Option<&str> {
        self.inner.post_data.as_deref()
    }

    /// Returns `true` if this request loads a frame's document.
    #[inline]
    #[must_use]
    pub fn is_navigation_request(&self) -> bool {
        self.inner.request_id.as_str() == self.inner.loader_id.as_str()
    }

    /// Returns the requests this one was redirected from, oldest first.
    #[inline]
    #[must_use]
    pub fn redirect_chain(&self) -> &[NetworkRequest] {
        &self.inner.redirect_chain
    }

    /// Returns the response, once received.
    #[must_use]
    pub fn response(&self) -> Option<NetworkResponse> {
        self.inner.state.read().response.clone()
    }

    /// Returns the failure text of a failed request.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.inner.state.read().failure_text.clone()
    }

    /// Returns `true` if the request was served from the memory cache.
    #[must_use]
    pub fn from_memory_cache(&self) -> bool {
        self.inner.state.read().from_memory_cache
    }

    fn set_response(&self, response: NetworkResponse) {
        self.inner.state.write().response = Some(response);
    }

    /// Returns the `Fetch` handle of a paused request.
    #[inline]
    #[must_use]
    pub fn interception_id(&self) -> Option<&InterceptionId> {
        self.inner.interception_id.as_ref()
    }

    /// Returns `true` once the paused request was resolved.
    #[must_use]
    pub fn is_interception_handled(&self) -> bool {
        self.inner.state.read().interception_handled
    }

    /// Lets a paused request go, applying `overrides`.
    ///
    /// # Errors
    ///
    /// See [`NetworkRequest::resolve`].
    pub fn continue_request(&self, overrides: ContinueOverrides) -> Result<()> {
        self.resolve(RequestAction::Continue(overrides))
    }

    /// Answers a paused request with `response`.
    ///
    /// # Errors
    ///
    /// See [`NetworkRequest::resolve`].
    pub fn respond(&self, response: FulfillResponse) -> Result<()> {
        self.resolve(RequestAction::Fulfill(response))
    }

    /// Fails a paused request with `reason`.
    ///
    /// # Errors
    ///
    /// See [`NetworkRequest::resolve`].
    pub fn abort(&self, reason: ErrorReason) -> Result<()> {
        self.resolve(RequestAction::Abort(reason))
    }

    /// Resolves a paused request.
    ///
    /// The command is sent without waiting for its reply, so this works
    /// from event listeners. `data:` requests are never paused and resolve
    /// to a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::Interception`] if interception was off when the request
    ///   was issued, or the request was already resolved
    /// - [`Error::SessionClosed`] if the session is gone
    pub fn resolve(&self, action: RequestAction) -> Result<()> {
        if self.inner.url.starts_with("data:") {
            return Ok(());
        }

        let interception_id = match (&self.inner.interception_id, self.inner.allow_interception) {
            (Some(id), true) => id.clone(),
            _ => return Err(Error::interception("Request interception is not enabled")),
        };

        {
            let mut state = self.inner.state.write();
            if state.interception_handled {
                return Err(Error::interception("Request is already handled"));
            }
            state.interception_handled = true;
        }

        trace!(request_id = %self.inner.request_id, action = ?action, "Resolving paused request");
        self.inner
            .session
            .send_command_and_forget(Command::Fetch(action.into_command(interception_id)))?;
        Ok(())
    }
}

// ============================================================================
// NetworkEvent
// ============================================================================

/// Request lifecycle notifications.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A request is about to be sent.
    Request(NetworkRequest),
    /// A response was received.
    Response(NetworkRequest),
    /// A request finished loading.
    RequestFinished(NetworkRequest),
    /// A request failed.
    RequestFailed(NetworkRequest),
}

impl NetworkEvent {
    /// Event name for [`NetworkEvent::Request`].
    pub const REQUEST: &'static str = "request";
    /// Event name for [`NetworkEvent::Response`].
    pub const RESPONSE: &'static str = "response";
    /// Event name for [`NetworkEvent::RequestFinished`].
    pub const REQUEST_FINISHED: &'static str = "requestfinished";
    /// Event name for [`NetworkEvent::RequestFailed`].
    pub const REQUEST_FAILED: &'static str = "requestfailed";

    /// Returns the request the event concerns.
    #[must_use]
    pub fn request(&self) -> &NetworkRequest {
        match self {
            Self::Request(r) | Self::Response(r) | Self::RequestFinished(r) | Self::RequestFailed(r) => r,
        }
    }
}

impl NamedEvent for NetworkEvent {
    fn name(&self) -> &str {
        match self {
            Self::Request(_) => Self::REQUEST,
            Self::Response(_) => Self::RESPONSE,
            Self::RequestFinished(_) => Self::REQUEST_FINISHED,
            Self::RequestFailed(_) => Self::REQUEST_FAILED,
        }
    }
}

// ============================================================================
// NetworkManager
// ============================================================================

/// Tracks the in-flight requests of one session.
///
/// Cloning shares the same manager.
#[derive(Clone)]
pub struct NetworkManager {
    inner: Arc<NetworkInner>,
}

struct NetworkInner {
    session: CdpSession,
    state: RwLock<NetworkState>,
    emitter: EventEmitter<NetworkEvent>,
    subscriptions: RwLock<Vec<SubscriptionId>>,
}

#[derive(Default)]
struct NetworkState {
    requests: FxHashMap<RequestId, NetworkRequest>,
    extra_http_headers: FxHashMap<String, String>,
    credentials: Option<Credentials>,
    attempted_authentications: FxHashSet<InterceptionId>,
    user_interception: bool,
    protocol_interception: bool,
    user_cache_disabled: bool,
    offline: bool,
    /// `requestWillBeSent` events waiting for their `requestPaused`.
    pending_requests: FxHashMap<RequestId, RequestWillBeSent>,
    /// `requestPaused` handles waiting for their `requestWillBeSent`.
    pending_interceptions: FxHashMap<RequestId, InterceptionId>,
}

impl fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkManager")
            .field("session_id", self.inner.session.id())
            .field("in_flight", &self.inner.state.read().requests.len())
            .finish_non_exhaustive()
    }
}

impl NetworkManager {
    /// Creates a manager and subscribes it to `session`'s network events.
    #[must_use]
    pub fn new(session: CdpSession) -> Self {
        let inner = Arc::new(NetworkInner {
            session,
            state: RwLock::new(NetworkState::default()),
            emitter: EventEmitter::new(),
            subscriptions: RwLock::new(Vec::new()),
        });

        let subscriptions = [
            method::REQUEST_WILL_BE_SENT,
            method::RESPONSE_RECEIVED,
            method::LOADING_FINISHED,
            method::LOADING_FAILED,
            method::REQUEST_SERVED_FROM_CACHE,
            method::REQUEST_PAUSED,
            method::AUTH_REQUIRED,
        ]
        .into_iter()
        .map(|name| {
            let weak = Arc::downgrade(&inner);
            inner.session.on(name, move |event| {
                if let Some(inner) = Weak::upgrade(&weak) {
                    inner.handle(event);
                }
            })
        })
        .collect();
        *inner.subscriptions.write() = subscriptions;

        Self { inner }
    }

    /// Enables network notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if `Network.enable` fails.
    pub async fn initialize(&self) -> Result<()> {
        self.inner
            .session
            .send_command(Command::Network(NetworkCommand::Enable))
            .await?;
        Ok(())
    }

    /// Replaces the headers added to every request.
    ///
    /// Header names are stored lower-cased.
    ///
    /// # Errors
    ///
    /// Returns an error if `Network.setExtraHTTPHeaders` fails.
    pub async fn set_extra_http_headers(&self, headers: FxHashMap<String, String>) -> Result<()> {
        let headers: FxHashMap<String, String> = headers
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();

        self.inner.state.write().extra_http_headers = headers.clone();
        self.inner
            .session
            .send_command(Command::Network(NetworkCommand::SetExtraHttpHeaders { headers }))
            .await?;
        Ok(())
    }

    /// Turns request interception on or off.
    ///
    /// While on, every request other than `data:` pauses until resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if a `Network.setCacheDisabled` or `Fetch.*` call fails.
    pub async fn set_request_interception(&self, enabled: bool) -> Result<()> {
        self.inner.state.write().user_interception = enabled;
        self.update_protocol_request_interception().await
    }

    /// Enables interception and resolves every request with `handler`.
    ///
    /// Returns the listener ID; pass it to [`NetworkManager::off`] to stop
    /// handling. Interception stays on until turned off.
    ///
    /// # Errors
    ///
    /// See [`NetworkManager::set_request_interception`].
    pub async fn intercept_requests<F>(&self, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&NetworkRequest) -> RequestAction + Send + Sync + 'static,
    {
        let id = self.on(NetworkEvent::REQUEST, move |event| {
            let request = event.request();
            if request.is_interception_handled() {
                return;
            }
            if let Err(e) = request.resolve(handler(request)) {
                warn!(request_id = %request.id(), error = %e, "Failed to resolve paused request");
            }
        });

        if let Err(e) = self.set_request_interception(true).await {
            self.off(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Sets the credentials used to answer HTTP authentication challenges.
    ///
    /// Credentials keep interception on at the protocol level; requests the
    /// user does not intercept are continued automatically.
    ///
    /// # Errors
    ///
    /// See [`NetworkManager::set_request_interception`].
    pub async fn authenticate(&self, credentials: Option<Credentials>) -> Result<()> {
        self.inner.state.write().credentials = credentials;
        self.update_protocol_request_interception().await
    }

    /// Emulates a lost connection. Repeating the current value sends nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if `Network.emulateNetworkConditions` fails.
    pub async fn set_offline_mode(&self, offline: bool) -> Result<()> {
        {
            let mut state = self.inner.state.write();
            if state.offline == offline {
                return Ok(());
            }
            state.offline = offline;
        }

        self.inner
            .session
            .send_command(Command::Network(NetworkCommand::EmulateNetworkConditions {
                offline,
                latency: 0.0,
                download_throughput: -1.0,
                upload_throughput: -1.0,
            }))
            .await?;
        Ok(())
    }

    /// Overrides the `User-Agent` header.
    ///
    /// # Errors
    ///
    /// Returns an error if `Network.setUserAgentOverride` fails.
    pub async fn set_user_agent(&self, user_agent: impl Into<String>) -> Result<()> {
        self.inner
            .session
            .send_command(Command::Network(NetworkCommand::SetUserAgentOverride {
                user_agent: user_agent.into(),
            }))
            .await?;
        Ok(())
    }

    /// Enables or bypasses the browser cache.
    ///
    /// The cache stays bypassed while interception is on.
    ///
    /// # Errors
    ///
    /// Returns an error if `Network.setCacheDisabled` fails.
    pub async fn set_cache_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.state.write().user_cache_disabled = !enabled;
        self.update_protocol_cache_disabled().await
    }

    async fn update_protocol_cache_disabled(&self) -> Result<()> {
        let cache_disabled = {
            let state = self.inner.state.read();
            state.user_cache_disabled || state.protocol_interception
        };

        self.inner
            .session
            .send_command(Command::Network(NetworkCommand::SetCacheDisabled { cache_disabled }))
            .await?;
        Ok(())
    }

    async fn update_protocol_request_interception(&self) -> Result<()> {
        let enabled = {
            let mut state = self.inner.state.write();
            let enabled = state.user_interception || state.credentials.is_some();
            if enabled == state.protocol_interception {
                return Ok(());
            }
            state.protocol_interception = enabled;
            enabled
        };

        debug!(session_id = %self.inner.session.id(), enabled, "Updating request interception");
        self.update_protocol_cache_disabled().await?;

        let command = if enabled {
            FetchCommand::Enable {
                handle_auth_requests: true,
                patterns: vec![RequestPattern::any()],
            }
        } else {
            FetchCommand::Disable
        };
        self.inner.session.send_command(Command::Fetch(command)).await?;
        Ok(())
    }

    /// Returns a copy of the extra headers.
    #[must_use]
    pub fn extra_http_headers(&self) -> FxHashMap<String, String> {
        self.inner.state.read().extra_http_headers.clone()
    }

    /// Returns an in-flight request.
    #[must_use]
    pub fn request(&self, request_id: &RequestId) -> Option<NetworkRequest> {
        self.inner.state.read().requests.get(request_id).cloned()
    }

    /// Returns the number of in-flight requests.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.read().requests.len()
    }

    /// Subscribes to request notifications.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&NetworkEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.on(name, listener)
    }

    /// Removes a listener.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.emitter.off(id)
    }

    /// Unsubscribes from the session.
    pub fn dispose(&self) {
        for id in self.inner.subscriptions.write().drain(..) {
            self.inner.session.off(id);
        }
    }
}

// ============================================================================
// NetworkInner - Event Handlers
// ============================================================================

impl NetworkInner {
    fn handle(&self, event: &ProtocolEvent) {
        match event {
            ProtocolEvent::RequestWillBeSent(e) => self.on_request_will_be_sent(e.clone()),
            ProtocolEvent::ResponseReceived(e) => self.on_response_received(e),
            ProtocolEvent::LoadingFinished { request_id } => self.on_loading_finished(request_id),
            ProtocolEvent::LoadingFailed(e) => self.on_loading_failed(e),
            ProtocolEvent::RequestServedFromCache { request_id } => {
                if let Some(request) = self.state.read().requests.get(request_id) {
                    request.inner.state.write().from_memory_cache = true;
                }
            }
            ProtocolEvent::RequestPaused(e) => self.on_request_paused(e),
            ProtocolEvent::AuthRequired(e) => self.on_auth_required(e),
            _ => {}
        }
    }

    fn on_request_will_be_sent(&self, event: RequestWillBeSent) {
        let interception_id = {
            let mut state = self.state.write();
            if !state.protocol_interception || event.request.url.starts_with("data:") {
                None
            } else if let Some(id) = state.pending_interceptions.remove(&event.request_id) {
                Some(id)
            } else {
                trace!(request_id = %event.request_id, "Holding request until it pauses");
                state.pending_requests.insert(event.request_id.clone(), event);
                return;
            }
        };

        self.on_request(event, interception_id);
    }

    fn on_request_paused(&self, event: &RequestPaused) {
        let (auto_continue, held) = {
            let mut state = self.state.write();
            let auto_continue = !state.user_interception && state.protocol_interception;
            let held = match &event.network_id {
                Some(network_id) => match state.pending_requests.remove(network_id) {
                    Some(held) => Some(held),
                    None => {
                        state
                            .pending_interceptions
                            .insert(network_id.clone(), event.request_id.clone());
                        None
                    }
                },
                None => None,
            };
            (auto_continue, held)
        };

        if auto_continue {
            let command = ContinueOverrides::default().into_command(event.request_id.clone());
            if let Err(e) = self.session.send_command_and_forget(Command::Fetch(command)) {
                warn!(interception_id = %event.request_id, error = %e, "Failed to continue paused request");
            }
        }

        if let Some(held) = held {
            self.on_request(held, Some(event.request_id.clone()));
        }
    }

    fn on_auth_required(&self, event: &AuthRequired) {
        let answer = {
            let mut state = self.state.write();
            if state.attempted_authentications.contains(&event.request_id) {
                AuthChallengeResponse {
                    response: AuthResponse::CancelAuth,
                    username: None,
                    password: None,
                }
            } else if let Some(credentials) = state.credentials.clone() {
                state.attempted_authentications.insert(event.request_id.clone());
                AuthChallengeResponse {
                    response: AuthResponse::ProvideCredentials,
                    username: Some(credentials.username),
                    password: Some(credentials.password),
                }
            } else {
                AuthChallengeResponse {
                    response: AuthResponse::Default,
                    username: None,
                    password: None,
                }
            }
        };

        debug!(interception_id = %event.request_id, response = ?answer.response, "Answering auth challenge");
        let command = FetchCommand::ContinueWithAuth {
            request_id: event.request_id.clone(),
            auth_challenge_response: answer,
        };
        if let Err(e) = self.session.send_command_and_forget(Command::Fetch(command)) {
            warn!(interception_id = %event.request_id, error = %e, "Failed to answer auth challenge");
        }
    }

    fn forget_authentication(&self, request: &NetworkRequest) {
        if let Some(id) = request.interception_id() {
            self.state.write().attempted_authentications.remove(id);
        }
    }

    fn on_request(&self, mut event: RequestWillBeSent, interception_id: Option<InterceptionId>) {
        let mut redirect_chain = Vec::new();

        if let Some(redirect) = event.redirect_response.take() {
            let previous = self.state.write().requests.remove(&event.request_id);
            if let Some(previous) = previous {
                previous.set_response(redirect.into());
                redirect_chain = previous.redirect_chain().to_vec();
                redirect_chain.push(previous.clone());
                self.forget_authentication(&previous);

                self.emitter.emit(&NetworkEvent::Response(previous.clone()));
                self.emitter.emit(&NetworkEvent::RequestFinished(previous));
            }
        }

        let allow_interception = self.state.read().user_interception;
        let request = NetworkRequest::new(
            self.session.clone(),
            event,
            interception_id,
            allow_interception,
            redirect_chain,
        );
        trace!(
            request_id = %request.id(),
            url = %request.url(),
            navigation = request.is_navigation_request(),
            "Request will be sent"
        );

        self.state
            .write()
            .requests
            .insert(request.id().clone(), request.clone());
        self.emitter.emit(&NetworkEvent::Request(request));
    }

    fn on_response_received(&self, event: &ResponseReceived) {
        let Some(request) = self.state.read().requests.get(&event.request_id).cloned() else {
            return;
        };

        request.set_response(event.response.clone().into());
        self.emitter.emit(&NetworkEvent::Response(request));
    }

    fn on_loading_finished(&self, request_id: &RequestId) {
        let Some(request) = self.state.write().requests.remove(request_id) else {
            return;
        };
        self.forget_authentication(&request);
        self.emitter.emit(&NetworkEvent::RequestFinished(request));
    }

    fn on_loading_failed(&self, event: &LoadingFailed) {
        let Some(request) = self.state.write().requests.remove(&event.request_id) else {
            return;
        };

        debug!(request_id = %event.request_id, error = %event.error_text, "Request failed");
        self.forget_authentication(&request);
        request.inner.state.write().failure_text = Some(event.error_text.clone());
        self.emitter.emit(&NetworkEvent::RequestFailed(request));
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

    use super::*;
    use crate::connection::Connection;
    use crate::identifiers::SessionId;
    use crate::testing::{RecordingTransport, attach_frame, event_frame, init_tracing, response_frame};

    fn setup() -> (Connection, NetworkManager, RecordingTransport) {
        init_tracing();
        let transport = RecordingTransport::new();
        let connection = Connection::new(Arc::new(transport.clone()), Default::default());
        connection.on_message(&attach_frame("S", "page"));
        let session = connection.session(&SessionId::new("S")).expect("session");
        (connection, NetworkManager::new(session), transport)
    }

    fn request_will_be_sent(request_id: &str, loader_id: &str, url: &str) -> serde_json::Value {
        json!({
            "requestId": request_id,
            "loaderId": loader_id,
            "frameId": "F",
            "type": "Document",
            "request": { "url": url, "method": "GET", "headers": {} }
        })
    }

    #[tokio::test]
    async fn test_navigation_request_classification() {
        let (connection, network, _) = setup();

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("L1", "L1", "https://a.test/"),
        ));
        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("R7", "L1", "https://a.test/app.js"),
        ));

        let document = network.request(&RequestId::new("L1")).expect("document");
        assert!(document.is_navigation_request());
        assert_eq!(document.resource_type(), Some("Document"));

        let script = network.request(&RequestId::new("R7")).expect("script");
        assert!(!script.is_navigation_request());
    }

    #[tokio::test]
    async fn test_response_and_completion() {
        let (connection, network, _) = setup();
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        network.on(NetworkEvent::REQUEST_FINISHED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("L1", "L1", "https://a.test/"),
        ));
        let request = network.request(&RequestId::new("L1")).expect("request");

        connection.on_message(&event_frame(
            "S",
            method::RESPONSE_RECEIVED,
            json!({
                "requestId": "L1",
                "response": {
                    "url": "https://a.test/",
                    "status": 200,
                    "statusText": "OK",
                    "headers": { "content-type": "text/html" },
                    "remoteIPAddress": "127.0.0.1",
                    "remotePort": 443
                }
            }),
        ));
        connection.on_message(&event_frame("S", method::LOADING_FINISHED, json!({ "requestId": "L1" })));

        let response = request.response().expect("response");
        assert!(response.ok());
        assert_eq!(response.remote_address.as_deref(), Some("127.0.0.1:443"));
        assert_eq!(network.in_flight_count(), 0);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_redirect_builds_chain() {
        let (connection, network, _) = setup();

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("L1", "L1", "http://a.test/"),
        ));

        let mut redirected = request_will_be_sent("L1", "L1", "https://a.test/");
        redirected["redirectResponse"] = json!({
            "url": "http://a.test/",
            "status": 301,
            "statusText": "Moved Permanently",
            "headers": {}
        });
        connection.on_message(&event_frame("S", method::REQUEST_WILL_BE_SENT, redirected));

        let request = network.request(&RequestId::new("L1")).expect("request");
        assert_eq!(request.url(), "https://a.test/");
        assert_eq!(request.redirect_chain().len(), 1);

        let first = &request.redirect_chain()[0];
        assert_eq!(first.url(), "http://a.test/");
        assert_eq!(first.response().expect("redirect").status, 301);
    }

    #[tokio::test]
    async fn test_loading_failed_keeps_text() {
        let (connection, network, _) = setup();
        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("R1", "L1", "https://a.test/x"),
        ));
        let request = network.request(&RequestId::new("R1")).expect("request");

        connection.on_message(&event_frame(
            "S",
            method::LOADING_FAILED,
            json!({ "requestId": "R1", "errorText": "net::ERR_ABORTED" }),
        ));

        assert_eq!(request.failure().as_deref(), Some("net::ERR_ABORTED"));
        assert!(network.request(&RequestId::new("R1")).is_none());
    }

    #[tokio::test]
    async fn test_extra_headers_are_lowercased() {
        let (connection, network, mut transport) = setup();

        let setter = {
            let network = network.clone();
            tokio::spawn(async move {
                let mut headers = FxHashMap::default();
                headers.insert("Referer".to_string(), "https://r.test/".to_string());
                network.set_extra_http_headers(headers).await
            })
        };

        let call = transport.next_call().await;
        assert_eq!(call["method"], "Network.setExtraHTTPHeaders");
        assert_eq!(call["params"]["headers"]["referer"], "https://r.test/");

        connection.on_message(&response_frame("S", &call["id"], json!({})));
        setter.await.expect("join").expect("set headers");

        assert_eq!(
            network.extra_http_headers().get("referer").map(String::as_str),
            Some("https://r.test/")
        );
    }

    async fn answer(
        connection: &Connection,
        transport: &mut RecordingTransport,
        expected: &str,
    ) -> serde_json::Value {
        let call = transport.next_call().await;
        assert_eq!(call["method"], expected);
        connection.on_message(&response_frame("S", &call["id"], json!({})));
        call
    }

    async fn enable_interception(
        connection: &Connection,
        network: &NetworkManager,
        transport: &mut RecordingTransport,
    ) {
        let task = {
            let network = network.clone();
            tokio::spawn(async move { network.set_request_interception(true).await })
        };

        let cache = answer(connection, transport, "Network.setCacheDisabled").await;
        assert_eq!(cache["params"]["cacheDisabled"], true);
        let enable = answer(connection, transport, "Fetch.enable").await;
        assert_eq!(enable["params"]["handleAuthRequests"], true);
        assert_eq!(enable["params"]["patterns"][0]["urlPattern"], "*");

        task.await.expect("join").expect("enable interception");
    }

    fn request_paused(interception_id: &str, network_id: &str, url: &str) -> serde_json::Value {
        json!({
            "requestId": interception_id,
            "networkId": network_id,
            "frameId": "F",
            "resourceType": "Document",
            "request": { "url": url, "method": "GET", "headers": {} }
        })
    }

    #[tokio::test]
    async fn test_intercepted_request_waits_for_pause() {
        let (connection, network, mut transport) = setup();
        enable_interception(&connection, &network, &mut transport).await;

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("R1", "L1", "https://a.test/x"),
        ));
        assert!(network.request(&RequestId::new("R1")).is_none());

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_PAUSED,
            request_paused("I1", "R1", "https://a.test/x"),
        ));
        let request = network.request(&RequestId::new("R1")).expect("request");
        assert_eq!(request.interception_id().map(InterceptionId::as_str), Some("I1"));
        assert!(transport.try_next_call().is_none());

        request.abort(ErrorReason::Aborted).expect("abort");
        let call = transport.next_call().await;
        assert_eq!(call["method"], "Fetch.failRequest");
        assert_eq!(call["params"]["requestId"], "I1");
        assert_eq!(call["params"]["errorReason"], "Aborted");

        let again = request.abort(ErrorReason::Failed);
        assert!(matches!(again, Err(Error::Interception { .. })));
    }

    #[tokio::test]
    async fn test_pause_before_request_is_paired() {
        let (connection, network, mut transport) = setup();
        enable_interception(&connection, &network, &mut transport).await;

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_PAUSED,
            request_paused("I2", "R2", "https://a.test/y"),
        ));
        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("R2", "L1", "https://a.test/y"),
        ));

        let request = network.request(&RequestId::new("R2")).expect("request");
        request
            .respond(FulfillResponse::new(200).with_content_type("text/plain").with_body("hi"))
            .expect("respond");

        let call = transport.next_call().await;
        assert_eq!(call["method"], "Fetch.fulfillRequest");
        assert_eq!(call["params"]["requestId"], "I2");
        assert_eq!(call["params"]["responseCode"], 200);
        assert_eq!(call["params"]["responsePhrase"], "OK");
        assert_eq!(call["params"]["body"], "aGk=");
        let headers = call["params"]["responseHeaders"].as_array().expect("headers");
        assert!(headers.contains(&json!({ "name": "content-type", "value": "text/plain" })));
        assert!(headers.contains(&json!({ "name": "content-length", "value": "2" })));
    }

    #[tokio::test]
    async fn test_intercept_requests_applies_handler() {
        let (connection, network, mut transport) = setup();

        let task = {
            let network = network.clone();
            tokio::spawn(async move {
                network
                    .intercept_requests(|request| {
                        if request.url().contains("ads") {
                            RequestAction::block()
                        } else {
                            RequestAction::continue_with(
                                ContinueOverrides::new().with_header("x-test", "1"),
                            )
                        }
                    })
                    .await
            })
        };
        answer(&connection, &mut transport, "Network.setCacheDisabled").await;
        answer(&connection, &mut transport, "Fetch.enable").await;
        task.await.expect("join").expect("intercept");

        for (interception, request, url) in [
            ("I1", "R1", "https://ads.test/banner.js"),
            ("I2", "R2", "https://a.test/app.js"),
        ] {
            connection.on_message(&event_frame(
                "S",
                method::REQUEST_WILL_BE_SENT,
                request_will_be_sent(request, "L1", url),
            ));
            connection.on_message(&event_frame(
                "S",
                method::REQUEST_PAUSED,
                request_paused(interception, request, url),
            ));
        }

        let blocked = transport.next_call().await;
        assert_eq!(blocked["method"], "Fetch.failRequest");
        assert_eq!(blocked["params"]["errorReason"], "BlockedByClient");

        let allowed = transport.next_call().await;
        assert_eq!(allowed["method"], "Fetch.continueRequest");
        assert_eq!(allowed["params"]["requestId"], "I2");
        assert_eq!(allowed["params"]["headers"][0]["name"], "x-test");

        let request = network.request(&RequestId::new("R2")).expect("request");
        assert!(request.is_interception_handled());
    }

    #[tokio::test]
    async fn test_authentication_answers_then_cancels() {
        let (connection, network, mut transport) = setup();

        let task = {
            let network = network.clone();
            tokio::spawn(async move {
                network
                    .authenticate(Some(Credentials::new("user", "secret")))
                    .await
            })
        };
        answer(&connection, &mut transport, "Network.setCacheDisabled").await;
        answer(&connection, &mut transport, "Fetch.enable").await;
        task.await.expect("join").expect("authenticate");

        let challenge = json!({
            "requestId": "I7",
            "request": { "url": "https://a.test/private", "method": "GET", "headers": {} },
            "authChallenge": { "origin": "https://a.test", "scheme": "basic", "realm": "r" }
        });

        connection.on_message(&event_frame("S", method::AUTH_REQUIRED, challenge.clone()));
        let first = transport.next_call().await;
        assert_eq!(first["method"], "Fetch.continueWithAuth");
        assert_eq!(first["params"]["requestId"], "I7");
        assert_eq!(first["params"]["authChallengeResponse"]["response"], "ProvideCredentials");
        assert_eq!(first["params"]["authChallengeResponse"]["username"], "user");
        assert_eq!(first["params"]["authChallengeResponse"]["password"], "secret");

        connection.on_message(&event_frame("S", method::AUTH_REQUIRED, challenge));
        let second = transport.next_call().await;
        assert_eq!(second["params"]["authChallengeResponse"]["response"], "CancelAuth");
        assert!(second["params"]["authChallengeResponse"].get("password").is_none());
    }

    #[tokio::test]
    async fn test_credentials_alone_continue_paused_requests() {
        let (connection, network, mut transport) = setup();

        let task = {
            let network = network.clone();
            tokio::spawn(async move {
                network
                    .authenticate(Some(Credentials::new("user", "secret")))
                    .await
            })
        };
        answer(&connection, &mut transport, "Network.setCacheDisabled").await;
        answer(&connection, &mut transport, "Fetch.enable").await;
        task.await.expect("join").expect("authenticate");

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_PAUSED,
            request_paused("I3", "R3", "https://a.test/z"),
        ));
        let call = transport.next_call().await;
        assert_eq!(call["method"], "Fetch.continueRequest");
        assert_eq!(call["params"], json!({ "requestId": "I3" }));

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("R3", "L1", "https://a.test/z"),
        ));
        let request = network.request(&RequestId::new("R3")).expect("request");
        let manual = request.continue_request(ContinueOverrides::new());
        assert!(matches!(manual, Err(Error::Interception { .. })));
    }

    #[tokio::test]
    async fn test_data_url_is_not_held() {
        let (connection, network, mut transport) = setup();
        enable_interception(&connection, &network, &mut transport).await;

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("R4", "L1", "data:text/plain,hi"),
        ));

        let request = network.request(&RequestId::new("R4")).expect("request");
        assert!(request.interception_id().is_none());
        request.continue_request(ContinueOverrides::new()).expect("no-op");
        assert!(transport.try_next_call().is_none());
    }

    #[tokio::test]
    async fn test_offline_mode_sent_once() {
        let (connection, network, mut transport) = setup();

        let task = {
            let network = network.clone();
            tokio::spawn(async move { network.set_offline_mode(true).await })
        };
        let call = answer(&connection, &mut transport, "Network.emulateNetworkConditions").await;
        assert_eq!(call["params"]["offline"], true);
        assert_eq!(call["params"]["latency"], 0.0);
        assert_eq!(call["params"]["downloadThroughput"], -1.0);
        assert_eq!(call["params"]["uploadThroughput"], -1.0);
        task.await.expect("join").expect("offline");

        network.set_offline_mode(true).await.expect("unchanged");
        assert!(transport.try_next_call().is_none());
    }

    #[tokio::test]
    async fn test_user_agent_and_cache_overrides() {
        let (connection, network, mut transport) = setup();

        let task = {
            let network = network.clone();
            tokio::spawn(async move {
                network.set_user_agent("cdp-session/0.1").await?;
                network.set_cache_enabled(false).await
            })
        };
        let agent = answer(&connection, &mut transport, "Network.setUserAgentOverride").await;
        assert_eq!(agent["params"]["userAgent"], "cdp-session/0.1");
        let cache = answer(&connection, &mut transport, "Network.setCacheDisabled").await;
        assert_eq!(cache["params"]["cacheDisabled"], true);
        task.await.expect("join").expect("overrides");
    }

    #[tokio::test]
    async fn test_dispose_stops_tracking() {
        let (connection, network, _) = setup();
        network.dispose();

        connection.on_message(&event_frame(
            "S",
            method::REQUEST_WILL_BE_SENT,
            request_will_be_sent("L1", "L1", "https://a.test/"),
        ));
        assert_eq!(network.in_flight_count(), 0);
    }
}
