//! Event message types.
//!
//! Events are notifications pushed by the remote end without an `id`.
//! Each one is decoded once, at the dispatch boundary, into a
//! [`ProtocolEvent`] keyed by its method name.
//!
//! # Event Types
//!
//! | Domain | Events |
//! |--------|--------|
//! | `Target` | `attachedToTarget`, `detachedFromTarget` |
//! | `Page` | `frameAttached`, `frameNavigated`, `navigatedWithinDocument`, `frameDetached`, `frameStoppedLoading`, `lifecycleEvent` |
//! | `Runtime` | `executionContextCreated`, `executionContextDestroyed`, `executionContextsCleared` |
//! | `Network` | `requestWillBeSent`, `responseReceived`, `loadingFinished`, `loadingFailed`, `requestServedFromCache` |
//! | `Fetch` | `requestPaused`, `authRequired` |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::identifiers::{
    ExecutionContextId, FrameId, InterceptionId, LoaderId, RequestId, SessionId, TargetId,
};

use super::envelope::{ATTACHED_TO_TARGET, DETACHED_FROM_TARGET};

// ============================================================================
// Method Names
// ============================================================================

/// Event method names.
pub mod method {
    pub use super::super::envelope::{ATTACHED_TO_TARGET, DETACHED_FROM_TARGET};

    pub const FRAME_ATTACHED: &str = "Page.frameAttached";
    pub const FRAME_NAVIGATED: &str = "Page.frameNavigated";
    pub const NAVIGATED_WITHIN_DOCUMENT: &str = "Page.navigatedWithinDocument";
    pub const FRAME_DETACHED: &str = "Page.frameDetached";
    pub const FRAME_STOPPED_LOADING: &str = "Page.frameStoppedLoading";
    pub const LIFECYCLE_EVENT: &str = "Page.lifecycleEvent";

    pub const EXECUTION_CONTEXT_CREATED: &str = "Runtime.executionContextCreated";
    pub const EXECUTION_CONTEXT_DESTROYED: &str = "Runtime.executionContextDestroyed";
    pub const EXECUTION_CONTEXTS_CLEARED: &str = "Runtime.executionContextsCleared";

    pub const REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";
    pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";
    pub const LOADING_FINISHED: &str = "Network.loadingFinished";
    pub const LOADING_FAILED: &str = "Network.loadingFailed";
    pub const REQUEST_SERVED_FROM_CACHE: &str = "Network.requestServedFromCache";

    pub const REQUEST_PAUSED: &str = "Fetch.requestPaused";
    pub const AUTH_REQUIRED: &str = "Fetch.authRequired";

    /// Local notice published when a connection or session goes away.
    pub const DISCONNECTED: &str = "Disconnected";
}

// ============================================================================
// Payloads
// ============================================================================

/// Target descriptor carried by attach broadcasts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target ID.
    pub target_id: TargetId,
    /// Target type (`page`, `iframe`, `worker`, ...).
    #[serde(rename = "type", default)]
    pub target_type: String,
    /// Current URL.
    #[serde(default)]
    pub url: String,
}

/// `Target.attachedToTarget` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedToTarget {
    /// Session assigned by the remote end.
    pub session_id: SessionId,
    /// The attached target.
    pub target_info: TargetInfo,
    /// Whether the target is paused waiting for a debugger.
    #[serde(default)]
    pub waiting_for_debugger: bool,
}

/// `Target.detachedFromTarget` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedFromTarget {
    /// Session that went away.
    pub session_id: SessionId,
    /// Target the session was bound to.
    #[serde(default)]
    pub target_id: Option<TargetId>,
}

/// A frame as described by `Page.frameNavigated` and `Page.getFrameTree`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePayload {
    /// Frame ID.
    pub id: FrameId,
    /// Parent frame, absent for the main frame.
    #[serde(default)]
    pub parent_id: Option<FrameId>,
    /// Loader of the current document.
    #[serde(default)]
    pub loader_id: LoaderId,
    /// Frame name attribute.
    #[serde(default)]
    pub name: Option<String>,
    /// Document URL without fragment.
    #[serde(default)]
    pub url: String,
    /// Fragment, including the leading `#`.
    #[serde(default)]
    pub url_fragment: Option<String>,
}

impl FramePayload {
    /// Returns the URL with its fragment re-attached.
    #[must_use]
    pub fn full_url(&self) -> String {
        match &self.url_fragment {
            Some(fragment) => format!("{}{}", self.url, fragment),
            None => self.url.clone(),
        }
    }
}

/// Recursive snapshot returned by `Page.getFrameTree`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTreePayload {
    /// The frame at this node.
    pub frame: FramePayload,
    /// Child nodes.
    #[serde(default)]
    pub child_frames: Vec<FrameTreePayload>,
}

/// `Page.frameAttached` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAttached {
    /// The new frame.
    pub frame_id: FrameId,
    /// Its parent.
    pub parent_frame_id: FrameId,
}

/// `Page.navigatedWithinDocument` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatedWithinDocument {
    /// Frame that navigated.
    pub frame_id: FrameId,
    /// New URL.
    pub url: String,
}

/// `Page.lifecycleEvent` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Frame reporting the milestone.
    pub frame_id: FrameId,
    /// Loader the milestone belongs to.
    #[serde(default)]
    pub loader_id: LoaderId,
    /// Milestone name (`init`, `DOMContentLoaded`, `load`, ...).
    pub name: String,
}

/// Auxiliary data of an execution context.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextAuxData {
    /// Owning frame.
    #[serde(default)]
    pub frame_id: Option<FrameId>,
    /// `true` for the frame's default world.
    #[serde(default)]
    pub is_default: bool,
    /// Context kind (`default`, `isolated`, `worker`).
    #[serde(rename = "type", default)]
    pub context_type: Option<String>,
}

/// `Runtime.executionContextCreated` context description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDescription {
    /// Context ID.
    pub id: ExecutionContextId,
    /// Security origin.
    #[serde(default)]
    pub origin: String,
    /// World name, empty for the default world.
    #[serde(default)]
    pub name: String,
    /// Frame linkage.
    #[serde(default)]
    pub aux_data: Option<ExecutionContextAuxData>,
}

/// Request line carried by `Network.requestWillBeSent`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    /// Request URL.
    pub url: String,
    /// HTTP method.
    #[serde(default)]
    pub method: String,
    /// Request headers.
    #[serde(default)]
    pub headers: FxHashMap<String, Value>,
    /// Request body.
    #[serde(default)]
    pub post_data: Option<String>,
}

/// Response description carried by network events.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    /// Response URL.
    pub url: String,
    /// HTTP status.
    #[serde(default)]
    pub status: u16,
    /// HTTP status text.
    #[serde(default)]
    pub status_text: String,
    /// Response headers.
    #[serde(default)]
    pub headers: FxHashMap<String, Value>,
    /// Remote IP.
    #[serde(rename = "remoteIPAddress", default)]
    pub remote_ip_address: Option<String>,
    /// Remote port.
    #[serde(default)]
    pub remote_port: Option<u16>,
    /// Served from disk cache.
    #[serde(default)]
    pub from_disk_cache: bool,
    /// Served by a service worker.
    #[serde(default)]
    pub from_service_worker: bool,
}

/// `Network.requestWillBeSent` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    /// Request ID, reused across redirects.
    pub request_id: RequestId,
    /// Loader that issued the request.
    #[serde(default)]
    pub loader_id: LoaderId,
    /// The request.
    pub request: RequestPayload,
    /// Resource type.
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
    /// Frame that issued the request.
    #[serde(default)]
    pub frame_id: Option<FrameId>,
    /// Set when this request follows a redirect.
    #[serde(default)]
    pub redirect_response: Option<ResponsePayload>,
}

/// `Network.responseReceived` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    /// Request ID.
    pub request_id: RequestId,
    /// The response.
    pub response: ResponsePayload,
}

/// `Network.loadingFailed` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
    /// Request ID.
    pub request_id: RequestId,
    /// Failure text.
    #[serde(default)]
    pub error_text: String,
}

/// `Fetch.requestPaused` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPaused {
    /// Interception handle, valid until the request is resolved.
    pub request_id: InterceptionId,
    /// The paused request.
    pub request: RequestPayload,
    /// Frame that issued the request.
    #[serde(default)]
    pub frame_id: Option<FrameId>,
    /// Resource type.
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Matching `Network` request ID.
    #[serde(default)]
    pub network_id: Option<RequestId>,
}

/// Challenge details carried by `Fetch.authRequired`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// Origin of the challenger.
    #[serde(default)]
    pub origin: String,
    /// `basic` or `digest`.
    #[serde(default)]
    pub scheme: String,
    /// Protection realm.
    #[serde(default)]
    pub realm: String,
}

/// `Fetch.authRequired` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequired {
    /// Interception handle.
    pub request_id: InterceptionId,
    /// The challenged request.
    pub request: RequestPayload,
    /// Challenge details.
    #[serde(default)]
    pub auth_challenge: Option<AuthChallenge>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameIdParams {
    frame_id: FrameId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestIdParams {
    request_id: RequestId,
}

#[derive(Deserialize)]
struct FrameNavigatedParams {
    frame: FramePayload,
}

#[derive(Deserialize)]
struct ContextCreatedParams {
    context: ExecutionContextDescription,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextDestroyedParams {
    execution_context_id: ExecutionContextId,
}

// ============================================================================
// ProtocolEvent
// ============================================================================

/// Decoded event for type-safe handling.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    /// A session was attached.
    AttachedToTarget(AttachedToTarget),
    /// A session was detached.
    DetachedFromTarget(DetachedFromTarget),

    /// Child frame attached.
    FrameAttached(FrameAttached),
    /// Frame committed a new document.
    FrameNavigated(FramePayload),
    /// Same-document navigation (anchor, history API).
    NavigatedWithinDocument(NavigatedWithinDocument),
    /// Frame removed.
    FrameDetached {
        /// Frame ID.
        frame_id: FrameId,
    },
    /// Frame finished loading.
    FrameStoppedLoading {
        /// Frame ID.
        frame_id: FrameId,
    },
    /// Lifecycle milestone.
    Lifecycle(LifecycleEvent),

    /// Execution context created.
    ExecutionContextCreated(ExecutionContextDescription),
    /// Execution context destroyed.
    ExecutionContextDestroyed {
        /// Context ID.
        execution_context_id: ExecutionContextId,
    },
    /// All execution contexts cleared.
    ExecutionContextsCleared,

    /// Network request about to be sent.
    RequestWillBeSent(RequestWillBeSent),
    /// Response headers received.
    ResponseReceived(ResponseReceived),
    /// Request finished loading.
    LoadingFinished {
        /// Request ID.
        request_id: RequestId,
    },
    /// Request failed.
    LoadingFailed(LoadingFailed),
    /// Request served from memory cache.
    RequestServedFromCache {
        /// Request ID.
        request_id: RequestId,
    },

    /// Request paused for interception.
    RequestPaused(RequestPaused),
    /// Request paused on an authentication challenge.
    AuthRequired(AuthRequired),

    /// The connection or session went away.
    Disconnected,

    /// Any other event.
    Other {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

impl ProtocolEvent {
    /// Decodes an event from its method and params.
    ///
    /// Unknown methods, and known methods whose params fail to decode,
    /// become [`ProtocolEvent::Other`].
    pub fn decode(method: &str, params: Value) -> Self {
        let decoded = match method {
            ATTACHED_TO_TARGET => typed(params.clone()).map(Self::AttachedToTarget),
            DETACHED_FROM_TARGET => typed(params.clone()).map(Self::DetachedFromTarget),

            method::FRAME_ATTACHED => typed(params.clone()).map(Self::FrameAttached),
            method::FRAME_NAVIGATED => {
                typed::<FrameNavigatedParams>(params.clone()).map(|p| Self::FrameNavigated(p.frame))
            }
            method::NAVIGATED_WITHIN_DOCUMENT => {
                typed(params.clone()).map(Self::NavigatedWithinDocument)
            }
            method::FRAME_DETACHED => typed::<FrameIdParams>(params.clone())
                .map(|p| Self::FrameDetached { frame_id: p.frame_id }),
            method::FRAME_STOPPED_LOADING => typed::<FrameIdParams>(params.clone())
                .map(|p| Self::FrameStoppedLoading { frame_id: p.frame_id }),
            method::LIFECYCLE_EVENT => typed(params.clone()).map(Self::Lifecycle),

            method::EXECUTION_CONTEXT_CREATED => typed::<ContextCreatedParams>(params.clone())
                .map(|p| Self::ExecutionContextCreated(p.context)),
            method::EXECUTION_CONTEXT_DESTROYED => typed::<ContextDestroyedParams>(params.clone())
                .map(|p| Self::ExecutionContextDestroyed {
                    execution_context_id: p.execution_context_id,
                }),
            method::EXECUTION_CONTEXTS_CLEARED => Ok(Self::ExecutionContextsCleared),

            method::REQUEST_WILL_BE_SENT => typed(params.clone()).map(Self::RequestWillBeSent),
            method::RESPONSE_RECEIVED => typed(params.clone()).map(Self::ResponseReceived),
            method::LOADING_FINISHED => typed::<RequestIdParams>(params.clone())
                .map(|p| Self::LoadingFinished { request_id: p.request_id }),
            method::LOADING_FAILED => typed(params.clone()).map(Self::LoadingFailed),
            method::REQUEST_SERVED_FROM_CACHE => typed::<RequestIdParams>(params.clone())
                .map(|p| Self::RequestServedFromCache { request_id: p.request_id }),

            method::REQUEST_PAUSED => typed(params.clone()).map(Self::RequestPaused),
            method::AUTH_REQUIRED => typed(params.clone()).map(Self::AuthRequired),

            _ => {
                return Self::Other {
                    method: method.to_string(),
                    params,
                };
            }
        };

        decoded.unwrap_or_else(|e| {
            warn!(method = %method, error = %e, "Malformed event params");
            Self::Other {
                method: method.to_string(),
                params,
            }
        })
    }

    /// Returns the event name listeners subscribe to.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::AttachedToTarget(_) => ATTACHED_TO_TARGET,
            Self::DetachedFromTarget(_) => DETACHED_FROM_TARGET,
            Self::FrameAttached(_) => method::FRAME_ATTACHED,
            Self::FrameNavigated(_) => method::FRAME_NAVIGATED,
            Self::NavigatedWithinDocument(_) => method::NAVIGATED_WITHIN_DOCUMENT,
            Self::FrameDetached { .. } => method::FRAME_DETACHED,
            Self::FrameStoppedLoading { .. } => method::FRAME_STOPPED_LOADING,
            Self::Lifecycle(_) => method::LIFECYCLE_EVENT,
            Self::ExecutionContextCreated(_) => method::EXECUTION_CONTEXT_CREATED,
            Self::ExecutionContextDestroyed { .. } => method::EXECUTION_CONTEXT_DESTROYED,
            Self::ExecutionContextsCleared => method::EXECUTION_CONTEXTS_CLEARED,
            Self::RequestWillBeSent(_) => method::REQUEST_WILL_BE_SENT,
            Self::ResponseReceived(_) => method::RESPONSE_RECEIVED,
            Self::LoadingFinished { .. } => method::LOADING_FINISHED,
            Self::LoadingFailed(_) => method::LOADING_FAILED,
            Self::RequestServedFromCache { .. } => method::REQUEST_SERVED_FROM_CACHE,
            Self::RequestPaused(_) => method::REQUEST_PAUSED,
            Self::AuthRequired(_) => method::AUTH_REQUIRED,
            Self::Disconnected => method::DISCONNECTED,
            Self::Other { method, .. } => method,
        }
    }
}

#[inline]
fn typed<T: DeserializeOwned>(params: Value) -> serde_json::Result<T> {
    serde_json::from_value(params)
}

// ============================================================================
// Tests
// ============================================================================
