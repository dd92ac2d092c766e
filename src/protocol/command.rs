//! Command definitions organized by domain.
//!
//! Only the commands this crate issues itself are typed here. Anything else
//! goes through the raw `send(method, params)` entry points.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Page` | Enable, frame tree, lifecycle events, navigate, isolated worlds |
//! | `Runtime` | Enable |
//! | `Network` | Enable, extra headers, cache, user agent, network conditions |
//! | `Fetch` | Enable, disable, continue, fulfill, fail, auth |
//! | `Target` | Attach, detach |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{FrameId, InterceptionId, SessionId, TargetId};

// ============================================================================
// Command Wrapper
// ============================================================================

/// All typed protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Page domain commands.
    Page(PageCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
    /// Network domain commands.
    Network(NetworkCommand),
    /// Fetch domain commands.
    Fetch(FetchCommand),
    /// Target domain commands.
    Target(TargetCommand),
}

impl Command {
    /// Splits the command into its method name and params object.
    ///
    /// Commands without params produce an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn into_parts(self) -> Result<(String, Value)> {
        let mut value = serde_json::to_value(&self)?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| Error::invalid_argument("command did not serialize to an object"))?;

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(Error::invalid_argument("command has no method")),
        };
        let params = object
            .remove("params")
            .unwrap_or_else(|| Value::Object(Default::default()));

        Ok((method, params))
    }
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands for frame tracking and navigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable page domain notifications.
    #[serde(rename = "Page.enable")]
    Enable,

    /// Snapshot of the frame tree.
    #[serde(rename = "Page.getFrameTree")]
    GetFrameTree,

    /// Toggle `Page.lifecycleEvent` notifications.
    #[serde(rename = "Page.setLifecycleEventsEnabled")]
    SetLifecycleEventsEnabled {
        /// Whether lifecycle events are reported.
        enabled: bool,
    },

    /// Navigate a frame to a URL.
    #[serde(rename = "Page.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
        /// Referrer URL.
        #[serde(skip_serializing_if = "Option::is_none")]
        referrer: Option<String>,
        /// Frame to navigate.
        #[serde(rename = "frameId")]
        frame_id: FrameId,
    },

    /// Install a script evaluated in every new document.
    #[serde(rename = "Page.addScriptToEvaluateOnNewDocument")]
    AddScriptToEvaluateOnNewDocument {
        /// Script source.
        source: String,
        /// Isolated world to evaluate in.
        #[serde(rename = "worldName", skip_serializing_if = "Option::is_none")]
        world_name: Option<String>,
    },

    /// Create an isolated world for a frame.
    #[serde(rename = "Page.createIsolatedWorld")]
    CreateIsolatedWorld {
        /// Frame the world is created in.
        #[serde(rename = "frameId")]
        frame_id: FrameId,
        /// World name.
        #[serde(rename = "worldName")]
        world_name: String,
        /// The protocol spells this parameter without the second `s`.
        #[serde(rename = "grantUniveralAccess")]
        grant_universal_access: bool,
    },
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Enable execution context notifications.
    #[serde(rename = "Runtime.enable")]
    Enable,
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Enable network notifications.
    #[serde(rename = "Network.enable")]
    Enable,

    /// Headers added to every request.
    #[serde(rename = "Network.setExtraHTTPHeaders")]
    SetExtraHttpHeaders {
        /// Header map.
        headers: FxHashMap<String, String>,
    },

    /// Bypass the browser cache.
    #[serde(rename = "Network.setCacheDisabled")]
    SetCacheDisabled {
        /// Whether the cache is bypassed.
        #[serde(rename = "cacheDisabled")]
        cache_disabled: bool,
    },

    /// Override the `User-Agent` header.
    #[serde(rename = "Network.setUserAgentOverride")]
    SetUserAgentOverride {
        /// User agent string.
        #[serde(rename = "userAgent")]
        user_agent: String,
    },

    /// Emulate connectivity. Zero latency and negative throughput disable throttling.
    #[serde(rename = "Network.emulateNetworkConditions")]
    EmulateNetworkConditions {
        /// Drop every request.
        offline: bool,
        /// Added latency in milliseconds.
        latency: f64,
        /// Download bytes per second, `-1` for no limit.
        #[serde(rename = "downloadThroughput")]
        download_throughput: f64,
        /// Upload bytes per second, `-1` for no limit.
        #[serde(rename = "uploadThroughput")]
        upload_throughput: f64,
    },
}

// ============================================================================
// Fetch Commands
// ============================================================================

/// Fetch domain commands for request interception.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum FetchCommand {
    /// Pause matching requests until they are resolved.
    #[serde(rename = "Fetch.enable")]
    Enable {
        /// Also pause on authentication challenges.
        #[serde(rename = "handleAuthRequests")]
        handle_auth_requests: bool,
        /// Requests to pause.
        patterns: Vec<RequestPattern>,
    },

    /// Stop pausing requests.
    #[serde(rename = "Fetch.disable")]
    Disable,

    /// Let a paused request go, optionally modified.
    #[serde(rename = "Fetch.continueRequest")]
    ContinueRequest {
        /// Paused request.
        #[serde(rename = "requestId")]
        request_id: InterceptionId,
        /// Replacement URL.
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Replacement method.
        #[serde(skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        /// Replacement body, base64 encoded.
        #[serde(rename = "postData", skip_serializing_if = "Option::is_none")]
        post_data: Option<String>,
        /// Replacement headers.
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<Vec<HeaderEntry>>,
    },

    /// Answer a paused request locally.
    #[serde(rename = "Fetch.fulfillRequest")]
    FulfillRequest {
        /// Paused request.
        #[serde(rename = "requestId")]
        request_id: InterceptionId,
        /// HTTP status.
        #[serde(rename = "responseCode")]
        response_code: u16,
        /// HTTP status text.
        #[serde(rename = "responsePhrase", skip_serializing_if = "Option::is_none")]
        response_phrase: Option<String>,
        /// Response headers.
        #[serde(rename = "responseHeaders")]
        response_headers: Vec<HeaderEntry>,
        /// Response body, base64 encoded.
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },

    /// Fail a paused request.
    #[serde(rename = "Fetch.failRequest")]
    FailRequest {
        /// Paused request.
        #[serde(rename = "requestId")]
        request_id: InterceptionId,
        /// Reported network error.
        #[serde(rename = "errorReason")]
        error_reason: ErrorReason,
    },

    /// Answer an authentication challenge.
    #[serde(rename = "Fetch.continueWithAuth")]
    ContinueWithAuth {
        /// Paused request.
        #[serde(rename = "requestId")]
        request_id: InterceptionId,
        /// The answer.
        #[serde(rename = "authChallengeResponse")]
        auth_challenge_response: AuthChallengeResponse,
    },
}

/// URL pattern of requests to pause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPattern {
    /// Wildcard pattern, `*` matches everything.
    #[serde(rename = "urlPattern")]
    pub url_pattern: String,
}

impl RequestPattern {
    /// Pattern matching every request.
    #[must_use]
    pub fn any() -> Self {
        Self {
            url_pattern: "*".to_string(),
        }
    }
}

/// One header line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Network error reported for a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorReason {
    /// Generic failure.
    #[default]
    Failed,
    /// Aborted by the user.
    Aborted,
    /// Timed out.
    TimedOut,
    /// Permission denied.
    AccessDenied,
    /// Connection closed.
    ConnectionClosed,
    /// Connection reset.
    ConnectionReset,
    /// Connection refused.
    ConnectionRefused,
    /// Connection aborted.
    ConnectionAborted,
    /// Connection failed.
    ConnectionFailed,
    /// Host name not resolved.
    NameNotResolved,
    /// No internet connection.
    InternetDisconnected,
    /// Address unreachable.
    AddressUnreachable,
    /// Blocked by the client.
    BlockedByClient,
    /// Blocked by the response.
    BlockedByResponse,
}

/// Answer kind for an authentication challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthResponse {
    /// Let the browser handle it.
    Default,
    /// Cancel the challenge.
    CancelAuth,
    /// Answer with credentials.
    ProvideCredentials,
}

/// `Fetch.continueWithAuth` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallengeResponse {
    /// Answer kind.
    pub response: AuthResponse,
    /// User name for [`AuthResponse::ProvideCredentials`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password for [`AuthResponse::ProvideCredentials`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

// ============================================================================
// Target Commands
// ============================================================================

/// Target domain commands for session management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum TargetCommand {
    /// Attach to a target in flat session mode.
    #[serde(rename = "Target.attachToTarget")]
    AttachToTarget {
        /// Target to attach to.
        #[serde(rename = "targetId")]
        target_id: TargetId,
        /// Use flat session routing.
        flatten: bool,
    },

    /// Detach a session.
    #[serde(rename = "Target.detachFromTarget")]
    DetachFromTarget {
        /// Session to detach.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_command_has_empty_params() {
        let (method, params) = Command::Page(PageCommand::Enable)
            .into_parts()
            .expect("parts");

        assert_eq!(method, "Page.enable");
        assert!(params.as_object().is_some_and(|o| o.is_empty()));
    }

    #[test]
    fn test_navigate_parts() {
        let command = Command::Page(PageCommand::Navigate {
            url: "https://example.com".to_string(),
            referrer: None,
            frame_id: FrameId::new("F1"),
        });

        let (method, params) = command.into_parts().expect("parts");
        assert_eq!(method, "Page.navigate");
        assert_eq!(params["url"], "https://example.com");
        assert_eq!(params["frameId"], "F1");
        assert!(params.get("referrer").is_none());
    }

    #[test]
    fn test_create_isolated_world_wire_names() {
        let command = Command::Page(PageCommand::CreateIsolatedWorld {
            frame_id: FrameId::new("F1"),
            world_name: "utility".to_string(),
            grant_universal_access: true,
        });

        let (_, params) = command.into_parts().expect("parts");
        assert_eq!(params["worldName"], "utility");
        assert_eq!(params["grantUniveralAccess"], true);
    }

    #[test]
    fn test_fail_request_wire_names() {
        let command = Command::Fetch(FetchCommand::FailRequest {
            request_id: InterceptionId::new("interception-job-1.0"),
            error_reason: ErrorReason::BlockedByClient,
        });

        let (method, params) = command.into_parts().expect("parts");
        assert_eq!(method, "Fetch.failRequest");
        assert_eq!(params["requestId"], "interception-job-1.0");
        assert_eq!(params["errorReason"], "BlockedByClient");
    }

    #[test]
    fn test_continue_request_omits_unset_overrides() {
        let command = Command::Fetch(FetchCommand::ContinueRequest {
            request_id: InterceptionId::new("I1"),
            url: None,
            method: Some("POST".to_string()),
            post_data: None,
            headers: None,
        });

        let (_, params) = command.into_parts().expect("parts");
        let object = params.as_object().expect("object");
        assert_eq!(object.len(), 2);
        assert_eq!(params["method"], "POST");
    }

    #[test]
    fn test_attach_to_target_parts() {
        let command = Command::Target(TargetCommand::AttachToTarget {
            target_id: TargetId::new("T1"),
            flatten: true,
        });

        let (method, params) = command.into_parts().expect("parts");
        assert_eq!(method, "Target.attachToTarget");
        assert_eq!(params["targetId"], "T1");
        assert_eq!(params["flatten"], true);
    }
}
