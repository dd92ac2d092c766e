//! Request interception types.
//!
//! With interception enabled every request pauses until it is resolved
//! with a [`RequestAction`].
//!
//! ```ignore
//! use cdp_session::RequestAction;
//!
//! network.intercept_requests(|request| {
//!     if request.url().contains("ads") {
//!         RequestAction::block()
//!     } else {
//!         RequestAction::allow()
//!     }
//! }).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;

use crate::identifiers::InterceptionId;
use crate::protocol::{ErrorReason, FetchCommand, HeaderEntry};

// ============================================================================
// Credentials
// ============================================================================

/// HTTP authentication credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// ContinueOverrides
// ============================================================================

/// Changes applied to a request that is let through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinueOverrides {
    url: Option<String>,
    method: Option<String>,
    post_data: Option<String>,
    headers: Option<Vec<HeaderEntry>>,
}

impl ContinueOverrides {
    /// Creates overrides that change nothing.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the URL. The page does not observe the change.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replaces the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Replaces the request body.
    #[must_use]
    pub fn with_post_data(mut self, post_data: impl AsRef<[u8]>) -> Self {
        self.post_data = Some(Base64Standard.encode(post_data));
        self
    }

    /// Adds a header. Once any header is set, the set replaces the original headers.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Vec::new).push(HeaderEntry {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub(crate) fn into_command(self, request_id: InterceptionId) -> FetchCommand {
        FetchCommand::ContinueRequest {
            request_id,
            url: self.url,
            method: self.method,
            post_data: self.post_data,
            headers: self.headers,
        }
    }
}

// ============================================================================
// FulfillResponse
// ============================================================================

/// A response served locally in place of the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillResponse {
    status: u16,
    headers: Vec<HeaderEntry>,
    body: Option<Vec<u8>>,
}

impl Default for FulfillResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

impl FulfillResponse {
    /// Creates an empty response with `status`.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a header. Names are lower-cased.
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderEntry {
            name: name.as_ref().to_lowercase(),
            value: value.into(),
        });
        self
    }

    /// Sets the `content-type` header.
    #[must_use]
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("content-type", content_type)
    }

    /// Sets the body. `content-length` is derived from it.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the status code.
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    pub(crate) fn into_command(self, request_id: InterceptionId) -> FetchCommand {
        let mut headers = self.headers;
        if let Some(body) = &self.body
            && !headers.iter().any(|h| h.name == "content-length")
        {
            headers.push(HeaderEntry {
                name: "content-length".to_string(),
                value: body.len().to_string(),
            });
        }

        FetchCommand::FulfillRequest {
            request_id,
            response_code: self.status,
            response_phrase: status_text(self.status).map(str::to_string),
            response_headers: headers,
            body: self.body.map(|body| Base64Standard.encode(body)),
        }
    }
}

fn status_text(status: u16) -> Option<&'static str> {
    let text = match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => return None,
    };
    Some(text)
}

// ============================================================================
// RequestAction
// ============================================================================

/// Decision for a paused request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    /// Let the request go, optionally modified.
    Continue(ContinueOverrides),
    /// Answer locally.
    Fulfill(FulfillResponse),
    /// Fail with a network error.
    Abort(ErrorReason),
}

impl RequestAction {
    /// Lets the request through unchanged.
    #[inline]
    #[must_use]
    pub fn allow() -> Self {
        Self::Continue(ContinueOverrides::default())
    }

    /// Fails the request as blocked by the client.
    #[inline]
    #[must_use]
    pub fn block() -> Self {
        Self::Abort(ErrorReason::BlockedByClient)
    }

    /// Fails the request with `reason`.
    #[inline]
    #[must_use]
    pub fn abort(reason: ErrorReason) -> Self {
        Self::Abort(reason)
    }

    /// Lets the request through with `overrides`.
    #[inline]
    #[must_use]
    pub fn continue_with(overrides: ContinueOverrides) -> Self {
        Self::Continue(overrides)
    }

    /// Answers the request with `response`.
    #[inline]
    #[must_use]
    pub fn fulfill(response: FulfillResponse) -> Self {
        Self::Fulfill(response)
    }

    pub(crate) fn into_command(self, request_id: InterceptionId) -> FetchCommand {
        match self {
            Self::Continue(overrides) => overrides.into_command(request_id),
            Self::Fulfill(response) => response.into_command(request_id),
            Self::Abort(error_reason) => FetchCommand::FailRequest {
                request_id,
                error_reason,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fulfill_encodes_body_and_length() {
        let command = FulfillResponse::new(404)
            .with_header("X-Trace", "1")
            .with_body("hi")
            .into_command(InterceptionId::new("I1"));

        match command {
            FetchCommand::FulfillRequest {
                response_code,
                response_phrase,
                response_headers,
                body,
                ..
            } => {
                assert_eq!(response_code, 404);
                assert_eq!(response_phrase.as_deref(), Some("Not Found"));
                assert_eq!(body.as_deref(), Some("aGk="));
                assert!(response_headers.iter().any(|h| h.name == "x-trace"));
                assert!(
                    response_headers
                        .iter()
                        .any(|h| h.name == "content-length" && h.value == "2")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_status_has_no_phrase() {
        let command = FulfillResponse::new(299).into_command(InterceptionId::new("I1"));
        assert!(matches!(
            command,
            FetchCommand::FulfillRequest { response_phrase: None, body: None, .. }
        ));
    }

    #[test]
    fn test_block_fails_as_blocked_by_client() {
        assert_eq!(
            RequestAction::block(),
            RequestAction::Abort(ErrorReason::BlockedByClient)
        );
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("user", "hunter2"));
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }
}
