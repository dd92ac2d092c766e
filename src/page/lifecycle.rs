//! Per-navigation lifecycle watcher.
//!
//! A watcher re-evaluates its frame every time a relevant event arrives and
//! settles into exactly one terminal state.
//!
//! # States
//!
//! | State | Reached when |
//! |-------|--------------|
//! | `Watching` | Initial |
//! | `SameDocumentComplete` | Milestones present, loader unchanged, same-document navigation seen |
//! | `NewDocumentComplete` | Milestones present across the subtree, loader changed |
//! | `Timeout` | The wait bound elapsed first |
//! | `Terminated` | The frame detached or the session closed first |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::connection::Gate;
use crate::error::{Error, Result};
use crate::identifiers::{FrameId, LoaderId, SubscriptionId};
use crate::protocol::event::method;

use super::frame::FrameKey;
use super::frame_manager::{FrameEvent, FrameManager, FrameManagerInner};
use super::network::{NetworkEvent, NetworkRequest, NetworkResponse};
use super::options::NavigateOptions;

// ============================================================================
// Constants
// ============================================================================

const FRAME_DETACHED_REASON: &str = "Navigating frame was detached";

const SESSION_CLOSED_REASON: &str = "Navigation failed because the session was closed";

// ============================================================================
// WatcherState
// ============================================================================

/// Observable state of a [`LifecycleWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// No terminal state reached.
    Watching,
    /// A same-document navigation settled.
    SameDocumentComplete,
    /// A new document committed and settled.
    NewDocumentComplete,
    /// The wait bound elapsed.
    Timeout,
    /// The frame detached or the session closed.
    Terminated,
}

impl WatcherState {
    /// Returns `true` for every state except [`WatcherState::Watching`].
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Watching)
    }
}

/// Kind of completion that settles the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expectation {
    /// Not known yet. Completions are recorded but do not settle.
    Undecided,
    /// Either kind settles.
    Any,
    /// Only a same-document completion settles.
    SameDocument,
    /// Only a new-document completion settles.
    NewDocument,
}

// ============================================================================
// LifecycleWatcher
// ============================================================================

/// Watches one frame until its navigation settles.
///
/// Dropping the watcher unsubscribes it.
pub struct LifecycleWatcher {
    inner: Arc<WatcherInner>,
    manager: FrameManager,
    subscriptions: Mutex<Option<Subscriptions>>,
}

struct Subscriptions {
    frames: Vec<SubscriptionId>,
    network: SubscriptionId,
    session: SubscriptionId,
}

struct WatcherInner {
    manager: Weak<FrameManagerInner>,
    frame_key: FrameKey,
    frame_id: FrameId,
    expected: Vec<&'static str>,
    initial_loader_id: LoaderId,
    gate: Gate,
    status: Mutex<WatcherStatus>,
}

struct WatcherStatus {
    expectation: Expectation,
    same_document_navigation: bool,
    same_document_complete: bool,
    new_document_complete: bool,
    outcome: Option<WatcherState>,
    termination_reason: Option<&'static str>,
    navigation_request: Option<NetworkRequest>,
}

impl fmt::Debug for LifecycleWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleWatcher")
            .field("frame_id", &self.inner.frame_id)
            .field("expected", &self.inner.expected)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LifecycleWatcher {
    /// Starts watching `frame_id` for the conditions in `options`.
    ///
    /// Either a same-document or a new-document completion settles it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameNotFound`] if the frame is unknown.
    pub fn new(manager: &FrameManager, frame_id: &FrameId, options: &NavigateOptions) -> Result<Self> {
        Self::with_expectation(manager, frame_id, &options.milestones(), Expectation::Any)
    }

    pub(crate) fn with_expectation(
        manager: &FrameManager,
        frame_id: &FrameId,
        expected: &[&'static str],
        expectation: Expectation,
    ) -> Result<Self> {
        let (frame_key, initial_loader_id) = {
            let state = manager.inner.state.read();
            let frame = state
                .tree
                .by_id(frame_id)
                .ok_or_else(|| Error::frame_not_found(frame_id.clone()))?;
            (frame.key(), frame.loader_id().clone())
        };

        let inner = Arc::new(WatcherInner {
            manager: manager.downgrade(),
            frame_key,
            frame_id: frame_id.clone(),
            expected: expected.to_vec(),
            initial_loader_id,
            gate: Gate::new(),
            status: Mutex::new(WatcherStatus {
                expectation,
                same_document_navigation: false,
                same_document_complete: false,
                new_document_complete: false,
                outcome: None,
                termination_reason: None,
                navigation_request: None,
            }),
        });

        let frames = [
            FrameEvent::LIFECYCLE_EVENT,
            FrameEvent::NAVIGATED_WITHIN_DOCUMENT,
            FrameEvent::DETACHED,
        ]
        .into_iter()
        .map(|name| {
            let weak = Arc::downgrade(&inner);
            manager.on(name, move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_frame_event(event);
                }
            })
        })
        .collect();

        let weak = Arc::downgrade(&inner);
        let network = manager.network().on(NetworkEvent::REQUEST, move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_request(event.request());
            }
        });

        let weak = Arc::downgrade(&inner);
        let session = manager.session().on(method::DISCONNECTED, move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.terminate(SESSION_CLOSED_REASON);
            }
        });

        trace!(frame_id = %frame_id, expected = ?expected, "Lifecycle watcher started");
        inner.check();
        if manager.session().is_closed() {
            inner.terminate(SESSION_CLOSED_REASON);
        }

        Ok(Self {
            inner,
            manager: manager.clone(),
            subscriptions: Mutex::new(Some(Subscriptions {
                frames,
                network,
                session,
            })),
        })
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.inner.status.lock().state()
    }

    /// Returns the frame being watched.
    #[inline]
    #[must_use]
    pub fn frame_id(&self) -> &FrameId {
        &self.inner.frame_id
    }

    /// Returns the request that carried the navigation, once observed.
    #[must_use]
    pub fn navigation_request(&self) -> Option<NetworkRequest> {
        self.inner.status.lock().navigation_request.clone()
    }

    /// Returns the response of the navigation request, once received.
    #[must_use]
    pub fn navigation_response(&self) -> Option<NetworkResponse> {
        self.navigation_request().and_then(|request| request.response())
    }

    /// Waits up to `limit` for a terminal state.
    ///
    /// Reaching the bound first settles the watcher as [`WatcherState::Timeout`].
    pub async fn wait(&self, limit: Duration) -> WatcherState {
        self.inner.gate.wait(limit).await;

        let mut status = self.inner.status.lock();
        if status.outcome.is_none() {
            debug!(frame_id = %self.inner.frame_id, "Lifecycle watcher timed out");
            status.outcome = Some(WatcherState::Timeout);
            self.inner.gate.release();
        }
        status.state()
    }

    /// Unsubscribes from every event source. Later calls do nothing.
    pub fn dispose(&self) {
        let Some(subscriptions) = self.subscriptions.lock().take() else {
            return;
        };

        for id in subscriptions.frames {
            self.manager.off(id);
        }
        self.manager.network().off(subscriptions.network);
        self.manager.session().off(subscriptions.session);
        trace!(frame_id = %self.inner.frame_id, "Lifecycle watcher disposed");
    }

    /// Sets which completion kind settles the watcher.
    ///
    /// Returns `true` if a recorded completion already settles it.
    pub(crate) fn expect(&self, expectation: Expectation) -> bool {
        let mut status = self.inner.status.lock();
        status.expectation = expectation;
        self.inner.settle(&mut status);
        status.outcome.is_some()
    }

    /// Resolves once the watcher is terminated. Pends forever otherwise.
    ///
    /// While the expectation is undecided only a termination releases the
    /// gate, so this can race a pending `Page.navigate`.
    pub(crate) async fn terminated(&self, limit: Duration) {
        if self.inner.gate.wait(limit).await && self.state() == WatcherState::Terminated {
            return;
        }
        std::future::pending::<()>().await;
    }

    /// Terminates the watcher if its session is already closed.
    ///
    /// Pending calls fail before `Disconnected` reaches the watcher.
    pub(crate) fn terminate_if_session_closed(&self) {
        if self.manager.session().is_closed() {
            self.inner.terminate(SESSION_CLOSED_REASON);
        }
    }

    pub(crate) fn termination_error(&self) -> Error {
        let reason = self
            .inner
            .status
            .lock()
            .termination_reason
            .unwrap_or(FRAME_DETACHED_REASON);
        Error::terminated(format!("{reason} (frame {})", self.inner.frame_id))
    }
}

impl Drop for LifecycleWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ============================================================================
// WatcherInner - Evaluation
// ============================================================================

impl WatcherStatus {
    fn state(&self) -> WatcherState {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        if self.new_document_complete {
            WatcherState::NewDocumentComplete
        } else if self.same_document_complete {
            WatcherState::SameDocumentComplete
        } else {
            WatcherState::Watching
        }
    }
}

impl WatcherInner {
    fn on_frame_event(&self, event: &FrameEvent) {
        match event {
            FrameEvent::Detached(frame) if frame.key() == self.frame_key => {
                self.terminate(FRAME_DETACHED_REASON);
            }
            FrameEvent::NavigatedWithinDocument(frame) if frame.key() == self.frame_key => {
                self.status.lock().same_document_navigation = true;
                self.check();
            }
            _ => self.check(),
        }
    }

    fn on_request(&self, request: &NetworkRequest) {
        if !request.is_navigation_request() {
            return;
        }

        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let on_watched_frame = request
            .frame_id()
            .and_then(|id| manager.state.read().tree.key_of(id))
            == Some(self.frame_key);
        if !on_watched_frame {
            return;
        }

        let mut status = self.status.lock();
        // A redirect reuses the request id; keep the latest hop.
        let latch = status
            .navigation_request
            .as_ref()
            .is_none_or(|current| current.id() == request.id());
        if latch {
            status.navigation_request = Some(request.clone());
        }
    }

    /// Re-evaluates the watched subtree.
    fn check(&self) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };

        let (complete, loader_id) = {
            let state = manager.state.read();
            let Some(frame) = state.tree.get(self.frame_key) else {
                return;
            };
            (
                state.tree.has_milestones(self.frame_key, &self.expected),
                frame.loader_id().clone(),
            )
        };
        if !complete {
            return;
        }

        let mut status = self.status.lock();
        if loader_id == self.initial_loader_id {
            if !status.same_document_navigation {
                return;
            }
            status.same_document_complete = true;
        } else {
            status.new_document_complete = true;
        }
        self.settle(&mut status);
    }

    fn settle(&self, status: &mut WatcherStatus) {
        if status.outcome.is_some() {
            return;
        }

        let outcome = match status.expectation {
            Expectation::Undecided => None,
            Expectation::Any if status.new_document_complete => Some(WatcherState::NewDocumentComplete),
            Expectation::Any if status.same_document_complete => Some(WatcherState::SameDocumentComplete),
            Expectation::NewDocument if status.new_document_complete => {
                Some(WatcherState::NewDocumentComplete)
            }
            Expectation::SameDocument if status.same_document_complete => {
                Some(WatcherState::SameDocumentComplete)
            }
            _ => None,
        };

        if let Some(outcome) = outcome {
            debug!(frame_id = %self.frame_id, state = ?outcome, "Lifecycle watcher settled");
            status.outcome = Some(outcome);
            self.gate.release();
        }
    }

    fn terminate(&self, reason: &'static str) {
        let mut status = self.status.lock();
        if status.outcome.is_some() {
            return;
        }

        debug!(frame_id = %self.frame_id, reason, "Lifecycle watcher terminated");
        status.outcome = Some(WatcherState::Terminated);
        status.termination_reason = Some(reason);
        self.gate.release();
    }
}

// ============================================================================
// Tests
// ============================================================================
