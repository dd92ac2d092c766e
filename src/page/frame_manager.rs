//! Live frame tree of one page session.
//!
//! The manager builds the tree from a `Page.getFrameTree` snapshot and keeps
//! it current from `Page.*` and `Runtime.*` events. Navigations go through
//! [`FrameManager::navigate_frame`] and [`FrameManager::wait_for_frame_navigation`],
//! both driven by a [`LifecycleWatcher`].
//!
//! # Events
//!
//! | Name | Emitted when |
//! |------|--------------|
//! | `frameattached` | A child frame was inserted |
//! | `framenavigated` | A frame committed a document or changed url in place |
//! | `framenavigatedwithindocument` | A same-document navigation happened |
//! | `framedetached` | A frame was removed (children first) |
//! | `lifecycleevent` | A frame recorded a lifecycle milestone |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::connection::{CdpSession, EventEmitter, Gate, NamedEvent};
use crate::error::{Error, Result};
use crate::identifiers::{ExecutionContextId, FrameId, SubscriptionId};
use crate::protocol::event::method;
use crate::protocol::{
    Command, ExecutionContextDescription, FrameAttached, FramePayload, FrameTreePayload,
    LifecycleEvent, NavigatedWithinDocument, PageCommand, ProtocolEvent, RuntimeCommand,
};

use super::frame::{Frame, FrameKey, FrameTree};
use super::lifecycle::{Expectation, LifecycleWatcher, WatcherState};
use super::network::{NetworkManager, NetworkResponse};
use super::options::{NavigateOptions, TimeoutSettings};

// ============================================================================
// Constants
// ============================================================================

/// Name of the isolated world the manager creates in every frame.
pub const UTILITY_WORLD_NAME: &str = "__cdp_session_utility_world__";

/// `sourceURL` tagging scripts installed by this crate.
pub const EVALUATION_SCRIPT_URL: &str = "__cdp_session_evaluation_script__";

/// Context `auxData.type` of isolated worlds.
const ISOLATED_CONTEXT_TYPE: &str = "isolated";

// ============================================================================
// FrameEvent
// ============================================================================

/// Frame tree change. Carries a snapshot of the frame after the change.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A child frame was inserted.
    Attached(Frame),
    /// A frame committed a new document or its url changed in place.
    Navigated(Frame),
    /// A same-document navigation happened.
    NavigatedWithinDocument(Frame),
    /// A frame was removed from the tree.
    Detached(Frame),
    /// A frame recorded a lifecycle milestone.
    LifecycleEvent(Frame),
}

impl FrameEvent {
    /// Event name for [`FrameEvent::Attached`].
    pub const ATTACHED: &'static str = "frameattached";
    /// Event name for [`FrameEvent::Navigated`].
    pub const NAVIGATED: &'static str = "framenavigated";
    /// Event name for [`FrameEvent::NavigatedWithinDocument`].
    pub const NAVIGATED_WITHIN_DOCUMENT: &'static str = "framenavigatedwithindocument";
    /// Event name for [`FrameEvent::Detached`].
    pub const DETACHED: &'static str = "framedetached";
    /// Event name for [`FrameEvent::LifecycleEvent`].
    pub const LIFECYCLE_EVENT: &'static str = "lifecycleevent";

    /// Returns the frame snapshot.
    #[must_use]
    pub fn frame(&self) -> &Frame {
        match self {
            Self::Attached(f)
            | Self::Navigated(f)
            | Self::NavigatedWithinDocument(f)
            | Self::Detached(f)
            | Self::LifecycleEvent(f) => f,
        }
    }
}

impl NamedEvent for FrameEvent {
    fn name(&self) -> &str {
        match self {
            Self::Attached(_) => Self::ATTACHED,
            Self::Navigated(_) => Self::NAVIGATED,
            Self::NavigatedWithinDocument(_) => Self::NAVIGATED_WITHIN_DOCUMENT,
            Self::Detached(_) => Self::DETACHED,
            Self::LifecycleEvent(_) => Self::LIFECYCLE_EVENT,
        }
    }
}

// ============================================================================
// ExecutionContext
// ============================================================================

/// World slot of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum World {
    /// The page's default world.
    Main,
    /// The utility isolated world.
    Secondary,
}

/// A live JavaScript execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Context ID.
    pub id: ExecutionContextId,
    /// Frame the context belongs to.
    pub frame_id: Option<FrameId>,
    /// Context name (world name for isolated worlds).
    pub name: String,
    /// Security origin.
    pub origin: String,
    /// World slot the context is linked to.
    pub world: Option<World>,
}

// ============================================================================
// FrameManager
// ============================================================================

/// Frame tree and navigation entry points for one page session.
///
/// Cloning shares the same manager.
#[derive(Clone)]
pub struct FrameManager {
    pub(crate) inner: Arc<FrameManagerInner>,
}

pub(crate) struct FrameManagerInner {
    session: CdpSession,
    network: NetworkManager,
    timeouts: TimeoutSettings,
    pub(crate) state: RwLock<FrameState>,
    pub(crate) emitter: EventEmitter<FrameEvent>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

#[derive(Default)]
pub(crate) struct FrameState {
    pub(crate) tree: FrameTree,
    contexts: FxHashMap<ExecutionContextId, ExecutionContext>,
    isolated_worlds: FxHashSet<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameTreeResult {
    frame_tree: FrameTreePayload,
}

/// Navigation parameters after defaults are applied.
struct ResolvedNavigation {
    referrer: Option<String>,
    milestones: Vec<&'static str>,
    timeout: Duration,
}

impl fmt::Debug for FrameManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("FrameManager")
            .field("session_id", self.inner.session.id())
            .field("frames", &state.tree.len())
            .field("contexts", &state.contexts.len())
            .finish_non_exhaustive()
    }
}

impl FrameManager {
    /// Creates a manager for `session` and subscribes it to frame events.
    ///
    /// Call [`FrameManager::initialize`] to load the current frame tree.
    #[must_use]
    pub fn new(session: CdpSession) -> Self {
        let timeouts = TimeoutSettings::new(session.options());
        Self::with_timeouts(session, timeouts)
    }

    /// Creates a manager sharing `timeouts` with other components.
    #[must_use]
    pub fn with_timeouts(session: CdpSession, timeouts: TimeoutSettings) -> Self {
        let network = NetworkManager::new(session.clone());
        let inner = Arc::new(FrameManagerInner {
            session,
            network,
            timeouts,
            state: RwLock::new(FrameState::default()),
            emitter: EventEmitter::new(),
            subscriptions: Mutex::new(Vec::new()),
        });

        let subscriptions = [
            method::FRAME_ATTACHED,
            method::FRAME_NAVIGATED,
            method::NAVIGATED_WITHIN_DOCUMENT,
            method::FRAME_DETACHED,
            method::FRAME_STOPPED_LOADING,
            method::LIFECYCLE_EVENT,
            method::EXECUTION_CONTEXT_CREATED,
            method::EXECUTION_CONTEXT_DESTROYED,
            method::EXECUTION_CONTEXTS_CLEARED,
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
        *inner.subscriptions.lock() = subscriptions;

        Self { inner }
    }

    /// Loads the frame tree and enables the domains the manager relies on.
    ///
    /// # Errors
    ///
    /// Returns the first failing call's error.
    pub async fn initialize(&self) -> Result<()> {
        let session = &self.inner.session;

        let limit = self.inner.timeouts.timeout();

        session.send_command_and_forget(Command::Page(PageCommand::Enable))?;

        let (method, params) = Command::Page(PageCommand::GetFrameTree).into_parts()?;
        let result = session.send_with_timeout(&method, params, limit).await?;
        let FrameTreeResult { frame_tree } = serde_json::from_value(result)?;
        self.inner.handle_frame_tree(&frame_tree);

        session.send_command_and_forget(Command::Page(PageCommand::SetLifecycleEventsEnabled {
            enabled: true,
        }))?;
        let (method, params) = Command::Runtime(RuntimeCommand::Enable).into_parts()?;
        session.send_with_timeout(&method, params, limit).await?;

        self.ensure_isolated_world(UTILITY_WORLD_NAME).await?;
        self.inner.network.initialize().await?;

        debug!(
            session_id = %session.id(),
            frames = self.inner.state.read().tree.len(),
            "Frame manager initialized"
        );
        Ok(())
    }

    /// Creates the isolated world `name` in every frame, once per name.
    ///
    /// Frames that cannot host the world are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the bootstrap script cannot be installed.
    pub async fn ensure_isolated_world(&self, name: &str) -> Result<()> {
        if !self.inner.state.write().isolated_worlds.insert(name.to_string()) {
            return Ok(());
        }

        let session = &self.inner.session;
        session
            .send_command(Command::Page(PageCommand::AddScriptToEvaluateOnNewDocument {
                source: format!("//# sourceURL={EVALUATION_SCRIPT_URL}"),
                world_name: Some(name.to_string()),
            }))
            .await?;

        let frame_ids: Vec<FrameId> = self
            .inner
            .state
            .read()
            .tree
            .frames()
            .map(|frame| frame.id().clone())
            .collect();

        let results = join_all(frame_ids.iter().map(|frame_id| {
            session.send_command(Command::Page(PageCommand::CreateIsolatedWorld {
                frame_id: frame_id.clone(),
                world_name: name.to_string(),
                grant_universal_access: true,
            }))
        }))
        .await;

        for (frame_id, result) in frame_ids.iter().zip(results) {
            if let Err(e) = result {
                debug!(frame_id = %frame_id, world = name, error = %e, "Isolated world not created");
            }
        }
        Ok(())
    }

    /// Unsubscribes the manager and its network tracker from the session.
    pub fn dispose(&self) {
        for id in self.inner.subscriptions.lock().drain(..) {
            self.inner.session.off(id);
        }
        self.inner.network.dispose();
    }
}

// ============================================================================
// FrameManager - Accessors
// ============================================================================

impl FrameManager {
    /// Returns the session the manager listens to.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &CdpSession {
        &self.inner.session
    }

    /// Returns the network tracker.
    #[inline]
    #[must_use]
    pub fn network(&self) -> &NetworkManager {
        &self.inner.network
    }

    /// Returns the timeout defaults.
    #[inline]
    #[must_use]
    pub fn timeouts(&self) -> &TimeoutSettings {
        &self.inner.timeouts
    }

    /// Returns a snapshot of the main frame.
    #[must_use]
    pub fn main_frame(&self) -> Option<Frame> {
        let state = self.inner.state.read();
        state.tree.main_key().and_then(|key| state.tree.get(key)).cloned()
    }

    /// Returns a snapshot of a frame.
    #[must_use]
    pub fn frame(&self, frame_id: &FrameId) -> Option<Frame> {
        self.inner.state.read().tree.by_id(frame_id).cloned()
    }

    /// Returns a snapshot of a frame by key.
    #[must_use]
    pub fn frame_by_key(&self, key: FrameKey) -> Option<Frame> {
        self.inner.state.read().tree.get(key).cloned()
    }

    /// Returns snapshots of every frame.
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        self.inner.state.read().tree.frames().cloned().collect()
    }

    /// Returns snapshots of a frame's children.
    #[must_use]
    pub fn child_frames(&self, frame_id: &FrameId) -> Vec<Frame> {
        let state = self.inner.state.read();
        state
            .tree
            .by_id(frame_id)
            .map(|frame| {
                frame
                    .children()
                    .iter()
                    .filter_map(|key| state.tree.get(*key).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns a live execution context.
    #[must_use]
    pub fn execution_context(&self, id: ExecutionContextId) -> Option<ExecutionContext> {
        self.inner.state.read().contexts.get(&id).cloned()
    }

    /// Returns `true` if the isolated world `name` is known.
    #[must_use]
    pub fn has_isolated_world(&self, name: &str) -> bool {
        self.inner.state.read().isolated_worlds.contains(name)
    }

    /// Subscribes to frame tree changes.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&FrameEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.on(name, listener)
    }

    /// Removes a listener.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.emitter.off(id)
    }

    pub(crate) fn downgrade(&self) -> Weak<FrameManagerInner> {
        Arc::downgrade(&self.inner)
    }
}

// ============================================================================
// FrameManager - Navigation
// ============================================================================

impl FrameManager {
    /// Navigates the main frame.
    ///
    /// # Errors
    ///
    /// See [`FrameManager::navigate_frame`].
    pub async fn navigate(
        &self,
        url: &str,
        options: NavigateOptions,
    ) -> Result<Option<NetworkResponse>> {
        let frame_id = self.main_frame_id()?;
        self.navigate_frame(&frame_id, url, options).await
    }

    /// Navigates `frame_id` to `url` and waits for the navigation to settle.
    ///
    /// Returns the response of the navigation request, or `None` for
    /// same-document navigations and documents without a response.
    ///
    /// # Errors
    ///
    /// - [`Error::FrameNotFound`] if the frame is unknown
    /// - [`Error::Navigation`] if the browser refused the navigation
    /// - [`Error::Timeout`] if the navigation did not settle in time
    /// - [`Error::Terminated`] if the frame detached or the session closed
    pub async fn navigate_frame(
        &self,
        frame_id: &FrameId,
        url: &str,
        options: NavigateOptions,
    ) -> Result<Option<NetworkResponse>> {
        let resolved = self.resolve(options);
        let started = Instant::now();

        let watcher =
            LifecycleWatcher::with_expectation(self, frame_id, &resolved.milestones, Expectation::Undecided)?;

        let (method, params) = Command::Page(PageCommand::Navigate {
            url: url.to_string(),
            referrer: resolved.referrer.clone(),
            frame_id: frame_id.clone(),
        })
        .into_parts()?;

        debug!(frame_id = %frame_id, url, "Navigating frame");

        let outcome = tokio::select! {
            outcome = self.inner.session.send_with_timeout(&method, params, resolved.timeout) => outcome,
            () = watcher.terminated(resolved.timeout) => return Err(watcher.termination_error()),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, Error::TargetClosed { .. } | Error::SessionClosed { .. }) {
                    watcher.terminate_if_session_closed();
                }
                return match watcher.state() {
                    WatcherState::Terminated => Err(watcher.termination_error()),
                    _ if e.is_timeout() => Err(Error::navigation_timeout(url, millis(resolved.timeout))),
                    _ => Err(e),
                };
            }
        };

        if let Some(text) = response.get("errorText").and_then(|v| v.as_str()) {
            return Err(Error::navigation(format!("{text} at {url}")));
        }

        let new_document = response
            .get("loaderId")
            .and_then(|v| v.as_str())
            .is_some_and(|loader| !loader.is_empty());
        watcher.expect(if new_document {
            Expectation::NewDocument
        } else {
            Expectation::SameDocument
        });

        let remaining = resolved.timeout.saturating_sub(started.elapsed());
        let state = watcher.wait(remaining).await;
        Self::settle(&watcher, state, url, resolved.timeout)
    }

    /// Waits for the main frame's next navigation.
    ///
    /// # Errors
    ///
    /// See [`FrameManager::wait_for_frame_navigation`].
    pub async fn wait_for_navigation(
        &self,
        options: NavigateOptions,
        ready: Option<&Gate>,
    ) -> Result<Option<NetworkResponse>> {
        let frame_id = self.main_frame_id()?;
        self.wait_for_frame_navigation(&frame_id, options, ready).await
    }

    /// Waits for a navigation of `frame_id` started elsewhere.
    ///
    /// `ready` is released once the watcher is listening, so the caller can
    /// trigger the navigation without racing its first events.
    ///
    /// # Errors
    ///
    /// - [`Error::FrameNotFound`] if the frame is unknown
    /// - [`Error::Timeout`] if no navigation settled in time
    /// - [`Error::Terminated`] if the frame detached or the session closed
    pub async fn wait_for_frame_navigation(
        &self,
        frame_id: &FrameId,
        options: NavigateOptions,
        ready: Option<&Gate>,
    ) -> Result<Option<NetworkResponse>> {
        let resolved = self.resolve(options);
        let watcher =
            LifecycleWatcher::with_expectation(self, frame_id, &resolved.milestones, Expectation::Any)?;

        if let Some(gate) = ready {
            gate.release();
        }

        let state = watcher.wait(resolved.timeout).await;
        let url = self.frame(frame_id).map(|f| f.url().to_string()).unwrap_or_default();
        Self::settle(&watcher, state, &url, resolved.timeout)
    }

    fn resolve(&self, options: NavigateOptions) -> ResolvedNavigation {
        let milestones = options.milestones();
        let timeout = options
            .timeout
            .filter(|t| !t.is_zero())
            .unwrap_or_else(|| self.inner.timeouts.navigation_timeout());
        let referrer = options
            .referrer
            .filter(|r| !r.is_empty())
            .or_else(|| self.inner.network.extra_http_headers().remove("referer"));

        ResolvedNavigation {
            referrer,
            milestones,
            timeout,
        }
    }

    fn settle(
        watcher: &LifecycleWatcher,
        state: WatcherState,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<NetworkResponse>> {
        match state {
            WatcherState::SameDocumentComplete | WatcherState::NewDocumentComplete => {
                Ok(watcher.navigation_response())
            }
            WatcherState::Terminated => Err(watcher.termination_error()),
            WatcherState::Timeout | WatcherState::Watching => {
                Err(Error::navigation_timeout(url, millis(timeout)))
            }
        }
    }

    fn main_frame_id(&self) -> Result<FrameId> {
        self.main_frame()
            .map(|frame| frame.id().clone())
            .ok_or_else(|| Error::frame_not_found(FrameId::default()))
    }
}

#[inline]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// FrameManagerInner - Event Handlers
// ============================================================================

impl FrameManagerInner {
    fn handle(&self, event: &ProtocolEvent) {
        match event {
            ProtocolEvent::FrameAttached(e) => self.on_frame_attached(e),
            ProtocolEvent::FrameNavigated(payload) => self.on_frame_navigated(payload),
            ProtocolEvent::NavigatedWithinDocument(e) => self.on_navigated_within_document(e),
            ProtocolEvent::FrameDetached { frame_id } => self.on_frame_detached(frame_id),
            ProtocolEvent::FrameStoppedLoading { frame_id } => self.on_frame_stopped_loading(frame_id),
            ProtocolEvent::Lifecycle(e) => self.on_lifecycle_event(e),
            ProtocolEvent::ExecutionContextCreated(context) => self.on_execution_context_created(context),
            ProtocolEvent::ExecutionContextDestroyed {
                execution_context_id,
            } => self.on_execution_context_destroyed(*execution_context_id),
            ProtocolEvent::ExecutionContextsCleared => self.on_execution_contexts_cleared(),
            _ => {}
        }
    }

    fn handle_frame_tree(&self, tree: &FrameTreePayload) {
        if let Some(parent_id) = &tree.frame.parent_id {
            self.on_frame_attached(&FrameAttached {
                frame_id: tree.frame.id.clone(),
                parent_frame_id: parent_id.clone(),
            });
        }
        self.on_frame_navigated(&tree.frame);

        for child in &tree.child_frames {
            self.handle_frame_tree(child);
        }
    }

    fn on_frame_attached(&self, event: &FrameAttached) {
        let attached = {
            let mut state = self.state.write();
            if state.tree.key_of(&event.frame_id).is_some() {
                return;
            }

            match state.tree.attach(event.frame_id.clone(), &event.parent_frame_id) {
                Ok(key) => state.tree.get(key).cloned(),
                Err(e) => {
                    error!(frame_id = %event.frame_id, error = %e, "Frame attached to unknown parent");
                    return;
                }
            }
        };

        if let Some(frame) = attached {
            debug!(frame_id = %frame.id(), parent_id = %event.parent_frame_id, "Frame attached");
            self.emitter.emit(&FrameEvent::Attached(frame));
        }
    }

    fn on_frame_navigated(&self, payload: &FramePayload) {
        let is_main = payload.parent_id.is_none();

        let (removed, navigated) = {
            let mut state = self.state.write();
            let tree = &mut state.tree;

            let existing = if is_main {
                tree.main_key()
            } else {
                tree.key_of(&payload.id)
            };
            if !is_main && existing.is_none() {
                error!(frame_id = %payload.id, "Navigated frame is not in the tree");
                return;
            }

            let mut removed = Vec::new();
            if let Some(key) = existing {
                let children = tree.get(key).map(|f| f.children().to_vec()).unwrap_or_default();
                for child in children {
                    removed.extend(tree.remove_recursively(child));
                }
            }

            let key = match existing {
                Some(key) => {
                    tree.rekey(key, payload.id.clone());
                    key
                }
                None => tree.insert_main(payload.id.clone()),
            };

            let navigated = tree.get_mut(key).map(|frame| {
                frame.navigated(payload);
                frame.clone()
            });
            (removed, navigated)
        };

        for frame in removed {
            self.emitter.emit(&FrameEvent::Detached(frame));
        }
        if let Some(frame) = navigated {
            debug!(frame_id = %frame.id(), url = frame.url(), "Frame navigated");
            self.emitter.emit(&FrameEvent::Navigated(frame));
        }
    }

    fn on_navigated_within_document(&self, event: &NavigatedWithinDocument) {
        let frame = {
            let mut state = self.state.write();
            state.tree.by_id_mut(&event.frame_id).map(|frame| {
                frame.navigated_within_document(&event.url);
                frame.clone()
            })
        };

        if let Some(frame) = frame {
            self.emitter.emit(&FrameEvent::NavigatedWithinDocument(frame.clone()));
            self.emitter.emit(&FrameEvent::Navigated(frame));
        }
    }

    fn on_frame_detached(&self, frame_id: &FrameId) {
        let removed = {
            let mut state = self.state.write();
            match state.tree.key_of(frame_id) {
                Some(key) => state.tree.remove_recursively(key),
                None => return,
            }
        };

        debug!(frame_id = %frame_id, removed = removed.len(), "Frame detached");
        for frame in removed {
            self.emitter.emit(&FrameEvent::Detached(frame));
        }
    }

    fn on_frame_stopped_loading(&self, frame_id: &FrameId) {
        let frame = {
            let mut state = self.state.write();
            state.tree.by_id_mut(frame_id).map(|frame| {
                frame.on_loading_stopped();
                frame.clone()
            })
        };

        if let Some(frame) = frame {
            self.emitter.emit(&FrameEvent::LifecycleEvent(frame));
        }
    }

    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        let frame = {
            let mut state = self.state.write();
            state.tree.by_id_mut(&event.frame_id).map(|frame| {
                frame.on_lifecycle_event(&event.loader_id, &event.name);
                frame.clone()
            })
        };

        if let Some(frame) = frame {
            self.emitter.emit(&FrameEvent::LifecycleEvent(frame));
        }
    }
}

// ============================================================================
// FrameManagerInner - Execution Contexts
// ============================================================================

impl FrameManagerInner {
    fn on_execution_context_created(&self, description: &ExecutionContextDescription) {
        let aux = description.aux_data.clone().unwrap_or_default();
        let mut state = self.state.write();

        if aux.context_type.as_deref() == Some(ISOLATED_CONTEXT_TYPE) {
            state.isolated_worlds.insert(description.name.clone());
        }

        let mut world = None;
        if let Some(frame) = aux.frame_id.as_ref().and_then(|id| state.tree.by_id_mut(id)) {
            if aux.is_default {
                frame.set_main_world(Some(description.id));
                world = Some(World::Main);
            } else if description.name == UTILITY_WORLD_NAME && frame.secondary_world().is_none() {
                frame.set_secondary_world(Some(description.id));
                world = Some(World::Secondary);
            }
        }

        state.contexts.insert(
            description.id,
            ExecutionContext {
                id: description.id,
                frame_id: aux.frame_id,
                name: description.name.clone(),
                origin: description.origin.clone(),
                world,
            },
        );
    }

    fn on_execution_context_destroyed(&self, id: ExecutionContextId) {
        let mut state = self.state.write();
        if let Some(context) = state.contexts.remove(&id) {
            unlink_context(&mut state.tree, &context);
        }
    }

    fn on_execution_contexts_cleared(&self) {
        let mut state = self.state.write();
        let FrameState { tree, contexts, .. } = &mut *state;
        for (_, context) in contexts.drain() {
            unlink_context(tree, &context);
        }
        for frame in tree.frames_mut() {
            frame.set_main_world(None);
            frame.set_secondary_world(None);
        }
    }
}

fn unlink_context(tree: &mut FrameTree, context: &ExecutionContext) {
    let Some(frame) = context.frame_id.as_ref().and_then(|id| tree.by_id_mut(id)) else {
        return;
    };

    match context.world {
        Some(World::Main) if frame.main_world() == Some(context.id) => frame.set_main_world(None),
        Some(World::Secondary) if frame.secondary_world() == Some(context.id) => {
            frame.set_secondary_world(None);
        }
        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================
