//! Frame tree.
//!
//! Frames live in an arena keyed by a stable local [`FrameKey`]. The remote
//! frame ID can change (the main frame is re-keyed when a navigation swaps
//! its identity) while the key stays the same, so watchers track keys.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::identifiers::{ExecutionContextId, FrameId, LoaderId};
use crate::protocol::FramePayload;

// ============================================================================
// Constants
// ============================================================================

/// Milestone that starts a new document and clears the recorded set.
pub const INIT_MILESTONE: &str = "init";

// ============================================================================
// FrameKey
// ============================================================================

/// Stable arena handle of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey(u64);

// ============================================================================
// Frame
// ============================================================================

/// A node of the frame tree.
#[derive(Debug, Clone)]
pub struct Frame {
    key: FrameKey,
    id: FrameId,
    parent: Option<FrameKey>,
    parent_id: Option<FrameId>,
    children: Vec<FrameKey>,
    url: String,
    name: Option<String>,
    loader_id: LoaderId,
    lifecycle: FxHashSet<String>,
    main_world: Option<ExecutionContextId>,
    secondary_world: Option<ExecutionContextId>,
    detached: bool,
}

impl Frame {
    fn new(key: FrameKey, id: FrameId, parent: Option<(FrameKey, FrameId)>) -> Self {
        let (parent, parent_id) = parent.unzip();
        Self {
            key,
            id,
            parent,
            parent_id,
            children: Vec::new(),
            url: String::new(),
            name: None,
            loader_id: LoaderId::default(),
            lifecycle: FxHashSet::default(),
            main_world: None,
            secondary_world: None,
            detached: false,
        }
    }

    /// Returns the arena key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> FrameKey {
        self.key
    }

    /// Returns the frame ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &FrameId {
        &self.id
    }

    /// Returns the parent frame ID, `None` for the main frame.
    #[inline]
    #[must_use]
    pub fn parent_id(&self) -> Option<&FrameId> {
        self.parent_id.as_ref()
    }

    /// Returns the current URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the frame name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the loader of the current document.
    #[inline]
    #[must_use]
    pub fn loader_id(&self) -> &LoaderId {
        &self.loader_id
    }

    /// Returns `true` if `milestone` was recorded since the last document start.
    #[inline]
    #[must_use]
    pub fn has_lifecycle_event(&self, milestone: &str) -> bool {
        self.lifecycle.contains(milestone)
    }

    /// Returns the recorded milestones.
    pub fn lifecycle_events(&self) -> impl Iterator<Item = &str> {
        self.lifecycle.iter().map(String::as_str)
    }

    /// Returns the default world's execution context.
    #[inline]
    #[must_use]
    pub fn main_world(&self) -> Option<ExecutionContextId> {
        self.main_world
    }

    /// Returns the utility world's execution context.
    #[inline]
    #[must_use]
    pub fn secondary_world(&self) -> Option<ExecutionContextId> {
        self.secondary_world
    }

    /// Returns `true` once the frame has been removed from the tree.
    #[inline]
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub(crate) fn children(&self) -> &[FrameKey] {
        &self.children
    }

    pub(crate) fn on_lifecycle_event(&mut self, loader_id: &LoaderId, name: &str) {
        if name == INIT_MILESTONE {
            self.reset_lifecycle(loader_id.clone());
        }
        self.lifecycle.insert(name.to_string());
    }

    pub(crate) fn on_loading_stopped(&mut self) {
        self.lifecycle.insert("DOMContentLoaded".to_string());
        self.lifecycle.insert("load".to_string());
    }

    pub(crate) fn navigated(&mut self, payload: &FramePayload) {
        self.name = payload.name.clone();
        self.url = payload.full_url();
        if !payload.loader_id.is_empty() && payload.loader_id != self.loader_id {
            self.reset_lifecycle(payload.loader_id.clone());
        }
    }

    pub(crate) fn navigated_within_document(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub(crate) fn set_main_world(&mut self, context: Option<ExecutionContextId>) {
        self.main_world = context;
    }

    pub(crate) fn set_secondary_world(&mut self, context: Option<ExecutionContextId>) {
        self.secondary_world = context;
    }

    fn reset_lifecycle(&mut self, loader_id: LoaderId) {
        self.loader_id = loader_id;
        self.lifecycle.clear();
    }
}

// ============================================================================
// FrameTree
// ============================================================================

/// Arena of frames with parent and child links by key.
#[derive(Debug, Default)]
pub(crate) struct FrameTree {
    frames: FxHashMap<FrameKey, Frame>,
    by_id: FxHashMap<FrameId, FrameKey>,
    main: Option<FrameKey>,
    next_key: u64,
}

impl FrameTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn allocate_key(&mut self) -> FrameKey {
        self.next_key += 1;
        FrameKey(self.next_key)
    }

    /// Inserts a child frame. Returns the existing key if `id` is known.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameNotFound`] if the parent is unknown.
    pub(crate) fn attach(&mut self, id: FrameId, parent_id: &FrameId) -> Result<FrameKey> {
        if let Some(key) = self.by_id.get(&id) {
            return Ok(*key);
        }

        let parent_key = self
            .key_of(parent_id)
            .ok_or_else(|| Error::frame_not_found(parent_id.clone()))?;

        let key = self.allocate_key();
        self.frames
            .insert(key, Frame::new(key, id.clone(), Some((parent_key, parent_id.clone()))));
        self.by_id.insert(id, key);
        if let Some(parent) = self.frames.get_mut(&parent_key) {
            parent.children.push(key);
        }
        Ok(key)
    }

    /// Creates the main frame.
    pub(crate) fn insert_main(&mut self, id: FrameId) -> FrameKey {
        let key = self.allocate_key();
        self.frames.insert(key, Frame::new(key, id.clone(), None));
        self.by_id.insert(id, key);
        self.main = Some(key);
        key
    }

    /// Changes the remote ID of a frame, keeping its key.
    pub(crate) fn rekey(&mut self, key: FrameKey, id: FrameId) {
        let Some(frame) = self.frames.get_mut(&key) else {
            return;
        };
        if frame.id == id {
            return;
        }

        let old = std::mem::replace(&mut frame.id, id.clone());
        self.by_id.remove(&old);
        self.by_id.insert(id, key);
    }

    /// Removes a frame and its descendants, children first.
    ///
    /// Returns the removed frames in removal order.
    pub(crate) fn remove_recursively(&mut self, key: FrameKey) -> Vec<Frame> {
        let mut removed = Vec::new();
        self.remove_into(key, &mut removed);

        if let Some(parent_key) = removed.last().and_then(|frame| frame.parent)
            && let Some(parent) = self.frames.get_mut(&parent_key)
        {
            parent.children.retain(|child| *child != key);
        }
        removed
    }

    fn remove_into(&mut self, key: FrameKey, removed: &mut Vec<Frame>) {
        let children = match self.frames.get(&key) {
            Some(frame) => frame.children.clone(),
            None => return,
        };
        for child in children {
            self.remove_into(child, removed);
        }

        if let Some(mut frame) = self.frames.remove(&key) {
            self.by_id.remove(&frame.id);
            if self.main == Some(key) {
                self.main = None;
            }
            frame.detached = true;
            frame.children.clear();
            removed.push(frame);
        }
    }

    /// Returns `true` if the frame and every descendant recorded all `expected` milestones.
    pub(crate) fn has_milestones(&self, key: FrameKey, expected: &[&str]) -> bool {
        let Some(frame) = self.frames.get(&key) else {
            return false;
        };

        expected.iter().all(|m| frame.has_lifecycle_event(m))
            && frame
                .children
                .iter()
                .all(|child| self.has_milestones(*child, expected))
    }

    #[inline]
    pub(crate) fn key_of(&self, id: &FrameId) -> Option<FrameKey> {
        self.by_id.get(id).copied()
    }

    #[inline]
    pub(crate) fn get(&self, key: FrameKey) -> Option<&Frame> {
        self.frames.get(&key)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, key: FrameKey) -> Option<&mut Frame> {
        self.frames.get_mut(&key)
    }

    #[inline]
    pub(crate) fn by_id(&self, id: &FrameId) -> Option<&Frame> {
        self.key_of(id).and_then(|key| self.frames.get(&key))
    }

    #[inline]
    pub(crate) fn by_id_mut(&mut self, id: &FrameId) -> Option<&mut Frame> {
        let key = self.key_of(id)?;
        self.frames.get_mut(&key)
    }

    #[inline]
    pub(crate) fn main_key(&self) -> Option<FrameKey> {
        self.main
    }

    pub(crate) fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values()
    }

    pub(crate) fn frames_mut(&mut self) -> impl Iterator<Item = &mut Frame> {
        self.frames.values_mut()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
