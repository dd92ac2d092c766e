//! Event subscription by name.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::identifiers::SubscriptionId;
use crate::protocol::ProtocolEvent;

// ============================================================================
// Types
// ============================================================================

/// Event listener callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Events an emitter can route by name.
pub trait NamedEvent {
    /// Name listeners subscribe to.
    fn name(&self) -> &str;
}

impl NamedEvent for ProtocolEvent {
    #[inline]
    fn name(&self) -> &str {
        self.method()
    }
}

// ============================================================================
// EventEmitter
// ============================================================================

/// Listener registry keyed by event name.
///
/// Emission snapshots the listener list first, so listeners may subscribe
/// or unsubscribe while being invoked.
pub struct EventEmitter<E> {
    listeners: RwLock<FxHashMap<String, Vec<(SubscriptionId, Listener<E>)>>>,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<E: NamedEvent> EventEmitter<E> {
    /// Creates an emitter with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `name`.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.listeners
            .write()
            .entry(name.into())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let mut removed = false;

        listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });

        removed
    }

    /// Invokes every listener registered for the event's name.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = match self.listeners.read().get(event.name()) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };

        for listener in snapshot {
            listener(event);
        }
    }
}

impl<E> EventEmitter<E> {
    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Named(&'static str);

    impl NamedEvent for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_emit_by_name() {
        let emitter = EventEmitter::<Named>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        emitter.on("a", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&Named("a"));
        emitter.emit(&Named("b"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_is_idempotent() {
        let emitter = EventEmitter::<Named>::new();
        let id = emitter.on("a", |_| {});

        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_emit() {
        let emitter = Arc::new(EventEmitter::<Named>::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(parking_lot::Mutex::new(None));

        let weak = Arc::downgrade(&emitter);
        let counter = Arc::clone(&hits);
        let own_id = Arc::clone(&slot);
        let id = emitter.on("a", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(emitter), Some(id)) = (weak.upgrade(), *own_id.lock()) {
                emitter.off(id);
            }
        });
        *slot.lock() = Some(id);

        emitter.emit(&Named("a"));
        emitter.emit(&Named("a"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
