//! One-shot wait gate.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

// ============================================================================
// Gate
// ============================================================================

/// A one-shot latch released at most once.
///
/// `release` is idempotent and wakes every waiter. Clones share state.
///
/// # Example
///
/// ```ignore
/// let gate = Gate::new();
/// let waiter = gate.clone();
///
/// tokio::spawn(async move { waiter.release() });
/// assert!(gate.wait(Duration::from_secs(1)).await);
/// ```
#[derive(Debug, Clone)]
pub struct Gate {
    inner: Arc<watch::Sender<bool>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Creates an unreleased gate.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { inner: Arc::new(tx) }
    }

    /// Releases the gate. Later calls have no effect.
    pub fn release(&self) {
        self.inner.send_if_modified(|released| {
            if *released {
                false
            } else {
                *released = true;
                true
            }
        });
    }

    /// Returns `true` if the gate has been released.
    #[inline]
    #[must_use]
    pub fn is_released(&self) -> bool {
        *self.inner.borrow()
    }

    /// Waits until the gate is released or `limit` elapses.
    ///
    /// Returns `true` if the gate was released in time.
    pub async fn wait(&self, limit: Duration) -> bool {
        let mut rx = self.inner.subscribe();
        matches!(timeout(limit, rx.wait_for(|released| *released)).await, Ok(Ok(_)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_after_release() {
        let gate = Gate::new();
        gate.release();

        assert!(gate.is_released());
        assert!(gate.wait(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let gate = Gate::new();
        assert!(!gate.wait(Duration::from_millis(20)).await);
        assert!(!gate.is_released());
    }

    #[tokio::test]
    async fn test_release_wakes_all_waiters() {
        let gate = Gate::new();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait(Duration::from_secs(5)).await })
            })
            .collect();

        tokio::task::yield_now().await;
        gate.release();
        gate.release();

        for waiter in waiters {
            assert!(waiter.await.expect("join"));
        }
    }
}
