//! Test harness: a transport that records outbound frames.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::transport::Transport;

// ============================================================================
// RecordingTransport
// ============================================================================

/// Transport capturing every outbound frame for inspection.
#[derive(Debug, Clone)]
pub(crate) struct RecordingTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Waits for the next outbound call and parses it.
    pub(crate) async fn next_call(&mut self) -> Value {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(call) = self.try_next_call() {
                return call;
            }
            assert!(
                Instant::now() < deadline,
                "no outbound call within 5s"
            );
            sleep(Duration::from_millis(1)).await;
        }
    }

    /// Returns the next outbound call if one is queued.
    pub(crate) fn try_next_call(&mut self) -> Option<Value> {
        let text = self.rx.lock().try_recv().ok()?;
        Some(serde_json::from_str(&text).expect("outbound frame is JSON"))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn send(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.tx.send(text).map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Frames
// ============================================================================

/// `Target.attachedToTarget` broadcast for `session_id`.
pub(crate) fn attach_frame(session_id: &str, target_type: &str) -> String {
    json!({
        "method": "Target.attachedToTarget",
        "params": {
            "sessionId": session_id,
            "targetInfo": {
                "targetId": format!("target-{session_id}"),
                "type": target_type,
                "url": "about:blank"
            },
            "waitingForDebugger": false
        }
    })
    .to_string()
}

/// `Target.detachedFromTarget` broadcast for `session_id`.
pub(crate) fn detach_frame(session_id: &str) -> String {
    json!({
        "method": "Target.detachedFromTarget",
        "params": { "sessionId": session_id }
    })
    .to_string()
}

/// A session-scoped event frame.
pub(crate) fn event_frame(session_id: &str, method: &str, params: Value) -> String {
    json!({ "method": method, "params": params, "sessionId": session_id }).to_string()
}

/// A session-scoped response frame.
pub(crate) fn response_frame(session_id: &str, id: &Value, result: Value) -> String {
    json!({ "id": id, "result": result, "sessionId": session_id }).to_string()
}

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
