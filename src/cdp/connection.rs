//! CDP connection and event loop.
//!
//! This module handles the southbound connection to the browser,
//! including request/response correlation and event fan-in.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the browser (responses, events)
//! - Outgoing calls from command handlers
//! - Correlation by mapper-local call id
//! - Event forwarding to the event processors, in receive order

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CdpSessionId;

// ============================================================================
// Types
// ============================================================================

/// Map of in-flight call ids to response channels.
type CorrelationMap = FxHashMap<u64, oneshot::Sender<Result<Value>>>;

/// A CDP event received from the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method, e.g. `Page.loadEventFired`.
    pub method: String,
    /// Event params.
    pub params: Value,
    /// Session the event arrived on; `None` for browser-level events.
    pub session_id: Option<CdpSessionId>,
}

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a raw frame to the browser.
    Send { frame: String, call_id: u64 },
    /// Shut down the connection.
    Shutdown,
}

// ============================================================================
// CdpPipe
// ============================================================================

/// A raw bidirectional frame pipe to the browser.
///
/// The concrete wire library (WebSocket, pipe pair) lives behind this
/// trait; the mapper never sees more than text frames.
#[async_trait]
pub trait CdpPipe: Send + 'static {
    /// Sends one frame toward the browser.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Receives the next frame from the browser.
    ///
    /// Returns `None` when the pipe is closed.
    async fn recv(&mut self) -> Option<String>;
}

// ============================================================================
// Wire Frames
// ============================================================================

#[derive(Debug, Deserialize)]
struct IncomingFrame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<CdpErrorBody>,
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdpErrorBody {
    #[serde(default)]
    message: String,
}

// ============================================================================
// CdpConnection
// ============================================================================

/// Connection to the browser with correlation and session routing.
///
/// # Thread Safety
///
/// `CdpConnection` is `Send + Sync` and can be shared across tasks.
/// All operations are non-blocking; calls suspend only on their own
/// response.
pub struct CdpConnection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Mapper-local call id counter.
    next_call_id: AtomicU64,
}

impl CdpConnection {
    /// Creates a connection over a pipe and spawns the event loop.
    ///
    /// Returns the connection and the receiver carrying CDP events in
    /// receive order.
    pub fn new(pipe: impl CdpPipe) -> (Arc<Self>, mpsc::UnboundedReceiver<CdpEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        tokio::spawn(Self::run_event_loop(
            pipe,
            command_rx,
            Arc::clone(&correlation),
            event_tx,
        ));

        let connection = Arc::new(Self {
            command_tx,
            correlation,
            next_call_id: AtomicU64::new(1),
        });

        (connection, event_rx)
    }

    /// Issues a browser-level CDP call.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionEnded`] when the connection is closed.
    /// - [`Error::CdpFailure`] when the browser rejects the call.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_on(None, method, params).await
    }

    /// Issues a CDP call on a target session.
    ///
    /// # Errors
    ///
    /// Same as [`CdpConnection::send`].
    pub async fn send_on(
        &self,
        session: Option<&CdpSessionId>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);

        let mut frame = json!({
            "id": call_id,
            "method": method,
            "params": params,
        });
        if let Some(session) = session {
            frame["sessionId"] = Value::from(session.as_str());
        }
        let frame = frame.to_string();

        let (response_tx, response_rx) = oneshot::channel();

        // Register correlation before sending to avoid a lost response.
        self.correlation.lock().insert(call_id, response_tx);

        if self
            .command_tx
            .send(ConnectionCommand::Send { frame, call_id })
            .is_err()
        {
            self.correlation.lock().remove(&call_id);
            return Err(Error::SessionEnded);
        }

        trace!(call_id, method, "CDP call sent");

        match response_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::SessionEnded),
        }
    }

    /// Returns a per-target handle bound to one CDP session.
    #[must_use]
    pub fn session(self: &Arc<Self>, session_id: CdpSessionId) -> CdpSession {
        CdpSession {
            connection: Arc::clone(self),
            session_id,
        }
    }

    /// Returns the number of in-flight calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection; every in-flight call fails with
    /// `session ended`.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop pumping the pipe.
    async fn run_event_loop(
        mut pipe: impl CdpPipe,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        event_tx: mpsc::UnboundedSender<CdpEvent>,
    ) {
        loop {
            tokio::select! {
                frame = pipe.recv() => {
                    match frame {
                        Some(text) => {
                            Self::handle_incoming_frame(&text, &correlation, &event_tx);
                        }
                        None => {
                            debug!("CDP pipe closed by browser");
                            break;
                        }
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { frame, call_id }) => {
                            if let Err(e) = pipe.send(frame).await {
                                if let Some(tx) = correlation.lock().remove(&call_id) {
                                    let _ = tx.send(Err(e));
                                }
                            }
                        }

                        Some(ConnectionCommand::Shutdown) | None => {
                            debug!("CDP connection shutting down");
                            break;
                        }
                    }
                }
            }
        }

        Self::fail_pending_calls(&correlation);

        debug!("CDP event loop terminated");
    }

    /// Handles one incoming frame: response or event.
    fn handle_incoming_frame(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        event_tx: &mpsc::UnboundedSender<CdpEvent>,
    ) {
        let frame: IncomingFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Unparsable CDP frame");
                return;
            }
        };

        if let Some(id) = frame.id {
            let tx = correlation.lock().remove(&id);

            let Some(tx) = tx else {
                warn!(id, "CDP response for unknown call");
                return;
            };

            let result = match frame.error {
                Some(error) => Err(Error::cdp(error.message)),
                None => Ok(frame.result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(result);
            return;
        }

        if let Some(method) = frame.method {
            let event = CdpEvent {
                method,
                params: frame.params.unwrap_or(Value::Null),
                session_id: frame.session_id.map(CdpSessionId::new),
            };
            let _ = event_tx.send(event);
            return;
        }

        warn!(text = %text, "CDP frame is neither response nor event");
    }

    /// Fails all in-flight calls with `session ended`.
    fn fail_pending_calls(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::SessionEnded));
        }

        if count > 0 {
            debug!(count, "Failed in-flight CDP calls on shutdown");
        }
    }
}

// ============================================================================
// CdpSession
// ============================================================================

/// A per-target CDP handle.
#[derive(Clone)]
pub struct CdpSession {
    connection: Arc<CdpConnection>,
    session_id: CdpSessionId,
}

impl CdpSession {
    /// Issues a CDP call on this session.
    ///
    /// # Errors
    ///
    /// Same as [`CdpConnection::send`].
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.connection
            .send_on(Some(&self.session_id), method, params)
            .await
    }

    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &CdpSessionId {
        &self.session_id
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockBrowser;

    #[tokio::test]
    async fn test_send_correlates_response() {
        let (browser, pipe) = MockBrowser::new();
        let (connection, _events) = CdpConnection::new(pipe);

        let result = connection
            .send("Browser.getVersion", json!({}))
            .await
            .expect("call succeeds");
        assert_eq!(result, json!({}));

        let calls = browser.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "Browser.getVersion");
    }

    #[tokio::test]
    async fn test_cdp_error_surfaces_message() {
        let (browser, pipe) = MockBrowser::new();
        browser.fail_with("Page.navigate", "Cannot navigate to invalid URL");
        let (connection, _events) = CdpConnection::new(pipe);

        let err = connection
            .send("Page.navigate", json!({"url": "bogus"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot navigate to invalid URL");
        assert_eq!(err.error_code(), "unknown error");
    }

    #[tokio::test]
    async fn test_events_forwarded_in_order() {
        let (browser, pipe) = MockBrowser::new();
        let (_connection, mut events) = CdpConnection::new(pipe);

        browser.emit_event("Page.loadEventFired", json!({"timestamp": 1.0}), None);
        browser.emit_event("Page.loadEventFired", json!({"timestamp": 2.0}), None);

        let first = events.recv().await.expect("first event");
        let second = events.recv().await.expect("second event");
        assert_eq!(first.params["timestamp"], 1.0);
        assert_eq!(second.params["timestamp"], 2.0);
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending() {
        let (browser, pipe) = MockBrowser::new();
        browser.hold_responses();
        let (connection, _events) = CdpConnection::new(pipe);

        let pending = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move { connection.send("Target.getTargets", json!({})).await })
        };

        // Let the call register before shutting down.
        tokio::task::yield_now().await;
        connection.shutdown();

        let result = pending.await.expect("task joined");
        assert!(matches!(result, Err(Error::SessionEnded)));
    }

    #[tokio::test]
    async fn test_session_routing() {
        let (browser, pipe) = MockBrowser::new();
        let (connection, _events) = CdpConnection::new(pipe);

        let session = connection.session(CdpSessionId::new("session-7"));
        session
            .send("Page.enable", json!({}))
            .await
            .expect("call succeeds");

        let calls = browser.calls();
        assert_eq!(calls[0].session_id.as_deref(), Some("session-7"));
    }
}
