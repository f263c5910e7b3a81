//! In-memory browser double for tests.
//!
//! [`MockBrowser`] plays the browser side of a [`CdpPipe`]: it records
//! every call, answers with canned or default results, and lets tests
//! inject CDP events. Integration tests drive full command/event flows
//! through it without a real browser.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::Result;

use super::connection::CdpPipe;

// ============================================================================
// CdpCall
// ============================================================================

/// One recorded CDP call.
#[derive(Debug, Clone)]
pub struct CdpCall {
    /// Call id.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Call params.
    pub params: Value,
    /// Session the call targeted, if any.
    pub session_id: Option<String>,
}

// ============================================================================
// MockBrowser
// ============================================================================

enum CannedReply {
    Result(Value),
    Error(String),
}

struct Inner {
    calls: Mutex<Vec<CdpCall>>,
    replies: Mutex<FxHashMap<String, CannedReply>>,
    to_mapper: mpsc::UnboundedSender<String>,
    hold: AtomicBool,
    next_minted: AtomicU64,
}

/// Handle controlling the browser double.
#[derive(Clone)]
pub struct MockBrowser {
    inner: Arc<Inner>,
}

impl MockBrowser {
    /// Creates the browser double and the pipe to hand to
    /// [`super::CdpConnection::new`].
    #[must_use]
    pub fn new() -> (Self, MockPipe) {
        let (to_mapper, from_browser) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(FxHashMap::default()),
            to_mapper,
            hold: AtomicBool::new(false),
            next_minted: AtomicU64::new(1),
        });

        let browser = Self {
            inner: Arc::clone(&inner),
        };
        let pipe = MockPipe {
            inner,
            from_browser,
        };
        (browser, pipe)
    }

    /// Returns every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<CdpCall> {
        self.inner.calls.lock().clone()
    }

    /// Returns the calls recorded for one method.
    #[must_use]
    pub fn calls_for(&self, method: &str) -> Vec<CdpCall> {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Overrides the result for a method.
    pub fn respond_with(&self, method: &str, result: Value) {
        self.inner
            .replies
            .lock()
            .insert(method.to_string(), CannedReply::Result(result));
    }

    /// Makes a method fail with a CDP error message.
    pub fn fail_with(&self, method: &str, message: &str) {
        self.inner
            .replies
            .lock()
            .insert(method.to_string(), CannedReply::Error(message.to_string()));
    }

    /// Stops auto-responding; in-flight calls stay pending.
    pub fn hold_responses(&self) {
        self.inner.hold.store(true, Ordering::SeqCst);
    }

    /// Injects a CDP event toward the mapper.
    pub fn emit_event(&self, method: &str, params: Value, session_id: Option<&str>) {
        let mut frame = json!({
            "method": method,
            "params": params,
        });
        if let Some(session_id) = session_id {
            frame["sessionId"] = Value::from(session_id);
        }
        let _ = self.inner.to_mapper.send(frame.to_string());
    }

    fn mint(&self, prefix: &str) -> String {
        let n = self.inner.next_minted.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{n}")
    }

    /// Built-in results for methods whose shape handlers rely on.
    fn default_result(&self, method: &str) -> Value {
        match method {
            "Target.attachToTarget" => json!({"sessionId": self.mint("session")}),
            "Target.createTarget" => json!({"targetId": self.mint("target")}),
            "Target.createBrowserContext" => {
                json!({"browserContextId": self.mint("user-context")})
            }
            "Target.getTargets" => json!({"targetInfos": []}),
            "Page.navigate" => json!({"frameId": "frame-main", "loaderId": self.mint("loader")}),
            "Page.createIsolatedWorld" => json!({"executionContextId": 1000}),
            "Page.addScriptToEvaluateOnNewDocument" => {
                json!({"identifier": self.mint("cdp-preload")})
            }
            "Runtime.evaluate" | "Runtime.callFunctionOn" => {
                json!({"result": {"type": "undefined", "deepSerializedValue": {"type": "undefined"}}})
            }
            "Storage.getCookies" => json!({"cookies": []}),
            "Browser.getVersion" => json!({
                "protocolVersion": "1.3",
                "product": "MockBrowser/1.0",
            }),
            _ => json!({}),
        }
    }
}

// ============================================================================
// MockPipe
// ============================================================================

/// The pipe half handed to the connection.
pub struct MockPipe {
    inner: Arc<Inner>,
    from_browser: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl CdpPipe for MockPipe {
    async fn send(&mut self, frame: String) -> Result<()> {
        let parsed: Value = serde_json::from_str(&frame).unwrap_or(Value::Null);
        let id = parsed["id"].as_u64().unwrap_or(0);
        let method = parsed["method"].as_str().unwrap_or_default().to_string();
        let session_id = parsed["sessionId"].as_str().map(str::to_string);

        let call = CdpCall {
            id,
            method: method.clone(),
            params: parsed.get("params").cloned().unwrap_or(Value::Null),
            session_id: session_id.clone(),
        };

        let browser = MockBrowser {
            inner: Arc::clone(&self.inner),
        };
        self.inner.calls.lock().push(call);

        if self.inner.hold.load(Ordering::SeqCst) {
            return Ok(());
        }

        let reply = {
            let replies = self.inner.replies.lock();
            match replies.get(&method) {
                Some(CannedReply::Result(result)) => Ok(result.clone()),
                Some(CannedReply::Error(message)) => Err(message.clone()),
                None => Ok(browser.default_result(&method)),
            }
        };

        let mut response = match reply {
            Ok(result) => json!({"id": id, "result": result}),
            Err(message) => json!({"id": id, "error": {"code": -32000, "message": message}}),
        };
        if let Some(session_id) = session_id {
            response["sessionId"] = Value::from(session_id);
        }

        let _ = self.inner.to_mapper.send(response.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Option<String> {
        self.from_browser.recv().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_responds() {
        let (browser, mut pipe) = MockBrowser::new();

        pipe.send(r#"{"id":1,"method":"Browser.getVersion","params":{}}"#.to_string())
            .await
            .expect("send");

        let response = pipe.recv().await.expect("response");
        let parsed: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["id"], 1);
        assert_eq!(parsed["result"]["product"], "MockBrowser/1.0");

        assert_eq!(browser.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_canned_error() {
        let (browser, mut pipe) = MockBrowser::new();
        browser.fail_with("Page.navigate", "nope");

        pipe.send(r#"{"id":2,"method":"Page.navigate","params":{}}"#.to_string())
            .await
            .expect("send");

        let response = pipe.recv().await.expect("response");
        let parsed: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["error"]["message"], "nope");
    }

    #[tokio::test]
    async fn test_minted_ids_distinct() {
        let (browser, mut pipe) = MockBrowser::new();

        for id in 1..=2u64 {
            pipe.send(format!(
                r#"{{"id":{id},"method":"Target.createTarget","params":{{}}}}"#
            ))
            .await
            .expect("send");
        }

        let first: Value = serde_json::from_str(&pipe.recv().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&pipe.recv().await.unwrap()).unwrap();
        assert_ne!(first["result"]["targetId"], second["result"]["targetId"]);
        assert_eq!(browser.calls_for("Target.createTarget").len(), 2);
    }
}
