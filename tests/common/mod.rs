//! Shared harness for end-to-end scenario tests.
//!
//! Drives a full `MapperSession` against the in-memory browser double:
//! client frames go in through `send`, northbound frames come back out
//! of `next_frame`, and browser-side activity is injected through the
//! `MockBrowser` handle.

use std::sync::Once;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

use bidi_mapper::cdp::MockBrowser;
use bidi_mapper::{MapperConfig, MapperSession};

static TRACING: Once = Once::new();

/// Installs the test subscriber once; `RUST_LOG` controls verbosity.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct Harness {
    pub browser: MockBrowser,
    pub session: std::sync::Arc<MapperSession>,
    outgoing: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    /// Boots a mapper session over the mock browser.
    pub async fn start() -> Self {
        Self::start_with(MapperConfig::default()).await
    }

    pub async fn start_with(config: MapperConfig) -> Self {
        init_tracing();
        let (browser, pipe) = MockBrowser::new();
        let (session, outgoing) = MapperSession::connect(config, pipe)
            .await
            .expect("mapper connects");
        Self {
            browser,
            session,
            outgoing,
        }
    }

    /// Feeds one client frame.
    pub fn send(&self, frame: &str) {
        self.session.handle_frame(frame);
    }

    /// Receives the next northbound frame as JSON.
    pub async fn next_frame(&mut self) -> Value {
        let frame = timeout(Duration::from_secs(2), self.outgoing.recv())
            .await
            .expect("frame within deadline")
            .expect("outgoing channel open");
        serde_json::from_str(&frame).expect("valid json frame")
    }

    /// Attaches a page target and waits for the mapper to track it.
    pub async fn attach_page(&self, target_id: &str, cdp_session: &str) {
        self.browser.emit_event(
            "Target.attachedToTarget",
            json!({
                "sessionId": cdp_session,
                "targetInfo": {
                    "targetId": target_id,
                    "type": "page",
                    "url": "about:blank",
                },
            }),
            None,
        );
        self.wait_until(|| {
            self.browser
                .calls_for("Page.enable")
                .iter()
                .any(|c| c.session_id.as_deref() == Some(cdp_session))
        })
        .await;
    }

    /// Attaches a child frame under a parent context.
    pub fn attach_frame(&self, frame_id: &str, parent: &str, cdp_session: &str) {
        self.browser.emit_event(
            "Page.frameAttached",
            json!({"frameId": frame_id, "parentFrameId": parent}),
            Some(cdp_session),
        );
    }

    /// Polls a predicate with a deadline.
    pub async fn wait_until<F: Fn() -> bool>(&self, predicate: F) {
        for _ in 0..400 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached within deadline");
    }

    /// Waits until a CDP method has been called at least `count` times.
    pub async fn wait_calls(&self, method: &str, count: usize) {
        self.wait_until(|| self.browser.calls_for(method).len() >= count)
            .await;
    }
}
