//! Mapper engine and session wiring.
//!
//! [`MapperSession`] is the coordinator: it builds the stores, connects
//! the CDP layer, spawns the event processors, and owns the dispatcher.
//! Teardown drops everything; no state persists.
//!
//! # Example
//!
//! ```ignore
//! use bidi_mapper::{MapperConfig, MapperSession};
//! use bidi_mapper::cdp::MockBrowser;
//!
//! # async fn example() -> bidi_mapper::Result<()> {
//! let (_browser, pipe) = MockBrowser::new();
//! let (session, mut outgoing) = MapperSession::connect(MapperConfig::default(), pipe).await?;
//!
//! session.handle_frame(r#"{"id":1,"method":"session.status","params":{}}"#);
//! let response = outgoing.recv().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

use crate::cdp::connection::{CdpConnection, CdpPipe};
use crate::config::MapperConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::module::input::InputStateStore;
use crate::processor;
use crate::protocol::event::EventData;
use crate::router::EventRouter;
use crate::store::context::BrowsingContextStore;
use crate::store::network::NetworkStore;
use crate::store::preload::PreloadScriptStore;
use crate::store::realm::RealmStore;
use crate::store::user_context::UserContextStore;
use crate::subscription::SubscriptionManager;

// ============================================================================
// Engine
// ============================================================================

/// Shared engine state: stores, subscription registry, CDP handle, and
/// the event router. Built at startup, dropped at teardown.
pub struct Engine {
    /// Engine configuration.
    pub config: MapperConfig,
    /// Context tree and navigation machine.
    pub contexts: BrowsingContextStore,
    /// Realm registry.
    pub realms: RealmStore,
    /// Network requests and intercepts.
    pub network: NetworkStore,
    /// Preload script registry.
    pub preload: PreloadScriptStore,
    /// User contexts and permission grants.
    pub user_contexts: UserContextStore,
    /// Subscription registry.
    pub subscriptions: SubscriptionManager,
    /// Pressed-input bookkeeping per context.
    pub input: InputStateStore,
    /// Southbound CDP connection.
    pub cdp: Arc<CdpConnection>,
    /// Event fan-out.
    pub router: EventRouter,

    ended: AtomicBool,
    end_notify: Notify,
}

impl Engine {
    /// Emits a BiDi event through the router.
    pub fn emit_event(&self, event: EventData) {
        self.router.emit(&self.subscriptions, &self.contexts, event);
    }

    /// Emits with an explicit top-level routing context; for teardown
    /// events whose context already left the store.
    pub fn emit_event_at(
        &self,
        event: EventData,
        top_level: Option<&crate::identifiers::BrowsingContextId>,
    ) {
        self.router.emit_at(&self.subscriptions, event, top_level);
    }

    /// The per-handler wait cap.
    #[inline]
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.config.idle_timeout()
    }

    /// Returns `true` once the session has ended.
    #[inline]
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Ends the session: the CDP connection shuts down, pending waits
    /// wake, and every in-flight command resolves with `session ended`.
    pub fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Session ending");
        self.cdp.shutdown();
        self.contexts.wake_all();
        self.end_notify.notify_waiters();
    }

    /// Resolves once the session ends. Registers before checking, so a
    /// concurrent [`Engine::end`] is never missed.
    pub async fn until_ended(&self) {
        loop {
            let notified = self.end_notify.notified();
            if self.is_ended() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// MapperSession
// ============================================================================

/// One mapper session bridging a BiDi client to a browser.
pub struct MapperSession {
    engine: Arc<Engine>,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for MapperSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperSession").finish_non_exhaustive()
    }
}

impl MapperSession {
    /// Connects to the browser over `pipe` and boots the engine.
    ///
    /// Returns the session and the receiver carrying serialized
    /// northbound frames (responses and events) for the transport to
    /// deliver.
    ///
    /// # Errors
    ///
    /// Returns `session not created` when the browser handshake fails.
    pub async fn connect(
        config: MapperConfig,
        pipe: impl CdpPipe,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<String>)> {
        let (cdp, cdp_events) = CdpConnection::new(pipe);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let engine = Arc::new(Engine {
            contexts: BrowsingContextStore::new(),
            realms: RealmStore::new(),
            network: NetworkStore::new(),
            preload: PreloadScriptStore::new(),
            user_contexts: UserContextStore::new(),
            subscriptions: SubscriptionManager::new(),
            input: InputStateStore::new(),
            cdp: Arc::clone(&cdp),
            router: EventRouter::new(outgoing_tx.clone()),
            ended: AtomicBool::new(false),
            end_notify: Notify::new(),
            config,
        });

        Self::bootstrap(&engine).await?;

        tokio::spawn(processor::run(Arc::clone(&engine), cdp_events));

        let dispatcher = Dispatcher::new(Arc::clone(&engine), outgoing_tx);
        let session = Arc::new(Self { engine, dispatcher });

        Ok((session, outgoing_rx))
    }

    /// Handshakes with the browser and arms auto-attach.
    async fn bootstrap(engine: &Engine) -> Result<()> {
        let version = engine
            .cdp
            .send("Browser.getVersion", json!({}))
            .await
            .map_err(|e| Error::session_not_created(format!("Browser handshake failed: {e}")))?;
        debug!(
            product = version["product"].as_str().unwrap_or("unknown"),
            "Browser handshake complete"
        );

        engine
            .cdp
            .send(
                "Target.setAutoAttach",
                json!({
                    "autoAttach": true,
                    "waitForDebuggerOnStart": false,
                    "flatten": true,
                }),
            )
            .await
            .map_err(|e| Error::session_not_created(format!("Auto-attach failed: {e}")))?;

        if engine.config.accept_insecure_certs {
            engine
                .cdp
                .send(
                    "Security.setIgnoreCertificateErrors",
                    json!({"ignore": true}),
                )
                .await?;
        }

        Ok(())
    }

    /// Feeds one inbound client frame to the dispatcher.
    ///
    /// Responses within a channel come back in the order frames were
    /// fed; events interleave freely.
    pub fn handle_frame(&self, text: &str) {
        self.dispatcher.handle_frame(text);
    }

    /// Returns `true` once the session has ended.
    #[inline]
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.engine.is_ended()
    }

    /// Ends the session; used by the transport on client disconnect.
    pub fn end(&self) {
        self.engine.end();
    }

    #[cfg(test)]
    pub(crate) fn engine_for_tests(&self) -> &Engine {
        &self.engine
    }
}

// ============================================================================
// Tests
// ============================================================================
