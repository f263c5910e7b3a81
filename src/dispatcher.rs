//! Command dispatch and per-channel response ordering.
//!
//! One inbound frame flows through three stages: envelope parse, schema
//! validation into a typed [`Command`], then the module handler.
//! Handlers run concurrently, but each channel owns a response lane that
//! emits results in command arrival order, so responses within a
//! channel never reorder while channels stay independent.
//!
//! A panicking handler is isolated in its own task and surfaces as
//! `unknown error` without tearing down the session.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::Channel;
use crate::mapper::Engine;
use crate::module::{
    browser, browsing_context, input, network, permissions, script, session, storage,
};
use crate::protocol::command::Command;
use crate::protocol::frame::{CommandFrame, OutgoingMessage};

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes validated commands to module handlers.
pub struct Dispatcher {
    engine: Arc<Engine>,
    outgoing: mpsc::UnboundedSender<String>,
    lanes: Mutex<FxHashMap<Channel, mpsc::UnboundedSender<oneshot::Receiver<OutgoingMessage>>>>,
}

impl Dispatcher {
    /// Creates the dispatcher.
    #[must_use]
    pub fn new(engine: Arc<Engine>, outgoing: mpsc::UnboundedSender<String>) -> Self {
        Self {
            engine,
            outgoing,
            lanes: Mutex::new(FxHashMap::default()),
        }
    }

    /// Accepts one raw frame. Must be called in client arrival order;
    /// the per-channel ordering guarantee hangs off this call sequence.
    pub fn handle_frame(&self, text: &str) {
        let frame = match CommandFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Unparsable command frame");
                let message = OutgoingMessage::error(None, &e, &Channel::default_channel());
                let _ = self.outgoing.send(message.to_frame());
                return;
            }
        };

        let id = frame.id;
        let channel = match frame.channel() {
            Ok(channel) => channel,
            Err(e) => {
                let message = OutgoingMessage::error(Some(id), &e, &Channel::default_channel());
                let _ = self.outgoing.send(message.to_frame());
                return;
            }
        };

        // Reserve the response slot now: this is the ordering point.
        let (slot_tx, slot_rx) = oneshot::channel();
        let _ = self.lane(&channel).send(slot_rx);

        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let message = run_command(engine, frame, channel).await;
            let _ = slot_tx.send(message);
        });
    }

    /// Returns the channel's response lane, spawning its drain task on
    /// first use.
    fn lane(&self, channel: &Channel) -> mpsc::UnboundedSender<oneshot::Receiver<OutgoingMessage>> {
        let mut lanes = self.lanes.lock();
        if let Some(lane) = lanes.get(channel) {
            return lane.clone();
        }

        let (lane_tx, mut lane_rx) =
            mpsc::unbounded_channel::<oneshot::Receiver<OutgoingMessage>>();
        let outgoing = self.outgoing.clone();
        tokio::spawn(async move {
            while let Some(slot) = lane_rx.recv().await {
                if let Ok(message) = slot.await {
                    let _ = outgoing.send(message.to_frame());
                }
            }
        });

        lanes.insert(channel.clone(), lane_tx.clone());
        lane_tx
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// Validates and runs one command, rendering the response frame.
async fn run_command(engine: Arc<Engine>, frame: CommandFrame, channel: Channel) -> OutgoingMessage {
    let id = frame.id;

    if engine.is_ended() {
        return OutgoingMessage::error(Some(id), &Error::SessionEnded, &channel);
    }

    let command = match Command::parse(&frame.method, frame.params) {
        Ok(command) => command,
        Err(e) => return OutgoingMessage::error(Some(id), &e, &channel),
    };

    debug!(id = %id, method = %frame.method, channel = %channel, "Command accepted");

    // Run the handler in its own task so a panic is contained.
    let handler = {
        let channel = channel.clone();
        tokio::spawn(async move { dispatch(&engine, command, &channel).await })
    };

    match handler.await {
        Ok(Ok(result)) => OutgoingMessage::success(id, result, &channel),
        Ok(Err(e)) => OutgoingMessage::error(Some(id), &e, &channel),
        Err(join_error) => {
            warn!(id = %id, error = %join_error, "Handler panicked");
            let e = Error::unknown("Internal error in command handler");
            OutgoingMessage::error(Some(id), &e, &channel)
        }
    }
}

/// Static dispatch from the typed command to its module entrypoint.
async fn dispatch(engine: &Engine, command: Command, channel: &Channel) -> Result<Value> {
    match command {
        Command::SessionStatus => session::status(engine),
        Command::SessionNew(params) => session::new_session(engine, params),
        Command::SessionEnd => session::end(engine),
        Command::SessionSubscribe(params) => session::subscribe(engine, params, channel),
        Command::SessionUnsubscribe(params) => session::unsubscribe(engine, params, channel),

        Command::GetTree(params) => browsing_context::get_tree(engine, params),
        Command::Create(params) => browsing_context::create(engine, params).await,
        Command::Close(params) => browsing_context::close(engine, params).await,
        Command::Navigate(params) => browsing_context::navigate(engine, params).await,
        Command::Reload(params) => browsing_context::reload(engine, params).await,
        Command::TraverseHistory(params) => {
            browsing_context::traverse_history(engine, params).await
        }
        Command::Activate(params) => browsing_context::activate(engine, params).await,
        Command::HandleUserPrompt(params) => {
            browsing_context::handle_user_prompt(engine, params).await
        }

        Command::Evaluate(params) => script::evaluate(engine, params).await,
        Command::CallFunction(params) => script::call_function(engine, params).await,
        Command::Disown(params) => script::disown(engine, params).await,
        Command::GetRealms(params) => script::get_realms(engine, params),
        Command::AddPreloadScript(params) => script::add_preload_script(engine, params).await,
        Command::RemovePreloadScript(params) => {
            script::remove_preload_script(engine, params).await
        }

        Command::AddIntercept(params) => network::add_intercept(engine, params).await,
        Command::RemoveIntercept(params) => network::remove_intercept(engine, params).await,
        Command::ContinueRequest(params) => network::continue_request(engine, params).await,
        Command::ContinueResponse(params) => network::continue_response(engine, params).await,
        Command::ContinueWithAuth(params) => network::continue_with_auth(engine, params).await,
        Command::FailRequest(params) => network::fail_request(engine, params).await,
        Command::ProvideResponse(params) => network::provide_response(engine, params).await,
        Command::SetCacheBehavior(params) => network::set_cache_behavior(engine, params).await,

        Command::PerformActions(params) => input::perform_actions(engine, params).await,
        Command::ReleaseActions(params) => input::release_actions(engine, params).await,

        Command::GetCookies(params) => storage::get_cookies(engine, params).await,
        Command::SetCookie(params) => storage::set_cookie(engine, params).await,
        Command::DeleteCookies(params) => storage::delete_cookies(engine, params).await,

        Command::BrowserClose => browser::close(engine).await,
        Command::CreateUserContext => browser::create_user_context(engine).await,
        Command::RemoveUserContext(params) => browser::remove_user_context(engine, params).await,
        Command::GetUserContexts => browser::get_user_contexts(engine),

        Command::SetPermission(params) => permissions::set_permission(engine, params).await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockBrowser;
    use crate::config::MapperConfig;
    use crate::mapper::MapperSession;

    async fn session() -> (
        std::sync::Arc<MapperSession>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (_browser, pipe) = MockBrowser::new();
        MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect")
    }

    async fn next_json(outgoing: &mut mpsc::UnboundedReceiver<String>) -> Value {
        let frame = outgoing.recv().await.expect("frame");
        serde_json::from_str(&frame).expect("valid json")
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (session, mut outgoing) = session().await;
        session.handle_frame(r#"{"id":1,"method":"mystery.levitate","params":{}}"#);

        let response = next_json(&mut outgoing).await;
        assert_eq!(response["type"], "error");
        assert_eq!(response["error"], "unknown command");
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn test_schema_failure_is_invalid_argument() {
        let (session, mut outgoing) = session().await;
        session.handle_frame(r#"{"id":2,"method":"browsingContext.navigate","params":{"url":42}}"#);

        let response = next_json(&mut outgoing).await;
        assert_eq!(response["error"], "invalid argument");
        assert_eq!(response["id"], 2);
    }

    #[tokio::test]
    async fn test_unparsable_frame_reports_without_id() {
        let (session, mut outgoing) = session().await;
        session.handle_frame("this is not json");

        let response = next_json(&mut outgoing).await;
        assert_eq!(response["type"], "error");
        assert!(response.get("id").is_none());
    }

    #[tokio::test]
    async fn test_conflicting_channels_rejected() {
        let (session, mut outgoing) = session().await;
        session.handle_frame(
            r#"{"id":3,"method":"session.status","params":{},"channel":"a","goog:channel":"b"}"#,
        );

        let response = next_json(&mut outgoing).await;
        assert_eq!(response["error"], "invalid argument");
    }

    #[tokio::test]
    async fn test_channel_echoed_on_success() {
        let (session, mut outgoing) = session().await;
        session.handle_frame(r#"{"id":4,"method":"session.status","params":{},"channel":"ch-1"}"#);

        let response = next_json(&mut outgoing).await;
        assert_eq!(response["type"], "success");
        assert_eq!(response["channel"], "ch-1");
    }

    #[tokio::test]
    async fn test_responses_ordered_within_channel() {
        let (session, mut outgoing) = session().await;

        // Both commands are fed back to back; the second completes
        // instantly while the first round-trips the mock browser. The
        // lane still emits them in arrival order.
        session.handle_frame(r#"{"id":10,"method":"browser.createUserContext","params":{}}"#);
        session.handle_frame(r#"{"id":11,"method":"session.status","params":{}}"#);

        let first = next_json(&mut outgoing).await;
        let second = next_json(&mut outgoing).await;
        assert_eq!(first["id"], 10);
        assert_eq!(second["id"], 11);
    }

    #[tokio::test]
    async fn test_commands_after_end_fail() {
        let (session, mut outgoing) = session().await;
        session.handle_frame(r#"{"id":20,"method":"session.end","params":{}}"#);
        let response = next_json(&mut outgoing).await;
        assert_eq!(response["type"], "success");

        session.handle_frame(r#"{"id":21,"method":"session.status","params":{}}"#);
        let response = next_json(&mut outgoing).await;
        assert_eq!(response["error"], "unknown error");
        assert_eq!(response["message"], "session ended");
    }
}
