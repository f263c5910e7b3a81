//! Session lifecycle and subscriptions.
//!
//! `subscribe`/`unsubscribe` normalize their context arguments to
//! top-level ancestors before touching the subscription registry, so
//! events on any descendant fan out to the same channels.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::Result;
use crate::identifiers::{BrowsingContextId, Channel};
use crate::mapper::Engine;
use crate::protocol::command::{SessionNewParams, SubscriptionRequest};

// ============================================================================
// Handlers
// ============================================================================

/// `session.status`
pub fn status(_engine: &Engine) -> Result<Value> {
    // One client per mapper process; once connected the session is taken.
    Ok(json!({
        "ready": false,
        "message": "already connected",
    }))
}

/// `session.new`
pub fn new_session(engine: &Engine, _params: SessionNewParams) -> Result<Value> {
    Ok(json!({
        "sessionId": Uuid::new_v4().to_string(),
        "capabilities": {
            "acceptInsecureCerts": engine.config.accept_insecure_certs,
            "browserName": "chrome",
            "setWindowRect": false,
        },
    }))
}

/// `session.end`
pub fn end(engine: &Engine) -> Result<Value> {
    engine.end();
    Ok(json!({}))
}

/// `session.subscribe`
pub fn subscribe(
    engine: &Engine,
    params: SubscriptionRequest,
    channel: &Channel,
) -> Result<Value> {
    let contexts = normalize_contexts(engine, params.contexts.as_deref())?;
    engine
        .subscriptions
        .subscribe(&params.events, contexts.as_deref(), channel)?;
    Ok(json!({}))
}

/// `session.unsubscribe`
pub fn unsubscribe(
    engine: &Engine,
    params: SubscriptionRequest,
    channel: &Channel,
) -> Result<Value> {
    let contexts = normalize_contexts(engine, params.contexts.as_deref())?;
    engine
        .subscriptions
        .unsubscribe_all(&params.events, contexts.as_deref(), channel)?;
    Ok(json!({}))
}

/// Maps each context argument to its top-level ancestor.
///
/// A context no longer in the store passes through unchanged; the
/// registry then reports the missing subscription itself.
fn normalize_contexts(
    engine: &Engine,
    contexts: Option<&[BrowsingContextId]>,
) -> Result<Option<Vec<BrowsingContextId>>> {
    let Some(contexts) = contexts else {
        return Ok(None);
    };
    let normalized = contexts
        .iter()
        .map(|context| {
            engine
                .contexts
                .top_level_of(context)
                .unwrap_or_else(|_| context.clone())
        })
        .collect();
    Ok(Some(normalized))
}

// ============================================================================
// Tests
// ============================================================================
