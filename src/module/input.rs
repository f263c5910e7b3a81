//! Input commands: action dispatch.
//!
//! Source action timelines translate tick by tick into CDP
//! `Input.dispatchKeyEvent` / `Input.dispatchMouseEvent` calls. Pressed
//! keys and buttons are tracked per context so `releaseActions` can
//! undo them in reverse order.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::identifiers::BrowsingContextId;
use crate::mapper::Engine;
use crate::protocol::command::{
    InputSourceType, PerformActionsParams, ReleaseActionsParams, SourceActions,
};

// ============================================================================
// InputStateStore
// ============================================================================

/// One pressed input, remembered for release.
#[derive(Debug, Clone)]
enum PressedInput {
    /// A held key, by its `key` value.
    Key(String),
    /// A held mouse button plus the last pointer position.
    Button { button: String, x: f64, y: f64 },
}

/// Pressed-input bookkeeping per context.
#[derive(Default)]
pub struct InputStateStore {
    pressed: Mutex<FxHashMap<BrowsingContextId, Vec<PressedInput>>>,
}

impl InputStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, context: &BrowsingContextId, input: PressedInput) {
        self.pressed
            .lock()
            .entry(context.clone())
            .or_default()
            .push(input);
    }

    fn pop_key(&self, context: &BrowsingContextId, key: &str) {
        if let Some(pressed) = self.pressed.lock().get_mut(context) {
            if let Some(index) = pressed
                .iter()
                .rposition(|p| matches!(p, PressedInput::Key(k) if k == key))
            {
                pressed.remove(index);
            }
        }
    }

    fn pop_button(&self, context: &BrowsingContextId, button: &str) {
        if let Some(pressed) = self.pressed.lock().get_mut(context) {
            if let Some(index) = pressed
                .iter()
                .rposition(|p| matches!(p, PressedInput::Button { button: b, .. } if b == button))
            {
                pressed.remove(index);
            }
        }
    }

    fn drain(&self, context: &BrowsingContextId) -> Vec<PressedInput> {
        self.pressed.lock().remove(context).unwrap_or_default()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `input.performActions`
pub async fn perform_actions(engine: &Engine, params: PerformActionsParams) -> Result<Value> {
    engine.contexts.expect(&params.context)?;
    let session = engine.contexts.session_of(&params.context)?;

    // Tick-major order: all sources advance together, so interleave by
    // tick index.
    let tick_count = params
        .actions
        .iter()
        .map(|source| source.actions.len())
        .max()
        .unwrap_or(0);

    for tick in 0..tick_count {
        for source in &params.actions {
            let Some(action) = source.actions.get(tick) else {
                continue;
            };
            dispatch_action(engine, &params.context, &session, source, action).await?;
        }
    }

    Ok(json!({}))
}

/// `input.releaseActions`
pub async fn release_actions(engine: &Engine, params: ReleaseActionsParams) -> Result<Value> {
    engine.contexts.expect(&params.context)?;
    let session = engine.contexts.session_of(&params.context)?;

    // Undo most recent first.
    let mut pressed = engine.input.drain(&params.context);
    pressed.reverse();

    for input in pressed {
        match input {
            PressedInput::Key(key) => {
                engine
                    .cdp
                    .send_on(
                        Some(&session),
                        "Input.dispatchKeyEvent",
                        json!({"type": "keyUp", "key": key}),
                    )
                    .await?;
            }
            PressedInput::Button { button, x, y } => {
                engine
                    .cdp
                    .send_on(
                        Some(&session),
                        "Input.dispatchMouseEvent",
                        json!({"type": "mouseReleased", "button": button, "x": x, "y": y}),
                    )
                    .await?;
            }
        }
    }

    Ok(json!({}))
}

// ============================================================================
// Action Translation
// ============================================================================

async fn dispatch_action(
    engine: &Engine,
    context: &BrowsingContextId,
    session: &crate::identifiers::CdpSessionId,
    source: &SourceActions,
    action: &Value,
) -> Result<()> {
    let action_type = action["type"].as_str().unwrap_or_default();

    match (source.source_type, action_type) {
        (_, "pause") => {
            let duration = action["duration"].as_u64().unwrap_or(0);
            if duration > 0 {
                tokio::time::sleep(Duration::from_millis(duration)).await;
            }
        }

        (InputSourceType::Key, "keyDown") => {
            let key = required_str(action, "value")?;
            engine
                .cdp
                .send_on(
                    Some(session),
                    "Input.dispatchKeyEvent",
                    json!({"type": "keyDown", "key": key, "text": key}),
                )
                .await?;
            engine.input.push(context, PressedInput::Key(key.to_string()));
        }

        (InputSourceType::Key, "keyUp") => {
            let key = required_str(action, "value")?;
            engine
                .cdp
                .send_on(
                    Some(session),
                    "Input.dispatchKeyEvent",
                    json!({"type": "keyUp", "key": key}),
                )
                .await?;
            engine.input.pop_key(context, key);
        }

        (InputSourceType::Pointer, "pointerMove") => {
            let x = action["x"].as_f64().unwrap_or(0.0);
            let y = action["y"].as_f64().unwrap_or(0.0);
            engine
                .cdp
                .send_on(
                    Some(session),
                    "Input.dispatchMouseEvent",
                    json!({"type": "mouseMoved", "x": x, "y": y}),
                )
                .await?;
        }

        (InputSourceType::Pointer, "pointerDown") => {
            let button = button_name(action["button"].as_u64().unwrap_or(0));
            let x = action["x"].as_f64().unwrap_or(0.0);
            let y = action["y"].as_f64().unwrap_or(0.0);
            engine
                .cdp
                .send_on(
                    Some(session),
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": "mousePressed",
                        "button": button,
                        "x": x,
                        "y": y,
                        "clickCount": 1,
                    }),
                )
                .await?;
            engine.input.push(
                context,
                PressedInput::Button {
                    button: button.to_string(),
                    x,
                    y,
                },
            );
        }

        (InputSourceType::Pointer, "pointerUp") => {
            let button = button_name(action["button"].as_u64().unwrap_or(0));
            let x = action["x"].as_f64().unwrap_or(0.0);
            let y = action["y"].as_f64().unwrap_or(0.0);
            engine
                .cdp
                .send_on(
                    Some(session),
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": "mouseReleased",
                        "button": button,
                        "x": x,
                        "y": y,
                        "clickCount": 1,
                    }),
                )
                .await?;
            engine.input.pop_button(context, button);
        }

        (InputSourceType::Wheel, "scroll") => {
            let x = action["x"].as_f64().unwrap_or(0.0);
            let y = action["y"].as_f64().unwrap_or(0.0);
            engine
                .cdp
                .send_on(
                    Some(session),
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": "mouseWheel",
                        "x": x,
                        "y": y,
                        "deltaX": action["deltaX"].as_f64().unwrap_or(0.0),
                        "deltaY": action["deltaY"].as_f64().unwrap_or(0.0),
                    }),
                )
                .await?;
        }

        (InputSourceType::None, _) => {}

        (_, other) => {
            return Err(Error::invalid_argument(format!(
                "Unknown action type '{other}' for source '{}'",
                source.id
            )));
        }
    }

    Ok(())
}

fn required_str<'a>(action: &'a Value, field: &str) -> Result<&'a str> {
    action[field]
        .as_str()
        .ok_or_else(|| Error::invalid_argument(format!("Missing '{field}' in action")))
}

fn button_name(button: u64) -> &'static str {
    match button {
        1 => "middle",
        2 => "right",
        _ => "left",
    }
}

// ============================================================================
// Tests
// ============================================================================
