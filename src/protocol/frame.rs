//! Wire frames and channel extraction.
//!
//! An inbound text frame is parsed in two steps: first into
//! [`CommandFrame`] (envelope only, `params` kept raw), then the
//! `method`/`params` pair is validated into a typed
//! [`Command`](super::Command) by the dispatcher. Envelope failures never
//! produce side effects.
//!
//! # Frame Formats
//!
//! Command:
//! ```json
//! { "id": 1, "method": "browsingContext.navigate", "params": {...}, "channel": "ch" }
//! ```
//!
//! Success:
//! ```json
//! { "type": "success", "id": 1, "result": {...}, "channel": "ch" }
//! ```
//!
//! Error:
//! ```json
//! { "type": "error", "id": 1, "error": "invalid argument", "message": "...", "channel": "ch" }
//! ```
//!
//! Event:
//! ```json
//! { "type": "event", "method": "browsingContext.load", "params": {...}, "channel": "ch" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{Channel, CommandId};

// ============================================================================
// CommandFrame
// ============================================================================

/// The envelope of an inbound command, with `params` kept raw.
///
/// Clients may tag a frame with `channel` or the Chromium-specific
/// `goog:channel`. A frame carrying both is rejected unless the two are
/// bytewise equal.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandFrame {
    /// Client-chosen frame id echoed on the response.
    pub id: CommandId,

    /// Command method in `module.methodName` format.
    pub method: String,

    /// Raw params, validated against the typed schema after routing.
    /// An absent field validates like an empty object.
    #[serde(default = "empty_params")]
    pub params: Value,

    /// Standard channel tag.
    #[serde(default)]
    channel: Option<String>,

    /// Chromium-specific channel tag.
    #[serde(rename = "goog:channel", default)]
    goog_channel: Option<String>,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl CommandFrame {
    /// Parses a raw text frame into a command envelope.
    ///
    /// # Errors
    ///
    /// Returns `invalid argument` when the frame is not a command
    /// envelope.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::invalid_argument(format!("Cannot parse command frame: {e}")))
    }

    /// Resolves the frame's channel, applying the dual-tag rule.
    ///
    /// # Errors
    ///
    /// Returns `invalid argument` when both `channel` and `goog:channel`
    /// are present with different values.
    pub fn channel(&self) -> Result<Channel> {
        match (&self.channel, &self.goog_channel) {
            (Some(a), Some(b)) if a != b => Err(Error::invalid_argument(
                "Frame carries both 'channel' and 'goog:channel' with different values",
            )),
            (Some(tag), _) | (None, Some(tag)) => Ok(Channel::new(tag.clone())),
            (None, None) => Ok(Channel::default_channel()),
        }
    }
}

// ============================================================================
// OutgoingMessage
// ============================================================================

/// A message from the mapper to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingMessage {
    /// Successful command result.
    Success {
        /// Echoed command frame id.
        id: CommandId,
        /// Command result payload.
        result: Value,
        /// Channel echo, omitted on the default channel.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },

    /// Command failure.
    Error {
        /// Echoed command frame id, absent for unparsable frames.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<CommandId>,
        /// BiDi error code.
        error: &'static str,
        /// Human-readable message.
        message: String,
        /// Optional stack trace.
        #[serde(skip_serializing_if = "Option::is_none")]
        stacktrace: Option<String>,
        /// Channel echo, omitted on the default channel.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },

    /// Browser event notification.
    Event {
        /// Event name in `module.eventName` format.
        method: &'static str,
        /// Event payload.
        params: Value,
        /// Channel echo, omitted on the default channel.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
}

impl OutgoingMessage {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: CommandId, result: Value, channel: &Channel) -> Self {
        Self::Success {
            id,
            result,
            channel: channel_echo(channel),
        }
    }

    /// Builds an error response from a mapper error.
    #[must_use]
    pub fn error(id: Option<CommandId>, err: &Error, channel: &Channel) -> Self {
        Self::Error {
            id,
            error: err.error_code(),
            message: err.to_string(),
            stacktrace: None,
            channel: channel_echo(channel),
        }
    }

    /// Builds an event frame from a pre-serialized payload.
    #[must_use]
    pub fn event(method: &'static str, params: Value, channel: &Channel) -> Self {
        Self::Event {
            method,
            params,
            channel: channel_echo(channel),
        }
    }

    /// Serializes the message to a wire frame.
    #[must_use]
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","error":"unknown error","message":"serialization failed"}"#
                .to_string()
        })
    }
}

fn channel_echo(channel: &Channel) -> Option<String> {
    if channel.is_default() {
        None
    } else {
        Some(channel.as_str().to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
