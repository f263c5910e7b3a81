//! BiDi protocol message types.
//!
//! This module defines the northbound message format between automation
//! clients and the mapper.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`CommandFrame`] | Client → Mapper | Command request |
//! | [`OutgoingMessage::Success`] | Mapper → Client | Command result |
//! | [`OutgoingMessage::Error`] | Mapper → Client | Command failure |
//! | [`OutgoingMessage::Event`] | Mapper → Client | Browser notification |
//!
//! # Command Naming
//!
//! Commands follow `module.methodName` format:
//!
//! - `browsingContext.navigate`
//! - `script.evaluate`
//! - `network.addIntercept`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Wire frames and channel extraction |
//! | `command` | Typed commands, params, and results |
//! | `event` | Outbound event payloads |
//! | `network` | Shared network schema types |
//! | `remote_value` | Script value (de)serialization types |

// ============================================================================
// Submodules
// ============================================================================

/// Typed commands, params, and results.
pub mod command;

/// Outbound event payloads.
pub mod event;

/// Wire frames and channel extraction.
pub mod frame;

/// Shared network schema types.
pub mod network;

/// Script value (de)serialization types.
pub mod remote_value;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use event::EventData;
pub use frame::{CommandFrame, OutgoingMessage};
pub use network::{BytesValue, Header, InterceptPhase, UrlPattern, compute_headers_size};
pub use remote_value::{LocalValue, RemoteValue, ResultOwnership, Target};
