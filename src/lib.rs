//! BiDi Mapper - WebDriver BiDi to Chrome DevTools Protocol bridge.
//!
//! This library accepts W3C WebDriver BiDi commands from an automation
//! client and drives a Chromium-family browser over CDP, translating
//! command and event traffic in both directions.
//!
//! # Architecture
//!
//! The mapper follows a client-server model in both directions:
//!
//! - **Northbound (BiDi)**: framed JSON commands in, responses and
//!   events out, partitioned by client channel
//! - **Southbound (CDP)**: correlated calls per target session, event
//!   stream in receive order
//!
//! Key design principles:
//!
//! - Stores hold the canonical model (contexts, realms, requests,
//!   preload scripts); entities cross-reference by id only
//! - Commands validate against a typed schema before any side effect
//! - Event delivery is subscription-driven, ordered by subscription
//!   priority, and never blocks command processing
//!
//! # Quick Start
//!
//! ```no_run
//! use bidi_mapper::{MapperConfig, MapperSession, Result};
//! use bidi_mapper::transport::WebSocketPipe;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Connect to a browser's DevTools endpoint.
//!     let pipe = WebSocketPipe::connect("ws://127.0.0.1:9222/devtools/browser/...").await?;
//!     let (session, mut outgoing) = MapperSession::connect(MapperConfig::default(), pipe).await?;
//!
//!     // Feed client frames in; read responses and events out.
//!     session.handle_frame(r#"{"id":1,"method":"session.status","params":{}}"#);
//!     if let Some(frame) = outgoing.recv().await {
//!         println!("{frame}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`mapper`] | Engine wiring and [`MapperSession`] |
//! | [`dispatcher`] | Command dispatch and per-channel ordering |
//! | [`protocol`] | BiDi frames, commands, events, remote values |
//! | [`cdp`] | Southbound connection, correlation, mock browser |
//! | [`store`] | Context tree, realms, network, preload scripts |
//! | [`module`] | Per-module command handlers |
//! | [`subscription`] | Priority-ordered event subscriptions |
//! | [`router`] | Event fan-out to channels |
//! | [`processor`] | CDP event translation |
//! | [`transport`] | WebSocket glue for both directions |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe id wrappers |
//! | [`config`] | Engine configuration |

// ============================================================================
// Modules
// ============================================================================

/// Southbound CDP client layer.
pub mod cdp;

/// Engine configuration.
pub mod config;

/// Command dispatch and per-channel response ordering.
pub mod dispatcher;

/// Error types and result aliases.
pub mod error;

/// Type-safe identifiers for mapper entities.
pub mod identifiers;

/// Engine wiring and session lifecycle.
pub mod mapper;

/// Per-module command handlers.
pub mod module;

/// CDP event processors.
pub mod processor;

/// BiDi protocol message types.
pub mod protocol;

/// Event routing to subscribed channels.
pub mod router;

/// Canonical entity stores.
pub mod store;

/// Priority-ordered event subscriptions.
pub mod subscription;

/// WebSocket transport glue.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use cdp::{CdpConnection, CdpEvent, CdpPipe, MockBrowser};
pub use config::{MapperConfig, UnhandledPromptBehavior};
pub use error::{Error, Result};
pub use identifiers::{
    BrowsingContextId, CdpSessionId, Channel, CommandId, InterceptId, NavigationId,
    NetworkRequestId, PreloadScriptId, RealmId, UserContextId,
};
pub use mapper::MapperSession;
pub use subscription::SubscriptionManager;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
