//! Canonical entity stores.
//!
//! Stores hold the mapper's model of the browser: the context tree,
//! realms, network requests, preload scripts, and user contexts.
//! Entities cross-reference by id only; the context tree is the one
//! parent/child graph, and removal is post-order.
//!
//! Locks guard each store's map and are never held across `.await`;
//! waiters use the register-before-check notify idiom.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `context` | Browsing-context tree and navigation state machine |
//! | `realm` | JavaScript realms and remote handles |
//! | `network` | Network requests, phases, intercept registry |
//! | `preload` | Preload script registry |
//! | `user_context` | User contexts and permission grants |

// ============================================================================
// Submodules
// ============================================================================

/// Browsing-context tree and navigation state machine.
pub mod context;

/// JavaScript realms and remote handles.
pub mod realm;

/// Network requests, phases, intercept registry.
pub mod network;

/// Preload script registry.
pub mod preload;

/// User contexts and permission grants.
pub mod user_context;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::{BrowsingContextStore, Navigation, NavigationStage};
pub use network::{NetworkStore, RequestPhase, get_timing};
pub use preload::PreloadScriptStore;
pub use realm::{Realm, RealmStore};
pub use user_context::UserContextStore;
