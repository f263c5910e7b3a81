//! Type-safe identifiers for mapper entities.
//!
//! Newtype wrappers prevent mixing incompatible ids at compile time.
//! All entity ids are opaque strings on the wire, either provided by CDP
//! (`targetId`, `frameId`, `requestId`, execution context ids) or minted
//! by the mapper (`navigation`, `intercept`, `script` UUIDs).
//!
//! # Identifier Kinds
//!
//! | Type | Origin |
//! |------|--------|
//! | [`BrowsingContextId`] | CDP target/frame id |
//! | [`UserContextId`] | CDP browser context id, `"default"` for the default |
//! | [`NavigationId`] | minted UUID |
//! | [`RealmId`] | CDP execution context unique id |
//! | [`NetworkRequestId`] | CDP network request id |
//! | [`InterceptId`] | minted UUID |
//! | [`PreloadScriptId`] | minted UUID |
//! | [`Channel`] | client-supplied tag, `""` for the default channel |
//! | [`CommandId`] | client-supplied `u64` frame id |
//! | [`CdpSessionId`] | CDP session id from `Target.attachToTarget` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// String Id Macro
// ============================================================================

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw id string.
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the id as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

macro_rules! minted_id {
    ($name:ident) => {
        impl $name {
            /// Mints a fresh UUID-backed id.
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }
        }
    };
}

// ============================================================================
// Identifier Types
// ============================================================================

string_id! {
    /// Identifies a browsing context (tab or iframe node).
    ///
    /// The value is the CDP `targetId` for top-level contexts or the CDP
    /// `frameId` for child frames.
    BrowsingContextId
}

string_id! {
    /// Identifies a user context (cookie jar / permission scope).
    UserContextId
}

string_id! {
    /// Identifies a navigation attempt. Minted by the mapper.
    NavigationId
}

string_id! {
    /// Identifies a JavaScript realm (CDP unique execution context id).
    RealmId
}

string_id! {
    /// Identifies a network request (CDP `requestId`).
    NetworkRequestId
}

string_id! {
    /// Identifies a registered network intercept. Minted by the mapper.
    InterceptId
}

string_id! {
    /// Identifies a registered preload script. Minted by the mapper.
    PreloadScriptId
}

string_id! {
    /// Identifies a CDP session attached to a target.
    CdpSessionId
}

minted_id!(NavigationId);
minted_id!(InterceptId);
minted_id!(PreloadScriptId);

impl UserContextId {
    /// The indestructible default user context.
    #[inline]
    #[must_use]
    pub fn default_context() -> Self {
        Self("default".to_string())
    }

    /// Returns `true` for the default user context.
    #[inline]
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == "default"
    }
}

// ============================================================================
// Channel
// ============================================================================

/// A client-supplied tag partitioning event and response delivery.
///
/// The default channel is the empty string; frames carrying no `channel`
/// field belong to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// Wraps a raw channel tag.
    #[inline]
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The default (unnamed) channel.
    #[inline]
    #[must_use]
    pub fn default_channel() -> Self {
        Self::default()
    }

    /// Returns `true` for the default channel.
    #[inline]
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the tag as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Channel {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

// ============================================================================
// CommandId
// ============================================================================

/// The client-supplied `id` of a BiDi command frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Wraps a raw frame id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_ids_unique() {
        let a = NavigationId::generate();
        let b = NavigationId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_context_default() {
        let default = UserContextId::default_context();
        assert!(default.is_default());
        assert!(!UserContextId::new("profile-2").is_default());
    }

    #[test]
    fn test_channel_default() {
        assert!(Channel::default_channel().is_default());
        assert!(!Channel::new("chan-1").is_default());
        assert_eq!(Channel::default_channel().to_string(), "<default>");
    }

    #[test]
    fn test_serde_transparent() {
        let id = BrowsingContextId::new("CTX1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"CTX1\"");

        let back: BrowsingContextId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_command_id_roundtrip() {
        let id = CommandId::new(42);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "42");
        assert_eq!(id.value(), 42);
    }
}
