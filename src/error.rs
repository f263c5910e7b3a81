//! Error types for the BiDi mapper.
//!
//! This module defines all error types used throughout the crate.
//! Every variant renders to exactly one WebDriver BiDi error code on the
//! wire; the mapping is [`Error::error_code`].
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use bidi_mapper::{Result, Error};
//!
//! fn lookup(store: &BrowsingContextStore, id: &BrowsingContextId) -> Result<()> {
//!     let _context = store.get(id)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | BiDi code | Variants |
//! |-----------|----------|
//! | `invalid argument` | [`Error::InvalidArgument`] |
//! | `no such frame` | [`Error::NoSuchFrame`] |
//! | `no such script` | [`Error::NoSuchScript`] |
//! | `no such intercept` | [`Error::NoSuchIntercept`] |
//! | `no such request` | [`Error::NoSuchRequest`] |
//! | `no such user context` | [`Error::NoSuchUserContext`] |
//! | `unknown command` | [`Error::UnknownCommand`] |
//! | `unknown error` | [`Error::UnknownError`], [`Error::CdpFailure`], [`Error::Timeout`], [`Error::SessionEnded`] |
//! | `unsupported operation` | [`Error::UnsupportedOperation`] |
//! | `session not created` | [`Error::SessionNotCreated`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::{BrowsingContextId, InterceptId, NetworkRequestId, PreloadScriptId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging and carries the
/// message rendered into the BiDi error frame.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Invalid argument in command params.
    ///
    /// Covers schema failures, bad URL patterns, double intercept
    /// resolution, and unsubscribing a subscription that does not exist.
    #[error("{message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Unknown command method.
    ///
    /// Returned when the `method` string maps to no module entrypoint.
    #[error("Unknown command '{method}'")]
    UnknownCommand {
        /// The unrecognized command method.
        method: String,
    },

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// Browsing context not found.
    #[error("Context '{context}' not found")]
    NoSuchFrame {
        /// The missing context id.
        context: BrowsingContextId,
    },

    /// Preload script not found.
    #[error("No preload script with ID '{script}'")]
    NoSuchScript {
        /// The missing preload script id.
        script: PreloadScriptId,
    },

    /// Network intercept not found.
    #[error("Intercept '{intercept}' does not exist")]
    NoSuchIntercept {
        /// The missing intercept id.
        intercept: InterceptId,
    },

    /// Network request not found.
    #[error("Network request with ID '{request}' doesn't exist")]
    NoSuchRequest {
        /// The missing request id.
        request: NetworkRequestId,
    },

    /// User context not found.
    #[error("User context '{user_context}' not found")]
    NoSuchUserContext {
        /// The missing user context id.
        user_context: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// CDP call failed with no more specific mapping.
    #[error("{message}")]
    CdpFailure {
        /// Description relayed from the browser.
        message: String,
    },

    /// Handler-level wait exceeded the configured cap.
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout {
        /// Description of the awaited condition.
        operation: String,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// The session ended while the command was in flight.
    #[error("session ended")]
    SessionEnded,

    /// Catch-all for unexpected failures, including caught handler panics.
    #[error("{message}")]
    UnknownError {
        /// Description of the failure.
        message: String,
    },

    /// Method is valid but not implementable on the current browser.
    #[error("{message}")]
    UnsupportedOperation {
        /// Description of the unsupported operation.
        message: String,
    },

    /// Browser handshake failed during session bootstrap.
    #[error("{message}")]
    SessionNotCreated {
        /// Description of the handshake failure.
        message: String,
    },
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an unknown command error.
    #[inline]
    pub fn unknown_command(method: impl Into<String>) -> Self {
        Self::UnknownCommand {
            method: method.into(),
        }
    }

    /// Creates a missing-context error.
    #[inline]
    pub fn no_such_frame(context: BrowsingContextId) -> Self {
        Self::NoSuchFrame { context }
    }

    /// Creates a missing-preload-script error.
    #[inline]
    pub fn no_such_script(script: PreloadScriptId) -> Self {
        Self::NoSuchScript { script }
    }

    /// Creates a missing-intercept error.
    #[inline]
    pub fn no_such_intercept(intercept: InterceptId) -> Self {
        Self::NoSuchIntercept { intercept }
    }

    /// Creates a missing-network-request error.
    #[inline]
    pub fn no_such_request(request: NetworkRequestId) -> Self {
        Self::NoSuchRequest { request }
    }

    /// Creates a missing-user-context error.
    #[inline]
    pub fn no_such_user_context(user_context: impl Into<String>) -> Self {
        Self::NoSuchUserContext {
            user_context: user_context.into(),
        }
    }

    /// Creates a CDP failure error.
    #[inline]
    pub fn cdp(message: impl Into<String>) -> Self {
        Self::CdpFailure {
            message: message.into(),
        }
    }

    /// Creates a handler timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates an unknown error.
    #[inline]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::UnknownError {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    #[inline]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Creates a session-not-created error.
    #[inline]
    pub fn session_not_created(message: impl Into<String>) -> Self {
        Self::SessionNotCreated {
            message: message.into(),
        }
    }
}

// ============================================================================
// Wire Mapping
// ============================================================================

impl Error {
    /// Returns the BiDi error code string for the error frame.
    ///
    /// CDP error codes never leak through this mapping.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid argument",
            Self::UnknownCommand { .. } => "unknown command",
            Self::NoSuchFrame { .. } => "no such frame",
            Self::NoSuchScript { .. } => "no such script",
            Self::NoSuchIntercept { .. } => "no such intercept",
            Self::NoSuchRequest { .. } => "no such request",
            Self::NoSuchUserContext { .. } => "no such user context",
            Self::CdpFailure { .. }
            | Self::Timeout { .. }
            | Self::SessionEnded
            | Self::UnknownError { .. } => "unknown error",
            Self::UnsupportedOperation { .. } => "unsupported operation",
            Self::SessionNotCreated { .. } => "session not created",
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this error ends the command with `unknown error`.
    #[inline]
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.error_code() == "unknown error"
    }
}

// ============================================================================
// Tests
// ============================================================================
