//! Mapper configuration.
//!
//! Options passed in at engine construction. The proxy configuration of a
//! session is consumed by the browser launcher, not by this crate, so it
//! does not appear here.

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

// ============================================================================
// UnhandledPromptBehavior
// ============================================================================

/// What the mapper does with user prompts no client handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledPromptBehavior {
    /// Dismiss alerts, leave other prompts to the client.
    #[default]
    Default,
    /// Accept every prompt.
    Accept,
    /// Dismiss every prompt.
    Dismiss,
    /// Leave every prompt open.
    Ignore,
}

impl UnhandledPromptBehavior {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "default" => Ok(Self::Default),
            "accept" => Ok(Self::Accept),
            "dismiss" => Ok(Self::Dismiss),
            "ignore" => Ok(Self::Ignore),
            other => Err(Error::invalid_argument(format!(
                "Invalid unhandled prompt behavior '{other}'"
            ))),
        }
    }
}

// ============================================================================
// MapperConfig
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MapperConfig {
    /// Forwarded to `Security.setIgnoreCertificateErrors` at bootstrap.
    pub accept_insecure_certs: bool,

    /// Behavior for prompts no client handles.
    pub unhandled_prompt_behavior: UnhandledPromptBehavior,

    /// Per-handler wait cap in milliseconds. `None` means no timeout.
    pub idle_timeout_ms: Option<u64>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            accept_insecure_certs: false,
            unhandled_prompt_behavior: UnhandledPromptBehavior::Default,
            idle_timeout_ms: None,
        }
    }
}

impl MapperConfig {
    /// Loads configuration from `BIDI_MAPPER_*` environment variables,
    /// falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `invalid argument` when a variable is present but
    /// unparsable.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = env::var("BIDI_MAPPER_ACCEPT_INSECURE_CERTS") {
            config.accept_insecure_certs = value
                .parse::<bool>()
                .map_err(|_| Error::invalid_argument("Invalid BIDI_MAPPER_ACCEPT_INSECURE_CERTS"))?;
        }

        if let Ok(value) = env::var("BIDI_MAPPER_UNHANDLED_PROMPT_BEHAVIOR") {
            config.unhandled_prompt_behavior = UnhandledPromptBehavior::parse(&value)?;
        }

        if let Ok(value) = env::var("BIDI_MAPPER_IDLE_TIMEOUT_MS") {
            config.idle_timeout_ms = Some(
                value
                    .parse::<u64>()
                    .map_err(|_| Error::invalid_argument("Invalid BIDI_MAPPER_IDLE_TIMEOUT_MS"))?,
            );
        }

        Ok(config)
    }

    /// Returns the handler wait cap as a [`Duration`], if configured.
    #[inline]
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MapperConfig::default();
        assert!(!config.accept_insecure_certs);
        assert_eq!(
            config.unhandled_prompt_behavior,
            UnhandledPromptBehavior::Default
        );
        assert!(config.idle_timeout().is_none());
    }

    #[test]
    fn test_prompt_behavior_parse() {
        assert_eq!(
            UnhandledPromptBehavior::parse("accept").unwrap(),
            UnhandledPromptBehavior::Accept
        );
        assert_eq!(
            UnhandledPromptBehavior::parse("dismiss").unwrap(),
            UnhandledPromptBehavior::Dismiss
        );
        assert!(UnhandledPromptBehavior::parse("explode").is_err());
    }

    #[test]
    fn test_idle_timeout_duration() {
        let config = MapperConfig {
            idle_timeout_ms: Some(250),
            ..MapperConfig::default()
        };
        assert_eq!(config.idle_timeout(), Some(Duration::from_millis(250)));
    }
}
