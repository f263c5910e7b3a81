//! URL-pattern matching for network intercepts.
//!
//! Two pattern shapes exist on the wire:
//!
//! - *String patterns* compare the whole URL after both sides are parsed
//!   and reserialized, which lowercases hostnames and normalizes
//!   default ports and empty paths.
//! - *Structured patterns* compare each present component; absent
//!   components are wildcards. A pattern with no components at all only
//!   matches URLs with a `/` (or empty) path and an empty query.

// ============================================================================
// Imports
// ============================================================================

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::network::UrlPattern;

// ============================================================================
// Validation
// ============================================================================

/// Validates patterns at registration time.
///
/// # Errors
///
/// Returns `invalid argument` for string patterns that do not parse as
/// URLs.
pub fn validate_patterns(patterns: &[UrlPattern]) -> Result<()> {
    for pattern in patterns {
        if let UrlPattern::String { pattern } = pattern {
            Url::parse(pattern)
                .map_err(|e| Error::invalid_argument(format!("Invalid URL pattern: {e}")))?;
        }
    }
    Ok(())
}

// ============================================================================
// Matching
// ============================================================================

/// Returns `true` when the pattern matches the request URL.
///
/// Unparsable request URLs never match.
#[must_use]
pub fn matches(pattern: &UrlPattern, request_url: &str) -> bool {
    let Ok(url) = Url::parse(request_url) else {
        return false;
    };

    match pattern {
        UrlPattern::String { pattern } => {
            let Ok(pattern_url) = Url::parse(pattern) else {
                return false;
            };
            pattern_url.as_str() == url.as_str()
        }
        UrlPattern::Pattern {
            protocol,
            hostname,
            port,
            pathname,
            search,
        } => {
            let empty_pattern = protocol.is_none()
                && hostname.is_none()
                && port.is_none()
                && pathname.is_none()
                && search.is_none();
            if empty_pattern {
                let path_ok = url.path() == "/" || url.path().is_empty();
                let search_ok = url.query().unwrap_or_default().is_empty();
                return path_ok && search_ok;
            }

            if let Some(protocol) = protocol {
                let want = protocol.trim_end_matches(':').to_ascii_lowercase();
                if url.scheme() != want {
                    return false;
                }
            }

            if let Some(hostname) = hostname {
                let host = url.host_str().unwrap_or_default();
                if !host.eq_ignore_ascii_case(hostname) {
                    return false;
                }
            }

            if let Some(port) = port {
                let url_port = url
                    .port_or_known_default()
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                if port.is_empty() {
                    if url.port().is_some() {
                        return false;
                    }
                } else if *port != url_port {
                    return false;
                }
            }

            if let Some(pathname) = pathname {
                let want = if pathname.starts_with('/') {
                    pathname.clone()
                } else {
                    format!("/{pathname}")
                };
                if url.path() != want {
                    return false;
                }
            }

            if let Some(search) = search {
                let want = search.strip_prefix('?').unwrap_or(search);
                if url.query().unwrap_or_default() != want {
                    return false;
                }
            }

            true
        }
    }
}

/// Returns `true` when any pattern matches; an absent list matches
/// every URL.
#[must_use]
pub fn matches_any(patterns: Option<&[UrlPattern]>, request_url: &str) -> bool {
    match patterns {
        None => true,
        Some(patterns) => patterns.iter().any(|p| matches(p, request_url)),
    }
}

// ============================================================================
// Tests
// ============================================================================
