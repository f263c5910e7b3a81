//! Shared network schema types.
//!
//! Types used by both network commands and network events: header and
//! byte-value representations, cookies, intercept phases, URL patterns,
//! and request/response descriptors.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::identifiers::{InterceptId, NetworkRequestId};

// ============================================================================
// BytesValue
// ============================================================================

/// A byte string carried as UTF-8 text or base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BytesValue {
    /// UTF-8 text value.
    String {
        /// The text.
        value: String,
    },
    /// Base64-encoded value.
    Base64 {
        /// The base64 payload.
        value: String,
    },
}

impl BytesValue {
    /// Wraps a text value.
    #[inline]
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String {
            value: value.into(),
        }
    }

    /// Wraps raw bytes as a base64 value.
    #[inline]
    #[must_use]
    pub fn base64_from_bytes(bytes: &[u8]) -> Self {
        Self::Base64 {
            value: BASE64.encode(bytes),
        }
    }

    /// Decodes to raw bytes.
    ///
    /// String values yield their UTF-8 bytes; base64 values are decoded,
    /// with invalid base64 collapsing to empty.
    #[must_use]
    pub fn decoded(&self) -> Vec<u8> {
        match self {
            Self::String { value } => value.as_bytes().to_vec(),
            Self::Base64 { value } => BASE64.decode(value).unwrap_or_default(),
        }
    }

    /// Renders the CDP wire form: the string value where available,
    /// otherwise the base64 payload decoded to a lossy string.
    #[must_use]
    pub fn to_cdp_string(&self) -> String {
        match self {
            Self::String { value } => value.clone(),
            Self::Base64 { value } => {
                String::from_utf8_lossy(&BASE64.decode(value).unwrap_or_default()).into_owned()
            }
        }
    }
}

// ============================================================================
// Header
// ============================================================================

/// An HTTP header. Order is significant and duplicate names are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: BytesValue,
}

impl Header {
    /// Creates a string-valued header.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: BytesValue::string(value),
        }
    }

    /// Converts to the CDP `(name, value)` string pair.
    ///
    /// String-typed values pass through; base64 values are decoded.
    #[must_use]
    pub fn to_cdp(&self) -> (String, String) {
        (self.name.clone(), self.value.to_cdp_string())
    }

    /// Converts a CDP `(name, value)` pair to a BiDi header.
    ///
    /// Conversion from CDP always yields the string form.
    #[must_use]
    pub fn from_cdp(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value)
    }
}

/// Computes the wire size of a header list.
///
/// Per header: `len(name) + len(": ") + len(value) + len("\r\n")`. An
/// empty list yields 0. Used verbatim in event fields.
#[must_use]
pub fn compute_headers_size(headers: &[Header]) -> u64 {
    headers
        .iter()
        .map(|h| (h.name.len() + 2 + h.value.to_cdp_string().len() + 2) as u64)
        .sum()
}

// ============================================================================
// Cookies
// ============================================================================

/// A cookie attached via `continueRequest`/`provideResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieHeader {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: BytesValue,
}

/// A cookie set via `provideResponse`/`continueResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCookieHeader {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: BytesValue,
    /// Domain attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Path attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Max-Age attribute, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
    /// Expires attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    /// Secure attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// HttpOnly attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    /// SameSite attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<SameSite>,
}

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Strict same-site enforcement.
    Strict,
    /// Lax same-site enforcement.
    Lax,
    /// No same-site enforcement.
    None,
}

// ============================================================================
// AuthCredentials
// ============================================================================

/// Credentials for `network.continueWithAuth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCredentials {
    /// Credential type discriminator, always `"password"`.
    #[serde(rename = "type")]
    pub credential_type: String,
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

// ============================================================================
// InterceptPhase
// ============================================================================

/// The network phases an intercept can pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterceptPhase {
    /// Before the request leaves the browser.
    BeforeRequestSent,
    /// After response headers arrive.
    ResponseStarted,
    /// When the server challenges for credentials.
    AuthRequired,
}

// ============================================================================
// UrlPattern
// ============================================================================

/// A URL pattern for intercept matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UrlPattern {
    /// Match against a full URL string after parse + reserialize.
    String {
        /// The pattern URL.
        pattern: String,
    },
    /// Match per-component; absent fields are wildcards.
    Pattern {
        /// URL scheme, without `:`.
        #[serde(skip_serializing_if = "Option::is_none")]
        protocol: Option<String>,
        /// Hostname, compared case-insensitively.
        #[serde(skip_serializing_if = "Option::is_none")]
        hostname: Option<String>,
        /// Port string.
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<String>,
        /// Path, compared exactly.
        #[serde(skip_serializing_if = "Option::is_none")]
        pathname: Option<String>,
        /// Query, compared with leading `?` stripped.
        #[serde(skip_serializing_if = "Option::is_none")]
        search: Option<String>,
    },
}

// ============================================================================
// Request / Response Descriptors
// ============================================================================

/// Request description carried in every network event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    /// The request id.
    pub request: NetworkRequestId,
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Request headers.
    pub headers: Vec<Header>,
    /// Cookies attached to the request.
    pub cookies: Vec<CookieHeader>,
    /// Total header bytes.
    pub headers_size: u64,
    /// Body bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_size: Option<u64>,
    /// Timing snapshot.
    pub timings: FetchTimingInfo,
}

/// Response description for `responseStarted` onwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    /// Response URL after redirects.
    pub url: String,
    /// HTTP protocol version.
    pub protocol: String,
    /// Status code.
    pub status: u32,
    /// Status text.
    pub status_text: String,
    /// Whether the response was served from cache.
    pub from_cache: bool,
    /// Response headers.
    pub headers: Vec<Header>,
    /// MIME type.
    pub mime_type: String,
    /// Total bytes received.
    pub bytes_received: u64,
    /// Total header bytes.
    pub headers_size: u64,
    /// Body bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_size: Option<u64>,
}

/// Request initiator description.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Initiator {
    /// Initiator type: `parser`, `script`, `preflight`, or `other`.
    #[serde(rename = "type")]
    pub initiator_type: String,
    /// Source URL for parser/script initiators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Millisecond timings relative to the Unix epoch.
///
/// Every field is coerced through [`crate::store::network::get_timing`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTimingInfo {
    /// Reference origin time.
    pub time_origin: u64,
    /// Request start.
    pub request_time: u64,
    /// Redirect chain start.
    pub redirect_start: u64,
    /// Redirect chain end.
    pub redirect_end: u64,
    /// Fetch start.
    pub fetch_start: u64,
    /// DNS resolution start.
    pub dns_start: u64,
    /// DNS resolution end.
    pub dns_end: u64,
    /// Connection start.
    pub connect_start: u64,
    /// Connection end.
    pub connect_end: u64,
    /// TLS handshake start.
    pub tls_start: u64,
    /// First byte of the request sent.
    pub request_sent: u64,
    /// Response headers start.
    pub response_start: u64,
    /// Response end.
    pub response_end: u64,
}

/// Fields shared by every network event payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEventBase {
    /// Owning browsing context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<crate::identifiers::BrowsingContextId>,
    /// Whether the request is paused awaiting client resolution.
    pub is_blocked: bool,
    /// Navigation that triggered the request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<crate::identifiers::NavigationId>,
    /// Number of redirects so far.
    pub redirect_count: u32,
    /// Request description.
    pub request: RequestData,
    /// Event timestamp, ms since the Unix epoch.
    pub timestamp: u64,
    /// Intercepts blocking the request, present when blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intercepts: Option<Vec<InterceptId>>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_size_empty() {
        assert_eq!(compute_headers_size(&[]), 0);
    }

    #[test]
    fn test_headers_size_single() {
        // "A: B\r\n" is 6 bytes.
        let headers = vec![Header::new("A", "B")];
        assert_eq!(compute_headers_size(&headers), 6);
    }

    #[test]
    fn test_headers_size_sum() {
        let headers = vec![
            Header::new("Content-Type", "text/html"),
            Header::new("X", ""),
        ];
        // "Content-Type: text/html\r\n" = 25, "X: \r\n" = 5
        assert_eq!(compute_headers_size(&headers), 30);
    }

    #[test]
    fn test_bidi_cdp_roundtrip_string_identity() {
        let header = Header::new("Accept", "text/html");
        let (name, value) = header.to_cdp();
        let back = Header::from_cdp(name, value);
        assert_eq!(back, header);
    }

    #[test]
    fn test_base64_to_cdp_decodes() {
        let header = Header {
            name: "X-Bin".to_string(),
            value: BytesValue::base64_from_bytes(b"hello"),
        };
        assert_eq!(header.to_cdp().1, "hello");
    }

    #[test]
    fn test_bytes_value_decoded() {
        assert_eq!(BytesValue::string("abc").decoded(), b"abc");
        assert_eq!(BytesValue::base64_from_bytes(b"abc").decoded(), b"abc");
    }

    #[test]
    fn test_intercept_phase_wire_names() {
        let json = serde_json::to_string(&InterceptPhase::BeforeRequestSent).unwrap();
        assert_eq!(json, "\"beforeRequestSent\"");
        let json = serde_json::to_string(&InterceptPhase::AuthRequired).unwrap();
        assert_eq!(json, "\"authRequired\"");
    }

    #[test]
    fn test_url_pattern_parse() {
        let pattern: UrlPattern =
            serde_json::from_str(r#"{"type":"string","pattern":"https://a/"}"#).unwrap();
        assert_eq!(
            pattern,
            UrlPattern::String {
                pattern: "https://a/".to_string()
            }
        );

        let pattern: UrlPattern =
            serde_json::from_str(r#"{"type":"pattern","hostname":"example.test"}"#).unwrap();
        assert!(matches!(
            pattern,
            UrlPattern::Pattern { hostname: Some(h), .. } if h == "example.test"
        ));
    }
}
