//! Outbound event payloads.
//!
//! Events are notifications from the mapper to subscribed channels,
//! produced by the event processors from CDP traffic and store state.
//!
//! # Event Types
//!
//! | Module | Events |
//! |--------|--------|
//! | `browsingContext` | `contextCreated`, `contextDestroyed`, `navigationStarted`, `navigationAborted`, `navigationFailed`, `fragmentNavigated`, `domContentLoaded`, `load`, `userPromptOpened`, `userPromptClosed` |
//! | `network` | `beforeRequestSent`, `responseStarted`, `authRequired`, `responseCompleted`, `fetchError` |
//! | `script` | `realmCreated`, `realmDestroyed` |
//! | `log` | `entryAdded` |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::identifiers::{BrowsingContextId, NavigationId, RealmId, UserContextId};

use super::command::RealmInfo;
use super::network::{Initiator, NetworkEventBase, ResponseData};
use super::remote_value::RemoteValue;

// ============================================================================
// Event Names
// ============================================================================

/// Event name constants and the group-expansion table.
pub mod names {
    /// Atomic events of the `browsingContext` module.
    pub const BROWSING_CONTEXT_EVENTS: &[&str] = &[
        "browsingContext.contextCreated",
        "browsingContext.contextDestroyed",
        "browsingContext.navigationStarted",
        "browsingContext.navigationAborted",
        "browsingContext.navigationFailed",
        "browsingContext.fragmentNavigated",
        "browsingContext.domContentLoaded",
        "browsingContext.load",
        "browsingContext.userPromptOpened",
        "browsingContext.userPromptClosed",
    ];

    /// Atomic events of the `network` module.
    pub const NETWORK_EVENTS: &[&str] = &[
        "network.beforeRequestSent",
        "network.responseStarted",
        "network.authRequired",
        "network.responseCompleted",
        "network.fetchError",
    ];

    /// Atomic events of the `script` module.
    pub const SCRIPT_EVENTS: &[&str] = &["script.realmCreated", "script.realmDestroyed"];

    /// Atomic events of the `log` module.
    pub const LOG_EVENTS: &[&str] = &["log.entryAdded"];

    /// Expands a module-group name to its atomic events.
    #[must_use]
    pub fn module_events(module: &str) -> Option<&'static [&'static str]> {
        match module {
            "browsingContext" => Some(BROWSING_CONTEXT_EVENTS),
            "network" => Some(NETWORK_EVENTS),
            "script" => Some(SCRIPT_EVENTS),
            "log" => Some(LOG_EVENTS),
            _ => None,
        }
    }

    /// Returns `true` when `name` is a known atomic event.
    #[must_use]
    pub fn is_atomic_event(name: &str) -> bool {
        BROWSING_CONTEXT_EVENTS.contains(&name)
            || NETWORK_EVENTS.contains(&name)
            || SCRIPT_EVENTS.contains(&name)
            || LOG_EVENTS.contains(&name)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Context description carried by tree results and context events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowsingContextInfo {
    /// The context id.
    pub context: BrowsingContextId,
    /// Current URL.
    pub url: String,
    /// Child contexts; `None` past the requested depth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BrowsingContextInfo>>,
    /// Parent context, absent on top-level contexts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<BrowsingContextId>,
    /// Owning user context.
    pub user_context: UserContextId,
}

/// Navigation lifecycle payload.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationInfo {
    /// The navigating context.
    pub context: BrowsingContextId,
    /// The navigation id, absent for browser-initiated loads the mapper
    /// never tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationId>,
    /// Event timestamp, ms since the Unix epoch.
    pub timestamp: u64,
    /// The navigation URL.
    pub url: String,
}

/// `browsingContext.userPromptOpened` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPromptOpened {
    /// The context showing the prompt.
    pub context: BrowsingContextId,
    /// Prompt kind: `alert`, `confirm`, `prompt`, or `beforeunload`.
    #[serde(rename = "type")]
    pub prompt_type: String,
    /// Prompt message text.
    pub message: String,
    /// Default input for prompt dialogs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// `browsingContext.userPromptClosed` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPromptClosed {
    /// The context that showed the prompt.
    pub context: BrowsingContextId,
    /// Whether the prompt was accepted.
    pub accepted: bool,
    /// Text entered into a prompt dialog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_text: Option<String>,
}

/// `network.beforeRequestSent` payload.
#[derive(Debug, Clone, Serialize)]
pub struct BeforeRequestSent {
    /// Shared network event fields.
    #[serde(flatten)]
    pub base: NetworkEventBase,
    /// Request initiator.
    pub initiator: Initiator,
}

/// `network.responseStarted` / `network.responseCompleted` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEvent {
    /// Shared network event fields.
    #[serde(flatten)]
    pub base: NetworkEventBase,
    /// Response description.
    pub response: ResponseData,
}

/// `network.authRequired` payload.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequired {
    /// Shared network event fields.
    #[serde(flatten)]
    pub base: NetworkEventBase,
    /// The challenging response.
    pub response: ResponseData,
}

/// `network.fetchError` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchError {
    /// Shared network event fields.
    #[serde(flatten)]
    pub base: NetworkEventBase,
    /// Browser error text.
    pub error_text: String,
}

/// `script.realmDestroyed` payload.
#[derive(Debug, Clone, Serialize)]
pub struct RealmDestroyed {
    /// The destroyed realm.
    pub realm: RealmId,
}

/// Source realm of a log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogSource {
    /// Originating realm.
    pub realm: RealmId,
    /// Owning context, when the realm has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BrowsingContextId>,
}

/// `log.entryAdded` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Entry kind: `console` or `javascript`.
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Severity: `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Source realm.
    pub source: LogSource,
    /// Formatted message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Entry timestamp, ms since the Unix epoch.
    pub timestamp: u64,
    /// Console method for console entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Raw console arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<RemoteValue>>,
}

// ============================================================================
// EventData
// ============================================================================

/// A fully built BiDi event, ready for routing.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventData {
    /// `browsingContext.contextCreated`
    ContextCreated(BrowsingContextInfo),
    /// `browsingContext.contextDestroyed`
    ContextDestroyed(BrowsingContextInfo),
    /// `browsingContext.navigationStarted`
    NavigationStarted(NavigationInfo),
    /// `browsingContext.navigationAborted`
    NavigationAborted(NavigationInfo),
    /// `browsingContext.navigationFailed`
    NavigationFailed(NavigationInfo),
    /// `browsingContext.fragmentNavigated`
    FragmentNavigated(NavigationInfo),
    /// `browsingContext.domContentLoaded`
    DomContentLoaded(NavigationInfo),
    /// `browsingContext.load`
    Load(NavigationInfo),
    /// `browsingContext.userPromptOpened`
    UserPromptOpened(UserPromptOpened),
    /// `browsingContext.userPromptClosed`
    UserPromptClosed(UserPromptClosed),
    /// `network.beforeRequestSent`
    BeforeRequestSent(BeforeRequestSent),
    /// `network.responseStarted`
    ResponseStarted(ResponseEvent),
    /// `network.authRequired`
    AuthRequired(AuthRequired),
    /// `network.responseCompleted`
    ResponseCompleted(ResponseEvent),
    /// `network.fetchError`
    FetchError(FetchError),
    /// `script.realmCreated`
    RealmCreated(RealmInfo),
    /// `script.realmDestroyed`
    RealmDestroyed(RealmDestroyed),
    /// `log.entryAdded`
    LogEntryAdded(LogEntry),
}

impl EventData {
    /// Returns the wire event name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::ContextCreated(_) => "browsingContext.contextCreated",
            Self::ContextDestroyed(_) => "browsingContext.contextDestroyed",
            Self::NavigationStarted(_) => "browsingContext.navigationStarted",
            Self::NavigationAborted(_) => "browsingContext.navigationAborted",
            Self::NavigationFailed(_) => "browsingContext.navigationFailed",
            Self::FragmentNavigated(_) => "browsingContext.fragmentNavigated",
            Self::DomContentLoaded(_) => "browsingContext.domContentLoaded",
            Self::Load(_) => "browsingContext.load",
            Self::UserPromptOpened(_) => "browsingContext.userPromptOpened",
            Self::UserPromptClosed(_) => "browsingContext.userPromptClosed",
            Self::BeforeRequestSent(_) => "network.beforeRequestSent",
            Self::ResponseStarted(_) => "network.responseStarted",
            Self::AuthRequired(_) => "network.authRequired",
            Self::ResponseCompleted(_) => "network.responseCompleted",
            Self::FetchError(_) => "network.fetchError",
            Self::RealmCreated(_) => "script.realmCreated",
            Self::RealmDestroyed(_) => "script.realmDestroyed",
            Self::LogEntryAdded(_) => "log.entryAdded",
        }
    }

    /// Returns the context the event is emitted on, for subscription
    /// rollup. `None` routes via session-wide subscriptions only.
    #[must_use]
    pub fn context(&self) -> Option<&BrowsingContextId> {
        match self {
            Self::ContextCreated(info) | Self::ContextDestroyed(info) => Some(&info.context),
            Self::NavigationStarted(info)
            | Self::NavigationAborted(info)
            | Self::NavigationFailed(info)
            | Self::FragmentNavigated(info)
            | Self::DomContentLoaded(info)
            | Self::Load(info) => Some(&info.context),
            Self::UserPromptOpened(p) => Some(&p.context),
            Self::UserPromptClosed(p) => Some(&p.context),
            Self::BeforeRequestSent(e) => e.base.context.as_ref(),
            Self::ResponseStarted(e) | Self::ResponseCompleted(e) => e.base.context.as_ref(),
            Self::AuthRequired(e) => e.base.context.as_ref(),
            Self::FetchError(e) => e.base.context.as_ref(),
            Self::RealmCreated(info) => info.context.as_ref(),
            Self::RealmDestroyed(_) => None,
            Self::LogEntryAdded(entry) => entry.source.context.as_ref(),
        }
    }

    /// Serializes the payload once for fan-out.
    #[must_use]
    pub fn params_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_expansion() {
        let events = names::module_events("network").unwrap();
        assert!(events.contains(&"network.beforeRequestSent"));
        assert!(events.contains(&"network.fetchError"));
        assert!(names::module_events("element").is_none());
    }

    #[test]
    fn test_atomic_event_lookup() {
        assert!(names::is_atomic_event("browsingContext.load"));
        assert!(names::is_atomic_event("log.entryAdded"));
        assert!(!names::is_atomic_event("browsingContext"));
        assert!(!names::is_atomic_event("element.added"));
    }

    #[test]
    fn test_event_method_and_context() {
        let event = EventData::Load(NavigationInfo {
            context: BrowsingContextId::new("CTX1"),
            navigation: Some(NavigationId::new("nav-1")),
            timestamp: 123,
            url: "https://example.test/".to_string(),
        });

        assert_eq!(event.method(), "browsingContext.load");
        assert_eq!(event.context().unwrap().as_str(), "CTX1");

        let params = event.params_value();
        assert_eq!(params["context"], "CTX1");
        assert_eq!(params["url"], "https://example.test/");
    }

    #[test]
    fn test_navigation_info_omits_absent_navigation() {
        let event = EventData::NavigationStarted(NavigationInfo {
            context: BrowsingContextId::new("CTX1"),
            navigation: None,
            timestamp: 0,
            url: String::new(),
        });
        let params = event.params_value();
        assert!(params.get("navigation").is_none());
    }
}
