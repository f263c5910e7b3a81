//! Typed commands, params, and results.
//!
//! [`Command::parse`] is the schema boundary: the dispatcher hands it the
//! raw `method`/`params` pair and gets back a fully typed command or an
//! error before any handler runs. An unmapped method is
//! `unknown command`; a params mismatch is `invalid argument` naming the
//! failing field.
//!
//! # Command Modules
//!
//! | Module | Commands |
//! |--------|----------|
//! | `session` | status, new, end, subscribe, unsubscribe |
//! | `browsingContext` | getTree, create, close, navigate, reload, traverseHistory, activate, handleUserPrompt |
//! | `script` | evaluate, callFunction, disown, getRealms, addPreloadScript, removePreloadScript |
//! | `network` | addIntercept, removeIntercept, continueRequest, continueResponse, continueWithAuth, failRequest, provideResponse, setCacheBehavior |
//! | `input` | performActions, releaseActions |
//! | `storage` | getCookies, setCookie, deleteCookies |
//! | `browser` | close, createUserContext, removeUserContext, getUserContexts |
//! | `permissions` | setPermission |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{
    BrowsingContextId, InterceptId, NavigationId, NetworkRequestId, PreloadScriptId, RealmId,
    UserContextId,
};

use super::network::{
    AuthCredentials, BytesValue, CookieHeader, Header, InterceptPhase, SameSite, SetCookieHeader,
    UrlPattern,
};
use super::remote_value::{LocalValue, ResultOwnership, Target};

// ============================================================================
// Command
// ============================================================================

/// A validated BiDi command.
#[derive(Debug, Clone)]
pub enum Command {
    /// `session.status`
    SessionStatus,
    /// `session.new`
    SessionNew(SessionNewParams),
    /// `session.end`
    SessionEnd,
    /// `session.subscribe`
    SessionSubscribe(SubscriptionRequest),
    /// `session.unsubscribe`
    SessionUnsubscribe(SubscriptionRequest),

    /// `browsingContext.getTree`
    GetTree(GetTreeParams),
    /// `browsingContext.create`
    Create(CreateParams),
    /// `browsingContext.close`
    Close(CloseParams),
    /// `browsingContext.navigate`
    Navigate(NavigateParams),
    /// `browsingContext.reload`
    Reload(ReloadParams),
    /// `browsingContext.traverseHistory`
    TraverseHistory(TraverseHistoryParams),
    /// `browsingContext.activate`
    Activate(ActivateParams),
    /// `browsingContext.handleUserPrompt`
    HandleUserPrompt(HandleUserPromptParams),

    /// `script.evaluate`
    Evaluate(EvaluateParams),
    /// `script.callFunction`
    CallFunction(CallFunctionParams),
    /// `script.disown`
    Disown(DisownParams),
    /// `script.getRealms`
    GetRealms(GetRealmsParams),
    /// `script.addPreloadScript`
    AddPreloadScript(AddPreloadScriptParams),
    /// `script.removePreloadScript`
    RemovePreloadScript(RemovePreloadScriptParams),

    /// `network.addIntercept`
    AddIntercept(AddInterceptParams),
    /// `network.removeIntercept`
    RemoveIntercept(RemoveInterceptParams),
    /// `network.continueRequest`
    ContinueRequest(ContinueRequestParams),
    /// `network.continueResponse`
    ContinueResponse(ContinueResponseParams),
    /// `network.continueWithAuth`
    ContinueWithAuth(ContinueWithAuthParams),
    /// `network.failRequest`
    FailRequest(FailRequestParams),
    /// `network.provideResponse`
    ProvideResponse(ProvideResponseParams),
    /// `network.setCacheBehavior`
    SetCacheBehavior(SetCacheBehaviorParams),

    /// `input.performActions`
    PerformActions(PerformActionsParams),
    /// `input.releaseActions`
    ReleaseActions(ReleaseActionsParams),

    /// `storage.getCookies`
    GetCookies(GetCookiesParams),
    /// `storage.setCookie`
    SetCookie(SetCookieParams),
    /// `storage.deleteCookies`
    DeleteCookies(GetCookiesParams),

    /// `browser.close`
    BrowserClose,
    /// `browser.createUserContext`
    CreateUserContext,
    /// `browser.removeUserContext`
    RemoveUserContext(RemoveUserContextParams),
    /// `browser.getUserContexts`
    GetUserContexts,

    /// `permissions.setPermission`
    SetPermission(SetPermissionParams),
}

impl Command {
    /// Validates a `method`/`params` pair into a typed command.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCommand`] when the method maps to no module
    ///   entrypoint.
    /// - [`Error::InvalidArgument`] when the params fail schema
    ///   validation; the message names the failing field. No side
    ///   effects occur.
    pub fn parse(method: &str, params: Value) -> Result<Self> {
        fn typed<T: serde::de::DeserializeOwned>(method: &str, params: Value) -> Result<T> {
            serde_json::from_value(params).map_err(|e| {
                Error::invalid_argument(format!("Invalid params for '{method}': {e}"))
            })
        }

        Ok(match method {
            "session.status" => Self::SessionStatus,
            "session.new" => Self::SessionNew(typed(method, params)?),
            "session.end" => Self::SessionEnd,
            "session.subscribe" => Self::SessionSubscribe(typed(method, params)?),
            "session.unsubscribe" => Self::SessionUnsubscribe(typed(method, params)?),

            "browsingContext.getTree" => Self::GetTree(typed(method, params)?),
            "browsingContext.create" => Self::Create(typed(method, params)?),
            "browsingContext.close" => Self::Close(typed(method, params)?),
            "browsingContext.navigate" => Self::Navigate(typed(method, params)?),
            "browsingContext.reload" => Self::Reload(typed(method, params)?),
            "browsingContext.traverseHistory" => Self::TraverseHistory(typed(method, params)?),
            "browsingContext.activate" => Self::Activate(typed(method, params)?),
            "browsingContext.handleUserPrompt" => Self::HandleUserPrompt(typed(method, params)?),

            "script.evaluate" => Self::Evaluate(typed(method, params)?),
            "script.callFunction" => Self::CallFunction(typed(method, params)?),
            "script.disown" => Self::Disown(typed(method, params)?),
            "script.getRealms" => Self::GetRealms(typed(method, params)?),
            "script.addPreloadScript" => Self::AddPreloadScript(typed(method, params)?),
            "script.removePreloadScript" => Self::RemovePreloadScript(typed(method, params)?),

            "network.addIntercept" => Self::AddIntercept(typed(method, params)?),
            "network.removeIntercept" => Self::RemoveIntercept(typed(method, params)?),
            "network.continueRequest" => Self::ContinueRequest(typed(method, params)?),
            "network.continueResponse" => Self::ContinueResponse(typed(method, params)?),
            "network.continueWithAuth" => Self::ContinueWithAuth(typed(method, params)?),
            "network.failRequest" => Self::FailRequest(typed(method, params)?),
            "network.provideResponse" => Self::ProvideResponse(typed(method, params)?),
            "network.setCacheBehavior" => Self::SetCacheBehavior(typed(method, params)?),

            "input.performActions" => Self::PerformActions(typed(method, params)?),
            "input.releaseActions" => Self::ReleaseActions(typed(method, params)?),

            "storage.getCookies" => Self::GetCookies(typed(method, params)?),
            "storage.setCookie" => Self::SetCookie(typed(method, params)?),
            "storage.deleteCookies" => Self::DeleteCookies(typed(method, params)?),

            "browser.close" => Self::BrowserClose,
            "browser.createUserContext" => Self::CreateUserContext,
            "browser.removeUserContext" => Self::RemoveUserContext(typed(method, params)?),
            "browser.getUserContexts" => Self::GetUserContexts,

            "permissions.setPermission" => Self::SetPermission(typed(method, params)?),

            _ => return Err(Error::unknown_command(method)),
        })
    }
}

// ============================================================================
// Session Params
// ============================================================================

/// `session.new` params; capabilities are matched loosely.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionNewParams {
    /// Requested capabilities, passed through unprocessed.
    #[serde(default)]
    pub capabilities: Value,
}

/// `session.subscribe` / `session.unsubscribe` params.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionRequest {
    /// Event names, atomic or module groups.
    pub events: Vec<String>,
    /// Contexts to scope the subscription to; absent means session-wide.
    #[serde(default)]
    pub contexts: Option<Vec<BrowsingContextId>>,
}

// ============================================================================
// BrowsingContext Params
// ============================================================================

/// `browsingContext.getTree` params.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTreeParams {
    /// Depth cap; absent returns the full subtree.
    #[serde(default)]
    pub max_depth: Option<u32>,
    /// Root of the returned forest; absent returns all top-level contexts.
    #[serde(default)]
    pub root: Option<BrowsingContextId>,
}

/// Kind of top-level context to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateType {
    /// A tab in an existing window.
    Tab,
    /// A new window.
    Window,
}

/// `browsingContext.create` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    /// Tab or window.
    #[serde(rename = "type")]
    pub create_type: CreateType,
    /// Context whose window hosts the new tab.
    #[serde(default)]
    pub reference_context: Option<BrowsingContextId>,
    /// Owning user context; absent means the default.
    #[serde(default)]
    pub user_context: Option<UserContextId>,
    /// Open without focusing.
    #[serde(default)]
    pub background: bool,
}

/// `browsingContext.close` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseParams {
    /// Context to close; must be top-level.
    pub context: BrowsingContextId,
    /// Run beforeunload handlers first.
    #[serde(default)]
    pub prompt_unload: bool,
}

/// Navigation readiness the command resolves at.
///
/// Variant order is the wait ordering: `None < Interactive < Complete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    /// Resolve as soon as the navigation is accepted.
    #[default]
    None,
    /// Resolve at `domContentLoaded`.
    Interactive,
    /// Resolve at `load`.
    Complete,
}

/// `browsingContext.navigate` params.
#[derive(Debug, Clone, Deserialize)]
pub struct NavigateParams {
    /// Context to navigate.
    pub context: BrowsingContextId,
    /// Destination URL.
    pub url: String,
    /// Readiness to resolve at.
    #[serde(default)]
    pub wait: ReadinessState,
}

/// `browsingContext.reload` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadParams {
    /// Context to reload.
    pub context: BrowsingContextId,
    /// Bypass the cache.
    #[serde(default)]
    pub ignore_cache: bool,
    /// Readiness to resolve at.
    #[serde(default)]
    pub wait: ReadinessState,
}

/// `browsingContext.traverseHistory` params.
#[derive(Debug, Clone, Deserialize)]
pub struct TraverseHistoryParams {
    /// Context whose history to traverse.
    pub context: BrowsingContextId,
    /// Steps to move; negative is back.
    pub delta: i32,
}

/// `browsingContext.activate` params.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivateParams {
    /// Context to bring to the foreground; must be top-level.
    pub context: BrowsingContextId,
}

/// `browsingContext.handleUserPrompt` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleUserPromptParams {
    /// Context showing the prompt.
    pub context: BrowsingContextId,
    /// Accept instead of dismissing.
    #[serde(default)]
    pub accept: Option<bool>,
    /// Text for prompt dialogs.
    #[serde(default)]
    pub user_text: Option<String>,
}

// ============================================================================
// Script Params
// ============================================================================

/// `script.evaluate` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    /// Source expression.
    pub expression: String,
    /// Realm to evaluate in.
    pub target: Target,
    /// Unwrap a settled promise result.
    pub await_promise: bool,
    /// Handle retention policy.
    #[serde(default)]
    pub result_ownership: ResultOwnership,
    /// Run with user activation.
    #[serde(default)]
    pub user_activation: bool,
}

/// `script.callFunction` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionParams {
    /// Function source, e.g. `(a, b) => a + b`.
    pub function_declaration: String,
    /// Realm to call in.
    pub target: Target,
    /// Unwrap a settled promise result.
    pub await_promise: bool,
    /// Call arguments.
    #[serde(default)]
    pub arguments: Option<Vec<LocalValue>>,
    /// `this` binding.
    #[serde(default)]
    pub this: Option<LocalValue>,
    /// Handle retention policy.
    #[serde(default)]
    pub result_ownership: ResultOwnership,
    /// Run with user activation.
    #[serde(default)]
    pub user_activation: bool,
}

/// `script.disown` params.
#[derive(Debug, Clone, Deserialize)]
pub struct DisownParams {
    /// Handles to release.
    pub handles: Vec<String>,
    /// Realm owning the handles.
    pub target: Target,
}

/// Realm kind filter for `script.getRealms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RealmType {
    /// A window (page) realm.
    Window,
    /// A dedicated worker realm.
    DedicatedWorker,
    /// A shared worker realm.
    SharedWorker,
    /// A service worker realm.
    ServiceWorker,
    /// A worklet realm.
    Worklet,
}

/// `script.getRealms` params.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRealmsParams {
    /// Restrict to one context's realms.
    #[serde(default)]
    pub context: Option<BrowsingContextId>,
    /// Restrict to one realm kind.
    #[serde(default, rename = "type")]
    pub realm_type: Option<RealmType>,
}

/// `script.addPreloadScript` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPreloadScriptParams {
    /// Function source evaluated in each new matching realm.
    pub function_declaration: String,
    /// Contexts the script applies to; absent means all.
    #[serde(default)]
    pub contexts: Option<Vec<BrowsingContextId>>,
    /// User contexts the script applies to; absent means all.
    #[serde(default)]
    pub user_contexts: Option<Vec<UserContextId>>,
    /// Sandbox realm to install into; absent means the default realm.
    #[serde(default)]
    pub sandbox: Option<String>,
}

/// `script.removePreloadScript` params.
#[derive(Debug, Clone, Deserialize)]
pub struct RemovePreloadScriptParams {
    /// Script registration to remove.
    pub script: PreloadScriptId,
}

// ============================================================================
// Network Params
// ============================================================================

/// `network.addIntercept` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddInterceptParams {
    /// Phases the intercept pauses.
    pub phases: Vec<InterceptPhase>,
    /// URL patterns; absent matches every URL.
    #[serde(default)]
    pub url_patterns: Option<Vec<UrlPattern>>,
    /// Contexts the intercept applies to; absent means all.
    #[serde(default)]
    pub contexts: Option<Vec<BrowsingContextId>>,
}

/// `network.removeIntercept` params.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveInterceptParams {
    /// Intercept to remove.
    pub intercept: InterceptId,
}

/// `network.continueRequest` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequestParams {
    /// Blocked request to release.
    pub request: NetworkRequestId,
    /// Replacement URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Replacement method.
    #[serde(default)]
    pub method: Option<String>,
    /// Replacement headers.
    #[serde(default)]
    pub headers: Option<Vec<Header>>,
    /// Replacement cookies.
    #[serde(default)]
    pub cookies: Option<Vec<CookieHeader>>,
    /// Replacement body.
    #[serde(default)]
    pub body: Option<BytesValue>,
}

/// `network.continueResponse` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseParams {
    /// Blocked request to release.
    pub request: NetworkRequestId,
    /// Replacement status code; must be non-negative.
    #[serde(default)]
    pub status_code: Option<i64>,
    /// Replacement reason phrase.
    #[serde(default)]
    pub reason_phrase: Option<String>,
    /// Replacement headers.
    #[serde(default)]
    pub headers: Option<Vec<Header>>,
    /// Set-Cookie headers to add.
    #[serde(default)]
    pub cookies: Option<Vec<SetCookieHeader>>,
    /// Credentials for a pending auth challenge.
    #[serde(default)]
    pub credentials: Option<AuthCredentials>,
}

/// Action for `network.continueWithAuth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContinueWithAuthAction {
    /// Respond to the challenge with credentials.
    ProvideCredentials,
    /// Fail the challenge.
    Cancel,
    /// Let the browser apply its default behavior.
    Default,
}

/// `network.continueWithAuth` params.
#[derive(Debug, Clone, Deserialize)]
pub struct ContinueWithAuthParams {
    /// Blocked request at the auth phase.
    pub request: NetworkRequestId,
    /// Challenge response action.
    pub action: ContinueWithAuthAction,
    /// Credentials, required for `provideCredentials`.
    #[serde(default)]
    pub credentials: Option<AuthCredentials>,
}

/// `network.failRequest` params.
#[derive(Debug, Clone, Deserialize)]
pub struct FailRequestParams {
    /// Blocked request to abort.
    pub request: NetworkRequestId,
}

/// `network.provideResponse` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvideResponseParams {
    /// Blocked request to fulfill.
    pub request: NetworkRequestId,
    /// Status code; must be non-negative.
    #[serde(default)]
    pub status_code: Option<i64>,
    /// Reason phrase.
    #[serde(default)]
    pub reason_phrase: Option<String>,
    /// Response headers.
    #[serde(default)]
    pub headers: Option<Vec<Header>>,
    /// Set-Cookie headers.
    #[serde(default)]
    pub cookies: Option<Vec<SetCookieHeader>>,
    /// Response body.
    #[serde(default)]
    pub body: Option<BytesValue>,
}

/// Cache mode for `network.setCacheBehavior`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBehavior {
    /// Browser-default caching.
    Default,
    /// Bypass the cache for matching contexts.
    Bypass,
}

/// `network.setCacheBehavior` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCacheBehaviorParams {
    /// Requested cache mode.
    pub cache_behavior: CacheBehavior,
    /// Contexts to apply to; absent means all.
    #[serde(default)]
    pub contexts: Option<Vec<BrowsingContextId>>,
}

// ============================================================================
// Input Params
// ============================================================================

/// Input source kind for action sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSourceType {
    /// No-op source used for synchronization pauses.
    None,
    /// Keyboard source.
    Key,
    /// Pointer source.
    Pointer,
    /// Wheel source.
    Wheel,
}

/// One input source with its action timeline.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceActions {
    /// Source kind.
    #[serde(rename = "type")]
    pub source_type: InputSourceType,
    /// Client-chosen source id.
    pub id: String,
    /// Per-tick actions, interpreted per source kind.
    pub actions: Vec<Value>,
}

/// `input.performActions` params.
#[derive(Debug, Clone, Deserialize)]
pub struct PerformActionsParams {
    /// Context to dispatch input into.
    pub context: BrowsingContextId,
    /// Parallel source timelines.
    pub actions: Vec<SourceActions>,
}

/// `input.releaseActions` params.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseActionsParams {
    /// Context whose pressed inputs to release.
    pub context: BrowsingContextId,
}

// ============================================================================
// Storage Params
// ============================================================================

/// Cookie filter for `storage.getCookies` / `storage.deleteCookies`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieFilter {
    /// Match by name.
    #[serde(default)]
    pub name: Option<String>,
    /// Match by value.
    #[serde(default)]
    pub value: Option<BytesValue>,
    /// Match by domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Match by path.
    #[serde(default)]
    pub path: Option<String>,
    /// Match by Secure attribute.
    #[serde(default)]
    pub secure: Option<bool>,
    /// Match by HttpOnly attribute.
    #[serde(default)]
    pub http_only: Option<bool>,
    /// Match by SameSite attribute.
    #[serde(default)]
    pub same_site: Option<SameSite>,
}

/// Storage partition selector.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum PartitionDescriptor {
    /// Partition of a browsing context.
    Context {
        /// The context.
        context: BrowsingContextId,
    },
    /// Partition by storage key attributes.
    StorageKey {
        /// Owning user context.
        #[serde(default)]
        user_context: Option<UserContextId>,
        /// Source origin.
        #[serde(default)]
        source_origin: Option<String>,
    },
}

/// `storage.getCookies` / `storage.deleteCookies` params.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetCookiesParams {
    /// Cookie filter; absent matches all cookies in the partition.
    #[serde(default)]
    pub filter: Option<CookieFilter>,
    /// Partition selector; absent means the default partition.
    #[serde(default)]
    pub partition: Option<PartitionDescriptor>,
}

/// A cookie to store via `storage.setCookie`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: BytesValue,
    /// Cookie domain.
    pub domain: String,
    /// Cookie path.
    #[serde(default)]
    pub path: Option<String>,
    /// Secure attribute.
    #[serde(default)]
    pub secure: Option<bool>,
    /// HttpOnly attribute.
    #[serde(default)]
    pub http_only: Option<bool>,
    /// SameSite attribute.
    #[serde(default)]
    pub same_site: Option<SameSite>,
    /// Expiry, seconds since the Unix epoch.
    #[serde(default)]
    pub expiry: Option<u64>,
}

/// `storage.setCookie` params.
#[derive(Debug, Clone, Deserialize)]
pub struct SetCookieParams {
    /// Cookie to store.
    pub cookie: PartialCookie,
    /// Partition selector.
    #[serde(default)]
    pub partition: Option<PartitionDescriptor>,
}

// ============================================================================
// Browser / Permissions Params
// ============================================================================

/// `browser.removeUserContext` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUserContextParams {
    /// User context to destroy; the default is indestructible.
    pub user_context: UserContextId,
}

/// Permission grant state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Permission granted.
    Granted,
    /// Permission denied.
    Denied,
    /// Fall back to prompting.
    Prompt,
}

/// `permissions.setPermission` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPermissionParams {
    /// Permission descriptor; only `name` is interpreted.
    pub descriptor: PermissionDescriptor,
    /// Grant state to apply.
    pub state: PermissionState,
    /// Origin the grant applies to.
    pub origin: String,
    /// User context scope; absent means the default.
    #[serde(default)]
    pub user_context: Option<UserContextId>,
}

/// Descriptor naming a permission.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionDescriptor {
    /// Permission name, e.g. `geolocation`.
    pub name: String,
}

// ============================================================================
// Results
// ============================================================================

/// `browsingContext.navigate` / `reload` result.
#[derive(Debug, Clone, Serialize)]
pub struct NavigateResult {
    /// The minted navigation id.
    pub navigation: NavigationId,
    /// The requested URL.
    pub url: String,
}

/// `browsingContext.create` result.
#[derive(Debug, Clone, Serialize)]
pub struct CreateResult {
    /// The new top-level context.
    pub context: BrowsingContextId,
}

/// `script.addPreloadScript` result.
#[derive(Debug, Clone, Serialize)]
pub struct AddPreloadScriptResult {
    /// The minted script id.
    pub script: PreloadScriptId,
}

/// `network.addIntercept` result.
#[derive(Debug, Clone, Serialize)]
pub struct AddInterceptResult {
    /// The minted intercept id.
    pub intercept: InterceptId,
}

/// `browser.createUserContext` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContextInfo {
    /// The user context id.
    pub user_context: UserContextId,
}

/// One realm description for `script.getRealms`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmInfo {
    /// The realm id.
    pub realm: RealmId,
    /// Realm origin.
    pub origin: String,
    /// Owning context for window realms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BrowsingContextId>,
    /// Realm kind.
    #[serde(rename = "type")]
    pub realm_type: RealmType,
    /// Sandbox name for sandboxed window realms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
