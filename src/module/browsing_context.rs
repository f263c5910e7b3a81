//! Browsing-context commands: tree, lifecycle, navigation.
//!
//! Navigation commands drive the per-context state machine in the
//! context store and emit the lifecycle events themselves; browser-side
//! transitions arrive through the event processors.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::BrowsingContextId;
use crate::mapper::Engine;
use crate::protocol::command::{
    ActivateParams, CloseParams, CreateParams, CreateResult, CreateType, GetTreeParams,
    HandleUserPromptParams, NavigateParams, NavigateResult, ReadinessState, ReloadParams,
    TraverseHistoryParams,
};
use crate::protocol::event::{EventData, FetchError, NavigationInfo, RealmDestroyed};
use crate::protocol::network::{
    FetchTimingInfo, NetworkEventBase, RequestData, compute_headers_size,
};
use crate::store::network::wall_time_ms;

// ============================================================================
// Tree
// ============================================================================

/// `browsingContext.getTree`
pub fn get_tree(engine: &Engine, params: GetTreeParams) -> Result<Value> {
    if let Some(root) = &params.root {
        engine.contexts.expect(root)?;
    }
    let contexts = engine.contexts.tree(params.root.as_ref(), params.max_depth)?;
    Ok(json!({"contexts": contexts}))
}

// ============================================================================
// Lifecycle
// ============================================================================

/// `browsingContext.create`
pub async fn create(engine: &Engine, params: CreateParams) -> Result<Value> {
    if let Some(reference) = &params.reference_context {
        engine.contexts.expect(reference)?;
    }

    let user_context = params
        .user_context
        .unwrap_or_else(crate::identifiers::UserContextId::default_context);
    engine.user_contexts.expect(&user_context)?;
    let browser_context = engine.user_contexts.cdp_browser_context(&user_context)?;

    let mut cdp_params = json!({
        "url": "about:blank",
        "newWindow": params.create_type == CreateType::Window,
        "background": params.background,
    });
    if let Some(browser_context) = browser_context {
        cdp_params["browserContextId"] = Value::from(browser_context);
    }

    let result = engine.cdp.send("Target.createTarget", cdp_params).await?;
    let target_id = result["targetId"]
        .as_str()
        .ok_or_else(|| Error::unknown("Target.createTarget returned no targetId"))?;
    let context = BrowsingContextId::new(target_id);

    // The target announces itself via auto-attach; wait for the store.
    tokio::select! {
        result = engine.contexts.wait_for_context(&context, engine.idle_timeout()) => result?,
        () = engine.until_ended() => return Err(Error::SessionEnded),
    }

    Ok(serde_json::to_value(CreateResult { context }).map_err(|e| Error::unknown(e.to_string()))?)
}

/// `browsingContext.close`
pub async fn close(engine: &Engine, params: CloseParams) -> Result<Value> {
    if !engine.contexts.is_top_level(&params.context)? {
        return Err(Error::invalid_argument(
            "Only top-level contexts can be closed",
        ));
    }

    engine
        .cdp
        .send(
            "Target.closeTarget",
            json!({"targetId": params.context.as_str()}),
        )
        .await?;

    destroy_context(engine, &params.context);
    Ok(json!({}))
}

/// Removes a subtree and emits the teardown events in post-order.
///
/// Per removed context: realm teardown, in-flight request collection
/// with `fetchError`, then its own `contextDestroyed` — so no event for
/// a context follows its destroy. Idempotent with the processor path.
pub(crate) fn destroy_context(engine: &Engine, id: &BrowsingContextId) {
    // Capture the routing root first; once removed, the nodes can no
    // longer be rolled up through the store.
    let top_level = engine.contexts.top_level_of(id).ok();

    let Ok(removed) = engine.contexts.remove_subtree(id) else {
        return;
    };

    for info in removed {
        for realm in engine.realms.remove_by_context(&info.context) {
            engine.emit_event_at(
                EventData::RealmDestroyed(RealmDestroyed { realm: realm.id }),
                top_level.as_ref(),
            );
        }

        for request_id in engine.network.requests_for_context(&info.context) {
            if let Some(request) = engine.network.remove(&request_id) {
                engine.emit_event_at(EventData::FetchError(FetchError {
                    base: NetworkEventBase {
                        context: Some(info.context.clone()),
                        is_blocked: false,
                        navigation: request.navigation.clone(),
                        redirect_count: request.redirect_count,
                        request: RequestData {
                            request: request.id.clone(),
                            url: request.url.clone(),
                            method: request.method.clone(),
                            headers_size: compute_headers_size(&request.headers),
                            headers: request.headers,
                            cookies: Vec::new(),
                            body_size: None,
                            timings: FetchTimingInfo::default(),
                        },
                        timestamp: wall_time_ms(),
                        intercepts: None,
                    },
                    error_text: "net::ERR_ABORTED".to_string(),
                }), top_level.as_ref());
            }
        }

        engine.preload.forget_context(&info.context);
        engine.emit_event_at(EventData::ContextDestroyed(info), top_level.as_ref());
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// `browsingContext.navigate`
///
/// A navigate issued to an iframe acts on that iframe's own frame (the
/// CDP call carries its `frameId`); it is never rewritten to the
/// top-level context.
pub async fn navigate(engine: &Engine, params: NavigateParams) -> Result<Value> {
    engine.contexts.expect(&params.context)?;
    Url::parse(&params.url)
        .map_err(|e| Error::invalid_argument(format!("Invalid URL '{}': {e}", params.url)))?;

    let (navigation, superseded) = engine
        .contexts
        .begin_navigation(&params.context, &params.url)?;

    if let Some(old) = superseded {
        engine.emit_event(EventData::NavigationAborted(NavigationInfo {
            context: params.context.clone(),
            navigation: Some(old.id),
            timestamp: wall_time_ms(),
            url: old.url,
        }));
    }

    engine.emit_event(EventData::NavigationStarted(NavigationInfo {
        context: params.context.clone(),
        navigation: Some(navigation.clone()),
        timestamp: wall_time_ms(),
        url: params.url.clone(),
    }));

    let session = engine.contexts.session_of(&params.context)?;
    let mut cdp_params = json!({"url": params.url});
    if !engine.contexts.is_top_level(&params.context)? {
        cdp_params["frameId"] = Value::from(params.context.as_str());
    }

    let result = engine
        .cdp
        .send_on(Some(&session), "Page.navigate", cdp_params)
        .await;

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            fail_navigation(engine, &params.context, &navigation, &params.url);
            return Err(e);
        }
    };

    if let Some(error_text) = result["errorText"].as_str() {
        fail_navigation(engine, &params.context, &navigation, &params.url);
        return Err(Error::unknown(error_text));
    }

    engine.contexts.set_url(&params.context, &params.url);
    debug!(context = %params.context, navigation = %navigation, "Navigation accepted");

    await_readiness(engine, &params.context, &navigation, params.wait).await?;

    Ok(serde_json::to_value(NavigateResult {
        navigation,
        url: params.url,
    })
    .map_err(|e| Error::unknown(e.to_string()))?)
}

/// `browsingContext.reload`
pub async fn reload(engine: &Engine, params: ReloadParams) -> Result<Value> {
    engine.contexts.expect(&params.context)?;
    let url = engine.contexts.url_of(&params.context)?;

    let (navigation, superseded) = engine.contexts.begin_navigation(&params.context, &url)?;

    if let Some(old) = superseded {
        engine.emit_event(EventData::NavigationAborted(NavigationInfo {
            context: params.context.clone(),
            navigation: Some(old.id),
            timestamp: wall_time_ms(),
            url: old.url,
        }));
    }

    engine.emit_event(EventData::NavigationStarted(NavigationInfo {
        context: params.context.clone(),
        navigation: Some(navigation.clone()),
        timestamp: wall_time_ms(),
        url: url.clone(),
    }));

    let session = engine.contexts.session_of(&params.context)?;
    engine
        .cdp
        .send_on(
            Some(&session),
            "Page.reload",
            json!({"ignoreCache": params.ignore_cache}),
        )
        .await?;

    await_readiness(engine, &params.context, &navigation, params.wait).await?;

    Ok(serde_json::to_value(NavigateResult { navigation, url }).map_err(|e| Error::unknown(e.to_string()))?)
}

/// `browsingContext.traverseHistory`
pub async fn traverse_history(engine: &Engine, params: TraverseHistoryParams) -> Result<Value> {
    engine.contexts.expect(&params.context)?;
    let session = engine.contexts.session_of(&params.context)?;

    let history = engine
        .cdp
        .send_on(Some(&session), "Page.getNavigationHistory", json!({}))
        .await?;

    let current = history["currentIndex"].as_i64().unwrap_or(0);
    let entries = history["entries"].as_array().cloned().unwrap_or_default();
    let target = current + i64::from(params.delta);

    if target < 0 || target >= entries.len() as i64 {
        return Err(Error::invalid_argument(format!(
            "No history entry at delta {}",
            params.delta
        )));
    }

    let entry_id = entries[target as usize]["id"].clone();
    engine
        .cdp
        .send_on(
            Some(&session),
            "Page.navigateToHistoryEntry",
            json!({"entryId": entry_id}),
        )
        .await?;

    Ok(json!({}))
}

/// `browsingContext.activate`
pub async fn activate(engine: &Engine, params: ActivateParams) -> Result<Value> {
    if !engine.contexts.is_top_level(&params.context)? {
        return Err(Error::invalid_argument(
            "Activation is only supported on the top-level context",
        ));
    }

    let session = engine.contexts.session_of(&params.context)?;
    engine
        .cdp
        .send_on(Some(&session), "Page.bringToFront", json!({}))
        .await?;
    Ok(json!({}))
}

/// `browsingContext.handleUserPrompt`
pub async fn handle_user_prompt(engine: &Engine, params: HandleUserPromptParams) -> Result<Value> {
    engine.contexts.expect(&params.context)?;
    let session = engine.contexts.session_of(&params.context)?;

    let mut cdp_params = json!({"accept": params.accept.unwrap_or(true)});
    if let Some(user_text) = &params.user_text {
        cdp_params["promptText"] = Value::from(user_text.as_str());
    }

    engine
        .cdp
        .send_on(Some(&session), "Page.handleJavaScriptDialog", cdp_params)
        .await?;
    Ok(json!({}))
}

// ============================================================================
// Helpers
// ============================================================================

fn fail_navigation(
    engine: &Engine,
    context: &BrowsingContextId,
    navigation: &crate::identifiers::NavigationId,
    url: &str,
) {
    engine.contexts.navigation_failed(context);
    engine.emit_event(EventData::NavigationFailed(NavigationInfo {
        context: context.clone(),
        navigation: Some(navigation.clone()),
        timestamp: wall_time_ms(),
        url: url.to_string(),
    }));
}

/// Suspends until the navigation satisfies `wait`, the session ends, or
/// the handler timeout fires.
async fn await_readiness(
    engine: &Engine,
    context: &BrowsingContextId,
    navigation: &crate::identifiers::NavigationId,
    wait: ReadinessState,
) -> Result<()> {
    if wait == ReadinessState::None {
        return Ok(());
    }

    tokio::select! {
        result = engine.contexts.wait_for_navigation(
            context,
            navigation,
            wait,
            engine.idle_timeout(),
        ) => result,
        () = engine.until_ended() => Err(Error::SessionEnded),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockBrowser;
    use crate::config::MapperConfig;
    use crate::identifiers::{CdpSessionId, UserContextId};
    use crate::mapper::MapperSession;

    async fn session_with_context() -> (MockBrowser, std::sync::Arc<MapperSession>) {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        session.engine_for_tests().contexts.insert_top_level(
            BrowsingContextId::new("CTX1"),
            UserContextId::default_context(),
            Some(CdpSessionId::new("s1")),
            "https://start.test/",
        );
        (browser, session)
    }

    #[tokio::test]
    async fn test_navigate_unknown_context() {
        let (_browser, session) = session_with_context().await;
        let err = navigate(
            session.engine_for_tests(),
            NavigateParams {
                context: BrowsingContextId::new("ghost"),
                url: "https://example.test/".to_string(),
                wait: ReadinessState::None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "no such frame");
    }

    #[tokio::test]
    async fn test_navigate_invalid_url() {
        let (_browser, session) = session_with_context().await;
        let err = navigate(
            session.engine_for_tests(),
            NavigateParams {
                context: BrowsingContextId::new("CTX1"),
                url: "not a url".to_string(),
                wait: ReadinessState::None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }

    #[tokio::test]
    async fn test_navigate_wait_none_resolves_immediately() {
        let (browser, session) = session_with_context().await;
        let result = navigate(
            session.engine_for_tests(),
            NavigateParams {
                context: BrowsingContextId::new("CTX1"),
                url: "https://example.test/".to_string(),
                wait: ReadinessState::None,
            },
        )
        .await
        .expect("navigate");

        assert_eq!(result["url"], "https://example.test/");
        assert!(result["navigation"].is_string());
        assert_eq!(browser.calls_for("Page.navigate").len(), 1);
    }

    #[tokio::test]
    async fn test_navigate_cdp_error_fails_navigation() {
        let (browser, session) = session_with_context().await;
        browser.respond_with(
            "Page.navigate",
            json!({"frameId": "f", "errorText": "net::ERR_NAME_NOT_RESOLVED"}),
        );

        let err = navigate(
            session.engine_for_tests(),
            NavigateParams {
                context: BrowsingContextId::new("CTX1"),
                url: "https://nope.invalid/".to_string(),
                wait: ReadinessState::Complete,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "net::ERR_NAME_NOT_RESOLVED");
    }

    #[tokio::test]
    async fn test_activate_rejects_child_context() {
        let (_browser, session) = session_with_context().await;
        let engine = session.engine_for_tests();
        engine
            .contexts
            .insert_child(BrowsingContextId::new("frame"), &BrowsingContextId::new("CTX1"))
            .unwrap();

        let err = activate(
            engine,
            ActivateParams {
                context: BrowsingContextId::new("frame"),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }

    #[tokio::test]
    async fn test_traverse_history_bounds() {
        let (browser, session) = session_with_context().await;
        browser.respond_with(
            "Page.getNavigationHistory",
            json!({
                "currentIndex": 1,
                "entries": [{"id": 10}, {"id": 11}, {"id": 12}],
            }),
        );

        traverse_history(
            session.engine_for_tests(),
            TraverseHistoryParams {
                context: BrowsingContextId::new("CTX1"),
                delta: -1,
            },
        )
        .await
        .expect("back");

        let err = traverse_history(
            session.engine_for_tests(),
            TraverseHistoryParams {
                context: BrowsingContextId::new("CTX1"),
                delta: 5,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }

    #[tokio::test]
    async fn test_get_tree_unknown_root() {
        let (_browser, session) = session_with_context().await;
        let err = get_tree(
            session.engine_for_tests(),
            GetTreeParams {
                max_depth: None,
                root: Some(BrowsingContextId::new("ghost")),
            },
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "no such frame");
    }

    #[tokio::test]
    async fn test_close_rejects_child() {
        let (_browser, session) = session_with_context().await;
        let engine = session.engine_for_tests();
        engine
            .contexts
            .insert_child(BrowsingContextId::new("frame"), &BrowsingContextId::new("CTX1"))
            .unwrap();

        let err = close(
            engine,
            CloseParams {
                context: BrowsingContextId::new("frame"),
                prompt_unload: false,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }
}
