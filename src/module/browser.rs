//! Browser commands: user contexts, shutdown.
//!
//! A BiDi user context is backed one-to-one by a CDP browser context;
//! the CDP id doubles as the BiDi id. Removing a user context first
//! closes every browsing context living in it.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tracing::info;

use crate::error::{Error, Result};
use crate::identifiers::UserContextId;
use crate::mapper::Engine;
use crate::protocol::command::{RemoveUserContextParams, UserContextInfo};

use super::browsing_context::destroy_context;

// ============================================================================
// Handlers
// ============================================================================

/// `browser.createUserContext`
pub async fn create_user_context(engine: &Engine) -> Result<Value> {
    let result = engine
        .cdp
        .send("Target.createBrowserContext", json!({}))
        .await?;
    let browser_context = result["browserContextId"]
        .as_str()
        .ok_or_else(|| Error::unknown("Target.createBrowserContext returned no id"))?;

    let user_context = UserContextId::new(browser_context);
    engine
        .user_contexts
        .insert(user_context.clone(), browser_context);

    Ok(serde_json::to_value(UserContextInfo { user_context }).map_err(|e| Error::unknown(e.to_string()))?)
}

/// `browser.removeUserContext`
pub async fn remove_user_context(engine: &Engine, params: RemoveUserContextParams) -> Result<Value> {
    engine.user_contexts.expect(&params.user_context)?;
    if params.user_context.is_default() {
        return Err(Error::invalid_argument(
            "The default user context cannot be removed",
        ));
    }

    // Close every browsing context in the user context first.
    for context in engine.contexts.top_level_in_user_context(&params.user_context) {
        let _ = engine
            .cdp
            .send(
                "Target.closeTarget",
                json!({"targetId": context.as_str()}),
            )
            .await;
        destroy_context(engine, &context);
    }

    let browser_context = engine.user_contexts.remove(&params.user_context)?;
    if let Some(browser_context) = browser_context {
        engine
            .cdp
            .send(
                "Target.disposeBrowserContext",
                json!({"browserContextId": browser_context}),
            )
            .await?;
    }

    Ok(json!({}))
}

/// `browser.getUserContexts`
pub fn get_user_contexts(engine: &Engine) -> Result<Value> {
    let user_contexts: Vec<UserContextInfo> = engine
        .user_contexts
        .all()
        .into_iter()
        .map(|user_context| UserContextInfo { user_context })
        .collect();
    Ok(json!({"userContexts": user_contexts}))
}

/// `browser.close`
pub async fn close(engine: &Engine) -> Result<Value> {
    info!("Closing browser");
    let _ = engine.cdp.send("Browser.close", json!({})).await;
    engine.end();
    Ok(json!({}))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockBrowser;
    use crate::config::MapperConfig;
    use crate::identifiers::{BrowsingContextId, CdpSessionId};
    use crate::mapper::MapperSession;

    async fn session() -> (MockBrowser, std::sync::Arc<MapperSession>) {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        (browser, session)
    }

    #[tokio::test]
    async fn test_create_and_list_user_contexts() {
        let (_browser, session) = session().await;
        let engine = session.engine_for_tests();

        let created = create_user_context(engine).await.expect("create");
        let id = created["userContext"].as_str().unwrap().to_string();

        let listed = get_user_contexts(engine).unwrap();
        let ids: Vec<_> = listed["userContexts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|info| info["userContext"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids[0], "default");
        assert!(ids.contains(&id));
    }

    #[tokio::test]
    async fn test_remove_user_context_closes_contexts() {
        let (browser, session) = session().await;
        let engine = session.engine_for_tests();

        let created = create_user_context(engine).await.expect("create");
        let user_context = UserContextId::new(created["userContext"].as_str().unwrap());

        engine.contexts.insert_top_level(
            BrowsingContextId::new("tab-1"),
            user_context.clone(),
            Some(CdpSessionId::new("s1")),
            "",
        );

        remove_user_context(engine, RemoveUserContextParams { user_context })
            .await
            .expect("remove");

        assert!(!engine.contexts.contains(&BrowsingContextId::new("tab-1")));
        assert_eq!(browser.calls_for("Target.closeTarget").len(), 1);
        assert_eq!(browser.calls_for("Target.disposeBrowserContext").len(), 1);
    }

    #[tokio::test]
    async fn test_remove_default_rejected() {
        let (_browser, session) = session().await;
        let err = remove_user_context(
            session.engine_for_tests(),
            RemoveUserContextParams {
                user_context: UserContextId::default_context(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }

    #[tokio::test]
    async fn test_remove_unknown_user_context() {
        let (_browser, session) = session().await;
        let err = remove_user_context(
            session.engine_for_tests(),
            RemoveUserContextParams {
                user_context: UserContextId::new("ghost"),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "no such user context");
    }

    #[tokio::test]
    async fn test_browser_close_ends_session() {
        let (browser, session) = session().await;
        close(session.engine_for_tests()).await.expect("close");
        assert!(session.is_ended());
        assert_eq!(browser.calls_for("Browser.close").len(), 1);
    }
}
