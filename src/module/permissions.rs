//! Permission commands.
//!
//! `permissions.setPermission` forwards the grant to the browser and
//! mirrors it in the user-context store so later queries stay local.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::error::Result;
use crate::identifiers::UserContextId;
use crate::mapper::Engine;
use crate::protocol::command::{PermissionState, SetPermissionParams};

// ============================================================================
// Handlers
// ============================================================================

/// `permissions.setPermission`
pub async fn set_permission(engine: &Engine, params: SetPermissionParams) -> Result<Value> {
    let user_context = params
        .user_context
        .clone()
        .unwrap_or_else(UserContextId::default_context);
    engine.user_contexts.expect(&user_context)?;

    let setting = match params.state {
        PermissionState::Granted => "granted",
        PermissionState::Denied => "denied",
        PermissionState::Prompt => "prompt",
    };

    let mut cdp_params = json!({
        "permission": {"name": params.descriptor.name},
        "setting": setting,
        "origin": params.origin,
    });
    if let Some(browser_context) = engine.user_contexts.cdp_browser_context(&user_context)? {
        cdp_params["browserContextId"] = Value::from(browser_context);
    }

    engine.cdp.send("Browser.setPermission", cdp_params).await?;

    engine.user_contexts.set_permission(
        &user_context,
        params.origin,
        params.descriptor.name,
        params.state,
    )?;

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
    use crate::mapper::MapperSession;
    use crate::protocol::command::PermissionDescriptor;

    #[tokio::test]
    async fn test_set_permission_forwards_and_records() {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        let engine = session.engine_for_tests();

        set_permission(
            engine,
            SetPermissionParams {
                descriptor: PermissionDescriptor {
                    name: "geolocation".to_string(),
                },
                state: PermissionState::Granted,
                origin: "https://example.test".to_string(),
                user_context: None,
            },
        )
        .await
        .expect("set");

        let calls = browser.calls_for("Browser.setPermission");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params["setting"], "granted");

        assert_eq!(
            engine.user_contexts.permission(
                &UserContextId::default_context(),
                "https://example.test",
                "geolocation",
            ),
            Some(PermissionState::Granted)
        );
    }

    #[tokio::test]
    async fn test_unknown_user_context_rejected() {
        let (_browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");

        let err = set_permission(
            session.engine_for_tests(),
            SetPermissionParams {
                descriptor: PermissionDescriptor {
                    name: "geolocation".to_string(),
                },
                state: PermissionState::Denied,
                origin: "https://example.test".to_string(),
                user_context: Some(UserContextId::new("ghost")),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "no such user context");
    }
}
