//! Network commands: intercepts and blocked-request resolution.
//!
//! Registering an intercept arms the CDP `Fetch` domain on every page
//! session; a paused fetch shows up as `Fetch.requestPaused`, the event
//! processor marks the request blocked, and exactly one of the
//! resolution commands below releases it. Claiming the blocked state is
//! atomic in the store, so a second resolution fails with
//! `invalid argument`.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{BrowsingContextId, InterceptId};
use crate::mapper::Engine;
use crate::protocol::command::{
    AddInterceptParams, AddInterceptResult, ContinueRequestParams, ContinueResponseParams,
    ContinueWithAuthAction, ContinueWithAuthParams, FailRequestParams, ProvideResponseParams,
    RemoveInterceptParams, SetCacheBehaviorParams,
};
use crate::protocol::network::{AuthCredentials, Header, InterceptPhase};
use crate::store::network::RequestPhase;

use super::url_pattern;

// ============================================================================
// Intercept Lifecycle
// ============================================================================

/// `network.addIntercept`
pub async fn add_intercept(engine: &Engine, params: AddInterceptParams) -> Result<Value> {
    if params.phases.is_empty() {
        return Err(Error::invalid_argument(
            "At least one phase must be specified",
        ));
    }
    if let Some(patterns) = &params.url_patterns {
        url_pattern::validate_patterns(patterns)?;
    }
    if let Some(contexts) = &params.contexts {
        for context in contexts {
            if !engine.contexts.is_top_level(context)? {
                return Err(Error::invalid_argument(format!(
                    "Intercept contexts must be top-level, '{context}' is not"
                )));
            }
        }
    }

    let intercept =
        engine
            .network
            .add_intercept(params.phases, params.url_patterns, params.contexts);

    sync_fetch_enablement(engine).await?;

    Ok(serde_json::to_value(AddInterceptResult { intercept }).map_err(|e| Error::unknown(e.to_string()))?)
}

/// `network.removeIntercept`
pub async fn remove_intercept(engine: &Engine, params: RemoveInterceptParams) -> Result<Value> {
    engine.network.remove_intercept(&params.intercept)?;
    sync_fetch_enablement(engine).await?;
    Ok(json!({}))
}

/// Arms or disarms `Fetch` on every page session to match the intercept
/// registry.
pub(crate) async fn sync_fetch_enablement(engine: &Engine) -> Result<()> {
    for context in engine.contexts.top_level_contexts() {
        let Ok(session) = engine.contexts.session_of(&context) else {
            continue;
        };
        arm_fetch_for_session(engine, &session).await?;
    }
    Ok(())
}

/// Arms `Fetch` on one session according to the registry; called for
/// existing sessions on registry changes and for new targets on attach.
pub(crate) async fn arm_fetch_for_session(
    engine: &Engine,
    session: &crate::identifiers::CdpSessionId,
) -> Result<()> {
    let intercepts = engine.network.intercepts();
    if intercepts.is_empty() {
        let _ = engine
            .cdp
            .send_on(Some(session), "Fetch.disable", json!({}))
            .await;
        return Ok(());
    }

    let request_stage = engine.network.has_phase(InterceptPhase::BeforeRequestSent);
    let response_stage = engine.network.has_phase(InterceptPhase::ResponseStarted);
    let auth = engine.network.has_phase(InterceptPhase::AuthRequired);

    let mut patterns = Vec::new();
    if request_stage || auth {
        patterns.push(json!({"urlPattern": "*", "requestStage": "Request"}));
    }
    if response_stage {
        patterns.push(json!({"urlPattern": "*", "requestStage": "Response"}));
    }

    engine
        .cdp
        .send_on(
            Some(session),
            "Fetch.enable",
            json!({
                "patterns": patterns,
                "handleAuthRequests": auth,
            }),
        )
        .await?;
    Ok(())
}

/// Returns the intercepts matching a request at a phase, per the
/// three-way test: phase listed, URL pattern hit, context in filter.
pub(crate) fn matching_intercepts(
    engine: &Engine,
    phase: InterceptPhase,
    url: &str,
    context: Option<&BrowsingContextId>,
) -> Vec<InterceptId> {
    let top_level = context.and_then(|c| engine.contexts.top_level_of(c).ok());

    let mut ids = engine
        .network
        .intercepts()
        .into_iter()
        .filter(|intercept| intercept.phases.contains(&phase))
        .filter(|intercept| url_pattern::matches_any(intercept.patterns.as_deref(), url))
        .filter(|intercept| match (&intercept.contexts, &top_level) {
            (None, _) => true,
            (Some(filter), Some(top_level)) => filter.contains(top_level),
            (Some(_), None) => false,
        })
        .map(|intercept| intercept.id)
        .collect::<Vec<_>>();

    ids.sort();
    ids
}

// ============================================================================
// Blocked-Request Resolution
// ============================================================================

const ALL_PHASES: &[InterceptPhase] = &[
    InterceptPhase::BeforeRequestSent,
    InterceptPhase::ResponseStarted,
    InterceptPhase::AuthRequired,
];

/// `network.continueRequest`
pub async fn continue_request(engine: &Engine, params: ContinueRequestParams) -> Result<Value> {
    let request = engine.network.get(&params.request)?;
    let (fetch_id, _) = engine
        .network
        .claim_blocked(&params.request, &[InterceptPhase::BeforeRequestSent])?;

    let mut cdp_params = json!({"requestId": fetch_id});
    if let Some(url) = &params.url {
        cdp_params["url"] = Value::from(url.as_str());
    }
    if let Some(method) = &params.method {
        cdp_params["method"] = Value::from(method.as_str());
    }
    if let Some(headers) = &params.headers {
        cdp_params["headers"] = headers_to_cdp(headers);
    }
    if let Some(cookies) = &params.cookies {
        // Cookies ride as one folded Cookie header.
        let folded = cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value.to_cdp_string()))
            .collect::<Vec<_>>()
            .join("; ");
        cdp_params["headers"] = match cdp_params.get("headers") {
            Some(Value::Array(existing)) => {
                let mut headers = existing.clone();
                headers.push(json!({"name": "Cookie", "value": folded}));
                Value::Array(headers)
            }
            _ => json!([{"name": "Cookie", "value": folded}]),
        };
    }
    if let Some(body) = &params.body {
        cdp_params["postData"] = Value::from(BASE64.encode(body.decoded()));
    }

    let session = request_session(engine, &request.context)?;
    engine
        .cdp
        .send_on(session.as_ref(), "Fetch.continueRequest", cdp_params)
        .await?;

    debug!(request = %params.request, "Blocked request continued");
    Ok(json!({}))
}

/// `network.continueResponse`
pub async fn continue_response(engine: &Engine, params: ContinueResponseParams) -> Result<Value> {
    let status_code = validate_status_code(params.status_code)?;
    let request = engine.network.get(&params.request)?;
    let (fetch_id, phase) = engine.network.claim_blocked(
        &params.request,
        &[InterceptPhase::ResponseStarted, InterceptPhase::AuthRequired],
    )?;

    let session = request_session(engine, &request.context)?;

    if phase == RequestPhase::AuthRequired {
        let challenge_response = match &params.credentials {
            Some(credentials) => auth_response("ProvideCredentials", Some(credentials)),
            None => auth_response("Default", None),
        };
        engine
            .cdp
            .send_on(
                session.as_ref(),
                "Fetch.continueWithAuth",
                json!({
                    "requestId": fetch_id,
                    "authChallengeResponse": challenge_response,
                }),
            )
            .await?;
        return Ok(json!({}));
    }

    let mut cdp_params = json!({"requestId": fetch_id});
    if let Some(status_code) = status_code {
        cdp_params["responseCode"] = Value::from(status_code);
    }
    if let Some(reason_phrase) = &params.reason_phrase {
        cdp_params["responsePhrase"] = Value::from(reason_phrase.as_str());
    }
    if let Some(headers) = &params.headers {
        cdp_params["responseHeaders"] = headers_to_cdp(headers);
    }

    engine
        .cdp
        .send_on(session.as_ref(), "Fetch.continueResponse", cdp_params)
        .await?;

    Ok(json!({}))
}

/// `network.provideResponse`
pub async fn provide_response(engine: &Engine, params: ProvideResponseParams) -> Result<Value> {
    let status_code = validate_status_code(params.status_code)?;
    let request = engine.network.get(&params.request)?;
    let (fetch_id, phase) = engine.network.claim_blocked(&params.request, ALL_PHASES)?;

    let session = request_session(engine, &request.context)?;

    // A fetch paused at the auth phase cannot be fulfilled directly;
    // cancel the challenge and let the synthesized failure surface.
    if phase == RequestPhase::AuthRequired {
        engine
            .cdp
            .send_on(
                session.as_ref(),
                "Fetch.continueWithAuth",
                json!({
                    "requestId": fetch_id,
                    "authChallengeResponse": auth_response("CancelAuth", None),
                }),
            )
            .await?;
        return Ok(json!({}));
    }

    let mut headers = params.headers.clone().unwrap_or_default();
    if let Some(cookies) = &params.cookies {
        for cookie in cookies {
            headers.push(Header::new(
                "Set-Cookie",
                format!("{}={}", cookie.name, cookie.value.to_cdp_string()),
            ));
        }
    }

    let mut cdp_params = json!({
        "requestId": fetch_id,
        "responseCode": status_code.unwrap_or(200),
        "responseHeaders": headers_to_cdp(&headers),
    });
    if let Some(reason_phrase) = &params.reason_phrase {
        cdp_params["responsePhrase"] = Value::from(reason_phrase.as_str());
    }
    if let Some(body) = &params.body {
        cdp_params["body"] = Value::from(BASE64.encode(body.decoded()));
    }

    engine
        .cdp
        .send_on(session.as_ref(), "Fetch.fulfillRequest", cdp_params)
        .await?;

    debug!(request = %params.request, "Response provided");
    Ok(json!({}))
}

/// `network.continueWithAuth`
pub async fn continue_with_auth(engine: &Engine, params: ContinueWithAuthParams) -> Result<Value> {
    let request = engine.network.get(&params.request)?;

    let challenge_response = match params.action {
        ContinueWithAuthAction::ProvideCredentials => {
            let credentials = params.credentials.as_ref().ok_or_else(|| {
                Error::invalid_argument("'credentials' required for action 'provideCredentials'")
            })?;
            auth_response("ProvideCredentials", Some(credentials))
        }
        ContinueWithAuthAction::Cancel => auth_response("CancelAuth", None),
        ContinueWithAuthAction::Default => auth_response("Default", None),
    };

    let (fetch_id, _) = engine
        .network
        .claim_blocked(&params.request, &[InterceptPhase::AuthRequired])?;

    let session = request_session(engine, &request.context)?;
    engine
        .cdp
        .send_on(
            session.as_ref(),
            "Fetch.continueWithAuth",
            json!({
                "requestId": fetch_id,
                "authChallengeResponse": challenge_response,
            }),
        )
        .await?;

    Ok(json!({}))
}

/// `network.failRequest`
pub async fn fail_request(engine: &Engine, params: FailRequestParams) -> Result<Value> {
    let request = engine.network.get(&params.request)?;
    let (fetch_id, _) = engine.network.claim_blocked(&params.request, ALL_PHASES)?;

    let session = request_session(engine, &request.context)?;
    engine
        .cdp
        .send_on(
            session.as_ref(),
            "Fetch.failRequest",
            json!({"requestId": fetch_id, "errorReason": "Failed"}),
        )
        .await?;

    Ok(json!({}))
}

/// `network.setCacheBehavior`
pub async fn set_cache_behavior(engine: &Engine, params: SetCacheBehaviorParams) -> Result<Value> {
    use crate::protocol::command::CacheBehavior;

    let contexts = match &params.contexts {
        Some(contexts) => {
            for context in contexts {
                engine.contexts.expect(context)?;
            }
            contexts.clone()
        }
        None => engine.contexts.top_level_contexts(),
    };

    let disabled = params.cache_behavior == CacheBehavior::Bypass;
    for context in contexts {
        let session = engine.contexts.session_of(&context)?;
        engine
            .cdp
            .send_on(
                Some(&session),
                "Network.setCacheDisabled",
                json!({"cacheDisabled": disabled}),
            )
            .await?;
    }

    Ok(json!({}))
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_status_code(status_code: Option<i64>) -> Result<Option<u32>> {
    match status_code {
        Some(code) if code < 0 => Err(Error::invalid_argument(
            "Number must be greater than or equal to 0 in \"statusCode\"",
        )),
        Some(code) => Ok(Some(code as u32)),
        None => Ok(None),
    }
}

fn headers_to_cdp(headers: &[Header]) -> Value {
    Value::Array(
        headers
            .iter()
            .map(|header| {
                let (name, value) = header.to_cdp();
                json!({"name": name, "value": value})
            })
            .collect(),
    )
}

fn auth_response(response: &str, credentials: Option<&AuthCredentials>) -> Value {
    let mut body = json!({"response": response});
    if let Some(credentials) = credentials {
        body["username"] = Value::from(credentials.username.as_str());
        body["password"] = Value::from(credentials.password.as_str());
    }
    body
}

fn request_session(
    engine: &Engine,
    context: &Option<BrowsingContextId>,
) -> Result<Option<crate::identifiers::CdpSessionId>> {
    match context {
        Some(context) => Ok(engine.contexts.session_of(context).ok()),
        None => Ok(None),
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
    use crate::identifiers::{CdpSessionId, NetworkRequestId, UserContextId};
    use crate::mapper::MapperSession;
    use crate::protocol::network::UrlPattern;
    use crate::store::network::NetworkRequest;

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

    fn blocked_request(engine: &Engine, id: &str) -> NetworkRequestId {
        let request_id = NetworkRequestId::new(id);
        engine.network.upsert_request(NetworkRequest::new(
            request_id.clone(),
            Some(BrowsingContextId::new("CTX1")),
            None,
            "https://a/",
            "GET",
            Vec::new(),
        ));
        engine
            .network
            .mark_blocked(&request_id, format!("fetch-{id}"), Vec::new());
        request_id
    }

    #[tokio::test]
    async fn test_add_intercept_arms_fetch() {
        let (browser, session) = session_with_context().await;
        let result = add_intercept(
            session.engine_for_tests(),
            AddInterceptParams {
                phases: vec![InterceptPhase::BeforeRequestSent],
                url_patterns: Some(vec![UrlPattern::String {
                    pattern: "https://a/".to_string(),
                }]),
                contexts: None,
            },
        )
        .await
        .expect("add intercept");

        assert!(result["intercept"].is_string());
        assert_eq!(browser.calls_for("Fetch.enable").len(), 1);
    }

    #[tokio::test]
    async fn test_add_intercept_requires_phases() {
        let (_browser, session) = session_with_context().await;
        let err = add_intercept(
            session.engine_for_tests(),
            AddInterceptParams {
                phases: Vec::new(),
                url_patterns: None,
                contexts: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }

    #[tokio::test]
    async fn test_remove_intercept_disarms_fetch() {
        let (browser, session) = session_with_context().await;
        let engine = session.engine_for_tests();
        let result = add_intercept(
            engine,
            AddInterceptParams {
                phases: vec![InterceptPhase::BeforeRequestSent],
                url_patterns: None,
                contexts: None,
            },
        )
        .await
        .unwrap();

        let intercept = InterceptId::new(result["intercept"].as_str().unwrap());
        remove_intercept(engine, RemoveInterceptParams { intercept })
            .await
            .expect("remove");

        assert_eq!(browser.calls_for("Fetch.disable").len(), 1);
    }

    #[tokio::test]
    async fn test_continue_request_resolves_once() {
        let (browser, session) = session_with_context().await;
        let engine = session.engine_for_tests();
        let request = blocked_request(engine, "r-1");

        continue_request(
            engine,
            ContinueRequestParams {
                request: request.clone(),
                url: None,
                method: None,
                headers: None,
                cookies: None,
                body: None,
            },
        )
        .await
        .expect("first resolution");
        assert_eq!(browser.calls_for("Fetch.continueRequest").len(), 1);

        let err = continue_request(
            engine,
            ContinueRequestParams {
                request,
                url: None,
                method: None,
                headers: None,
                cookies: None,
                body: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }

    #[tokio::test]
    async fn test_provide_response_unknown_request() {
        let (_browser, session) = session_with_context().await;
        let err = provide_response(
            session.engine_for_tests(),
            ProvideResponseParams {
                request: NetworkRequestId::new("_UNKNOWN_"),
                status_code: None,
                reason_phrase: None,
                headers: None,
                cookies: None,
                body: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "no such request");
        assert_eq!(
            err.to_string(),
            "Network request with ID '_UNKNOWN_' doesn't exist"
        );
    }

    #[tokio::test]
    async fn test_provide_response_negative_status() {
        let (_browser, session) = session_with_context().await;
        let engine = session.engine_for_tests();
        let request = blocked_request(engine, "r-2");

        let err = provide_response(
            engine,
            ProvideResponseParams {
                request,
                status_code: Some(-1),
                reason_phrase: None,
                headers: None,
                cookies: None,
                body: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
        assert!(err.to_string().contains("statusCode"));
    }

    #[tokio::test]
    async fn test_provide_response_fulfills() {
        let (browser, session) = session_with_context().await;
        let engine = session.engine_for_tests();
        let request = blocked_request(engine, "r-3");

        provide_response(
            engine,
            ProvideResponseParams {
                request,
                status_code: Some(200),
                reason_phrase: Some("OK".to_string()),
                headers: None,
                cookies: None,
                body: Some(crate::protocol::network::BytesValue::string("hello")),
            },
        )
        .await
        .expect("fulfill");

        let calls = browser.calls_for("Fetch.fulfillRequest");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params["responseCode"], 200);
    }

    #[tokio::test]
    async fn test_continue_with_auth_requires_credentials() {
        let (_browser, session) = session_with_context().await;
        let engine = session.engine_for_tests();
        let request = blocked_request(engine, "r-4");

        let err = continue_with_auth(
            engine,
            ContinueWithAuthParams {
                request,
                action: ContinueWithAuthAction::ProvideCredentials,
                credentials: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid argument");
    }

    #[tokio::test]
    async fn test_matching_intercepts_filters() {
        let (_browser, session) = session_with_context().await;
        let engine = session.engine_for_tests();

        let hit = engine.network.add_intercept(
            vec![InterceptPhase::BeforeRequestSent],
            Some(vec![UrlPattern::String {
                pattern: "https://a/".to_string(),
            }]),
            None,
        );
        let _wrong_phase = engine.network.add_intercept(
            vec![InterceptPhase::ResponseStarted],
            None,
            None,
        );
        let _wrong_context = engine.network.add_intercept(
            vec![InterceptPhase::BeforeRequestSent],
            None,
            Some(vec![BrowsingContextId::new("OTHER")]),
        );

        let matched = matching_intercepts(
            engine,
            InterceptPhase::BeforeRequestSent,
            "https://a/",
            Some(&BrowsingContextId::new("CTX1")),
        );
        assert_eq!(matched, vec![hit]);
    }
}
