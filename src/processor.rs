//! CDP event processors.
//!
//! One task drains the CDP event stream in receive order, mutates the
//! stores, and hands built BiDi events to the router. Translation reads
//! the stores only; the browser is never re-queried to build an event.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::cdp::connection::CdpEvent;
use crate::config::UnhandledPromptBehavior;
use crate::identifiers::{
    BrowsingContextId, CdpSessionId, NetworkRequestId, RealmId, UserContextId,
};
use crate::mapper::Engine;
use crate::module::browsing_context::destroy_context;
use crate::module::log_format::format_console_message;
use crate::module::network::{arm_fetch_for_session, matching_intercepts};
use crate::module::script::cdp_remote_object_to_remote_value;
use crate::protocol::command::{RealmType, ReadinessState};
use crate::protocol::event::{
    EventData, FetchError, LogEntry, LogSource, NavigationInfo, RealmDestroyed, ResponseEvent,
    UserPromptClosed, UserPromptOpened,
};
use crate::protocol::network::{
    FetchTimingInfo, Header, Initiator, InterceptPhase, NetworkEventBase, RequestData,
    ResponseData, compute_headers_size,
};
use crate::protocol::remote_value::RemoteValue;
use crate::store::network::{NetworkRequest, RequestPhase, get_timing, wall_time_ms};
use crate::store::realm::Realm;

// ============================================================================
// Event Loop
// ============================================================================

/// Drains the CDP event stream until the connection closes.
pub async fn run(engine: Arc<Engine>, mut events: mpsc::UnboundedReceiver<CdpEvent>) {
    while let Some(event) = events.recv().await {
        trace!(method = %event.method, "CDP event");
        process_event(&engine, event).await;
    }
    debug!("CDP event stream ended");
}

async fn process_event(engine: &Engine, event: CdpEvent) {
    match event.method.as_str() {
        "Target.attachedToTarget" => on_target_attached(engine, &event.params).await,
        "Target.detachedFromTarget" => on_target_detached(engine, &event),
        "Target.targetDestroyed" => {
            let context = BrowsingContextId::new(event.params["targetId"].as_str().unwrap_or(""));
            if engine.contexts.contains(&context) {
                destroy_context(engine, &context);
            }
        }

        "Page.frameAttached" => on_frame_attached(engine, &event),
        "Page.frameDetached" => on_frame_detached(engine, &event),
        "Page.frameNavigated" => on_frame_navigated(engine, &event),
        "Page.navigatedWithinDocument" => on_navigated_within_document(engine, &event),
        "Page.domContentEventFired" => {
            on_readiness(engine, &event, ReadinessState::Interactive);
        }
        "Page.loadEventFired" => on_readiness(engine, &event, ReadinessState::Complete),
        "Page.javascriptDialogOpening" => on_dialog_opening(engine, &event).await,
        "Page.javascriptDialogClosed" => on_dialog_closed(engine, &event),

        "Runtime.executionContextCreated" => on_execution_context_created(engine, &event),
        "Runtime.executionContextDestroyed" => on_execution_context_destroyed(engine, &event),
        "Runtime.consoleAPICalled" => on_console_api_called(engine, &event),
        "Runtime.exceptionThrown" => on_exception_thrown(engine, &event),

        "Network.requestWillBeSent" => on_request_will_be_sent(engine, &event),
        "Network.responseReceived" => on_response_received(engine, &event),
        "Network.loadingFinished" => on_loading_finished(engine, &event),
        "Network.loadingFailed" => on_loading_failed(engine, &event),
        "Fetch.requestPaused" => on_request_paused(engine, &event).await,
        "Fetch.authRequired" => on_auth_required(engine, &event).await,

        _ => trace!(method = %event.method, "CDP event ignored"),
    }
}

// ============================================================================
// Target Processors
// ============================================================================

async fn on_target_attached(engine: &Engine, params: &Value) {
    let target_info = &params["targetInfo"];
    let target_type = target_info["type"].as_str().unwrap_or_default();
    if target_type != "page" && target_type != "tab" {
        return;
    }

    let Some(session_id) = params["sessionId"].as_str() else {
        return;
    };
    let Some(target_id) = target_info["targetId"].as_str() else {
        return;
    };

    let session = CdpSessionId::new(session_id);
    let context = BrowsingContextId::new(target_id);
    let url = target_info["url"].as_str().unwrap_or("about:blank");

    // A browser context we created maps one-to-one onto a user context;
    // anything else lives in the default.
    let user_context = target_info["browserContextId"]
        .as_str()
        .map(UserContextId::new)
        .filter(|id| engine.user_contexts.contains(id))
        .unwrap_or_else(UserContextId::default_context);

    engine
        .contexts
        .insert_top_level(context.clone(), user_context.clone(), Some(session.clone()), url);

    // Arm the domains the mapper depends on for this target.
    for (method, params) in [
        ("Page.enable", json!({})),
        ("Runtime.enable", json!({})),
        ("Network.enable", json!({})),
    ] {
        if let Err(e) = engine.cdp.send_on(Some(&session), method, params).await {
            warn!(method, error = %e, "Domain enable failed");
        }
    }
    if let Err(e) = arm_fetch_for_session(engine, &session).await {
        warn!(error = %e, "Fetch arming failed on attach");
    }

    // Install preload scripts registered before this target existed.
    for script in engine.preload.matching(&context, &user_context) {
        let mut cdp_params = json!({"source": format!("({})();", script.source)});
        if let Some(sandbox) = &script.sandbox {
            cdp_params["worldName"] = Value::from(sandbox.as_str());
        }
        match engine
            .cdp
            .send_on(Some(&session), "Page.addScriptToEvaluateOnNewDocument", cdp_params)
            .await
        {
            Ok(result) => {
                if let Some(identifier) = result["identifier"].as_str() {
                    engine
                        .preload
                        .record_cdp_id(&script.id, context.clone(), identifier);
                }
            }
            Err(e) => warn!(script = %script.id, error = %e, "Preload install failed"),
        }
    }

    if let Ok(info) = engine.contexts.info(&context, Some(0)) {
        engine.emit_event(EventData::ContextCreated(info));
    }
}

fn on_target_detached(engine: &Engine, event: &CdpEvent) {
    let context = event.params["targetId"]
        .as_str()
        .map(BrowsingContextId::new)
        .or_else(|| {
            event
                .session_id
                .as_ref()
                .and_then(|session| engine.contexts.context_by_session(session))
        });

    if let Some(context) = context
        && engine.contexts.contains(&context)
    {
        destroy_context(engine, &context);
    }
}

// ============================================================================
// Page Processors
// ============================================================================

fn session_context(engine: &Engine, event: &CdpEvent) -> Option<BrowsingContextId> {
    event
        .session_id
        .as_ref()
        .and_then(|session| engine.contexts.context_by_session(session))
}

fn on_frame_attached(engine: &Engine, event: &CdpEvent) {
    let Some(frame_id) = event.params["frameId"].as_str() else {
        return;
    };
    let Some(parent_id) = event.params["parentFrameId"].as_str() else {
        return;
    };

    let context = BrowsingContextId::new(frame_id);
    let parent = BrowsingContextId::new(parent_id);
    if engine.contexts.insert_child(context.clone(), &parent).is_ok()
        && let Ok(info) = engine.contexts.info(&context, Some(0))
    {
        engine.emit_event(EventData::ContextCreated(info));
    }
}

fn on_frame_detached(engine: &Engine, event: &CdpEvent) {
    // A swap hands the frame over to another target; the context lives on.
    if event.params["reason"].as_str() == Some("swap") {
        return;
    }
    let Some(frame_id) = event.params["frameId"].as_str() else {
        return;
    };
    let context = BrowsingContextId::new(frame_id);
    if engine.contexts.contains(&context) {
        destroy_context(engine, &context);
    }
}

fn on_frame_navigated(engine: &Engine, event: &CdpEvent) {
    let frame = &event.params["frame"];
    let Some(frame_id) = frame["id"].as_str() else {
        return;
    };
    let context = BrowsingContextId::new(frame_id);
    if !engine.contexts.contains(&context) {
        return;
    }

    if let Some(url) = frame["url"].as_str() {
        engine.contexts.set_url(&context, url);
    }
    engine.contexts.navigation_committing(&context);
}

fn on_navigated_within_document(engine: &Engine, event: &CdpEvent) {
    let Some(frame_id) = event.params["frameId"].as_str() else {
        return;
    };
    let context = BrowsingContextId::new(frame_id);
    if !engine.contexts.contains(&context) {
        return;
    }

    let url = event.params["url"].as_str().unwrap_or_default().to_string();
    engine.contexts.set_url(&context, &url);
    engine.emit_event(EventData::FragmentNavigated(NavigationInfo {
        context,
        navigation: None,
        timestamp: wall_time_ms(),
        url,
    }));
}

fn on_readiness(engine: &Engine, event: &CdpEvent, readiness: ReadinessState) {
    let Some(context) = session_context(engine, event) else {
        return;
    };

    let navigation = engine
        .contexts
        .current_navigation(&context)
        .filter(|n| !n.stage.is_terminal_failure())
        .map(|n| n.id);
    let url = engine.contexts.url_of(&context).unwrap_or_default();

    let info = NavigationInfo {
        context: context.clone(),
        navigation,
        timestamp: wall_time_ms(),
        url,
    };

    let event = if readiness == ReadinessState::Complete {
        EventData::Load(info)
    } else {
        EventData::DomContentLoaded(info)
    };

    // Queue the event before waking navigation waiters, so the load
    // event precedes the navigate command's response on the wire.
    engine.emit_event(event);
    engine.contexts.navigation_reached(&context, readiness);
}

async fn on_dialog_opening(engine: &Engine, event: &CdpEvent) {
    let Some(context) = session_context(engine, event) else {
        return;
    };

    engine.emit_event(EventData::UserPromptOpened(UserPromptOpened {
        context: context.clone(),
        prompt_type: event.params["type"].as_str().unwrap_or("alert").to_string(),
        message: event.params["message"].as_str().unwrap_or_default().to_string(),
        default_value: event.params["defaultPrompt"].as_str().map(str::to_string),
    }));

    // Prompts nobody handles get the configured treatment.
    let accept = match engine.config.unhandled_prompt_behavior {
        UnhandledPromptBehavior::Accept => Some(true),
        UnhandledPromptBehavior::Dismiss | UnhandledPromptBehavior::Default => Some(false),
        UnhandledPromptBehavior::Ignore => None,
    };
    if let Some(accept) = accept
        && let Ok(session) = engine.contexts.session_of(&context)
    {
        let _ = engine
            .cdp
            .send_on(
                Some(&session),
                "Page.handleJavaScriptDialog",
                json!({"accept": accept}),
            )
            .await;
    }
}

fn on_dialog_closed(engine: &Engine, event: &CdpEvent) {
    let Some(context) = session_context(engine, event) else {
        return;
    };
    engine.emit_event(EventData::UserPromptClosed(UserPromptClosed {
        context,
        accepted: event.params["result"].as_bool().unwrap_or(false),
        user_text: event.params["userInput"].as_str().map(str::to_string),
    }));
}

// ============================================================================
// Runtime Processors
// ============================================================================

fn on_execution_context_created(engine: &Engine, event: &CdpEvent) {
    let context_description = &event.params["context"];
    let aux = &context_description["auxData"];

    let realm_id = context_description["uniqueId"]
        .as_str()
        .map_or_else(|| RealmId::new(uuid::Uuid::new_v4().to_string()), RealmId::new);

    let owning_context = aux["frameId"].as_str().map(BrowsingContextId::new);
    let is_default = aux["isDefault"].as_bool().unwrap_or(true);
    let name = context_description["name"].as_str().unwrap_or_default();

    let realm = Realm {
        id: realm_id,
        context: owning_context,
        origin: context_description["origin"].as_str().unwrap_or_default().to_string(),
        realm_type: RealmType::Window,
        sandbox: (!is_default && !name.is_empty()).then(|| name.to_string()),
        execution_context_id: context_description["id"].as_i64().unwrap_or_default(),
        handles: Vec::new(),
    };

    let info = realm.info();
    engine.realms.insert(realm);
    engine.emit_event(EventData::RealmCreated(info));
}

fn on_execution_context_destroyed(engine: &Engine, event: &CdpEvent) {
    let removed = event.params["executionContextUniqueId"]
        .as_str()
        .and_then(|unique| engine.realms.remove(&RealmId::new(unique)))
        .or_else(|| {
            event.params["executionContextId"]
                .as_i64()
                .and_then(|id| engine.realms.find_by_execution_context(id))
                .and_then(|realm| engine.realms.remove(&realm.id))
        });

    if let Some(realm) = removed {
        engine.emit_event(EventData::RealmDestroyed(RealmDestroyed { realm: realm.id }));
    }
}

fn on_console_api_called(engine: &Engine, event: &CdpEvent) {
    let args: Vec<RemoteValue> = event.params["args"]
        .as_array()
        .map(|args| args.iter().map(cdp_remote_object_to_remote_value).collect())
        .unwrap_or_default();

    let text = match format_console_message(&args) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(error = %e, "Console format fallback");
            None
        }
    };

    let method = event.params["type"].as_str().unwrap_or("log").to_string();
    let level = match method.as_str() {
        "error" | "assert" => "error",
        "warning" => "warn",
        "debug" => "debug",
        _ => "info",
    };

    let realm = event.params["executionContextId"]
        .as_i64()
        .and_then(|id| engine.realms.find_by_execution_context(id));
    let (realm_id, context) = match realm {
        Some(realm) => (realm.id, realm.context),
        None => (RealmId::new("unknown"), session_context(engine, event)),
    };

    engine.emit_event(EventData::LogEntryAdded(LogEntry {
        entry_type: "console".to_string(),
        level: level.to_string(),
        source: LogSource {
            realm: realm_id,
            context,
        },
        text,
        timestamp: get_timing(event.params["timestamp"].as_f64()),
        method: Some(method),
        args: Some(args),
    }));
}

fn on_exception_thrown(engine: &Engine, event: &CdpEvent) {
    let details = &event.params["exceptionDetails"];
    let text = details["exception"]["description"]
        .as_str()
        .or_else(|| details["text"].as_str())
        .unwrap_or("Uncaught exception")
        .to_string();

    let realm = details["executionContextId"]
        .as_i64()
        .and_then(|id| engine.realms.find_by_execution_context(id));
    let (realm_id, context) = match realm {
        Some(realm) => (realm.id, realm.context),
        None => (RealmId::new("unknown"), session_context(engine, event)),
    };

    engine.emit_event(EventData::LogEntryAdded(LogEntry {
        entry_type: "javascript".to_string(),
        level: "error".to_string(),
        source: LogSource {
            realm: realm_id,
            context,
        },
        text: Some(text),
        timestamp: get_timing(event.params["timestamp"].as_f64()),
        method: None,
        args: None,
    }));
}

// ============================================================================
// Network Processors
// ============================================================================

fn headers_from_cdp(headers: &Value) -> Vec<Header> {
    headers
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(name, value)| {
                    Header::from_cdp(name.clone(), value.as_str().unwrap_or_default())
                })
                .collect()
        })
        .unwrap_or_default()
}

fn request_data(request: &NetworkRequest) -> RequestData {
    RequestData {
        request: request.id.clone(),
        url: request.url.clone(),
        method: request.method.clone(),
        headers_size: compute_headers_size(&request.headers),
        headers: request.headers.clone(),
        cookies: Vec::new(),
        body_size: None,
        timings: request.timings.clone(),
    }
}

fn response_data(request: &NetworkRequest) -> ResponseData {
    ResponseData {
        url: request.url.clone(),
        protocol: "http/1.1".to_string(),
        status: request.response_status.unwrap_or(0),
        status_text: String::new(),
        from_cache: false,
        headers_size: compute_headers_size(&request.response_headers),
        headers: request.response_headers.clone(),
        mime_type: String::new(),
        bytes_received: 0,
        body_size: None,
    }
}

fn event_base(
    request: &NetworkRequest,
    blocked: bool,
    intercepts: Option<Vec<crate::identifiers::InterceptId>>,
) -> NetworkEventBase {
    NetworkEventBase {
        context: request.context.clone(),
        is_blocked: blocked,
        navigation: request.navigation.clone(),
        redirect_count: request.redirect_count,
        request: request_data(request),
        timestamp: wall_time_ms(),
        intercepts,
    }
}

fn on_request_will_be_sent(engine: &Engine, event: &CdpEvent) {
    let params = &event.params;
    let Some(request_id) = params["requestId"].as_str() else {
        return;
    };

    let context = params["frameId"].as_str().map(BrowsingContextId::new);
    let navigation = context
        .as_ref()
        .and_then(|c| engine.contexts.current_navigation(c))
        .map(|n| n.id);

    let mut request = NetworkRequest::new(
        NetworkRequestId::new(request_id),
        context,
        navigation,
        params["request"]["url"].as_str().unwrap_or_default(),
        params["request"]["method"].as_str().unwrap_or("GET"),
        headers_from_cdp(&params["request"]["headers"]),
    );
    let wall_time = get_timing(params["wallTime"].as_f64().map(|t| t * 1000.0));
    request.timings = FetchTimingInfo {
        time_origin: wall_time,
        request_time: wall_time,
        fetch_start: wall_time,
        ..FetchTimingInfo::default()
    };

    engine.network.upsert_request(request);

    // With request-stage interception armed, Fetch.requestPaused owns
    // the beforeRequestSent emission.
    if engine.network.has_phase(InterceptPhase::BeforeRequestSent) {
        return;
    }

    let Ok(request) = engine.network.get(&NetworkRequestId::new(request_id)) else {
        return;
    };
    engine.emit_event(EventData::BeforeRequestSent(
        crate::protocol::event::BeforeRequestSent {
            base: event_base(&request, false, None),
            initiator: Initiator {
                initiator_type: params["initiator"]["type"]
                    .as_str()
                    .unwrap_or("other")
                    .to_string(),
                url: params["initiator"]["url"].as_str().map(str::to_string),
            },
        },
    ));
}

fn on_response_received(engine: &Engine, event: &CdpEvent) {
    let params = &event.params;
    let Some(request_id) = params["requestId"].as_str() else {
        return;
    };
    let id = NetworkRequestId::new(request_id);

    let status = params["response"]["status"].as_u64().unwrap_or(0) as u32;
    engine
        .network
        .record_response(&id, status, headers_from_cdp(&params["response"]["headers"]));
    engine.network.advance_phase(&id, RequestPhase::ResponseStarted);

    if engine.network.has_phase(InterceptPhase::ResponseStarted) {
        return;
    }

    let Ok(request) = engine.network.get(&id) else {
        return;
    };
    let mut response = response_data(&request);
    response.status_text = params["response"]["statusText"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    response.mime_type = params["response"]["mimeType"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    response.from_cache = params["response"]["fromDiskCache"].as_bool().unwrap_or(false);

    engine.emit_event(EventData::ResponseStarted(ResponseEvent {
        base: event_base(&request, false, None),
        response,
    }));
}

fn on_loading_finished(engine: &Engine, event: &CdpEvent) {
    let Some(request_id) = event.params["requestId"].as_str() else {
        return;
    };
    let id = NetworkRequestId::new(request_id);
    engine.network.advance_phase(&id, RequestPhase::Completed);

    let Some(request) = engine.network.remove(&id) else {
        return;
    };
    let mut response = response_data(&request);
    response.bytes_received = event.params["encodedDataLength"].as_u64().unwrap_or(0);

    engine.emit_event(EventData::ResponseCompleted(ResponseEvent {
        base: event_base(&request, false, None),
        response,
    }));
}

fn on_loading_failed(engine: &Engine, event: &CdpEvent) {
    let Some(request_id) = event.params["requestId"].as_str() else {
        return;
    };
    let id = NetworkRequestId::new(request_id);
    engine.network.advance_phase(&id, RequestPhase::Failed);

    let Some(request) = engine.network.remove(&id) else {
        return;
    };

    engine.emit_event(EventData::FetchError(FetchError {
        base: event_base(&request, false, None),
        error_text: event.params["errorText"]
            .as_str()
            .unwrap_or("net::ERR_FAILED")
            .to_string(),
    }));
}

/// Releases a paused fetch the registry has no interest in.
async fn auto_continue(
    engine: &Engine,
    session: Option<&CdpSessionId>,
    method: &str,
    fetch_id: &str,
) {
    let _ = engine
        .cdp
        .send_on(session, method, json!({"requestId": fetch_id}))
        .await;
}

/// Answers an unmatched auth challenge with the browser default.
async fn auto_continue_auth(engine: &Engine, session: Option<&CdpSessionId>, fetch_id: &str) {
    let _ = engine
        .cdp
        .send_on(
            session,
            "Fetch.continueWithAuth",
            json!({
                "requestId": fetch_id,
                "authChallengeResponse": {"response": "Default"},
            }),
        )
        .await;
}

async fn on_request_paused(engine: &Engine, event: &CdpEvent) {
    let params = &event.params;
    let Some(fetch_id) = params["requestId"].as_str() else {
        return;
    };
    let session = event.session_id.as_ref();

    // Without a network id the request cannot be tracked; let it go.
    let Some(network_id) = params["networkId"].as_str() else {
        auto_continue(engine, session, "Fetch.continueRequest", fetch_id).await;
        return;
    };
    let id = NetworkRequestId::new(network_id);

    let response_stage = params.get("responseStatusCode").is_some();
    let context = params["frameId"].as_str().map(BrowsingContextId::new);

    // Fetch.requestPaused may beat Network.requestWillBeSent; seed the
    // record from the paused data.
    if engine.network.get(&id).is_err() {
        let navigation = context
            .as_ref()
            .and_then(|c| engine.contexts.current_navigation(c))
            .map(|n| n.id);
        engine.network.upsert_request(NetworkRequest::new(
            id.clone(),
            context.clone(),
            navigation,
            params["request"]["url"].as_str().unwrap_or_default(),
            params["request"]["method"].as_str().unwrap_or("GET"),
            headers_from_cdp(&params["request"]["headers"]),
        ));
    }

    engine.network.note_fetch_id(&id, fetch_id);

    let url = params["request"]["url"].as_str().unwrap_or_default();
    let phase = if response_stage {
        InterceptPhase::ResponseStarted
    } else {
        InterceptPhase::BeforeRequestSent
    };

    let intercepts = matching_intercepts(engine, phase, url, context.as_ref());
    if intercepts.is_empty() {
        let method = if response_stage {
            "Fetch.continueResponse"
        } else {
            "Fetch.continueRequest"
        };
        auto_continue(engine, session, method, fetch_id).await;
        return;
    }

    engine
        .network
        .mark_blocked(&id, fetch_id, intercepts.clone());

    if response_stage {
        let status = params["responseStatusCode"].as_u64().unwrap_or(0) as u32;
        let headers: Vec<Header> = params["responseHeaders"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| {
                        Header::from_cdp(
                            entry["name"].as_str().unwrap_or_default(),
                            entry["value"].as_str().unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        engine.network.record_response(&id, status, headers);
        engine.network.advance_phase(&id, RequestPhase::ResponseStarted);

        let Ok(request) = engine.network.get(&id) else {
            return;
        };
        engine.emit_event(EventData::ResponseStarted(ResponseEvent {
            base: event_base(&request, true, Some(intercepts)),
            response: response_data(&request),
        }));
    } else {
        let Ok(request) = engine.network.get(&id) else {
            return;
        };
        engine.emit_event(EventData::BeforeRequestSent(
            crate::protocol::event::BeforeRequestSent {
                base: event_base(&request, true, Some(intercepts)),
                initiator: Initiator {
                    initiator_type: "other".to_string(),
                    url: None,
                },
            },
        ));
    }
}

async fn on_auth_required(engine: &Engine, event: &CdpEvent) {
    let params = &event.params;
    let Some(fetch_id) = params["requestId"].as_str() else {
        return;
    };

    // `Fetch.authRequired` carries no network id; correlate through the
    // fetch id remembered at the request pause.
    let id = match params["networkId"]
        .as_str()
        .map(NetworkRequestId::new)
        .or_else(|| engine.network.find_by_fetch_id(fetch_id))
    {
        Some(id) => id,
        None => {
            auto_continue_auth(engine, event.session_id.as_ref(), fetch_id).await;
            return;
        }
    };

    let url = params["request"]["url"].as_str().unwrap_or_default();
    let context = engine.network.get(&id).ok().and_then(|r| r.context);

    engine.network.advance_phase(&id, RequestPhase::AuthRequired);

    let intercepts = matching_intercepts(engine, InterceptPhase::AuthRequired, url, context.as_ref());
    if intercepts.is_empty() {
        auto_continue_auth(engine, event.session_id.as_ref(), fetch_id).await;
        return;
    }

    engine
        .network
        .mark_blocked(&id, fetch_id, intercepts.clone());

    let Ok(request) = engine.network.get(&id) else {
        return;
    };
    let mut response = response_data(&request);
    if response.status == 0 {
        response.status = 401;
    }

    engine.emit_event(EventData::AuthRequired(
        crate::protocol::event::AuthRequired {
            base: event_base(&request, true, Some(intercepts)),
            response,
        },
    ));
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

    async fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_target_attach_builds_context() {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        let engine = session.engine_for_tests();

        browser.emit_event(
            "Target.attachedToTarget",
            json!({
                "sessionId": "page-session-1",
                "targetInfo": {
                    "targetId": "TARGET-1",
                    "type": "page",
                    "url": "about:blank",
                },
            }),
            None,
        );

        wait_for(|| engine.contexts.contains(&BrowsingContextId::new("TARGET-1"))).await;
        assert_eq!(
            engine
                .contexts
                .session_of(&BrowsingContextId::new("TARGET-1"))
                .unwrap(),
            CdpSessionId::new("page-session-1")
        );

        // The mapper armed its domains on the new target.
        wait_for(|| !browser.calls_for("Page.enable").is_empty()).await;
        assert!(!browser.calls_for("Runtime.enable").is_empty());
        assert!(!browser.calls_for("Network.enable").is_empty());
    }

    #[tokio::test]
    async fn test_execution_context_lifecycle() {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        let engine = session.engine_for_tests();

        browser.emit_event(
            "Runtime.executionContextCreated",
            json!({"context": {
                "id": 7,
                "uniqueId": "realm-unique-7",
                "origin": "https://example.test",
                "name": "",
                "auxData": {"frameId": "CTX1", "isDefault": true},
            }}),
            Some("s1"),
        );

        wait_for(|| engine.realms.get(&RealmId::new("realm-unique-7")).is_ok()).await;
        let realm = engine.realms.get(&RealmId::new("realm-unique-7")).unwrap();
        assert_eq!(realm.execution_context_id, 7);
        assert!(realm.sandbox.is_none());

        browser.emit_event(
            "Runtime.executionContextDestroyed",
            json!({"executionContextId": 7, "executionContextUniqueId": "realm-unique-7"}),
            Some("s1"),
        );
        wait_for(|| engine.realms.get(&RealmId::new("realm-unique-7")).is_err()).await;
    }

    #[tokio::test]
    async fn test_request_lifecycle_without_intercepts() {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        let engine = session.engine_for_tests();

        browser.emit_event(
            "Network.requestWillBeSent",
            json!({
                "requestId": "r-1",
                "request": {"url": "https://a/", "method": "GET", "headers": {"Accept": "*/*"}},
                "wallTime": 1700000000.5,
            }),
            Some("s1"),
        );
        wait_for(|| engine.network.get(&NetworkRequestId::new("r-1")).is_ok()).await;

        let request = engine.network.get(&NetworkRequestId::new("r-1")).unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.headers.len(), 1);
        assert!(request.timings.request_time > 0);

        browser.emit_event(
            "Network.loadingFinished",
            json!({"requestId": "r-1", "encodedDataLength": 120}),
            Some("s1"),
        );
        wait_for(|| engine.network.get(&NetworkRequestId::new("r-1")).is_err()).await;
    }

    #[tokio::test]
    async fn test_request_paused_auto_continues_unmatched() {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        let engine = session.engine_for_tests();

        // Register an intercept that does NOT match the paused URL.
        engine.network.add_intercept(
            vec![InterceptPhase::BeforeRequestSent],
            Some(vec![crate::protocol::network::UrlPattern::String {
                pattern: "https://matched.test/".to_string(),
            }]),
            None,
        );

        browser.emit_event(
            "Fetch.requestPaused",
            json!({
                "requestId": "fetch-1",
                "networkId": "r-2",
                "request": {"url": "https://other.test/", "method": "GET", "headers": {}},
            }),
            Some("s1"),
        );

        wait_for(|| !browser.calls_for("Fetch.continueRequest").is_empty()).await;
        let request = engine.network.get(&NetworkRequestId::new("r-2")).unwrap();
        assert!(!request.blocked);
    }

    #[tokio::test]
    async fn test_request_paused_blocks_matched() {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        let engine = session.engine_for_tests();

        engine.network.add_intercept(
            vec![InterceptPhase::BeforeRequestSent],
            Some(vec![crate::protocol::network::UrlPattern::String {
                pattern: "https://a/".to_string(),
            }]),
            None,
        );

        browser.emit_event(
            "Fetch.requestPaused",
            json!({
                "requestId": "fetch-2",
                "networkId": "r-3",
                "request": {"url": "https://a/", "method": "GET", "headers": {}},
            }),
            Some("s1"),
        );

        wait_for(|| {
            engine
                .network
                .get(&NetworkRequestId::new("r-3"))
                .is_ok_and(|r| r.blocked)
        })
        .await;
        assert!(browser.calls_for("Fetch.continueRequest").is_empty());
    }
}
