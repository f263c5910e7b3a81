//! End-to-end scenarios over the in-memory browser double.
//!
//! Each test drives full command/event flows through a live
//! `MapperSession`: client frames in, wire frames out, browser traffic
//! injected through the mock.

mod common;

use serde_json::json;

use common::Harness;

// ============================================================================
// Subscribe + Navigate
// ============================================================================

#[tokio::test]
async fn subscribe_then_navigate_delivers_load_before_response() {
    let mut harness = Harness::start().await;
    harness.attach_page("CTX1", "s1").await;

    harness.send(r#"{"id":1,"method":"session.subscribe","params":{"events":["browsingContext.load"]}}"#);
    let response = harness.next_frame().await;
    assert_eq!(response["type"], "success");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"], json!({}));

    harness.send(
        r#"{"id":2,"method":"browsingContext.navigate","params":{"context":"CTX1","url":"https://example.test/","wait":"complete"}}"#,
    );

    // Let the browser finish the navigation once the CDP call lands.
    harness.wait_calls("Page.navigate", 1).await;
    harness.browser.emit_event(
        "Page.frameNavigated",
        json!({"frame": {"id": "CTX1", "url": "https://example.test/"}}),
        Some("s1"),
    );
    harness
        .browser
        .emit_event("Page.loadEventFired", json!({"timestamp": 1.0}), Some("s1"));

    let event = harness.next_frame().await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["method"], "browsingContext.load");
    assert_eq!(event["params"]["context"], "CTX1");
    assert_eq!(event["params"]["url"], "https://example.test/");

    let response = harness.next_frame().await;
    assert_eq!(response["type"], "success");
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"]["url"], "https://example.test/");
    assert!(response["result"]["navigation"].is_string());
}

#[tokio::test]
async fn module_subscription_sees_navigation_started() {
    let mut harness = Harness::start().await;
    harness.attach_page("CTX1", "s1").await;

    harness
        .send(r#"{"id":1,"method":"session.subscribe","params":{"events":["browsingContext"]}}"#);
    assert_eq!(harness.next_frame().await["type"], "success");

    harness.send(
        r#"{"id":2,"method":"browsingContext.navigate","params":{"context":"CTX1","url":"https://example.test/"}}"#,
    );

    let event = harness.next_frame().await;
    assert_eq!(event["method"], "browsingContext.navigationStarted");
    assert_eq!(event["params"]["context"], "CTX1");
    assert!(event["params"]["navigation"].is_string());

    let response = harness.next_frame().await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["type"], "success");
}

#[tokio::test]
async fn superseding_navigation_aborts_the_pending_one() {
    let mut harness = Harness::start().await;
    harness.attach_page("CTX1", "s1").await;

    harness
        .send(r#"{"id":1,"method":"session.subscribe","params":{"events":["browsingContext"]}}"#);
    assert_eq!(harness.next_frame().await["type"], "success");

    harness.send(
        r#"{"id":2,"method":"browsingContext.navigate","params":{"context":"CTX1","url":"https://a.test/"}}"#,
    );
    let started_a = harness.next_frame().await;
    assert_eq!(started_a["method"], "browsingContext.navigationStarted");
    let first_navigation = started_a["params"]["navigation"].clone();
    assert_eq!(harness.next_frame().await["id"], 2);

    harness.send(
        r#"{"id":3,"method":"browsingContext.navigate","params":{"context":"CTX1","url":"https://b.test/"}}"#,
    );

    // The old pending navigation aborts before the new one starts.
    let aborted = harness.next_frame().await;
    assert_eq!(aborted["method"], "browsingContext.navigationAborted");
    assert_eq!(aborted["params"]["navigation"], first_navigation);

    let started_b = harness.next_frame().await;
    assert_eq!(started_b["method"], "browsingContext.navigationStarted");
    assert_ne!(started_b["params"]["navigation"], first_navigation);
}

// ============================================================================
// Network Interception
// ============================================================================

#[tokio::test]
async fn intercept_blocks_then_continue_resolves_once() {
    let mut harness = Harness::start().await;
    harness.attach_page("CTX1", "s1").await;

    harness.send(r#"{"id":1,"method":"session.subscribe","params":{"events":["network"]}}"#);
    assert_eq!(harness.next_frame().await["type"], "success");

    harness.send(
        r#"{"id":2,"method":"network.addIntercept","params":{"phases":["beforeRequestSent"],"urlPatterns":[{"type":"string","pattern":"https://a/"}]}}"#,
    );
    let response = harness.next_frame().await;
    assert_eq!(response["type"], "success");
    let intercept = response["result"]["intercept"].as_str().unwrap().to_string();

    harness.wait_calls("Fetch.enable", 1).await;

    // The browser pauses the matching request.
    harness.browser.emit_event(
        "Fetch.requestPaused",
        json!({
            "requestId": "fetch-1",
            "networkId": "REQ1",
            "frameId": "CTX1",
            "request": {"url": "https://a/", "method": "GET", "headers": {}},
        }),
        Some("s1"),
    );

    let event = harness.next_frame().await;
    assert_eq!(event["method"], "network.beforeRequestSent");
    assert_eq!(event["params"]["isBlocked"], true);
    assert_eq!(event["params"]["intercepts"], json!([intercept]));
    assert_eq!(event["params"]["request"]["request"], "REQ1");

    harness.send(r#"{"id":3,"method":"network.continueRequest","params":{"request":"REQ1"}}"#);
    let response = harness.next_frame().await;
    assert_eq!(response["id"], 3);
    assert_eq!(response["type"], "success");
    harness.wait_calls("Fetch.continueRequest", 1).await;

    // A second resolution of the same request is rejected.
    harness.send(r#"{"id":4,"method":"network.continueRequest","params":{"request":"REQ1"}}"#);
    let response = harness.next_frame().await;
    assert_eq!(response["id"], 4);
    assert_eq!(response["error"], "invalid argument");

    // Response flows through normally afterwards.
    harness.browser.emit_event(
        "Network.responseReceived",
        json!({
            "requestId": "REQ1",
            "response": {
                "url": "https://a/",
                "status": 200,
                "statusText": "OK",
                "headers": {"Content-Type": "text/html"},
                "mimeType": "text/html",
            },
        }),
        Some("s1"),
    );
    harness.browser.emit_event(
        "Network.loadingFinished",
        json!({"requestId": "REQ1", "encodedDataLength": 512}),
        Some("s1"),
    );

    let started = harness.next_frame().await;
    assert_eq!(started["method"], "network.responseStarted");
    assert_eq!(started["params"]["response"]["status"], 200);

    let completed = harness.next_frame().await;
    assert_eq!(completed["method"], "network.responseCompleted");
    assert_eq!(completed["params"]["request"]["request"], "REQ1");
}

#[tokio::test]
async fn provide_response_for_unknown_request_fails() {
    let mut harness = Harness::start().await;

    harness.send(
        r#"{"id":1,"method":"network.provideResponse","params":{"request":"_UNKNOWN_"}}"#,
    );
    let response = harness.next_frame().await;
    assert_eq!(response["error"], "no such request");
    assert_eq!(
        response["message"],
        "Network request with ID '_UNKNOWN_' doesn't exist"
    );
}

// ============================================================================
// Unsubscribe Atomicity
// ============================================================================

#[tokio::test]
async fn failing_unsubscribe_leaves_subscription_intact() {
    let mut harness = Harness::start().await;
    harness.attach_page("CTX1", "s1").await;

    harness.send(
        r#"{"id":1,"method":"session.subscribe","params":{"events":["browsingContext.load"],"contexts":["CTX1"]}}"#,
    );
    assert_eq!(harness.next_frame().await["type"], "success");

    // One valid pair, one missing pair: nothing may be removed.
    harness.send(
        r#"{"id":2,"method":"session.unsubscribe","params":{"events":["browsingContext.load","browsingContext.domContentLoaded"],"contexts":["CTX1"]}}"#,
    );
    let response = harness.next_frame().await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["error"], "invalid argument");

    // The surviving subscription still removes cleanly.
    harness.send(
        r#"{"id":3,"method":"session.unsubscribe","params":{"events":["browsingContext.load"],"contexts":["CTX1"]}}"#,
    );
    let response = harness.next_frame().await;
    assert_eq!(response["id"], 3);
    assert_eq!(response["type"], "success");
}

// ============================================================================
// Cascading Destroy
// ============================================================================

#[tokio::test]
async fn closing_a_tree_destroys_in_post_order() {
    let mut harness = Harness::start().await;
    harness.attach_page("TOP", "s-top").await;

    harness
        .send(r#"{"id":1,"method":"session.subscribe","params":{"events":["browsingContext"]}}"#);
    assert_eq!(harness.next_frame().await["type"], "success");

    // Build: TOP ── F1 ── F1a, TOP ── F2. Each attach echoes a
    // contextCreated event, which doubles as synchronization.
    harness.attach_frame("F1", "TOP", "s-top");
    assert_eq!(
        harness.next_frame().await["params"]["context"],
        "F1"
    );
    harness.attach_frame("F2", "TOP", "s-top");
    assert_eq!(
        harness.next_frame().await["params"]["context"],
        "F2"
    );
    harness.attach_frame("F1a", "F1", "s-top");
    assert_eq!(
        harness.next_frame().await["params"]["context"],
        "F1a"
    );

    harness.send(r#"{"id":2,"method":"browsingContext.close","params":{"context":"TOP"}}"#);

    let mut destroyed = Vec::new();
    for _ in 0..4 {
        let event = harness.next_frame().await;
        assert_eq!(event["method"], "browsingContext.contextDestroyed");
        destroyed.push(event["params"]["context"].as_str().unwrap().to_string());
    }
    assert_eq!(destroyed, vec!["F1a", "F1", "F2", "TOP"]);

    let response = harness.next_frame().await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["type"], "success");
}

// ============================================================================
// User Prompts
// ============================================================================

#[tokio::test]
async fn accept_behavior_auto_handles_prompts() {
    let config = bidi_mapper::MapperConfig {
        unhandled_prompt_behavior: bidi_mapper::UnhandledPromptBehavior::Accept,
        ..bidi_mapper::MapperConfig::default()
    };
    let mut harness = Harness::start_with(config).await;
    harness.attach_page("CTX1", "s1").await;

    harness
        .send(r#"{"id":1,"method":"session.subscribe","params":{"events":["browsingContext"]}}"#);
    assert_eq!(harness.next_frame().await["type"], "success");

    harness.browser.emit_event(
        "Page.javascriptDialogOpening",
        json!({"type": "confirm", "message": "Proceed?", "url": "https://example.test/"}),
        Some("s1"),
    );

    let event = harness.next_frame().await;
    assert_eq!(event["method"], "browsingContext.userPromptOpened");
    assert_eq!(event["params"]["type"], "confirm");
    assert_eq!(event["params"]["message"], "Proceed?");

    harness.wait_calls("Page.handleJavaScriptDialog", 1).await;
    let calls = harness.browser.calls_for("Page.handleJavaScriptDialog");
    assert_eq!(calls[0].params["accept"], true);
}

// ============================================================================
// Log Events
// ============================================================================

#[tokio::test]
async fn console_call_becomes_log_entry() {
    let mut harness = Harness::start().await;
    harness.attach_page("CTX1", "s1").await;

    harness.send(r#"{"id":1,"method":"session.subscribe","params":{"events":["log.entryAdded"]}}"#);
    assert_eq!(harness.next_frame().await["type"], "success");

    harness.browser.emit_event(
        "Runtime.executionContextCreated",
        json!({"context": {
            "id": 3,
            "uniqueId": "realm-3",
            "origin": "https://example.test",
            "name": "",
            "auxData": {"frameId": "CTX1", "isDefault": true},
        }}),
        Some("s1"),
    );

    harness.browser.emit_event(
        "Runtime.consoleAPICalled",
        json!({
            "type": "log",
            "executionContextId": 3,
            "timestamp": 1700000000000.0,
            "args": [
                {"type": "string", "value": "%d %s"},
                {"type": "number", "value": 42},
                {"type": "string", "value": "x"},
            ],
        }),
        Some("s1"),
    );

    let event = harness.next_frame().await;
    assert_eq!(event["method"], "log.entryAdded");
    assert_eq!(event["params"]["type"], "console");
    assert_eq!(event["params"]["text"], "42 x");
    assert_eq!(event["params"]["source"]["realm"], "realm-3");
    assert_eq!(event["params"]["source"]["context"], "CTX1");
}
