//! Script commands: evaluation, realms, preload scripts.
//!
//! Evaluation targets resolve to a realm first: a realm target looks up
//! the realm directly, a context target picks the default window realm
//! or creates the named sandbox world on demand. Results come back as
//! CDP deep-serialized values and convert into the BiDi
//! [`RemoteValue`] tree.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identifiers::RealmId;
use crate::mapper::Engine;
use crate::protocol::command::{
    AddPreloadScriptParams, AddPreloadScriptResult, CallFunctionParams, DisownParams,
    EvaluateParams, GetRealmsParams, RealmType, RemovePreloadScriptParams,
};
use crate::protocol::remote_value::{
    EvaluateResult, ExceptionDetails, LocalKey, LocalValue, RemoteKey, RemoteValue,
    ResultOwnership, Target,
};
use crate::store::realm::Realm;

// ============================================================================
// Target Resolution
// ============================================================================

/// Resolves an evaluation target to a realm.
///
/// A missing sandbox realm is created through
/// `Page.createIsolatedWorld` and registered on the spot.
async fn resolve_target(engine: &Engine, target: &Target) -> Result<Realm> {
    match target {
        Target::Realm { realm } => engine.realms.get(realm),
        Target::Context { context, sandbox } => {
            engine.contexts.expect(context)?;

            if let Some(realm) = engine
                .realms
                .find_window_realm(context, sandbox.as_deref())
            {
                return Ok(realm);
            }

            let Some(sandbox) = sandbox else {
                return Err(Error::unknown(format!(
                    "Context '{context}' has no default realm yet"
                )));
            };

            let session = engine.contexts.session_of(context)?;
            let result = engine
                .cdp
                .send_on(
                    Some(&session),
                    "Page.createIsolatedWorld",
                    json!({
                        "frameId": context.as_str(),
                        "worldName": sandbox,
                    }),
                )
                .await?;
            let execution_context_id = result["executionContextId"].as_i64().ok_or_else(|| {
                Error::unknown("Page.createIsolatedWorld returned no executionContextId")
            })?;

            let realm = Realm {
                id: RealmId::new(Uuid::new_v4().to_string()),
                context: Some(context.clone()),
                origin: String::new(),
                realm_type: RealmType::Window,
                sandbox: Some(sandbox.clone()),
                execution_context_id,
                handles: Vec::new(),
            };
            engine.realms.insert(realm.clone());
            debug!(realm = %realm.id, sandbox = %sandbox, "Sandbox realm created");
            Ok(realm)
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// `script.evaluate`
pub async fn evaluate(engine: &Engine, params: EvaluateParams) -> Result<Value> {
    let realm = resolve_target(engine, &params.target).await?;
    let session = realm_session(engine, &realm)?;

    let response = engine
        .cdp
        .send_on(
            session.as_ref(),
            "Runtime.evaluate",
            json!({
                "expression": params.expression,
                "contextId": realm.execution_context_id,
                "awaitPromise": params.await_promise,
                "userGesture": params.user_activation,
                "serializationOptions": {"serialization": "deep"},
            }),
        )
        .await?;

    finish_evaluation(engine, &realm, response, params.result_ownership)
}

/// `script.callFunction`
pub async fn call_function(engine: &Engine, params: CallFunctionParams) -> Result<Value> {
    let realm = resolve_target(engine, &params.target).await?;
    let session = realm_session(engine, &realm)?;

    let arguments: Vec<Value> = params
        .arguments
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(local_value_to_cdp)
        .collect();

    let mut cdp_params = json!({
        "functionDeclaration": params.function_declaration,
        "executionContextId": realm.execution_context_id,
        "arguments": arguments,
        "awaitPromise": params.await_promise,
        "userGesture": params.user_activation,
        "serializationOptions": {"serialization": "deep"},
    });
    if let Some(this) = &params.this {
        // `this` rides as the first bound argument of a wrapper call.
        cdp_params["functionDeclaration"] = Value::from(format!(
            "function (__this, ...__args) {{ return ({}).apply(__this, __args); }}",
            params.function_declaration
        ));
        let mut bound = vec![local_value_to_cdp(this)];
        bound.extend(arguments_from(&cdp_params));
        cdp_params["arguments"] = Value::Array(bound);
    }

    let response = engine
        .cdp
        .send_on(session.as_ref(), "Runtime.callFunctionOn", cdp_params)
        .await?;

    finish_evaluation(engine, &realm, response, params.result_ownership)
}

fn arguments_from(cdp_params: &Value) -> Vec<Value> {
    cdp_params["arguments"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

/// Converts the CDP evaluation response into a BiDi `EvaluateResult`.
fn finish_evaluation(
    engine: &Engine,
    realm: &Realm,
    response: Value,
    ownership: ResultOwnership,
) -> Result<Value> {
    if let Some(exception_details) = response.get("exceptionDetails") {
        let exception = exception_details
            .get("exception")
            .map(cdp_remote_object_to_remote_value)
            .unwrap_or(RemoteValue::Undefined);
        let result = EvaluateResult::Exception {
            exception_details: ExceptionDetails {
                text: exception_details["text"]
                    .as_str()
                    .unwrap_or("uncaught exception")
                    .to_string(),
                column_number: exception_details["columnNumber"].as_u64().unwrap_or(0) as u32,
                line_number: exception_details["lineNumber"].as_u64().unwrap_or(0) as u32,
                exception,
            },
            realm: realm.id.clone(),
        };
        return Ok(serde_json::to_value(result).map_err(|e| Error::unknown(e.to_string()))?);
    }

    let remote_object = &response["result"];
    let mut value = cdp_remote_object_to_remote_value(remote_object);

    if ownership == ResultOwnership::Root
        && let Some(object_id) = remote_object["objectId"].as_str()
    {
        value = with_handle(value, object_id);
        engine.realms.add_handle(&realm.id, object_id);
    }

    let result = EvaluateResult::Success {
        result: value,
        realm: realm.id.clone(),
    };
    Ok(serde_json::to_value(result).map_err(|e| Error::unknown(e.to_string()))?)
}

/// `script.disown`
pub async fn disown(engine: &Engine, params: DisownParams) -> Result<Value> {
    let realm = resolve_target(engine, &params.target).await?;
    let session = realm_session(engine, &realm)?;

    for handle in &params.handles {
        // Unknown handles are silently skipped.
        if engine.realms.remove_handle(&realm.id, handle) {
            let _ = engine
                .cdp
                .send_on(
                    session.as_ref(),
                    "Runtime.releaseObject",
                    json!({"objectId": handle}),
                )
                .await;
        }
    }

    Ok(json!({}))
}

/// `script.getRealms`
pub fn get_realms(engine: &Engine, params: GetRealmsParams) -> Result<Value> {
    if let Some(context) = &params.context {
        engine.contexts.expect(context)?;
    }
    let realms = engine
        .realms
        .list(params.context.as_ref(), params.realm_type);
    Ok(json!({"realms": realms}))
}

// ============================================================================
// Preload Scripts
// ============================================================================

/// `script.addPreloadScript`
pub async fn add_preload_script(engine: &Engine, params: AddPreloadScriptParams) -> Result<Value> {
    if let Some(contexts) = &params.contexts {
        for context in contexts {
            if !engine.contexts.is_top_level(context)? {
                return Err(Error::invalid_argument(format!(
                    "Preload script contexts must be top-level, '{context}' is not"
                )));
            }
        }
    }
    if let Some(user_contexts) = &params.user_contexts {
        for user_context in user_contexts {
            engine.user_contexts.expect(user_context)?;
        }
    }

    let script = engine.preload.insert(
        params.function_declaration.clone(),
        params.contexts,
        params.user_contexts,
        params.sandbox.clone(),
    );

    // Install into every live matching target so future documents (and
    // their realms) run the script before page code.
    let source = format!("({})();", params.function_declaration);
    for context in engine.contexts.top_level_contexts() {
        let user_context = engine.contexts.user_context_of(&context)?;
        let registration = engine.preload.matching(&context, &user_context);
        if !registration.iter().any(|s| s.id == script) {
            continue;
        }

        let session = engine.contexts.session_of(&context)?;
        let mut cdp_params = json!({"source": source});
        if let Some(sandbox) = &params.sandbox {
            cdp_params["worldName"] = Value::from(sandbox.as_str());
        }
        let result = engine
            .cdp
            .send_on(
                Some(&session),
                "Page.addScriptToEvaluateOnNewDocument",
                cdp_params,
            )
            .await?;
        if let Some(identifier) = result["identifier"].as_str() {
            engine
                .preload
                .record_cdp_id(&script, context.clone(), identifier);
        }
    }

    Ok(serde_json::to_value(AddPreloadScriptResult { script }).map_err(|e| Error::unknown(e.to_string()))?)
}

/// `script.removePreloadScript`
pub async fn remove_preload_script(
    engine: &Engine,
    params: RemovePreloadScriptParams,
) -> Result<Value> {
    let script = engine.preload.remove(&params.script)?;

    for (context, cdp_id) in &script.cdp_ids {
        // A context gone since installation is fine to skip.
        let Ok(session) = engine.contexts.session_of(context) else {
            continue;
        };
        let _ = engine
            .cdp
            .send_on(
                Some(&session),
                "Page.removeScriptToEvaluateOnNewDocument",
                json!({"identifier": cdp_id}),
            )
            .await;
    }

    Ok(json!({}))
}

// ============================================================================
// Value Conversions
// ============================================================================

fn realm_session(
    engine: &Engine,
    realm: &Realm,
) -> Result<Option<crate::identifiers::CdpSessionId>> {
    match &realm.context {
        Some(context) => Ok(Some(engine.contexts.session_of(context)?)),
        None => Ok(None),
    }
}

fn with_handle(value: RemoteValue, object_id: &str) -> RemoteValue {
    let handle = Some(object_id.to_string());
    match value {
        RemoteValue::Array { value, .. } => RemoteValue::Array { value, handle },
        RemoteValue::Object { value, .. } => RemoteValue::Object { value, handle },
        RemoteValue::Map { value, .. } => RemoteValue::Map { value, handle },
        RemoteValue::Set { value, .. } => RemoteValue::Set { value, handle },
        RemoteValue::Function { .. } => RemoteValue::Function { handle },
        RemoteValue::Promise { .. } => RemoteValue::Promise { handle },
        primitive => primitive,
    }
}

/// Converts a BiDi local value into a CDP call argument.
fn local_value_to_cdp(value: &LocalValue) -> Value {
    match value {
        LocalValue::Undefined => json!({"unserializableValue": "undefined"}),
        LocalValue::Null => json!({"value": null}),
        LocalValue::String { value } => json!({"value": value}),
        LocalValue::Boolean { value } => json!({"value": value}),
        LocalValue::Number { value } => match value {
            Value::String(sentinel) => json!({"unserializableValue": sentinel}),
            other => json!({"value": other}),
        },
        LocalValue::Bigint { value } => json!({"unserializableValue": format!("{value}n")}),
        LocalValue::Date { value } => json!({"value": value}),
        LocalValue::Regexp { value } => json!({"value": {
            "pattern": value.pattern,
            "flags": value.flags,
        }}),
        LocalValue::Array { value } | LocalValue::Set { value } => {
            let items: Vec<Value> = value.iter().map(local_value_plain).collect();
            json!({"value": items})
        }
        LocalValue::Object { value } | LocalValue::Map { value } => {
            let mut object = serde_json::Map::new();
            for (key, entry) in value {
                object.insert(local_key_string(key), local_value_plain(entry));
            }
            json!({"value": object})
        }
    }
}

fn local_key_string(key: &LocalKey) -> String {
    match key {
        LocalKey::String(key) => key.clone(),
        LocalKey::Value(value) => match value.as_ref() {
            LocalValue::String { value } => value.clone(),
            other => format!("{other:?}"),
        },
    }
}

/// Flattens nested local values to plain JSON for compound arguments.
fn local_value_plain(value: &LocalValue) -> Value {
    match value {
        LocalValue::Undefined | LocalValue::Null => Value::Null,
        LocalValue::String { value } => Value::from(value.clone()),
        LocalValue::Boolean { value } => Value::from(*value),
        LocalValue::Number { value } => value.clone(),
        LocalValue::Bigint { value } | LocalValue::Date { value } => Value::from(value.clone()),
        LocalValue::Regexp { value } => json!({"pattern": value.pattern, "flags": value.flags}),
        LocalValue::Array { value } | LocalValue::Set { value } => {
            Value::Array(value.iter().map(local_value_plain).collect())
        }
        LocalValue::Object { value } | LocalValue::Map { value } => {
            let mut object = serde_json::Map::new();
            for (key, entry) in value {
                object.insert(local_key_string(key), local_value_plain(entry));
            }
            Value::Object(object)
        }
    }
}

/// Converts a CDP remote object (preferring its deep-serialized form)
/// into a BiDi remote value.
pub(crate) fn cdp_remote_object_to_remote_value(remote_object: &Value) -> RemoteValue {
    if let Some(deep) = remote_object.get("deepSerializedValue") {
        return cdp_deep_to_remote_value(deep);
    }
    cdp_deep_to_remote_value(remote_object)
}

fn cdp_deep_to_remote_value(deep: &Value) -> RemoteValue {
    let value_type = deep["type"].as_str().unwrap_or("undefined");
    let value = deep.get("value");

    match value_type {
        "undefined" => RemoteValue::Undefined,
        "null" => RemoteValue::Null,
        "string" => RemoteValue::String {
            value: value.and_then(Value::as_str).unwrap_or_default().to_string(),
        },
        "boolean" => RemoteValue::Boolean {
            value: value.and_then(Value::as_bool).unwrap_or_default(),
        },
        "number" => RemoteValue::Number {
            value: value.cloned().unwrap_or(Value::from(0)),
        },
        "bigint" => RemoteValue::Bigint {
            value: value.and_then(Value::as_str).unwrap_or_default().to_string(),
        },
        "array" | "nodelist" | "htmlcollection" => RemoteValue::Array {
            value: value.and_then(Value::as_array).map(|items| {
                items.iter().map(cdp_deep_to_remote_value).collect()
            }),
            handle: None,
        },
        "set" => RemoteValue::Set {
            value: value.and_then(Value::as_array).map(|items| {
                items.iter().map(cdp_deep_to_remote_value).collect()
            }),
            handle: None,
        },
        "object" => RemoteValue::Object {
            value: value.and_then(Value::as_array).map(|v| deep_entries(v)),
            handle: None,
        },
        "map" => RemoteValue::Map {
            value: value.and_then(Value::as_array).map(|v| deep_entries(v)),
            handle: None,
        },
        "date" => RemoteValue::Date {
            value: value.and_then(Value::as_str).unwrap_or_default().to_string(),
        },
        "regexp" => RemoteValue::Regexp {
            value: crate::protocol::remote_value::RegExpValue {
                pattern: value
                    .and_then(|v| v["pattern"].as_str())
                    .unwrap_or_default()
                    .to_string(),
                flags: value
                    .and_then(|v| v["flags"].as_str())
                    .map(str::to_string),
            },
        },
        "function" => RemoteValue::Function { handle: None },
        "promise" => RemoteValue::Promise { handle: None },
        _ => RemoteValue::Undefined,
    }
}

fn deep_entries(entries: &[Value]) -> Vec<(RemoteKey, RemoteValue)> {
    entries
        .iter()
        .filter_map(|entry| {
            let pair = entry.as_array()?;
            let key = match pair.first()? {
                Value::String(key) => RemoteKey::String(key.clone()),
                other => RemoteKey::Value(Box::new(cdp_deep_to_remote_value(other))),
            };
            Some((key, cdp_deep_to_remote_value(pair.get(1)?)))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockBrowser;
    use crate::config::MapperConfig;
    use crate::identifiers::{BrowsingContextId, CdpSessionId, PreloadScriptId, UserContextId};
    use crate::mapper::MapperSession;

    async fn session_with_realm() -> (MockBrowser, std::sync::Arc<MapperSession>) {
        let (browser, pipe) = MockBrowser::new();
        let (session, _outgoing) = MapperSession::connect(MapperConfig::default(), pipe)
            .await
            .expect("connect");
        let engine = session.engine_for_tests();
        engine.contexts.insert_top_level(
            BrowsingContextId::new("CTX1"),
            UserContextId::default_context(),
            Some(CdpSessionId::new("s1")),
            "https://start.test/",
        );
        engine.realms.insert(Realm {
            id: RealmId::new("realm-1"),
            context: Some(BrowsingContextId::new("CTX1")),
            origin: "https://start.test".to_string(),
            realm_type: RealmType::Window,
            sandbox: None,
            execution_context_id: 1,
            handles: Vec::new(),
        });
        (browser, session)
    }

    fn evaluate_params(expression: &str) -> EvaluateParams {
        EvaluateParams {
            expression: expression.to_string(),
            target: Target::Context {
                context: BrowsingContextId::new("CTX1"),
                sandbox: None,
            },
            await_promise: false,
            result_ownership: ResultOwnership::None,
            user_activation: false,
        }
    }

    #[tokio::test]
    async fn test_evaluate_success() {
        let (browser, session) = session_with_realm().await;
        browser.respond_with(
            "Runtime.evaluate",
            json!({"result": {"type": "number", "deepSerializedValue": {"type": "number", "value": 3}}}),
        );

        let result = evaluate(session.engine_for_tests(), evaluate_params("1 + 2"))
            .await
            .expect("evaluate");

        assert_eq!(result["type"], "success");
        assert_eq!(result["result"]["type"], "number");
        assert_eq!(result["result"]["value"], 3);
        assert_eq!(result["realm"], "realm-1");
    }

    #[tokio::test]
    async fn test_evaluate_exception() {
        let (browser, session) = session_with_realm().await;
        browser.respond_with(
            "Runtime.evaluate",
            json!({
                "result": {"type": "object"},
                "exceptionDetails": {
                    "text": "Uncaught",
                    "lineNumber": 2,
                    "columnNumber": 5,
                    "exception": {"type": "object", "deepSerializedValue": {"type": "object"}},
                },
            }),
        );

        let result = evaluate(session.engine_for_tests(), evaluate_params("throw 1"))
            .await
            .expect("evaluate");
        assert_eq!(result["type"], "exception");
        assert_eq!(result["exceptionDetails"]["lineNumber"], 2);
    }

    #[tokio::test]
    async fn test_evaluate_root_ownership_records_handle() {
        let (browser, session) = session_with_realm().await;
        browser.respond_with(
            "Runtime.evaluate",
            json!({"result": {
                "type": "object",
                "objectId": "obj-9",
                "deepSerializedValue": {"type": "object"},
            }}),
        );

        let mut params = evaluate_params("({})");
        params.result_ownership = ResultOwnership::Root;
        let result = evaluate(session.engine_for_tests(), params)
            .await
            .expect("evaluate");
        assert_eq!(result["result"]["handle"], "obj-9");

        // Disown releases it.
        disown(
            session.engine_for_tests(),
            DisownParams {
                handles: vec!["obj-9".to_string()],
                target: Target::Realm {
                    realm: RealmId::new("realm-1"),
                },
            },
        )
        .await
        .expect("disown");
        assert_eq!(browser.calls_for("Runtime.releaseObject").len(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_sandbox_creates_world() {
        let (browser, session) = session_with_realm().await;
        let mut params = evaluate_params("1");
        params.target = Target::Context {
            context: BrowsingContextId::new("CTX1"),
            sandbox: Some("probe".to_string()),
        };

        evaluate(session.engine_for_tests(), params)
            .await
            .expect("evaluate");
        assert_eq!(browser.calls_for("Page.createIsolatedWorld").len(), 1);

        // The sandbox realm is now registered.
        assert!(
            session
                .engine_for_tests()
                .realms
                .find_window_realm(&BrowsingContextId::new("CTX1"), Some("probe"))
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_add_preload_script_installs() {
        let (browser, session) = session_with_realm().await;
        let result = add_preload_script(
            session.engine_for_tests(),
            AddPreloadScriptParams {
                function_declaration: "() => { window.__flag = true; }".to_string(),
                contexts: None,
                user_contexts: None,
                sandbox: None,
            },
        )
        .await
        .expect("add");

        assert!(result["script"].is_string());
        let installs = browser.calls_for("Page.addScriptToEvaluateOnNewDocument");
        assert_eq!(installs.len(), 1);
        assert!(
            installs[0].params["source"]
                .as_str()
                .unwrap()
                .contains("__flag")
        );

        let script = PreloadScriptId::new(result["script"].as_str().unwrap());
        remove_preload_script(
            session.engine_for_tests(),
            RemovePreloadScriptParams { script },
        )
        .await
        .expect("remove");
        assert_eq!(
            browser
                .calls_for("Page.removeScriptToEvaluateOnNewDocument")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_remove_unknown_preload_script() {
        let (_browser, session) = session_with_realm().await;
        let err = remove_preload_script(
            session.engine_for_tests(),
            RemovePreloadScriptParams {
                script: PreloadScriptId::new("ghost"),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "no such script");
    }

    #[test]
    fn test_deep_value_conversion() {
        let deep = json!({
            "type": "array",
            "value": [
                {"type": "string", "value": "x"},
                {"type": "number", "value": "NaN"},
            ],
        });
        let converted = cdp_deep_to_remote_value(&deep);
        match converted {
            RemoteValue::Array { value: Some(items), .. } => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], RemoteValue::String { value } if value == "x"));
                assert!(matches!(&items[1], RemoteValue::Number { .. }));
            }
            other => panic!("unexpected conversion: {other:?}"),
        }
    }

    #[test]
    fn test_local_value_sentinels() {
        let arg = local_value_to_cdp(&LocalValue::Number {
            value: Value::from("NaN"),
        });
        assert_eq!(arg["unserializableValue"], "NaN");

        let arg = local_value_to_cdp(&LocalValue::Undefined);
        assert_eq!(arg["unserializableValue"], "undefined");

        let arg = local_value_to_cdp(&LocalValue::String {
            value: "x".to_string(),
        });
        assert_eq!(arg["value"], "x");
    }
}
