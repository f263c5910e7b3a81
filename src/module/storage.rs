//! Storage commands: cookies.
//!
//! Cookie operations resolve their partition to a CDP browser context
//! (via the owning user context) and go through the `Storage` domain.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::error::Result;
use crate::identifiers::UserContextId;
use crate::mapper::Engine;
use crate::protocol::command::{
    CookieFilter, GetCookiesParams, PartitionDescriptor, SetCookieParams,
};
use crate::protocol::network::BytesValue;

// ============================================================================
// Partition Resolution
// ============================================================================

/// Resolves a partition descriptor to its CDP browser context id.
fn resolve_partition(
    engine: &Engine,
    partition: Option<&PartitionDescriptor>,
) -> Result<Option<String>> {
    let user_context = match partition {
        Some(PartitionDescriptor::Context { context }) => {
            engine.contexts.user_context_of(context)?
        }
        Some(PartitionDescriptor::StorageKey { user_context, .. }) => user_context
            .clone()
            .unwrap_or_else(UserContextId::default_context),
        None => UserContextId::default_context(),
    };
    engine.user_contexts.cdp_browser_context(&user_context)
}

// ============================================================================
// Handlers
// ============================================================================

/// `storage.getCookies`
pub async fn get_cookies(engine: &Engine, params: GetCookiesParams) -> Result<Value> {
    let browser_context = resolve_partition(engine, params.partition.as_ref())?;

    let mut cdp_params = json!({});
    if let Some(browser_context) = &browser_context {
        cdp_params["browserContextId"] = Value::from(browser_context.as_str());
    }

    let result = engine.cdp.send("Storage.getCookies", cdp_params).await?;
    let cookies: Vec<Value> = result["cookies"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(cdp_cookie_to_bidi)
        .filter(|cookie| cookie_matches(params.filter.as_ref(), cookie))
        .collect();

    Ok(json!({"cookies": cookies, "partitionKey": {}}))
}

/// `storage.setCookie`
pub async fn set_cookie(engine: &Engine, params: SetCookieParams) -> Result<Value> {
    let browser_context = resolve_partition(engine, params.partition.as_ref())?;
    let cookie = &params.cookie;

    let mut cdp_cookie = json!({
        "name": cookie.name,
        "value": cookie.value.to_cdp_string(),
        "domain": cookie.domain,
        "path": cookie.path.as_deref().unwrap_or("/"),
    });
    if let Some(secure) = cookie.secure {
        cdp_cookie["secure"] = Value::from(secure);
    }
    if let Some(http_only) = cookie.http_only {
        cdp_cookie["httpOnly"] = Value::from(http_only);
    }
    if let Some(same_site) = cookie.same_site {
        cdp_cookie["sameSite"] = Value::from(match same_site {
            crate::protocol::network::SameSite::Strict => "Strict",
            crate::protocol::network::SameSite::Lax => "Lax",
            crate::protocol::network::SameSite::None => "None",
        });
    }
    if let Some(expiry) = cookie.expiry {
        cdp_cookie["expires"] = Value::from(expiry);
    }

    let mut cdp_params = json!({"cookies": [cdp_cookie]});
    if let Some(browser_context) = &browser_context {
        cdp_params["browserContextId"] = Value::from(browser_context.as_str());
    }

    engine.cdp.send("Storage.setCookies", cdp_params).await?;
    Ok(json!({"partitionKey": {}}))
}

/// `storage.deleteCookies`
pub async fn delete_cookies(engine: &Engine, params: GetCookiesParams) -> Result<Value> {
    let browser_context = resolve_partition(engine, params.partition.as_ref())?;

    let mut cdp_params = json!({});
    if let Some(browser_context) = &browser_context {
        cdp_params["browserContextId"] = Value::from(browser_context.as_str());
    }

    let result = engine.cdp.send("Storage.getCookies", cdp_params).await?;
    let matched: Vec<Value> = result["cookies"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter(|cdp_cookie| {
            let cookie = cdp_cookie_to_bidi(cdp_cookie);
            cookie_matches(params.filter.as_ref(), &cookie)
        })
        .cloned()
        .collect();

    for cookie in matched {
        engine
            .cdp
            .send(
                "Network.deleteCookies",
                json!({
                    "name": cookie["name"],
                    "domain": cookie["domain"],
                    "path": cookie["path"],
                }),
            )
            .await?;
    }

    Ok(json!({"partitionKey": {}}))
}

// ============================================================================
// Cookie Conversion
// ============================================================================

fn cdp_cookie_to_bidi(cdp_cookie: &Value) -> Value {
    let value = cdp_cookie["value"].as_str().unwrap_or_default();
    json!({
        "name": cdp_cookie["name"],
        "value": BytesValue::string(value),
        "domain": cdp_cookie["domain"],
        "path": cdp_cookie["path"],
        "size": cdp_cookie["size"].as_u64().unwrap_or(
            (cdp_cookie["name"].as_str().unwrap_or_default().len() + value.len()) as u64
        ),
        "httpOnly": cdp_cookie["httpOnly"].as_bool().unwrap_or(false),
        "secure": cdp_cookie["secure"].as_bool().unwrap_or(false),
        "sameSite": match cdp_cookie["sameSite"].as_str() {
            Some("Strict") => "strict",
            Some("None") => "none",
            _ => "lax",
        },
        "expiry": cdp_cookie["expires"],
    })
}

fn cookie_matches(filter: Option<&CookieFilter>, cookie: &Value) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    if let Some(name) = &filter.name
        && cookie["name"].as_str() != Some(name.as_str())
    {
        return false;
    }
    if let Some(value) = &filter.value {
        let want = value.to_cdp_string();
        if cookie["value"]["value"].as_str() != Some(want.as_str()) {
            return false;
        }
    }
    if let Some(domain) = &filter.domain
        && cookie["domain"].as_str() != Some(domain.as_str())
    {
        return false;
    }
    if let Some(path) = &filter.path
        && cookie["path"].as_str() != Some(path.as_str())
    {
        return false;
    }
    if let Some(secure) = filter.secure
        && cookie["secure"].as_bool() != Some(secure)
    {
        return false;
    }
    if let Some(http_only) = filter.http_only
        && cookie["httpOnly"].as_bool() != Some(http_only)
    {
        return false;
    }
    true
}

// ============================================================================
// Tests
// ============================================================================
