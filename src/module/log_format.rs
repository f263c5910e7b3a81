//! Console message formatting.
//!
//! When the first console argument is a string, format specifiers in it
//! consume the remaining arguments one by one. Leftover arguments are
//! appended space-separated and reported as an error; a specifier with
//! no argument left is an error too.
//!
//! # Specifier Table
//!
//! | Spec | Conversion |
//! |------|------------|
//! | `%d`/`%i` | integer coerce; non-numerics → `NaN`; `-0` → `0` |
//! | `%f` | float coerce; `Infinity` preserved |
//! | `%s` | string coerce; compounds become `Array(n)` etc. |
//! | `%o`/`%O`/`%c` | JSON-like structural rendering |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::remote_value::{RemoteKey, RemoteValue};

// ============================================================================
// Entry Point
// ============================================================================

/// Formats console arguments into the `log.entryAdded` text.
///
/// # Errors
///
/// - `less value is provided` when a specifier has no argument left.
/// - `more value is provided: "<text>"` when arguments remain after the
///   format string is exhausted; the message carries the full text with
///   the leftovers appended space-separated.
pub fn format_console_message(args: &[RemoteValue]) -> Result<String> {
    let Some((first, rest)) = args.split_first() else {
        return Ok(String::new());
    };

    let RemoteValue::String { value: format } = first else {
        // No format string: join everything with the %s conversion.
        let parts: Vec<String> = args.iter().map(to_display_string).collect();
        return Ok(parts.join(" "));
    };

    let mut out = String::new();
    let mut values = rest.iter();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(spec @ ('d' | 'i' | 'f' | 's' | 'o' | 'O' | 'c')) => {
                let spec = *spec;
                chars.next();
                let value = values
                    .next()
                    .ok_or_else(|| Error::invalid_argument("less value is provided"))?;
                out.push_str(&match spec {
                    'd' | 'i' => to_integer_string(value),
                    'f' => to_float_string(value),
                    's' => to_display_string(value),
                    _ => to_json_string(value),
                });
            }
            _ => out.push('%'),
        }
    }

    let leftovers: Vec<String> = values.map(to_display_string).collect();
    if !leftovers.is_empty() {
        for extra in &leftovers {
            out.push(' ');
            out.push_str(extra);
        }
        return Err(Error::invalid_argument(format!(
            "more value is provided: \"{out}\""
        )));
    }

    Ok(out)
}

// ============================================================================
// Conversions
// ============================================================================

/// Extracts the numeric value, honoring the wire sentinels.
fn number_of(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => match s.as_str() {
            "NaN" => f64::NAN,
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            "-0" => -0.0,
            other => other.parse().unwrap_or(f64::NAN),
        },
        _ => f64::NAN,
    }
}

/// `%d` / `%i` conversion.
fn to_integer_string(value: &RemoteValue) -> String {
    let n = match value {
        RemoteValue::Number { value } => number_of(value),
        RemoteValue::String { value } => value.parse().unwrap_or(f64::NAN),
        RemoteValue::Bigint { value } => return value.clone(),
        _ => f64::NAN,
    };
    if !n.is_finite() {
        return "NaN".to_string();
    }
    let truncated = n.trunc();
    if truncated == 0.0 {
        // Covers negative zero.
        "0".to_string()
    } else {
        format!("{}", truncated as i64)
    }
}

/// `%f` conversion.
fn to_float_string(value: &RemoteValue) -> String {
    let n = match value {
        RemoteValue::Number { value } => number_of(value),
        RemoteValue::String { value } => value.parse().unwrap_or(f64::NAN),
        RemoteValue::Bigint { value } => return value.clone(),
        _ => f64::NAN,
    };
    format_number(n)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        // Covers negative zero.
        "0".to_string()
    } else {
        format!("{n}")
    }
}

fn count_of(items: &Option<Vec<RemoteValue>>) -> usize {
    items.as_ref().map_or(0, Vec::len)
}

fn entry_count_of(items: &Option<Vec<(RemoteKey, RemoteValue)>>) -> usize {
    items.as_ref().map_or(0, Vec::len)
}

fn key_json(key: &RemoteKey) -> String {
    match key {
        RemoteKey::String(key) => {
            serde_json::to_string(key).unwrap_or_else(|_| format!("\"{key}\""))
        }
        RemoteKey::Value(value) => to_json_string(value),
    }
}

/// `%s` conversion.
fn to_display_string(value: &RemoteValue) -> String {
    match value {
        RemoteValue::String { value } => value.clone(),
        RemoteValue::Number { value } => format_number(number_of(value)),
        RemoteValue::Boolean { value } => value.to_string(),
        RemoteValue::Null => "null".to_string(),
        RemoteValue::Undefined => "undefined".to_string(),
        RemoteValue::Bigint { value } => value.clone(),
        RemoteValue::Array { value, .. } => format!("Array({})", count_of(value)),
        RemoteValue::Set { value, .. } => format!("Set({})", count_of(value)),
        RemoteValue::Object { value, .. } => format!("Object({})", entry_count_of(value)),
        RemoteValue::Map { value, .. } => format!("Map({})", entry_count_of(value)),
        RemoteValue::Date { value } => value.clone(),
        RemoteValue::Regexp { value } => {
            format!("/{}/{}", value.pattern, value.flags.as_deref().unwrap_or(""))
        }
        RemoteValue::Function { .. } => "Function".to_string(),
        RemoteValue::Promise { .. } => "Promise".to_string(),
    }
}

/// `%o` / `%O` / `%c` conversion.
fn to_json_string(value: &RemoteValue) -> String {
    match value {
        RemoteValue::String { value } => {
            serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
        }
        RemoteValue::Number { value } => format_number(number_of(value)),
        RemoteValue::Boolean { value } => value.to_string(),
        RemoteValue::Null => "null".to_string(),
        RemoteValue::Undefined => "undefined".to_string(),
        RemoteValue::Bigint { value } => format!("{value}n"),
        RemoteValue::Regexp { value } => {
            format!("/{}/{}", value.pattern, value.flags.as_deref().unwrap_or(""))
        }
        RemoteValue::Date { value } => value.clone(),
        RemoteValue::Array { value, .. } | RemoteValue::Set { value, .. } => {
            let items: Vec<String> = value
                .as_ref()
                .map(|items| items.iter().map(to_json_string).collect())
                .unwrap_or_default();
            format!("[{}]", items.join(", "))
        }
        RemoteValue::Object { value, .. } | RemoteValue::Map { value, .. } => {
            let entries: Vec<String> = value
                .as_ref()
                .map(|entries| {
                    entries
                        .iter()
                        .map(|(key, val)| format!("{}: {}", key_json(key), to_json_string(val)))
                        .collect()
                })
                .unwrap_or_default();
            format!("{{{}}}", entries.join(", "))
        }
        RemoteValue::Function { .. } => "Function".to_string(),
        RemoteValue::Promise { .. } => "Promise".to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
