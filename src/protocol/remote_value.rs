//! Script value (de)serialization types.
//!
//! [`RemoteValue`] is the mapper-to-client rendering of a JavaScript
//! value; [`LocalValue`] is the client-to-mapper form used for call
//! arguments. Non-finite numbers and negative zero travel as the string
//! sentinels `"NaN"`, `"Infinity"`, `"-Infinity"`, and `"-0"`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::{BrowsingContextId, RealmId};

// ============================================================================
// Target
// ============================================================================

/// Where a script operation runs: a context's default (or sandbox) realm,
/// or a realm addressed directly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// Address a realm by id.
    Realm {
        /// The realm id.
        realm: RealmId,
    },
    /// Address a context's default realm, optionally a named sandbox.
    Context {
        /// The browsing context.
        context: BrowsingContextId,
        /// Sandbox name; absent means the default realm.
        #[serde(default)]
        sandbox: Option<String>,
    },
}

// ============================================================================
// ResultOwnership
// ============================================================================

/// Whether evaluation results keep a remote handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOwnership {
    /// Serialize fully, no handle retained.
    #[default]
    None,
    /// Retain a handle on the root of the result.
    Root,
}

// ============================================================================
// LocalValue
// ============================================================================

/// A client-supplied value passed as a call argument or `this`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LocalValue {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A string.
    String {
        /// The value.
        value: String,
    },
    /// A number, or one of the sentinels `"NaN"`, `"Infinity"`,
    /// `"-Infinity"`, `"-0"`.
    Number {
        /// The value.
        value: Value,
    },
    /// A boolean.
    Boolean {
        /// The value.
        value: bool,
    },
    /// A BigInt carried as its decimal string.
    Bigint {
        /// The decimal digits.
        value: String,
    },
    /// An array of local values.
    Array {
        /// The elements.
        value: Vec<LocalValue>,
    },
    /// An object; entries are `[key, value]` pairs.
    Object {
        /// The entries.
        value: Vec<(LocalKey, LocalValue)>,
    },
    /// A date carried as an ISO string.
    Date {
        /// ISO-8601 timestamp.
        value: String,
    },
    /// A regular expression.
    Regexp {
        /// Pattern and flags.
        value: RegExpValue,
    },
    /// A map; entries are `[key, value]` pairs.
    Map {
        /// The entries.
        value: Vec<(LocalKey, LocalValue)>,
    },
    /// A set of local values.
    Set {
        /// The elements.
        value: Vec<LocalValue>,
    },
}

/// An object or map key: a bare string on the wire, or a full value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LocalKey {
    /// Plain string key.
    String(String),
    /// Structured key.
    Value(Box<LocalValue>),
}

/// Pattern/flags pair for regexp values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegExpValue {
    /// The pattern source.
    pub pattern: String,
    /// The flags string.
    #[serde(default)]
    pub flags: Option<String>,
}

// ============================================================================
// RemoteValue
// ============================================================================

/// A mapper-rendered JavaScript value.
///
/// Compound values carry their serialized children; any value may carry
/// a `handle` kept alive until the owning realm dies or the handle is
/// disowned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteValue {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A string.
    String {
        /// The value.
        value: String,
    },
    /// A number, or one of the sentinels `"NaN"`, `"Infinity"`,
    /// `"-Infinity"`, `"-0"`.
    Number {
        /// The value.
        value: Value,
    },
    /// A boolean.
    Boolean {
        /// The value.
        value: bool,
    },
    /// A BigInt carried as its decimal string.
    Bigint {
        /// The decimal digits.
        value: String,
    },
    /// An array.
    Array {
        /// Serialized elements, absent past the serialization depth.
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Vec<RemoteValue>>,
        /// Remote handle.
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
    },
    /// A plain object; entries are `[key, value]` pairs.
    Object {
        /// Serialized entries, absent past the serialization depth.
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Vec<(RemoteKey, RemoteValue)>>,
        /// Remote handle.
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
    },
    /// A map; entries are `[key, value]` pairs.
    Map {
        /// Serialized entries.
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Vec<(RemoteKey, RemoteValue)>>,
        /// Remote handle.
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
    },
    /// A set.
    Set {
        /// Serialized elements.
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Vec<RemoteValue>>,
        /// Remote handle.
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
    },
    /// A date carried as an ISO string.
    Date {
        /// ISO-8601 timestamp.
        value: String,
    },
    /// A regular expression.
    Regexp {
        /// Pattern and flags.
        value: RegExpValue,
    },
    /// A function; never serialized structurally.
    Function {
        /// Remote handle.
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
    },
    /// A promise; settled state is unwrapped when `awaitPromise` is set.
    Promise {
        /// Remote handle.
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
    },
}

/// A serialized object or map key: a bare string, or a full value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteKey {
    /// Plain string key.
    String(String),
    /// Structured key.
    Value(Box<RemoteValue>),
}

impl RemoteValue {
    /// Renders a finite `f64` as a BiDi number, using the `"-0"` and
    /// non-finite sentinels where required.
    #[must_use]
    pub fn number(n: f64) -> Self {
        let value = if n.is_nan() {
            Value::from("NaN")
        } else if n == f64::INFINITY {
            Value::from("Infinity")
        } else if n == f64::NEG_INFINITY {
            Value::from("-Infinity")
        } else if n == 0.0 && n.is_sign_negative() {
            Value::from("-0")
        } else {
            serde_json::Number::from_f64(n).map_or_else(|| Value::from("NaN"), Value::Number)
        };
        Self::Number { value }
    }

    /// Returns the remote handle, if the value carries one.
    #[must_use]
    pub fn handle(&self) -> Option<&str> {
        match self {
            Self::Array { handle, .. }
            | Self::Object { handle, .. }
            | Self::Map { handle, .. }
            | Self::Set { handle, .. }
            | Self::Function { handle }
            | Self::Promise { handle } => handle.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// EvaluateResult
// ============================================================================

/// Outcome of `script.evaluate` / `script.callFunction`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EvaluateResult {
    /// Evaluation completed.
    Success {
        /// The result value.
        result: RemoteValue,
        /// Realm the evaluation ran in.
        realm: RealmId,
    },
    /// Evaluation threw.
    Exception {
        /// Exception details.
        #[serde(rename = "exceptionDetails")]
        exception_details: ExceptionDetails,
        /// Realm the evaluation ran in.
        realm: RealmId,
    },
}

/// Details of a thrown exception.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Rendered exception value.
    pub exception: RemoteValue,
    /// Exception message text.
    pub text: String,
    /// 0-based column of the throw site.
    pub column_number: u32,
    /// 0-based line of the throw site.
    pub line_number: u32,
}

// ============================================================================
// Tests
// ============================================================================
