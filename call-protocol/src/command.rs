//! Message types for the engine call protocol.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{EnumString, IntoStaticStr};

////////////////////////////////////////////////////////////////////////////////
// Content types.
////////////////////////////////////////////////////////////////////////////////

/// Encoding of the payload that a call produces.  The command envelope
/// itself is always postcard; this only governs how the guest serializes
/// the result (and how the host decodes it).
#[derive(
    IntoStaticStr, EnumString, Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize,
)]
pub enum ContentType {
    /// Compact binary payloads.
    #[strum(serialize = "application/postcard")]
    #[serde(rename = "application/postcard")]
    Postcard,
    /// Human-readable payloads, used by the CLI surface.
    #[strum(serialize = "application/json")]
    #[serde(rename = "application/json")]
    Json,
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::Postcard
    }
}

////////////////////////////////////////////////////////////////////////////////
// The command envelope.
////////////////////////////////////////////////////////////////////////////////

/// Discriminates the two message shapes that cross the guest boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// A request to execute an exported operation.
    Call,
    /// A guest-produced notification, e.g. a structured error.
    Event,
}

/// The envelope handed to the guest's `call` export, one per invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique identifier of this invocation, chosen by the caller.
    pub request_id: String,
    pub kind: CommandKind,
    pub call: Call,
    pub options: CallOptions,
}

/// The operation reference and its ordered argument list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Operation identifier, e.g. `ENGINE_CALL_ID_GET_VERSION`.
    pub id: String,
    pub args: Vec<ArgValue>,
}

impl Call {
    pub fn new<S: Into<String>>(id: S, args: Vec<ArgValue>) -> Self {
        Call {
            id: id.into(),
            args,
        }
    }
}

/// An argument scalar.  A closed, tagged enum rather than a free-form JSON
/// value: postcard is not self-describing, so the guest can only decode
/// shapes that are fixed in the schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<bool> for ArgValue {
    fn from(val: bool) -> Self {
        ArgValue::Bool(val)
    }
}

impl From<i64> for ArgValue {
    fn from(val: i64) -> Self {
        ArgValue::Int(val)
    }
}

impl From<i32> for ArgValue {
    fn from(val: i32) -> Self {
        ArgValue::Int(val as i64)
    }
}

impl From<f64> for ArgValue {
    fn from(val: f64) -> Self {
        ArgValue::Float(val)
    }
}

impl From<&str> for ArgValue {
    fn from(val: &str) -> Self {
        ArgValue::Text(val.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(val: String) -> Self {
        ArgValue::Text(val)
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(val: Vec<u8>) -> Self {
        ArgValue::Blob(val)
    }
}

impl From<serde_json::Value> for ArgValue {
    /// Lossy conversion for the CLI surface: integers stay integral where
    /// they fit, and composite values are carried as their JSON text.
    fn from(val: serde_json::Value) -> Self {
        use serde_json::Value;
        match val {
            Value::Null => ArgValue::Null,
            Value::Bool(b) => ArgValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ArgValue::Int(i),
                None => ArgValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ArgValue::Text(s),
            composite => ArgValue::Text(composite.to_string()),
        }
    }
}

/// Per-call metadata forwarded to the guest alongside the operation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    pub content_type: ContentType,
    /// Whether the caller holds a premium entitlement; interpreted by the
    /// guest, not by the host.
    pub premium: bool,
    /// Serialized per-module options, keyed by module name.
    pub extra: BTreeMap<String, String>,
    pub platform: String,
    pub app_version: String,
}

impl Default for CallOptions {
    fn default() -> Self {
        CallOptions {
            content_type: ContentType::default(),
            premium: false,
            extra: BTreeMap::new(),
            platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Guest-produced messages.
////////////////////////////////////////////////////////////////////////////////

/// A notification emitted by the guest in place of a result payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub data: EventData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventData {
    /// A structured failure reported by the guest.  The host surfaces this
    /// to the caller when a payload fails to decode as the requested type.
    Error { code: i32, reason: String },
    /// Fractional progress of a long-running operation.
    Progress(f64),
}

/// The decoded result of the well-known `GetVersion` operation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct EngineVersion {
    pub id: String,
    pub version: String,
    pub url: String,
}

////////////////////////////////////////////////////////////////////////////////
// Well-known operation identifiers.
////////////////////////////////////////////////////////////////////////////////

/// Operations every compliant engine module exports.  Convertible to and
/// from the wire identifier via `strum`.
#[derive(IntoStaticStr, EnumString, Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineCallId {
    #[strum(serialize = "ENGINE_CALL_ID_GET_VERSION")]
    GetVersion,
}

impl EngineCallId {
    /// The wire identifier of this operation.
    pub fn id(self) -> &'static str {
        self.into()
    }
}
