//! Response normalization.
//!
//! The service returns loosely shaped JSON. [`normalize`] reduces any value to
//! either plain text or a [`StructuredReport`], first match wins:
//!
//! 1. a JSON string is returned verbatim;
//! 2. `null` becomes the empty string;
//! 3. an object with a string field among [`REPLY_KEYS`] (checked in order)
//!    yields that string;
//! 4. an object that is itself a structured report yields the report;
//! 5. otherwise the object's own values are scanned, one level deep, for the
//!    first structured report;
//! 6. anything else is pretty-printed JSON text.
//!
//! The function is total: no input is rejected and nothing is dropped silently.

use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    error::{ChatError, Result},
    message::MessageContent,
    report::{StructuredReport, is_structured_report},
};

/// Keys that carry a plain-text reply, in priority order
pub const REPLY_KEYS: &[&str] = &["response", "message", "reply", "text", "content"];

/// Keys that carry the conversation id on creation, in priority order
pub const CONVERSATION_ID_KEYS: &[&str] = &["conversation_id", "id", "_id"];

pub fn normalize(raw: &Value) -> MessageContent {
    match raw {
        Value::String(text) => MessageContent::Text(text.clone()),
        Value::Null => MessageContent::Text(String::new()),
        Value::Object(object) => normalize_object(object, raw),
        other => MessageContent::Text(pretty(other)),
    }
}

fn normalize_object(object: &Map<String, Value>, raw: &Value) -> MessageContent {
    if let Some(text) = reply_text(object) {
        return MessageContent::Text(text.to_string());
    }

    if is_structured_report(raw) {
        return MessageContent::Report(StructuredReport::from_object(object));
    }

    if let Some((key, nested)) = object
        .iter()
        .find(|(_, value)| is_structured_report(value))
    {
        debug!("Using structured report nested under '{}'", key);
        if let Some(nested) = nested.as_object() {
            return MessageContent::Report(StructuredReport::from_object(nested));
        }
    }

    MessageContent::Text(pretty(raw))
}

fn reply_text(object: &Map<String, Value>) -> Option<&str> {
    REPLY_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Pull the conversation id out of a creation response.
///
/// Tries `conversation_id`, `id` and `_id` (skipping null or empty values),
/// then falls back to the first field.
/// Numeric ids are stringified and a bare string body is taken as the id.
pub fn extract_conversation_id(raw: &Value) -> Result<String> {
    let candidate = match raw {
        Value::Object(object) => CONVERSATION_ID_KEYS
            .iter()
            .filter_map(|key| object.get(*key))
            .find(|v| !is_blank(v))
            .or_else(|| object.values().next()),
        Value::String(_) => Some(raw),
        _ => None,
    };

    let id = match candidate {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    if id.is_empty() {
        return Err(ChatError::InvalidResponse(format!(
            "no conversation id in response: {}",
            raw
        )));
    }

    Ok(id)
}
