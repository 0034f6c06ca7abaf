//! The DevTools protocol message envelope.
//!
//! # What travels over the socket? (for beginners)
//!
//! Every WebSocket text frame exchanged between a DevTools front-end and a
//! debugging backend is one JSON object.  There are three shapes:
//!
//! | Shape     | Fields present              | Direction              |
//! |-----------|-----------------------------|------------------------|
//! | Command   | `id`, `method`, `params`    | front-end → backend    |
//! | Response  | `id`, `result` or `error`   | backend → front-end    |
//! | Event     | `method`, `params`          | backend → front-end    |
//!
//! Any of them may carry a `sessionId` when the message targets a child
//! session (an attached worker, for example).
//!
//! The bridge only needs a *partial* view of a message to decide where it goes,
//! so [`ProtocolMessage`] keeps `params` as an untyped [`serde_json::Value`].
//! Messages that are forwarded are never re-serialized from this struct: the
//! relay forwards the original text so the bytes stay exactly as received.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

// ── Envelope ──────────────────────────────────────────────────────────────────

/// A decoded view of one protocol message.
///
/// Unknown top-level fields (`result`, `error`, ...) are ignored by serde; the
/// router never needs them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMessage {
    /// Command correlation id.  Present on commands and responses.
    #[serde(default)]
    pub id: Option<u64>,

    /// `"Domain.name"`.  Present on commands and events.
    #[serde(default)]
    pub method: Option<String>,

    /// Command or event parameters.  `Null` when absent.
    #[serde(default)]
    pub params: Value,

    /// Target (child) session, if any.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ProtocolMessage {
    /// Parses a raw text frame.
    ///
    /// Returns `None` for anything that is not a JSON object with the expected
    /// field types.  Callers treat such frames as opaque and forward them.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// The domain part of `method` (`"Network"` for `"Network.enable"`).
    ///
    /// `None` when there is no method or it contains no `.` separator.
    pub fn domain(&self) -> Option<&str> {
        self.method
            .as_deref()
            .and_then(|m| m.split_once('.'))
            .map(|(domain, _)| domain)
    }

    /// The command/event name inside the domain (`"enable"` for `"Network.enable"`).
    pub fn command(&self) -> Option<&str> {
        self.method
            .as_deref()
            .and_then(|m| m.split_once('.'))
            .map(|(_, name)| name)
    }

    /// `true` when the message is a command (has both an id and a method).
    pub fn is_command(&self) -> bool {
        self.id.is_some() && self.method.is_some()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A protocol-level error, sent back to the front-end as `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message} ({code})")]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

impl ProtocolError {
    /// The method is not handled locally (JSON-RPC "method not found").
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Parameters are missing or have the wrong type.
    pub const INVALID_PARAMS: i64 = -32602;
    /// The command was understood but failed.
    pub const SERVER_ERROR: i64 = -32000;

    /// `'Network.foo' wasn't found`, matching the wording Chromium uses.
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: Self::METHOD_NOT_FOUND,
            message: format!("'{method}' wasn't found"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_PARAMS,
            message: message.into(),
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self {
            code: Self::SERVER_ERROR,
            message: message.into(),
        }
    }
}

// ── Local command output ──────────────────────────────────────────────────────

/// What a locally handled command produced: the `result` object for the
/// response, plus any events that must be delivered alongside it.
///
/// Events are `(method, params)` pairs and are written before the response,
/// the same order a browser uses for `DOM.requestChildNodes`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandOutput {
    pub result: Value,
    pub events: Vec<(String, Value)>,
}

impl CommandOutput {
    /// A response with an empty `{}` result and no events.
    pub fn empty() -> Self {
        Self {
            result: Value::Object(Map::new()),
            events: Vec::new(),
        }
    }

    pub fn with_result(result: Value) -> Self {
        Self {
            result,
            events: Vec::new(),
        }
    }

    /// Appends an event to be emitted with this response.
    pub fn and_event(mut self, method: impl Into<String>, params: Value) -> Self {
        self.events.push((method.into(), params));
        self
    }
}

// ── Builders ──────────────────────────────────────────────────────────────────

/// Serializes a successful response.
pub fn response(id: u64, result: Value, session_id: Option<&str>) -> String {
    let mut message = json!({ "id": id, "result": result });
    attach_session(&mut message, session_id);
    message.to_string()
}

/// Serializes an error response.
pub fn error_response(id: u64, error: &ProtocolError, session_id: Option<&str>) -> String {
    let mut message = json!({
        "id": id,
        "error": { "code": error.code, "message": error.message },
    });
    attach_session(&mut message, session_id);
    message.to_string()
}

/// Serializes an event.
pub fn event(method: &str, params: Value, session_id: Option<&str>) -> String {
    let mut message = json!({ "method": method, "params": params });
    attach_session(&mut message, session_id);
    message.to_string()
}

fn attach_session(message: &mut Value, session_id: Option<&str>) {
    if let (Some(sid), Value::Object(map)) = (session_id, message) {
        map.insert("sessionId".to_string(), Value::String(sid.to_string()));
    }
}

/// Decodes command parameters into a typed struct.
///
/// A missing `params` field is treated as `{}` so that parameter structs made
/// entirely of optional fields still decode.
///
/// # Errors
///
/// Returns an `INVALID_PARAMS` [`ProtocolError`] naming the serde failure.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ProtocolError> {
    let result = if params.is_null() {
        serde_json::from_value(Value::Object(Map::new()))
    } else {
        T::deserialize(params)
    };
    result.map_err(|e| ProtocolError::invalid_params(format!("Invalid parameters: {e}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_extracts_domain_and_command() {
        // Arrange
        let raw = r#"{"id":7,"method":"Network.getResponseBody","params":{"requestId":"r1"}}"#;

        // Act
        let msg = ProtocolMessage::parse(raw).unwrap();

        // Assert
        assert_eq!(msg.id, Some(7));
        assert_eq!(msg.domain(), Some("Network"));
        assert_eq!(msg.command(), Some("getResponseBody"));
        assert!(msg.is_command());
        assert_eq!(msg.params["requestId"], "r1");
    }

    #[test]
    fn test_parse_event_has_no_id() {
        let msg = ProtocolMessage::parse(r#"{"method":"Debugger.paused","params":{}}"#).unwrap();
        assert_eq!(msg.id, None);
        assert!(!msg.is_command());
    }

    #[test]
    fn test_parse_response_has_no_domain() {
        let msg = ProtocolMessage::parse(r#"{"id":3,"result":{}}"#).unwrap();
        assert_eq!(msg.domain(), None);
    }

    #[test]
    fn test_parse_method_without_separator_has_no_domain() {
        let msg = ProtocolMessage::parse(r#"{"id":1,"method":"bogus"}"#).unwrap();
        assert_eq!(msg.domain(), None);
    }

    #[test]
    fn test_parse_rejects_non_objects_and_bad_field_types() {
        assert!(ProtocolMessage::parse("not json").is_none());
        assert!(ProtocolMessage::parse("[1,2,3]").is_none());
        assert!(ProtocolMessage::parse(r#"{"id":"seven","method":"A.b"}"#).is_none());
    }

    #[test]
    fn test_parse_keeps_session_id() {
        let msg =
            ProtocolMessage::parse(r#"{"id":1,"method":"Runtime.enable","sessionId":"S:1:"}"#)
                .unwrap();
        assert_eq!(msg.session_id.as_deref(), Some("S:1:"));
    }

    #[test]
    fn test_response_builder_echoes_session_id() {
        // Act
        let raw = response(4, json!({"ok": true}), Some("abc"));
        let value: Value = serde_json::from_str(&raw).unwrap();

        // Assert
        assert_eq!(value["id"], 4);
        assert_eq!(value["result"]["ok"], true);
        assert_eq!(value["sessionId"], "abc");
    }

    #[test]
    fn test_error_response_builder_carries_code_and_message() {
        let error = ProtocolError::method_not_found("Network.foo");
        let value: Value = serde_json::from_str(&error_response(9, &error, None)).unwrap();

        assert_eq!(value["id"], 9);
        assert_eq!(value["error"]["code"], ProtocolError::METHOD_NOT_FOUND);
        assert_eq!(value["error"]["message"], "'Network.foo' wasn't found");
        assert!(value.get("sessionId").is_none());
    }

    #[test]
    fn test_event_builder_shape() {
        let value: Value =
            serde_json::from_str(&event("DOM.setChildNodes", json!({"parentId": 0}), None))
                .unwrap();
        assert_eq!(value["method"], "DOM.setChildNodes");
        assert_eq!(value["params"]["parentId"], 0);
        assert!(value.get("id").is_none());
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DepthParams {
        depth: Option<i64>,
    }

    #[test]
    fn test_parse_params_treats_null_as_empty_object() {
        let params: DepthParams = parse_params(&Value::Null).unwrap();
        assert_eq!(params.depth, None);
    }

    #[test]
    fn test_parse_params_reports_invalid_params() {
        let err = parse_params::<DepthParams>(&json!({"depth": "deep"})).unwrap_err();
        assert_eq!(err.code, ProtocolError::INVALID_PARAMS);
    }
}
