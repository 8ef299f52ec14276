//! JSON-RPC 2.0 message model
//!
//! A single [`Message`] struct covers requests, responses and notifications.
//! Payloads (`params`, `result`, `error.data`) are kept as raw JSON so the
//! bytes the peer sent are handed to callers untouched.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{Result, RpcError};

/// Protocol version tag carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist or is not available
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error
pub const INTERNAL_ERROR: i64 = -32603;

/// Correlation identifier linking a request to its response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id, rendered as decimal text on the wire
    Number(i64),
    /// String id (only ever produced by peers)
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

/// Error object carried by a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    /// Error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Optional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Create an error object without data
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {}", method))
    }
}

/// What role a decoded message plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Has an id and a method
    Request,
    /// Has an id, no method
    Response,
    /// Has a method, no id
    Notification,
    /// Neither id nor method
    Invalid,
}

/// Wire-level JSON-RPC message
///
/// Absent optional fields are omitted on the wire rather than written as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Protocol version (always "2.0" for outgoing messages)
    pub jsonrpc: String,
    /// Correlation id (requests and responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Method name (requests and notifications only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Opaque parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
    /// Opaque result (successful responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
    /// Error object (failed responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Message {
    /// Create a request message
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    /// Create a notification message (no id, no response expected)
    pub fn notification(method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    /// Create a successful response
    pub fn response(id: RequestId, result: Option<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: None,
            params: None,
            result,
            error: None,
        }
    }

    /// Create an error response
    pub fn error_response(id: RequestId, error: ResponseError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// Classify the message by which fields are present
    pub fn kind(&self) -> MessageKind {
        match (&self.id, &self.method) {
            (Some(_), Some(_)) => MessageKind::Request,
            (Some(_), None) => MessageKind::Response,
            (None, Some(_)) => MessageKind::Notification,
            (None, None) => MessageKind::Invalid,
        }
    }

    /// Serialize to the JSON body of a frame
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(RpcError::Serialization)
    }

    /// Parse a frame body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(RpcError::MalformedBody)
    }
}

/// Encode params as an opaque payload
///
/// A value that serializes to JSON `null` (such as `()`) yields `None`, so the
/// `params` field is omitted from the frame.
pub fn to_payload<P>(params: &P) -> Result<Option<Box<RawValue>>>
where
    P: Serialize + ?Sized,
{
    let raw = serde_json::value::to_raw_value(params).map_err(RpcError::Serialization)?;
    if raw.get() == "null" {
        Ok(None)
    } else {
        Ok(Some(raw))
    }
}

/// Generates monotonically increasing correlation ids, starting at 1
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next request ID
    pub fn next_id(&self) -> RequestId {
        let n = self.last.fetch_add(1, Ordering::SeqCst) + 1;
        RequestId::Number(n as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let params = to_payload(&json!({"processId": 1234})).unwrap();
        let msg = Message::request(RequestId::Number(1), "initialize", params);
        let json = String::from_utf8(msg.to_vec().unwrap()).unwrap();

        assert_eq!(
            json,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"processId":1234}}"#
        );
    }

    #[test]
    fn test_notification_omits_absent_fields() {
        let msg = Message::notification("initialized", None);
        let json = String::from_utf8(msg.to_vec().unwrap()).unwrap();

        assert_eq!(json, r#"{"jsonrpc":"2.0","method":"initialized"}"#);
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_unit_params_are_omitted() {
        assert!(to_payload(&()).unwrap().is_none());
        assert!(to_payload(&Option::<u32>::None).unwrap().is_none());
        assert_eq!(to_payload(&[1, 2]).unwrap().unwrap().get(), "[1,2]");
    }

    #[test]
    fn test_parse_response() {
        let body = br#"{"jsonrpc":"2.0","result":{"key":"value"},"id":1}"#;
        let msg = Message::from_slice(body).unwrap();

        assert_eq!(msg.kind(), MessageKind::Response);
        assert_eq!(msg.id, Some(RequestId::Number(1)));
        assert_eq!(msg.result.unwrap().get(), r#"{"key":"value"}"#);
        assert!(msg.error.is_none());
    }

    #[test]
    fn test_parse_error_response() {
        let msg = Message::from_slice(
            br#"{"jsonrpc":"2.0","error":{"code":-32600,"message":"Invalid Request"},"id":1}"#,
        )
        .unwrap();

        assert_eq!(msg.kind(), MessageKind::Response);
        let error = msg.error.unwrap();
        assert_eq!(error.code, INVALID_REQUEST);
        assert_eq!(error.message, "Invalid Request");
        assert!(error.data.is_none());
    }

    #[test]
    fn test_message_kinds() {
        let body = br#"{"jsonrpc":"2.0","id":"a","method":"workspace/configuration"}"#;
        let request = Message::from_slice(body).unwrap();
        assert_eq!(request.kind(), MessageKind::Request);
        assert_eq!(request.id, Some(RequestId::String("a".to_string())));

        let body = br#"{"jsonrpc":"2.0","method":"$/progress","params":{}}"#;
        let notification = Message::from_slice(body).unwrap();
        assert_eq!(notification.kind(), MessageKind::Notification);

        let invalid = Message::from_slice(br#"{"jsonrpc":"2.0"}"#).unwrap();
        assert_eq!(invalid.kind(), MessageKind::Invalid);
    }

    #[test]
    fn test_params_bytes_are_preserved() {
        let body = br#"{"jsonrpc":"2.0","method":"x","params":{"b": 2, "a":1.50}}"#;
        let msg = Message::from_slice(body).unwrap();
        assert_eq!(msg.params.unwrap().get(), r#"{"b": 2, "a":1.50}"#);
    }

    #[test]
    fn test_malformed_body() {
        let err = Message::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, RpcError::MalformedBody(_)));
    }

    #[test]
    fn test_request_id_increments() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next_id(), RequestId::Number(1));
        assert_eq!(ids.next_id(), RequestId::Number(2));
        assert_eq!(ids.next_id(), RequestId::Number(3));
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId::Number(42).to_string(), "42");
        assert_eq!(RequestId::String("7".to_string()).to_string(), "\"7\"");
    }
}
