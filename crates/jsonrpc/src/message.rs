//! Wire message model and canonical JSON codec for JSON-RPC 2.0.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ErrorCode, JsonRpcError};

const JSONRPC_VERSION: &str = "2.0";

/// Identity of a request/response pair. Integer and string domains never compare equal,
/// even when their textual forms coincide (`1` and `"1"` are distinct ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Number(i64),
    String(String),
}

impl MessageId {
    pub fn as_number(&self) -> Option<i64> {
        match self {
            MessageId::Number(n) => Some(*n),
            MessageId::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MessageId::String(s) => Some(s.as_str()),
            MessageId::Number(_) => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            MessageId::Number(n) => Value::from(*n),
            MessageId::String(s) => Value::from(s.clone()),
        }
    }

    fn from_value(value: &Value) -> Result<Self, JsonRpcError> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(MessageId::Number)
                .ok_or_else(|| JsonRpcError::InvalidRequest("id must be an integer or string".into())),
            Value::String(s) => Ok(MessageId::String(s.clone())),
            _ => Err(JsonRpcError::InvalidRequest(
                "id must be an integer or string".into(),
            )),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Number(n) => write!(f, "{n}"),
            MessageId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        MessageId::Number(value)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        MessageId::String(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId::String(value.to_owned())
    }
}

/// A JSON-RPC error object, as carried by `Message::Response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn reserved(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code as i32, message.into())
    }
}

/// Params shape accepted on the wire: an object, an array, `null`, or absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    None,
}

impl Params {
    fn from_value(value: Option<Value>) -> Result<Self, JsonRpcError> {
        match value {
            None | Some(Value::Null) => Ok(Params::None),
            Some(Value::Object(map)) => Ok(Params::Object(map)),
            Some(Value::Array(items)) => Ok(Params::Array(items)),
            Some(_) => Err(JsonRpcError::InvalidRequest(
                "params must be an object, array, or null".into(),
            )),
        }
    }

    fn to_value(&self) -> Option<Value> {
        match self {
            Params::Object(map) => Some(Value::Object(map.clone())),
            Params::Array(items) => Some(Value::Array(items.clone())),
            Params::None => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Params::Object(map) => Some(map),
            _ => None,
        }
    }
}

/// A fully typed JSON-RPC message: a request (or notification, when `id` is `None`)
/// or a response (result xor error).
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: Option<MessageId>,
        method: String,
        params: Params,
    },
    Response {
        id: MessageId,
        result: Result<Value, ErrorObject>,
    },
}

impl Message {
    pub fn request(id: Option<MessageId>, method: impl Into<String>, params: Params) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Params) -> Self {
        Message::Request {
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn success(id: MessageId, result: Value) -> Self {
        Message::Response {
            id,
            result: Ok(result),
        }
    }

    pub fn failure(id: MessageId, error: ErrorObject) -> Self {
        Message::Response {
            id,
            result: Err(error),
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Message::Request { id: None, .. })
    }

    pub fn id(&self) -> Option<&MessageId> {
        match self {
            Message::Request { id, .. } => id.as_ref(),
            Message::Response { id, .. } => Some(id),
        }
    }

    /// Serialize to the canonical wire bytes (UTF-8 JSON, no trailing newline).
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_wire()).expect("Message encodes to valid JSON")
    }

    fn to_wire(&self) -> Value {
        let mut object = Map::new();
        object.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        match self {
            Message::Request { id, method, params } => {
                if let Some(id) = id {
                    object.insert("id".into(), id.to_value());
                }
                object.insert("method".into(), Value::from(method.as_str()));
                if let Some(params) = params.to_value() {
                    object.insert("params".into(), params);
                }
            }
            Message::Response { id, result } => {
                object.insert("id".into(), id.to_value());
                match result {
                    Ok(value) => {
                        object.insert("result".into(), value.clone());
                    }
                    Err(error) => {
                        object.insert(
                            "error".into(),
                            serde_json::to_value(error).expect("ErrorObject is serializable"),
                        );
                    }
                }
            }
        }
        Value::Object(object)
    }

    /// Parse a single JSON-RPC message from its wire bytes.
    ///
    /// Fails with `ParseError` on invalid JSON and `InvalidRequest` when the
    /// `jsonrpc` field is missing/unrecognized or the shape is neither a
    /// request nor a response.
    pub fn decode(bytes: &[u8]) -> Result<Self, JsonRpcError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|err| JsonRpcError::ParseError(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, JsonRpcError> {
        let object = value
            .as_object()
            .ok_or_else(|| JsonRpcError::InvalidRequest("message must be a JSON object".into()))?;

        match object.get("jsonrpc") {
            Some(Value::String(version)) if version == JSONRPC_VERSION => {}
            _ => {
                return Err(JsonRpcError::InvalidRequest(
                    "missing or unrecognized \"jsonrpc\" version".into(),
                ))
            }
        }

        let has_method = object.contains_key("method");
        let has_result_or_error = object.contains_key("result") || object.contains_key("error");

        if has_method {
            let method = match object.get("method") {
                Some(Value::String(name)) => name.clone(),
                _ => {
                    return Err(JsonRpcError::InvalidRequest(
                        "method must be a string".into(),
                    ))
                }
            };
            let id = match object.get("id") {
                Some(value) => Some(MessageId::from_value(value)?),
                None => None,
            };
            let params = Params::from_value(object.get("params").cloned())?;
            Ok(Message::Request { id, method, params })
        } else if has_result_or_error {
            let id = match object.get("id") {
                Some(value) => MessageId::from_value(value)?,
                None => {
                    return Err(JsonRpcError::InvalidRequest(
                        "response is missing \"id\"".into(),
                    ))
                }
            };
            let result = match (object.get("result"), object.get("error")) {
                (Some(value), None) => Ok(value.clone()),
                (None, Some(error)) => {
                    let error: ErrorObject = serde_json::from_value(error.clone())
                        .map_err(|err| JsonRpcError::InvalidRequest(err.to_string()))?;
                    Err(error)
                }
                _ => {
                    return Err(JsonRpcError::InvalidRequest(
                        "response must carry exactly one of result/error".into(),
                    ))
                }
            };
            Ok(Message::Response { id, result })
        } else {
            Err(JsonRpcError::InvalidRequest(
                "message is neither a request nor a response".into(),
            ))
        }
    }
}
