//! Error taxonomy: reserved wire codes, internal dispatch errors, and the
//! user-visible error kinds raised by the client and server runtimes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::message::{ErrorObject, MessageId};

/// Reserved JSON-RPC error codes (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    UnhandledException = -32010,
}

/// Structured payload carried by an `UnhandledException` error's `data` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExceptionData {
    pub exception_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_exception: Option<Box<ExceptionData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, Value>>,
}

impl ExceptionData {
    pub fn new(exception_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception_type: exception_type.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Internal error type flowing through the codec, binder, and dispatcher
/// before being folded into a wire `ErrorObject` by the dispatch pipeline.
#[derive(Debug, Error, Clone)]
pub enum JsonRpcError {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("ambiguous match for method {method:?} ({candidate_count} candidates)")]
    AmbiguousMatch {
        method: String,
        candidate_count: usize,
    },
    #[error("{}: {}", data.exception_type, data.message)]
    UnhandledException { data: ExceptionData },
    #[error("{0}")]
    Application(#[from] RpcException),
}

impl JsonRpcError {
    pub fn into_error_object(self) -> ErrorObject {
        match self {
            JsonRpcError::ParseError(msg) => {
                ErrorObject::reserved(ErrorCode::ParseError, msg)
            }
            JsonRpcError::InvalidRequest(msg) => {
                ErrorObject::reserved(ErrorCode::InvalidRequest, msg)
            }
            JsonRpcError::MethodNotFound(msg) => {
                ErrorObject::reserved(ErrorCode::MethodNotFound, msg)
            }
            JsonRpcError::InvalidParams(msg) => {
                ErrorObject::reserved(ErrorCode::InvalidParams, msg)
            }
            JsonRpcError::InternalError(msg) => {
                ErrorObject::reserved(ErrorCode::InternalError, msg)
            }
            JsonRpcError::AmbiguousMatch { method, .. } => ErrorObject::reserved(
                ErrorCode::InvalidParams,
                format!("no unique matching signature for method \"{method}\""),
            ),
            JsonRpcError::UnhandledException { data } => {
                let message = format!("{}: {}", data.exception_type, data.message);
                let data_value = serde_json::to_value(&data).unwrap_or(Value::Null);
                ErrorObject::reserved(ErrorCode::UnhandledException, message).with_data(data_value)
            }
            JsonRpcError::Application(exception) => exception.into_error_object(),
        }
    }
}

/// Raised by a server handler to inject a specific error into the response.
/// Carries the exact `ErrorObject` the dispatcher places in `response.error`.
#[derive(Debug, Clone, Error)]
#[error("{}", error.message)]
pub struct RpcException {
    pub error: ErrorObject,
}

impl RpcException {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            error: ErrorObject::new(code, message),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.error.data = Some(data);
        self
    }

    pub fn into_error_object(self) -> ErrorObject {
        self.error
    }
}

/// A peer-returned JSON-RPC error, reified on the client with its decoded
/// `ExceptionData` chain when the server populated one.
#[derive(Debug, Clone, Error)]
#[error("remote error {}: {}", error.code, error.message)]
pub struct RemoteError {
    pub error: ErrorObject,
    pub exception: Option<ExceptionData>,
}

impl RemoteError {
    pub fn from_error_object(error: ErrorObject) -> Self {
        let exception = error
            .data
            .as_ref()
            .and_then(|data| serde_json::from_value::<ExceptionData>(data.clone()).ok());
        Self { error, exception }
    }
}

/// Errors visible to callers of the client correlation engine.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Contract(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("request id {0} already pending")]
    Duplicate(MessageId),
    #[error("request cancelled")]
    Canceled,
    #[error("client correlation engine shut down")]
    Closed,
}

/// Errors raised while resolving service descriptors into a `MethodRegistry`.
/// Notification methods statically return `()` (see `registry::ServiceBuilder::notification`),
/// so "notification must not return a value" is enforced by the type system rather than here.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("parameter \"{param}\" on method \"{method}\" is declared more than once")]
    DuplicateParameter { method: String, param: String },
    #[error("service \"{0}\" was registered more than once")]
    DuplicateService(String),
}

/// Transport-facing read failures (framing, not JSON-RPC shape).
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("I/O error reading from transport: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Framing(String),
    #[error("transport closed")]
    Closed,
}

/// Transport-facing write failures.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("I/O error writing to transport: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
}
