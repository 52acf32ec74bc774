//! JSON-RPC 2.0 envelopes and request id allocation.
//!
//! Three message shapes travel over a channel:
//!
//! ```text
//! Request:  { jsonrpc: "2.0", id?: integer, method: string, params: any[] }
//! Result:   { jsonrpc: "2.0", id: integer, result: any }
//! Error:    { jsonrpc: "2.0", id: integer, error: { code, message, data? } }
//! ```
//!
//! A [`Request`] without an id is a notification: the `id` key is omitted
//! from the wire form entirely (not `null`, not `0`), and no reply is ever
//! produced for it.
//!
//! Outbound replies are built with [`build_result`] and [`build_error`].
//! Inbound replies are decoded into [`Response`], whose fields are all
//! optional so that malformed replies can be observed and dropped instead of
//! failing deserialization.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::params::Params;

/// Protocol version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// The `"jsonrpc": "2.0"` tag.
///
/// Serializes as the literal string and refuses any other version on decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Version;

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(Version)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {}",
                version
            )))
        }
    }
}

/// Identifier correlating a request with its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw id.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw integer value.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of protocol error codes.
///
/// The numeric values follow the JSON-RPC 2.0 convention so that peers
/// written in other languages agree on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Input was not valid JSON.
    ParseError,
    /// JSON was valid but not a valid envelope.
    InvalidRequest,
    /// The method path did not resolve to a callable.
    InvalidMethod,
    /// The callable rejected its arguments.
    InvalidParams,
    /// The callable failed while running.
    InternalError,
}

impl ErrorCode {
    /// Numeric wire value.
    pub const fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::InvalidMethod => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
        }
    }

    /// Map a wire value back to a known code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32600 => Some(ErrorCode::InvalidRequest),
            -32601 => Some(ErrorCode::InvalidMethod),
            -32602 => Some(ErrorCode::InvalidParams),
            -32603 => Some(ErrorCode::InternalError),
            _ => None,
        }
    }

    /// Default human readable message for this code.
    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidMethod => "Invalid method",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// Payload of an Error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code. Kept as a raw integer so codes outside
    /// [`ErrorCode`] sent by foreign peers survive decoding.
    pub code: i64,
    /// Human readable description.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Build an error object from a known code.
    pub fn new(code: ErrorCode, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data,
        }
    }

    /// The code as a known [`ErrorCode`], if it is one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

/// A call or a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Version tag.
    pub jsonrpc: Version,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Dot separated method path.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub params: Params,
}

impl Request {
    /// Whether this request expects no reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A reply to a request: either a Result or an Error envelope.
///
/// Well-formed replies carry an id and exactly one of `result` / `error`.
/// Use [`build_result`] and [`build_error`] to construct them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Version tag.
    pub jsonrpc: Version,
    /// Id of the request being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Success value. A present `null` decodes as `Some(Value::Null)`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub result: Option<Value>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Whether this reply reports a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Any message that can travel over a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Call or notification.
    Request(Request),
    /// Result or Error reply.
    Response(Response),
}

impl From<Request> for Envelope {
    fn from(request: Request) -> Self {
        Envelope::Request(request)
    }
}

impl From<Response> for Envelope {
    fn from(response: Response) -> Self {
        Envelope::Response(response)
    }
}

/// Allocates request ids.
///
/// Ids are monotonically increasing, starting from 1. Uses `Cell<u64>` for
/// single-threaded increment. Routers that share one physical channel must
/// share one factory so their ids never collide.
///
/// # Example
///
/// ```rust
/// use jsonrpc_bridge::RequestIdFactory;
///
/// let ids = RequestIdFactory::new();
/// assert_eq!(ids.next().value(), 1);
/// assert_eq!(ids.next().value(), 2);
/// ```
#[derive(Debug)]
pub struct RequestIdFactory {
    next_id: Cell<u64>,
}

impl RequestIdFactory {
    /// Create a factory starting from 1.
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
        }
    }

    /// Allocate the next id.
    pub fn next(&self) -> RequestId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        RequestId::new(id)
    }

    /// Build a request carrying a freshly allocated id.
    pub fn build_request(&self, method: impl Into<String>, params: impl Into<Params>) -> Request {
        build_call(self.next(), method, params)
    }
}

impl Default for RequestIdFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a request with an already allocated id.
pub fn build_call(id: RequestId, method: impl Into<String>, params: impl Into<Params>) -> Request {
    Request {
        jsonrpc: Version,
        id: Some(id),
        method: method.into(),
        params: params.into(),
    }
}

/// Build a notification: a request with no id.
pub fn build_notify(method: impl Into<String>, params: impl Into<Params>) -> Request {
    Request {
        jsonrpc: Version,
        id: None,
        method: method.into(),
        params: params.into(),
    }
}

/// Build a Result reply.
pub fn build_result(id: RequestId, result: Value) -> Response {
    Response {
        jsonrpc: Version,
        id: Some(id),
        result: Some(result),
        error: None,
    }
}

/// Build an Error reply.
pub fn build_error(
    id: RequestId,
    code: ErrorCode,
    message: impl Into<String>,
    data: Option<Value>,
) -> Response {
    Response {
        jsonrpc: Version,
        id: Some(id),
        result: None,
        error: Some(ErrorObject::new(code, message, data)),
    }
}
