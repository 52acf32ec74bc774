//! Error types for the bridge.

use serde_json::Value;
use thiserror::Error;

use crate::envelope::{build_error, ErrorCode, ErrorObject, RequestId, Response};

/// Why a call did not produce a value.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The peer answered with an Error envelope.
    ///
    /// Displays as the remote message verbatim, e.g. `Invalid method`.
    #[error("{}", .0.message)]
    Remote(ErrorObject),

    /// No reply arrived within the configured timeout.
    ///
    /// Synthesized locally, never sent over the wire.
    #[error("Timeout [{id}]")]
    Timeout {
        /// Id of the request that timed out.
        id: RequestId,
    },

    /// The channel refused the request.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The router went away while the call was in flight.
    #[error("Call canceled")]
    Canceled,

    /// The result could not be decoded into the requested type.
    #[error("Result decoding failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RpcError {
    /// Wire error code, for errors that came from the peer.
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Remote(error) => Some(error.code),
            _ => None,
        }
    }

    /// Whether this is a local timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}

/// Failure of a registered callable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MethodError {
    /// Arguments could not be decoded. Replied with `INVALID_PARAMS`.
    #[error("{0}")]
    InvalidParams(String),

    /// A sibling path given to [`Branch::call`](crate::namespace::Branch::call)
    /// did not resolve. Replied with `INVALID_METHOD`.
    #[error("Invalid method")]
    InvalidMethod(String),

    /// The callable failed. Replied with `INTERNAL_ERROR`.
    #[error("{message}")]
    Failed {
        /// Description sent back as the error message.
        message: String,
        /// Optional structured details.
        data: Option<Value>,
    },
}

impl MethodError {
    /// A failure with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        MethodError::Failed {
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured details. Ignored for [`MethodError::InvalidParams`].
    pub fn with_data(self, data: Value) -> Self {
        match self {
            MethodError::Failed { message, .. } => MethodError::Failed {
                message,
                data: Some(data),
            },
            other => other,
        }
    }

    /// The code this failure is reported with.
    pub fn code(&self) -> ErrorCode {
        match self {
            MethodError::InvalidParams(_) => ErrorCode::InvalidParams,
            MethodError::InvalidMethod(_) => ErrorCode::InvalidMethod,
            MethodError::Failed { .. } => ErrorCode::InternalError,
        }
    }

    /// Convert into the Error envelope answering request `id`.
    pub fn into_response(self, id: RequestId) -> Response {
        let code = self.code();
        match self {
            MethodError::InvalidParams(message) => build_error(id, code, message, None),
            MethodError::InvalidMethod(_) => build_error(id, code, code.message(), None),
            MethodError::Failed { message, data } => build_error(id, code, message, data),
        }
    }
}

impl From<String> for MethodError {
    fn from(message: String) -> Self {
        MethodError::new(message)
    }
}

impl From<&str> for MethodError {
    fn from(message: &str) -> Self {
        MethodError::new(message)
    }
}

impl From<serde_json::Error> for MethodError {
    fn from(err: serde_json::Error) -> Self {
        MethodError::new(err.to_string())
    }
}

/// Errors from module registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A top-level module with this name exists already.
    #[error("Module [{0}] already registered")]
    AlreadyRegistered(String),

    /// Module names must not be empty.
    #[error("Module name cannot be empty")]
    EmptyName,
}

/// Errors raised by a channel when handing it an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The transport is gone.
    #[error("channel closed")]
    Closed,

    /// The envelope could not be encoded for the wire.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Input that could not be decoded into an envelope.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct DecodeError {
    /// `ParseError` or `InvalidRequest`.
    pub code: ErrorCode,
    /// Id recovered from the input, if any.
    pub id: Option<RequestId>,
    /// Decoder diagnostics.
    pub message: String,
    /// Whether the input carried a `method` member, i.e. was meant as a
    /// request. Only such input is ever answered.
    pub request: bool,
}

impl DecodeError {
    /// Create a decode error for input of unknown or reply shape.
    pub fn new(code: ErrorCode, id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self {
            code,
            id,
            message: message.into(),
            request: false,
        }
    }

    /// Mark the input as request-shaped.
    pub fn in_request(mut self) -> Self {
        self.request = true;
        self
    }

    /// The Error envelope to send back.
    ///
    /// `None` unless the input was a request carrying an id: replies and
    /// anonymous input are never answered.
    pub fn to_response(&self) -> Option<Response> {
        if !self.request {
            return None;
        }
        self.id
            .map(|id| build_error(id, self.code, self.code.message(), None))
    }
}
