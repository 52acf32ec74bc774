//! JSON text encoding for envelopes.
//!
//! Channels that move text (sockets, pipes, message ports carrying strings)
//! use [`encode`] and [`decode`]. Decoding classifies bad input so a
//! callee can answer with the matching protocol error:
//!
//! - not JSON at all: [`ErrorCode::ParseError`], no id;
//! - JSON that is not a valid envelope: [`ErrorCode::InvalidRequest`], with
//!   the id when the object carried an integer one.
//!
//! Only a malformed request (an object with a `method` member) is marked
//! [`DecodeError::request`]; a malformed reply must be logged and dropped,
//! never answered.

use serde_json::Value;

use crate::envelope::{Envelope, ErrorCode, Request, RequestId, Response};
use crate::error::DecodeError;

/// Encode an envelope as a single line of JSON.
pub fn encode(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

/// Decode one JSON document into an envelope.
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| DecodeError::new(ErrorCode::ParseError, None, e.to_string()))?;
    decode_value(value)
}

/// Classify an already parsed JSON value.
///
/// Objects with a `method` member are requests, everything else must be a
/// reply carrying exactly one of `result` or `error`.
pub fn decode_value(value: Value) -> Result<Envelope, DecodeError> {
    let id = value.get("id").and_then(Value::as_u64).map(RequestId::new);
    let invalid = |message: String| DecodeError::new(ErrorCode::InvalidRequest, id, message);

    if !value.is_object() {
        return Err(invalid("envelope is not an object".to_string()));
    }

    if value.get("method").is_some() {
        return serde_json::from_value::<Request>(value)
            .map(Envelope::Request)
            .map_err(|e| invalid(e.to_string()).in_request());
    }

    let response: Response = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
    if response.result.is_some() == response.error.is_some() {
        return Err(invalid(
            "reply must carry exactly one of result or error".to_string(),
        ));
    }
    Ok(Envelope::Response(response))
}
