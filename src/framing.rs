//! Content-type-aware payload framing.
//!
//! JSON-mode streams flatten a top-level array exactly one level: each
//! element becomes its own frame, and so its own `readSeq` tick. Any other
//! JSON value is one frame. Non-JSON content types are always a single
//! frame of the raw body bytes.

use serde_json::Value;

use crate::types::{normalize_content_type, StoreError};

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub fn is_json(content_type: &str) -> bool {
    normalize_content_type(content_type) == JSON_CONTENT_TYPE
}

/// Split a request body into the frames it should be written as. For
/// JSON-mode streams this validates JSON syntax and rejects an empty
/// top-level array.
pub fn payload_to_frames(content_type: &str, body: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
    if !is_json(content_type) {
        return Ok(vec![body.to_vec()]);
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|err| StoreError::InvalidArgument(format!("invalid JSON body: {err}")))?;

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(StoreError::EmptyArrayNotAllowed);
            }
            items
                .into_iter()
                .map(|item| {
                    serde_json::to_vec(&item).map_err(|err| StoreError::Internal(err.to_string()))
                })
                .collect()
        }
        other => {
            let bytes =
                serde_json::to_vec(&other).map_err(|err| StoreError::Internal(err.to_string()))?;
            Ok(vec![bytes])
        }
    }
}

/// Assemble a read response body from a set of message payloads, given the
/// stream's content type. JSON-mode streams get wrapped and comma-joined;
/// every payload is already exactly one JSON value, so this never needs to
/// re-parse them.
pub fn format_response(content_type: &str, payloads: &[Vec<u8>]) -> Vec<u8> {
    if !is_json(content_type) {
        return payloads.concat();
    }

    let mut out = Vec::with_capacity(payloads.iter().map(|p| p.len() + 1).sum::<usize>() + 2);
    out.push(b'[');
    for (i, payload) in payloads.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(payload);
    }
    out.push(b']');
    out
}
