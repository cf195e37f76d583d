//! Request deserialization for the dispatch loop.
//!
//! Each JSONL line is decoded into a [`Request`]. When a line is valid JSON
//! but not a valid request, the `request_id` is still recovered where
//! possible so the error response can be correlated by the client.

use keel_rpc_types::Request;
use serde_json::Value;

use super::errors::DispatchError;

/// A request line that could not be turned into a [`Request`].
#[derive(Debug)]
pub(crate) struct RejectedLine {
    /// Id recovered from the line, if any.
    pub(crate) request_id: Option<u64>,
    /// Why the line was rejected.
    pub(crate) error: DispatchError,
}

impl RejectedLine {
    fn new(request_id: Option<u64>, error: DispatchError) -> Self {
        Self { request_id, error }
    }
}

/// Parses one JSONL line into a request.
///
/// Surrounding ASCII whitespace (including the newline delimiter) is ignored.
/// Blank lines carry no request and yield `Ok(None)`.
pub(crate) fn parse_request(line: &[u8]) -> Result<Option<Request>, RejectedLine> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(trimmed)
        .map_err(|error| RejectedLine::new(None, DispatchError::from_json_error(error)))?;
    let request_id = value.get("request_id").and_then(Value::as_u64);
    let request: Request = serde_json::from_value(value).map_err(|error| {
        RejectedLine::new(
            request_id,
            DispatchError::invalid_structure(error.to_string()),
        )
    })?;
    validate(&request).map_err(|error| RejectedLine::new(request_id, error))?;
    Ok(Some(request))
}

fn validate(request: &Request) -> Result<(), DispatchError> {
    if request.facade.trim().is_empty() {
        return Err(DispatchError::invalid_structure("facade field is empty"));
    }
    if request.method.trim().is_empty() {
        return Err(DispatchError::invalid_structure("method field is empty"));
    }
    Ok(())
}
