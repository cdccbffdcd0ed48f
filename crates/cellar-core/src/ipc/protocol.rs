//! Envelope types exchanged between the host gateway and a worker.
//!
//! Requests are `{"id": "...", "src": "..."}`. Responses carry the echoed id
//! and exactly one of `res` (the value, `null` for void) or `error`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A message on the channel. Kept as raw JSON so malformed messages can be
/// rejected without disturbing the worker.
pub type Envelope = serde_json::Value;

/// Caller-assigned request identifier, unique for the lifetime of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A snippet submitted for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub id: RequestId,
    #[serde(rename = "src")]
    pub source: String,
}

impl ExecutionRequest {
    pub fn new(id: RequestId, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
        }
    }

    /// Validate and decode a request envelope.
    ///
    /// The error keeps the id whenever one could be recovered, so the worker can
    /// still answer the caller.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let serde_json::Value::Object(mut fields) = envelope else {
            return Err(ProtocolError::new(None, "message is not a JSON object"));
        };
        let id = match fields.remove("id") {
            Some(serde_json::Value::String(id)) if !id.is_empty() => RequestId(id),
            Some(serde_json::Value::String(_)) => {
                return Err(ProtocolError::new(None, "`id` must not be empty"));
            }
            Some(_) => return Err(ProtocolError::new(None, "`id` must be a string")),
            None => return Err(ProtocolError::new(None, "missing `id`")),
        };
        match fields.remove("src") {
            Some(serde_json::Value::String(source)) => Ok(Self { id, source }),
            Some(_) => Err(ProtocolError::new(Some(id), "`src` must be a string")),
            None => Err(ProtocolError::new(Some(id), "missing `src`")),
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        serde_json::json!({ "id": self.id, "src": self.source })
    }
}

/// Result of a request: a JSON value or an error description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "res")]
    Value(serde_json::Value),
    #[serde(rename = "error")]
    Error(String),
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn into_result(self) -> Result<serde_json::Value, String> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Error(message) => Err(message),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(serde_json::Value::Null) => Ok(()),
            Outcome::Value(serde_json::Value::String(s)) => f.write_str(s),
            Outcome::Value(value) => write!(f, "{value}"),
            Outcome::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// The worker's answer to one request, echoing its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn value(id: RequestId, value: serde_json::Value) -> Self {
        Self {
            id,
            outcome: Outcome::Value(value),
        }
    }

    pub fn error(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Error(message.into()),
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        serde_json::from_value(envelope)
            .map_err(|e| ProtocolError::new(None, format!("malformed response: {e}")))
    }

    pub fn to_envelope(&self) -> Envelope {
        match &self.outcome {
            Outcome::Value(value) => serde_json::json!({ "id": self.id, "res": value }),
            Outcome::Error(message) => serde_json::json!({ "id": self.id, "error": message }),
        }
    }
}

/// A malformed or uncorrelated message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ProtocolError {
    /// The request id, if one could be recovered.
    pub id: Option<RequestId>,
    pub reason: String,
}

impl ProtocolError {
    pub fn new(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope() {
        let request = ExecutionRequest::new(RequestId::new("7"), "x + 1");
        assert_eq!(request.to_envelope(), json!({ "id": "7", "src": "x + 1" }));
        assert_eq!(
            ExecutionRequest::from_envelope(request.to_envelope()).unwrap(),
            request
        );
    }

    #[test]
    fn test_rejections_keep_recoverable_id() {
        let missing_src = ExecutionRequest::from_envelope(json!({ "id": "a" })).unwrap_err();
        assert_eq!(missing_src.id, Some(RequestId::new("a")));

        for envelope in [json!("x"), json!({ "src": "1" }), json!({ "id": 3, "src": "1" }), json!({ "id": "", "src": "1" })] {
            let err = ExecutionRequest::from_envelope(envelope.clone()).unwrap_err();
            assert_eq!(err.id, None, "{envelope}");
        }
    }

    #[test]
    fn test_response_has_exactly_one_payload_key() {
        let void = ExecutionResult::value(RequestId::new("1"), serde_json::Value::Null);
        assert_eq!(void.to_envelope(), json!({ "id": "1", "res": null }));
        assert_eq!(serde_json::to_value(&void).unwrap(), void.to_envelope());

        let failed = ExecutionResult::error(RequestId::new("2"), "ZeroDivisionError: division by zero");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "id": "2", "error": "ZeroDivisionError: division by zero" })
        );
    }

    #[test]
    fn test_response_decoding() {
        let decoded = ExecutionResult::from_envelope(json!({ "id": "9", "res": 6 })).unwrap();
        assert_eq!(decoded.outcome, Outcome::Value(json!(6)));
        let decoded = ExecutionResult::from_envelope(json!({ "id": "9", "error": "boom" })).unwrap();
        assert!(decoded.outcome.is_error());
        assert!(ExecutionResult::from_envelope(json!({ "res": 6 })).is_err());
        assert!(ExecutionResult::from_envelope(json!({ "id": "9" })).is_err());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Value(serde_json::Value::Null).to_string(), "");
        assert_eq!(Outcome::Value(json!("hi")).to_string(), "hi");
        assert_eq!(Outcome::Value(json!([1, 2])).to_string(), "[1,2]");
        assert_eq!(Outcome::Error("bad".into()).to_string(), "error: bad");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }
}
