//! Request and response bodies of the action endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tandem_streaming::Frame;

use crate::error::ActionError;

/// Body of an action call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub reference_id: String,
    /// Serialized argument list.
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Array(Vec::new())
}

impl ActionRequest {
    pub fn new(reference_id: impl Into<String>, args: Value) -> Self {
        Self {
            reference_id: reference_id.into(),
            args,
        }
    }

    /// Parse a JSON request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ActionError> {
        let request: Self = serde_json::from_slice(body).map_err(|e| ActionError::BadRequest(e.to_string()))?;
        if request.reference_id.is_empty() {
            return Err(ActionError::BadRequest("empty referenceId".into()));
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Value,
    Redirect,
    Rerender,
    Error,
}

/// Outcome of an action call as sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub kind: EnvelopeKind,
    pub payload: Value,
    #[serde(skip, default = "ok_status")]
    status: u16,
}

fn ok_status() -> u16 {
    200
}

impl ActionEnvelope {
    pub fn value(value: Value) -> Self {
        Self {
            kind: EnvelopeKind::Value,
            payload: value,
            status: 200,
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Redirect,
            payload: Value::String(location.into()),
            status: 303,
        }
    }

    /// The complete frame stream of a fresh render.
    pub fn rerender(frames: &[Frame]) -> Self {
        Self {
            kind: EnvelopeKind::Rerender,
            payload: serde_json::to_value(frames).unwrap_or_else(|_| Value::Array(Vec::new())),
            status: 200,
        }
    }

    pub fn error(err: &ActionError) -> Self {
        Self {
            kind: EnvelopeKind::Error,
            payload: json!({
                "code": err.code(),
                "message": err.public_message(),
            }),
            status: err.status(),
        }
    }

    /// HTTP status to answer with.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.kind == EnvelopeKind::Error
    }

    /// Redirect target, for `redirect` envelopes.
    pub fn location(&self) -> Option<&str> {
        match self.kind {
            EnvelopeKind::Redirect => self.payload.as_str(),
            _ => None,
        }
    }

    /// Frames of a `rerender` envelope.
    pub fn frames(&self) -> Option<Vec<Frame>> {
        match self.kind {
            EnvelopeKind::Rerender => serde_json::from_value(self.payload.clone()).ok(),
            _ => None,
        }
    }

    /// Error code of an `error` envelope.
    pub fn error_code(&self) -> Option<&str> {
        match self.kind {
            EnvelopeKind::Error => self.payload.get("code").and_then(Value::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_streaming::FrameId;

    #[test]
    fn test_request_parsing() {
        let request = ActionRequest::from_slice(br#"{"referenceId": "actions#increment", "args": [5]}"#).unwrap();
        assert_eq!(request, ActionRequest::new("actions#increment", json!([5])));

        let no_args = ActionRequest::from_slice(br#"{"referenceId": "actions#ping"}"#).unwrap();
        assert_eq!(no_args.args, json!([]));
    }

    #[test]
    fn test_bad_request_bodies() {
        assert!(matches!(
            ActionRequest::from_slice(b"not json"),
            Err(ActionError::BadRequest(_))
        ));
        assert!(matches!(
            ActionRequest::from_slice(br#"{"args": []}"#),
            Err(ActionError::BadRequest(_))
        ));
        assert!(matches!(
            ActionRequest::from_slice(br#"{"referenceId": ""}"#),
            Err(ActionError::BadRequest(_))
        ));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = ActionEnvelope::value(json!(6));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"kind": "value", "payload": 6})
        );

        let redirect = ActionEnvelope::redirect("/cart");
        assert_eq!(redirect.status(), 303);
        assert_eq!(redirect.location(), Some("/cart"));
    }

    #[test]
    fn test_rerender_frames() {
        let frames = vec![Frame::value(FrameId(0), json!("hi")), Frame::end(1)];
        let envelope = ActionEnvelope::rerender(&frames);
        assert_eq!(envelope.frames(), Some(frames));
        assert_eq!(envelope.location(), None);
    }
}
