//! Frame types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_registry::{ModuleId, ModuleReference};

use crate::error::StreamError;

/// Identifier of a frame within one stream.
///
/// Frame `0` always carries the root model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Id of the root value frame.
    pub const ROOT: FrameId = FrameId(0);

    /// Raw id.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// An encoded model, possibly referencing earlier frames.
    Value,
    /// A client module reference or a pending placeholder.
    Reference,
    /// The value of a previously pending reference.
    Resolution,
    /// A subtree error attached to a pending reference.
    Error,
    /// Terminates the stream.
    End,
}

impl FrameKind {
    /// Lowercase name as written on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Reference => "reference",
            Self::Resolution => "resolution",
            Self::Error => "error",
            Self::End => "end",
        }
    }
}

/// One unit of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Frame {
    /// Value frame carrying an encoded model.
    pub fn value(id: FrameId, model: Value) -> Self {
        Self {
            id,
            kind: FrameKind::Value,
            payload: model,
        }
    }

    /// Reference frame for a client module with its props.
    pub fn module(id: FrameId, module: &ModuleReference, props: Value) -> Self {
        Self::reference(id, Reference::Module(ModulePayload::new(module, props)))
    }

    /// Reference frame standing in for a subtree that has not resolved yet.
    pub fn pending(id: FrameId) -> Self {
        Self::reference(id, Reference::Pending)
    }

    fn reference(id: FrameId, reference: Reference) -> Self {
        Self {
            id,
            kind: FrameKind::Reference,
            payload: reference.to_value(),
        }
    }

    /// Resolution of a pending reference.
    pub fn resolution(id: FrameId, model: Value) -> Self {
        Self {
            id,
            kind: FrameKind::Resolution,
            payload: model,
        }
    }

    /// Error attached to a pending reference.
    pub fn error(id: FrameId, error: ErrorPayload) -> Self {
        Self {
            id,
            kind: FrameKind::Error,
            payload: serde_json::to_value(error).unwrap_or(Value::Null),
        }
    }

    /// Terminating marker. `frames` is the number of frames before it.
    pub fn end(frames: u32) -> Self {
        Self {
            id: FrameId(frames),
            kind: FrameKind::End,
            payload: Value::Null,
        }
    }

    /// Parse the payload of a reference frame.
    pub fn as_reference(&self) -> Result<Reference, StreamError> {
        self.expect_kind(FrameKind::Reference)?;
        Reference::from_value(&self.payload).map_err(|message| self.invalid(message))
    }

    /// Parse the payload of an error frame.
    pub fn as_error(&self) -> Result<ErrorPayload, StreamError> {
        self.expect_kind(FrameKind::Error)?;
        serde_json::from_value(self.payload.clone()).map_err(|e| self.invalid(e.to_string()))
    }

    /// Whether this frame terminates the stream.
    pub fn is_end(&self) -> bool {
        self.kind == FrameKind::End
    }

    fn expect_kind(&self, kind: FrameKind) -> Result<(), StreamError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(self.invalid(format!("expected {} frame", kind.as_str())))
        }
    }

    fn invalid(&self, message: impl Into<String>) -> StreamError {
        StreamError::InvalidPayload {
            id: self.id,
            kind: self.kind.as_str(),
            message: message.into(),
        }
    }
}

/// Payload of a `reference` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A client module to load, with the props to hand it.
    Module(ModulePayload),
    /// A subtree whose value arrives later in a `resolution` frame.
    Pending,
}

impl Reference {
    /// Encode as a JSON payload.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Module(module) => serde_json::to_value(module).unwrap_or(Value::Null),
            Self::Pending => serde_json::json!({ "pending": true }),
        }
    }

    /// Decode a JSON payload.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        if value.get("pending").and_then(Value::as_bool) == Some(true) {
            return Ok(Self::Pending);
        }
        serde_json::from_value(value.clone())
            .map(Self::Module)
            .map_err(|e| e.to_string())
    }
}

/// A client module reference as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulePayload {
    pub id: ModuleId,
    pub export_name: String,
    #[serde(default)]
    pub chunk_ids: Vec<String>,
    #[serde(default)]
    pub props: Value,
}

impl ModulePayload {
    pub fn new(module: &ModuleReference, props: Value) -> Self {
        Self {
            id: module.id.clone(),
            export_name: module.export_name.clone(),
            chunk_ids: module.chunk_ids.clone(),
            props,
        }
    }

    /// The module reference without props.
    pub fn reference(&self) -> ModuleReference {
        ModuleReference {
            id: self.id.clone(),
            export_name: self.export_name.clone(),
            chunk_ids: self.chunk_ids.clone(),
        }
    }
}

/// Payload of an `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    /// Name of the failing component, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            component: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}
