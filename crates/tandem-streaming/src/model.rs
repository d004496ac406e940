//! Model encoding for value and resolution payloads.
//!
//! Trees are encoded as JSON with a handful of tagged tuples:
//!
//! | model                | JSON                              |
//! |----------------------|-----------------------------------|
//! | text                 | `"text"` (leading `$` doubled)    |
//! | reference to frame n | `"$n"`                            |
//! | element              | `["$", tag, props, [children]]`   |
//! | segment              | `["$S", key, child]`              |
//! | fragment             | `["$F", [children]]`              |
//! | data                 | `["$D", value]`                   |

use serde_json::{json, Value};
use tandem_core::Props;

use crate::frame::FrameId;

/// Decoded form of a payload model.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    Text(String),
    Data(Value),
    Ref(FrameId),
    Element {
        tag: String,
        props: Props,
        children: Vec<Model>,
    },
    Fragment(Vec<Model>),
    Segment {
        key: String,
        child: Box<Model>,
    },
}

/// A payload that is not a valid model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid model: {0}")]
pub struct ModelError(pub String);

impl Model {
    /// Encode to JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(escape(text)),
            Self::Data(value) => json!(["$D", value]),
            Self::Ref(id) => Value::String(format!("${}", id)),
            Self::Element {
                tag,
                props,
                children,
            } => json!([
                "$",
                tag,
                Value::Object(props.clone()),
                children.iter().map(Model::to_json).collect::<Vec<_>>()
            ]),
            Self::Fragment(children) => {
                json!(["$F", children.iter().map(Model::to_json).collect::<Vec<_>>()])
            }
            Self::Segment { key, child } => json!(["$S", key, child.to_json()]),
        }
    }

    /// Decode from JSON.
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        match value {
            Value::String(s) => decode_string(s),
            Value::Array(items) => decode_tuple(items),
            other => Err(ModelError(format!("untagged value {}", other))),
        }
    }

    /// Frame ids referenced anywhere in this model, in encounter order.
    pub fn references(&self) -> Vec<FrameId> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<FrameId>) {
        match self {
            Self::Ref(id) => out.push(*id),
            Self::Element { children, .. } | Self::Fragment(children) => {
                children.iter().for_each(|c| c.collect_references(out))
            }
            Self::Segment { child, .. } => child.collect_references(out),
            Self::Text(_) | Self::Data(_) => {}
        }
    }
}

/// Double a leading `$` so user text never reads as a reference.
pub fn escape(text: &str) -> String {
    if text.starts_with('$') {
        format!("${}", text)
    } else {
        text.to_string()
    }
}

fn decode_string(s: &str) -> Result<Model, ModelError> {
    if let Some(escaped) = s.strip_prefix("$$") {
        return Ok(Model::Text(format!("${}", escaped)));
    }
    match s.strip_prefix('$') {
        Some(id) => id
            .parse::<u32>()
            .map(|id| Model::Ref(FrameId(id)))
            .map_err(|_| ModelError(format!("bad reference {:?}", s))),
        None => Ok(Model::Text(s.to_string())),
    }
}

fn decode_tuple(items: &[Value]) -> Result<Model, ModelError> {
    let tag = items
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError("tuple without tag".into()))?;

    match (tag, items.len()) {
        ("$", 4) => {
            let name = items[1]
                .as_str()
                .ok_or_else(|| ModelError("element tag must be a string".into()))?;
            let props = items[2]
                .as_object()
                .cloned()
                .ok_or_else(|| ModelError("element props must be an object".into()))?;
            Ok(Model::Element {
                tag: name.to_string(),
                props,
                children: decode_children(&items[3])?,
            })
        }
        ("$S", 3) => {
            let key = items[1]
                .as_str()
                .ok_or_else(|| ModelError("segment key must be a string".into()))?;
            Ok(Model::Segment {
                key: key.to_string(),
                child: Box::new(Model::from_json(&items[2])?),
            })
        }
        ("$F", 2) => Ok(Model::Fragment(decode_children(&items[1])?)),
        ("$D", 2) => Ok(Model::Data(items[1].clone())),
        (tag, len) => Err(ModelError(format!("unknown tuple {:?} of length {}", tag, len))),
    }
}

fn decode_children(value: &Value) -> Result<Vec<Model>, ModelError> {
    value
        .as_array()
        .ok_or_else(|| ModelError("children must be an array".into()))?
        .iter()
        .map(Model::from_json)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollar_text_is_escaped() {
        let model = Model::Text("$5 off".into());
        assert_eq!(model.to_json(), json!("$$5 off"));
        assert_eq!(Model::from_json(&json!("$$5 off")).unwrap(), model);
    }

    #[test]
    fn test_reference_string() {
        assert_eq!(Model::from_json(&json!("$12")).unwrap(), Model::Ref(FrameId(12)));
        assert!(Model::from_json(&json!("$abc")).is_err());
    }

    #[test]
    fn test_element_encoding() {
        let mut props = Props::new();
        props.insert("class".into(), json!("card"));
        let model = Model::Element {
            tag: "div".into(),
            props,
            children: vec![Model::Text("A".into()), Model::Ref(FrameId(1))],
        };

        let encoded = model.to_json();
        assert_eq!(encoded, json!(["$", "div", {"class": "card"}, ["A", "$1"]]));
        assert_eq!(Model::from_json(&encoded).unwrap(), model);
        assert_eq!(model.references(), vec![FrameId(1)]);
    }

    #[test]
    fn test_data_arrays_are_not_elements() {
        let model = Model::Data(json!(["$", "div"]));
        let encoded = model.to_json();
        assert_eq!(Model::from_json(&encoded).unwrap(), model);
    }

    #[test]
    fn test_segment_and_fragment() {
        let model = Model::Segment {
            key: "page:/".into(),
            child: Box::new(Model::Fragment(vec![
                Model::Ref(FrameId(2)),
                Model::Ref(FrameId(3)),
            ])),
        };
        let decoded = Model::from_json(&model.to_json()).unwrap();
        assert_eq!(decoded, model);
        assert_eq!(decoded.references(), vec![FrameId(2), FrameId(3)]);
    }

    #[test]
    fn test_malformed_models() {
        assert!(Model::from_json(&json!(42)).is_err());
        assert!(Model::from_json(&json!(["$", "div"])).is_err());
        assert!(Model::from_json(&json!(["$X", 1])).is_err());
        assert!(Model::from_json(&json!(["$", "div", [], []])).is_err());
    }
}
