//! HTML serialization helpers for the SSR pass.

use serde_json::Value;
use tandem_core::Props;
use tandem_streaming::escape_html;

/// Elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Render element attributes.
///
/// `true` renders a bare attribute; `false` and `null` are omitted.
pub fn render_attributes(props: &Props) -> String {
    let mut out = String::new();
    for (name, value) in props {
        match value {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => {
                out.push(' ');
                out.push_str(&escape_html(name));
            }
            Value::String(s) => {
                out.push_str(&format!(" {}=\"{}\"", escape_html(name), escape_html(s)));
            }
            other => {
                out.push_str(&format!(
                    " {}=\"{}\"",
                    escape_html(name),
                    escape_html(&other.to_string())
                ));
            }
        }
    }
    out
}

/// Text for a data node.
pub fn render_data(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => escape_html(s),
        other => escape_html(&other.to_string()),
    }
}

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}
