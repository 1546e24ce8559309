//! Properties-format rendering

use meridian_types::ConfigDocument;
use serde_json::Value;

/// Render the resolved view of a document as sorted `key=value` lines
pub fn to_properties(document: &ConfigDocument) -> String {
    let mut out = String::new();
    for (key, value) in document.resolved() {
        out.push_str(&key);
        out.push('=');
        out.push_str(&render_value(&value));
        out.push('\n');
    }
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.replace('\\', "\\\\").replace('\n', "\\n"),
        other => other.to_string(),
    }
}
