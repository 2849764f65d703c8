//! Canonical rich-text document trees.
//!
//! Descriptions and comment bodies are stored as a structured document tree
//! (`{"type": "doc", "version": 1, "content": [...]}`). Plain strings are
//! wrapped, null collapses to the empty document, and already-structured
//! trees pass through untouched.

use serde_json::{json, Value};

/// The deterministic fallback for null/absent input.
pub fn empty_doc() -> Value {
    json!({
        "type": "doc",
        "version": 1,
        "content": []
    })
}

/// Wrap a plain string into a single-paragraph document.
pub fn from_text(text: &str) -> Value {
    if text.is_empty() {
        return empty_doc();
    }
    json!({
        "type": "doc",
        "version": 1,
        "content": [
            {
                "type": "paragraph",
                "content": [
                    {"type": "text", "text": text}
                ]
            }
        ]
    })
}

/// Normalize arbitrary input into a canonical document tree.
pub fn normalize(input: Option<&Value>) -> Value {
    match input {
        None | Some(Value::Null) => empty_doc(),
        Some(Value::String(text)) => from_text(text),
        Some(other) => other.clone(),
    }
}

/// Best-effort plain-text extraction, concatenating every `text` node.
pub fn plain_text(doc: &Value) -> String {
    let mut out = String::new();
    collect_text(doc, &mut out);
    out
}

fn collect_text(node: &Value, out: &mut String) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
            if let Some(Value::Array(children)) = map.get("content") {
                for child in children {
                    collect_text(child, out);
                }
            }
        }
        Value::Array(children) => {
            for child in children {
                collect_text(child, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_null_is_empty_doc() {
        assert_eq!(normalize(None), empty_doc());
        assert_eq!(normalize(Some(&Value::Null)), empty_doc());
    }

    #[test]
    fn test_normalize_wraps_plain_string() {
        let doc = normalize(Some(&json!("fix the login flow")));
        assert_eq!(doc["type"], "doc");
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["content"][0]["type"], "paragraph");
        assert_eq!(
            doc["content"][0]["content"][0]["text"],
            "fix the login flow"
        );
    }

    #[test]
    fn test_normalize_passes_structured_tree_through() {
        let tree = json!({
            "type": "doc",
            "version": 1,
            "content": [{"type": "paragraph", "content": [{"type": "text", "text": "hi"}]}]
        });
        assert_eq!(normalize(Some(&tree)), tree);
    }

    #[test]
    fn test_plain_text_walks_nested_content() {
        let doc = from_text("hello world");
        assert_eq!(plain_text(&doc), "hello world");

        let multi = json!({
            "type": "doc",
            "version": 1,
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "first"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "second"}]}
            ]
        });
        assert_eq!(plain_text(&multi), "first second");
    }
}
