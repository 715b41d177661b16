//! Text extraction over the gateway's heterogeneous message shapes.

use serde_json::Value;

/// Pull display text out of whatever shape the gateway hands us.
///
/// Total over all inputs and never panics:
/// - a plain string is returned unchanged
/// - an object with an array `content` keeps only `"type": "text"`
///   entries and concatenates their `text` in order (thinking and other
///   block kinds are dropped)
/// - an object with a string `content`, `text`, or `delta` field returns
///   that field
/// - anything else returns `""`
pub fn extract_text(message: &Value) -> String {
    match message {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            if let Some(Value::Array(blocks)) = obj.get("content") {
                return blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect();
            }
            for key in ["content", "text", "delta"] {
                if let Some(Value::String(s)) = obj.get(key) {
                    return s.clone();
                }
            }
            String::new()
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_passes_through() {
        assert_eq!(extract_text(&json!("hello")), "hello");
        assert_eq!(extract_text(&json!("")), "");
    }

    #[test]
    fn content_blocks_keep_text_and_drop_thinking() {
        let message = json!({
            "role": "assistant",
            "content": [
                { "type": "thinking", "thinking": "let me consider" },
                { "type": "text", "text": "Hello" },
                { "type": "tool_use", "name": "search" },
                { "type": "text", "text": " there" }
            ]
        });
        assert_eq!(extract_text(&message), "Hello there");
    }

    #[test]
    fn only_non_text_blocks_yield_empty() {
        let message = json!({
            "content": [{ "type": "thinking", "thinking": "hmm" }]
        });
        assert_eq!(extract_text(&message), "");
    }

    #[test]
    fn string_fields_in_priority_order() {
        assert_eq!(extract_text(&json!({ "content": "from content" })), "from content");
        assert_eq!(extract_text(&json!({ "text": "from text" })), "from text");
        assert_eq!(extract_text(&json!({ "delta": "from delta" })), "from delta");
        // `content` wins over `text`.
        assert_eq!(
            extract_text(&json!({ "content": "a", "text": "b" })),
            "a"
        );
    }

    #[test]
    fn unrecognized_shapes_yield_empty() {
        assert_eq!(extract_text(&Value::Null), "");
        assert_eq!(extract_text(&json!(42)), "");
        assert_eq!(extract_text(&json!(true)), "");
        assert_eq!(extract_text(&json!(["a", "b"])), "");
        assert_eq!(extract_text(&json!({ "content": 42 })), "");
        assert_eq!(extract_text(&json!({ "unrelated": "field" })), "");
    }

    #[test]
    fn malformed_text_blocks_are_skipped() {
        let message = json!({
            "content": [
                { "type": "text" },
                { "type": "text", "text": 42 },
                { "type": "text", "text": "ok" }
            ]
        });
        assert_eq!(extract_text(&message), "ok");
    }
}
