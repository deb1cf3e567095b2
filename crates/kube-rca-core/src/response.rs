//! Normalization of inference responses.
//!
//! Inference endpoints answer in several shapes (OpenAI chat, classic
//! completions, streamed deltas, Ollama-style `response`, bare strings).
//! [`LlmResponse::classify`] resolves a raw JSON value to the first shape
//! that structurally applies; [`extract_llm_text`] always produces text.

use serde_json::Value;

/// Known response shapes, in resolution order.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmResponse<'a> {
    /// `choices[0].message.content`
    ChatMessage(&'a str),
    /// `choices[0].text`, when non-empty
    CompletionText(&'a str),
    /// `choices[0].delta.content`
    StreamDelta(&'a str),
    /// top-level `content` string
    Content(&'a str),
    /// top-level `response` string
    Response(&'a str),
    /// the value itself is a string
    Plain(&'a str),
    /// anything else
    Unrecognized(&'a Value),
}

impl<'a> LlmResponse<'a> {
    pub fn classify(raw: &'a Value) -> Self {
        if let Some(choice) = raw
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        {
            if let Some(s) = choice.pointer("/message/content").and_then(Value::as_str) {
                return LlmResponse::ChatMessage(s);
            }
            if let Some(s) = choice
                .get("text")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
            {
                return LlmResponse::CompletionText(s);
            }
            if let Some(s) = choice.pointer("/delta/content").and_then(Value::as_str) {
                return LlmResponse::StreamDelta(s);
            }
        }
        if let Some(s) = raw.get("content").and_then(Value::as_str) {
            return LlmResponse::Content(s);
        }
        if let Some(s) = raw.get("response").and_then(Value::as_str) {
            return LlmResponse::Response(s);
        }
        if let Some(s) = raw.as_str() {
            return LlmResponse::Plain(s);
        }
        LlmResponse::Unrecognized(raw)
    }

    pub fn into_text(self) -> String {
        match self {
            LlmResponse::ChatMessage(s)
            | LlmResponse::CompletionText(s)
            | LlmResponse::StreamDelta(s)
            | LlmResponse::Content(s)
            | LlmResponse::Response(s)
            | LlmResponse::Plain(s) => s.to_string(),
            LlmResponse::Unrecognized(v) => {
                serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            }
        }
    }
}

/// Extract the model's text from any supported response shape.
///
/// Never fails; unknown shapes are returned as a pretty-printed JSON dump.
///
/// ```rust
/// use kube_rca_core::response::extract_llm_text;
/// use serde_json::json;
///
/// let raw = json!({"choices": [{"message": {"content": "restart the pod"}}]});
/// assert_eq!(extract_llm_text(&raw), "restart the pod");
/// ```
pub fn extract_llm_text(raw: &Value) -> String {
    LlmResponse::classify(raw).into_text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_shapes_yield_the_text() {
        let shapes = [
            json!({"choices": [{"message": {"role": "assistant", "content": "X"}}]}),
            json!({"choices": [{"text": "X"}]}),
            json!({"choices": [{"delta": {"content": "X"}}]}),
            json!({"content": "X"}),
            json!({"response": "X", "done": true}),
            json!("X"),
        ];
        for raw in &shapes {
            assert_eq!(extract_llm_text(raw), "X", "shape: {raw}");
        }
    }

    #[test]
    fn unrecognized_shape_is_dumped() {
        let raw = json!({"foo": "bar"});
        let text = extract_llm_text(&raw);
        assert!(!text.is_empty());
        assert!(text.contains("\"foo\""));
        assert!(matches!(
            LlmResponse::classify(&raw),
            LlmResponse::Unrecognized(_)
        ));
    }

    #[test]
    fn resolution_order_prefers_message_over_text() {
        let raw = json!({"choices": [{"message": {"content": "chat"}, "text": "completion"}]});
        assert_eq!(LlmResponse::classify(&raw), LlmResponse::ChatMessage("chat"));
    }

    #[test]
    fn empty_completion_text_falls_through() {
        let raw = json!({"choices": [{"text": "", "delta": {"content": "streamed"}}]});
        assert_eq!(LlmResponse::classify(&raw), LlmResponse::StreamDelta("streamed"));
    }

    #[test]
    fn empty_choices_fall_through_to_top_level() {
        let raw = json!({"choices": [], "content": "top"});
        assert_eq!(extract_llm_text(&raw), "top");
    }

    #[test]
    fn empty_message_content_is_returned_as_empty() {
        let raw = json!({"choices": [{"message": {"content": ""}}]});
        assert_eq!(extract_llm_text(&raw), "");
    }
}
