//! Wire types for the chat completion endpoint.
//!
//! Only the fields the engine relies on are modelled. Everything on the
//! response side is optional so a short or odd payload deserializes and is
//! rejected by the caller instead of failing to parse.

use crate::{MessageContent, Role};
use serde::{Deserialize, Serialize};

/// One role-tagged message in an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

/// Error object some providers return alongside a failure status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body of a completion call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub error: Option<ProviderErrorBody>,
}

impl CompletionResponse {
    /// Text of the first choice's message, if the provider sent one.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_text_present() {
        let resp: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        }))
        .unwrap();
        assert_eq!(resp.first_text(), Some("hello"));
    }

    #[test]
    fn test_first_text_missing_fields() {
        let resp: CompletionResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(resp.first_text(), None);

        let resp: CompletionResponse =
            serde_json::from_value(json!({"choices": [{"message": {}}]})).unwrap();
        assert_eq!(resp.first_text(), None);
    }

    #[test]
    fn test_request_omits_unset_parameters() {
        let req = CompletionRequest {
            model: "m".to_string(),
            messages: vec![WireMessage {
                role: Role::System,
                content: MessageContent::Text("be brief".to_string()),
            }],
            temperature: None,
            max_tokens: Some(10),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("temperature").is_none());
        assert_eq!(value["max_tokens"], 10);
        assert_eq!(value["messages"][0]["role"], "system");
    }
}
