//! Provider request/response types.
//!
//! A provider turns a [`ProviderRequest`] into a [`ProviderResponse`]. Both
//! sides reject unknown fields, and constructors validate the invariants the
//! execution core depends on: exactly one of prompt or messages, non-empty
//! model, non-empty message content.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::JsonMap;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Role of a message in a structured request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRole::System => write!(f, "system"),
            ProviderRole::User => write!(f, "user"),
            ProviderRole::Assistant => write!(f, "assistant"),
            ProviderRole::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for ProviderRole {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(ProviderRole::System),
            "user" => Ok(ProviderRole::User),
            "assistant" => Ok(ProviderRole::Assistant),
            "tool" => Ok(ProviderRole::Tool),
            other => Err(ProviderError::InvalidMessage(format!(
                "invalid message role: '{other}'"
            ))),
        }
    }
}

/// A single message in a structured request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderMessage {
    pub role: ProviderRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ProviderMessage {
    /// Build a message, trimming `content` and rejecting it when empty.
    pub fn new(role: ProviderRole, content: impl Into<String>) -> Result<Self, ProviderError> {
        let content = content.into().trim().to_string();
        if content.is_empty() {
            return Err(ProviderError::InvalidMessage(
                "content must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            role,
            content,
            name: None,
            tool_call_id: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A request to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderRequest {
    pub model: String,
    pub prompt: Option<String>,
    pub messages: Option<Vec<ProviderMessage>>,
    #[serde(default)]
    pub parameters: JsonMap,
    pub seed: Option<i64>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl ProviderRequest {
    /// Build a free-text prompt request.
    pub fn with_prompt(
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::blank(model.into(), Some(prompt.into()), None).validated()
    }

    /// Build a structured message request.
    pub fn with_messages(
        model: impl Into<String>,
        messages: Vec<ProviderMessage>,
    ) -> Result<Self, ProviderError> {
        Self::blank(model.into(), None, Some(messages)).validated()
    }

    fn blank(model: String, prompt: Option<String>, messages: Option<Vec<ProviderMessage>>) -> Self {
        Self {
            model,
            prompt,
            messages,
            parameters: JsonMap::new(),
            seed: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Normalize and check the request.
    ///
    /// Trims `model` and `prompt`, then enforces: model non-empty, prompt
    /// non-empty when given, every message valid, and exactly one of
    /// `prompt` or a non-empty `messages` list.
    pub fn validated(mut self) -> Result<Self, ProviderError> {
        self.model = self.model.trim().to_string();
        if self.model.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "model must be non-empty".to_string(),
            ));
        }

        if let Some(prompt) = self.prompt.take() {
            let trimmed = prompt.trim();
            if trimmed.is_empty() {
                return Err(ProviderError::InvalidRequest(
                    "prompt must be non-empty when provided".to_string(),
                ));
            }
            self.prompt = Some(trimmed.to_string());
        }

        if let Some(messages) = &self.messages {
            for message in messages {
                if message.content.trim().is_empty() {
                    return Err(ProviderError::InvalidMessage(
                        "content must be non-empty".to_string(),
                    ));
                }
            }
        }

        let has_messages = self.messages.as_ref().is_some_and(|m| !m.is_empty());
        match (self.prompt.is_some(), has_messages) {
            (true, true) => Err(ProviderError::InvalidRequest(
                "provide either prompt or messages, not both".to_string(),
            )),
            (false, false) => Err(ProviderError::InvalidRequest(
                "prompt or messages must be provided".to_string(),
            )),
            _ => Ok(self),
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// A provider's answer to a [`ProviderRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderResponse {
    pub model: String,
    pub output_text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<ProviderUsage>,
    #[serde(default)]
    pub raw: JsonMap,
}

impl ProviderResponse {
    /// Build a response; `model` and `output_text` are trimmed and must be non-empty.
    pub fn new(
        model: impl Into<String>,
        output_text: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let model = model.into().trim().to_string();
        let output_text = output_text.into().trim().to_string();
        if model.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "model must be non-empty".to_string(),
            ));
        }
        if output_text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "output_text must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            model,
            output_text,
            finish_reason: None,
            usage: None,
            raw: JsonMap::new(),
        })
    }

    /// Attach the provider's raw payload.
    pub fn with_raw(mut self, raw: JsonMap) -> Self {
        self.raw = raw;
        self
    }
}

/// Convenience for building `raw` payloads from a `json!` literal.
pub fn raw_payload(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from building or executing a provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid provider request: {0}")]
    InvalidRequest(String),

    #[error("invalid provider message: {0}")]
    InvalidMessage(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider call failed: {0}")]
    CallFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_request_is_trimmed() {
        let request = ProviderRequest::with_prompt(" model ", "  hello\n").unwrap();
        assert_eq!(request.model, "model");
        assert_eq!(request.prompt.as_deref(), Some("hello"));
        assert!(request.messages.is_none());
    }

    #[test]
    fn test_request_rejects_blank_model() {
        let err = ProviderRequest::with_prompt("  ", "hi").unwrap_err();
        assert!(err.to_string().contains("model must be non-empty"));
    }

    #[test]
    fn test_request_rejects_blank_prompt() {
        let err = ProviderRequest::with_prompt("m", " \n ").unwrap_err();
        assert!(err.to_string().contains("prompt must be non-empty"));
    }

    #[test]
    fn test_request_requires_prompt_or_messages() {
        let err = ProviderRequest::with_messages("m", vec![]).unwrap_err();
        assert!(err.to_string().contains("prompt or messages must be provided"));
    }

    #[test]
    fn test_request_rejects_both_prompt_and_messages() {
        let mut request = ProviderRequest::with_prompt("m", "hi").unwrap();
        request.messages = Some(vec![ProviderMessage::new(ProviderRole::User, "hi").unwrap()]);
        let err = request.validated().unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_message_requires_content() {
        let err = ProviderMessage::new(ProviderRole::System, "   ").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidMessage(_)));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Tool".parse::<ProviderRole>().unwrap(), ProviderRole::Tool);
        assert_eq!(ProviderRole::Assistant.to_string(), "assistant");
        assert!("robot".parse::<ProviderRole>().is_err());
    }

    #[test]
    fn test_message_rejects_unknown_role_and_fields() {
        let bad_role = serde_json::json!({"role": "robot", "content": "x"});
        assert!(serde_json::from_value::<ProviderMessage>(bad_role).is_err());

        let extra = serde_json::json!({"role": "user", "content": "x", "mood": "happy"});
        assert!(serde_json::from_value::<ProviderMessage>(extra).is_err());
    }

    #[test]
    fn test_response_requires_output_text() {
        let err = ProviderResponse::new("m", "").unwrap_err();
        assert!(err.to_string().contains("output_text"));

        let ok = ProviderResponse::new("m", "{}").unwrap();
        assert!(ok.raw.is_empty());
        assert!(ok.usage.is_none());
    }

    #[test]
    fn test_request_serializes_null_optionals() {
        let request = ProviderRequest::with_prompt("m", "p").unwrap();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"], Value::Null);
        assert_eq!(value["parameters"], serde_json::json!({}));
    }
}
