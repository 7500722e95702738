//! Deterministic in-memory provider.
//!
//! `MockProvider` answers from a fixed table keyed by the request's content,
//! so a workflow with llm steps can be run (and re-run) without a network
//! backend.

use std::collections::HashMap;

use llmflow_types::llm::{
    ProviderError, ProviderRequest, ProviderResponse, raw_payload,
};
use serde_json::json;

use super::provider::Provider;

/// Output returned by a non-strict mock with no matching entry.
const EMPTY_OBJECT: &str = "{}";

/// Provider that replays canned responses.
///
/// Lookup order: exact request key, then `default_output`, then an error
/// (strict) or `{}` (non-strict).
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: HashMap<String, String>,
    default_output: Option<String>,
    strict: bool,
}

impl MockProvider {
    /// A strict mock with no canned responses.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            default_output: None,
            strict: true,
        }
    }

    /// Answer every request with `output`.
    pub fn with_default_output(output: impl Into<String>) -> Self {
        Self {
            default_output: Some(output.into()),
            ..Self::new()
        }
    }

    /// Register a response for an exact request key (see [`request_key`]).
    pub fn respond(mut self, key: impl Into<String>, output: impl Into<String>) -> Self {
        self.responses.insert(key.into(), output.into());
        self
    }

    /// Toggle strict mode.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let key = request_key(request);
        let output = match (self.responses.get(&key), &self.default_output) {
            (Some(output), _) => output.clone(),
            (None, Some(default)) => default.clone(),
            (None, None) if self.strict => {
                return Err(ProviderError::CallFailed(format!(
                    "mock provider has no response for key: {key}"
                )));
            }
            (None, None) => EMPTY_OBJECT.to_string(),
        };

        tracing::debug!(model = request.model.as_str(), "mock provider call");
        Ok(ProviderResponse::new(&request.model, output)?
            .with_raw(raw_payload(json!({ "mock_key": key }))))
    }
}

/// Lookup key for a request.
///
/// `prompt:<prompt>` for prompt requests; otherwise `messages:` followed by
/// one `role|content[|name=..][|tool=..]` line per message.
pub fn request_key(request: &ProviderRequest) -> String {
    if let Some(prompt) = &request.prompt {
        return format!("prompt:{prompt}");
    }

    let lines: Vec<String> = request
        .messages
        .iter()
        .flatten()
        .map(|message| {
            let mut line = format!("{}|{}", message.role, message.content);
            if let Some(name) = message.name.as_deref().filter(|n| !n.is_empty()) {
                line.push_str(&format!("|name={name}"));
            }
            if let Some(tool) = message.tool_call_id.as_deref().filter(|t| !t.is_empty()) {
                line.push_str(&format!("|tool={tool}"));
            }
            line
        })
        .collect();
    format!("messages:{}", lines.join("\n"))
}
