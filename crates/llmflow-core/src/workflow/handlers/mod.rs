//! Step handlers.
//!
//! A handler executes one step: it receives the step's merged inputs and
//! returns its output mapping. Handlers are built per step by a factory
//! registered under the step's type string (see `registry::StepRegistry`).
//!
//! Built-in types:
//! - `llm` -- render a prompt, call the provider, parse and schema-check the JSON reply
//! - `tool` -- call a named function from the tool registry
//! - `validate` -- check the inputs against declarative rules and pass them through

pub mod llm;
pub mod tool;
pub mod validate;

use std::sync::Arc;

use llmflow_types::llm::ProviderError;
use llmflow_types::workflow::JsonMap;
use serde_json::Value;

use super::registry::{RegistryError, ToolRegistry, ValidatorRegistry};
use super::template::TemplateError;
use crate::llm::provider::Provider;

pub use llm::LlmHandler;
pub use tool::ToolHandler;
pub use validate::ValidateHandler;

// ---------------------------------------------------------------------------
// StepHandler
// ---------------------------------------------------------------------------

/// Executes a single step.
///
/// `inputs` is borrowed immutably; the output must depend only on `inputs`
/// and the handler's own configuration (plus the provider's reply for llm
/// steps). `trace` collects intermediate evidence for the run record and is
/// persisted even when `execute` fails.
pub trait StepHandler {
    fn execute(&self, inputs: &JsonMap, trace: &mut StepTrace) -> Result<JsonMap, StepError>;
}

/// Intermediate evidence captured while a step runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepTrace {
    /// The prompt exactly as rendered, before request normalization.
    pub rendered_prompt: Option<String>,
    /// `{"request": ..., "response": ...}` for the provider call.
    pub llm_call: Option<Value>,
}

/// Shared capabilities handed to step factories.
#[derive(Clone)]
pub struct HandlerContext {
    pub provider: Arc<dyn Provider>,
    pub tools: Arc<ToolRegistry>,
    pub validators: Arc<ValidatorRegistry>,
}

impl HandlerContext {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        validators: Arc<ValidatorRegistry>,
    ) -> Self {
        Self {
            provider,
            tools,
            validators,
        }
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors that can occur while building or executing a step handler.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The step definition lacks configuration its type requires.
    #[error("invalid step config: {0}")]
    Config(String),

    /// The prompt template could not be read or rendered.
    #[error(transparent)]
    Render(#[from] TemplateError),

    /// The provider request was invalid or the call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The LLM reply was not a JSON object or did not match its schema.
    #[error("{0}")]
    OutputValidation(String),

    /// The output schema file could not be read or compiled.
    #[error("{0}")]
    OutputSchema(String),

    /// A tool failed or returned something other than a JSON object.
    #[error("tool '{tool}' failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A validate step rule did not hold.
    #[error("{0}")]
    ValidationRule(String),

    /// Unknown step type, tool, or validator.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Failure raised by an extension handler.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepError {
    /// Stable label recorded as `error_type` in error artifacts.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Config(_) => "config_error",
            StepError::Render(_) => "render_error",
            StepError::Provider(_) => "provider_error",
            StepError::OutputValidation(_) => "output_validation_error",
            StepError::OutputSchema(_) => "output_schema_error",
            StepError::ToolExecution { .. } => "tool_execution_error",
            StepError::ValidationRule(_) => "validation_rule_error",
            StepError::Registry(_) => "registry_error",
            StepError::Other(_) => "step_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            StepError::Config("x".into()),
            StepError::OutputValidation("x".into()),
            StepError::OutputSchema("x".into()),
            StepError::ValidationRule("x".into()),
            StepError::Registry(RegistryError::StepNotFound("x".into())),
            StepError::Other(anyhow::anyhow!("x")),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(StepError::kind).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_tool_execution_keeps_source() {
        let err = StepError::ToolExecution {
            tool: "fetch".to_string(),
            source: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "tool 'fetch' failed: connection refused");
        assert!(std::error::Error::source(&err).is_some());
    }
}
