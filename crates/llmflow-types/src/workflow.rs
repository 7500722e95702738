//! Workflow domain types for llmflow.
//!
//! A workflow is a YAML document with four sections: `workflow` (name and
//! version), `inputs` (declared external inputs), `steps` (the DAG), and
//! `outputs` (named outputs mapped to the step that produces them). Map-valued
//! sections keep their declaration order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A flat JSON object: step inputs, step outputs, tool payloads.
pub type JsonMap = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Workflow spec
// ---------------------------------------------------------------------------

/// The parsed workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Name and version of the workflow.
    pub workflow: WorkflowMeta,
    /// Declared external inputs, all required at run time.
    pub inputs: IndexMap<String, InputDef>,
    /// Ordered list of step definitions forming the workflow DAG.
    pub steps: Vec<StepDefinition>,
    /// Workflow-level output name -> id of the step whose output it exposes.
    pub outputs: IndexMap<String, String>,
}

/// Identity of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMeta {
    pub name: String,
    pub version: String,
}

/// A declared workflow input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDef {
    /// Free-form type label (e.g. "string", "object"). Informational only.
    #[serde(rename = "type")]
    pub input_type: String,
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step in the workflow DAG.
///
/// `step_type` is an open string so hosts can register extension step types.
/// The built-in types read their configuration from the typed fields below;
/// extension types read theirs from `config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDefinition {
    /// User-defined step ID (e.g. "summarize"). Unique within a workflow.
    pub id: String,
    /// Key into the step registry ("llm", "tool", "validate", ...).
    #[serde(rename = "type")]
    pub step_type: String,
    /// Step IDs this step depends on (DAG edges), in merge order.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Prompt template path (llm steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// JSON Schema path for the parsed LLM output (llm steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
    /// Model and sampling settings (llm steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
    /// Tool binding (tool steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolConfig>,
    /// Validation rules (validate steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<ValidateConfig>,
    /// Free-form configuration for extension step types.
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub config: JsonMap,
}

/// The `llm` block of an llm step.
///
/// Any keys besides the named ones are collected in `extra` and merged into
/// the provider request's `parameters`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Must be a mapping when present; checked when the handler is built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// The `tool` block of a tool step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Name in the tool registry.
    pub name: String,
}

/// The `validate` block of a validate step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateConfig {
    /// Keys that must be present.
    #[serde(default)]
    pub required: Vec<String>,
    /// Keys that must be present and non-empty.
    #[serde(default)]
    pub non_empty: Vec<String>,
    /// Key -> allowed values. Keys absent from the inputs are not checked.
    #[serde(default)]
    pub allowed_values: IndexMap<String, Vec<Value>>,
    /// Names in the validator registry, run in order.
    #[serde(default)]
    pub validators: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_definition_from_yaml() {
        let yaml = r#"
id: summarize
type: llm
depends_on: [fetch]
prompt: prompts/summarize.md
output_schema: schemas/summary.json
llm:
  model: gpt-test
  temperature: 0.2
  top_p: 0.9
"#;
        let step: StepDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(step.id, "summarize");
        assert_eq!(step.step_type, "llm");
        assert_eq!(step.depends_on, vec!["fetch"]);
        let llm = step.llm.unwrap();
        assert_eq!(llm.model.as_deref(), Some("gpt-test"));
        assert_eq!(llm.temperature, Some(0.2));
        assert_eq!(llm.extra.get("top_p"), Some(&serde_json::json!(0.9)));
        assert!(step.config.is_empty());
    }

    #[test]
    fn test_depends_on_defaults_to_empty() {
        let step: StepDefinition =
            serde_yaml_ng::from_str("id: a\ntype: tool\ntool:\n  name: fetch\n").unwrap();
        assert!(step.depends_on.is_empty());
        assert_eq!(step.tool.unwrap().name, "fetch");
    }

    #[test]
    fn test_validate_config_keeps_allowed_values_order() {
        let yaml = r#"
required: [name]
allowed_values:
  tone: [formal, casual]
  lang: [en, de]
"#;
        let config: ValidateConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.required, vec!["name"]);
        assert!(config.non_empty.is_empty());
        let keys: Vec<&str> = config.allowed_values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["tone", "lang"]);
    }

    #[test]
    fn test_workflow_spec_keeps_output_order() {
        let yaml = r#"
workflow:
  name: demo
  version: "1"
inputs:
  topic:
    type: string
steps:
  - id: a
    type: tool
    tool:
      name: t
outputs:
  zeta: a
  alpha: a
"#;
        let spec: WorkflowSpec = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(spec.workflow.version, "1");
        assert_eq!(spec.inputs["topic"].input_type, "string");
        let names: Vec<&str> = spec.outputs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_extension_step_config() {
        let yaml = "id: x\ntype: shout\nconfig:\n  times: 3\n";
        let step: StepDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(step.step_type, "shout");
        assert_eq!(step.config.get("times"), Some(&serde_json::json!(3)));
    }
}
