//! Workflow definition loading and validation.
//!
//! Converts a YAML file into a [`Workflow`]: the parsed [`WorkflowSpec`], its
//! source path, and the SHA-256 of the raw file text. Relative prompt and
//! schema paths are resolved against the workflow file's directory, and
//! structural constraints (non-empty names, unique IDs, known references)
//! are checked before the workflow is handed to the runner.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use llmflow_types::workflow::WorkflowSpec;
use thiserror::Error;

use super::dag::{GraphError, WorkflowGraph, build_graph};
use crate::hash::sha256_hex;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflow file does not exist.
    #[error("workflow file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Filesystem I/O failure.
    #[error("failed to read workflow file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML.
    #[error("invalid YAML in workflow file: {0}")]
    Parse(String),

    /// Structural validation failure; one entry per problem.
    #[error("workflow validation failed:\n{}", format_problems(.0))]
    Validation(Vec<String>),
}

fn format_problems(problems: &[String]) -> String {
    problems
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A loaded, validated workflow.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub spec: WorkflowSpec,
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// SHA-256 of the raw source text.
    pub hash: String,
}

impl Workflow {
    /// Load and validate a workflow file.
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        if !path.exists() {
            return Err(WorkflowError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw, path)
    }

    /// Parse `raw` as if it had been read from `path`.
    ///
    /// `path` anchors relative prompt/schema references and is recorded in
    /// run metadata; it does not need to exist.
    pub fn from_yaml(raw: &str, path: &Path) -> Result<Self, WorkflowError> {
        let path = absolute(path);
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let spec = parse_workflow_yaml(raw, &base_dir)?;

        tracing::debug!(
            workflow = spec.workflow.name.as_str(),
            steps = spec.steps.len(),
            path = %path.display(),
            "workflow loaded"
        );

        Ok(Self {
            spec,
            path,
            hash: sha256_hex(raw),
        })
    }

    /// Dependency graph and execution order of the workflow's steps.
    pub fn graph(&self) -> Result<WorkflowGraph, GraphError> {
        build_graph(&self.spec.steps)
    }

    pub fn name(&self) -> &str {
        &self.spec.workflow.name
    }

    pub fn version(&self) -> &str {
        &self.spec.workflow.version
    }
}

/// Load a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<Workflow, WorkflowError> {
    Workflow::load(path)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowSpec`.
///
/// Relative `prompt` and `output_schema` paths are resolved against
/// `base_dir`. Runs `validate_spec` after deserialization, so the returned
/// value is guaranteed to be structurally valid.
pub fn parse_workflow_yaml(yaml: &str, base_dir: &Path) -> Result<WorkflowSpec, WorkflowError> {
    let payload: serde_yaml_ng::Value =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    if !payload.is_mapping() {
        return Err(WorkflowError::Validation(vec![
            "workflow YAML must be a mapping at the top level".to_string(),
        ]));
    }

    let mut spec: WorkflowSpec = serde_yaml_ng::from_value(payload)
        .map_err(|e| WorkflowError::Validation(vec![e.to_string()]))?;

    normalize(&mut spec, base_dir);
    validate_spec(&spec)?;
    Ok(spec)
}

/// Trim identifiers and make file references absolute.
fn normalize(spec: &mut WorkflowSpec, base_dir: &Path) {
    spec.workflow.name = spec.workflow.name.trim().to_string();
    spec.workflow.version = spec.workflow.version.trim().to_string();
    for input in spec.inputs.values_mut() {
        input.input_type = input.input_type.trim().to_string();
    }
    for step in &mut spec.steps {
        step.id = step.id.trim().to_string();
        step.step_type = step.step_type.trim().to_string();
        if let Some(prompt) = step.prompt.take() {
            step.prompt = Some(resolve_path(&prompt, base_dir));
        }
        if let Some(schema) = step.output_schema.take() {
            step.output_schema = Some(resolve_path(&schema, base_dir));
        }
    }
}

fn resolve_path(value: &str, base_dir: &Path) -> String {
    let path = Path::new(value);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    absolute(&joined).display().to_string()
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowSpec`.
///
/// Checks:
/// - Workflow name and version are non-empty
/// - Every input declares a non-empty type
/// - Every step has a non-empty ID and type, and IDs are unique
/// - All `depends_on` references point to other existing steps
/// - All outputs reference existing steps
/// - `llm` steps declare `prompt` and `output_schema`
///
/// All problems are collected and reported together.
pub fn validate_spec(spec: &WorkflowSpec) -> Result<(), WorkflowError> {
    let mut problems = Vec::new();

    if spec.workflow.name.trim().is_empty() {
        problems.push("workflow.name: must be non-empty".to_string());
    }
    if spec.workflow.version.trim().is_empty() {
        problems.push("workflow.version: must be non-empty".to_string());
    }

    for (name, input) in &spec.inputs {
        if input.input_type.trim().is_empty() {
            problems.push(format!("inputs.{name}.type: must be non-empty"));
        }
    }

    let mut seen_ids = HashSet::new();
    for (idx, step) in spec.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            problems.push(format!("steps.{idx}.id: must be non-empty"));
        } else if !seen_ids.insert(step.id.as_str()) {
            problems.push(format!("steps.{idx}.id: duplicate step id '{}'", step.id));
        }
        if step.step_type.trim().is_empty() {
            problems.push(format!("steps.{idx}.type: must be non-empty"));
        }
        if step.step_type == "llm" {
            if step.prompt.as_deref().is_none_or(str::is_empty) {
                problems.push(format!("steps.{idx}: llm steps require 'prompt'"));
            }
            if step.output_schema.as_deref().is_none_or(str::is_empty) {
                problems.push(format!("steps.{idx}: llm steps require 'output_schema'"));
            }
        }
    }

    for step in &spec.steps {
        for dep in &step.depends_on {
            if dep == &step.id {
                problems.push(format!("step '{}' cannot depend on itself", step.id));
            } else if !seen_ids.contains(dep.as_str()) {
                problems.push(format!("unknown dependency '{dep}' in step '{}'", step.id));
            }
        }
    }

    for (name, step_id) in &spec.outputs {
        if !seen_ids.contains(step_id.as_str()) {
            problems.push(format!("output '{name}' references unknown step '{step_id}'"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::Validation(problems))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
