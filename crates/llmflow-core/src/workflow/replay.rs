//! Offline replay of a recorded run.
//!
//! Replay re-derives a run's workflow outputs from its persisted step outputs
//! and checks them against `outputs.json`. Nothing is re-executed: no
//! provider calls, no tools. With `verify_hashes` the recorded SHA-256 digests
//! in `metadata.json` are checked against the files on disk as well.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use llmflow_types::run::RunMetadata;
use llmflow_types::workflow::JsonMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::definition::{Workflow, WorkflowError};
use super::runner::{MissingOutput, RunResult, resolve_outputs};
use crate::hash::sha256_hex;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while replaying a run.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("run directory not found: {}", .0.display())]
    RunDirNotFound(PathBuf),

    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{}': {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid run metadata: {0}")]
    Metadata(String),

    #[error(
        "workflow file {} does not exist; pass a workflow path to replay",
        .0.display()
    )]
    WorkflowNotFound(PathBuf),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("output of step '{step_id}' in '{}' must be a JSON object", .path.display())]
    StepOutputNotObject { step_id: String, path: PathBuf },

    #[error("'{}' must contain a JSON object", .0.display())]
    NotAnObject(PathBuf),

    #[error(transparent)]
    MissingOutput(#[from] MissingOutput),

    #[error(
        "replay outputs do not match recorded outputs.json (differing keys: {})",
        .keys.join(", ")
    )]
    OutputsMismatch { keys: Vec<String> },

    #[error("no hash recorded for '{}'", .0.display())]
    MissingHash(PathBuf),

    #[error("hash mismatch for '{}': recorded {expected}, found {actual}", .path.display())]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Use this workflow file instead of the path recorded in metadata.
    pub workflow_path: Option<PathBuf>,
    /// Also check recorded SHA-256 digests against the files on disk.
    pub verify_hashes: bool,
}

/// Replay the run recorded in `run_dir`.
pub fn replay(run_dir: &Path, options: &ReplayOptions) -> Result<RunResult, ReplayError> {
    if !run_dir.is_dir() {
        return Err(ReplayError::RunDirNotFound(run_dir.to_path_buf()));
    }

    let metadata: RunMetadata = read_json(&run_dir.join("metadata.json"))?;
    if metadata.execution_order.is_empty() {
        return Err(ReplayError::Metadata(
            "execution_order is missing or empty".to_string(),
        ));
    }
    for step_id in &metadata.execution_order {
        check_step_id(step_id)?;
    }

    let workflow = load_workflow(&metadata, options.workflow_path.as_deref())?;

    if options.verify_hashes {
        verify_hashes(run_dir, &metadata)?;
    }

    let mut step_outputs = HashMap::new();
    for step_id in &metadata.execution_order {
        let path = step_output_path(run_dir, step_id);
        let output = match read_json::<Value>(&path)? {
            Value::Object(map) => map,
            _ => {
                return Err(ReplayError::StepOutputNotObject {
                    step_id: step_id.clone(),
                    path,
                });
            }
        };
        step_outputs.insert(step_id.clone(), output);
    }

    let outputs = resolve_outputs(&workflow.spec, &step_outputs)?;

    let recorded_path = run_dir.join("outputs.json");
    let recorded = match read_json::<Value>(&recorded_path)? {
        Value::Object(map) => map,
        _ => return Err(ReplayError::NotAnObject(recorded_path)),
    };
    let keys = differing_keys(&outputs, &recorded);
    if !keys.is_empty() {
        return Err(ReplayError::OutputsMismatch { keys });
    }

    tracing::info!(
        run_id = metadata.run_id.as_str(),
        steps = metadata.execution_order.len(),
        "replay verified"
    );

    Ok(RunResult {
        outputs,
        run_dir: run_dir.to_path_buf(),
        metadata,
    })
}

fn load_workflow(metadata: &RunMetadata, override_path: Option<&Path>) -> Result<Workflow, ReplayError> {
    let path = match override_path {
        Some(path) => path.to_path_buf(),
        None => {
            let recorded = metadata.workflow.path.trim();
            if recorded.is_empty() {
                return Err(ReplayError::Metadata(
                    "workflow.path is missing or empty".to_string(),
                ));
            }
            PathBuf::from(recorded)
        }
    };
    if !path.is_file() {
        return Err(ReplayError::WorkflowNotFound(path));
    }

    let workflow = Workflow::load(&path)?;
    if workflow.hash != metadata.workflow.hash {
        tracing::warn!(
            path = %path.display(),
            "workflow file has changed since the run was recorded"
        );
    }
    Ok(workflow)
}

/// Step ids from metadata become directory names; refuse anything that could
/// point outside `steps/`.
fn check_step_id(step_id: &str) -> Result<(), ReplayError> {
    let bad = step_id.trim().is_empty()
        || step_id == "."
        || step_id == ".."
        || step_id.contains(['/', '\\'])
        || step_id.contains(std::path::MAIN_SEPARATOR);
    if bad {
        return Err(ReplayError::Metadata(format!(
            "invalid step id in execution_order: '{step_id}'"
        )));
    }
    Ok(())
}

fn step_output_path(run_dir: &Path, step_id: &str) -> PathBuf {
    run_dir.join("steps").join(step_id).join("output.json")
}

/// Keys present on only one side or mapped to different values, sorted.
fn differing_keys(derived: &JsonMap, recorded: &JsonMap) -> Vec<String> {
    derived
        .keys()
        .chain(recorded.keys())
        .filter(|key| derived.get(key.as_str()) != recorded.get(key.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn verify_hashes(run_dir: &Path, metadata: &RunMetadata) -> Result<(), ReplayError> {
    verify_file(&run_dir.join("inputs.json"), metadata.inputs_hash.as_deref())?;
    verify_file(&run_dir.join("outputs.json"), metadata.outputs_hash.as_deref())?;
    for step_id in &metadata.execution_order {
        verify_file(
            &step_output_path(run_dir, step_id),
            metadata.step_output_hashes.get(step_id).map(String::as_str),
        )?;
    }
    for (step_id, hash) in &metadata.prompt_hashes {
        check_step_id(step_id)?;
        let path = run_dir.join("steps").join(step_id).join("rendered_prompt.md");
        verify_file(&path, Some(hash))?;
    }
    Ok(())
}

fn verify_file(path: &Path, expected: Option<&str>) -> Result<(), ReplayError> {
    let expected = expected.ok_or_else(|| ReplayError::MissingHash(path.to_path_buf()))?;
    let actual = sha256_hex(&read_text(path)?);
    if actual != expected {
        return Err(ReplayError::HashMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String, ReplayError> {
    std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ReplayError> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|source| ReplayError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
