//! Persisted run records.
//!
//! `RunMetadata` is the `metadata.json` document written when a run
//! finalizes; replay reads it back to find the workflow, the execution order,
//! and the recorded content hashes. `ErrorRecord` is the `error.json` payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Version of the on-disk run directory layout.
pub const ARTIFACTS_VERSION: &str = "1";

/// Summary of one run, written as `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub artifacts_version: String,
    pub engine_version: String,
    pub workflow: WorkflowRecord,
    /// Provider label the run was executed with.
    pub provider: String,
    pub execution_order: Vec<String>,
    /// Step ID -> SHA-256 of its `rendered_prompt.md`.
    #[serde(default)]
    pub prompt_hashes: BTreeMap<String, String>,
    /// Step ID -> SHA-256 of its `output.json`.
    #[serde(default)]
    pub step_output_hashes: BTreeMap<String, String>,
    pub inputs_hash: Option<String>,
    pub outputs_hash: Option<String>,
    /// UTC, second precision, `Z` suffix.
    pub started_at: String,
    pub ended_at: String,
    /// Name of the run directory.
    pub run_id: String,
}

/// The workflow a run was produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub name: String,
    pub version: String,
    /// SHA-256 of the raw workflow file text.
    pub hash: String,
    pub path: String,
}

/// Payload of `error.json`, written at run level and (when known) step level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub step_id: Option<String>,
    pub error_type: String,
    pub message: String,
    /// Where the failure happened, e.g. "step" or "outputs".
    pub stage: String,
}
