//! Run directory writer.
//!
//! One `ArtifactRecorder` owns one run directory:
//!
//! ```text
//! run_<YYYYMMDD_HHMMSS>_<token>/
//!   inputs.json  outputs.json  metadata.json  error.json  logs.txt
//!   steps/<step_id>/output.json  rendered_prompt.md  llm_call.json  error.json
//! ```
//!
//! Every JSON file is canonical (see `canonical`), every file is synced to
//! disk before its write returns, and the SHA-256 of what was written is kept
//! for `metadata.json`.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use llmflow_types::run::{ARTIFACTS_VERSION, ErrorRecord, RunMetadata, WorkflowRecord};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::canonical::to_canonical_string;
use super::definition::Workflow;
use crate::hash::sha256_hex;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const RUN_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while writing run artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Bad constructor argument (empty order, duplicate ids, blank provider).
    #[error("invalid artifact recorder argument: {0}")]
    InvalidArgument(String),

    /// A step id or run id is not usable as a single path component.
    #[error("{label} {reason}")]
    InvalidComponent { label: &'static str, reason: String },

    /// The step id is not part of this run's execution order.
    #[error("unknown step_id '{0}'")]
    UnknownStep(String),

    #[error("run directory already exists: {}", .0.display())]
    RunDirExists(PathBuf),

    #[error("payload for '{name}' is not JSON-serializable: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Optional overrides for a new recorder. Unset fields fall back to a random
/// 6-hex-char run token, the current UTC time, and this crate's version.
#[derive(Debug, Clone, Default)]
pub struct RecorderOptions {
    pub run_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub engine_version: Option<String>,
}

// ---------------------------------------------------------------------------
// ArtifactRecorder
// ---------------------------------------------------------------------------

pub struct ArtifactRecorder {
    run_dir: PathBuf,
    steps_dir: PathBuf,
    workflow: WorkflowRecord,
    execution_order: Vec<String>,
    provider: String,
    started_at: DateTime<Utc>,
    engine_version: String,
    prompt_hashes: BTreeMap<String, String>,
    step_output_hashes: BTreeMap<String, String>,
    inputs_hash: Option<String>,
    outputs_hash: Option<String>,
}

impl ArtifactRecorder {
    /// Validate the arguments and create a fresh run directory under
    /// `artifacts_dir` (which is created if missing).
    pub fn create(
        workflow: &Workflow,
        execution_order: &[String],
        provider_name: &str,
        artifacts_dir: &Path,
        options: RecorderOptions,
    ) -> Result<Self, ArtifactError> {
        if execution_order.is_empty() {
            return Err(ArtifactError::InvalidArgument(
                "execution_order must be non-empty".to_string(),
            ));
        }
        let unique: HashSet<&String> = execution_order.iter().collect();
        if unique.len() != execution_order.len() {
            return Err(ArtifactError::InvalidArgument(
                "execution_order must not contain duplicates".to_string(),
            ));
        }
        for step_id in execution_order {
            validate_component("step_id", step_id)?;
        }
        let provider = provider_name.trim();
        if provider.is_empty() {
            return Err(ArtifactError::InvalidArgument(
                "provider_name must be non-empty".to_string(),
            ));
        }

        let started_at = options.started_at.unwrap_or_else(Utc::now);
        let token = match options.run_id.as_deref() {
            Some(run_id) => validate_component("run_id", run_id)?.to_string(),
            None => random_token(),
        };

        std::fs::create_dir_all(artifacts_dir).map_err(io_error(artifacts_dir))?;
        let run_dir = artifacts_dir.join(format!(
            "run_{}_{token}",
            started_at.format(RUN_STAMP_FORMAT)
        ));
        if let Err(source) = std::fs::create_dir(&run_dir) {
            return Err(if source.kind() == std::io::ErrorKind::AlreadyExists {
                ArtifactError::RunDirExists(run_dir)
            } else {
                ArtifactError::Io {
                    path: run_dir,
                    source,
                }
            });
        }

        let steps_dir = run_dir.join("steps");
        std::fs::create_dir_all(&steps_dir).map_err(io_error(&steps_dir))?;
        write_text(&run_dir.join("logs.txt"), "")?;

        tracing::debug!(run_dir = %run_dir.display(), "created run directory");

        Ok(Self {
            run_dir,
            steps_dir,
            workflow: WorkflowRecord {
                name: workflow.name().to_string(),
                version: workflow.version().to_string(),
                hash: workflow.hash.clone(),
                path: workflow.path.display().to_string(),
            },
            execution_order: execution_order.to_vec(),
            provider: provider.to_string(),
            started_at,
            engine_version: options
                .engine_version
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            prompt_hashes: BTreeMap::new(),
            step_output_hashes: BTreeMap::new(),
            inputs_hash: None,
            outputs_hash: None,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    // -----------------------------------------------------------------------
    // Run-level documents
    // -----------------------------------------------------------------------

    pub fn write_inputs<T: Serialize + ?Sized>(&mut self, inputs: &T) -> Result<(), ArtifactError> {
        self.inputs_hash = Some(write_json(&self.run_dir.join("inputs.json"), inputs)?);
        Ok(())
    }

    pub fn write_outputs<T: Serialize + ?Sized>(
        &mut self,
        outputs: &T,
    ) -> Result<(), ArtifactError> {
        self.outputs_hash = Some(write_json(&self.run_dir.join("outputs.json"), outputs)?);
        Ok(())
    }

    /// Write `error.json` at run level and, when `step_id` is given, in the
    /// step's directory too.
    pub fn write_error(&self, record: &ErrorRecord) -> Result<(), ArtifactError> {
        write_json(&self.run_dir.join("error.json"), record)?;
        if let Some(step_id) = record.step_id.as_deref() {
            let step_dir = self.step_dir(step_id)?;
            write_json(&step_dir.join("error.json"), record)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step-level documents
    // -----------------------------------------------------------------------

    pub fn write_step_output<T: Serialize + ?Sized>(
        &mut self,
        step_id: &str,
        output: &T,
    ) -> Result<(), ArtifactError> {
        let step_dir = self.step_dir(step_id)?;
        let hash = write_json(&step_dir.join("output.json"), output)?;
        self.step_output_hashes.insert(step_id.trim().to_string(), hash);
        Ok(())
    }

    pub fn write_rendered_prompt(&mut self, step_id: &str, prompt: &str) -> Result<(), ArtifactError> {
        let step_dir = self.step_dir(step_id)?;
        let hash = write_text(&step_dir.join("rendered_prompt.md"), prompt)?;
        self.prompt_hashes.insert(step_id.trim().to_string(), hash);
        Ok(())
    }

    pub fn write_llm_call<T: Serialize + ?Sized>(
        &self,
        step_id: &str,
        payload: &T,
    ) -> Result<(), ArtifactError> {
        let step_dir = self.step_dir(step_id)?;
        write_json(&step_dir.join("llm_call.json"), payload)?;
        Ok(())
    }

    /// Compose `metadata.json`, write it, and return it.
    pub fn finalize(&self, ended_at: Option<DateTime<Utc>>) -> Result<RunMetadata, ArtifactError> {
        let ended_at = ended_at.unwrap_or_else(Utc::now);
        let metadata = RunMetadata {
            artifacts_version: ARTIFACTS_VERSION.to_string(),
            engine_version: self.engine_version.clone(),
            workflow: self.workflow.clone(),
            provider: self.provider.clone(),
            execution_order: self.execution_order.clone(),
            prompt_hashes: self.prompt_hashes.clone(),
            step_output_hashes: self.step_output_hashes.clone(),
            inputs_hash: self.inputs_hash.clone(),
            outputs_hash: self.outputs_hash.clone(),
            started_at: self.started_at.format(TIMESTAMP_FORMAT).to_string(),
            ended_at: ended_at.format(TIMESTAMP_FORMAT).to_string(),
            run_id: self
                .run_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        write_json(&self.run_dir.join("metadata.json"), &metadata)?;
        Ok(metadata)
    }

    /// Directory for `step_id`, created on first use.
    fn step_dir(&self, step_id: &str) -> Result<PathBuf, ArtifactError> {
        let step_id = validate_component("step_id", step_id)?;
        if !self.execution_order.iter().any(|id| id == step_id) {
            return Err(ArtifactError::UnknownStep(step_id.to_string()));
        }
        let path = self.steps_dir.join(step_id);
        std::fs::create_dir_all(&path).map_err(io_error(&path))?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Trim `value` and require it to be a single, ordinary path component.
fn validate_component<'a>(label: &'static str, value: &'a str) -> Result<&'a str, ArtifactError> {
    let invalid = |reason: &str| ArtifactError::InvalidComponent {
        label,
        reason: reason.to_string(),
    };
    let component = value.trim();
    if component.is_empty() {
        return Err(invalid("must be non-empty"));
    }
    if component == "." || component == ".." {
        return Err(invalid("must not be '.' or '..'"));
    }
    if component.contains(['/', '\\']) || component.contains(std::path::MAIN_SEPARATOR) {
        return Err(invalid("must not contain path separators"));
    }
    Ok(component)
}

fn random_token() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, payload: &T) -> Result<String, ArtifactError> {
    let text = to_canonical_string(payload).map_err(|source| ArtifactError::Serialize {
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        source,
    })?;
    write_text(path, &text)
}

/// Write `text`, sync it to disk, and return its SHA-256.
fn write_text(path: &Path, text: &str) -> Result<String, ArtifactError> {
    let mut file = File::create(path).map_err(io_error(path))?;
    file.write_all(text.as_bytes()).map_err(io_error(path))?;
    file.sync_all().map_err(io_error(path))?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "wrote artifact");
    Ok(sha256_hex(text))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    const WORKFLOW: &str = r#"
workflow: {name: demo, version: "1"}
inputs: {x: {type: integer}}
steps:
  - {id: a, type: tool, tool: {name: t}}
  - {id: b, type: tool, tool: {name: t}, depends_on: [a]}
outputs: {result: b}
"#;

    fn workflow() -> Workflow {
        Workflow::from_yaml(WORKFLOW, Path::new("/flows/demo.yaml")).unwrap()
    }

    fn order() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap()
    }

    fn recorder(dir: &Path, run_id: &str) -> ArtifactRecorder {
        ArtifactRecorder::create(
            &workflow(),
            &order(),
            "mock",
            dir,
            RecorderOptions {
                run_id: Some(run_id.to_string()),
                started_at: Some(started()),
                engine_version: Some("9.9.9".to_string()),
            },
        )
        .unwrap()
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_creates_run_layout() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(&dir.path().join("runs"), "abc123");

        assert_eq!(
            rec.run_dir(),
            dir.path().join("runs").join("run_20260314_150926_abc123")
        );
        assert!(rec.run_dir().join("steps").is_dir());
        assert_eq!(read(&rec.run_dir().join("logs.txt")), "");
    }

    #[test]
    fn test_random_token_is_six_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let rec = ArtifactRecorder::create(
            &workflow(),
            &order(),
            "mock",
            dir.path(),
            RecorderOptions::default(),
        )
        .unwrap();
        let name = rec.run_dir().file_name().unwrap().to_str().unwrap();
        let token = name.rsplit('_').next().unwrap();
        assert_eq!(token.len(), 6);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_existing_run_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = recorder(dir.path(), "same");
        let err = ArtifactRecorder::create(
            &workflow(),
            &order(),
            "mock",
            dir.path(),
            RecorderOptions {
                run_id: Some("same".to_string()),
                started_at: Some(started()),
                engine_version: None,
            },
        )
        .err()
        .unwrap();
        assert!(matches!(err, ArtifactError::RunDirExists(_)));
    }

    #[test]
    fn test_constructor_arguments_validated() {
        let dir = tempfile::tempdir().unwrap();
        let create = |order: &[String], provider: &str, run_id: Option<&str>| {
            ArtifactRecorder::create(
                &workflow(),
                order,
                provider,
                dir.path(),
                RecorderOptions {
                    run_id: run_id.map(str::to_string),
                    ..Default::default()
                },
            )
            .err()
            .unwrap()
        };

        let err = create(&[], "mock", None);
        assert!(err.to_string().contains("execution_order must be non-empty"));
        let err = create(&["a".to_string(), "a".to_string()], "mock", None);
        assert!(err.to_string().contains("duplicates"));
        let err = create(&order(), "  ", None);
        assert!(err.to_string().contains("provider_name"));
        let err = create(&order(), "mock", Some("../up"));
        assert!(matches!(err, ArtifactError::InvalidComponent { label: "run_id", .. }));
        let err = create(&order(), "mock", Some(".."));
        assert_eq!(err.to_string(), "run_id must not be '.' or '..'");
        let err = create(&["fetch/data".to_string()], "mock", None);
        assert_eq!(err.to_string(), "step_id must not contain path separators");

        // Nothing was created for the rejected runs.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_step_ids_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path(), "r");

        let err = rec.write_step_output("zzz", &json!({})).unwrap_err();
        assert!(matches!(err, ArtifactError::UnknownStep(_)));
        let err = rec.write_step_output("a/../b", &json!({})).unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidComponent { .. }));
        let err = rec.write_llm_call("", &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "step_id must be non-empty");
        assert!(!rec.run_dir().join("steps").join("zzz").exists());
    }

    #[test]
    fn test_writes_are_canonical_and_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path(), "r");

        rec.write_inputs(&json!({"x": 1, "name": "caf\u{e9}"})).unwrap();
        rec.write_step_output("a", &json!({"y": 2})).unwrap();
        rec.write_rendered_prompt("a", "Hello\n").unwrap();
        rec.write_outputs(&json!({"result": {"z": 3}})).unwrap();

        let inputs = read(&rec.run_dir().join("inputs.json"));
        assert_eq!(inputs, "{\n  \"name\": \"caf\\u00e9\",\n  \"x\": 1\n}");

        let metadata = rec.finalize(Some(started())).unwrap();
        assert_eq!(metadata.inputs_hash, Some(sha256_hex(&inputs)));
        let step_output = read(&rec.run_dir().join("steps/a/output.json"));
        assert_eq!(metadata.step_output_hashes["a"], sha256_hex(&step_output));
        assert_eq!(metadata.prompt_hashes["a"], sha256_hex("Hello\n"));
        assert_eq!(
            read(&rec.run_dir().join("steps/a/rendered_prompt.md")),
            "Hello\n"
        );
        assert!(metadata.outputs_hash.is_some());
    }

    #[test]
    fn test_finalize_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), "r");
        let ended = started() + chrono::Duration::seconds(5);

        let metadata = rec.finalize(Some(ended)).unwrap();
        assert_eq!(metadata.artifacts_version, "1");
        assert_eq!(metadata.engine_version, "9.9.9");
        assert_eq!(metadata.workflow.name, "demo");
        assert_eq!(metadata.workflow.path, "/flows/demo.yaml");
        assert_eq!(metadata.workflow.hash, sha256_hex(WORKFLOW));
        assert_eq!(metadata.provider, "mock");
        assert_eq!(metadata.execution_order, order());
        assert_eq!(metadata.started_at, "2026-03-14T15:09:26Z");
        assert_eq!(metadata.ended_at, "2026-03-14T15:09:31Z");
        assert_eq!(metadata.run_id, "run_20260314_150926_r");
        assert_eq!(metadata.inputs_hash, None);

        let on_disk: RunMetadata =
            serde_json::from_str(&read(&rec.run_dir().join("metadata.json"))).unwrap();
        assert_eq!(on_disk, metadata);
    }

    #[test]
    fn test_write_error_at_run_and_step_level() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), "r");

        let record = ErrorRecord {
            step_id: Some("b".to_string()),
            error_type: "tool_execution_error".to_string(),
            message: "boom".to_string(),
            stage: "step".to_string(),
        };
        rec.write_error(&record).unwrap();

        let run_level: Value = serde_json::from_str(&read(&rec.run_dir().join("error.json"))).unwrap();
        let step_level: Value =
            serde_json::from_str(&read(&rec.run_dir().join("steps/b/error.json"))).unwrap();
        assert_eq!(run_level, step_level);
        assert_eq!(run_level["error_type"], "tool_execution_error");
        assert_eq!(run_level["stage"], "step");
    }

    #[test]
    fn test_write_error_without_step() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), "r");
        rec.write_error(&ErrorRecord {
            step_id: None,
            error_type: "missing_output".to_string(),
            message: "no output".to_string(),
            stage: "outputs".to_string(),
        })
        .unwrap();

        let payload: Value = serde_json::from_str(&read(&rec.run_dir().join("error.json"))).unwrap();
        assert_eq!(payload["step_id"], Value::Null);
        assert_eq!(std::fs::read_dir(rec.run_dir().join("steps")).unwrap().count(), 0);
    }
}
