//! Sequential workflow runner.
//!
//! A run checks the declared inputs, orders the steps, opens a fresh run
//! directory, and then executes one step at a time in that order. Each step
//! sees the workflow inputs merged with the outputs of its dependencies
//! (applied in `depends_on` order, later keys winning). Every step output and
//! handler transcript is on disk before the next step starts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use llmflow_types::config::EngineConfig;
use llmflow_types::run::{ErrorRecord, RunMetadata};
use llmflow_types::workflow::{JsonMap, StepDefinition, WorkflowSpec};
use serde_json::Value;
use thiserror::Error;

use super::artifacts::{ArtifactError, ArtifactRecorder, RecorderOptions};
use super::dag::GraphError;
use super::definition::Workflow;
use super::handlers::{HandlerContext, StepError, StepTrace};
use super::registry::{StepRegistry, ToolRegistry, ValidatorRegistry};
use crate::llm::provider::Provider;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A workflow output names a step that produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing output for workflow output '{output}' (step '{step_id}')")]
pub struct MissingOutput {
    pub output: String,
    pub step_id: String,
}

/// Errors that can end a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Declared inputs absent from the supplied inputs, in declaration order.
    #[error("missing required inputs: {}", .0.join(", "))]
    MissingInputs(Vec<String>),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("missing output for dependency '{dependency}' of step '{step_id}'")]
    MissingDependencyOutput { step_id: String, dependency: String },

    #[error(transparent)]
    MissingOutput(#[from] MissingOutput),

    #[error("step '{step_id}' failed: {source}")]
    Step {
        step_id: String,
        #[source]
        source: StepError,
    },
}

impl RunError {
    /// True for failures of the run itself, as opposed to definition or
    /// artifact-writing problems.
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            RunError::MissingInputs(_)
                | RunError::MissingDependencyOutput { .. }
                | RunError::MissingOutput(_)
                | RunError::Step { .. }
        )
    }

    /// Stable label recorded as `error_type` in error artifacts.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::MissingInputs(_) => "missing_inputs",
            RunError::Graph(_) => "graph_error",
            RunError::Artifact(_) => "artifact_error",
            RunError::MissingDependencyOutput { .. } => "missing_dependency_output",
            RunError::MissingOutput(_) => "missing_output",
            RunError::Step { source, .. } => source.kind(),
        }
    }

    /// The step the error belongs to, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            RunError::MissingDependencyOutput { step_id, .. } | RunError::Step { step_id, .. } => {
                Some(step_id.as_str())
            }
            _ => None,
        }
    }

    fn stage(&self) -> &'static str {
        match self {
            RunError::MissingInputs(_) => "inputs",
            RunError::MissingDependencyOutput { .. } => "step_inputs",
            RunError::Step { .. } => "step",
            RunError::MissingOutput(_) => "outputs",
            RunError::Graph(_) => "graph",
            RunError::Artifact(_) => "artifacts",
        }
    }
}

// ---------------------------------------------------------------------------
// Config and result
// ---------------------------------------------------------------------------

/// Per-runner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub artifacts_dir: PathBuf,
    /// Label recorded in metadata; `None` uses the provider's `name()`.
    pub provider_name: Option<String>,
    /// Explicit run token; `None` picks a random one per run.
    pub run_id: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RunConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            artifacts_dir: config.artifacts_dir.clone(),
            provider_name: config.provider_name.clone(),
            run_id: None,
        }
    }
}

/// Outcome of a successful run or replay.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub outputs: JsonMap,
    pub run_dir: PathBuf,
    pub metadata: RunMetadata,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes workflows against a provider and a set of registries.
pub struct Runner {
    steps: StepRegistry,
    ctx: HandlerContext,
    config: RunConfig,
}

impl Runner {
    /// Runner with the built-in step types and empty tool/validator registries.
    pub fn new(provider: Arc<dyn Provider>, config: RunConfig) -> Self {
        Self {
            steps: StepRegistry::with_builtins(),
            ctx: HandlerContext::new(
                provider,
                Arc::new(ToolRegistry::new()),
                Arc::new(ValidatorRegistry::new()),
            ),
            config,
        }
    }

    pub fn with_steps(mut self, steps: StepRegistry) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.ctx.tools = tools;
        self
    }

    pub fn with_validators(mut self, validators: Arc<ValidatorRegistry>) -> Self {
        self.ctx.validators = validators;
        self
    }

    /// Run `workflow` once against `inputs`.
    ///
    /// Missing inputs and graph errors are reported before any directory is
    /// created. Once the run directory exists, an execution failure is also
    /// recorded as `error.json` (run level, plus step level when a step is
    /// known) before it is returned.
    pub fn run(&self, workflow: &Workflow, inputs: &JsonMap) -> Result<RunResult, RunError> {
        let missing: Vec<String> = workflow
            .spec
            .inputs
            .keys()
            .filter(|name| !inputs.contains_key(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RunError::MissingInputs(missing));
        }

        let graph = workflow.graph()?;
        let provider_name = self
            .config
            .provider_name
            .clone()
            .unwrap_or_else(|| self.ctx.provider.name().to_string());

        let mut recorder = ArtifactRecorder::create(
            workflow,
            &graph.order,
            &provider_name,
            &self.config.artifacts_dir,
            RecorderOptions {
                run_id: self.config.run_id.clone(),
                ..Default::default()
            },
        )?;

        tracing::info!(
            workflow = workflow.name(),
            version = workflow.version(),
            steps = graph.order.len(),
            run_dir = %recorder.run_dir().display(),
            "starting run"
        );

        let outputs = match self.execute(workflow, &graph.order, inputs, &mut recorder) {
            Ok(outputs) => outputs,
            Err(err) => {
                record_failure(&recorder, &err);
                return Err(err);
            }
        };

        let metadata = recorder.finalize(None)?;
        tracing::info!(run_id = metadata.run_id.as_str(), "run completed");

        Ok(RunResult {
            outputs,
            run_dir: recorder.run_dir().to_path_buf(),
            metadata,
        })
    }

    fn execute(
        &self,
        workflow: &Workflow,
        order: &[String],
        inputs: &JsonMap,
        recorder: &mut ArtifactRecorder,
    ) -> Result<JsonMap, RunError> {
        recorder.write_inputs(inputs)?;

        let definitions: HashMap<&str, &StepDefinition> = workflow
            .spec
            .steps
            .iter()
            .map(|step| (step.id.as_str(), step))
            .collect();

        let mut step_outputs: HashMap<String, JsonMap> = HashMap::new();
        for definition in order.iter().filter_map(|id| definitions.get(id.as_str())) {
            let output = self.run_step(definition, inputs, &step_outputs, recorder)?;
            step_outputs.insert(definition.id.clone(), output);
        }

        let outputs = resolve_outputs(&workflow.spec, &step_outputs)?;
        recorder.write_outputs(&outputs)?;
        Ok(outputs)
    }

    fn run_step(
        &self,
        definition: &StepDefinition,
        inputs: &JsonMap,
        step_outputs: &HashMap<String, JsonMap>,
        recorder: &mut ArtifactRecorder,
    ) -> Result<JsonMap, RunError> {
        let step_id = definition.id.as_str();
        let step_inputs = merge_step_inputs(definition, inputs, step_outputs)?;
        tracing::debug!(
            step_id,
            step_type = definition.step_type.as_str(),
            "executing step"
        );

        let step_error = |source: StepError| RunError::Step {
            step_id: step_id.to_string(),
            source,
        };
        let handler = self.steps.create(definition, &self.ctx).map_err(step_error)?;

        let mut trace = StepTrace::default();
        let result = handler.execute(&step_inputs, &mut trace);
        let persisted = persist_trace(recorder, step_id, &trace);
        let output = result.map_err(step_error)?;
        persisted?;

        recorder.write_step_output(step_id, &output)?;
        tracing::debug!(step_id, keys = output.len(), "step completed");
        Ok(output)
    }
}

/// Workflow inputs overlaid with each dependency's output, in `depends_on` order.
fn merge_step_inputs(
    definition: &StepDefinition,
    inputs: &JsonMap,
    step_outputs: &HashMap<String, JsonMap>,
) -> Result<JsonMap, RunError> {
    let mut merged = inputs.clone();
    for dependency in &definition.depends_on {
        let output = step_outputs
            .get(dependency)
            .ok_or_else(|| RunError::MissingDependencyOutput {
                step_id: definition.id.clone(),
                dependency: dependency.clone(),
            })?;
        for (key, value) in output {
            merged.insert(key.clone(), value.clone());
        }
    }
    Ok(merged)
}

fn persist_trace(
    recorder: &mut ArtifactRecorder,
    step_id: &str,
    trace: &StepTrace,
) -> Result<(), ArtifactError> {
    if let Some(prompt) = &trace.rendered_prompt {
        recorder.write_rendered_prompt(step_id, prompt)?;
    }
    if let Some(call) = &trace.llm_call {
        recorder.write_llm_call(step_id, call)?;
    }
    Ok(())
}

/// Write `error.json` for an execution failure. Failing to do so is logged
/// and otherwise ignored so the original error reaches the caller.
fn record_failure(recorder: &ArtifactRecorder, err: &RunError) {
    if !err.is_execution_error() {
        tracing::warn!(error = %err, "run aborted");
        return;
    }

    let record = ErrorRecord {
        step_id: err.step_id().map(str::to_string),
        error_type: err.kind().to_string(),
        message: match err {
            RunError::Step { source, .. } => source.to_string(),
            other => other.to_string(),
        },
        stage: err.stage().to_string(),
    };
    if let Err(write_err) = recorder.write_error(&record) {
        tracing::warn!(error = %write_err, "failed to write error artifact");
    }
    tracing::warn!(
        step_id = record.step_id.as_deref(),
        error_type = record.error_type.as_str(),
        "run failed: {}",
        record.message
    );
}

/// Map each workflow output name to the output of the step it references.
pub fn resolve_outputs(
    spec: &WorkflowSpec,
    step_outputs: &HashMap<String, JsonMap>,
) -> Result<JsonMap, MissingOutput> {
    let mut outputs = JsonMap::new();
    for (name, step_id) in &spec.outputs {
        let output = step_outputs.get(step_id).ok_or_else(|| MissingOutput {
            output: name.clone(),
            step_id: step_id.clone(),
        })?;
        outputs.insert(name.clone(), Value::Object(output.clone()));
    }
    Ok(outputs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
