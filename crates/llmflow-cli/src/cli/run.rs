//! `llmflow run`: execute a workflow with the mock provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use console::style;
use serde_json::Value;

use llmflow_core::llm::mock::MockProvider;
use llmflow_core::workflow::canonical::sort_keys;
use llmflow_core::workflow::definition::Workflow;
use llmflow_core::workflow::runner::{RunConfig, Runner};
use llmflow_types::config::EngineConfig;
use llmflow_types::workflow::JsonMap;

#[derive(Args)]
pub struct RunArgs {
    /// Path to the workflow YAML file.
    pub workflow: PathBuf,

    /// Workflow input as key=value. Values parse as JSON, falling back to a
    /// plain string. Repeat for multiple inputs.
    #[arg(short = 'i', long = "input", value_name = "KEY=VALUE")]
    pub inputs: Vec<String>,

    /// Directory under which the run directory is created.
    #[arg(long)]
    pub artifacts_dir: Option<PathBuf>,

    /// Run token used in the run directory name instead of a random one.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Provider label recorded in run metadata.
    #[arg(long)]
    pub provider_name: Option<String>,

    /// JSON object returned by the mock provider for every llm step.
    #[arg(long, conflicts_with = "mock_output_file")]
    pub mock_output: Option<String>,

    /// File containing the JSON object returned by the mock provider.
    #[arg(long)]
    pub mock_output_file: Option<PathBuf>,
}

/// Handle `llmflow run`.
pub fn run_workflow(args: RunArgs, engine_config: &EngineConfig, json: bool) -> Result<()> {
    let workflow = Workflow::load(&args.workflow)
        .with_context(|| format!("Failed to load workflow {}", args.workflow.display()))?;
    let inputs = parse_inputs(&args.inputs)?;
    let mock_output = load_mock_output(args.mock_output.as_deref(), args.mock_output_file.as_deref())?;

    if mock_output.is_none() && has_llm_steps(&workflow) {
        bail!("llm steps require --mock-output or --mock-output-file");
    }

    let provider = MockProvider::with_default_output(mock_output.unwrap_or_else(|| "{}".to_string()))
        .strict(false);

    let mut config = RunConfig::from(engine_config);
    if let Some(dir) = args.artifacts_dir {
        config.artifacts_dir = dir;
    }
    if let Some(name) = args.provider_name {
        config.provider_name = Some(name);
    }
    config.run_id = args.run_id;

    let result = Runner::new(Arc::new(provider), config).run(&workflow, &inputs)?;
    let outputs = sort_keys(Value::Object(result.outputs));

    if json {
        let out = serde_json::json!({
            "run_dir": result.run_dir.display().to_string(),
            "run_id": result.metadata.run_id,
            "outputs": outputs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Run completed: {}",
            style("✓").green().bold(),
            style(result.run_dir.display()).cyan()
        );
        println!();
        println!("  Outputs:");
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        println!();
    }

    Ok(())
}

/// Parse repeated `key=value` items into an input mapping.
fn parse_inputs(items: &[String]) -> Result<JsonMap> {
    let mut inputs = JsonMap::new();
    for item in items {
        let Some((key, value)) = item.split_once('=') else {
            bail!("input must be key=value, got '{item}'");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("input key is missing in '{item}'");
        }
        if inputs.contains_key(key) {
            bail!("duplicate input key '{key}'");
        }
        inputs.insert(key.to_string(), parse_value(value.trim()));
    }
    Ok(inputs)
}

/// JSON if it parses, otherwise the raw string.
fn parse_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Resolve the mock output flags to compact, key-sorted JSON text.
fn load_mock_output(inline: Option<&str>, file: Option<&Path>) -> Result<Option<String>> {
    let raw = match (inline, file) {
        (Some(_), Some(_)) => bail!("use only one of --mock-output or --mock-output-file"),
        (Some(text), None) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mock output file {}", path.display()))?,
        (None, None) => return Ok(None),
    };

    let payload: Value =
        serde_json::from_str(&raw).context("mock output must be valid JSON")?;
    if !payload.is_object() {
        bail!("mock output must be a JSON object");
    }
    Ok(Some(serde_json::to_string(&sort_keys(payload))?))
}

fn has_llm_steps(workflow: &Workflow) -> bool {
    workflow.spec.steps.iter().any(|step| step.step_type == "llm")
}
