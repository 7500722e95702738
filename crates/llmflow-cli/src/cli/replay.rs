//! `llmflow replay`: re-derive and verify a recorded run.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;
use serde_json::Value;

use llmflow_core::workflow::canonical::sort_keys;
use llmflow_core::workflow::replay::{ReplayOptions, replay};

#[derive(Args)]
pub struct ReplayArgs {
    /// Run directory to replay (e.g. .runs/run_20260101_120000_abc123).
    pub run_dir: PathBuf,

    /// Workflow file to use instead of the path recorded in metadata.
    #[arg(long)]
    pub workflow: Option<PathBuf>,

    /// Also check recorded SHA-256 digests against the files on disk.
    #[arg(long)]
    pub verify_hashes: bool,
}

/// Handle `llmflow replay`.
pub fn replay_run(args: ReplayArgs, json: bool) -> Result<()> {
    let options = ReplayOptions {
        workflow_path: args.workflow,
        verify_hashes: args.verify_hashes,
    };
    let result = replay(&args.run_dir, &options)?;
    let outputs = sort_keys(Value::Object(result.outputs));

    if json {
        let out = serde_json::json!({
            "run_dir": result.run_dir.display().to_string(),
            "run_id": result.metadata.run_id,
            "hashes_verified": options.verify_hashes,
            "outputs": outputs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Replay completed: {}",
            style("✓").green().bold(),
            style(result.run_dir.display()).cyan()
        );
        if options.verify_hashes {
            println!("  All recorded hashes match.");
        }
        println!();
        println!("  Outputs:");
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        println!();
    }

    Ok(())
}
