//! CLI command definitions for the `llmflow` binary.
//!
//! Uses clap derive macros for argument parsing. Each subcommand's handler
//! lives in its own module.

pub mod graph;
pub mod replay;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run, inspect, and replay LLM workflows.
#[derive(Parser)]
#[command(name = "llmflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Engine config file (defaults to ./llmflow.toml when present).
    #[arg(long, global = true, env = "LLMFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow with the deterministic mock provider.
    Run(run::RunArgs),

    /// Print the execution order of a workflow.
    Graph {
        /// Path to the workflow YAML file.
        workflow: PathBuf,
    },

    /// Replay a run directory and verify its outputs.
    Replay(replay::ReplayArgs),

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_inputs() {
        let cli = Cli::try_parse_from([
            "llmflow", "run", "flow.yaml", "-i", "topic=rust", "--input", "n=3", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.workflow, PathBuf::from("flow.yaml"));
                assert_eq!(args.inputs, vec!["topic=rust", "n=3"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_mock_output_flags_conflict() {
        let result = Cli::try_parse_from([
            "llmflow",
            "run",
            "flow.yaml",
            "--mock-output",
            "{}",
            "--mock-output-file",
            "out.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_replay_flags() {
        let cli = Cli::try_parse_from([
            "llmflow",
            "replay",
            ".runs/run_x",
            "--workflow",
            "flow.yaml",
            "--verify-hashes",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Replay(args) => {
                assert!(args.verify_hashes);
                assert_eq!(args.workflow, Some(PathBuf::from("flow.yaml")));
            }
            _ => panic!("expected replay"),
        }
    }
}
