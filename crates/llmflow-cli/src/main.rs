//! llmflow command-line entry point.
//!
//! Binary name: `llmflow`
//!
//! Parses CLI arguments, loads `llmflow.toml`, then dispatches to the
//! run, graph, or replay command handler.

mod cli;
mod config;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,llmflow=debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Shell completions don't need config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "llmflow", &mut std::io::stdout());
        return Ok(());
    }

    let engine_config = config::load_engine_config(cli.config.as_deref());

    match cli.command {
        Commands::Run(args) => cli::run::run_workflow(args, &engine_config, cli.json)?,
        Commands::Graph { workflow } => cli::graph::show_graph(&workflow, cli.json)?,
        Commands::Replay(args) => cli::replay::replay_run(args, cli.json)?,
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
