//! `llmflow graph`: show a workflow's execution order.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use llmflow_core::workflow::definition::Workflow;

/// Handle `llmflow graph`.
pub fn show_graph(path: &Path, json: bool) -> Result<()> {
    let workflow = Workflow::load(path)
        .with_context(|| format!("Failed to load workflow {}", path.display()))?;
    let graph = workflow.graph()?;

    if json {
        let out = serde_json::json!({
            "workflow": workflow.name(),
            "version": workflow.version(),
            "order": graph.order,
            "edges": graph.edges,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Depends on"),
        ]);

    for (index, step_id) in graph.order.iter().enumerate() {
        let Some(step) = workflow.spec.steps.iter().find(|s| &s.id == step_id) else {
            continue;
        };
        let deps = if step.depends_on.is_empty() {
            "-".to_string()
        } else {
            step.depends_on.join(", ")
        };
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(step_id),
            Cell::new(&step.step_type),
            Cell::new(deps),
        ]);
    }

    println!();
    println!(
        "  Execution order for '{}' (v{})",
        style(workflow.name()).cyan(),
        workflow.version()
    );
    println!();
    println!("{table}");
    println!();

    Ok(())
}
