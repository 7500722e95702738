//! Workflow execution core for llmflow.
//!
//! Builds a deterministic execution order from a step list, dispatches each
//! step to a registered handler, records every input, output, and
//! intermediate artifact under a hashed run directory, and replays recorded
//! runs to verify their outputs. Everything here is synchronous; a run
//! executes on the caller's thread, one step at a time.

pub mod hash;
pub mod llm;
pub mod workflow;
