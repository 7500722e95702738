//! Workflow engine core: definition loading, DAG ordering, step execution,
//! run artifacts, and replay.
//!
//! - `definition` -- YAML parsing, path resolution, structural validation
//! - `dag` -- dependency graph and Kahn ordering with cycle reporting
//! - `registry` -- step type, tool, and validator registries
//! - `handlers` -- the `llm`, `tool`, and `validate` step handlers
//! - `template` -- strict Handlebars prompt rendering
//! - `canonical` -- canonical JSON used for every artifact
//! - `artifacts` -- run directory writer and metadata
//! - `runner` -- sequential execution of one run
//! - `replay` -- offline verification of a recorded run

pub mod artifacts;
pub mod canonical;
pub mod dag;
pub mod definition;
pub mod handlers;
pub mod registry;
pub mod replay;
pub mod runner;
pub mod template;
