//! Shared domain types for llmflow.
//!
//! This crate contains the data model used across the workspace: workflow
//! definitions, provider request/response payloads, run metadata, and engine
//! configuration.
//!
//! Zero infrastructure dependencies -- only serde, indexmap, thiserror.

pub mod config;
pub mod llm;
pub mod run;
pub mod workflow;
