//! Engine configuration types for llmflow.
//!
//! `EngineConfig` represents the optional `llmflow.toml` that sets defaults
//! for where runs are recorded and how the provider is labelled.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
///
/// Loaded from `llmflow.toml` in the working directory (or `--config`). All
/// fields have defaults; command-line flags override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base directory under which run directories are created.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Provider label recorded in run metadata. `None` uses the provider's own name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(".runs")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: default_artifacts_dir(),
            provider_name: None,
        }
    }
}
