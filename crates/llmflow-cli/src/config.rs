//! Engine configuration loader.
//!
//! Reads `llmflow.toml` (or the file given with `--config`) and deserializes
//! it into [`EngineConfig`]. Falls back to defaults when the file is missing
//! or malformed.

use std::path::Path;

use llmflow_types::config::EngineConfig;

/// Config file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "llmflow.toml";

/// Load engine configuration from `path`, or `./llmflow.toml` when `None`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub fn load_engine_config(path: Option<&Path>) -> EngineConfig {
    let config_path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));

    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}
