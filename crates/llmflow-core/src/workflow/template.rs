//! Prompt template rendering.
//!
//! Prompts are Handlebars templates rendered against `{"inputs": <step
//! inputs>}`. Strict mode is always on, so a reference to a missing input is
//! an error instead of an empty string, and HTML escaping is disabled because
//! the output is a prompt, not markup.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use llmflow_types::workflow::JsonMap;
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while rendering a prompt.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read prompt file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render prompt {}: {source}", .path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

/// Strict Handlebars renderer for prompt templates.
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl PromptRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render template text against `inputs`. `origin` is only used in errors.
    pub fn render_str(
        &self,
        template: &str,
        inputs: &JsonMap,
        origin: &Path,
    ) -> Result<String, TemplateError> {
        self.handlebars
            .render_template(template, &json!({ "inputs": inputs }))
            .map_err(|source| TemplateError::Render {
                path: origin.to_path_buf(),
                source: Box::new(source),
            })
    }

    /// Read the template at `path` and render it against `inputs`.
    pub fn render_file(&self, path: &Path, inputs: &JsonMap) -> Result<String, TemplateError> {
        let template = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.render_str(&template, inputs, path)
    }
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}
