//! `tool` step handler: delegates to a named function in the tool registry.

use std::sync::Arc;

use llmflow_types::workflow::{JsonMap, StepDefinition};

use super::{HandlerContext, StepError, StepHandler, StepTrace};
use crate::workflow::registry::ToolRegistry;

/// Calls one registered tool with the step's inputs and returns its output verbatim.
pub struct ToolHandler {
    tool_name: String,
    tools: Arc<ToolRegistry>,
}

impl ToolHandler {
    pub fn new(definition: &StepDefinition, tools: Arc<ToolRegistry>) -> Result<Self, StepError> {
        let tool_name = definition
            .tool
            .as_ref()
            .map(|tool| tool.name.trim())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StepError::Config("tool step requires 'tool' config".to_string()))?;

        Ok(Self {
            tool_name: tool_name.to_string(),
            tools,
        })
    }
}

impl StepHandler for ToolHandler {
    fn execute(&self, inputs: &JsonMap, _trace: &mut StepTrace) -> Result<JsonMap, StepError> {
        self.tools.call(&self.tool_name, inputs)
    }
}

/// Factory registered under the `tool` step type.
pub fn build(
    definition: &StepDefinition,
    ctx: &HandlerContext,
) -> Result<Box<dyn StepHandler>, StepError> {
    Ok(Box::new(ToolHandler::new(definition, ctx.tools.clone())?))
}
