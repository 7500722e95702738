//! `validate` step handler.
//!
//! Checks run in a fixed order and the first failure stops the step:
//!
//! 1. required keys are present
//! 2. non-empty keys hold something (null, `""`, `[]`, and `{}` are empty)
//! 3. keys with an allowed-value list hold one of those values
//! 4. named validators from the registry pass
//!
//! On success the inputs pass through unchanged, so a validate step can sit
//! inline in a pipeline without altering downstream data.

use std::sync::Arc;

use llmflow_types::workflow::{JsonMap, StepDefinition, ValidateConfig};
use serde_json::Value;

use super::{HandlerContext, StepError, StepHandler, StepTrace};
use crate::workflow::registry::ValidatorRegistry;

pub struct ValidateHandler {
    config: ValidateConfig,
    validators: Arc<ValidatorRegistry>,
}

impl ValidateHandler {
    pub fn new(
        definition: &StepDefinition,
        validators: Arc<ValidatorRegistry>,
    ) -> Result<Self, StepError> {
        let config = definition.validate.clone().ok_or_else(|| {
            StepError::Config("validate step requires 'validate' config".to_string())
        })?;
        Ok(Self { config, validators })
    }
}

impl StepHandler for ValidateHandler {
    fn execute(&self, inputs: &JsonMap, _trace: &mut StepTrace) -> Result<JsonMap, StepError> {
        check_required(inputs, &self.config)?;
        check_non_empty(inputs, &self.config)?;
        check_allowed_values(inputs, &self.config)?;
        for name in &self.config.validators {
            self.validators.validate(name, inputs)?;
        }
        Ok(inputs.clone())
    }
}

/// Factory registered under the `validate` step type.
pub fn build(
    definition: &StepDefinition,
    ctx: &HandlerContext,
) -> Result<Box<dyn StepHandler>, StepError> {
    Ok(Box::new(ValidateHandler::new(definition, ctx.validators.clone())?))
}

fn check_required(inputs: &JsonMap, config: &ValidateConfig) -> Result<(), StepError> {
    match config.required.iter().find(|key| !inputs.contains_key(key.as_str())) {
        Some(key) => Err(StepError::ValidationRule(format!(
            "missing required field '{key}'"
        ))),
        None => Ok(()),
    }
}

fn check_non_empty(inputs: &JsonMap, config: &ValidateConfig) -> Result<(), StepError> {
    for key in &config.non_empty {
        if is_empty(inputs.get(key)) {
            return Err(StepError::ValidationRule(format!(
                "field '{key}' must be non-empty"
            )));
        }
    }
    Ok(())
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn check_allowed_values(inputs: &JsonMap, config: &ValidateConfig) -> Result<(), StepError> {
    for (key, allowed) in &config.allowed_values {
        let Some(value) = inputs.get(key) else {
            continue;
        };
        if !allowed.iter().any(|candidate| values_equal(candidate, value)) {
            let allowed_str = allowed
                .iter()
                .map(display_value)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(StepError::ValidationRule(format!(
                "field '{key}' must be one of: {allowed_str}"
            )));
        }
    }
    Ok(())
}

/// Structural equality, except that numbers compare by value (`1 == 1.0`).
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a == b
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                a == b
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Strings print bare; everything else prints as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
