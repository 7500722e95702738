//! Step, tool, and validator registries.
//!
//! Registries are plain constructed values: build them during setup, wrap
//! the capability registries in `Arc`, and hand them to the runner. Nothing
//! is registered globally, and nothing is mutated once a run starts.

use std::collections::HashMap;

use llmflow_types::workflow::{JsonMap, StepDefinition};
use serde_json::Value;
use thiserror::Error;

use super::handlers::{self, HandlerContext, StepError, StepHandler};

/// Builds a handler for one step definition.
pub type StepFactory = Box<
    dyn Fn(&StepDefinition, &HandlerContext) -> Result<Box<dyn StepHandler>, StepError>
        + Send
        + Sync,
>;

/// A tool: takes the step inputs, returns a JSON object.
pub type ToolFn = Box<dyn Fn(&JsonMap) -> anyhow::Result<Value> + Send + Sync>;

/// A validator: returns `true` or `null` to pass, `false` to fail.
pub type ValidatorFn = Box<dyn Fn(&JsonMap) -> Value + Send + Sync>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Registration and lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} must be non-empty")]
    EmptyName { kind: &'static str },

    #[error("{kind} '{name}' already registered")]
    Duplicate { kind: &'static str, name: String },

    #[error("step type '{0}' is not registered")]
    StepNotFound(String),

    #[error("tool '{0}' is not registered")]
    ToolNotFound(String),

    #[error("validator '{0}' is not registered")]
    ValidatorNotFound(String),
}

/// Trim `name` and check it is non-empty and not yet taken.
fn checked_name<T>(
    entries: &HashMap<String, T>,
    name: &str,
    kind: &'static str,
) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::EmptyName { kind });
    }
    if entries.contains_key(name) {
        return Err(RegistryError::Duplicate {
            kind,
            name: name.to_string(),
        });
    }
    Ok(name.to_string())
}

// ---------------------------------------------------------------------------
// StepRegistry
// ---------------------------------------------------------------------------

/// Step type -> handler factory.
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the `llm`, `tool`, and `validate` types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert("llm".to_string(), Box::new(handlers::llm::build));
        registry
            .factories
            .insert("tool".to_string(), Box::new(handlers::tool::build));
        registry
            .factories
            .insert("validate".to_string(), Box::new(handlers::validate::build));
        registry
    }

    /// Register a factory for `step_type`.
    ///
    /// Fails if the trimmed type is empty or already registered.
    pub fn register<F>(&mut self, step_type: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&StepDefinition, &HandlerContext) -> Result<Box<dyn StepHandler>, StepError>
            + Send
            + Sync
            + 'static,
    {
        let step_type = checked_name(&self.factories, step_type, "step type")?;
        tracing::debug!(step_type = step_type.as_str(), "registered step type");
        self.factories.insert(step_type, Box::new(factory));
        Ok(())
    }

    /// Look up the factory for `step_type`.
    pub fn get(&self, step_type: &str) -> Result<&StepFactory, RegistryError> {
        self.factories
            .get(step_type)
            .ok_or_else(|| RegistryError::StepNotFound(step_type.to_string()))
    }

    /// Build the handler for `definition` using the factory for its type.
    pub fn create(
        &self,
        definition: &StepDefinition,
        ctx: &HandlerContext,
    ) -> Result<Box<dyn StepHandler>, StepError> {
        let factory = self.get(&definition.step_type)?;
        factory(definition, ctx)
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.factories.contains_key(step_type)
    }

    /// Registered step types, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ---------------------------------------------------------------------------
// ToolRegistry
// ---------------------------------------------------------------------------

/// Tool name -> callable.
pub struct ToolRegistry {
    tools: HashMap<String, ToolFn>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool under `name`.
    pub fn register<F>(&mut self, name: &str, tool: F) -> Result<(), RegistryError>
    where
        F: Fn(&JsonMap) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let name = checked_name(&self.tools, name, "tool name")?;
        self.tools.insert(name, Box::new(tool));
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Result<&ToolFn, RegistryError> {
        self.tools
            .get(name)
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))
    }

    /// Invoke a tool and require a JSON object back.
    ///
    /// Failures (including a non-object result) come back as
    /// [`StepError::ToolExecution`] with the tool's own error as the source.
    pub fn call(&self, name: &str, inputs: &JsonMap) -> Result<JsonMap, StepError> {
        let tool = self.get(name)?;
        tracing::debug!(tool = name, "calling tool");

        match tool(inputs) {
            Ok(Value::Object(output)) => Ok(output),
            Ok(other) => Err(StepError::ToolExecution {
                tool: name.to_string(),
                source: format!("must return a JSON object, got {}", json_kind(&other)).into(),
            }),
            Err(err) => Err(StepError::ToolExecution {
                tool: name.to_string(),
                source: err.into(),
            }),
        }
    }

    /// Registered tool names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ValidatorRegistry
// ---------------------------------------------------------------------------

/// Validator name -> predicate.
pub struct ValidatorRegistry {
    validators: HashMap<String, ValidatorFn>,
}

impl ValidatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// Register a validator under `name`.
    pub fn register<F>(&mut self, name: &str, validator: F) -> Result<(), RegistryError>
    where
        F: Fn(&JsonMap) -> Value + Send + Sync + 'static,
    {
        let name = checked_name(&self.validators, name, "validator name")?;
        self.validators.insert(name, Box::new(validator));
        Ok(())
    }

    /// Look up a validator by name.
    pub fn get(&self, name: &str) -> Result<&ValidatorFn, RegistryError> {
        self.validators
            .get(name)
            .ok_or_else(|| RegistryError::ValidatorNotFound(name.to_string()))
    }

    /// Run a validator. `true` and `null` pass; `false` and anything else fail.
    pub fn validate(&self, name: &str, inputs: &JsonMap) -> Result<(), StepError> {
        let validator = self.get(name)?;
        match validator(inputs) {
            Value::Null | Value::Bool(true) => Ok(()),
            Value::Bool(false) => Err(StepError::ValidationRule(format!(
                "validator '{name}' failed"
            ))),
            other => Err(StepError::ValidationRule(format!(
                "validator '{name}' must return true, false, or nothing (got {})",
                json_kind(&other)
            ))),
        }
    }

    /// Registered validator names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::mock::MockProvider;
    use crate::workflow::handlers::StepTrace;
    use serde_json::json;

    struct Echo;

    impl StepHandler for Echo {
        fn execute(&self, inputs: &JsonMap, _trace: &mut StepTrace) -> Result<JsonMap, StepError> {
            Ok(inputs.clone())
        }
    }

    fn context() -> HandlerContext {
        HandlerContext::new(
            Arc::new(MockProvider::new()),
            Arc::new(ToolRegistry::new()),
            Arc::new(ValidatorRegistry::new()),
        )
    }

    fn step(id: &str, step_type: &str) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            step_type: step_type.to_string(),
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // StepRegistry
    // -----------------------------------------------------------------------

    #[test]
    fn test_builtins_registered() {
        let registry = StepRegistry::with_builtins();
        assert_eq!(registry.registered_types(), vec!["llm", "tool", "validate"]);
    }

    #[test]
    fn test_register_and_create_extension_type() {
        let mut registry = StepRegistry::new();
        registry
            .register("echo", |_def, _ctx| Ok(Box::new(Echo)))
            .unwrap();
        assert!(registry.contains("echo"));

        let handler = registry.create(&step("e", "echo"), &context()).unwrap();
        let inputs = json!({"a": 1}).as_object().cloned().unwrap();
        let output = handler.execute(&inputs, &mut StepTrace::default()).unwrap();
        assert_eq!(output, inputs);
    }

    #[test]
    fn test_register_rejects_empty_and_duplicate_types() {
        let mut registry = StepRegistry::with_builtins();
        let err = registry
            .register("  ", |_def, _ctx| Ok(Box::new(Echo)))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyName { kind: "step type" });

        let err = registry
            .register(" tool ", |_def, _ctx| Ok(Box::new(Echo)))
            .unwrap_err();
        assert_eq!(err.to_string(), "step type 'tool' already registered");
    }

    #[test]
    fn test_unknown_step_type() {
        let registry = StepRegistry::with_builtins();
        assert!(matches!(
            registry.get("missing"),
            Err(RegistryError::StepNotFound(_))
        ));
        let err = registry.create(&step("x", "missing"), &context()).err().unwrap();
        assert!(matches!(err, StepError::Registry(RegistryError::StepNotFound(_))));
        assert_eq!(err.to_string(), "step type 'missing' is not registered");
    }

    #[test]
    fn test_factory_config_errors_surface() {
        let registry = StepRegistry::with_builtins();
        // tool step without `tool:` block
        let err = registry.create(&step("t", "tool"), &context()).err().unwrap();
        assert!(matches!(err, StepError::Config(_)));
    }

    // -----------------------------------------------------------------------
    // ToolRegistry
    // -----------------------------------------------------------------------

    #[test]
    fn test_tool_call_returns_object() {
        let mut tools = ToolRegistry::new();
        tools
            .register("double", |inputs| {
                let x = inputs.get("x").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!({"y": x * 2}))
            })
            .unwrap();
        let inputs = json!({"x": 21}).as_object().cloned().unwrap();
        let output = tools.call("double", &inputs).unwrap();
        assert_eq!(Value::Object(output), json!({"y": 42}));
    }

    #[test]
    fn test_tool_non_object_result_is_execution_error() {
        let mut tools = ToolRegistry::new();
        tools.register("list", |_| Ok(json!([1, 2]))).unwrap();
        let err = tools.call("list", &JsonMap::new()).unwrap_err();
        assert!(matches!(err, StepError::ToolExecution { ref tool, .. } if tool == "list"));
        assert!(err.to_string().contains("must return a JSON object, got array"));
    }

    #[test]
    fn test_tool_failure_keeps_cause() {
        let mut tools = ToolRegistry::new();
        tools
            .register("boom", |_| Err(anyhow::anyhow!("disk on fire")))
            .unwrap();
        let err = tools.call("boom", &JsonMap::new()).unwrap_err();
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn test_tool_registration_rules() {
        let mut tools = ToolRegistry::new();
        tools.register("t", |_| Ok(json!({}))).unwrap();
        assert!(matches!(
            tools.register("t", |_| Ok(json!({}))),
            Err(RegistryError::Duplicate { .. })
        ));
        assert!(matches!(
            tools.register("", |_| Ok(json!({}))),
            Err(RegistryError::EmptyName { .. })
        ));
        assert!(matches!(
            tools.call("nope", &JsonMap::new()),
            Err(StepError::Registry(RegistryError::ToolNotFound(_)))
        ));
        assert_eq!(tools.list_names(), vec!["t"]);
    }

    // -----------------------------------------------------------------------
    // ValidatorRegistry
    // -----------------------------------------------------------------------

    #[test]
    fn test_validator_results() {
        let mut validators = ValidatorRegistry::new();
        validators.register("yes", |_| json!(true)).unwrap();
        validators.register("silent", |_| Value::Null).unwrap();
        validators.register("no", |_| json!(false)).unwrap();
        validators.register("weird", |_| json!("ok")).unwrap();

        let inputs = JsonMap::new();
        assert!(validators.validate("yes", &inputs).is_ok());
        assert!(validators.validate("silent", &inputs).is_ok());

        let err = validators.validate("no", &inputs).unwrap_err();
        assert!(matches!(err, StepError::ValidationRule(_)));
        assert!(err.to_string().contains("'no'"));

        let err = validators.validate("weird", &inputs).unwrap_err();
        assert!(err.to_string().contains("must return true, false, or nothing"));

        assert!(matches!(
            validators.validate("ghost", &inputs),
            Err(StepError::Registry(RegistryError::ValidatorNotFound(_)))
        ));
    }
}
