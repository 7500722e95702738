//! `llm` step handler.
//!
//! Renders the step's prompt template, sends it to the provider, and accepts
//! the reply only if it is a JSON object that matches the step's output
//! schema (draft 7).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use llmflow_types::llm::ProviderRequest;
use llmflow_types::workflow::{JsonMap, LlmConfig, StepDefinition};
use serde_json::{Value, json};

use super::{HandlerContext, StepError, StepHandler, StepTrace};
use crate::llm::provider::Provider;
use crate::workflow::template::PromptRenderer;

pub struct LlmHandler {
    prompt_path: PathBuf,
    schema_path: PathBuf,
    model: String,
    parameters: JsonMap,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    seed: Option<i64>,
    provider: Arc<dyn Provider>,
    renderer: PromptRenderer,
}

impl LlmHandler {
    pub fn new(definition: &StepDefinition, provider: Arc<dyn Provider>) -> Result<Self, StepError> {
        let prompt_path = definition
            .prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| StepError::Config("llm step requires 'prompt'".to_string()))?;
        let schema_path = definition
            .output_schema
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| StepError::Config("llm step requires 'output_schema'".to_string()))?;

        let config = definition.llm.clone().unwrap_or_default();
        let model = config
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| StepError::Config("llm config requires 'model'".to_string()))?
            .to_string();
        let parameters = merged_parameters(&config)?;

        Ok(Self {
            prompt_path: PathBuf::from(prompt_path),
            schema_path: PathBuf::from(schema_path),
            model,
            parameters,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            seed: config.seed,
            provider,
            renderer: PromptRenderer::new(),
        })
    }

    fn request(&self, prompt: &str) -> Result<ProviderRequest, StepError> {
        let mut request = ProviderRequest::with_prompt(&self.model, prompt)?;
        request.parameters = self.parameters.clone();
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.seed = self.seed;
        Ok(request)
    }
}

/// `parameters` plus any unrecognized keys of the `llm` block, the latter winning.
fn merged_parameters(config: &LlmConfig) -> Result<JsonMap, StepError> {
    let mut parameters = match &config.parameters {
        None | Some(Value::Null) => JsonMap::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(StepError::Config(
                "llm config 'parameters' must be a mapping".to_string(),
            ));
        }
    };
    for (key, value) in &config.extra {
        parameters.insert(key.clone(), value.clone());
    }
    Ok(parameters)
}

impl StepHandler for LlmHandler {
    fn execute(&self, inputs: &JsonMap, trace: &mut StepTrace) -> Result<JsonMap, StepError> {
        let prompt = self.renderer.render_file(&self.prompt_path, inputs)?;
        trace.rendered_prompt = Some(prompt.clone());

        let request = self.request(&prompt)?;
        let result = self.provider.call(&request);
        trace.llm_call = Some(json!({
            "request": request,
            "response": result.as_ref().ok(),
        }));
        let response = result?;

        let output = parse_object(&response.output_text)?;
        check_schema(&self.schema_path, &output)?;
        Ok(output)
    }
}

/// Factory registered under the `llm` step type.
pub fn build(
    definition: &StepDefinition,
    ctx: &HandlerContext,
) -> Result<Box<dyn StepHandler>, StepError> {
    Ok(Box::new(LlmHandler::new(definition, ctx.provider.clone())?))
}

fn parse_object(text: &str) -> Result<JsonMap, StepError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| StepError::OutputValidation(format!("llm output is not valid JSON: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StepError::OutputValidation(
            "llm output must be a JSON object".to_string(),
        )),
    }
}

fn check_schema(path: &Path, output: &JsonMap) -> Result<(), StepError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        StepError::OutputSchema(format!(
            "failed to read output schema {}: {e}",
            path.display()
        ))
    })?;
    let schema: Value = serde_json::from_str(&raw).map_err(|e| {
        StepError::OutputSchema(format!(
            "output schema {} is not valid JSON: {e}",
            path.display()
        ))
    })?;
    let validator = jsonschema::draft7::new(&schema).map_err(|e| {
        StepError::OutputSchema(format!(
            "output schema {} is invalid: {e}",
            path.display()
        ))
    })?;

    let instance = Value::Object(output.clone());
    match validator.iter_errors(&instance).next() {
        Some(error) => Err(StepError::OutputValidation(format!(
            "llm output failed schema validation: {error}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockProvider;
    use llmflow_types::llm::ProviderError;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"{
        "type": "object",
        "required": ["title"],
        "properties": {"title": {"type": "string"}}
    }"#;

    struct Fixture {
        _dir: TempDir,
        definition: StepDefinition,
    }

    fn fixture(prompt: &str, llm: Value) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let prompt_path = dir.path().join("prompt.md");
        let schema_path = dir.path().join("schema.json");
        std::fs::write(&prompt_path, prompt).unwrap();
        std::fs::write(&schema_path, SCHEMA).unwrap();

        let definition = StepDefinition {
            id: "draft".to_string(),
            step_type: "llm".to_string(),
            prompt: Some(prompt_path.display().to_string()),
            output_schema: Some(schema_path.display().to_string()),
            llm: Some(serde_json::from_value(llm).unwrap()),
            ..Default::default()
        };
        Fixture {
            _dir: dir,
            definition,
        }
    }

    fn inputs(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    fn handler(fixture: &Fixture, provider: MockProvider) -> LlmHandler {
        LlmHandler::new(&fixture.definition, Arc::new(provider)).unwrap()
    }

    #[test]
    fn test_config_requirements() {
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new());
        let f = fixture("x", json!({"model": "m"}));

        let mut def = f.definition.clone();
        def.prompt = None;
        let err = LlmHandler::new(&def, provider.clone()).err().unwrap();
        assert_eq!(err.to_string(), "invalid step config: llm step requires 'prompt'");

        let mut def = f.definition.clone();
        def.output_schema = None;
        let err = LlmHandler::new(&def, provider.clone()).err().unwrap();
        assert!(err.to_string().contains("'output_schema'"));

        let mut def = f.definition.clone();
        def.llm = None;
        let err = LlmHandler::new(&def, provider.clone()).err().unwrap();
        assert!(err.to_string().contains("'model'"));

        let mut def = f.definition.clone();
        def.llm = Some(serde_json::from_value(json!({"model": "m", "parameters": [1]})).unwrap());
        let err = LlmHandler::new(&def, provider).err().unwrap();
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn test_renders_calls_and_validates() {
        let f = fixture(
            "Title for {{inputs.topic}}",
            json!({"model": "m", "temperature": 0.2, "seed": 7}),
        );
        let provider =
            MockProvider::new().respond("prompt:Title for graphs", r#"{"title": "On Graphs"}"#);
        let h = handler(&f, provider);

        let mut trace = StepTrace::default();
        let output = h
            .execute(&inputs(json!({"topic": "graphs"})), &mut trace)
            .unwrap();

        assert_eq!(Value::Object(output), json!({"title": "On Graphs"}));
        assert_eq!(trace.rendered_prompt.as_deref(), Some("Title for graphs"));
        let call = trace.llm_call.unwrap();
        assert_eq!(call["request"]["model"], "m");
        assert_eq!(call["request"]["prompt"], "Title for graphs");
        assert_eq!(call["request"]["seed"], 7);
        assert_eq!(call["response"]["output_text"], r#"{"title": "On Graphs"}"#);
    }

    #[test]
    fn test_parameters_merge_extra_keys() {
        let f = fixture(
            "x",
            json!({"model": "m", "parameters": {"top_p": 0.5, "stop": "a"}, "stop": "b"}),
        );
        let h = handler(&f, MockProvider::new());
        assert_eq!(Value::Object(h.parameters.clone()), json!({"top_p": 0.5, "stop": "b"}));
    }

    #[test]
    fn test_undefined_variable_is_render_error() {
        let f = fixture("{{inputs.missing}}", json!({"model": "m"}));
        let h = handler(&f, MockProvider::with_default_output("{}"));

        let mut trace = StepTrace::default();
        let err = h.execute(&JsonMap::new(), &mut trace).unwrap_err();
        assert!(matches!(err, StepError::Render(_)));
        assert_eq!(err.kind(), "render_error");
        assert!(trace.rendered_prompt.is_none());
        assert!(trace.llm_call.is_none());
    }

    #[test]
    fn test_provider_failure_still_traces_request() {
        let f = fixture("hello", json!({"model": "m"}));
        let h = handler(&f, MockProvider::new());

        let mut trace = StepTrace::default();
        let err = h.execute(&JsonMap::new(), &mut trace).unwrap_err();
        assert!(matches!(err, StepError::Provider(ProviderError::CallFailed(_))));
        let call = trace.llm_call.unwrap();
        assert_eq!(call["request"]["prompt"], "hello");
        assert!(call["response"].is_null());
    }

    #[test]
    fn test_whitespace_prompt_is_request_error() {
        let f = fixture("  {{inputs.blank}}  ", json!({"model": "m"}));
        let h = handler(&f, MockProvider::with_default_output("{}"));

        let err = h
            .execute(&inputs(json!({"blank": ""})), &mut StepTrace::default())
            .unwrap_err();
        assert!(matches!(err, StepError::Provider(ProviderError::InvalidRequest(_))));
    }

    #[test]
    fn test_non_object_and_unparsable_output() {
        let f = fixture("x", json!({"model": "m"}));

        let h = handler(&f, MockProvider::with_default_output("[1, 2]"));
        let err = h.execute(&JsonMap::new(), &mut StepTrace::default()).unwrap_err();
        assert_eq!(err.to_string(), "llm output must be a JSON object");

        let h = handler(&f, MockProvider::with_default_output("not json"));
        let err = h.execute(&JsonMap::new(), &mut StepTrace::default()).unwrap_err();
        assert!(matches!(err, StepError::OutputValidation(_)));
        assert!(err.to_string().starts_with("llm output is not valid JSON"));
    }

    #[test]
    fn test_schema_mismatch() {
        let f = fixture("x", json!({"model": "m"}));
        let h = handler(&f, MockProvider::with_default_output(r#"{"title": 5}"#));
        let err = h.execute(&JsonMap::new(), &mut StepTrace::default()).unwrap_err();
        assert_eq!(err.kind(), "output_validation_error");
        assert!(err.to_string().starts_with("llm output failed schema validation"));
    }

    #[test]
    fn test_broken_schema_file() {
        let f = fixture("x", json!({"model": "m"}));
        let schema_path = PathBuf::from(f.definition.output_schema.clone().unwrap());
        std::fs::write(&schema_path, "{ nope").unwrap();

        let h = handler(&f, MockProvider::with_default_output(r#"{"title": "t"}"#));
        let err = h.execute(&JsonMap::new(), &mut StepTrace::default()).unwrap_err();
        assert!(matches!(err, StepError::OutputSchema(_)));

        std::fs::remove_file(&schema_path).unwrap();
        let err = h.execute(&JsonMap::new(), &mut StepTrace::default()).unwrap_err();
        assert!(matches!(err, StepError::OutputSchema(_)));
    }
}
