//! Provider trait definition.
//!
//! This is the seam between the execution core and whatever actually talks to
//! a model. Calls are synchronous: the runner executes one step at a time and
//! waits for each response before moving on.

use llmflow_types::llm::{ProviderError, ProviderRequest, ProviderResponse};

/// Trait for LLM provider backends.
///
/// Implementations must be shareable across threads so that one provider
/// can serve several independent runs.
pub trait Provider: Send + Sync {
    /// Human-readable provider name (e.g. "mock", "openai"). Recorded in run
    /// metadata unless the run overrides it.
    fn name(&self) -> &str;

    /// Send a request and return the full response.
    fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}
