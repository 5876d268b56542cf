//! LLM access for flowgate workflows
//!
//! Two layers:
//! - `LlmBackend`: one provider round-trip (messages in, tool calls or a final
//!   answer out). Implemented by the OpenAI-compatible HTTP backend and
//!   wrapped by `BudgetedBackend`.
//! - `StructuredGenerate`: prompt + `Schema` in, validated `TypedResult` out,
//!   running the tool-call loop on top of a backend.

mod budgeted_backend;
pub(crate) mod http_client;
mod openai_backend;
mod schema;
mod structured;
mod tools;
mod types;

use std::sync::Arc;

use flowgate_config::Config;
use tracing::debug;

pub use budgeted_backend::BudgetedBackend;
pub use flowgate_utils::error::{GenerationError, LlmError, SchemaError};
pub use schema::{Field, FieldType, Schema, SchemaBuilder, Structured, TypedResult};
pub use structured::{GenerationRequest, LlmGenerator, StructuredGenerate};
pub use tools::{ToolFn, ToolRegistry};
pub use types::{
    LlmBackend, LlmInvocation, LlmOutput, LlmResult, Message, ResponseFormat, Role,
    ToolCallRequest, ToolDefinition,
};

use openai_backend::OpenAiCompatibleBackend;

/// Construct the configured provider backend, wrapped in a call budget.
///
/// # Errors
///
/// - `LlmError::Unsupported` for an unknown provider
/// - `LlmError::Misconfiguration` when the API key variable is unset
pub fn from_config(config: &Config) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let provider = config.provider();

    let backend: Arc<dyn LlmBackend> = match provider {
        "openai" | "openrouter" => Arc::new(OpenAiCompatibleBackend::new_from_config(config)?),
        other => {
            return Err(LlmError::Unsupported(format!(
                "Unknown LLM provider '{}'. Supported providers: {}",
                other,
                flowgate_config::SUPPORTED_PROVIDERS.join(", ")
            )));
        }
    };

    debug!(provider, model = config.model(), "Constructed LLM backend");
    Ok(Arc::new(BudgetedBackend::with_limit_from_config(
        backend,
        config.llm.budget,
    )))
}

/// Backend from `from_config` plus the structured-generation settings.
///
/// # Errors
///
/// Same as [`from_config`].
pub fn generator_from_config(config: &Config) -> Result<LlmGenerator, LlmError> {
    let backend = from_config(config)?;
    let mut generator = LlmGenerator::new(backend, config.model(), config.llm_timeout())
        .with_max_tool_rounds(config.max_tool_rounds());
    if let Some(temperature) = config.llm.temperature {
        generator = generator.with_temperature(temperature);
    }
    Ok(generator)
}
