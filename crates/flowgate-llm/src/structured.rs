//! Structured generation: prompt + schema in, conforming [`TypedResult`] out.
//!
//! [`StructuredGenerate`] is the single capability the workflow components
//! depend on. [`LlmGenerator`] implements it over any [`LlmBackend`], running
//! the tool-call loop until the model produces a final answer.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use flowgate_utils::error::GenerationError;

use crate::schema::{Schema, TypedResult};
use crate::tools::ToolRegistry;
use crate::types::{LlmBackend, LlmInvocation, LlmOutput, Message};

/// One structured-generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Workflow step issuing the call (stage, check or handler name).
    pub step: String,
    pub prompt: String,
    /// System-level instructions placed before the prompt.
    pub instructions: Option<String>,
    pub schema: Schema,
    /// Tools the model may call while producing this output.
    pub tools: Option<Arc<ToolRegistry>>,
    /// Earlier user/assistant turns, resent ahead of `prompt` so it can refer
    /// back to them.
    pub history: Vec<Message>,
}

impl GenerationRequest {
    pub fn new(step: impl Into<String>, schema: Schema, prompt: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            prompt: prompt.into(),
            instructions: None,
            schema,
            tools: None,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Produce a value conforming to the request's schema, or fail.
///
/// Implementations hide all model non-determinism; workflow components are
/// tested against deterministic fakes of this trait.
#[async_trait]
pub trait StructuredGenerate: Send + Sync {
    /// # Errors
    ///
    /// Any [`GenerationError`]; schema violations are never retried here.
    async fn generate(&self, request: &GenerationRequest) -> Result<TypedResult, GenerationError>;
}

/// [`StructuredGenerate`] over an [`LlmBackend`].
pub struct LlmGenerator {
    backend: Arc<dyn LlmBackend>,
    model: String,
    timeout: Duration,
    max_tool_rounds: u32,
    temperature: Option<f32>,
}

impl LlmGenerator {
    /// `model` may be empty to use the backend's default.
    pub fn new(backend: Arc<dyn LlmBackend>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout,
            max_tool_rounds: 4,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn initial_messages(request: &GenerationRequest) -> Vec<Message> {
        let mut system = String::new();
        if let Some(instructions) = &request.instructions {
            system.push_str(instructions);
            system.push_str("\n\n");
        }
        system.push_str(&format!(
            "Reply with a single JSON object matching the '{}' schema. \
             Include every field; use null for unknown optional values.",
            request.schema.name()
        ));
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(request.history.iter().cloned());
        messages.push(Message::user(request.prompt.clone()));
        messages
    }
}

#[async_trait]
impl StructuredGenerate for LlmGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<TypedResult, GenerationError> {
        let mut messages = Self::initial_messages(request);
        let tool_definitions = request
            .tools
            .as_ref()
            .map(|t| t.definitions())
            .unwrap_or_default();
        let mut rounds = 0u32;

        loop {
            let mut inv = LlmInvocation::new(
                request.step.clone(),
                self.model.clone(),
                self.timeout,
                messages.clone(),
            )
            .with_tools(tool_definitions.clone())
            .with_response_format(request.schema.response_format());
            if let Some(temperature) = self.temperature {
                inv = inv.with_metadata("temperature", json!(temperature));
            }

            let result = self.backend.invoke(inv).await?;
            debug!(
                step = %request.step,
                provider = %result.provider,
                model = %result.model_used,
                round = rounds,
                "Backend responded"
            );

            match result.output {
                LlmOutput::FinalAnswer(text) => {
                    return request.schema.parse_text(&text).map_err(|e| {
                        warn!(step = %request.step, error = %e, "Model output violates schema");
                        GenerationError::from(e)
                    });
                }
                LlmOutput::ToolCalls(calls) => {
                    if rounds >= self.max_tool_rounds {
                        return Err(GenerationError::ToolRoundsExceeded {
                            rounds: self.max_tool_rounds,
                        });
                    }
                    rounds += 1;

                    let registry = request.tools.as_deref();
                    let mut outputs = Vec::with_capacity(calls.len());
                    for call in &calls {
                        let output = match registry {
                            Some(registry) => registry.call(call)?,
                            None => {
                                return Err(GenerationError::UnknownTool {
                                    name: call.name.clone(),
                                    available: Vec::new(),
                                });
                            }
                        };
                        outputs.push(Message::tool_result(call.id.clone(), output.to_string()));
                    }
                    messages.push(Message::assistant_tool_calls(calls));
                    messages.extend(outputs);
                }
            }
        }
    }
}
