//! Prompt assembly for workflow steps.

use std::sync::Arc;

use serde_json::Value;

use flowgate_llm::{GenerationRequest, Message, Schema, ToolRegistry};

/// Text sent for one generation: the task prompt plus optional instructions
/// that become the system message, and any earlier conversation turns.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    text: String,
    instructions: Option<String>,
    history: Vec<Message>,
}

impl Prompt {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            instructions: None,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Earlier turns the prompt follows on from, oldest first.
    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Append a titled block of context below the prompt text.
    #[must_use]
    pub fn with_section(mut self, title: &str, body: impl AsRef<str>) -> Self {
        self.text.push_str("\n\n");
        self.text.push_str(title);
        self.text.push_str(":\n");
        self.text.push_str(body.as_ref());
        self
    }

    /// Append a JSON payload (a prior result, knowledge data) as context.
    #[must_use]
    pub fn with_json_section(self, title: &str, value: &Value) -> Self {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        self.with_section(title, body)
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub(crate) fn into_request(
        self,
        step: impl Into<String>,
        schema: Schema,
        tools: Option<Arc<ToolRegistry>>,
    ) -> GenerationRequest {
        let mut request = GenerationRequest::new(step, schema, self.text).with_history(self.history);
        if let Some(instructions) = self.instructions {
            request = request.with_instructions(instructions);
        }
        if let Some(tools) = tools {
            request = request.with_tools(tools);
        }
        request
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
