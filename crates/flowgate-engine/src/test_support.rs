//! Deterministic `StructuredGenerate` fake for workflow tests.
//!
//! Responses are scripted per step name and parsed against the request's
//! schema, so schema violations surface exactly as they would from a model.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use flowgate_llm::{
    GenerationError, GenerationRequest, LlmError, Message, StructuredGenerate, TypedResult,
};

#[derive(Clone)]
enum Scripted {
    Value { value: Value, delay: Duration },
    Error(GenerationError),
    Panic,
}

/// One recorded generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub step: String,
    pub prompt: String,
    pub instructions: Option<String>,
    pub history: Vec<Message>,
}

/// Replays scripted outputs keyed by `GenerationRequest::step`.
///
/// Each step holds a queue; the last entry repeats once the queue is drained.
/// Unscripted steps fail with a transport error.
#[derive(Default)]
pub struct FakeGenerator {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: &str, entry: Scripted) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(step.to_string())
            .or_default()
            .push_back(entry);
        self
    }

    #[must_use]
    pub fn respond(self, step: &str, value: Value) -> Self {
        self.respond_after(step, Duration::ZERO, value)
    }

    #[must_use]
    pub fn respond_after(self, step: &str, delay: Duration, value: Value) -> Self {
        self.push(step, Scripted::Value { value, delay })
    }

    #[must_use]
    pub fn fail(self, step: &str, error: GenerationError) -> Self {
        self.push(step, Scripted::Error(error))
    }

    /// The step's task panics when called.
    #[must_use]
    pub fn panic_on(self, step: &str) -> Self {
        self.push(step, Scripted::Panic)
    }

    /// Every call in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[must_use]
    pub fn steps_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.step).collect()
    }

    #[must_use]
    pub fn call_count(&self, step: &str) -> usize {
        self.calls().iter().filter(|c| c.step == step).count()
    }

    fn next_for(&self, step: &str) -> Option<Scripted> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let queue = script.get_mut(step)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl StructuredGenerate for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<TypedResult, GenerationError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                step: request.step.clone(),
                prompt: request.prompt.clone(),
                instructions: request.instructions.clone(),
                history: request.history.clone(),
            });

        match self.next_for(&request.step) {
            Some(Scripted::Value { value, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(request.schema.parse(value)?)
            }
            Some(Scripted::Error(error)) => Err(error),
            Some(Scripted::Panic) => panic!("scripted panic in step '{}'", request.step),
            None => Err(GenerationError::Llm(LlmError::Transport(format!(
                "no scripted response for step '{}'",
                request.step
            )))),
        }
    }
}
