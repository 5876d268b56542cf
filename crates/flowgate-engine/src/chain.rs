//! Sequential generation stages with quality gates.
//!
//! Each stage builds its prompt from the running [`ChainContext`] (the
//! initial input plus every earlier stage's result, by stage name), generates
//! against its schema, and may gate on the new result. A failed gate stops the
//! chain immediately; later stages never run.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use flowgate_config::DEFAULT_CALL_TIMEOUT_SECS;
use flowgate_llm::{Schema, StructuredGenerate, TypedResult};

use crate::call::generate_bounded;
use crate::error::WorkflowError;
use crate::prompt::Prompt;

/// Builds a stage prompt from the chain so far.
pub type PromptFn = Arc<dyn Fn(&ChainContext) -> Prompt + Send + Sync>;

/// Decides whether the chain may continue past a stage.
pub type GateFn = Arc<dyn Fn(&TypedResult) -> bool + Send + Sync>;

/// One step of a chain. Immutable once added to an executor.
#[derive(Clone)]
pub struct Stage {
    name: String,
    schema: Schema,
    prompt: PromptFn,
    gate: Option<GateFn>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("schema", &self.schema.name())
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl Stage {
    pub fn new<F>(name: impl Into<String>, schema: Schema, prompt: F) -> Self
    where
        F: Fn(&ChainContext) -> Prompt + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            schema,
            prompt: Arc::new(prompt),
            gate: None,
        }
    }

    /// Stop the chain unless `gate` accepts this stage's result.
    #[must_use]
    pub fn gated<G>(mut self, gate: G) -> Self
    where
        G: Fn(&TypedResult) -> bool + Send + Sync + 'static,
    {
        self.gate = Some(Arc::new(gate));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Inputs visible to a stage's prompt builder.
#[derive(Debug, Clone)]
pub struct ChainContext {
    input: String,
    results: Vec<(String, TypedResult)>,
}

impl ChainContext {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            results: Vec::new(),
        }
    }

    /// The chain's initial input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Result of an earlier stage.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&TypedResult> {
        self.results
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, result)| result)
    }

    /// Result of the most recent stage.
    #[must_use]
    pub fn last(&self) -> Option<&TypedResult> {
        self.results.last().map(|(_, result)| result)
    }

    /// Stage names completed so far, in order.
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|(name, _)| name.as_str())
    }
}

/// How a chain run ended.
#[derive(Debug, Clone)]
pub enum ChainOutcome {
    /// Every stage ran; `output` is the final stage's result.
    Completed { output: TypedResult, context: ChainContext },
    /// The gate of `stage` rejected its result.
    Gated { stage: String, result: TypedResult },
    /// No stages configured.
    Empty,
}

impl ChainOutcome {
    /// Final output when the chain completed.
    #[must_use]
    pub fn into_output(self) -> Option<TypedResult> {
        match self {
            Self::Completed { output, .. } => Some(output),
            Self::Gated { .. } | Self::Empty => None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Runs stages strictly in order, one generation at a time.
pub struct ChainExecutor {
    generator: Arc<dyn StructuredGenerate>,
    stages: Vec<Stage>,
    call_timeout: Duration,
}

impl fmt::Debug for ChainExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainExecutor")
            .field("stages", &self.stages)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

pub struct ChainBuilder {
    generator: Arc<dyn StructuredGenerate>,
    stages: Vec<Stage>,
    call_timeout: Duration,
}

impl ChainBuilder {
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// `WorkflowError::Misconfigured` when two stages share a name (results
    /// are addressed by stage name).
    pub fn build(self) -> Result<ChainExecutor, WorkflowError> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(WorkflowError::Misconfigured(format!(
                    "chain declares stage '{}' twice",
                    stage.name
                )));
            }
        }
        Ok(ChainExecutor {
            generator: self.generator,
            stages: self.stages,
            call_timeout: self.call_timeout,
        })
    }
}

impl ChainExecutor {
    #[must_use]
    pub fn builder(generator: Arc<dyn StructuredGenerate>) -> ChainBuilder {
        ChainBuilder {
            generator,
            stages: Vec::new(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run the chain; `Ok(None)` when a gate stopped it or it has no stages.
    ///
    /// # Errors
    ///
    /// The first stage failure (generation, schema violation, timeout).
    pub async fn run(&self, input: &str) -> Result<Option<TypedResult>, WorkflowError> {
        Ok(self.execute(input).await?.into_output())
    }

    /// Run the chain and report which stage, if any, stopped it.
    ///
    /// # Errors
    ///
    /// The first stage failure (generation, schema violation, timeout).
    pub async fn execute(&self, input: &str) -> Result<ChainOutcome, WorkflowError> {
        if self.stages.is_empty() {
            debug!("Chain has no stages");
            return Ok(ChainOutcome::Empty);
        }

        let mut context = ChainContext::new(input);
        for (index, stage) in self.stages.iter().enumerate() {
            info!(stage = %stage.name, position = index + 1, total = self.stages.len(), "Running chain stage");

            let request = (stage.prompt)(&context).into_request(
                stage.name.clone(),
                stage.schema.clone(),
                None,
            );
            let result =
                generate_bounded(self.generator.as_ref(), &request, self.call_timeout).await?;

            if let Some(gate) = &stage.gate
                && !gate(&result)
            {
                warn!(stage = %stage.name, result = %result, "Gate rejected stage result; stopping chain");
                return Ok(ChainOutcome::Gated {
                    stage: stage.name.clone(),
                    result,
                });
            }

            debug!(stage = %stage.name, "Stage complete");
            context.results.push((stage.name.clone(), result));
        }

        let output = context
            .last()
            .cloned()
            .ok_or_else(|| WorkflowError::Misconfigured("chain produced no result".to_string()))?;
        info!(stages = self.stages.len(), "Chain completed");
        Ok(ChainOutcome::Completed { output, context })
    }
}
