//! Intent classification over a closed label set, then dispatch.
//!
//! The classification schema is derived from the declared labels, and the
//! label→handler map is checked for completeness when the router is built.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use flowgate_config::DEFAULT_CALL_TIMEOUT_SECS;
use flowgate_llm::{FieldType, Schema, SchemaError, StructuredGenerate};

use crate::call::generate_bounded;
use crate::confidence::{ConfidenceScore, ConfidenceThreshold};
use crate::error::WorkflowError;
use crate::prompt::Prompt;

const LABEL_FIELD: &str = "label";
const CONFIDENCE_FIELD: &str = "confidence";
const RATIONALE_FIELD: &str = "rationale";

/// Result of one classification call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    #[serde(serialize_with = "serialize_score")]
    pub confidence: ConfidenceScore,
    pub rationale: String,
}

fn serialize_score<S: serde::Serializer>(score: &ConfidenceScore, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(score.value())
}

/// Handles inputs classified under one label.
///
/// Implemented for any `Fn(String, Classification) -> impl Future`, so
/// handlers can be plain async closures.
#[async_trait]
pub trait IntentHandler<T>: Send + Sync {
    async fn handle(
        &self,
        input: &str,
        classification: &Classification,
    ) -> Result<T, WorkflowError>;
}

#[async_trait]
impl<T, F, Fut> IntentHandler<T> for F
where
    T: Send + 'static,
    F: Fn(String, Classification) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, WorkflowError>> + Send + 'static,
{
    async fn handle(
        &self,
        input: &str,
        classification: &Classification,
    ) -> Result<T, WorkflowError> {
        self(input.to_string(), classification.clone()).await
    }
}

/// Routes free-form input to exactly one handler.
pub struct IntentRouter<T> {
    generator: Arc<dyn StructuredGenerate>,
    name: String,
    schema: Schema,
    labels: Vec<(String, String)>,
    handlers: BTreeMap<String, Arc<dyn IntentHandler<T>>>,
    instructions: Option<String>,
    call_timeout: Duration,
}

impl<T> fmt::Debug for IntentRouter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentRouter")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

pub struct RouterBuilder<T> {
    generator: Arc<dyn StructuredGenerate>,
    name: String,
    labels: Vec<(String, String)>,
    handlers: Vec<(String, Arc<dyn IntentHandler<T>>)>,
    instructions: Option<String>,
    call_timeout: Duration,
}

impl<T: Send + 'static> RouterBuilder<T> {
    /// Declare a label and what it means to the classifier.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>, description: impl Into<String>) -> Self {
        self.labels.push((label.into(), description.into()));
        self
    }

    #[must_use]
    pub fn handler<H>(mut self, label: impl Into<String>, handler: H) -> Self
    where
        H: IntentHandler<T> + 'static,
    {
        let handler: Arc<dyn IntentHandler<T>> = Arc::new(handler);
        self.handlers.push((label.into(), handler));
        self
    }

    /// Extra classifier instructions, placed before the label list.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// `WorkflowError::Misconfigured` when no labels are declared, a label or
    /// handler is declared twice, a label has no handler, or a handler names
    /// an undeclared label.
    pub fn build(self) -> Result<IntentRouter<T>, WorkflowError> {
        if self.labels.is_empty() {
            return Err(WorkflowError::Misconfigured(format!(
                "router '{}' declares no labels",
                self.name
            )));
        }

        let declared: BTreeSet<&str> = self.labels.iter().map(|(l, _)| l.as_str()).collect();
        if declared.len() != self.labels.len() {
            return Err(WorkflowError::Misconfigured(format!(
                "router '{}' declares a label twice",
                self.name
            )));
        }

        let mut handlers = BTreeMap::new();
        for (label, handler) in self.handlers {
            if !declared.contains(label.as_str()) {
                return Err(WorkflowError::Misconfigured(format!(
                    "router '{}' has a handler for undeclared label '{}'",
                    self.name, label
                )));
            }
            if handlers.insert(label.clone(), handler).is_some() {
                return Err(WorkflowError::Misconfigured(format!(
                    "router '{}' has two handlers for label '{}'",
                    self.name, label
                )));
            }
        }

        let missing: Vec<&str> = declared
            .iter()
            .filter(|label| !handlers.contains_key(**label))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(WorkflowError::Misconfigured(format!(
                "router '{}' has no handler for label(s): {}",
                self.name,
                missing.join(", ")
            )));
        }

        let schema = Schema::builder(format!("{}_classification", self.name))
            .description("Classification of the input into one declared label")
            .described_field(
                LABEL_FIELD,
                FieldType::enumeration(self.labels.iter().map(|(l, _)| l.clone())),
                "The single best matching label",
            )
            .described_field(
                CONFIDENCE_FIELD,
                FieldType::Number,
                "Confidence in the label, between 0 and 1",
            )
            .described_field(
                RATIONALE_FIELD,
                FieldType::String,
                "One sentence explaining the choice",
            )
            .build()?;

        Ok(IntentRouter {
            generator: self.generator,
            name: self.name,
            schema,
            labels: self.labels,
            handlers,
            instructions: self.instructions,
            call_timeout: self.call_timeout,
        })
    }
}

impl<T: Send + 'static> IntentRouter<T> {
    /// Start a router named `name`; the name prefixes the classification
    /// schema and appears in logs.
    #[must_use]
    pub fn builder(generator: Arc<dyn StructuredGenerate>, name: impl Into<String>) -> RouterBuilder<T> {
        RouterBuilder {
            generator,
            name: name.into(),
            labels: Vec::new(),
            handlers: Vec::new(),
            instructions: None,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.labels.iter().map(|(l, _)| l.as_str()).collect()
    }

    #[must_use]
    pub fn classification_schema(&self) -> &Schema {
        &self.schema
    }

    fn classification_prompt(&self, input: &str) -> Prompt {
        let mut instructions = String::new();
        if let Some(extra) = &self.instructions {
            instructions.push_str(extra);
            instructions.push_str("\n\n");
        }
        instructions.push_str("Classify the input into exactly one of these labels:\n");
        for (label, description) in &self.labels {
            instructions.push_str(&format!("- {label}: {description}\n"));
        }
        Prompt::new(format!("Input: {input}")).with_instructions(instructions)
    }

    /// One classification call; does not dispatch.
    ///
    /// # Errors
    ///
    /// `WorkflowError::UnknownLabel` when the model answers outside the
    /// declared set; generation failures otherwise.
    pub async fn classify(&self, input: &str) -> Result<Classification, WorkflowError> {
        let request = self
            .classification_prompt(input)
            .into_request(self.schema.name(), self.schema.clone(), None);

        let result = match generate_bounded(self.generator.as_ref(), &request, self.call_timeout).await {
            Ok(result) => result,
            Err(WorkflowError::SchemaViolation(SchemaError::InvalidEnumValue {
                field,
                value,
                allowed,
                ..
            })) if field == LABEL_FIELD => {
                return Err(WorkflowError::UnknownLabel {
                    label: value,
                    declared: allowed,
                });
            }
            Err(e) => return Err(e),
        };

        let label = result
            .get_str(LABEL_FIELD)
            .ok_or_else(|| SchemaError::MissingField {
                schema: self.schema.name().to_string(),
                field: LABEL_FIELD.to_string(),
            })?
            .to_string();
        let confidence = ConfidenceScore::from_field(&result, CONFIDENCE_FIELD)?;
        let rationale = result.get_str(RATIONALE_FIELD).unwrap_or_default().to_string();

        info!(router = %self.name, label = %label, confidence = %confidence, "Input classified");
        Ok(Classification {
            label,
            confidence,
            rationale,
        })
    }

    async fn dispatch(
        &self,
        input: &str,
        classification: &Classification,
    ) -> Result<T, WorkflowError> {
        let handler = self.handlers.get(&classification.label).ok_or_else(|| {
            WorkflowError::UnknownLabel {
                label: classification.label.clone(),
                declared: self.labels().into_iter().map(String::from).collect(),
            }
        })?;
        info!(router = %self.name, label = %classification.label, "Dispatching to handler");
        handler.handle(input, classification).await
    }

    /// Classify and always dispatch; the classification is returned to the
    /// caller alongside the handler's result.
    ///
    /// # Errors
    ///
    /// Classification failures, `UnknownLabel`, or the handler's own error.
    pub async fn route(&self, input: &str) -> Result<(T, Classification), WorkflowError> {
        let classification = self.classify(input).await?;
        let output = self.dispatch(input, &classification).await?;
        Ok((output, classification))
    }

    /// Like [`route`](Self::route), but returns `Ok(None)` without dispatching
    /// when the confidence does not exceed `threshold`.
    ///
    /// # Errors
    ///
    /// Same as [`route`](Self::route).
    pub async fn route_guarded(
        &self,
        input: &str,
        threshold: ConfidenceThreshold,
    ) -> Result<Option<(T, Classification)>, WorkflowError> {
        let classification = self.classify(input).await?;
        if !classification.confidence.passes(threshold) {
            warn!(
                router = %self.name,
                label = %classification.label,
                confidence = %classification.confidence,
                threshold = %threshold,
                "Confidence too low; not dispatching"
            );
            return Ok(None);
        }
        let output = self.dispatch(input, &classification).await?;
        Ok(Some((output, classification)))
    }
}
