//! Confidence scores and the single threshold comparison used everywhere.
//!
//! A score passes a threshold only when it is strictly greater (`score >
//! threshold`); a score equal to the threshold does not pass.

use std::fmt;

use flowgate_config::DEFAULT_CONFIDENCE_THRESHOLD;
use flowgate_llm::{SchemaError, TypedResult};

use crate::error::WorkflowError;

/// A model-reported confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
    /// Returns `None` for values outside `[0, 1]` or NaN.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        (0.0..=1.0).contains(&value).then_some(Self(value))
    }

    /// Read a numeric confidence field from a generation result.
    ///
    /// # Errors
    ///
    /// `SchemaError::TypeMismatch` when the field is absent, not a number, or
    /// outside `[0, 1]`.
    pub fn from_field(result: &TypedResult, field: &str) -> Result<Self, SchemaError> {
        let raw = result.get(field);
        raw.and_then(|v| v.as_f64())
            .and_then(Self::new)
            .ok_or_else(|| SchemaError::TypeMismatch {
                schema: result.schema_name().to_string(),
                field: field.to_string(),
                expected: "number in [0, 1]".to_string(),
                found: raw.map_or_else(|| "nothing".to_string(), |v| v.to_string()),
            })
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn passes(self, threshold: ConfidenceThreshold) -> bool {
        self.0 > threshold.0
    }
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Minimum confidence a routing or gating decision must strictly exceed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceThreshold(f64);

impl ConfidenceThreshold {
    /// # Errors
    ///
    /// `WorkflowError::Misconfigured` for values outside `[0, 1]` or NaN.
    pub fn new(value: f64) -> Result<Self, WorkflowError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(WorkflowError::Misconfigured(format!(
                "confidence threshold must be within [0, 1], got {value}"
            )))
        }
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for ConfidenceThreshold {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl fmt::Display for ConfidenceThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Gate that passes when `flag_field` is `true` and `confidence_field`
/// exceeds `threshold`. Missing or malformed fields fail the gate.
pub fn flag_with_confidence(
    flag_field: impl Into<String>,
    confidence_field: impl Into<String>,
    threshold: ConfidenceThreshold,
) -> impl Fn(&TypedResult) -> bool + Send + Sync + 'static {
    let flag_field = flag_field.into();
    let confidence_field = confidence_field.into();
    move |result| {
        result.get_bool(&flag_field) == Some(true)
            && ConfidenceScore::from_field(result, &confidence_field)
                .is_ok_and(|score| score.passes(threshold))
    }
}
