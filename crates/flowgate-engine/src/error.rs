//! Workflow-level error taxonomy.
//!
//! Gate rejections and low-confidence routing are not errors; they surface as
//! explicit absence (`Ok(None)`, `ChainOutcome::Gated`). Everything here is a
//! failure the caller has to handle.

use std::time::Duration;
use thiserror::Error;

use flowgate_utils::error::{
    ErrorCategory, GenerationError, LlmError, SchemaError, UserFriendlyError,
};
use flowgate_utils::exit_codes::ExitCode;

use crate::approval::DECISION_OPERATION;
use crate::parallel::ValidationOutcome;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Schema violation: {0}")]
    SchemaViolation(SchemaError),

    #[error("Classifier returned label '{label}' outside the declared set {declared:?}")]
    UnknownLabel { label: String, declared: Vec<String> },

    #[error("Model called unregistered tool '{name}' (registered: {available:?})")]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Tool '{name}' failed: {reason}")]
    ToolFailed { name: String, reason: String },

    #[error("No final answer after {rounds} tool-call rounds")]
    ToolRoundsExceeded { rounds: u32 },

    #[error("Validation rejected: {} of {} checks did not pass", rejected_count(.outcomes), .outcomes.len())]
    AggregateFailure { outcomes: Vec<ValidationOutcome> },

    #[error("Approval not granted after {regenerations} regenerations (max_retries reached)")]
    Exhausted { regenerations: u32 },

    #[error("Approval cancelled after {drafts} draft(s)")]
    Cancelled { drafts: u32 },

    #[error("LLM backend error: {0}")]
    Generation(LlmError),

    #[error("{operation} timed out after {}s", .duration.as_secs_f64())]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("No approval decision could be read: {0}")]
    DecisionUnavailable(String),

    #[error("Workflow misconfigured: {0}")]
    Misconfigured(String),
}

fn rejected_count(outcomes: &[ValidationOutcome]) -> usize {
    outcomes.iter().filter(|o| !o.passed()).count()
}

impl From<SchemaError> for WorkflowError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::InvalidDefinition { .. } => Self::Misconfigured(err.to_string()),
            other => Self::SchemaViolation(other),
        }
    }
}

impl From<LlmError> for WorkflowError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout { duration } => Self::Timeout {
                operation: "LLM request".to_string(),
                duration,
            },
            other => Self::Generation(other),
        }
    }
}

impl From<GenerationError> for WorkflowError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Llm(e) => e.into(),
            GenerationError::Schema(e) => e.into(),
            GenerationError::UnknownTool { name, available } => {
                Self::UnknownTool { name, available }
            }
            GenerationError::ToolFailed { name, reason } => Self::ToolFailed { name, reason },
            GenerationError::ToolRoundsExceeded { rounds } => Self::ToolRoundsExceeded { rounds },
        }
    }
}

impl WorkflowError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Misconfigured(_) => ExitCode::CONFIG,
            Self::AggregateFailure { .. } => ExitCode::VALIDATION_REJECTED,
            Self::Exhausted { .. } | Self::Cancelled { .. } => ExitCode::APPROVAL_NOT_GRANTED,
            Self::Timeout { .. } => ExitCode::TIMEOUT,
            Self::DecisionUnavailable(_) => ExitCode::INTERNAL,
            Self::Generation(e) => e.to_exit_code(),
            Self::SchemaViolation(_)
            | Self::UnknownLabel { .. }
            | Self::UnknownTool { .. }
            | Self::ToolFailed { .. }
            | Self::ToolRoundsExceeded { .. } => ExitCode::LLM_FAILURE,
        }
    }
}

impl UserFriendlyError for WorkflowError {
    fn user_message(&self) -> String {
        match self {
            Self::SchemaViolation(e) => e.user_message(),
            Self::Generation(e) => e.user_message(),
            Self::AggregateFailure { outcomes } => {
                let failed: Vec<&str> = outcomes
                    .iter()
                    .filter(|o| !o.passed())
                    .map(|o| o.check.as_str())
                    .collect();
                format!("Input rejected by validation checks: {}", failed.join(", "))
            }
            Self::Exhausted { regenerations } => format!(
                "No draft was approved; the retry limit was reached after {regenerations} regenerations"
            ),
            Self::Cancelled { .. } => "The draft was not approved".to_string(),
            Self::Timeout { operation, duration } if operation == DECISION_OPERATION => format!(
                "No approval decision arrived within {}s",
                duration.as_secs_f64()
            ),
            Self::DecisionUnavailable(_) => {
                "The approval prompt could not read a decision from the terminal".to_string()
            }
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::SchemaViolation(e) => e.context(),
            Self::Generation(e) => e.context(),
            Self::UnknownLabel { .. } => Some(
                "The classifier may only answer with a declared label; there is no default handler."
                    .to_string(),
            ),
            Self::AggregateFailure { outcomes } => Some(
                outcomes
                    .iter()
                    .map(|o| format!("{}: {}", o.check, o.verdict))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Self::Timeout { operation, .. } if operation == DECISION_OPERATION => Some(
                "Each draft waits at most [workflows.approval] decision_timeout_secs for a decision."
                    .to_string(),
            ),
            Self::DecisionUnavailable(reason) => Some(reason.clone()),
            Self::Timeout { .. } => Some(
                "Every generation call is bounded by [workflows] call_timeout_secs.".to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::SchemaViolation(e) => e.suggestions(),
            Self::Generation(e) => e.suggestions(),
            Self::UnknownLabel { declared, .. } => vec![format!(
                "Retry, or tighten the classifier instructions to the labels: {}",
                declared.join(", ")
            )],
            Self::UnknownTool { available, .. } => vec![format!(
                "Registered tools: {}",
                available.join(", ")
            )],
            Self::ToolFailed { .. } => {
                vec!["Check the tool's input data (for example the knowledge file)".to_string()]
            }
            Self::ToolRoundsExceeded { .. } => vec!["Increase [llm] max_tool_rounds".to_string()],
            Self::Exhausted { .. } => vec![
                "Raise [workflows.approval] max_retries".to_string(),
                "Enable carry_rejected_drafts so regenerations see earlier rejections".to_string(),
            ],
            Self::Timeout { operation, .. } if operation == DECISION_OPERATION => vec![
                "Increase [workflows.approval] decision_timeout_secs, or set it to 0 to wait indefinitely"
                    .to_string(),
            ],
            Self::DecisionUnavailable(_) => vec![
                "Run the approve command from an interactive terminal".to_string(),
                "Pipe decisions on stdin, one per line (approve / retry / cancel)".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase [workflows] call_timeout_secs".to_string(),
                "Check connectivity to the LLM provider".to_string(),
            ],
            Self::Misconfigured(_) => {
                vec!["Fix the workflow definition before running it".to_string()]
            }
            Self::AggregateFailure { .. } | Self::Cancelled { .. } => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::SchemaViolation(_) => ErrorCategory::Schema,
            Self::UnknownLabel { .. } => ErrorCategory::Routing,
            Self::UnknownTool { .. } | Self::ToolFailed { .. } | Self::ToolRoundsExceeded { .. } => {
                ErrorCategory::Generation
            }
            Self::AggregateFailure { .. } => ErrorCategory::Validation,
            Self::Exhausted { .. } | Self::Cancelled { .. } | Self::DecisionUnavailable(_) => {
                ErrorCategory::Approval
            }
            Self::Generation(e) => e.category(),
            Self::Timeout { .. } => ErrorCategory::Generation,
            Self::Misconfigured(_) => ErrorCategory::Configuration,
        }
    }
}
