//! Draft → human decision → approve, regenerate, or stop.
//!
//! The loop is an explicit state machine. Regenerations are capped by
//! `max_retries`; a retry decision arriving after the cap ends in
//! `Exhausted`, which is distinct from an explicit cancellation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use flowgate_config::{Config, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_MAX_RETRIES};
use flowgate_llm::{FieldType, Message, Schema, StructuredGenerate};

use crate::call::generate_bounded;
use crate::decision::{ApprovalDecision, DecisionSource};
use crate::error::WorkflowError;
use crate::prompt::Prompt;

const DRAFT_SCHEMA: &str = "approval_draft";
const DRAFT_FIELD: &str = "text";

/// User turn answering a rejected draft when drafts are carried forward.
const REJECTION_TURN: &str =
    "That draft was rejected. Write a different response to my original request.";

/// `WorkflowError::Timeout` operation name for an unanswered draft.
pub const DECISION_OPERATION: &str = "approval decision";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Drafting,
    AwaitingDecision,
    Approved,
    Retrying,
    Cancelled,
    Exhausted,
}

impl ApprovalState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Cancelled | Self::Exhausted)
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drafting => "drafting",
            Self::AwaitingDecision => "awaiting_decision",
            Self::Approved => "approved",
            Self::Retrying => "retrying",
            Self::Cancelled => "cancelled",
            Self::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Terminal result of an approval loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    /// `Approved`, `Cancelled` or `Exhausted`.
    pub state: ApprovalState,
    /// Last draft presented for a decision.
    pub draft: String,
    /// Total drafts generated, including the first.
    pub drafts_generated: u32,
    /// Every state entered, starting with `Drafting`.
    pub transitions: Vec<ApprovalState>,
}

impl ApprovalOutcome {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.state == ApprovalState::Approved
    }

    /// The approved draft.
    ///
    /// # Errors
    ///
    /// `WorkflowError::Cancelled` or `WorkflowError::Exhausted` when the loop
    /// did not end in approval.
    pub fn into_approved(self) -> Result<String, WorkflowError> {
        match self.state {
            ApprovalState::Approved => Ok(self.draft),
            ApprovalState::Exhausted => Err(WorkflowError::Exhausted {
                regenerations: self.drafts_generated.saturating_sub(1),
            }),
            _ => Err(WorkflowError::Cancelled {
                drafts: self.drafts_generated,
            }),
        }
    }
}

/// `prompt`, then each rejected draft as the assistant's answer, with a
/// rejection between consecutive drafts.
fn rejection_history(prompt: &str, rejected: &[String]) -> Vec<Message> {
    let mut history = vec![Message::user(prompt)];
    for (i, draft) in rejected.iter().enumerate() {
        if i > 0 {
            history.push(Message::user(REJECTION_TURN));
        }
        history.push(Message::assistant(
            serde_json::json!({ DRAFT_FIELD: draft }).to_string(),
        ));
    }
    history
}

pub struct ApprovalLoop {
    generator: Arc<dyn StructuredGenerate>,
    decisions: Arc<dyn DecisionSource>,
    schema: Schema,
    instructions: Option<String>,
    max_retries: u32,
    carry_rejected_drafts: bool,
    call_timeout: Duration,
    decision_timeout: Option<Duration>,
}

impl fmt::Debug for ApprovalLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalLoop")
            .field("max_retries", &self.max_retries)
            .field("carry_rejected_drafts", &self.carry_rejected_drafts)
            .field("call_timeout", &self.call_timeout)
            .field("decision_timeout", &self.decision_timeout)
            .finish_non_exhaustive()
    }
}

impl ApprovalLoop {
    /// # Errors
    ///
    /// Never in practice; the draft schema is fixed.
    pub fn new(
        generator: Arc<dyn StructuredGenerate>,
        decisions: Arc<dyn DecisionSource>,
    ) -> Result<Self, WorkflowError> {
        let schema = Schema::builder(DRAFT_SCHEMA)
            .description("A draft response for human review")
            .described_field(DRAFT_FIELD, FieldType::String, "The complete draft text")
            .build()?;
        Ok(Self {
            generator,
            decisions,
            schema,
            instructions: None,
            max_retries: DEFAULT_MAX_RETRIES,
            carry_rejected_drafts: false,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            decision_timeout: None,
        })
    }

    /// Apply `[workflows]` settings.
    #[must_use]
    pub fn with_config(self, config: &Config) -> Self {
        Self {
            max_retries: config.max_retries(),
            carry_rejected_drafts: config.carry_rejected_drafts(),
            call_timeout: config.call_timeout(),
            decision_timeout: config.decision_timeout(),
            ..self
        }
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replay earlier rejected drafts as assistant turns, each answered by a
    /// rejection, ahead of every regeneration.
    #[must_use]
    pub fn carry_rejected_drafts(mut self, carry: bool) -> Self {
        self.carry_rejected_drafts = carry;
        self
    }

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

    /// Bound the wait for each decision; `None` waits indefinitely.
    #[must_use]
    pub fn decision_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.decision_timeout = timeout;
        self
    }

    fn draft_prompt(&self, prompt: &str, rejected: &[String]) -> Prompt {
        let carried = self.carry_rejected_drafts && !rejected.is_empty();
        let mut draft_prompt = if carried {
            Prompt::new(REJECTION_TURN).with_history(rejection_history(prompt, rejected))
        } else {
            Prompt::new(prompt)
        };
        if let Some(instructions) = &self.instructions {
            draft_prompt = draft_prompt.with_instructions(instructions.clone());
        }
        draft_prompt
    }

    async fn generate_draft(&self, prompt: &str, rejected: &[String]) -> Result<String, WorkflowError> {
        let request = self
            .draft_prompt(prompt, rejected)
            .into_request(DRAFT_SCHEMA, self.schema.clone(), None);
        let result = generate_bounded(self.generator.as_ref(), &request, self.call_timeout).await?;
        Ok(result.get_str(DRAFT_FIELD).unwrap_or_default().to_string())
    }

    async fn await_decision(&self, draft: &str) -> Result<ApprovalDecision, WorkflowError> {
        let Some(timeout) = self.decision_timeout else {
            return self.decisions.decide(draft).await;
        };
        match tokio::time::timeout(timeout, self.decisions.decide(draft)).await {
            Ok(decision) => decision,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "No decision before timeout");
                Err(WorkflowError::Timeout {
                    operation: DECISION_OPERATION.to_string(),
                    duration: timeout,
                })
            }
        }
    }

    /// Run until a terminal state.
    ///
    /// # Errors
    ///
    /// Generation failures, decision-source failures and
    /// `WorkflowError::Timeout` when no decision arrives within the decision
    /// timeout. Cancellation and exhaustion are outcomes, not errors; see
    /// [`ApprovalOutcome::into_approved`].
    pub async fn run(&self, prompt: &str) -> Result<ApprovalOutcome, WorkflowError> {
        let mut state = ApprovalState::Drafting;
        let mut transitions = vec![state];
        let mut draft = String::new();
        let mut rejected: Vec<String> = Vec::new();
        let mut drafts_generated = 0u32;
        let mut regenerations = 0u32;

        while !state.is_terminal() {
            let next = match state {
                ApprovalState::Drafting => {
                    draft = self.generate_draft(prompt, &rejected).await?;
                    drafts_generated += 1;
                    debug!(drafts_generated, "Draft generated");
                    ApprovalState::AwaitingDecision
                }
                ApprovalState::AwaitingDecision => {
                    let decision = self.await_decision(&draft).await?;
                    info!(decision = %decision, drafts_generated, "Decision received");
                    match decision {
                        ApprovalDecision::Approve => ApprovalState::Approved,
                        ApprovalDecision::Retry => ApprovalState::Retrying,
                        ApprovalDecision::Cancel => ApprovalState::Cancelled,
                    }
                }
                ApprovalState::Retrying => {
                    if regenerations >= self.max_retries {
                        warn!(max_retries = self.max_retries, "Retry limit reached");
                        ApprovalState::Exhausted
                    } else {
                        regenerations += 1;
                        rejected.push(std::mem::take(&mut draft));
                        ApprovalState::Drafting
                    }
                }
                ApprovalState::Approved | ApprovalState::Cancelled | ApprovalState::Exhausted => {
                    break;
                }
            };
            debug!(from = %state, to = %next, "Approval transition");
            state = next;
            transitions.push(state);
        }

        info!(state = %state, drafts_generated, "Approval loop finished");
        Ok(ApprovalOutcome {
            state,
            draft,
            drafts_generated,
            transitions,
        })
    }
}
