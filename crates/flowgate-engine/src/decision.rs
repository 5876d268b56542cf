//! Human decisions on generated drafts.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::WorkflowError;

/// Tri-state verdict on one draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Retry,
    Cancel,
}

impl ApprovalDecision {
    /// Map free-text input by its first word, case-insensitively.
    ///
    /// `approve…`, `yes`, `y` approve; `retry…`, `r`, `regenerate` retry;
    /// anything else, including empty input, cancels. Nothing ambiguous is
    /// ever read as approval.
    #[must_use]
    pub fn from_response(response: &str) -> Self {
        let word = response
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match word.as_str() {
            "yes" | "y" => Self::Approve,
            "r" | "regenerate" => Self::Retry,
            w if w.starts_with("approve") => Self::Approve,
            w if w.starts_with("retry") => Self::Retry,
            _ => Self::Cancel,
        }
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Retry => write!(f, "retry"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// Presents a draft and returns the human's decision.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// # Errors
    ///
    /// Implementations may fail when their input channel is unavailable.
    async fn decide(&self, draft: &str) -> Result<ApprovalDecision, WorkflowError>;
}

/// Replays a fixed decision sequence; cancels once it runs out.
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    queue: Mutex<VecDeque<ApprovalDecision>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedDecisions {
    pub fn new(decisions: impl IntoIterator<Item = ApprovalDecision>) -> Self {
        Self {
            queue: Mutex::new(decisions.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Drafts presented so far.
    #[must_use]
    pub fn drafts_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecisions {
    async fn decide(&self, draft: &str) -> Result<ApprovalDecision, WorkflowError> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(draft.to_string());
        Ok(self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(ApprovalDecision::Cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approve_words() {
        for input in ["approve", "Approved!", "APPROVE it", "yes", "Y", "  y  "] {
            assert_eq!(ApprovalDecision::from_response(input), ApprovalDecision::Approve, "{input}");
        }
    }

    #[test]
    fn test_retry_words() {
        for input in ["retry", "Retrying please", "r", "regenerate", "REGENERATE now"] {
            assert_eq!(ApprovalDecision::from_response(input), ApprovalDecision::Retry, "{input}");
        }
    }

    #[test]
    fn test_everything_else_cancels() {
        for input in ["", "   ", "no", "maybe", "yesterday", "ok", "s", "app", "re"] {
            assert_eq!(ApprovalDecision::from_response(input), ApprovalDecision::Cancel, "{input}");
        }
    }

    #[test]
    fn test_only_first_word_counts() {
        assert_eq!(ApprovalDecision::from_response("no, approve"), ApprovalDecision::Cancel);
    }

    #[tokio::test]
    async fn test_scripted_decisions_cancel_when_exhausted() {
        let source = ScriptedDecisions::new([ApprovalDecision::Retry]);
        assert_eq!(source.decide("a").await.unwrap(), ApprovalDecision::Retry);
        assert_eq!(source.decide("b").await.unwrap(), ApprovalDecision::Cancel);
        assert_eq!(source.drafts_seen(), vec!["a", "b"]);
    }
}
