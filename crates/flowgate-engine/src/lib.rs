//! Workflow orchestration over structured generation.
//!
//! Four independent components, each driven by an injected
//! `Arc<dyn StructuredGenerate>`:
//!
//! - [`ChainExecutor`]: ordered stages with quality gates
//! - [`IntentRouter`]: closed-set classification, then dispatch
//! - [`ParallelValidator`]: concurrent checks reduced fail-closed
//! - [`ApprovalLoop`]: drafts reviewed by a [`DecisionSource`]

mod approval;
mod call;
mod chain;
mod confidence;
mod decision;
mod error;
mod knowledge;
mod parallel;
mod prompt;
mod router;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use approval::{ApprovalLoop, ApprovalOutcome, ApprovalState};
pub use call::generate_bounded;
pub use chain::{ChainBuilder, ChainContext, ChainExecutor, ChainOutcome, GateFn, PromptFn, Stage};
pub use confidence::{ConfidenceScore, ConfidenceThreshold, flag_with_confidence};
pub use decision::{ApprovalDecision, DecisionSource, ScriptedDecisions};
pub use error::WorkflowError;
pub use knowledge::{JsonFileKnowledge, KnowledgeSource, SEARCH_TOOL, knowledge_tools};
pub use parallel::{
    Check, CheckPolicy, CheckPromptFn, CheckVerdict, ParallelValidator, ValidationOutcome,
    ValidationReport, ValidatorBuilder,
};
pub use prompt::Prompt;
pub use router::{Classification, IntentHandler, IntentRouter, RouterBuilder};
