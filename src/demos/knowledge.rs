//! Knowledge-base answering: the model may call `search_kb` before producing
//! a structured answer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use flowgate_engine::{KnowledgeSource, WorkflowError, generate_bounded, knowledge_tools};
use flowgate_llm::{FieldType, GenerationRequest, Schema, SchemaError, Structured, StructuredGenerate};

pub const ANSWER_STEP: &str = "kb_answer";

const ASSISTANT_INSTRUCTIONS: &str = "You are the virtual assistant of an online store. \
Answer using only information from the knowledge base, which you can query with the search_kb tool. \
If the question cannot be answered from the knowledge base, say so politely.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerConfidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for AnswerConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KbAnswer {
    pub answer: String,
    pub confidence: AnswerConfidence,
}

impl Structured for KbAnswer {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder(ANSWER_STEP)
            .described_field("answer", FieldType::String, "Answer to the user's question")
            .described_field(
                "confidence",
                FieldType::enumeration(["high", "medium", "low"]),
                "How well the knowledge base supports the answer",
            )
            .build()
    }
}

/// Answer `question` with `source` exposed as the `search_kb` tool.
///
/// # Errors
///
/// Generation, tool and schema failures, or `Timeout`.
pub async fn answer(
    generator: &dyn StructuredGenerate,
    source: Arc<dyn KnowledgeSource>,
    question: &str,
    call_timeout: Duration,
) -> Result<KbAnswer, WorkflowError> {
    let tools = Arc::new(knowledge_tools(source)?);
    let request = GenerationRequest::new(ANSWER_STEP, KbAnswer::schema()?, format!("Question: {question}"))
        .with_instructions(ASSISTANT_INSTRUCTIONS)
        .with_tools(tools);

    let answer: KbAnswer = generate_bounded(generator, &request, call_timeout)
        .await?
        .into_typed()?;
    info!(confidence = %answer.confidence, "Knowledge answer ready");
    Ok(answer)
}
