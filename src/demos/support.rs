//! Customer-message triage: question, request or complaint, each answered by
//! its own reply generation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use flowgate_engine::{Classification, IntentHandler, IntentRouter, WorkflowError, generate_bounded};
use flowgate_llm::{FieldType, GenerationRequest, Schema, SchemaError, Structured, StructuredGenerate};

pub const ROUTER_NAME: &str = "support_intent";
pub const QUESTION: &str = "question";
pub const REQUEST: &str = "request";
pub const COMPLAINT: &str = "complaint";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SupportReply {
    pub reply: String,
}

impl Structured for SupportReply {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder("support_reply")
            .described_field("reply", FieldType::String, "Reply to send to the customer")
            .build()
    }
}

/// Step name of the reply generation for `label`.
#[must_use]
pub fn reply_step(label: &str) -> String {
    format!("{label}_reply")
}

/// Answers one label's messages with a single reply generation.
struct ReplyHandler {
    generator: Arc<dyn StructuredGenerate>,
    label: &'static str,
    instructions: &'static str,
    call_timeout: Duration,
}

#[async_trait]
impl IntentHandler<String> for ReplyHandler {
    async fn handle(
        &self,
        input: &str,
        _classification: &Classification,
    ) -> Result<String, WorkflowError> {
        let request = GenerationRequest::new(
            reply_step(self.label),
            SupportReply::schema()?,
            format!("Customer message: {input}"),
        )
        .with_instructions(self.instructions);
        let result = generate_bounded(self.generator.as_ref(), &request, self.call_timeout).await?;
        let reply: SupportReply = result.into_typed()?;
        Ok(reply.reply)
    }
}

/// Router over {question, request, complaint}; every label gets a reply.
///
/// # Errors
///
/// `WorkflowError::Misconfigured` if the label/handler tables disagree.
pub fn support_router(
    generator: Arc<dyn StructuredGenerate>,
    call_timeout: Duration,
) -> Result<IntentRouter<String>, WorkflowError> {
    let reply = |label: &'static str, instructions: &'static str| ReplyHandler {
        generator: Arc::clone(&generator),
        label,
        instructions,
        call_timeout,
    };

    IntentRouter::builder(Arc::clone(&generator), ROUTER_NAME)
        .label(QUESTION, "The customer asks for information")
        .label(REQUEST, "The customer wants something done")
        .label(COMPLAINT, "The customer reports a problem or dissatisfaction")
        .handler(QUESTION, reply(QUESTION, "Answer the customer's question clearly and briefly."))
        .handler(
            REQUEST,
            reply(REQUEST, "Acknowledge the request and state the next step you will take."),
        )
        .handler(
            COMPLAINT,
            reply(COMPLAINT, "Apologize, acknowledge the problem and offer a concrete remedy."),
        )
        .call_timeout(call_timeout)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_engine::test_support::FakeGenerator;
    use serde_json::json;

    #[tokio::test]
    async fn test_complaint_gets_complaint_reply() {
        let fake = Arc::new(
            FakeGenerator::new()
                .respond(
                    "support_intent_classification",
                    json!({"label": COMPLAINT, "confidence": 0.92, "rationale": "late order"}),
                )
                .respond(&reply_step(COMPLAINT), json!({"reply": "Sorry about the delay."})),
        );
        let router = support_router(fake.clone(), Duration::from_secs(5)).unwrap();

        let (reply, classification) = router.route("My order is two weeks late").await.unwrap();
        assert_eq!(classification.label, COMPLAINT);
        assert_eq!(reply, "Sorry about the delay.");

        let calls = fake.calls();
        assert_eq!(calls[1].step, "complaint_reply");
        assert!(calls[1].prompt.contains("two weeks late"));
        assert_eq!(fake.call_count(&reply_step(QUESTION)), 0);
    }
}
