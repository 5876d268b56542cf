//! Calendar assistant workflows.
//!
//! - [`event_chain`]: extraction → details → confirmation, gated on the
//!   extraction being a calendar event with enough confidence
//! - [`calendar_router`]: new-event / modify-event / other, each with its own
//!   follow-up extraction

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use flowgate_engine::{
    ChainExecutor, Classification, ConfidenceThreshold, IntentRouter, Prompt, Stage,
    WorkflowError, flag_with_confidence, generate_bounded,
};
use flowgate_llm::{
    Field, FieldType, GenerationRequest, Schema, SchemaError, Structured, StructuredGenerate,
};

use super::today_context;

pub const EXTRACTION_STAGE: &str = "event_extraction";
pub const DETAILS_STAGE: &str = "event_details";
pub const CONFIRMATION_STAGE: &str = "event_confirmation";

pub const ROUTER_NAME: &str = "calendar_request";
pub const NEW_EVENT: &str = "new_event";
pub const MODIFY_EVENT: &str = "modify_event";
pub const OTHER: &str = "other";

/// First stage: is this a calendar event at all?
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventExtraction {
    pub description: String,
    pub is_calendar_event: bool,
    pub confidence_score: f64,
}

impl Structured for EventExtraction {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder(EXTRACTION_STAGE)
            .description("Decide whether the text describes a calendar event")
            .described_field("description", FieldType::String, "Raw description of the event")
            .described_field(
                "is_calendar_event",
                FieldType::Boolean,
                "Whether this text describes a calendar event",
            )
            .described_field(
                "confidence_score",
                FieldType::Number,
                "Confidence score between 0 and 1",
            )
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventDetails {
    pub name: String,
    pub date: String,
    pub duration_minutes: i64,
    pub participants: Vec<String>,
}

impl Structured for EventDetails {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder(DETAILS_STAGE)
            .description("Specific details of a calendar event")
            .described_field("name", FieldType::String, "Name of the event")
            .described_field(
                "date",
                FieldType::String,
                "Date and time of the event, in ISO 8601 format",
            )
            .described_field(
                "duration_minutes",
                FieldType::Integer,
                "Expected duration in minutes",
            )
            .described_field(
                "participants",
                FieldType::list(FieldType::String),
                "List of participants",
            )
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventConfirmation {
    pub confirmation_message: String,
    pub calendar_link: Option<String>,
}

impl Structured for EventConfirmation {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder(CONFIRMATION_STAGE)
            .description("Confirmation message for a scheduled event")
            .described_field(
                "confirmation_message",
                FieldType::String,
                "Natural-language confirmation message",
            )
            .described_field(
                "calendar_link",
                FieldType::optional(FieldType::String),
                "Generated calendar link, if applicable",
            )
            .build()
    }
}

/// Three-stage chain; the extraction stage gates on
/// `is_calendar_event && confidence_score > threshold`.
///
/// # Errors
///
/// `WorkflowError::Misconfigured` if a stage schema is rejected.
pub fn event_chain(
    generator: Arc<dyn StructuredGenerate>,
    threshold: ConfidenceThreshold,
    call_timeout: Duration,
) -> Result<ChainExecutor, WorkflowError> {
    let extraction = Stage::new(EXTRACTION_STAGE, EventExtraction::schema()?, |ctx| {
        Prompt::new(format!(
            "{} Analyze whether the text describes a calendar event.\n\nText: {}",
            today_context(),
            ctx.input()
        ))
        .with_instructions("Extract information about a possible event from the user's text.")
    })
    .gated(flag_with_confidence(
        "is_calendar_event",
        "confidence_score",
        threshold,
    ));

    let details = Stage::new(DETAILS_STAGE, EventDetails::schema()?, |ctx| {
        let description = ctx
            .get(EXTRACTION_STAGE)
            .and_then(|r| r.get_str("description"))
            .unwrap_or(ctx.input());
        Prompt::new(format!(
            "{} Extract detailed event information. Resolve relative dates such as \
             'next Tuesday' against today's date.\n\nEvent: {description}",
            today_context()
        ))
        .with_instructions("Extract structured details from the event text.")
    });

    let confirmation = Stage::new(CONFIRMATION_STAGE, EventConfirmation::schema()?, |ctx| {
        let details = ctx
            .get(DETAILS_STAGE)
            .map(|r| r.to_json())
            .unwrap_or_default();
        Prompt::new("Write a natural confirmation message for the event. Sign it as flowgate.")
            .with_json_section("Event", &details)
            .with_instructions("Create a confirmation for this event.")
    });

    ChainExecutor::builder(generator)
        .stage(extraction)
        .stage(details)
        .stage(confirmation)
        .call_timeout(call_timeout)
        .build()
}

/// Final answer of the calendar router's handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarResponse {
    pub success: bool,
    pub message: String,
    pub calendar_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEventDetails {
    pub name: String,
    pub date: String,
    pub duration_minutes: i64,
    pub participants: Vec<String>,
}

impl Structured for NewEventDetails {
    fn schema() -> Result<Schema, SchemaError> {
        Schema::builder("new_event_details")
            .description("Details for creating a new event")
            .described_field("name", FieldType::String, "Name of the event")
            .described_field("date", FieldType::String, "Date and time of the event (ISO 8601)")
            .described_field("duration_minutes", FieldType::Integer, "Duration in minutes")
            .described_field(
                "participants",
                FieldType::list(FieldType::String),
                "List of participants",
            )
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventChange {
    pub field: String,
    pub new_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModifyEventDetails {
    pub event_identifier: String,
    pub changes: Vec<EventChange>,
    pub participants_to_add: Vec<String>,
    pub participants_to_remove: Vec<String>,
}

impl Structured for ModifyEventDetails {
    fn schema() -> Result<Schema, SchemaError> {
        let change = FieldType::object(vec![
            Field::new("field", FieldType::String).describe("Field to change"),
            Field::new("new_value", FieldType::String).describe("New value for the field"),
        ]);
        Schema::builder("modify_event_details")
            .description("Details for modifying an existing event")
            .described_field(
                "event_identifier",
                FieldType::String,
                "Description that identifies the existing event",
            )
            .described_field("changes", FieldType::list(change), "List of changes to make")
            .described_field(
                "participants_to_add",
                FieldType::list(FieldType::String),
                "New participants to add",
            )
            .described_field(
                "participants_to_remove",
                FieldType::list(FieldType::String),
                "Participants to remove",
            )
            .build()
    }
}

async fn extract<T: Structured>(
    generator: &dyn StructuredGenerate,
    prompt: String,
    instructions: &str,
    call_timeout: Duration,
) -> Result<T, WorkflowError> {
    let schema = T::schema()?;
    let request = GenerationRequest::new(schema.name().to_string(), schema, prompt)
        .with_instructions(instructions);
    let result = generate_bounded(generator, &request, call_timeout).await?;
    Ok(result.into_typed()?)
}

async fn handle_new_event(
    generator: Arc<dyn StructuredGenerate>,
    input: String,
    call_timeout: Duration,
) -> Result<Option<CalendarResponse>, WorkflowError> {
    let details: NewEventDetails = extract(
        generator.as_ref(),
        format!("{} Extract details to create a new calendar event.\n\nRequest: {input}", today_context()),
        "Extract structured information from this description.",
        call_timeout,
    )
    .await?;
    info!(event = %details.name, date = %details.date, "New event extracted");

    Ok(Some(CalendarResponse {
        success: true,
        message: format!(
            "Created new event '{}' for {} with {}",
            details.name,
            details.date,
            details.participants.join(", ")
        ),
        calendar_link: Some(format!("calendar://new?event={}", details.name)),
    }))
}

async fn handle_modify_event(
    generator: Arc<dyn StructuredGenerate>,
    input: String,
    call_timeout: Duration,
) -> Result<Option<CalendarResponse>, WorkflowError> {
    let details: ModifyEventDetails = extract(
        generator.as_ref(),
        format!(
            "{} Extract details to modify an existing calendar event.\n\nRequest: {input}",
            today_context()
        ),
        "Extract the modification from this description.",
        call_timeout,
    )
    .await?;
    info!(
        event = %details.event_identifier,
        changes = details.changes.len(),
        added = details.participants_to_add.len(),
        removed = details.participants_to_remove.len(),
        "Event modification extracted"
    );

    Ok(Some(CalendarResponse {
        success: true,
        message: format!(
            "Modified event '{}' with the requested changes",
            details.event_identifier
        ),
        calendar_link: Some(format!("calendar://modify?event={}", details.event_identifier)),
    }))
}

/// Router over {new_event, modify_event, other}. The `other` handler answers
/// `None`: the request is not a supported calendar operation.
///
/// # Errors
///
/// `WorkflowError::Misconfigured` if the label/handler tables disagree.
pub fn calendar_router(
    generator: Arc<dyn StructuredGenerate>,
    call_timeout: Duration,
) -> Result<IntentRouter<Option<CalendarResponse>>, WorkflowError> {
    let for_new = Arc::clone(&generator);
    let for_modify = Arc::clone(&generator);

    IntentRouter::builder(generator, ROUTER_NAME)
        .instructions("Determine whether this is a request to create a new calendar event or modify an existing one.")
        .label(NEW_EVENT, "Create a new calendar event")
        .label(MODIFY_EVENT, "Change an existing calendar event")
        .label(OTHER, "Anything that is not a calendar operation")
        .handler(NEW_EVENT, move |input: String, _: Classification| {
            handle_new_event(Arc::clone(&for_new), input, call_timeout)
        })
        .handler(MODIFY_EVENT, move |input: String, _: Classification| {
            handle_modify_event(Arc::clone(&for_modify), input, call_timeout)
        })
        .handler(OTHER, |_: String, classification: Classification| async move {
            warn!(rationale = %classification.rationale, "Unsupported request type");
            Ok::<_, WorkflowError>(None)
        })
        .call_timeout(call_timeout)
        .build()
}
