//! Knowledge lookup for knowledge-assisted generation.
//!
//! The payload is opaque JSON; it is handed to the model either as a
//! `search_kb` tool result or injected directly into a prompt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use flowgate_llm::{FieldType, Schema, ToolRegistry};

use crate::error::WorkflowError;

/// Name under which [`knowledge_tools`] registers the lookup.
pub const SEARCH_TOOL: &str = "search_kb";

/// Source of knowledge for a query.
pub trait KnowledgeSource: Send + Sync {
    /// # Errors
    ///
    /// A human-readable reason the lookup failed.
    fn lookup(&self, query: &str) -> Result<Value, String>;
}

/// Knowledge base held in a JSON document, loaded once.
///
/// Every query returns the whole document; selecting the relevant entries is
/// left to the model.
#[derive(Debug, Clone)]
pub struct JsonFileKnowledge {
    path: PathBuf,
    document: Value,
}

impl JsonFileKnowledge {
    /// # Errors
    ///
    /// `WorkflowError::Misconfigured` when the file cannot be read or is not
    /// valid JSON.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            WorkflowError::Misconfigured(format!(
                "cannot read knowledge file {}: {}",
                path.display(),
                e
            ))
        })?;
        let document = serde_json::from_str(&raw).map_err(|e| {
            WorkflowError::Misconfigured(format!(
                "knowledge file {} is not valid JSON: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), bytes = raw.len(), "Loaded knowledge file");
        Ok(Self { path, document })
    }

    #[must_use]
    pub fn from_value(document: Value) -> Self {
        Self {
            path: PathBuf::new(),
            document,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KnowledgeSource for JsonFileKnowledge {
    fn lookup(&self, query: &str) -> Result<Value, String> {
        debug!(query = %query, "Knowledge lookup");
        Ok(self.document.clone())
    }
}

/// Tool registry exposing `source` as `search_kb(question)`.
///
/// # Errors
///
/// Only if the tool's input schema is rejected, which would be a bug.
pub fn knowledge_tools(source: Arc<dyn KnowledgeSource>) -> Result<ToolRegistry, WorkflowError> {
    let input = Schema::builder("search_kb_args")
        .described_field("question", FieldType::String, "The user's question")
        .build()?;

    let registry = ToolRegistry::new().register(
        SEARCH_TOOL,
        "Search the knowledge base for information that answers the question",
        input,
        move |args| {
            let question = args
                .get("question")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let found = source.lookup(question)?;
            Ok(json!({ "question": question, "knowledge": found }))
        },
    )?;
    Ok(registry)
}
