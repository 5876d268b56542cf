use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Render an error for terminal output: message, context and suggestions.
#[must_use]
pub fn display_for_user(err: &dyn UserFriendlyError) -> String {
    let mut out = format!("[{}] {}", err.category(), err.user_message());
    if let Some(context) = err.context() {
        out.push_str("\n\n");
        out.push_str(&context);
    }
    let suggestions = err.suggestions();
    if !suggestions.is_empty() {
        out.push_str("\n\nSuggestions:");
        for suggestion in suggestions {
            out.push_str("\n  - ");
            out.push_str(&suggestion);
        }
    }
    out
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Generation,
    Schema,
    Routing,
    Validation,
    Approval,
    ResourceLimits,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Generation => write!(f, "Generation"),
            Self::Schema => write!(f, "Schema"),
            Self::Routing => write!(f, "Routing"),
            Self::Validation => write!(f, "Validation"),
            Self::Approval => write!(f, "Approval"),
            Self::ResourceLimits => write!(f, "Resource Limits"),
            Self::Internal => write!(f, "Internal"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::MissingRequired(key) => {
                format!("Required configuration '{key}' is missing")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => {
                format!("Configuration file not found: {path}")
            }
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [llm] and [workflows] sections."
                    .to_string(),
            ),
            Self::MissingRequired(_) => {
                Some("Some settings have no built-in default and must be provided.".to_string())
            }
            Self::InvalidValue { .. } => {
                Some("A configuration value is outside its accepted range.".to_string())
            }
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "flowgate looks for .flowgate/config.toml upward from the working directory, \
                 or in $FLOWGATE_HOME."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of .flowgate/config.toml".to_string(),
                "Remove keys flowgate does not recognize".to_string(),
            ],
            Self::MissingRequired(key) => vec![format!("Set '{key}' in .flowgate/config.toml")],
            Self::InvalidValue { key, .. } => {
                vec![format!("Adjust '{key}' to a value within its documented range")]
            }
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => vec![
                "Pass --config <path> explicitly".to_string(),
                "Create .flowgate/config.toml in the project root".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Transport- and provider-level failures from an LLM backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, malformed provider payload)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Budget limit exceeded
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {:?}", duration)
            }
            Self::BudgetExceeded { limit, attempted } => {
                format!(
                    "LLM budget exceeded: attempted {} calls, limit is {}",
                    attempted, limit
                )
            }
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) => Some(
                "Transport errors occur when the LLM endpoint cannot be reached or returns an \
                 unreadable payload."
                    .to_string(),
            ),
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::ProviderQuota(_) => Some(
                "Quota errors occur when rate limits or usage limits are exceeded.".to_string(),
            ),
            Self::ProviderOutage(_) => {
                Some("Provider outages are temporary service disruptions.".to_string())
            }
            Self::Timeout { .. } => Some(
                "Timeouts occur when LLM invocations take longer than the configured limit."
                    .to_string(),
            ),
            Self::BudgetExceeded { .. } => {
                Some("Budget limits prevent excessive LLM API calls and costs.".to_string())
            }
            Self::Misconfiguration(_) => Some(
                "Configuration errors indicate missing or invalid LLM provider settings."
                    .to_string(),
            ),
            Self::Unsupported(_) => Some(
                "The requested provider or feature is not available in this build.".to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) => vec![
                "Verify network connectivity and the configured base_url".to_string(),
                "Try running with --verbose to see detailed error information".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that the API key environment variable named by [llm] api_key_env is set"
                    .to_string(),
                "Verify the API key is valid and not expired".to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) => vec![
                "Wait a few minutes and try again".to_string(),
                "Check the provider's status page and usage dashboard".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase [llm] timeout_secs or [workflows] call_timeout_secs".to_string(),
                "Check your internet connection".to_string(),
            ],
            Self::BudgetExceeded { .. } => vec![
                "Increase the budget via FLOWGATE_LLM_BUDGET or [llm] budget".to_string(),
                "Review which workflow steps are consuming calls".to_string(),
            ],
            Self::Misconfiguration(_) => vec![
                "Check the [llm] section in .flowgate/config.toml".to_string(),
                "Ensure model and api_key_env are set".to_string(),
            ],
            Self::Unsupported(_) => {
                vec!["Use one of the supported providers: openai, openrouter".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::ProviderOutage(_) | Self::Timeout { .. } => {
                ErrorCategory::Generation
            }
            Self::ProviderQuota(_) | Self::BudgetExceeded { .. } => ErrorCategory::ResourceLimits,
            Self::ProviderAuth(_) | Self::Misconfiguration(_) | Self::Unsupported(_) => {
                ErrorCategory::Configuration
            }
        }
    }
}

/// A value does not conform to the schema it was declared against.
///
/// Field paths are dotted (`details.participants[2]`); the empty path denotes
/// the root object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{schema}: output is not valid JSON: {reason}")]
    Malformed { schema: String, reason: String },

    #[error("{schema}: expected a JSON object at '{path}'")]
    NotAnObject { schema: String, path: String },

    #[error("{schema}: missing required field '{field}'")]
    MissingField { schema: String, field: String },

    #[error("{schema}: field '{field}' is not declared")]
    UnexpectedField { schema: String, field: String },

    #[error("{schema}: field '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        schema: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("{schema}: field '{field}' has value '{value}' outside {allowed:?}")]
    InvalidEnumValue {
        schema: String,
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("{schema}: invalid schema definition: {reason}")]
    InvalidDefinition { schema: String, reason: String },
}

impl SchemaError {
    /// Name of the schema the violation was detected against.
    #[must_use]
    pub fn schema(&self) -> &str {
        match self {
            Self::Malformed { schema, .. }
            | Self::NotAnObject { schema, .. }
            | Self::MissingField { schema, .. }
            | Self::UnexpectedField { schema, .. }
            | Self::TypeMismatch { schema, .. }
            | Self::InvalidEnumValue { schema, .. }
            | Self::InvalidDefinition { schema, .. } => schema,
        }
    }
}

impl UserFriendlyError for SchemaError {
    fn user_message(&self) -> String {
        format!("Model output did not match the expected shape: {self}")
    }

    fn context(&self) -> Option<String> {
        Some(
            "Structured generation requires the model to return exactly the declared fields \
             with their declared types. Violations are not retried automatically."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidDefinition { .. } => {
                vec!["Fix the schema declaration; this is a programming error".to_string()]
            }
            _ => vec![
                "Retry the workflow; model output varies between runs".to_string(),
                "Use a model with native structured-output support".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Schema
    }
}

/// Failure of one structured-generation round, including the tool-call loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Schema violation: {0}")]
    Schema(#[from] SchemaError),

    #[error("Unknown tool '{name}' requested (registered: {available:?})")]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Tool '{name}' failed: {reason}")]
    ToolFailed { name: String, reason: String },

    #[error("No final answer after {rounds} tool-call rounds")]
    ToolRoundsExceeded { rounds: u32 },
}

impl UserFriendlyError for GenerationError {
    fn user_message(&self) -> String {
        match self {
            Self::Llm(err) => err.user_message(),
            Self::Schema(err) => err.user_message(),
            Self::UnknownTool { name, .. } => {
                format!("The model requested a tool that is not registered: '{name}'")
            }
            Self::ToolFailed { name, reason } => format!("Local tool '{name}' failed: {reason}"),
            Self::ToolRoundsExceeded { rounds } => {
                format!("The model kept calling tools for {rounds} rounds without answering")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Llm(err) => err.context(),
            Self::Schema(err) => err.context(),
            Self::UnknownTool { .. } => Some(
                "Tool calls may only name tools declared for the current generation.".to_string(),
            ),
            Self::ToolFailed { .. } => None,
            Self::ToolRoundsExceeded { .. } => Some(
                "Each tool-call round costs one backend call; the round count is capped."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Llm(err) => err.suggestions(),
            Self::Schema(err) => err.suggestions(),
            Self::UnknownTool { available, .. } => vec![format!(
                "Register the tool or adjust the prompt; registered tools: {}",
                available.join(", ")
            )],
            Self::ToolFailed { .. } => {
                vec!["Check the tool's input data (for example the knowledge file)".to_string()]
            }
            Self::ToolRoundsExceeded { .. } => {
                vec!["Increase [llm] max_tool_rounds".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Llm(err) => err.category(),
            Self::Schema(err) => err.category(),
            Self::UnknownTool { .. } | Self::ToolFailed { .. } | Self::ToolRoundsExceeded { .. } => {
                ErrorCategory::Generation
            }
        }
    }
}
