use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Providers the backend factory knows how to construct.
pub const SUPPORTED_PROVIDERS: &[&str] = &["openai", "openrouter"];

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 4;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Source of a configuration value, from highest to lowest precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Command-line flag
    Cli,
    /// `FLOWGATE_*` environment variable
    Env,
    /// Loaded from the given configuration file
    ConfigFile(PathBuf),
    /// Set through [`crate::ConfigBuilder`]
    Programmatic,
    /// Built-in default
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Env => write!(f, "env"),
            Self::ConfigFile(path) => write!(f, "config ({})", path.display()),
            Self::Programmatic => write!(f, "programmatic"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Effective configuration for flowgate.
///
/// Precedence: CLI arguments > environment > config file > built-in defaults.
/// Every key that was set records its origin in `source_attribution`.
///
/// ```toml
/// [llm]
/// provider = "openai"
/// model = "gpt-4o-mini"
/// api_key_env = "OPENAI_API_KEY"
///
/// [workflows]
/// confidence_threshold = 0.7
///
/// [workflows.approval]
/// max_retries = 5
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub workflows: WorkflowsConfig,
    /// Config file that contributed values, if any.
    pub config_path: Option<PathBuf>,
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// `[llm]` section: backend selection and request parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key. The key itself
    /// never appears in configuration.
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
    /// Maximum backend invocations per process.
    pub budget: Option<u32>,
    pub max_tool_rounds: Option<u32>,
}

/// `[workflows]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowsConfig {
    /// Scores pass only when strictly greater than this value.
    pub confidence_threshold: Option<f64>,
    /// Upper bound for a single structured-generation call.
    pub call_timeout_secs: Option<u64>,
    #[serde(default)]
    pub approval: ApprovalConfig,
}

/// `[workflows.approval]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalConfig {
    /// Regenerations allowed before the loop ends as exhausted.
    pub max_retries: Option<u32>,
    /// Replay rejected drafts as conversation turns when regenerating.
    pub carry_rejected_drafts: Option<bool>,
    /// Seconds to wait for a human decision; 0 waits indefinitely.
    pub decision_timeout_secs: Option<u64>,
}

impl LlmConfig {
    /// Built-in defaults for every key.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            provider: Some(DEFAULT_PROVIDER.to_string()),
            model: Some(DEFAULT_MODEL.to_string()),
            base_url: None,
            api_key_env: None,
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            temperature: Some(DEFAULT_TEMPERATURE),
            timeout_secs: Some(DEFAULT_LLM_TIMEOUT_SECS),
            budget: None,
            max_tool_rounds: Some(DEFAULT_MAX_TOOL_ROUNDS),
        }
    }
}

impl WorkflowsConfig {
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            confidence_threshold: Some(DEFAULT_CONFIDENCE_THRESHOLD),
            call_timeout_secs: Some(DEFAULT_CALL_TIMEOUT_SECS),
            approval: ApprovalConfig {
                max_retries: Some(DEFAULT_MAX_RETRIES),
                carry_rejected_drafts: Some(false),
                decision_timeout_secs: Some(0),
            },
        }
    }
}

/// Default API key variable for a provider.
#[must_use]
pub fn default_api_key_env(provider: &str) -> &'static str {
    match provider {
        "openrouter" => "OPENROUTER_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}
