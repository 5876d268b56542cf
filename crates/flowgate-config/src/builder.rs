use std::collections::HashMap;
use std::time::Duration;

use flowgate_utils::error::ConfigError;

use super::{Config, ConfigSource, LlmConfig, WorkflowsConfig};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Use this when embedding flowgate without consulting environment
    /// variables or config files.
    ///
    /// ```rust
    /// use flowgate_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .model("gpt-4o")
    ///     .confidence_threshold(0.8)
    ///     .call_timeout(Duration::from_secs(30))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.confidence_threshold(), 0.8);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent construction of a [`Config`].
///
/// Values set here are attributed to [`ConfigSource::Programmatic`]; everything
/// else keeps its built-in default.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    provider: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    api_key_env: Option<String>,
    budget: Option<u32>,
    max_tool_rounds: Option<u32>,
    confidence_threshold: Option<f64>,
    call_timeout: Option<Duration>,
    max_retries: Option<u32>,
    carry_rejected_drafts: Option<bool>,
    decision_timeout: Option<Duration>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Name of the environment variable that holds the API key.
    #[must_use]
    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    #[must_use]
    pub fn budget(mut self, calls: u32) -> Self {
        self.budget = Some(calls);
        self
    }

    #[must_use]
    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    #[must_use]
    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    /// Timeout for a single structured-generation call. Whole seconds only;
    /// sub-second durations round up.
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    #[must_use]
    pub fn carry_rejected_drafts(mut self, carry: bool) -> Self {
        self.carry_rejected_drafts = Some(carry);
        self
    }

    #[must_use]
    pub fn decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = Some(timeout);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a value is out of range.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut llm = LlmConfig::with_defaults();
        let mut workflows = WorkflowsConfig::with_defaults();
        let mut attribution = HashMap::new();

        let mut mark = |key: &str, set: bool| {
            attribution.insert(
                key.to_string(),
                if set {
                    ConfigSource::Programmatic
                } else {
                    ConfigSource::Default
                },
            );
        };

        mark("llm.provider", self.provider.is_some());
        if let Some(provider) = self.provider {
            llm.provider = Some(provider);
        }
        mark("llm.model", self.model.is_some());
        if let Some(model) = self.model {
            llm.model = Some(model);
        }
        if self.base_url.is_some() {
            mark("llm.base_url", true);
            llm.base_url = self.base_url;
        }
        if self.api_key_env.is_some() {
            mark("llm.api_key_env", true);
            llm.api_key_env = self.api_key_env;
        }
        if self.budget.is_some() {
            mark("llm.budget", true);
            llm.budget = self.budget;
        }
        mark("llm.max_tool_rounds", self.max_tool_rounds.is_some());
        if let Some(rounds) = self.max_tool_rounds {
            llm.max_tool_rounds = Some(rounds);
        }
        mark(
            "workflows.confidence_threshold",
            self.confidence_threshold.is_some(),
        );
        if let Some(threshold) = self.confidence_threshold {
            workflows.confidence_threshold = Some(threshold);
        }
        mark("workflows.call_timeout_secs", self.call_timeout.is_some());
        if let Some(timeout) = self.call_timeout {
            workflows.call_timeout_secs = Some(round_up_secs(timeout));
        }
        mark(
            "workflows.approval.max_retries",
            self.max_retries.is_some(),
        );
        if let Some(retries) = self.max_retries {
            workflows.approval.max_retries = Some(retries);
        }
        mark(
            "workflows.approval.carry_rejected_drafts",
            self.carry_rejected_drafts.is_some(),
        );
        if let Some(carry) = self.carry_rejected_drafts {
            workflows.approval.carry_rejected_drafts = Some(carry);
        }
        mark(
            "workflows.approval.decision_timeout_secs",
            self.decision_timeout.is_some(),
        );
        if let Some(timeout) = self.decision_timeout {
            workflows.approval.decision_timeout_secs = Some(round_up_secs(timeout));
        }

        let config = Config {
            llm,
            workflows,
            config_path: None,
            source_attribution: attribution,
        };
        config.validate()?;
        Ok(config)
    }
}

fn round_up_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
