use flowgate_utils::error::ConfigError;

use crate::{Config, SUPPORTED_PROVIDERS};

/// Upper bound for every timeout setting, in seconds.
const MAX_TIMEOUT_SECS: u64 = 3600;

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

fn check_timeout(key: &str, secs: Option<u64>) -> Result<(), ConfigError> {
    match secs {
        Some(0) => Err(invalid(key, "must be greater than 0")),
        Some(s) if s > MAX_TIMEOUT_SECS => Err(invalid(
            key,
            format!("exceeds maximum limit of {MAX_TIMEOUT_SECS} seconds"),
        )),
        _ => Ok(()),
    }
}

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(provider) = self.llm.provider.as_deref()
            && !SUPPORTED_PROVIDERS.contains(&provider)
        {
            return Err(invalid(
                "llm.provider",
                format!(
                    "unknown provider '{provider}' (supported: {})",
                    SUPPORTED_PROVIDERS.join(", ")
                ),
            ));
        }

        if let Some(model) = self.llm.model.as_deref()
            && model.trim().is_empty()
        {
            return Err(invalid("llm.model", "must not be empty"));
        }

        if let Some(max_tokens) = self.llm.max_tokens
            && max_tokens == 0
        {
            return Err(invalid("llm.max_tokens", "must be greater than 0"));
        }

        if let Some(temperature) = self.llm.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(invalid(
                "llm.temperature",
                format!("{temperature} is outside [0.0, 2.0]"),
            ));
        }

        check_timeout("llm.timeout_secs", self.llm.timeout_secs)?;

        if let Some(rounds) = self.llm.max_tool_rounds {
            if rounds == 0 {
                return Err(invalid("llm.max_tool_rounds", "must be greater than 0"));
            }
            if rounds > 16 {
                return Err(invalid("llm.max_tool_rounds", "exceeds maximum limit of 16"));
            }
        }

        if let Some(threshold) = self.workflows.confidence_threshold
            && !(0.0..=1.0).contains(&threshold)
        {
            return Err(invalid(
                "workflows.confidence_threshold",
                format!("{threshold} is outside [0.0, 1.0]"),
            ));
        }

        check_timeout("workflows.call_timeout_secs", self.workflows.call_timeout_secs)?;

        if let Some(max_retries) = self.workflows.approval.max_retries
            && max_retries > 50
        {
            return Err(invalid(
                "workflows.approval.max_retries",
                "exceeds maximum limit of 50",
            ));
        }

        // 0 means "wait indefinitely" for the decision timeout
        if let Some(secs) = self.workflows.approval.decision_timeout_secs
            && secs > MAX_TIMEOUT_SECS
        {
            return Err(invalid(
                "workflows.approval.decision_timeout_secs",
                format!("exceeds maximum limit of {MAX_TIMEOUT_SECS} seconds"),
            ));
        }

        Ok(())
    }
}
