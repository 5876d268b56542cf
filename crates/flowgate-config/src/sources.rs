use std::collections::BTreeMap;

use super::{Config, ConfigSource};

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    ///
    /// Unset optional keys (`llm.base_url`, `llm.budget`, ...) are omitted.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add = |key: &str, value: Option<String>| {
            if let Some(val) = value {
                let source = self
                    .source_attribution
                    .get(key)
                    .unwrap_or(&ConfigSource::Default)
                    .to_string();
                config.insert(key.to_string(), (val, source));
            }
        };

        let llm = &self.llm;
        add("llm.provider", llm.provider.clone());
        add("llm.model", llm.model.clone());
        add("llm.base_url", llm.base_url.clone());
        add("llm.api_key_env", Some(self.api_key_env().to_string()));
        add("llm.max_tokens", llm.max_tokens.map(|v| v.to_string()));
        add("llm.temperature", llm.temperature.map(|v| v.to_string()));
        add("llm.timeout_secs", llm.timeout_secs.map(|v| v.to_string()));
        add("llm.budget", llm.budget.map(|v| v.to_string()));
        add("llm.max_tool_rounds", llm.max_tool_rounds.map(|v| v.to_string()));

        let workflows = &self.workflows;
        add(
            "workflows.confidence_threshold",
            workflows.confidence_threshold.map(|v| v.to_string()),
        );
        add(
            "workflows.call_timeout_secs",
            workflows.call_timeout_secs.map(|v| v.to_string()),
        );
        add(
            "workflows.approval.max_retries",
            workflows.approval.max_retries.map(|v| v.to_string()),
        );
        add(
            "workflows.approval.carry_rejected_drafts",
            workflows.approval.carry_rejected_drafts.map(|v| v.to_string()),
        );
        add(
            "workflows.approval.decision_timeout_secs",
            workflows.approval.decision_timeout_secs.map(|v| v.to_string()),
        );

        config
    }
}
