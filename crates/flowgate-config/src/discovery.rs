use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{CliArgs, Config, ConfigSource, LlmConfig, WorkflowsConfig};

/// Environment variable naming a directory that holds `config.toml`.
pub const HOME_ENV_VAR: &str = "FLOWGATE_HOME";

/// Directory searched for upward from the working directory.
const CONFIG_DIR_NAME: &str = ".flowgate";
const CONFIG_FILE_NAME: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    llm: Option<LlmConfig>,
    workflows: Option<WorkflowsConfig>,
}

/// Replace `target` with `value` when present, recording where it came from.
fn overlay<T>(
    target: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if value.is_some() {
        *target = value;
        attribution.insert(key.to_string(), source.clone());
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Discover and load configuration with precedence: CLI > env > file > defaults
    ///
    /// Uses the current working directory as the start of the upward search.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut source_attribution = HashMap::new();
        let mut llm = LlmConfig::with_defaults();
        let mut workflows = WorkflowsConfig::with_defaults();

        for key in [
            "llm.provider",
            "llm.model",
            "llm.max_tokens",
            "llm.temperature",
            "llm.timeout_secs",
            "llm.max_tool_rounds",
            "workflows.confidence_threshold",
            "workflows.call_timeout_secs",
            "workflows.approval.max_retries",
            "workflows.approval.carry_rejected_drafts",
            "workflows.approval.decision_timeout_secs",
        ] {
            source_attribution.insert(key.to_string(), ConfigSource::Default);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(flowgate_utils::error::ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            debug!(path = %path.display(), "Loading configuration file");
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let source = ConfigSource::ConfigFile(path.clone());
            let attr = &mut source_attribution;

            if let Some(file_llm) = file_config.llm {
                overlay(&mut llm.provider, file_llm.provider, "llm.provider", &source, attr);
                overlay(&mut llm.model, file_llm.model, "llm.model", &source, attr);
                overlay(&mut llm.base_url, file_llm.base_url, "llm.base_url", &source, attr);
                overlay(
                    &mut llm.api_key_env,
                    file_llm.api_key_env,
                    "llm.api_key_env",
                    &source,
                    attr,
                );
                overlay(&mut llm.max_tokens, file_llm.max_tokens, "llm.max_tokens", &source, attr);
                overlay(
                    &mut llm.temperature,
                    file_llm.temperature,
                    "llm.temperature",
                    &source,
                    attr,
                );
                overlay(
                    &mut llm.timeout_secs,
                    file_llm.timeout_secs,
                    "llm.timeout_secs",
                    &source,
                    attr,
                );
                overlay(&mut llm.budget, file_llm.budget, "llm.budget", &source, attr);
                overlay(
                    &mut llm.max_tool_rounds,
                    file_llm.max_tool_rounds,
                    "llm.max_tool_rounds",
                    &source,
                    attr,
                );
            }

            if let Some(file_workflows) = file_config.workflows {
                overlay(
                    &mut workflows.confidence_threshold,
                    file_workflows.confidence_threshold,
                    "workflows.confidence_threshold",
                    &source,
                    attr,
                );
                overlay(
                    &mut workflows.call_timeout_secs,
                    file_workflows.call_timeout_secs,
                    "workflows.call_timeout_secs",
                    &source,
                    attr,
                );
                let approval = file_workflows.approval;
                overlay(
                    &mut workflows.approval.max_retries,
                    approval.max_retries,
                    "workflows.approval.max_retries",
                    &source,
                    attr,
                );
                overlay(
                    &mut workflows.approval.carry_rejected_drafts,
                    approval.carry_rejected_drafts,
                    "workflows.approval.carry_rejected_drafts",
                    &source,
                    attr,
                );
                overlay(
                    &mut workflows.approval.decision_timeout_secs,
                    approval.decision_timeout_secs,
                    "workflows.approval.decision_timeout_secs",
                    &source,
                    attr,
                );
            }
        }

        // Environment overrides the file
        let env_source = ConfigSource::Env;
        overlay(
            &mut llm.provider,
            non_empty_env("FLOWGATE_LLM_PROVIDER"),
            "llm.provider",
            &env_source,
            &mut source_attribution,
        );
        overlay(
            &mut llm.model,
            non_empty_env("FLOWGATE_LLM_MODEL"),
            "llm.model",
            &env_source,
            &mut source_attribution,
        );

        // CLI overrides everything
        let cli = ConfigSource::Cli;
        let attr = &mut source_attribution;
        overlay(&mut llm.provider, cli_args.llm_provider.clone(), "llm.provider", &cli, attr);
        overlay(&mut llm.model, cli_args.model.clone(), "llm.model", &cli, attr);
        overlay(&mut llm.base_url, cli_args.base_url.clone(), "llm.base_url", &cli, attr);
        overlay(
            &mut llm.max_tool_rounds,
            cli_args.max_tool_rounds,
            "llm.max_tool_rounds",
            &cli,
            attr,
        );
        overlay(
            &mut workflows.confidence_threshold,
            cli_args.confidence_threshold,
            "workflows.confidence_threshold",
            &cli,
            attr,
        );
        overlay(
            &mut workflows.call_timeout_secs,
            cli_args.call_timeout_secs,
            "workflows.call_timeout_secs",
            &cli,
            attr,
        );
        overlay(
            &mut workflows.approval.max_retries,
            cli_args.max_retries,
            "workflows.approval.max_retries",
            &cli,
            attr,
        );
        overlay(
            &mut workflows.approval.carry_rejected_drafts,
            cli_args.carry_rejected_drafts.then_some(true),
            "workflows.approval.carry_rejected_drafts",
            &cli,
            attr,
        );
        overlay(
            &mut workflows.approval.decision_timeout_secs,
            cli_args.decision_timeout_secs,
            "workflows.approval.decision_timeout_secs",
            &cli,
            attr,
        );

        let config = Self {
            llm,
            workflows,
            config_path,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }

    /// Locate the configuration file for `start_dir`.
    ///
    /// Walks up looking for `.flowgate/config.toml`, stopping at a repository
    /// root (`.git`, `.hg`, `.svn`) or the filesystem root. When nothing is
    /// found, `$FLOWGATE_HOME/config.toml` is used if the variable is set;
    /// otherwise the per-user config directory (`~/.config/flowgate/config.toml`
    /// on Linux) is consulted.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        if let Some(home) = env::var_os(HOME_ENV_VAR) {
            let candidate = PathBuf::from(home).join(CONFIG_FILE_NAME);
            return Ok(candidate.is_file().then_some(candidate));
        }

        Ok(dirs::config_dir()
            .map(|dir| dir.join("flowgate").join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file()))
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: TomlConfig = toml::from_str(&content).map_err(|e| {
            flowgate_utils::error::ConfigError::InvalidFile(format!("{}: {}", path.display(), e))
        })?;
        Ok(config)
    }
}
