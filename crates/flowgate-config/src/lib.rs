//! Configuration management for flowgate
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > environment > file > defaults. The TOML file has an `[llm]` section
//! for the backend and a `[workflows]` section (with `[workflows.approval]`)
//! for orchestration limits.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use discovery::HOME_ENV_VAR;
pub use model::*;

use std::time::Duration;

impl Config {
    #[must_use]
    pub fn provider(&self) -> &str {
        self.llm.provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.llm.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Environment variable holding the API key, defaulting per provider.
    #[must_use]
    pub fn api_key_env(&self) -> &str {
        self.llm
            .api_key_env
            .as_deref()
            .unwrap_or_else(|| default_api_key_env(self.provider()))
    }

    /// HTTP timeout for one backend request.
    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn max_tool_rounds(&self) -> u32 {
        self.llm.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
    }

    #[must_use]
    pub fn confidence_threshold(&self) -> f64 {
        self.workflows
            .confidence_threshold
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD)
    }

    /// Bound applied to every structured-generation call.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(
            self.workflows
                .call_timeout_secs
                .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.workflows
            .approval
            .max_retries
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }

    #[must_use]
    pub fn carry_rejected_drafts(&self) -> bool {
        self.workflows
            .approval
            .carry_rejected_drafts
            .unwrap_or(false)
    }

    /// `None` means wait for the human indefinitely.
    #[must_use]
    pub fn decision_timeout(&self) -> Option<Duration> {
        match self.workflows.approval.decision_timeout_secs {
            None | Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Config {
    /// Create a minimal Config for testing purposes
    ///
    /// All keys hold their built-in defaults and no discovery is performed.
    pub fn minimal_for_testing() -> Self {
        Config {
            llm: LlmConfig::with_defaults(),
            workflows: WorkflowsConfig::with_defaults(),
            config_path: None,
            source_attribution: std::collections::HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_utils::error::ConfigError;
    use serial_test::serial;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Points FLOWGATE_HOME at an empty directory and clears env overrides
    /// for the lifetime of the guard.
    struct IsolatedEnv {
        _home: TempDir,
    }

    impl IsolatedEnv {
        fn new() -> Self {
            let home = TempDir::new().unwrap();
            unsafe {
                std::env::set_var(HOME_ENV_VAR, home.path());
                std::env::remove_var("FLOWGATE_LLM_PROVIDER");
                std::env::remove_var("FLOWGATE_LLM_MODEL");
            }
            Self { _home: home }
        }
    }

    impl Drop for IsolatedEnv {
        fn drop(&mut self) {
            unsafe {
                std::env::remove_var(HOME_ENV_VAR);
            }
        }
    }

    fn project_with_config(content: &str) -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        let dir = temp_dir.path().join(".flowgate");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, content).unwrap();
        (temp_dir, path)
    }

    fn discover_in(dir: &Path, cli: &CliArgs) -> anyhow::Result<Config> {
        Config::discover_from(dir, cli)
    }

    #[test]
    fn test_defaults() {
        let config = Config::minimal_for_testing();
        assert_eq!(config.provider(), "openai");
        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.api_key_env(), "OPENAI_API_KEY");
        assert_eq!(config.confidence_threshold(), 0.7);
        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.max_tool_rounds(), 4);
        assert!(!config.carry_rejected_drafts());
        assert_eq!(config.decision_timeout(), None);
        assert_eq!(config.call_timeout(), Duration::from_secs(120));
    }

    #[test]
    #[serial]
    fn test_discovery_loads_file_and_attributes_source() {
        let _env = IsolatedEnv::new();
        let (project, path) = project_with_config(
            r#"
[llm]
provider = "openrouter"
model = "openai/gpt-4o-mini"

[workflows]
confidence_threshold = 0.8

[workflows.approval]
max_retries = 2
"#,
        );

        let config = discover_in(project.path(), &CliArgs::default()).unwrap();
        assert_eq!(config.provider(), "openrouter");
        assert_eq!(config.api_key_env(), "OPENROUTER_API_KEY");
        assert_eq!(config.confidence_threshold(), 0.8);
        assert_eq!(config.max_retries(), 2);
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(
            config.source_attribution.get("llm.model"),
            Some(&ConfigSource::ConfigFile(path.clone()))
        );
        assert_eq!(
            config.source_attribution.get("llm.max_tool_rounds"),
            Some(&ConfigSource::Default)
        );
    }

    #[test]
    #[serial]
    fn test_discovery_walks_up_from_subdirectory() {
        let _env = IsolatedEnv::new();
        let (project, path) = project_with_config("[llm]\nmodel = \"gpt-4o\"\n");
        let nested = project.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = Config::discover_config_file_from(&nested).unwrap();
        assert_eq!(found, Some(path));
    }

    #[test]
    #[serial]
    fn test_discovery_stops_at_repository_root() {
        let _env = IsolatedEnv::new();
        let (outer, _path) = project_with_config("[llm]\nmodel = \"gpt-4o\"\n");
        let inner_repo = outer.path().join("inner");
        fs::create_dir_all(inner_repo.join(".git")).unwrap();

        let found = Config::discover_config_file_from(&inner_repo).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    #[serial]
    fn test_flowgate_home_fallback() {
        let _env = IsolatedEnv::new();
        let home = TempDir::new().unwrap();
        fs::write(home.path().join("config.toml"), "[workflows]\ncall_timeout_secs = 30\n")
            .unwrap();
        unsafe {
            std::env::set_var(HOME_ENV_VAR, home.path());
        }
        let project = TempDir::new().unwrap();
        fs::create_dir(project.path().join(".git")).unwrap();

        let config = discover_in(project.path(), &CliArgs::default()).unwrap();
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_cli_overrides_env_and_file() {
        let _env = IsolatedEnv::new();
        let (project, _path) = project_with_config(
            "[llm]\nmodel = \"file-model\"\n\n[workflows.approval]\nmax_retries = 3\n",
        );
        unsafe {
            std::env::set_var("FLOWGATE_LLM_MODEL", "env-model");
        }

        let from_env = discover_in(project.path(), &CliArgs::default()).unwrap();
        assert_eq!(from_env.model(), "env-model");
        assert_eq!(
            from_env.source_attribution.get("llm.model"),
            Some(&ConfigSource::Env)
        );

        let cli = CliArgs {
            model: Some("cli-model".to_string()),
            max_retries: Some(1),
            carry_rejected_drafts: true,
            ..CliArgs::default()
        };
        let from_cli = discover_in(project.path(), &cli).unwrap();
        assert_eq!(from_cli.model(), "cli-model");
        assert_eq!(from_cli.max_retries(), 1);
        assert!(from_cli.carry_rejected_drafts());
        assert_eq!(
            from_cli.source_attribution.get("workflows.approval.max_retries"),
            Some(&ConfigSource::Cli)
        );

        unsafe {
            std::env::remove_var("FLOWGATE_LLM_MODEL");
        }
    }

    #[test]
    #[serial]
    fn test_unknown_keys_are_rejected() {
        let _env = IsolatedEnv::new();
        let (project, _path) = project_with_config("[llm]\nmodle = \"typo\"\n");

        let err = discover_in(project.path(), &CliArgs::default()).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>();
        assert!(matches!(config_err, Some(ConfigError::InvalidFile(_))), "{err:#}");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_config_is_not_found() {
        let _env = IsolatedEnv::new();
        let cli = CliArgs {
            config_path: Some(PathBuf::from("/nonexistent/flowgate.toml")),
            ..CliArgs::default()
        };
        let err = discover_in(Path::new("/"), &cli).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn test_validation_limits() {
        let cases: Vec<(Config, &str)> = vec![
            (
                {
                    let mut c = Config::minimal_for_testing();
                    c.workflows.confidence_threshold = Some(1.5);
                    c
                },
                "workflows.confidence_threshold",
            ),
            (
                {
                    let mut c = Config::minimal_for_testing();
                    c.workflows.approval.max_retries = Some(51);
                    c
                },
                "workflows.approval.max_retries",
            ),
            (
                {
                    let mut c = Config::minimal_for_testing();
                    c.llm.timeout_secs = Some(0);
                    c
                },
                "llm.timeout_secs",
            ),
            (
                {
                    let mut c = Config::minimal_for_testing();
                    c.workflows.call_timeout_secs = Some(3601);
                    c
                },
                "workflows.call_timeout_secs",
            ),
            (
                {
                    let mut c = Config::minimal_for_testing();
                    c.llm.max_tool_rounds = Some(17);
                    c
                },
                "llm.max_tool_rounds",
            ),
            (
                {
                    let mut c = Config::minimal_for_testing();
                    c.llm.provider = Some("claude-cli".to_string());
                    c
                },
                "llm.provider",
            ),
        ];

        for (config, expected_key) in cases {
            match config.validate() {
                Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, expected_key),
                other => panic!("expected InvalidValue for {expected_key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_zero_decision_timeout_means_indefinite() {
        let mut config = Config::minimal_for_testing();
        config.workflows.approval.decision_timeout_secs = Some(0);
        assert!(config.validate().is_ok());
        assert_eq!(config.decision_timeout(), None);

        config.workflows.approval.decision_timeout_secs = Some(45);
        assert_eq!(config.decision_timeout(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_builder_attributes_programmatic_values() {
        let config = Config::builder()
            .provider("openrouter")
            .max_retries(3)
            .decision_timeout(Duration::from_millis(1500))
            .build()
            .unwrap();

        assert_eq!(config.provider(), "openrouter");
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.decision_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(
            config.source_attribution.get("llm.provider"),
            Some(&ConfigSource::Programmatic)
        );
        assert_eq!(
            config.source_attribution.get("llm.model"),
            Some(&ConfigSource::Default)
        );
    }

    #[test]
    fn test_builder_rejects_invalid_threshold() {
        let err = Config::builder().confidence_threshold(-0.1).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_effective_config_lists_sources() {
        let config = Config::builder().model("gpt-4o").build().unwrap();
        let effective = config.effective_config();
        assert_eq!(
            effective.get("llm.model"),
            Some(&("gpt-4o".to_string(), "programmatic".to_string()))
        );
        assert_eq!(
            effective.get("llm.api_key_env"),
            Some(&("OPENAI_API_KEY".to_string(), "default".to_string()))
        );
        assert!(!effective.contains_key("llm.base_url"));
    }
}
