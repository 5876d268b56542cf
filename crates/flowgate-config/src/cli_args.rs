use std::path::PathBuf;

/// Overrides collected from the command line.
///
/// Every field is optional; unset fields leave the file or default value in
/// place.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub llm_provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub call_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub carry_rejected_drafts: bool,
    pub decision_timeout_secs: Option<u64>,
    pub max_tool_rounds: Option<u32>,
}
