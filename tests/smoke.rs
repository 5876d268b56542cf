//! Smoke tests for the flowgate binary
//!
//! These run the compiled CLI in an isolated directory and check exit codes
//! and output. Only `test_live_chain_against_provider` talks to a real
//! provider, and only when `FLOWGATE_REAL_LLM_TESTS=1`.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

use flowgate::ExitCode;
use flowgate_utils::test_support::llm_tests_enabled;

/// Run the binary in `work_dir` with a config home that holds nothing.
fn run_flowgate(args: &[&str], work_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flowgate"))
        .args(args)
        .current_dir(work_dir)
        .env("FLOWGATE_HOME", work_dir)
        .env_remove("FLOWGATE_LLM_PROVIDER")
        .env_remove("FLOWGATE_LLM_MODEL")
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

/// Isolated working directory; the `.git` marker stops upward discovery.
fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join(".git")).unwrap();
    temp
}

#[test]
fn test_config_command_lists_defaults() {
    let temp = workspace();
    let output = run_flowgate(&["config"], temp.path());

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Config file: (none)"), "{stdout}");
    assert!(stdout.contains("llm.provider = openai  (default)"), "{stdout}");
    assert!(stdout.contains("workflows.confidence_threshold = 0.7  (default)"), "{stdout}");
}

#[test]
fn test_config_command_attributes_file_and_cli_values() {
    let temp = workspace();
    let dir = temp.path().join(".flowgate");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), "[workflows.approval]\nmax_retries = 3\n").unwrap();

    let output = run_flowgate(&["--model", "gpt-4o", "config"], temp.path());

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("workflows.approval.max_retries = 3  (config"), "{stdout}");
    assert!(stdout.contains("llm.model = gpt-4o  (cli)"), "{stdout}");
}

#[test]
fn test_out_of_range_threshold_is_a_config_error() {
    let temp = workspace();
    let output = run_flowgate(&["--confidence-threshold", "1.5", "config"], temp.path());

    assert_eq!(output.status.code(), Some(ExitCode::CONFIG.as_i32()));
}

#[test]
fn test_missing_api_key_is_a_config_error() {
    let temp = workspace();
    let dir = temp.path().join(".flowgate");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        "[llm]\napi_key_env = \"FLOWGATE_SMOKE_KEY_THAT_IS_NEVER_SET\"\n",
    )
    .unwrap();

    let output = run_flowgate(&["chain", "Lunch with Ana on Friday"], temp.path());

    assert_eq!(output.status.code(), Some(ExitCode::CONFIG.as_i32()));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("FLOWGATE_SMOKE_KEY_THAT_IS_NEVER_SET"), "{stderr}");
}

#[test]
fn test_version_flag() {
    let temp = workspace();
    let output = run_flowgate(&["--version"], temp.path());

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("flowgate "));
}

#[test]
fn test_live_chain_against_provider() {
    if !llm_tests_enabled() {
        eprintln!("skipping: set FLOWGATE_REAL_LLM_TESTS=1 to run against a real provider");
        return;
    }

    let temp = workspace();
    let output = Command::new(env!("CARGO_BIN_EXE_flowgate"))
        .args(["chain", "Team meeting next Tuesday at 2pm with Alice and Bob, about an hour"])
        .current_dir(temp.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Confirmation:"));
}
