//! Helpers shared by tests across the workspace.

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Check whether real LLM integration tests should run.
///
/// `FLOWGATE_SKIP_LLM_TESTS=1` always disables real LLM tests.
/// `FLOWGATE_REAL_LLM_TESTS=1` enables real LLM tests.
#[must_use]
pub fn llm_tests_enabled() -> bool {
    if env_flag("FLOWGATE_SKIP_LLM_TESTS") {
        return false;
    }
    env_flag("FLOWGATE_REAL_LLM_TESTS")
}

/// Number of proptest cases, overridable through `PROPTEST_CASES`.
#[must_use]
pub fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(64)
}

/// A fake API key long enough to trip the redaction heuristics.
#[must_use]
pub fn fake_api_key() -> String {
    format!("sk-proj-{}", "A1b2C3d4".repeat(6))
}
