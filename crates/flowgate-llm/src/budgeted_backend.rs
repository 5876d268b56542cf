//! Call-count budget for a backend
//!
//! Every workflow step can fan out into several provider calls (tool rounds,
//! approval retries, parallel checks). The budget caps the total per process.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use crate::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Calls allowed per process when neither env nor config sets a limit
pub(crate) const DEFAULT_BUDGET_LIMIT: u32 = 20;

pub(crate) const BUDGET_ENV_VAR: &str = "FLOWGATE_LLM_BUDGET";

/// Wraps a backend and refuses invocations past a fixed count.
///
/// Attempts are counted, not successes: a failed call still consumes its
/// slot, so retry loops cannot outrun the limit. The counter is shared by
/// every clone of the wrapping `Arc`, including calls issued concurrently by
/// parallel validation.
pub struct BudgetedBackend {
    inner: Arc<dyn LlmBackend>,
    used: AtomicU32,
    limit: u32,
}

impl BudgetedBackend {
    #[must_use]
    pub fn new(inner: Arc<dyn LlmBackend>, limit: u32) -> Self {
        debug!(limit, "Creating BudgetedBackend");
        Self {
            inner,
            used: AtomicU32::new(0),
            limit,
        }
    }

    /// Resolve the limit as `FLOWGATE_LLM_BUDGET` > `[llm] budget` > 20.
    ///
    /// An unparseable env value is ignored.
    #[must_use]
    pub fn with_limit_from_config(inner: Arc<dyn LlmBackend>, config_budget: Option<u32>) -> Self {
        let env_limit = std::env::var(BUDGET_ENV_VAR)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());

        let (limit, source) = match (env_limit, config_budget) {
            (Some(limit), _) => (limit, "env"),
            (None, Some(limit)) => (limit, "config"),
            (None, None) => (DEFAULT_BUDGET_LIMIT, "default"),
        };
        debug!(limit, source, "Resolved LLM call budget");

        Self::new(inner, limit)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Invocations attempted so far, including refused ones.
    #[must_use]
    pub fn calls_attempted(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for BudgetedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        // Claim the slot before the call so concurrent callers cannot overshoot
        let previous = self.used.fetch_add(1, Ordering::SeqCst);
        let attempted = previous + 1;

        if previous >= self.limit {
            warn!(step = %inv.step, limit = self.limit, attempted, "LLM call budget exhausted");
            return Err(LlmError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }

        let result = self.inner.invoke(inv).await;
        if let Err(e) = &result {
            debug!(attempted, limit = self.limit, error = %e, "Budgeted call failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use serial_test::serial;
    use std::time::Duration;

    struct AnswerBackend;

    #[async_trait]
    impl LlmBackend for AnswerBackend {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            Ok(LlmResult::answer("{}", "mock", "mock-model"))
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl LlmBackend for FailingBackend {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            Err(LlmError::Transport("connection reset".to_string()))
        }
    }

    fn invocation() -> LlmInvocation {
        LlmInvocation::new(
            "extract",
            "mock-model",
            Duration::from_secs(5),
            vec![Message::user("hello")],
        )
    }

    fn with_budget_env<T>(value: Option<&str>, f: impl FnOnce() -> T) -> T {
        unsafe {
            match value {
                Some(v) => std::env::set_var(BUDGET_ENV_VAR, v),
                None => std::env::remove_var(BUDGET_ENV_VAR),
            }
        }
        let out = f();
        unsafe {
            std::env::remove_var(BUDGET_ENV_VAR);
        }
        out
    }

    #[tokio::test]
    async fn test_calls_under_limit_pass_through() {
        let backend = BudgetedBackend::new(Arc::new(AnswerBackend), 2);
        assert!(backend.invoke(invocation()).await.is_ok());
        assert!(backend.invoke(invocation()).await.is_ok());
        assert_eq!(backend.calls_attempted(), 2);
    }

    #[tokio::test]
    async fn test_call_past_limit_is_refused() {
        let backend = BudgetedBackend::new(Arc::new(AnswerBackend), 1);
        backend.invoke(invocation()).await.unwrap();

        let err = backend.invoke(invocation()).await.unwrap_err();
        assert_eq!(
            err,
            LlmError::BudgetExceeded {
                limit: 1,
                attempted: 2
            }
        );
    }

    #[tokio::test]
    async fn test_failed_calls_consume_budget() {
        let backend = BudgetedBackend::new(Arc::new(FailingBackend), 1);

        assert!(matches!(
            backend.invoke(invocation()).await,
            Err(LlmError::Transport(_))
        ));
        assert!(matches!(
            backend.invoke(invocation()).await,
            Err(LlmError::BudgetExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_budget_refuses_first_call() {
        let backend = BudgetedBackend::new(Arc::new(AnswerBackend), 0);
        assert!(matches!(
            backend.invoke(invocation()).await,
            Err(LlmError::BudgetExceeded { limit: 0, attempted: 1 })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_calls_never_overshoot() {
        let backend = Arc::new(BudgetedBackend::new(Arc::new(AnswerBackend), 3));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move { backend.invoke(invocation()).await }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 3);
        assert_eq!(backend.calls_attempted(), 8);
    }

    #[test]
    #[serial]
    fn test_env_beats_config() {
        let backend = with_budget_env(Some("7"), || {
            BudgetedBackend::with_limit_from_config(Arc::new(AnswerBackend), Some(30))
        });
        assert_eq!(backend.limit(), 7);
    }

    #[test]
    #[serial]
    fn test_config_beats_default() {
        let backend = with_budget_env(None, || {
            BudgetedBackend::with_limit_from_config(Arc::new(AnswerBackend), Some(12))
        });
        assert_eq!(backend.limit(), 12);
    }

    #[test]
    #[serial]
    fn test_default_when_unset() {
        let backend = with_budget_env(None, || {
            BudgetedBackend::with_limit_from_config(Arc::new(AnswerBackend), None)
        });
        assert_eq!(backend.limit(), DEFAULT_BUDGET_LIMIT);
    }

    #[test]
    #[serial]
    fn test_unparseable_env_falls_back_to_config() {
        let backend = with_budget_env(Some("plenty"), || {
            BudgetedBackend::with_limit_from_config(Arc::new(AnswerBackend), Some(9))
        });
        assert_eq!(backend.limit(), 9);
    }
}
