//! Bounded structured-generation calls.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use flowgate_llm::{GenerationRequest, StructuredGenerate, TypedResult};

use crate::error::WorkflowError;

/// Run one generation under `timeout`.
///
/// Router handlers that issue follow-up generations use this to stay under
/// the same bound as the components. Expiry is a `WorkflowError::Timeout`
/// naming the step; generation failures are flattened into `WorkflowError`.
pub async fn generate_bounded(
    generator: &dyn StructuredGenerate,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<TypedResult, WorkflowError> {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, generator.generate(request)).await;

    match outcome {
        Ok(Ok(result)) => {
            debug!(
                step = %request.step,
                schema = %request.schema.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Generation succeeded"
            );
            Ok(result)
        }
        Ok(Err(e)) => {
            warn!(step = %request.step, error = %e, "Generation failed");
            Err(e.into())
        }
        Err(_) => {
            warn!(step = %request.step, timeout_secs = timeout.as_secs_f64(), "Generation timed out");
            Err(WorkflowError::Timeout {
                operation: format!("generation step '{}'", request.step),
                duration: timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowgate_llm::{GenerationError, Schema};

    struct Stalled;

    #[async_trait]
    impl StructuredGenerate for Stalled {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<TypedResult, GenerationError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(request.schema.parse(serde_json::json!({}))?)
        }
    }

    #[tokio::test]
    async fn test_expiry_is_a_timeout_error() {
        let schema = Schema::builder("empty").build().unwrap();
        let request = GenerationRequest::new("slow_step", schema, "prompt");

        let err = generate_bounded(&Stalled, &request, Duration::from_millis(20))
            .await
            .unwrap_err();
        match err {
            WorkflowError::Timeout { operation, duration } => {
                assert!(operation.contains("slow_step"));
                assert_eq!(duration, Duration::from_millis(20));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
