//! Terminal decision source for the approval loop.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use flowgate_engine::{ApprovalDecision, DecisionSource, WorkflowError};

type SharedReader = Arc<Mutex<Box<dyn BufRead + Send>>>;
type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Shows each draft and reads one line of response.
///
/// End of input reads as an empty response, which cancels. A read that
/// never returns keeps its blocking thread busy; callers bounding the wait
/// must not block on runtime shutdown afterwards.
pub struct ConsoleDecisions {
    input: SharedReader,
    output: SharedWriter,
}

impl ConsoleDecisions {
    /// Prompt on stdout, read from stdin.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }

    pub fn new(input: impl BufRead + Send + 'static, output: impl Write + Send + 'static) -> Self {
        Self {
            input: Arc::new(Mutex::new(Box::new(input))),
            output: Arc::new(Mutex::new(Box::new(output))),
        }
    }

    fn prompt_and_read(
        input: &SharedReader,
        output: &SharedWriter,
        draft: &str,
    ) -> io::Result<String> {
        {
            let mut out = output.lock().unwrap_or_else(|e| e.into_inner());
            writeln!(out, "\n{draft}\n")?;
            write!(out, "Approve this draft? [approve / retry / cancel]: ")?;
            out.flush()?;
        }
        let mut line = String::new();
        input
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .read_line(&mut line)?;
        Ok(line)
    }
}

#[async_trait]
impl DecisionSource for ConsoleDecisions {
    async fn decide(&self, draft: &str) -> Result<ApprovalDecision, WorkflowError> {
        let input = Arc::clone(&self.input);
        let output = Arc::clone(&self.output);
        let draft = draft.to_string();

        // Blocking terminal reads stay off the async workers.
        let line = tokio::task::spawn_blocking(move || Self::prompt_and_read(&input, &output, &draft))
            .await
            .map_err(|e| WorkflowError::DecisionUnavailable(format!("decision prompt task failed: {e}")))?
            .map_err(|e| WorkflowError::DecisionUnavailable(format!("cannot read decision input: {e}")))?;

        let decision = ApprovalDecision::from_response(&line);
        debug!(response = %line.trim(), decision = %decision, "Read decision");
        Ok(decision)
    }
}
