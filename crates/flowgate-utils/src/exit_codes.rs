//! Exit code constants for the flowgate CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Workflow completed |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CONFIG` | Invalid CLI arguments or configuration |
//! | 3 | `NOT_APPLICABLE` | A chain gate or the routing confidence guard declined the input |
//! | 4 | `VALIDATION_REJECTED` | Parallel validation did not pass |
//! | 5 | `APPROVAL_NOT_GRANTED` | Approval loop ended cancelled or exhausted |
//! | 10 | `TIMEOUT` | A generation or decision call timed out |
//! | 70 | `LLM_FAILURE` | Backend, schema or tool-call failure |

use crate::error::{ConfigError, GenerationError, LlmError};

/// Process exit code.
///
/// The numeric values are part of the CLI contract. Use the named constants and
/// [`as_i32()`](Self::as_i32) with `std::process::exit()`.
///
/// ```rust
/// use flowgate_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::NOT_APPLICABLE, ExitCode::from_i32(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Workflow completed
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Configuration or CLI arguments error
    pub const CONFIG: ExitCode = ExitCode(2);

    /// Gate closed or low-confidence guard - the workflow does not apply to this input
    pub const NOT_APPLICABLE: ExitCode = ExitCode(3);

    /// Parallel validation rejected the input
    pub const VALIDATION_REJECTED: ExitCode = ExitCode(4);

    /// Approval loop ended without an approved draft
    pub const APPROVAL_NOT_GRANTED: ExitCode = ExitCode(5);

    /// A bounded call exceeded its timeout
    pub const TIMEOUT: ExitCode = ExitCode(10);

    /// LLM backend, schema or tool-call failure
    pub const LLM_FAILURE: ExitCode = ExitCode(70);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    ///
    /// Prefer using the named constants when possible.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl ConfigError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::CONFIG
    }
}

impl LlmError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Timeout { .. } => ExitCode::TIMEOUT,
            Self::Misconfiguration(_) | Self::Unsupported(_) => ExitCode::CONFIG,
            _ => ExitCode::LLM_FAILURE,
        }
    }
}

impl GenerationError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Llm(err) => err.to_exit_code(),
            _ => ExitCode::LLM_FAILURE,
        }
    }
}
