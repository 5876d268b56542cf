//! Foundation utilities shared by every flowgate crate.
//!
//! - [`error`]: the error taxonomy below the workflow layer (LLM transport,
//!   schema conformance, generation rounds, configuration) and the
//!   [`error::UserFriendlyError`] reporting contract
//! - [`exit_codes`]: process exit codes for the CLI
//! - [`logging`]: tracing initialization
//! - [`json`]: extraction of JSON payloads from model text
//! - [`redaction`]: scrubbing of credentials from error text before logging

pub mod error;
pub mod exit_codes;
pub mod json;
pub mod logging;
pub mod redaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
