use std::time::Duration;

use thiserror::Error;

/// Fatal run-level failures. Everything else is absorbed into the run and
/// reported through counters and event records.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Malformed or incomplete task spec. Raised before a session is opened.
    #[error("invalid task spec: {0}")]
    SpecInvalid(String),

    /// Could not open a browser session for the run.
    #[error("browser session error: {0}")]
    Session(String),

    /// Initial navigation to the start URL failed; the run never stepped.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The whole evaluation exceeded the run's wall-clock budget.
    #[error("run timed out after {0}s")]
    RunTimeout(u64),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Failures of a single white-agent call. All of these are recoverable:
/// the loop counts, logs, and moves on.
#[derive(Debug, Error)]
pub enum AgentCallError {
    #[error("white agent call timed out after {0:?}")]
    Timeout(Duration),

    #[error("white agent returned error status {0}")]
    Status(u16),

    #[error("white agent response missing 'action' field")]
    MissingAction,

    #[error("white agent request failed: {0}")]
    Transport(String),
}

impl AgentCallError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentCallError::Timeout(_))
    }
}
