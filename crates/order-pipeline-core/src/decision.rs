use crate::PipelineError;
use serde::{Deserialize, Serialize};

/// Outcome classification for a single handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryDecision {
    /// Handled; follow-ups (if any) are already dispatched
    Success,
    /// Re-dispatch the message for another attempt
    RetryableFailure,
    /// Route to dead-letter, never retry
    PermanentFailure,
}

impl RetryDecision {
    /// Classify a handling result.
    ///
    /// Structural errors (unknown handler, invalid message) are permanent:
    /// redelivering the same envelope cannot fix them.
    pub fn of<T>(result: &Result<T, PipelineError>) -> Self {
        match result {
            Ok(_) => RetryDecision::Success,
            Err(err) if err.is_retryable() => RetryDecision::RetryableFailure,
            Err(_) => RetryDecision::PermanentFailure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetryDecision::Success => "success",
            RetryDecision::RetryableFailure => "retryable_failure",
            RetryDecision::PermanentFailure => "permanent_failure",
        }
    }
}
