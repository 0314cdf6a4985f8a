use crate::{MessageKind, OrderId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("No handler registered for message kind {0}")]
    UnknownHandler(MessageKind),

    #[error("Transient failure for order {order_id} on attempt {attempt}: {reason}")]
    TransientFailure {
        order_id: OrderId,
        attempt: u32,
        reason: String,
    },

    #[error("Permanent failure for order {order_id} on attempt {attempt}: {reason}")]
    PermanentFailure {
        order_id: OrderId,
        attempt: u32,
        reason: String,
    },

    #[error("Handler failure: {0}")]
    Handler(String),

    #[error("Dispatcher is closed")]
    QueueClosed,
}

impl PipelineError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        PipelineError::InvalidMessage(reason.into())
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::TransientFailure { .. })
    }

    /// Business attempt number carried by the failure, if any.
    pub fn attempt(&self) -> Option<u32> {
        match self {
            PipelineError::TransientFailure { attempt, .. }
            | PipelineError::PermanentFailure { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            PipelineError::TransientFailure { order_id, .. }
            | PipelineError::PermanentFailure { order_id, .. } => Some(order_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
