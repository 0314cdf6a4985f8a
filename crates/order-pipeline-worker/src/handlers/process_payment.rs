use super::unexpected_kind;
use crate::handler::MessageHandler;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use order_pipeline_broker::Dispatcher;
use order_pipeline_core::{Envelope, Message, MessageKind, PipelineError, Result, RetryDecision};
use tracing::{error, info, warn};

/// Charges the order through the retry policy and, on success, requests
/// the confirmation email
pub struct ProcessPaymentHandler {
    dispatcher: Dispatcher,
    policy: RetryPolicy,
}

impl ProcessPaymentHandler {
    pub fn new(dispatcher: Dispatcher, policy: RetryPolicy) -> Self {
        ProcessPaymentHandler { dispatcher, policy }
    }
}

#[async_trait]
impl MessageHandler for ProcessPaymentHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        let Message::ProcessPayment { order_id } = envelope.message() else {
            return Err(unexpected_kind(MessageKind::ProcessPayment, envelope));
        };

        let outcome = self.policy.attempt(order_id);
        let attempt = outcome.attempt;
        info!(order_id = %order_id, attempt, "Processing payment");

        match outcome.decision {
            RetryDecision::Success => {
                self.dispatcher
                    .dispatch(Message::send_confirmation(order_id.clone()), vec![])?;
                info!(order_id = %order_id, attempt, "Payment processed");
                Ok(())
            }
            RetryDecision::RetryableFailure => {
                warn!(order_id = %order_id, attempt, "Payment failed, will retry");
                Err(PipelineError::TransientFailure {
                    order_id: order_id.clone(),
                    attempt,
                    reason: format!("payment for order {} was declined", order_id),
                })
            }
            RetryDecision::PermanentFailure => {
                error!(
                    order_id = %order_id,
                    attempt,
                    max_attempts = self.policy.max_attempts(),
                    "Payment failed permanently"
                );
                Err(PipelineError::PermanentFailure {
                    order_id: order_id.clone(),
                    attempt,
                    reason: format!(
                        "payment for order {} failed after {} attempts",
                        order_id, attempt
                    ),
                })
            }
        }
    }
}
