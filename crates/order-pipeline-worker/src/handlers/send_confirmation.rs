use super::unexpected_kind;
use crate::handler::MessageHandler;
use async_trait::async_trait;
use order_pipeline_core::{Envelope, Message, MessageKind, PipelineError, Result};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIRMATION_WORK_MS: u64 = 1000;

/// Sends the order confirmation email.
///
/// Sending is simulated by a blocking sleep on tokio's blocking pool; the
/// worker awaits it, so it stays occupied for the whole duration.
pub struct SendConfirmationHandler {
    work: Duration,
}

impl SendConfirmationHandler {
    pub fn new(work: Duration) -> Self {
        SendConfirmationHandler { work }
    }
}

impl Default for SendConfirmationHandler {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_CONFIRMATION_WORK_MS))
    }
}

#[async_trait]
impl MessageHandler for SendConfirmationHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        let Message::SendConfirmation { order_id } = envelope.message() else {
            return Err(unexpected_kind(MessageKind::SendConfirmation, envelope));
        };

        info!(order_id = %order_id, "Sending confirmation email");

        let work = self.work;
        tokio::task::spawn_blocking(move || std::thread::sleep(work))
            .await
            .map_err(|e| PipelineError::Handler(format!("confirmation email task failed: {}", e)))?;

        info!(order_id = %order_id, "Confirmation email sent");
        Ok(())
    }
}
