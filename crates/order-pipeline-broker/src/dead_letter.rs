use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_pipeline_core::{Message, OrderId};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::error;

/// A message that failed permanently and will not be retried
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub message: Message,
    pub order_id: OrderId,
    /// Business attempt on which the message failed; `None` for structural
    /// failures such as a missing handler
    pub attempt: Option<u32>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(message: Message, attempt: Option<u32>, reason: impl Into<String>) -> Self {
        DeadLetter {
            order_id: message.order_id().clone(),
            message,
            attempt,
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Terminal destination for permanently failed messages.
///
/// Delivery is fire-and-forget from the worker's point of view: the worker
/// spawns the call and only logs a returned error.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn deliver(&self, letter: DeadLetter) -> anyhow::Result<()>;
}

/// Sink that records dead letters as error-level log entries
#[derive(Debug, Clone, Default)]
pub struct LogDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn deliver(&self, letter: DeadLetter) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&letter.message)?;
        error!(
            order_id = %letter.order_id,
            attempt = ?letter.attempt,
            reason = %letter.reason,
            payload = %payload,
            "Message moved to dead letter queue"
        );
        Ok(())
    }
}

/// Sink that forwards dead letters to an mpsc receiver
#[derive(Debug, Clone)]
pub struct ChannelDeadLetterSink {
    tx: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelDeadLetterSink { tx }, rx)
    }
}

#[async_trait]
impl DeadLetterSink for ChannelDeadLetterSink {
    async fn deliver(&self, letter: DeadLetter) -> anyhow::Result<()> {
        self.tx
            .send(letter)
            .map_err(|e| anyhow::anyhow!("Dead letter receiver dropped for order {}", e.0.order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_letters() {
        let (sink, mut rx) = ChannelDeadLetterSink::new();

        let letter = DeadLetter::new(Message::process_payment("ORDER-1"), Some(4), "card declined");
        sink.deliver(letter.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, letter);
        assert_eq!(received.order_id.as_str(), "ORDER-1");
        assert_eq!(received.attempt, Some(4));
    }

    #[tokio::test]
    async fn test_channel_sink_reports_dropped_receiver() {
        let (sink, rx) = ChannelDeadLetterSink::new();
        drop(rx);

        let letter = DeadLetter::new(Message::process_payment("ORDER-9"), None, "no handler");
        let err = sink.deliver(letter).await.unwrap_err();
        assert!(err.to_string().contains("ORDER-9"));
    }

    #[tokio::test]
    async fn test_log_sink_accepts_letters() {
        let letter = DeadLetter::new(Message::send_confirmation("ORDER-2"), None, "no handler");
        assert!(LogDeadLetterSink.deliver(letter).await.is_ok());
    }
}
