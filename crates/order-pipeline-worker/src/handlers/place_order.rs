use super::unexpected_kind;
use crate::handler::MessageHandler;
use async_trait::async_trait;
use order_pipeline_broker::Dispatcher;
use order_pipeline_core::{Envelope, Message, MessageKind, Result, Stamp};
use tracing::info;

pub const DEFAULT_PAYMENT_DELAY_MS: u64 = 5000;

/// Accepts new orders and schedules their payment
pub struct PlaceOrderHandler {
    dispatcher: Dispatcher,
    payment_delay_ms: u64,
}

impl PlaceOrderHandler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        PlaceOrderHandler {
            dispatcher,
            payment_delay_ms: DEFAULT_PAYMENT_DELAY_MS,
        }
    }

    pub fn with_payment_delay(mut self, payment_delay_ms: u64) -> Self {
        self.payment_delay_ms = payment_delay_ms;
        self
    }
}

#[async_trait]
impl MessageHandler for PlaceOrderHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        let Message::PlaceOrder { order_id, amount } = envelope.message() else {
            return Err(unexpected_kind(MessageKind::PlaceOrder, envelope));
        };

        info!(order_id = %order_id, amount = %amount, "Order placed");

        self.dispatcher.dispatch(
            Message::process_payment(order_id.clone()),
            vec![Stamp::delay(self.payment_delay_ms)],
        )?;

        info!(
            order_id = %order_id,
            delay_ms = self.payment_delay_ms,
            "Payment scheduled"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_pipeline_core::{DelayStamp, PipelineError};

    #[tokio::test(start_paused = true)]
    async fn test_schedules_one_delayed_payment() {
        let dispatcher = Dispatcher::new();
        let handler = PlaceOrderHandler::new(dispatcher.clone());

        let envelope = Envelope::new(
            Message::place_order("ORDER-1", "10.00".parse().unwrap()),
            vec![],
        );
        handler.handle(&envelope).await.unwrap();

        let pending = dispatcher.snapshot();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message(), &Message::process_payment("ORDER-1"));
        assert_eq!(pending[0].delay(), Some(DelayStamp::new(5000)));
        assert!(dispatcher.try_next_due().is_none());
    }

    #[tokio::test]
    async fn test_rejects_other_kinds() {
        let dispatcher = Dispatcher::new();
        let handler = PlaceOrderHandler::new(dispatcher.clone());

        let envelope = Envelope::new(Message::send_confirmation("ORDER-1"), vec![]);
        let result = handler.handle(&envelope).await;

        assert!(matches!(result, Err(PipelineError::InvalidMessage(_))));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_closed_dispatcher_fails_placement() {
        let dispatcher = Dispatcher::new();
        let handler = PlaceOrderHandler::new(dispatcher.clone()).with_payment_delay(10);
        dispatcher.close();

        let envelope = Envelope::new(
            Message::place_order("ORDER-2", "25.50".parse().unwrap()),
            vec![],
        );
        assert_eq!(handler.handle(&envelope).await, Err(PipelineError::QueueClosed));
    }
}
