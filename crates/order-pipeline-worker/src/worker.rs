use crate::handler::HandlerRegistry;
use crate::middleware::MiddlewareChain;
use crate::retry::RetryBackoff;
use order_pipeline_broker::{DeadLetter, DeadLetterSink, Delivery, Dispatcher};
use order_pipeline_core::{Envelope, PipelineError, Result, RetryDecision, Stamp};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Everything a worker needs to handle a delivery
pub struct WorkerContext {
    pub dispatcher: Dispatcher,
    pub registry: HandlerRegistry,
    pub chain: MiddlewareChain,
    pub dead_letters: Arc<dyn DeadLetterSink>,
    pub backoff: RetryBackoff,
}

impl WorkerContext {
    /// Run the registered handler for the envelope's kind through the chain
    pub async fn handle(&self, envelope: &Envelope) -> Result<()> {
        let handler = self.registry.resolve(envelope.kind())?;
        self.chain.run(envelope, handler.as_ref()).await
    }
}

/// Pulls due envelopes and routes handler failures
pub struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>, shutdown: CancellationToken) -> Self {
        Worker { id, ctx, shutdown }
    }

    /// Run until the shutdown token is cancelled. A delivery in hand is
    /// always finished first.
    pub async fn run(self) {
        info!(worker_id = self.id, "Worker started");

        while let Some(delivery) = self.ctx.dispatcher.next_due(&self.shutdown).await {
            self.process(delivery).await;
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Handle one delivery and act on the outcome.
    ///
    /// Retries are dispatched before the delivery is released, so the
    /// pipeline never looks idle between attempts.
    pub async fn process(&self, delivery: Delivery) -> RetryDecision {
        let envelope = delivery.envelope();
        debug!(
            worker_id = self.id,
            envelope_id = %envelope.id(),
            kind = %envelope.kind(),
            "Delivery received"
        );

        let result = self.ctx.handle(envelope).await;
        let decision = RetryDecision::of(&result);

        if let Err(err) = result {
            match decision {
                RetryDecision::RetryableFailure => self.retry(envelope, &err),
                _ => {
                    // Business failures are already logged by their handler
                    if err.attempt().is_none() {
                        error!(
                            worker_id = self.id,
                            order_id = %envelope.message().order_id(),
                            message_kind = %envelope.kind(),
                            error = %err,
                            "Message could not be handled"
                        );
                    }
                    self.dead_letter(envelope, err.attempt(), err.to_string());
                }
            }
        }

        drop(delivery);
        decision
    }

    fn retry(&self, envelope: &Envelope, err: &PipelineError) {
        let attempt = err.attempt().unwrap_or(0);
        let stamps: Vec<Stamp> = self
            .ctx
            .backoff
            .delay_for(attempt)
            .map(Stamp::delay)
            .into_iter()
            .collect();

        match self
            .ctx
            .dispatcher
            .dispatch(envelope.message().clone(), stamps)
        {
            Ok(envelope_id) => {
                self.ctx.dispatcher.metrics().retries.inc();
                warn!(
                    worker_id = self.id,
                    order_id = %envelope.message().order_id(),
                    attempt,
                    envelope_id = %envelope_id,
                    "Message re-dispatched for retry"
                );
            }
            Err(dispatch_err) => {
                error!(
                    worker_id = self.id,
                    order_id = %envelope.message().order_id(),
                    attempt,
                    error = %dispatch_err,
                    "Failed to re-dispatch message"
                );
                self.dead_letter(
                    envelope,
                    Some(attempt),
                    format!("{} (retry not dispatched: {})", err, dispatch_err),
                );
            }
        }
    }

    fn dead_letter(&self, envelope: &Envelope, attempt: Option<u32>, reason: String) {
        let letter = DeadLetter::new(envelope.message().clone(), attempt, reason);
        self.ctx.dispatcher.metrics().dead_letters.inc();

        let sink = self.ctx.dead_letters.clone();
        tokio::spawn(async move {
            let order_id = letter.order_id.clone();
            if let Err(e) = sink.deliver(letter).await {
                error!(order_id = %order_id, error = %e, "Failed to deliver dead letter");
            }
        });
    }
}

/// Fixed-size group of workers sharing one dispatcher
pub struct WorkerPool {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    graceful_timeout: Duration,
}

impl WorkerPool {
    pub fn spawn(ctx: Arc<WorkerContext>, concurrency: usize) -> Self {
        let shutdown = CancellationToken::new();
        let concurrency = concurrency.max(1);

        let handles = (0..concurrency)
            .map(|id| {
                let worker = Worker::new(id, ctx.clone(), shutdown.child_token());
                tokio::spawn(worker.run())
            })
            .collect();

        info!(concurrency, "Worker pool started");

        WorkerPool {
            shutdown,
            handles,
            graceful_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_graceful_timeout(mut self, graceful_timeout: Duration) -> Self {
        self.graceful_timeout = graceful_timeout;
        self
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop all workers, waiting for deliveries in hand up to the graceful
    /// timeout
    pub async fn shutdown(self) {
        info!("Waiting for active workers to complete...");
        self.shutdown.cancel();

        let aborts: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(self.graceful_timeout, join_all(self.handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "Worker task failed");
                    }
                }
                info!("All workers stopped");
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.graceful_timeout.as_secs(),
                    "Shutdown deadline exceeded, aborting active workers"
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use order_pipeline_broker::ChannelDeadLetterSink;
    use order_pipeline_core::{DelayStamp, Message, MessageKind, OrderId};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn context(
        registry: HandlerRegistry,
        backoff: RetryBackoff,
    ) -> (Arc<WorkerContext>, UnboundedReceiver<DeadLetter>) {
        let (sink, rx) = ChannelDeadLetterSink::new();
        let ctx = WorkerContext {
            dispatcher: Dispatcher::new(),
            registry,
            chain: MiddlewareChain::new(),
            dead_letters: Arc::new(sink),
            backoff,
        };
        (Arc::new(ctx), rx)
    }

    fn transient(attempt: u32) -> PipelineError {
        PipelineError::TransientFailure {
            order_id: OrderId::new("ORDER-1"),
            attempt,
            reason: "declined".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_handler_is_dead_lettered() {
        let (ctx, mut rx) = context(HandlerRegistry::new(), RetryBackoff::disabled());
        let worker = Worker::new(0, ctx.clone(), CancellationToken::new());

        ctx.dispatcher
            .dispatch(Message::send_confirmation("ORDER-7"), vec![])
            .unwrap();
        let delivery = ctx.dispatcher.try_next_due().unwrap();

        assert_eq!(worker.process(delivery).await, RetryDecision::PermanentFailure);

        let letter = rx.recv().await.unwrap();
        assert_eq!(letter.order_id.as_str(), "ORDER-7");
        assert_eq!(letter.attempt, None);
        assert!(letter.reason.contains("send_confirmation"));
        assert!(ctx.dispatcher.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_is_redispatched() {
        let registry = HandlerRegistry::new();
        registry.register(
            MessageKind::ProcessPayment,
            handler_fn(|_| async { Err(transient(2)) }),
        );
        let (ctx, mut rx) = context(registry, RetryBackoff::new(100, 1000));
        let worker = Worker::new(0, ctx.clone(), CancellationToken::new());

        ctx.dispatcher
            .dispatch(Message::process_payment("ORDER-1"), vec![])
            .unwrap();
        let delivery = ctx.dispatcher.try_next_due().unwrap();
        let first_id = delivery.envelope().id();

        assert_eq!(worker.process(delivery).await, RetryDecision::RetryableFailure);

        let pending = ctx.dispatcher.snapshot();
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].id(), first_id);
        assert_eq!(pending[0].message(), &Message::process_payment("ORDER-1"));
        assert_eq!(pending[0].delay(), Some(DelayStamp::new(200)));
        assert_eq!(ctx.dispatcher.metrics().retries.get(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_retry_without_backoff_is_immediate() {
        let registry = HandlerRegistry::new();
        registry.register(
            MessageKind::ProcessPayment,
            handler_fn(|_| async { Err(transient(1)) }),
        );
        let (ctx, _rx) = context(registry, RetryBackoff::disabled());
        let worker = Worker::new(0, ctx.clone(), CancellationToken::new());

        ctx.dispatcher
            .dispatch(Message::process_payment("ORDER-1"), vec![])
            .unwrap();
        let delivery = ctx.dispatcher.try_next_due().unwrap();
        worker.process(delivery).await;

        let retry = ctx.dispatcher.try_next_due().unwrap();
        assert!(retry.envelope().delay().is_none());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_dead_lettered_once() {
        let registry = HandlerRegistry::new();
        registry.register(
            MessageKind::ProcessPayment,
            handler_fn(|_| async {
                Err(PipelineError::PermanentFailure {
                    order_id: OrderId::new("ORDER-1"),
                    attempt: 4,
                    reason: "payment for order ORDER-1 failed after 4 attempts".to_string(),
                })
            }),
        );
        let (ctx, mut rx) = context(registry, RetryBackoff::disabled());
        let worker = Worker::new(0, ctx.clone(), CancellationToken::new());

        ctx.dispatcher
            .dispatch(Message::process_payment("ORDER-1"), vec![])
            .unwrap();
        let delivery = ctx.dispatcher.try_next_due().unwrap();

        assert_eq!(worker.process(delivery).await, RetryDecision::PermanentFailure);
        assert_eq!(ctx.dispatcher.pending(), 0);

        let letter = rx.recv().await.unwrap();
        assert_eq!(letter.attempt, Some(4));
        assert!(letter.reason.contains("ORDER-1"));
        assert_eq!(ctx.dispatcher.metrics().dead_letters.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_workers_past_deadline() {
        let registry = HandlerRegistry::new();
        registry.register(
            MessageKind::SendConfirmation,
            handler_fn(|_| std::future::pending::<Result<()>>()),
        );
        let (ctx, _rx) = context(registry, RetryBackoff::disabled());

        ctx.dispatcher
            .dispatch(Message::send_confirmation("ORDER-8"), vec![])
            .unwrap();

        let pool =
            WorkerPool::spawn(ctx.clone(), 1).with_graceful_timeout(Duration::from_millis(50));
        while ctx.dispatcher.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        pool.shutdown().await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // The aborted worker released its delivery
        assert_eq!(ctx.dispatcher.in_flight(), 0);
        assert!(ctx.dispatcher.is_idle());
    }

    #[tokio::test]
    async fn test_pool_drains_queue_and_stops() {
        let registry = HandlerRegistry::new();
        registry.register(MessageKind::SendConfirmation, handler_fn(|_| async { Ok(()) }));
        let (ctx, _rx) = context(registry, RetryBackoff::disabled());

        for i in 0..20 {
            ctx.dispatcher
                .dispatch(Message::send_confirmation(format!("ORDER-{}", i).as_str()), vec![])
                .unwrap();
        }

        let pool = WorkerPool::spawn(ctx.clone(), 4).with_graceful_timeout(Duration::from_secs(5));
        assert_eq!(pool.size(), 4);

        ctx.dispatcher.wait_idle().await;
        assert_eq!(ctx.dispatcher.pending(), 0);

        pool.shutdown().await;
        assert_eq!(
            ctx.dispatcher
                .metrics()
                .messages_dispatched
                .with_label_values(&["send_confirmation"])
                .get(),
            20
        );
    }
}
