//! Assembly of the order pipeline.
//!
//! [`Pipeline::builder`] wires the dispatcher, attempt store, retry policy,
//! the three order handlers, the middleware chain and a dead-letter sink
//! from a [`WorkerConfig`]. Fault injection, the dead-letter sink and extra
//! middleware can be swapped in before building.

use crate::config::WorkerConfig;
use crate::handler::HandlerRegistry;
use crate::handlers::{PlaceOrderHandler, ProcessPaymentHandler, SendConfirmationHandler};
use crate::middleware::{MetricsMiddleware, Middleware, MiddlewareChain, TimingMiddleware};
use crate::retry::{AttemptStore, FaultInjector, RandomFaults, RetryPolicy};
use crate::submit::{submit_order, OrderReceipt, OrderRequest};
use crate::worker::{WorkerContext, WorkerPool};
use order_pipeline_broker::{DeadLetterSink, Dispatcher, LogDeadLetterSink, PipelineMetrics};
use order_pipeline_core::{MessageKind, Result};
use std::sync::Arc;
use tracing::info;

pub struct PipelineBuilder {
    config: WorkerConfig,
    faults: Option<Arc<dyn FaultInjector>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    /// Replace the random payment faults
    pub fn fault_injector<F: FaultInjector + 'static>(mut self, faults: F) -> Self {
        self.faults = Some(Arc::new(faults));
        self
    }

    /// Replace the logging dead-letter sink
    pub fn dead_letter_sink<S: DeadLetterSink + 'static>(mut self, sink: S) -> Self {
        self.dead_letters = Some(Arc::new(sink));
        self
    }

    /// Add a middleware inside the built-in timing and metrics ones
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> anyhow::Result<Pipeline> {
        let config = self.config;
        config.validate()?;

        let metrics = Arc::new(PipelineMetrics::new()?);
        let dispatcher = Dispatcher::with_metrics(metrics.clone());
        let attempts = Arc::new(AttemptStore::new());

        let faults: Arc<dyn FaultInjector> = match self.faults {
            Some(faults) => faults,
            None => Arc::new(RandomFaults::new(config.retry.failure_rate)),
        };
        let policy =
            RetryPolicy::new(attempts.clone(), faults).with_max_attempts(config.retry.max_attempts);

        let registry = HandlerRegistry::new();
        registry.register(
            MessageKind::PlaceOrder,
            PlaceOrderHandler::new(dispatcher.clone())
                .with_payment_delay(config.orders.payment_delay_ms),
        );
        registry.register(
            MessageKind::ProcessPayment,
            ProcessPaymentHandler::new(dispatcher.clone(), policy),
        );
        registry.register(
            MessageKind::SendConfirmation,
            SendConfirmationHandler::new(config.orders.confirmation_work()),
        );

        let mut chain = MiddlewareChain::new()
            .with(TimingMiddleware)
            .with(MetricsMiddleware::new(metrics));
        for middleware in self.middleware {
            chain.push(middleware);
        }

        let dead_letters: Arc<dyn DeadLetterSink> = match self.dead_letters {
            Some(sink) => sink,
            None => Arc::new(LogDeadLetterSink),
        };

        info!(
            kinds = ?registry.kinds(),
            middleware = chain.len(),
            "Pipeline assembled"
        );

        let ctx = WorkerContext {
            dispatcher,
            registry,
            chain,
            dead_letters,
            backoff: config.retry.backoff(),
        };

        Ok(Pipeline {
            ctx: Arc::new(ctx),
            attempts,
            config,
        })
    }
}

/// An assembled pipeline, ready to accept orders
pub struct Pipeline {
    ctx: Arc<WorkerContext>,
    attempts: Arc<AttemptStore>,
    config: WorkerConfig,
}

impl Pipeline {
    pub fn builder(config: WorkerConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            faults: None,
            dead_letters: None,
            middleware: Vec::new(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.ctx.dispatcher
    }

    pub fn attempts(&self) -> &Arc<AttemptStore> {
        &self.attempts
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.ctx.dispatcher.metrics()
    }

    /// Submit an order within the configured amount limit
    pub fn submit(&self, request: OrderRequest) -> Result<OrderReceipt> {
        submit_order(&self.ctx.dispatcher, request, self.config.orders.max_amount)
    }

    /// Start the worker pool
    pub fn spawn(&self) -> PipelineHandle {
        let pool = WorkerPool::spawn(self.ctx.clone(), self.config.workers.concurrency)
            .with_graceful_timeout(self.config.graceful_shutdown_timeout());

        PipelineHandle {
            dispatcher: self.ctx.dispatcher.clone(),
            pool,
        }
    }
}

/// Running workers of a [`Pipeline`]
pub struct PipelineHandle {
    dispatcher: Dispatcher,
    pool: WorkerPool,
}

impl PipelineHandle {
    /// Resolve once no message is pending or being handled
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    /// Stop the workers, then refuse further dispatches
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
        self.dispatcher.close();
        info!(pending = self.dispatcher.pending(), "Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_pipeline_core::{Amount, OrderId};

    #[test]
    fn test_build_registers_all_handlers() {
        let pipeline = Pipeline::builder(WorkerConfig::default()).build().unwrap();
        let mut kinds = pipeline.ctx.registry.kinds();
        kinds.sort_by_key(|kind| kind.as_str());

        assert_eq!(
            kinds,
            vec![
                MessageKind::PlaceOrder,
                MessageKind::ProcessPayment,
                MessageKind::SendConfirmation,
            ]
        );
        assert_eq!(pipeline.ctx.chain.len(), 2);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = WorkerConfig::default();
        config.workers.concurrency = 0;
        assert!(Pipeline::builder(config).build().is_err());
    }

    #[test]
    fn test_submit_uses_configured_limit() {
        let mut config = WorkerConfig::default();
        config.orders.max_amount = "20.00".parse().unwrap();
        let pipeline = Pipeline::builder(config)
            .fault_injector(|_: &OrderId, _: u32| false)
            .middleware(TimingMiddleware)
            .build()
            .unwrap();
        assert_eq!(pipeline.ctx.chain.len(), 3);

        let request = OrderRequest::with_amount("20.01".parse().unwrap());
        assert!(pipeline.submit(request).is_err());

        let receipt = pipeline.submit(OrderRequest::default()).unwrap();
        assert!(receipt.amount <= Amount::from_cents(20_00));
        assert_eq!(pipeline.dispatcher().pending(), 1);
    }
}
