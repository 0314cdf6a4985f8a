//! Middleware chain wrapped around handler invocation.
//!
//! A chain is an ordered list of [`Middleware`] values sharing one
//! `handle(envelope, next)` signature. The first middleware added is the
//! outermost one. Each link gets a [`Next`] that it must run exactly once;
//! `Next::run` takes `self`, so a link cannot call it twice.
//!
//! Middleware observes handling. It must hand the inner result back
//! unchanged: no error conversion, suppression or retrying.

use crate::handler::MessageHandler;
use async_trait::async_trait;
use order_pipeline_broker::PipelineMetrics;
use order_pipeline_core::{Envelope, RetryDecision, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, envelope: &Envelope, next: Next<'_>) -> Result<()>;
}

/// The remainder of the chain, ending in the handler
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    handler: &'a dyn MessageHandler,
}

impl<'a> Next<'a> {
    pub async fn run(self, envelope: &Envelope) -> Result<()> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middlewares: rest,
                    handler: self.handler,
                };
                current.handle(envelope, next).await
            }
            None => self.handler.handle(envelope).await,
        }
    }
}

/// Ordered middleware chain
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware (inside all previously added ones)
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the envelope through every middleware and then the handler
    pub async fn run(&self, envelope: &Envelope, handler: &dyn MessageHandler) -> Result<()> {
        Next {
            middlewares: &self.middlewares,
            handler,
        }
        .run(envelope)
        .await
    }
}

/// Times every handling and logs its outcome
#[derive(Debug, Clone, Default)]
pub struct TimingMiddleware;

#[async_trait]
impl Middleware for TimingMiddleware {
    async fn handle(&self, envelope: &Envelope, next: Next<'_>) -> Result<()> {
        let kind = envelope.kind();
        let order_id = envelope.message().order_id();

        info!(message_kind = %kind, order_id = %order_id, "Message handling started");

        let start = Instant::now();
        let result = next.run(envelope).await;
        let duration_ms = elapsed_ms(start);

        match &result {
            Ok(()) => info!(
                message_kind = %kind,
                order_id = %order_id,
                duration_ms,
                "Message handled"
            ),
            Err(err) => error!(
                message_kind = %kind,
                order_id = %order_id,
                duration_ms,
                error = %err,
                "Message handling failed"
            ),
        }

        result
    }
}

/// Milliseconds since `start`, rounded to two decimals
fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0
}

/// Records handling duration and outcome in prometheus
pub struct MetricsMiddleware {
    metrics: Arc<PipelineMetrics>,
}

impl MetricsMiddleware {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        MetricsMiddleware { metrics }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    async fn handle(&self, envelope: &Envelope, next: Next<'_>) -> Result<()> {
        let kind = envelope.kind().as_str();

        let start = Instant::now();
        let result = next.run(envelope).await;

        self.metrics
            .observe_handling_duration(kind, start.elapsed().as_secs_f64());
        self.metrics
            .inc_handled(kind, RetryDecision::of(&result).as_str());

        result
    }
}
