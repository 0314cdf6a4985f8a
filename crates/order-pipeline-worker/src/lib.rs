pub mod config;
pub mod handler;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod retry;
pub mod submit;
pub mod worker;

pub use config::WorkerConfig;
pub use handler::{handler_fn, HandlerRegistry, MessageHandler};
pub use middleware::{MetricsMiddleware, Middleware, MiddlewareChain, Next, TimingMiddleware};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineHandle};
pub use retry::{AttemptStore, FaultInjector, PaymentAttempt, RandomFaults, RetryBackoff, RetryPolicy};
pub use submit::{random_amount, submit_order, OrderReceipt, OrderRequest};
pub use worker::{Worker, WorkerContext, WorkerPool};
