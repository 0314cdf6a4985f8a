use async_trait::async_trait;
use order_pipeline_core::{Envelope, MessageKind, PipelineError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Trait for message handlers
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one delivery of the envelope's message
    async fn handle(&self, envelope: &Envelope) -> Result<()>;
}

/// Registry of message handlers by message kind
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<MessageKind, Arc<dyn MessageHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for a message kind, replacing any previous one
    pub fn register<H: MessageHandler + 'static>(&self, kind: MessageKind, handler: H) {
        let mut handlers = self.handlers.write();
        handlers.insert(kind, Arc::new(handler));
    }

    /// Get a handler for a message kind
    pub fn get(&self, kind: MessageKind) -> Option<Arc<dyn MessageHandler>> {
        let handlers = self.handlers.read();
        handlers.get(&kind).cloned()
    }

    /// Like [`HandlerRegistry::get`], failing with `UnknownHandler`
    pub fn resolve(&self, kind: MessageKind) -> Result<Arc<dyn MessageHandler>> {
        self.get(kind).ok_or(PipelineError::UnknownHandler(kind))
    }

    pub fn has_handler(&self, kind: MessageKind) -> bool {
        let handlers = self.handlers.read();
        handlers.contains_key(&kind)
    }

    /// Get all registered message kinds
    pub fn kinds(&self) -> Vec<MessageKind> {
        let handlers = self.handlers.read();
        handlers.keys().copied().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler backed by an async closure
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`MessageHandler`]
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        (self.f)(envelope.clone()).await
    }
}
