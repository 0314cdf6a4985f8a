use crate::metrics::PipelineMetrics;
use crate::queue::{ReadyQueue, Readiness};
use order_pipeline_core::{Envelope, EnvelopeId, Message, PipelineError, Result, Stamp};

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

struct Shared {
    queue: ReadyQueue,
    /// Signalled whenever an envelope is enqueued
    ready: Notify,
    /// Signalled when the last in-flight delivery finishes on an empty queue
    idle: Notify,
    closed: AtomicBool,
    metrics: Arc<PipelineMetrics>,
}

/// Accepts messages, wraps them in envelopes and enqueues them.
///
/// `Dispatcher` is a cheap handle: clones share the same queue, so producers,
/// handlers emitting follow-ups and workers can all hold one.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(PipelineMetrics::default()))
    }

    pub fn with_metrics(metrics: Arc<PipelineMetrics>) -> Self {
        Dispatcher {
            shared: Arc::new(Shared {
                queue: ReadyQueue::new(),
                ready: Notify::new(),
                idle: Notify::new(),
                closed: AtomicBool::new(false),
                metrics,
            }),
        }
    }

    /// Dispatch a message. Returns once the envelope is enqueued; handling
    /// happens later on a worker.
    pub fn dispatch(&self, message: Message, stamps: Vec<Stamp>) -> Result<EnvelopeId> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(PipelineError::QueueClosed);
        }

        message.validate()?;

        let envelope = Envelope::new(message, stamps);
        let envelope_id = envelope.id();
        let kind = envelope.kind();

        debug!(
            envelope_id = %envelope_id,
            kind = %kind,
            order_id = %envelope.message().order_id(),
            delay_ms = envelope.delay().map(|d| d.millis()).unwrap_or(0),
            "Message dispatched"
        );

        self.shared.queue.push(envelope);
        self.shared.metrics.inc_dispatched(kind.as_str());
        self.update_queue_depth();
        self.shared.ready.notify_waiters();

        Ok(envelope_id)
    }

    /// Wait for the next due envelope.
    ///
    /// Delayed envelopes are never slept on while holding them: the caller
    /// waits for the earliest eligible-at or for a new dispatch, whichever
    /// comes first. Returns `None` once `shutdown` is cancelled.
    pub async fn next_due(&self, shutdown: &CancellationToken) -> Option<Delivery> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }

            let notified = self.shared.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = match self.shared.queue.pop_due(Instant::now()) {
                Readiness::Due(envelope) => return Some(self.deliver(envelope)),
                Readiness::NotBefore(at) => Some(at),
                Readiness::Empty => None,
            };

            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = &mut notified => {}
                _ = sleep_until(wake_at) => {}
            }
        }
    }

    /// Take the next envelope only if one is due right now
    pub fn try_next_due(&self) -> Option<Delivery> {
        match self.shared.queue.pop_due(Instant::now()) {
            Readiness::Due(envelope) => Some(self.deliver(envelope)),
            _ => None,
        }
    }

    /// Resolve once nothing is pending (delayed envelopes included) and
    /// nothing is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.queue.is_idle() {
                return;
            }

            notified.await;
        }
    }

    /// Reject any further dispatch
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Pending envelope count, delayed ones included
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.queue.in_flight()
    }

    pub fn is_idle(&self) -> bool {
        self.shared.queue.is_idle()
    }

    /// Pending envelopes in delivery order
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.shared.queue.snapshot()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.shared.metrics.clone()
    }

    fn deliver(&self, envelope: Envelope) -> Delivery {
        self.update_queue_depth();
        Delivery {
            envelope,
            shared: self.shared.clone(),
        }
    }

    fn update_queue_depth(&self) {
        self.shared
            .metrics
            .queue_depth
            .set(self.shared.queue.len() as i64);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// An envelope checked out by a worker.
///
/// Dropping the delivery marks it finished; follow-ups and retries must be
/// dispatched before that so the pipeline never looks idle in between.
pub struct Delivery {
    envelope: Envelope,
    shared: Arc<Shared>,
}

impl Delivery {
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.shared.queue.finish() {
            self.shared.idle.notify_waiters();
        }
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
