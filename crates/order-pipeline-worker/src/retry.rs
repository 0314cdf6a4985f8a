use dashmap::DashMap;
use order_pipeline_core::{OrderId, RetryDecision};
use rand::Rng;
use std::sync::Arc;

/// Default number of retryable payment attempts before a failure is final
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default probability that a payment attempt fails
pub const DEFAULT_FAILURE_RATE: f64 = 0.2;

/// Per-order payment attempt counters.
///
/// This is the only retry count in the pipeline. Every payment delivery bumps
/// it, so redelivered envelopes are counted too.
#[derive(Debug, Default)]
pub struct AttemptStore {
    attempts: DashMap<OrderId, u32>,
}

impl AttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increment and return the attempt number for `order_id`
    pub fn increment(&self, order_id: &OrderId) -> u32 {
        let mut entry = self.attempts.entry(order_id.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Current attempt count, 0 for orders never attempted
    pub fn get(&self, order_id: &OrderId) -> u32 {
        self.attempts.get(order_id).map(|n| *n).unwrap_or(0)
    }

    /// Number of orders tracked
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

/// Decides whether a payment attempt fails
pub trait FaultInjector: Send + Sync {
    fn should_fail(&self, order_id: &OrderId, attempt: u32) -> bool;
}

impl<F> FaultInjector for F
where
    F: Fn(&OrderId, u32) -> bool + Send + Sync,
{
    fn should_fail(&self, order_id: &OrderId, attempt: u32) -> bool {
        self(order_id, attempt)
    }
}

/// Fails attempts at random with a fixed probability
#[derive(Debug, Clone, Copy)]
pub struct RandomFaults {
    failure_rate: f64,
}

impl RandomFaults {
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        RandomFaults { failure_rate }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl Default for RandomFaults {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_RATE)
    }
}

impl FaultInjector for RandomFaults {
    fn should_fail(&self, _order_id: &OrderId, _attempt: u32) -> bool {
        rand::thread_rng().gen_bool(self.failure_rate)
    }
}

/// Outcome of one payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentAttempt {
    pub attempt: u32,
    pub decision: RetryDecision,
}

/// Bounded retry state machine for payment processing
#[derive(Clone)]
pub struct RetryPolicy {
    store: Arc<AttemptStore>,
    faults: Arc<dyn FaultInjector>,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(store: Arc<AttemptStore>, faults: Arc<dyn FaultInjector>) -> Self {
        RetryPolicy {
            store,
            faults,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn store(&self) -> &Arc<AttemptStore> {
        &self.store
    }

    /// Record one attempt for `order_id` and classify it
    pub fn attempt(&self, order_id: &OrderId) -> PaymentAttempt {
        let attempt = self.store.increment(order_id);
        let decision = if !self.faults.should_fail(order_id, attempt) {
            RetryDecision::Success
        } else if attempt <= self.max_attempts {
            RetryDecision::RetryableFailure
        } else {
            RetryDecision::PermanentFailure
        };

        PaymentAttempt { attempt, decision }
    }
}

/// Exponential delay applied to re-dispatched retries.
///
/// A zero base disables the delay entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryBackoff {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl RetryBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        RetryBackoff { base_ms, max_ms }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Delay before retrying after the given failed attempt
    pub fn delay_for(&self, attempt: u32) -> Option<u64> {
        if self.base_ms == 0 {
            return None;
        }

        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self.base_ms.saturating_mul(1u64 << exponent);
        Some(delay.min(self.max_ms))
    }
}
