use crate::{Message, MessageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Unique identifier for an envelope
pub type EnvelopeId = Uuid;

/// Postpones delivery of an envelope by a fixed number of milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelayStamp {
    millis: u64,
}

impl DelayStamp {
    pub fn new(millis: u64) -> Self {
        DelayStamp { millis }
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

/// Delivery metadata attached to an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stamp {
    Delay(DelayStamp),
}

impl Stamp {
    pub fn delay(millis: u64) -> Self {
        Stamp::Delay(DelayStamp::new(millis))
    }
}

/// A message plus its delivery metadata.
///
/// Envelopes are immutable: a retry is a brand-new envelope for the same
/// message. `eligible_at` is fixed at construction from the last
/// [`DelayStamp`], or the construction instant when there is none.
#[derive(Debug, Clone)]
pub struct Envelope {
    id: EnvelopeId,
    message: Message,
    stamps: Vec<Stamp>,
    dispatched_at: DateTime<Utc>,
    eligible_at: Instant,
}

impl Envelope {
    pub fn new(message: Message, stamps: Vec<Stamp>) -> Self {
        Self::at(message, stamps, Instant::now())
    }

    /// Build an envelope as if it was dispatched at `now`.
    pub fn at(message: Message, stamps: Vec<Stamp>, now: Instant) -> Self {
        let delay = last_delay(&stamps)
            .map(|d| d.duration())
            .unwrap_or_default();

        Envelope {
            id: Uuid::new_v4(),
            message,
            stamps,
            dispatched_at: Utc::now(),
            eligible_at: now + delay,
        }
    }

    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn stamps(&self) -> &[Stamp] {
        &self.stamps
    }

    /// The delay that governs eligibility, if any
    pub fn delay(&self) -> Option<DelayStamp> {
        last_delay(&self.stamps)
    }

    pub fn dispatched_at(&self) -> DateTime<Utc> {
        self.dispatched_at
    }

    pub fn eligible_at(&self) -> Instant {
        self.eligible_at
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.eligible_at <= now
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

fn last_delay(stamps: &[Stamp]) -> Option<DelayStamp> {
    stamps.iter().rev().find_map(|stamp| match stamp {
        Stamp::Delay(delay) => Some(*delay),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_without_delay_is_due_immediately() {
        let now = Instant::now();
        let envelope = Envelope::at(Message::process_payment("ORDER-1"), vec![], now);

        assert_eq!(envelope.eligible_at(), now);
        assert!(envelope.is_due(now));
        assert!(envelope.delay().is_none());
        assert_eq!(envelope.kind(), MessageKind::ProcessPayment);
    }

    #[test]
    fn test_delay_stamp_sets_eligibility() {
        let now = Instant::now();
        let envelope = Envelope::at(
            Message::process_payment("ORDER-1"),
            vec![Stamp::delay(5000)],
            now,
        );

        assert_eq!(envelope.eligible_at(), now + Duration::from_millis(5000));
        assert!(!envelope.is_due(now));
        assert!(!envelope.is_due(now + Duration::from_millis(4999)));
        assert!(envelope.is_due(now + Duration::from_millis(5000)));
        assert_eq!(envelope.delay().map(|d| d.millis()), Some(5000));
    }

    #[test]
    fn test_last_delay_stamp_wins() {
        let now = Instant::now();
        let envelope = Envelope::at(
            Message::send_confirmation("ORDER-1"),
            vec![Stamp::delay(100), Stamp::delay(250)],
            now,
        );

        assert_eq!(envelope.stamps().len(), 2);
        assert_eq!(envelope.eligible_at(), now + Duration::from_millis(250));
    }

    #[test]
    fn test_envelopes_get_distinct_ids() {
        let a = Envelope::new(Message::process_payment("ORDER-1"), vec![]);
        let b = Envelope::new(Message::process_payment("ORDER-1"), vec![]);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.message(), b.message());
    }
}
