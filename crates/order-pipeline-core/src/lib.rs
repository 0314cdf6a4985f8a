mod decision;
mod envelope;
mod error;
mod message;

pub use decision::RetryDecision;
pub use envelope::{DelayStamp, Envelope, EnvelopeId, Stamp};
pub use error::{PipelineError, Result};
pub use message::{Amount, Message, MessageKind, OrderId};

/// Upper bound accepted by the submit-order entrypoint (500.00)
pub const MAX_ORDER_AMOUNT: Amount = Amount::from_cents(500_00);
