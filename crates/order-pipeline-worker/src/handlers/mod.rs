//! Handlers for the three order messages.
//!
//! PlaceOrder schedules payment after a delay, ProcessPayment runs the
//! retry policy and SendConfirmation is terminal.

mod place_order;
mod process_payment;
mod send_confirmation;

pub use place_order::{PlaceOrderHandler, DEFAULT_PAYMENT_DELAY_MS};
pub use process_payment::ProcessPaymentHandler;
pub use send_confirmation::{SendConfirmationHandler, DEFAULT_CONFIRMATION_WORK_MS};

use order_pipeline_core::{Envelope, MessageKind, PipelineError};

/// Error for an envelope routed to the wrong handler
fn unexpected_kind(expected: MessageKind, envelope: &Envelope) -> PipelineError {
    PipelineError::invalid(format!(
        "{} handler received a {} message",
        expected,
        envelope.kind()
    ))
}
