use order_pipeline_broker::Dispatcher;
use order_pipeline_core::{Amount, EnvelopeId, Message, OrderId, PipelineError, Result};
use rand::Rng;
use tracing::info;

/// Lowest amount drawn for orders submitted without one
pub const MIN_RANDOM_AMOUNT: Amount = Amount::from_cents(10_00);

/// A new order as submitted by a client
#[derive(Debug, Clone, Default)]
pub struct OrderRequest {
    /// Generated as `ORDER-<token>` when absent
    pub order_id: Option<OrderId>,
    /// Drawn at random when absent
    pub amount: Option<Amount>,
}

impl OrderRequest {
    pub fn with_amount(amount: Amount) -> Self {
        OrderRequest {
            order_id: None,
            amount: Some(amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub amount: Amount,
    pub envelope_id: EnvelopeId,
}

/// Uniformly random amount in whole cents between 10.00 and `max`
pub fn random_amount(max: Amount) -> Amount {
    let high = max.cents().max(1);
    let low = MIN_RANDOM_AMOUNT.cents().min(high);
    Amount::from_cents(rand::thread_rng().gen_range(low..=high))
}

/// Submit a new order, dispatching its PlaceOrder message
pub fn submit_order(
    dispatcher: &Dispatcher,
    request: OrderRequest,
    max_amount: Amount,
) -> Result<OrderReceipt> {
    let order_id = request.order_id.unwrap_or_else(OrderId::generate);
    let amount = request.amount.unwrap_or_else(|| random_amount(max_amount));

    if amount > max_amount {
        return Err(PipelineError::invalid(format!(
            "amount {} for order {} exceeds the maximum of {}",
            amount, order_id, max_amount
        )));
    }

    // Zero amounts and blank ids are rejected by the dispatcher
    let envelope_id = dispatcher.dispatch(Message::place_order(order_id.clone(), amount), vec![])?;

    info!(order_id = %order_id, amount = %amount, "Order submitted");

    Ok(OrderReceipt {
        order_id,
        amount,
        envelope_id,
    })
}
