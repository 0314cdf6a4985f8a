use crate::{PipelineError, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order identifier, unique per order by caller contract
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub const PREFIX: &'static str = "ORDER-";

    pub fn new(id: impl Into<String>) -> Self {
        OrderId(id.into())
    }

    /// Generate a fresh `ORDER-<token>` identifier
    pub fn generate() -> Self {
        OrderId(format!("{}{}", Self::PREFIX, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        OrderId::new(value)
    }
}

/// Monetary amount with two fractional digits, stored as cents.
///
/// Serialized as its decimal string (`"10.00"`) so no precision is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_cents(cents: u64) -> Self {
        Amount(cents)
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PipelineError::invalid(format!("not a valid amount: {s:?}"));
        let s = s.trim();
        let (units, fraction) = match s.split_once('.') {
            Some((_, "")) => return Err(invalid()),
            Some((units, fraction)) => (units, fraction),
            None => (s, ""),
        };

        if units.is_empty()
            || fraction.len() > 2
            || !units.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let units: u64 = units.parse().map_err(|_| invalid())?;
        let cents = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse::<u64>().map_err(|_| invalid())?,
        };

        units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Kind tag used for handler routing and log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    PlaceOrder,
    ProcessPayment,
    SendConfirmation,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::PlaceOrder => "place_order",
            MessageKind::ProcessPayment => "process_payment",
            MessageKind::SendConfirmation => "send_confirmation",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work item routed through the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    PlaceOrder { order_id: OrderId, amount: Amount },
    ProcessPayment { order_id: OrderId },
    SendConfirmation { order_id: OrderId },
}

impl Message {
    pub fn place_order(order_id: impl Into<OrderId>, amount: Amount) -> Self {
        Message::PlaceOrder {
            order_id: order_id.into(),
            amount,
        }
    }

    pub fn process_payment(order_id: impl Into<OrderId>) -> Self {
        Message::ProcessPayment {
            order_id: order_id.into(),
        }
    }

    pub fn send_confirmation(order_id: impl Into<OrderId>) -> Self {
        Message::SendConfirmation {
            order_id: order_id.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::PlaceOrder { .. } => MessageKind::PlaceOrder,
            Message::ProcessPayment { .. } => MessageKind::ProcessPayment,
            Message::SendConfirmation { .. } => MessageKind::SendConfirmation,
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            Message::PlaceOrder { order_id, .. }
            | Message::ProcessPayment { order_id }
            | Message::SendConfirmation { order_id } => order_id,
        }
    }

    /// Structural check only; business rules live in the handlers.
    pub fn validate(&self) -> Result<()> {
        if self.order_id().as_str().trim().is_empty() {
            return Err(PipelineError::invalid(format!(
                "{} message is missing an order id",
                self.kind()
            )));
        }

        if let Message::PlaceOrder { order_id, amount } = self {
            if !amount.is_positive() {
                return Err(PipelineError::invalid(format!(
                    "order {order_id} must have a positive amount"
                )));
            }
        }

        Ok(())
    }
}
