use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identity::UserId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
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

/// Bookable services. Every kind shares the same payment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Flight,
    Hotel,
    Package,
    Consultation,
    Visa,
    Itinerary,
}

impl OrderKind {
    pub const fn label(self) -> &'static str {
        match self {
            OrderKind::Flight => "flight booking",
            OrderKind::Hotel => "hotel booking",
            OrderKind::Package => "package booking",
            OrderKind::Consultation => "consultation",
            OrderKind::Visa => "visa application",
            OrderKind::Itinerary => "itinerary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// A booking awaiting or holding payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub kind: OrderKind,
    pub owner: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub payment_reference: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn pending(
        id: OrderId,
        kind: OrderKind,
        owner: UserId,
        amount: Decimal,
        currency: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            owner,
            amount,
            currency: currency.into(),
            payment_status: PaymentStatus::Unpaid,
            status: OrderStatus::Pending,
            payment_reference: None,
            confirmed_at: None,
            created_at,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Pending and unpaid: the only state from which an order may be paid or cancelled.
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Pending && self.payment_status == PaymentStatus::Unpaid
    }

    /// Amount in the gateway's minor unit (pesewas for GHS).
    pub fn expected_minor_units(&self) -> Result<i64, AmountError> {
        if self.amount <= Decimal::ZERO {
            return Err(AmountError::NotPositive(self.amount));
        }

        let minor = self
            .amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(AmountError::OutOfRange(self.amount))?;
        if !minor.fract().is_zero() {
            return Err(AmountError::SubMinorUnit(self.amount));
        }

        minor.to_i64().ok_or(AmountError::OutOfRange(self.amount))
    }
}

/// Order amounts that cannot be expressed in whole minor units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("order amount {0} must be positive")]
    NotPositive(Decimal),
    #[error("order amount {0} has precision below the minor unit")]
    SubMinorUnit(Decimal),
    #[error("order amount {0} is out of range")]
    OutOfRange(Decimal),
}
