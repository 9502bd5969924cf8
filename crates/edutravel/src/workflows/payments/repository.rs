use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Order, OrderId};
use crate::identity::UserId;
pub use crate::storage::RepositoryError;

/// Result of the conditional paid transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This call moved the order from unpaid to paid.
    Committed(Order),
    /// Another caller already settled the order; nothing was written.
    AlreadyPaid(Order),
}

/// Order storage. Implementations must make `commit_payment` and `cancel` atomic
/// check-and-set operations per order.
pub trait OrderRepository: Send + Sync {
    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, RepositoryError>;

    fn insert(&self, order: Order) -> Result<Order, RepositoryError>;

    /// Store the latest checkout reference on an open order. `Conflict` once the order is
    /// closed. Earlier checkouts stay payable; the gateway echoes the order id they were
    /// opened for.
    fn attach_reference(&self, id: &OrderId, reference: &str) -> Result<Order, RepositoryError>;

    /// The single unpaid to paid transition: sets `PAID`, `CONFIRMED`, the confirmation time
    /// and the settled reference.
    ///
    /// A reference settles at most one order. `Conflict` when another order was already paid
    /// with `reference`, or when the order is cancelled.
    fn commit_payment(
        &self,
        id: &OrderId,
        reference: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, RepositoryError>;

    /// Pending and unpaid to cancelled. `Conflict` otherwise.
    fn cancel(&self, id: &OrderId) -> Result<Order, RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentConfirmed,
    OrderCancelled,
}

/// Outbound notification hooks (in-app inbox, e-mail). Fire-and-forget from the
/// service's point of view.
pub trait NotificationPublisher: Send + Sync {
    fn notify_user(
        &self,
        user_id: &UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError>;

    fn notify_admins(&self, title: &str, message: &str, link: &str)
        -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
