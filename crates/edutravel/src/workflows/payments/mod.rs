//! Order payment reconciliation against the Paystack gateway.
//!
//! A payment is trusted only after the gateway confirms the transaction and the reported
//! amount equals the order amount in minor units. The paid transition happens in exactly one
//! place, `OrderRepository::commit_payment`, and repeated verifications or replayed webhooks
//! for a settled order short-circuit before touching the gateway.

pub mod domain;
pub mod gateway;
pub mod repository;
pub mod router;
pub mod service;
pub mod signature;

#[cfg(test)]
mod tests;

pub use domain::{AmountError, Order, OrderId, OrderKind, OrderStatus, PaymentStatus};
pub use gateway::{
    GatewayAuthorization, GatewayError, GatewayVerification, InitializeTransaction,
    PaymentGateway, PaystackGateway, TransactionMetadata,
};
pub use repository::{
    CommitOutcome, NotificationError, NotificationKind, NotificationPublisher, OrderRepository,
    RepositoryError,
};
pub use router::payment_router;
pub use service::{
    InitializePayment, NewOrder, PaymentReconciliationService, PaymentServiceError,
    PaymentSettings, VerificationOutcome, VerifyPayment, WebhookOutcome,
};
pub use signature::{SignatureError, SIGNATURE_HEADER};
