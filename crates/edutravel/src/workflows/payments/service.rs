use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::domain::{AmountError, Order, OrderId, OrderKind, OrderStatus};
use super::gateway::{
    GatewayAuthorization, InitializeTransaction, PaymentGateway, TransactionMetadata,
};
use super::repository::{
    CommitOutcome, NotificationKind, NotificationPublisher, OrderRepository, RepositoryError,
};
use super::signature;
use crate::config::PaymentConfig;
use crate::error::ErrorKind;
use crate::identity::Caller;

const CHARGE_SUCCESS: &str = "charge.success";

/// Settings the reconciliation service needs from the payment configuration.
#[derive(Clone, Default)]
pub struct PaymentSettings {
    /// Shared secret used to sign webhooks; webhooks are refused when absent.
    pub webhook_secret: Option<String>,
    pub currency: String,
}

impl PaymentSettings {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            webhook_secret: config.secret_key.clone(),
            currency: config.currency.clone(),
        }
    }
}

/// Request to place a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct NewOrder {
    pub kind: OrderKind,
    pub amount: Decimal,
}

/// Owner-initiated verification after the gateway redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct VerifyPayment {
    pub reference: String,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct InitializePayment {
    pub order_id: OrderId,
    pub email: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    metadata: Option<WebhookMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookMetadata {
    #[serde(default)]
    order_id: Option<OrderId>,
    #[serde(default)]
    order_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// This call settled the order.
    Confirmed(Order),
    /// The order was already paid; no gateway call and no write happened here.
    AlreadyPaid(Order),
}

impl VerificationOutcome {
    pub fn order(&self) -> &Order {
        match self {
            VerificationOutcome::Confirmed(order) | VerificationOutcome::AlreadyPaid(order) => order,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VerificationOutcome::Confirmed(_) => "confirmed",
            VerificationOutcome::AlreadyPaid(_) => "already_paid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed(VerificationOutcome),
    Ignored { event: String },
}

/// Verifies gateway payments against stored orders and settles each order at most once.
pub struct PaymentReconciliationService<R, G, N> {
    orders: Arc<R>,
    gateway: Arc<G>,
    notifier: Arc<N>,
    settings: PaymentSettings,
}

static ORDER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_order_id() -> OrderId {
    let id = ORDER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    OrderId(format!("ord-{id:06}"))
}

impl<R, G, N> PaymentReconciliationService<R, G, N>
where
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        orders: Arc<R>,
        gateway: Arc<G>,
        notifier: Arc<N>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            orders,
            gateway,
            notifier,
            settings,
        }
    }

    pub fn place_order(
        &self,
        caller: &Caller,
        request: NewOrder,
    ) -> Result<Order, PaymentServiceError> {
        let order = Order::pending(
            next_order_id(),
            request.kind,
            caller.user_id.clone(),
            request.amount,
            self.settings.currency.clone(),
            Utc::now(),
        );
        order.expected_minor_units()?;

        let order = self.orders.insert(order)?;
        info!(order_id = %order.id, owner = %order.owner, kind = order.kind.label(), "order placed");
        Ok(order)
    }

    pub fn order(
        &self,
        caller: &Caller,
        order_id: &OrderId,
    ) -> Result<Order, PaymentServiceError> {
        let order = self.load(order_id)?;
        if !caller.may_act_for(&order.owner) {
            return Err(PaymentServiceError::Forbidden);
        }
        Ok(order)
    }

    /// Open a gateway checkout for the caller's own order and remember its reference.
    pub async fn initialize(
        &self,
        caller: &Caller,
        request: InitializePayment,
    ) -> Result<GatewayAuthorization, PaymentServiceError> {
        let InitializePayment {
            order_id,
            email,
            callback_url,
        } = request;

        let email = email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(PaymentServiceError::Validation(
                "a valid email address is required".to_string(),
            ));
        }

        let order = self.load(&order_id)?;
        if caller.user_id != order.owner {
            return Err(PaymentServiceError::Forbidden);
        }
        if !order.is_open() {
            return Err(PaymentServiceError::OrderClosed {
                status: order.status,
            });
        }

        let amount_minor_units = order.expected_minor_units()?;
        let transaction = InitializeTransaction {
            email,
            amount_minor_units,
            currency: order.currency.clone(),
            callback_url,
            metadata: TransactionMetadata {
                order_id: order.id.clone(),
                order_type: order.kind,
            },
        };

        let authorization = self
            .gateway
            .initialize_transaction(transaction)
            .await
            .map_err(|err| {
                warn!(order_id = %order.id, error = %err, "gateway initialization failed");
                PaymentServiceError::GatewayUnavailable
            })?;
        validate_reference(&authorization.reference)?;

        self.orders
            .attach_reference(&order.id, &authorization.reference)?;
        info!(order_id = %order.id, reference = %authorization.reference, "payment initialized");

        Ok(authorization)
    }

    /// Owner or administrator verification of a reference returned by the gateway redirect.
    pub async fn verify_for_owner(
        &self,
        caller: &Caller,
        request: VerifyPayment,
    ) -> Result<VerificationOutcome, PaymentServiceError> {
        validate_reference(&request.reference)?;

        let order = self.load(&request.order_id)?;
        if !caller.may_act_for(&order.owner) {
            warn!(order_id = %order.id, caller = %caller.user_id, "verification by non-owner refused");
            return Err(PaymentServiceError::Forbidden);
        }

        self.settle(order, &request.reference).await
    }

    /// Signed gateway callback. The signature is checked before the body is even parsed.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, PaymentServiceError> {
        let Some(secret) = self.settings.webhook_secret.as_deref() else {
            error!("webhook received but no gateway secret is configured");
            return Err(PaymentServiceError::InvalidSignature);
        };

        let signature = signature.ok_or(PaymentServiceError::InvalidSignature)?;
        if let Err(reason) = signature::verify(secret.as_bytes(), raw_body, signature) {
            warn!(%reason, "webhook signature rejected");
            return Err(PaymentServiceError::InvalidSignature);
        }

        let event: WebhookEvent = serde_json::from_slice(raw_body).map_err(|err| {
            PaymentServiceError::Validation(format!("malformed webhook payload: {err}"))
        })?;
        if event.event != CHARGE_SUCCESS {
            info!(event = %event.event, "ignoring webhook event");
            return Ok(WebhookOutcome::Ignored { event: event.event });
        }

        let WebhookData {
            reference,
            amount,
            metadata,
        } = serde_json::from_value(event.data).map_err(|err| {
            PaymentServiceError::Validation(format!("malformed charge payload: {err}"))
        })?;
        validate_reference(&reference)?;
        let (order_id, order_type) = metadata
            .map(|metadata| (metadata.order_id, metadata.order_type))
            .unwrap_or((None, None));
        debug!(%reference, ?amount, ?order_type, "charge.success webhook accepted");

        let order = match order_id {
            Some(order_id) => self.load(&order_id)?,
            None => self
                .orders
                .find_by_reference(&reference)?
                .ok_or_else(|| PaymentServiceError::UnknownReference(reference.clone()))?,
        };

        self.settle(order, &reference)
            .await
            .map(WebhookOutcome::Processed)
    }

    /// Cancel an open order. Owners cancel their own orders; administrators any order.
    pub fn cancel(
        &self,
        caller: &Caller,
        order_id: &OrderId,
    ) -> Result<Order, PaymentServiceError> {
        let order = self.load(order_id)?;
        if !caller.may_act_for(&order.owner) {
            return Err(PaymentServiceError::Forbidden);
        }
        if !order.is_open() {
            return Err(PaymentServiceError::OrderClosed {
                status: order.status,
            });
        }

        let order = self.orders.cancel(&order.id)?;
        info!(order_id = %order.id, cancelled_by = %caller.user_id, "order cancelled");

        let payload = json!({ "orderId": order.id, "kind": order.kind });
        if let Err(err) = self
            .notifier
            .notify_user(&order.owner, NotificationKind::OrderCancelled, payload)
        {
            warn!(order_id = %order.id, error = %err, "failed to notify user of cancellation");
        }

        Ok(order)
    }

    async fn settle(
        &self,
        order: Order,
        reference: &str,
    ) -> Result<VerificationOutcome, PaymentServiceError> {
        if order.is_paid() {
            debug!(order_id = %order.id, "order already paid; skipping gateway verification");
            return Ok(VerificationOutcome::AlreadyPaid(order));
        }
        if order.status != OrderStatus::Pending {
            return Err(PaymentServiceError::OrderClosed {
                status: order.status,
            });
        }

        let expected = order.expected_minor_units()?;
        let verification = match self.gateway.verify_transaction(reference).await {
            Ok(verification) => verification,
            Err(err) => {
                warn!(order_id = %order.id, %reference, error = %err, "gateway verification failed");
                return Err(PaymentServiceError::VerificationFailed);
            }
        };
        if !verification.is_successful() {
            warn!(
                order_id = %order.id,
                %reference,
                gateway_status = %verification.status,
                "gateway reports unsuccessful transaction"
            );
            return Err(PaymentServiceError::VerificationFailed);
        }

        // The transaction must have been opened for this order. Without an echoed order id
        // only the order's own stored checkout reference binds it.
        let bound = match verification.order_id.as_ref() {
            Some(paid_for) => paid_for == &order.id,
            None => order.payment_reference.as_deref() == Some(reference),
        };
        if !bound {
            warn!(
                order_id = %order.id,
                %reference,
                paid_for = ?verification.order_id,
                "reference does not belong to order"
            );
            return Err(PaymentServiceError::ReferenceMismatch);
        }

        if verification.amount_minor_units != expected {
            warn!(
                order_id = %order.id,
                %reference,
                expected,
                actual = verification.amount_minor_units,
                "payment amount mismatch"
            );
            return Err(PaymentServiceError::AmountMismatch {
                expected,
                actual: verification.amount_minor_units,
            });
        }
        if let Some(currency) = verification.currency.as_deref() {
            if !currency.eq_ignore_ascii_case(&order.currency) {
                warn!(order_id = %order.id, %reference, currency, "payment currency mismatch");
                return Err(PaymentServiceError::CurrencyMismatch {
                    expected: order.currency.clone(),
                    actual: currency.to_string(),
                });
            }
        }

        match self.orders.commit_payment(&order.id, reference, Utc::now())? {
            CommitOutcome::Committed(order) => {
                info!(order_id = %order.id, %reference, amount = %order.amount, "payment confirmed");
                self.notify_confirmed(&order);
                Ok(VerificationOutcome::Confirmed(order))
            }
            CommitOutcome::AlreadyPaid(order) => {
                info!(order_id = %order.id, "order settled concurrently");
                Ok(VerificationOutcome::AlreadyPaid(order))
            }
        }
    }

    fn notify_confirmed(&self, order: &Order) {
        let payload = json!({
            "orderId": order.id,
            "kind": order.kind,
            "amount": order.amount,
            "currency": order.currency,
            "reference": order.payment_reference,
        });
        if let Err(err) = self
            .notifier
            .notify_user(&order.owner, NotificationKind::PaymentConfirmed, payload)
        {
            warn!(order_id = %order.id, error = %err, "failed to notify user of payment");
        }

        let title = format!("Payment received for {}", order.kind.label());
        let message = format!(
            "{} paid {} {} for order {}",
            order.owner, order.currency, order.amount, order.id
        );
        let link = format!("/admin/orders/{}", order.id);
        if let Err(err) = self.notifier.notify_admins(&title, &message, &link) {
            warn!(order_id = %order.id, error = %err, "failed to notify administrators of payment");
        }
    }

    fn load(&self, order_id: &OrderId) -> Result<Order, PaymentServiceError> {
        self.orders
            .fetch(order_id)?
            .ok_or_else(|| PaymentServiceError::OrderNotFound(order_id.clone()))
    }
}

/// References travel in a URL path segment, so only a conservative alphabet is accepted.
fn validate_reference(reference: &str) -> Result<(), PaymentServiceError> {
    let valid = !reference.is_empty()
        && reference.len() <= 100
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '='));
    if valid {
        Ok(())
    } else {
        Err(PaymentServiceError::Validation(
            "payment reference is malformed".to_string(),
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentServiceError {
    #[error("order not found")]
    OrderNotFound(OrderId),
    #[error("no order carries this payment reference")]
    UnknownReference(String),
    #[error("caller may not act on this order")]
    Forbidden,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("order is {} and can no longer change", .status.label())]
    OrderClosed { status: OrderStatus },
    #[error("payment reference does not belong to this order")]
    ReferenceMismatch,
    #[error("verification failed")]
    VerificationFailed,
    #[error("payment gateway unavailable")]
    GatewayUnavailable,
    #[error("amount mismatch: expected {expected} minor units, gateway reported {actual}")]
    AmountMismatch { expected: i64, actual: i64 },
    #[error("currency mismatch: expected {expected}, gateway reported {actual}")]
    CurrencyMismatch { expected: String, actual: String },
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PaymentServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentServiceError::OrderNotFound(_)
            | PaymentServiceError::UnknownReference(_)
            | PaymentServiceError::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            PaymentServiceError::Forbidden => ErrorKind::Forbidden,
            PaymentServiceError::InvalidSignature => ErrorKind::Unauthorized,
            PaymentServiceError::Validation(_) | PaymentServiceError::Amount(_) => {
                ErrorKind::ValidationError
            }
            PaymentServiceError::OrderClosed { .. }
            | PaymentServiceError::ReferenceMismatch
            | PaymentServiceError::AmountMismatch { .. }
            | PaymentServiceError::CurrencyMismatch { .. }
            | PaymentServiceError::Repository(RepositoryError::Conflict) => ErrorKind::ConflictError,
            PaymentServiceError::VerificationFailed | PaymentServiceError::GatewayUnavailable => {
                ErrorKind::UpstreamError
            }
            PaymentServiceError::Repository(RepositoryError::Unavailable(_)) => ErrorKind::Internal,
        }
    }

    /// Message safe to return to the caller. Amount detail is reserved for administrators.
    pub fn public_message(&self, caller_is_admin: bool) -> String {
        match self {
            PaymentServiceError::AmountMismatch { .. }
            | PaymentServiceError::CurrencyMismatch { .. }
                if !caller_is_admin =>
            {
                "payment does not match the order amount".to_string()
            }
            PaymentServiceError::Repository(RepositoryError::Unavailable(_)) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}
