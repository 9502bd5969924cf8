use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::identity::{Caller, UserId};
use crate::workflows::payments::domain::{Order, OrderId, OrderKind, OrderStatus, PaymentStatus};
use crate::workflows::payments::gateway::{
    GatewayAuthorization, GatewayError, GatewayVerification, InitializeTransaction,
    PaymentGateway,
};
use crate::workflows::payments::repository::{
    CommitOutcome, NotificationError, NotificationKind, NotificationPublisher, OrderRepository,
    RepositoryError,
};
use crate::workflows::payments::service::{PaymentReconciliationService, PaymentSettings};
use crate::workflows::payments::signature;

pub(super) const WEBHOOK_SECRET: &str = "sk_test_webhook_secret";
pub(super) const REFERENCE: &str = "ref-50000";

pub(super) fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 14, 30, 0).unwrap()
}

pub(super) fn owner() -> Caller {
    Caller::user("user-ama")
}

pub(super) fn stranger() -> Caller {
    Caller::user("user-kofi")
}

pub(super) fn admin() -> Caller {
    Caller::admin("admin-1")
}

/// GHS 500.00, i.e. 50000 pesewas, with checkout `REFERENCE` opened.
pub(super) fn visa_order() -> Order {
    checked_out(Order::pending(
        OrderId::new("ord-visa-1"),
        OrderKind::Visa,
        UserId::new("user-ama"),
        dec!(500.00),
        "GHS",
        created_at(),
    ))
}

/// GHS 12.00, i.e. 1200 pesewas, with checkout `REFERENCE` opened.
pub(super) fn consultation_order() -> Order {
    checked_out(Order::pending(
        OrderId::new("ord-consult-1"),
        OrderKind::Consultation,
        UserId::new("user-ama"),
        dec!(12.00),
        "GHS",
        created_at(),
    ))
}

fn checked_out(mut order: Order) -> Order {
    order.payment_reference = Some(REFERENCE.to_string());
    order
}

pub(super) fn paid(mut order: Order) -> Order {
    order.payment_status = PaymentStatus::Paid;
    order.status = OrderStatus::Confirmed;
    order.payment_reference = Some(REFERENCE.to_string());
    order.confirmed_at = Some(created_at());
    order
}

pub(super) fn success(amount_minor_units: i64) -> GatewayVerification {
    GatewayVerification {
        success: true,
        status: "success".to_string(),
        amount_minor_units,
        currency: Some("GHS".to_string()),
        order_id: None,
    }
}

/// Successful verification whose checkout metadata names `order_id`.
pub(super) fn success_for(amount_minor_units: i64, order_id: &str) -> GatewayVerification {
    GatewayVerification {
        order_id: Some(OrderId::new(order_id)),
        ..success(amount_minor_units)
    }
}

#[derive(Default)]
pub(super) struct MemoryOrders {
    orders: Mutex<HashMap<OrderId, Order>>,
    writes: AtomicUsize,
}

impl MemoryOrders {
    pub(super) fn with_orders(orders: Vec<Order>) -> Self {
        let repository = Self::default();
        {
            let mut guard = repository.orders.lock().expect("orders mutex poisoned");
            for order in orders {
                guard.insert(order.id.clone(), order);
            }
        }
        repository
    }

    pub(super) fn get(&self, id: &str) -> Order {
        let guard = self.orders.lock().expect("orders mutex poisoned");
        guard
            .get(&OrderId::new(id))
            .cloned()
            .expect("order exists")
    }

    pub(super) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl OrderRepository for MemoryOrders {
    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let guard = self.orders.lock().expect("orders mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, RepositoryError> {
        let guard = self.orders.lock().expect("orders mutex poisoned");
        Ok(guard
            .values()
            .find(|order| order.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    fn insert(&self, order: Order) -> Result<Order, RepositoryError> {
        let mut guard = self.orders.lock().expect("orders mutex poisoned");
        if guard.contains_key(&order.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(order.id.clone(), order.clone());
        self.record_write();
        Ok(order)
    }

    fn attach_reference(&self, id: &OrderId, reference: &str) -> Result<Order, RepositoryError> {
        let mut guard = self.orders.lock().expect("orders mutex poisoned");
        let order = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !order.is_open() {
            return Err(RepositoryError::Conflict);
        }
        order.payment_reference = Some(reference.to_string());
        self.record_write();
        Ok(order.clone())
    }

    fn commit_payment(
        &self,
        id: &OrderId,
        reference: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, RepositoryError> {
        let mut guard = self.orders.lock().expect("orders mutex poisoned");
        let settled_elsewhere = guard.values().any(|other| {
            &other.id != id
                && other.is_paid()
                && other.payment_reference.as_deref() == Some(reference)
        });
        let order = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if order.is_paid() {
            return Ok(CommitOutcome::AlreadyPaid(order.clone()));
        }
        if order.status != OrderStatus::Pending || settled_elsewhere {
            return Err(RepositoryError::Conflict);
        }

        order.payment_status = PaymentStatus::Paid;
        order.status = OrderStatus::Confirmed;
        order.confirmed_at = Some(confirmed_at);
        order.payment_reference = Some(reference.to_string());
        self.record_write();
        Ok(CommitOutcome::Committed(order.clone()))
    }

    fn cancel(&self, id: &OrderId) -> Result<Order, RepositoryError> {
        let mut guard = self.orders.lock().expect("orders mutex poisoned");
        let order = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !order.is_open() {
            return Err(RepositoryError::Conflict);
        }
        order.status = OrderStatus::Cancelled;
        self.record_write();
        Ok(order.clone())
    }
}

/// Gateway double that counts calls and replays a scripted response.
pub(super) struct CountingGateway {
    verification: Result<GatewayVerification, GatewayError>,
    authorization: Result<GatewayAuthorization, GatewayError>,
    verify_calls: AtomicUsize,
    initialize_calls: AtomicUsize,
    pub(super) last_initialize: Mutex<Option<InitializeTransaction>>,
}

impl CountingGateway {
    pub(super) fn verifying(verification: GatewayVerification) -> Self {
        Self::scripted(Ok(verification))
    }

    pub(super) fn failing(error: GatewayError) -> Self {
        Self::scripted(Err(error))
    }

    fn scripted(verification: Result<GatewayVerification, GatewayError>) -> Self {
        Self {
            verification,
            authorization: Ok(GatewayAuthorization {
                authorization_url: "https://checkout.paystack.com/ref-new".to_string(),
                reference: "ref-new".to_string(),
            }),
            verify_calls: AtomicUsize::new(0),
            initialize_calls: AtomicUsize::new(0),
            last_initialize: Mutex::new(None),
        }
    }

    pub(super) fn with_authorization(
        mut self,
        authorization: Result<GatewayAuthorization, GatewayError>,
    ) -> Self {
        self.authorization = authorization;
        self
    }

    pub(super) fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub(super) fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for CountingGateway {
    async fn verify_transaction(
        &self,
        _reference: &str,
    ) -> Result<GatewayVerification, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verification.clone()
    }

    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> Result<GatewayAuthorization, GatewayError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_initialize
            .lock()
            .expect("gateway mutex poisoned") = Some(request);
        self.authorization.clone()
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    pub(super) users: Mutex<Vec<(UserId, NotificationKind, Value)>>,
    pub(super) admins: Mutex<Vec<(String, String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(super) fn user_count(&self) -> usize {
        self.users.lock().expect("notifier mutex poisoned").len()
    }

    pub(super) fn admin_count(&self) -> usize {
        self.admins.lock().expect("notifier mutex poisoned").len()
    }
}

impl NotificationPublisher for RecordingNotifier {
    fn notify_user(
        &self,
        user_id: &UserId,
        kind: NotificationKind,
        payload: Value,
    ) -> Result<(), NotificationError> {
        self.users
            .lock()
            .expect("notifier mutex poisoned")
            .push((user_id.clone(), kind, payload));
        if self.fail {
            return Err(NotificationError::Transport("smtp relay down".to_string()));
        }
        Ok(())
    }

    fn notify_admins(
        &self,
        title: &str,
        message: &str,
        link: &str,
    ) -> Result<(), NotificationError> {
        self.admins.lock().expect("notifier mutex poisoned").push((
            title.to_string(),
            message.to_string(),
            link.to_string(),
        ));
        if self.fail {
            return Err(NotificationError::Transport("smtp relay down".to_string()));
        }
        Ok(())
    }
}

pub(super) type TestService =
    PaymentReconciliationService<MemoryOrders, CountingGateway, RecordingNotifier>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) orders: Arc<MemoryOrders>,
    pub(super) gateway: Arc<CountingGateway>,
    pub(super) notifier: Arc<RecordingNotifier>,
}

pub(super) fn settings() -> PaymentSettings {
    PaymentSettings {
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        currency: "GHS".to_string(),
    }
}

pub(super) fn harness(orders: Vec<Order>, gateway: CountingGateway) -> Harness {
    harness_with(orders, gateway, RecordingNotifier::default())
}

pub(super) fn harness_with(
    orders: Vec<Order>,
    gateway: CountingGateway,
    notifier: RecordingNotifier,
) -> Harness {
    let orders = Arc::new(MemoryOrders::with_orders(orders));
    let gateway = Arc::new(gateway);
    let notifier = Arc::new(notifier);
    let service = Arc::new(PaymentReconciliationService::new(
        orders.clone(),
        gateway.clone(),
        notifier.clone(),
        settings(),
    ));
    Harness {
        service,
        orders,
        gateway,
        notifier,
    }
}

pub(super) fn charge_success(reference: &str, amount: i64, order_id: Option<&str>) -> Vec<u8> {
    let metadata = match order_id {
        Some(order_id) => serde_json::json!({ "orderId": order_id, "orderType": "VISA" }),
        None => serde_json::json!({}),
    };
    serde_json::to_vec(&serde_json::json!({
        "event": "charge.success",
        "data": { "reference": reference, "amount": amount, "metadata": metadata }
    }))
    .expect("payload serializes")
}

pub(super) fn sign(body: &[u8]) -> String {
    signature::sign(WEBHOOK_SECRET.as_bytes(), body).expect("hmac accepts any key")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
