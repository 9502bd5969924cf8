use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::domain::OrderId;
use super::gateway::PaymentGateway;
use super::repository::{NotificationPublisher, OrderRepository};
use super::service::{
    InitializePayment, NewOrder, PaymentReconciliationService, PaymentServiceError,
    VerifyPayment, WebhookOutcome,
};
use super::signature::SIGNATURE_HEADER;
use crate::error::{error_response, json_rejection, ErrorKind};
use crate::identity::Caller;

type SharedService<R, G, N> = Arc<PaymentReconciliationService<R, G, N>>;

/// Router exposing order placement, checkout, verification and the gateway webhook.
pub fn payment_router<R, G, N>(service: SharedService<R, G, N>) -> Router
where
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/orders", post(place_order_handler::<R, G, N>))
        .route("/api/v1/orders/:order_id", get(order_handler::<R, G, N>))
        .route(
            "/api/v1/orders/:order_id/cancel",
            post(cancel_handler::<R, G, N>),
        )
        .route(
            "/api/v1/payments/initialize",
            post(initialize_handler::<R, G, N>),
        )
        .route("/api/v1/payments/verify", post(verify_handler::<R, G, N>))
        .route("/api/v1/payments/webhook", post(webhook_handler::<R, G, N>))
        .with_state(service)
}

pub(crate) async fn place_order_handler<R, G, N>(
    State(service): State<SharedService<R, G, N>>,
    headers: HeaderMap,
    body: Result<Json<NewOrder>, JsonRejection>,
) -> Response
where
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    match service.place_order(&caller, request) {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(err) => service_error(err, &caller),
    }
}

pub(crate) async fn order_handler<R, G, N>(
    State(service): State<SharedService<R, G, N>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };

    match service.order(&caller, &OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(err) => service_error(err, &caller),
    }
}

pub(crate) async fn cancel_handler<R, G, N>(
    State(service): State<SharedService<R, G, N>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };

    match service.cancel(&caller, &OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(err) => service_error(err, &caller),
    }
}

pub(crate) async fn initialize_handler<R, G, N>(
    State(service): State<SharedService<R, G, N>>,
    headers: HeaderMap,
    body: Result<Json<InitializePayment>, JsonRejection>,
) -> Response
where
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    match service.initialize(&caller, request).await {
        Ok(authorization) => (StatusCode::OK, Json(authorization)).into_response(),
        Err(err) => service_error(err, &caller),
    }
}

pub(crate) async fn verify_handler<R, G, N>(
    State(service): State<SharedService<R, G, N>>,
    headers: HeaderMap,
    body: Result<Json<VerifyPayment>, JsonRejection>,
) -> Response
where
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    match service.verify_for_owner(&caller, request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "status": outcome.label(), "order": outcome.order() })),
        )
            .into_response(),
        Err(err) => service_error(err, &caller),
    }
}

/// Gateway callback. Takes the raw body so the signature covers the exact bytes received.
pub(crate) async fn webhook_handler<R, G, N>(
    State(service): State<SharedService<R, G, N>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match service.handle_webhook(&body, signature).await {
        Ok(WebhookOutcome::Processed(outcome)) => (
            StatusCode::OK,
            Json(json!({ "received": true, "status": outcome.label() })),
        )
            .into_response(),
        Ok(WebhookOutcome::Ignored { event }) => (
            StatusCode::OK,
            Json(json!({ "received": true, "ignored": event })),
        )
            .into_response(),
        Err(err) => {
            let kind = err.kind();
            if kind == ErrorKind::Internal {
                error!(error = %err, "webhook processing failed");
            }
            error_response(kind, err.public_message(false))
        }
    }
}

fn service_error(err: PaymentServiceError, caller: &Caller) -> Response {
    let kind = err.kind();
    if kind == ErrorKind::Internal {
        error!(error = %err, "payment request failed");
    }
    error_response(kind, err.public_message(caller.is_admin()))
}
