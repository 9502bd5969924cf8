use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use edutravel::workflows::eligibility::{
    eligibility_router, AcademicRepository, EligibilityService, EligibilityStore, ProgramCatalog,
};
use edutravel::workflows::payments::{
    payment_router, NotificationPublisher, OrderRepository, PaymentGateway,
    PaymentReconciliationService,
};
use serde_json::json;
use std::sync::Arc;

/// Both workflow routers plus the operational endpoints.
pub(crate) fn with_application_routes<A, C, S, R, G, N>(
    eligibility: Arc<EligibilityService<A, C, S>>,
    payments: Arc<PaymentReconciliationService<R, G, N>>,
) -> Router
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
    R: OrderRepository + 'static,
    G: PaymentGateway + 'static,
    N: NotificationPublisher + 'static,
{
    eligibility_router(eligibility)
        .merge(payment_router(payments))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };
    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
