use super::common::*;
use crate::error::ErrorKind;
use crate::workflows::payments::domain::{OrderStatus, PaymentStatus};
use crate::workflows::payments::service::{
    PaymentReconciliationService, PaymentServiceError, PaymentSettings, VerificationOutcome,
    WebhookOutcome,
};
use std::sync::Arc;

#[tokio::test]
async fn signed_charge_success_confirms_order() {
    let h = harness(vec![visa_order()], CountingGateway::verifying(success(50_000)));
    let body = charge_success(REFERENCE, 50_000, Some("ord-visa-1"));

    let outcome = h
        .service
        .handle_webhook(&body, Some(sign(&body).as_str()))
        .await
        .expect("webhook processed");

    assert!(matches!(
        outcome,
        WebhookOutcome::Processed(VerificationOutcome::Confirmed(_))
    ));
    let stored = h.orders.get("ord-visa-1");
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(h.notifier.user_count(), 1);
    assert_eq!(h.notifier.admin_count(), 1);
}

#[tokio::test]
async fn invalid_signature_is_unauthorized_without_writes() {
    let h = harness(vec![visa_order()], CountingGateway::verifying(success(50_000)));
    let body = charge_success(REFERENCE, 50_000, Some("ord-visa-1"));
    let forged = charge_success(REFERENCE, 50_000, Some("ord-other"));

    let err = h
        .service
        .handle_webhook(&body, Some(sign(&forged).as_str()))
        .await
        .expect_err("signature covers another body");

    assert!(matches!(err, PaymentServiceError::InvalidSignature));
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(h.orders.write_count(), 0);
    assert_eq!(h.gateway.verify_calls(), 0);
    assert!(!h.orders.get("ord-visa-1").is_paid());
}

#[tokio::test]
async fn missing_signature_is_unauthorized() {
    let h = harness(vec![visa_order()], CountingGateway::verifying(success(50_000)));
    let body = charge_success(REFERENCE, 50_000, Some("ord-visa-1"));

    let err = h
        .service
        .handle_webhook(&body, None)
        .await
        .expect_err("no signature");

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(h.orders.write_count(), 0);
}

#[tokio::test]
async fn webhooks_are_refused_without_a_configured_secret() {
    let orders = Arc::new(MemoryOrders::with_orders(vec![visa_order()]));
    let gateway = Arc::new(CountingGateway::verifying(success(50_000)));
    let service = PaymentReconciliationService::new(
        orders.clone(),
        gateway.clone(),
        Arc::new(RecordingNotifier::default()),
        PaymentSettings::default(),
    );
    let body = charge_success(REFERENCE, 50_000, Some("ord-visa-1"));

    let err = service
        .handle_webhook(&body, Some(sign(&body).as_str()))
        .await
        .expect_err("no secret configured");

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(gateway.verify_calls(), 0);
    assert_eq!(orders.write_count(), 0);
}

#[tokio::test]
async fn replayed_webhook_does_not_reprocess() {
    let h = harness(vec![visa_order()], CountingGateway::verifying(success(50_000)));
    let body = charge_success(REFERENCE, 50_000, Some("ord-visa-1"));
    let signature = sign(&body);

    h.service
        .handle_webhook(&body, Some(signature.as_str()))
        .await
        .expect("first delivery");
    let outcome = h
        .service
        .handle_webhook(&body, Some(signature.as_str()))
        .await
        .expect("redelivery");

    assert!(matches!(
        outcome,
        WebhookOutcome::Processed(VerificationOutcome::AlreadyPaid(_))
    ));
    assert_eq!(h.gateway.verify_calls(), 1);
    assert_eq!(h.notifier.user_count(), 1);
}

#[tokio::test]
async fn other_events_are_acknowledged_and_ignored() {
    let h = harness(vec![visa_order()], CountingGateway::verifying(success(50_000)));
    let body = serde_json::to_vec(&serde_json::json!({
        "event": "transfer.success",
        "data": { "reference": "trf-1" }
    }))
    .unwrap();

    let outcome = h
        .service
        .handle_webhook(&body, Some(sign(&body).as_str()))
        .await
        .expect("acknowledged");

    assert_eq!(
        outcome,
        WebhookOutcome::Ignored {
            event: "transfer.success".to_string()
        }
    );
    assert_eq!(h.gateway.verify_calls(), 0);
    assert_eq!(h.orders.write_count(), 0);
}

#[tokio::test]
async fn order_is_resolved_by_reference_without_metadata() {
    let mut order = visa_order();
    order.payment_reference = Some(REFERENCE.to_string());
    let h = harness(vec![order], CountingGateway::verifying(success(50_000)));
    let body = charge_success(REFERENCE, 50_000, None);

    h.service
        .handle_webhook(&body, Some(sign(&body).as_str()))
        .await
        .expect("resolved by reference");

    assert!(h.orders.get("ord-visa-1").is_paid());
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let h = harness(vec![visa_order()], CountingGateway::verifying(success(50_000)));
    let body = charge_success("ref-unknown", 50_000, None);

    let err = h
        .service
        .handle_webhook(&body, Some(sign(&body).as_str()))
        .await
        .expect_err("no order carries the reference");

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.gateway.verify_calls(), 0);
}

#[tokio::test]
async fn signed_but_malformed_payload_is_a_validation_error() {
    let h = harness(vec![visa_order()], CountingGateway::verifying(success(50_000)));
    let body = br#"{"event":"charge.success"}"#.to_vec();

    let err = h
        .service
        .handle_webhook(&body, Some(sign(&body).as_str()))
        .await
        .expect_err("data missing");

    assert_eq!(err.kind(), ErrorKind::ValidationError);
}

#[tokio::test]
async fn webhook_amount_is_rechecked_against_the_gateway() {
    let h = harness(
        vec![consultation_order()],
        CountingGateway::verifying(success(1_000)),
    );
    // The payload claims the full amount; the gateway is the source of truth.
    let body = charge_success(REFERENCE, 1_200, Some("ord-consult-1"));

    let err = h
        .service
        .handle_webhook(&body, Some(sign(&body).as_str()))
        .await
        .expect_err("gateway reports a short payment");

    assert!(matches!(
        err,
        PaymentServiceError::AmountMismatch {
            expected: 1_200,
            actual: 1_000
        }
    ));
    assert!(!h.orders.get("ord-consult-1").is_paid());
}
