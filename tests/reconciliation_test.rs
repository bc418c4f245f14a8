mod common;

use common::{gateway_path, harness, payment_json, payment_notification, seed_record};
use ompay_connector::domain::{CanonicalStatus, TransactionKind};
use ompay_connector::services::{NotificationDisposition, PaymentError};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_webhook_resolves_pending_and_notifies_once() {
    let h = harness().await;
    let account_id = Uuid::new_v4();
    let payment_id = Uuid::new_v4();
    let record = seed_record(
        &h,
        account_id,
        payment_id,
        TransactionKind::Authorize,
        payment_json("pay-1", "pending"),
    )
    .await;

    let body = payment_notification("n-1", "pay-1", "authorised");
    let outcome = h.orchestrator.handle_webhook_body(&h.ctx, &body).await.unwrap();

    assert_eq!(outcome.disposition, NotificationDisposition::Applied);
    assert_eq!(outcome.previous_status, Some(CanonicalStatus::Pending));
    assert_eq!(outcome.new_status, Some(CanonicalStatus::Processed));
    assert_eq!(outcome.transaction_id, Some(record.transaction_id));
    assert!(outcome.host_notified);

    let notifications = h.host.notifications();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].success);
    assert_eq!(notifications[0].account_id, account_id);

    let stored = h.ledger.all().await;
    let envelope = stored[0].envelope.as_map();
    assert_eq!(envelope.get("state"), Some(&json!("authorised")));
    assert_eq!(envelope.get("notification_id"), Some(&json!("n-1")));
    assert!(envelope.get("payer").is_some());
    assert_eq!(stored[0].revision, 1);

    let replay = h.orchestrator.handle_webhook_body(&h.ctx, &body).await.unwrap();
    assert_eq!(replay.disposition, NotificationDisposition::Unchanged);
    assert!(!replay.host_notified);
    assert_eq!(h.host.notifications().len(), 1);
}

#[tokio::test]
async fn test_webhook_on_settled_record_does_not_notify() {
    let h = harness().await;
    seed_record(
        &h,
        Uuid::new_v4(),
        Uuid::new_v4(),
        TransactionKind::Authorize,
        payment_json("pay-1", "authorised"),
    )
    .await;

    let body = payment_notification("n-2", "pay-1", "declined");
    let outcome = h.orchestrator.handle_webhook_body(&h.ctx, &body).await.unwrap();

    assert_eq!(outcome.disposition, NotificationDisposition::Applied);
    assert_eq!(outcome.new_status, Some(CanonicalStatus::Error));
    assert!(!outcome.host_notified);
    assert!(h.host.notifications().is_empty());
}

#[tokio::test]
async fn test_webhook_matches_by_reference_id() {
    let h = harness().await;
    let record = seed_record(
        &h,
        Uuid::new_v4(),
        Uuid::new_v4(),
        TransactionKind::Purchase,
        json!({ "id": "pay-5", "reference_id": "ref-5", "state": "pending" }),
    )
    .await;

    let body = payment_notification("n-3", "ref-5", "captured");
    let outcome = h.orchestrator.handle_webhook_body(&h.ctx, &body).await.unwrap();

    assert_eq!(outcome.disposition, NotificationDisposition::Applied);
    assert_eq!(outcome.transaction_id, Some(record.transaction_id));
    assert_eq!(h.host.notifications().len(), 1);
}

#[tokio::test]
async fn test_webhook_for_unknown_transaction_is_a_no_op() {
    let h = harness().await;
    seed_record(
        &h,
        Uuid::new_v4(),
        Uuid::new_v4(),
        TransactionKind::Authorize,
        payment_json("pay-1", "pending"),
    )
    .await;

    let body = payment_notification("n-4", "pay-404", "authorised");
    let outcome = h.orchestrator.handle_webhook_body(&h.ctx, &body).await.unwrap();

    assert_eq!(outcome.disposition, NotificationDisposition::UnknownTransaction);
    assert!(h.host.notifications().is_empty());
    assert_eq!(h.ledger.all().await[0].revision, 0);
}

#[tokio::test]
async fn test_webhook_is_tenant_scoped() {
    let h = harness().await;
    seed_record(
        &h,
        Uuid::new_v4(),
        Uuid::new_v4(),
        TransactionKind::Authorize,
        payment_json("pay-1", "pending"),
    )
    .await;

    let other_tenant = ompay_connector::domain::CallContext::new(Uuid::new_v4());
    let body = payment_notification("n-5", "pay-1", "authorised");
    let outcome = h.orchestrator.handle_webhook_body(&other_tenant, &body).await.unwrap();

    assert_eq!(outcome.disposition, NotificationDisposition::UnknownTransaction);
}

#[tokio::test]
async fn test_webhook_ignores_other_resources() {
    let h = harness().await;
    let body = json!({
        "id": "n-6",
        "resource_type": "payer",
        "resource": { "id": "payer-1" }
    })
    .to_string();

    let outcome = h.orchestrator.handle_webhook_body(&h.ctx, &body).await.unwrap();
    assert_eq!(outcome.disposition, NotificationDisposition::Ignored);

    let no_state = json!({
        "id": "n-7",
        "resource_type": "payment",
        "resource": { "id": "pay-1" }
    })
    .to_string();
    let outcome = h.orchestrator.handle_webhook_body(&h.ctx, &no_state).await.unwrap();
    assert_eq!(outcome.disposition, NotificationDisposition::Ignored);
}

#[tokio::test]
async fn test_webhook_rejects_malformed_bodies() {
    let h = harness().await;

    let err = h.orchestrator.handle_webhook_body(&h.ctx, "{not json").await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidNotification(_)));

    let err = h.orchestrator.handle_webhook_body(&h.ctx, "[1, 2]").await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidNotification(_)));

    let no_id = json!({
        "resource_type": "payment",
        "resource": { "state": "authorised" }
    })
    .to_string();
    let err = h.orchestrator.handle_webhook_body(&h.ctx, &no_id).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidNotification(_)));
}

#[tokio::test]
async fn test_refresh_after_webhook_does_not_notify_again() {
    let mut h = harness().await;
    let payment_id = Uuid::new_v4();
    seed_record(
        &h,
        Uuid::new_v4(),
        payment_id,
        TransactionKind::Authorize,
        payment_json("pay-1", "pending"),
    )
    .await;

    let fetch = h
        .server
        .mock("GET", gateway_path("/payment/pay-1").as_str())
        .expect(0)
        .create_async()
        .await;

    let body = payment_notification("n-8", "pay-1", "authorised");
    h.orchestrator.handle_webhook_body(&h.ctx, &body).await.unwrap();

    let report = h.orchestrator.refresh_pending(&h.ctx, payment_id).await.unwrap();
    fetch.assert_async().await;
    assert_eq!(report.examined, 0);
    assert_eq!(h.host.notifications().len(), 1);
}

#[tokio::test]
async fn test_refresh_isolates_failures() {
    let mut h = harness().await;
    let payment_id = Uuid::new_v4();
    let failing = seed_record(
        &h,
        Uuid::new_v4(),
        payment_id,
        TransactionKind::Authorize,
        payment_json("pay-1", "pending"),
    )
    .await;
    let healthy = seed_record(
        &h,
        Uuid::new_v4(),
        payment_id,
        TransactionKind::Authorize,
        payment_json("pay-2", "pending"),
    )
    .await;

    let _broken = h
        .server
        .mock("GET", gateway_path("/payment/pay-1").as_str())
        .with_status(500)
        .with_body("{\"message\":\"internal\"}")
        .create_async()
        .await;
    let _ok = h
        .server
        .mock("GET", gateway_path("/payment/pay-2").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(payment_json("pay-2", "authorised").to_string())
        .create_async()
        .await;

    let report = h.orchestrator.refresh_pending(&h.ctx, payment_id).await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.updated, vec![healthy.transaction_id]);
    assert_eq!(report.notified, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].transaction_id, failing.transaction_id);

    let stored = h.ledger.all().await;
    assert_eq!(stored[0].status(), CanonicalStatus::Pending);
    assert_eq!(stored[1].status(), CanonicalStatus::Processed);
}

#[tokio::test]
async fn test_refresh_still_pending_is_unchanged() {
    let mut h = harness().await;
    let payment_id = Uuid::new_v4();
    seed_record(
        &h,
        Uuid::new_v4(),
        payment_id,
        TransactionKind::Authorize,
        payment_json("pay-1", "pending"),
    )
    .await;
    let _mock = h
        .server
        .mock("GET", gateway_path("/payment/pay-1").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(payment_json("pay-1", "pending").to_string())
        .create_async()
        .await;

    let report = h.orchestrator.refresh_pending(&h.ctx, payment_id).await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert!(report.updated.is_empty());
    assert!(h.host.notifications().is_empty());
}

#[tokio::test]
async fn test_concurrent_webhook_and_refresh_notify_once() {
    let mut h = harness().await;
    let payment_id = Uuid::new_v4();
    seed_record(
        &h,
        Uuid::new_v4(),
        payment_id,
        TransactionKind::Authorize,
        payment_json("pay-1", "pending"),
    )
    .await;
    let _mock = h
        .server
        .mock("GET", gateway_path("/payment/pay-1").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(payment_json("pay-1", "authorised").to_string())
        .create_async()
        .await;

    let body = payment_notification("n-9", "pay-1", "authorised");
    let (webhook, refresh) = tokio::join!(
        h.orchestrator.handle_webhook_body(&h.ctx, &body),
        h.orchestrator.refresh_pending(&h.ctx, payment_id)
    );
    webhook.unwrap();
    refresh.unwrap();

    assert_eq!(h.host.notifications().len(), 1);
    assert_eq!(h.ledger.all().await[0].status(), CanonicalStatus::Processed);
}
