mod common;

use common::{gateway_path, harness, Harness};
use mockito::Matcher;
use ompay_connector::domain::{CardMetadata, PaymentMethodRecord};
use ompay_connector::services::{AddPaymentMethod, PaymentError, SyncReport};
use serde_json::json;
use uuid::Uuid;

async fn enroll(
    h: &Harness,
    account_id: Uuid,
    card_id: &str,
    set_default: bool,
) -> PaymentMethodRecord {
    h.orchestrator
        .add_payment_method(
            &h.ctx,
            AddPaymentMethod {
                account_id,
                payment_method_id: Uuid::new_v4(),
                gateway_card_id: card_id.to_string(),
                gateway_payer_id: "payer-1".to_string(),
                metadata: CardMetadata {
                    last4: Some("0000".to_string()),
                    ..CardMetadata::default()
                },
                set_default,
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_enroll_is_idempotent_per_card() {
    let h = harness().await;
    let account_id = Uuid::new_v4();
    let first = enroll(&h, account_id, "card-1", true).await;
    let second = enroll(&h, account_id, "card-1", false).await;

    assert_eq!(first.payment_method_id, second.payment_method_id);
    assert_eq!(h.vault.all().await.len(), 1);
}

#[tokio::test]
async fn test_enroll_requires_card_id() {
    let h = harness().await;
    let err = h
        .orchestrator
        .add_payment_method(
            &h.ctx,
            AddPaymentMethod {
                account_id: Uuid::new_v4(),
                payment_method_id: Uuid::new_v4(),
                gateway_card_id: " ".to_string(),
                gateway_payer_id: "payer-1".to_string(),
                metadata: CardMetadata::default(),
                set_default: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_refresh_mirrors_gateway_cards() {
    let mut h = harness().await;
    let account_id = Uuid::new_v4();
    let stale = enroll(&h, account_id, "card-1", true).await;
    enroll(&h, account_id, "card-2", false).await;

    let listing = h
        .server
        .mock("GET", gateway_path("/payer/payer-1/card").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "credit_cards": [
                    { "id": "card-2", "type": "visa", "last4": "2222", "is_default": true },
                    { "id": "card-3", "type": "mastercard", "last4": "3333" },
                    { "id": "card-2", "type": "visa", "last4": "2222" }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let report = h
        .orchestrator
        .refresh_payment_methods(&h.ctx, account_id)
        .await
        .unwrap()
        .unwrap();

    listing.assert_async().await;
    assert_eq!(
        report,
        SyncReport {
            inserted: 1,
            updated: 1,
            removed: 1
        }
    );

    let live = h
        .orchestrator
        .list_payment_methods(&h.ctx, account_id, false)
        .await
        .unwrap();
    let mut cards: Vec<(String, bool)> = live
        .iter()
        .map(|m| (m.gateway_card_id.clone(), m.is_default))
        .collect();
    cards.sort();
    assert_eq!(
        cards,
        vec![("card-2".to_string(), true), ("card-3".to_string(), false)]
    );

    let card_2 = live.iter().find(|m| m.gateway_card_id == "card-2").unwrap();
    assert_eq!(card_2.metadata.last4.as_deref(), Some("2222"));

    let gone = h
        .orchestrator
        .get_payment_method(&h.ctx, stale.payment_method_id)
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_refresh_without_payer_is_skipped() {
    let h = harness().await;
    let report = h
        .orchestrator
        .refresh_payment_methods(&h.ctx, Uuid::new_v4())
        .await
        .unwrap();
    assert!(report.is_none());
}

#[tokio::test]
async fn test_list_survives_failed_refresh() {
    let mut h = harness().await;
    let account_id = Uuid::new_v4();
    enroll(&h, account_id, "card-1", true).await;
    let _mock = h
        .server
        .mock("GET", gateway_path("/payer/payer-1/card").as_str())
        .with_status(503)
        .create_async()
        .await;

    let methods = h
        .orchestrator
        .list_payment_methods(&h.ctx, account_id, true)
        .await
        .unwrap();
    assert_eq!(methods.len(), 1);
}

#[tokio::test]
async fn test_delete_soft_deletes_even_when_gateway_fails() {
    for status in [404, 500] {
        let mut h = harness().await;
        let account_id = Uuid::new_v4();
        let method = enroll(&h, account_id, "card-1", true).await;

        let remote = h
            .server
            .mock("DELETE", gateway_path("/payer/payer-1/card/card-1").as_str())
            .with_status(status)
            .create_async()
            .await;

        h.orchestrator
            .delete_payment_method(&h.ctx, method.payment_method_id)
            .await
            .unwrap();

        remote.assert_async().await;
        let stored = h.vault.all().await;
        assert!(stored[0].is_deleted, "status {status}");
        assert!(!stored[0].is_default, "status {status}");
    }
}

#[tokio::test]
async fn test_delete_unknown_method_is_a_no_op() {
    let mut h = harness().await;
    let remote = h
        .server
        .mock("DELETE", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    h.orchestrator
        .delete_payment_method(&h.ctx, Uuid::new_v4())
        .await
        .unwrap();
    remote.assert_async().await;
}

#[tokio::test]
async fn test_set_default_moves_flag() {
    let mut h = harness().await;
    let account_id = Uuid::new_v4();
    let first = enroll(&h, account_id, "card-1", true).await;
    let second = enroll(&h, account_id, "card-2", false).await;

    let remote = h
        .server
        .mock("PUT", gateway_path("/payer/payer-1").as_str())
        .match_body(Matcher::Json(json!({ "default_card": "card-2" })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    h.orchestrator
        .set_default_payment_method(&h.ctx, account_id, second.payment_method_id)
        .await
        .unwrap();

    remote.assert_async().await;
    let methods = h
        .orchestrator
        .list_payment_methods(&h.ctx, account_id, false)
        .await
        .unwrap();
    let default_ids: Vec<Uuid> = methods
        .iter()
        .filter(|m| m.is_default)
        .map(|m| m.payment_method_id)
        .collect();
    assert_eq!(default_ids, vec![second.payment_method_id]);
    assert_ne!(first.payment_method_id, second.payment_method_id);
}

#[tokio::test]
async fn test_set_default_moves_flag_when_gateway_refuses() {
    let mut h = harness().await;
    let account_id = Uuid::new_v4();
    let first = enroll(&h, account_id, "card-1", true).await;
    let second = enroll(&h, account_id, "card-2", false).await;

    let remote = h
        .server
        .mock("PUT", gateway_path("/payer/payer-1").as_str())
        .with_status(500)
        .with_body("{\"error\": \"internal\"}")
        .create_async()
        .await;

    h.orchestrator
        .set_default_payment_method(&h.ctx, account_id, second.payment_method_id)
        .await
        .unwrap();

    remote.assert_async().await;
    let first = h
        .orchestrator
        .get_payment_method(&h.ctx, first.payment_method_id)
        .await
        .unwrap()
        .unwrap();
    let second = h
        .orchestrator
        .get_payment_method(&h.ctx, second.payment_method_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!first.is_default);
    assert!(second.is_default);
}

#[tokio::test]
async fn test_enroll_as_default_clears_previous_default() {
    let h = harness().await;
    let account_id = Uuid::new_v4();
    let first = enroll(&h, account_id, "card-1", true).await;
    let second = enroll(&h, account_id, "card-2", true).await;

    let defaults: Vec<Uuid> = h
        .vault
        .all()
        .await
        .into_iter()
        .filter(|m| m.is_default)
        .map(|m| m.payment_method_id)
        .collect();
    assert_eq!(defaults, vec![second.payment_method_id]);
    assert_ne!(first.payment_method_id, second.payment_method_id);
}

#[tokio::test]
async fn test_set_default_rejects_foreign_method() {
    let h = harness().await;
    let method = enroll(&h, Uuid::new_v4(), "card-1", false).await;

    let err = h
        .orchestrator
        .set_default_payment_method(&h.ctx, Uuid::new_v4(), method.payment_method_id)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::PaymentMethodNotFound(_)));
}

#[tokio::test]
async fn test_search_payment_methods() {
    let h = harness().await;
    let account_id = Uuid::new_v4();
    enroll(&h, account_id, "card-abc", false).await;
    enroll(&h, account_id, "card-xyz", false).await;

    let page = h
        .orchestrator
        .search_payment_methods(&h.ctx, "card-abc", 0, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].gateway_card_id, "card-abc");
    assert!(page.next_offset.is_none());
}
