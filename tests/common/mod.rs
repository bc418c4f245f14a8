#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use mockito::ServerGuard;
use ompay_connector::adapters::{InMemoryLedger, InMemoryVault};
use ompay_connector::config::GatewayConfig;
use ompay_connector::domain::{
    CallContext, NewTransactionRecord, OutcomeEnvelope, TransactionKind, TransactionRecord,
    TransactionResult,
};
use ompay_connector::gateway::GatewayClient;
use ompay_connector::ports::{HostAccount, HostError, HostPlatform, TransactionLedger};
use ompay_connector::services::{OrchestratorSettings, PaymentOrchestrator};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const MERCHANT_PREFIX: &str = "/v1/merchants/m-1";

#[derive(Debug, Clone)]
pub struct Notification {
    pub account_id: Uuid,
    pub transaction: TransactionResult,
    pub success: bool,
}

/// Host double that records every callback it receives.
#[derive(Default)]
pub struct RecordingHost {
    pub notifications: Mutex<Vec<Notification>>,
    pub registrations: Mutex<Vec<(Uuid, String)>>,
    pub fail_account_lookup: bool,
    pub fail_registration: bool,
}

impl RecordingHost {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<(Uuid, String)> {
        self.registrations.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostPlatform for RecordingHost {
    async fn get_account(
        &self,
        _ctx: &CallContext,
        account_id: Uuid,
    ) -> Result<HostAccount, HostError> {
        if self.fail_account_lookup {
            return Err(HostError::Rejected {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(HostAccount {
            account_id,
            email: Some("payer@example.com".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            country: Some("US".to_string()),
            ..HostAccount::default()
        })
    }

    async fn notify_pending_transaction_resolved(
        &self,
        _ctx: &CallContext,
        account_id: Uuid,
        transaction: &TransactionResult,
        success: bool,
    ) -> Result<(), HostError> {
        self.notifications.lock().unwrap().push(Notification {
            account_id,
            transaction: transaction.clone(),
            success,
        });
        Ok(())
    }

    async fn register_payment_method(
        &self,
        _ctx: &CallContext,
        account_id: Uuid,
        gateway_card_id: &str,
        _properties: &Value,
    ) -> Result<Uuid, HostError> {
        if self.fail_registration {
            return Err(HostError::InvalidResponse("no id".to_string()));
        }
        self.registrations
            .lock()
            .unwrap()
            .push((account_id, gateway_card_id.to_string()));
        Ok(Uuid::new_v4())
    }
}

pub struct Harness {
    pub server: ServerGuard,
    pub ledger: Arc<InMemoryLedger>,
    pub vault: Arc<InMemoryVault>,
    pub host: Arc<RecordingHost>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub ctx: CallContext,
    pub gateway_config: GatewayConfig,
}

pub fn gateway_config(server_url: &str) -> GatewayConfig {
    GatewayConfig::new(
        Some("m-1".to_string()),
        Some("client-1".to_string()),
        Some("secret-1".to_string()),
        true,
        Some(format!("{}/v1/merchants", server_url)),
    )
}

pub fn orchestrator_for(
    gateway_config: &GatewayConfig,
    ledger: Arc<InMemoryLedger>,
    vault: Arc<InMemoryVault>,
    host: Arc<RecordingHost>,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(
        GatewayClient::new(gateway_config).unwrap(),
        ledger,
        vault,
        host,
        OrchestratorSettings {
            host_base_url: "http://host.test".to_string(),
            is_sandbox: true,
        },
    )
}

pub async fn harness() -> Harness {
    harness_with_host(RecordingHost::default()).await
}

pub async fn harness_with_host(host: RecordingHost) -> Harness {
    let server = mockito::Server::new_async().await;
    let gateway_config = gateway_config(&server.url());
    let ledger = Arc::new(InMemoryLedger::new());
    let vault = Arc::new(InMemoryVault::new());
    let host = Arc::new(host);

    let orchestrator =
        orchestrator_for(&gateway_config, ledger.clone(), vault.clone(), host.clone());

    Harness {
        server,
        ledger,
        vault,
        host,
        orchestrator: Arc::new(orchestrator),
        ctx: CallContext::new(Uuid::new_v4()),
        gateway_config,
    }
}

pub fn gateway_path(path: &str) -> String {
    format!("{}{}", MERCHANT_PREFIX, path)
}

/// A gateway payment resource paid with card-1 of payer-1.
pub fn payment_json(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "state": state,
        "intent": "auth",
        "payer": {
            "id": "payer-1",
            "funding_instrument": {
                "credit_card": {
                    "id": "card-1",
                    "type": "visa",
                    "last4": "1111",
                    "expire_month": "12",
                    "expire_year": "2030"
                }
            }
        },
        "result": { "code": "0000", "description": "Approved" }
    })
}

pub fn payment_notification(notification_id: &str, gateway_id: &str, state: &str) -> String {
    json!({
        "id": notification_id,
        "resource_type": "payment",
        "kind": "payment.updated",
        "resource": {
            "id": gateway_id,
            "state": state,
            "result": { "code": "0000", "description": "Approved" }
        }
    })
    .to_string()
}

/// Writes a ledger record directly, as if the gateway had answered `body`.
pub async fn seed_record(
    harness: &Harness,
    account_id: Uuid,
    payment_id: Uuid,
    kind: TransactionKind,
    body: Value,
) -> TransactionRecord {
    let envelope = OutcomeEnvelope::from_value(body);
    harness
        .ledger
        .insert(NewTransactionRecord {
            account_id,
            payment_id,
            transaction_id: Uuid::new_v4(),
            tenant_id: harness.ctx.tenant_id,
            kind,
            amount: Some(BigDecimal::from(25)),
            currency: Some("USD".to_string()),
            gateway_transaction_id: envelope.gateway_transaction_id(),
            gateway_reference_id: envelope.reference_id(),
            gateway_payer_id: Some("payer-1".to_string()),
            gateway_card_id: Some("card-1".to_string()),
            envelope,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}
