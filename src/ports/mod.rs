//! Ports: the seams between the orchestrator and its collaborators.
//!
//! The orchestrator depends only on these traits; Postgres, in-memory and
//! HTTP implementations live under `adapters`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    CallContext, CardMetadata, NewPaymentMethod, NewTransactionRecord, OutcomeEnvelope,
    PaymentMethodRecord, TransactionKind, TransactionRecord, TransactionResult,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Append-only store of gateway interactions.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn insert(&self, record: NewTransactionRecord) -> RepositoryResult<TransactionRecord>;

    async fn get_by_record_id(&self, record_id: i64) -> RepositoryResult<TransactionRecord>;

    /// Latest record whose gateway transaction id matches.
    async fn find_by_gateway_transaction_id(
        &self,
        tenant_id: Uuid,
        gateway_transaction_id: &str,
    ) -> RepositoryResult<Option<TransactionRecord>>;

    /// Latest record whose gateway reference id matches.
    async fn find_by_gateway_reference_id(
        &self,
        tenant_id: Uuid,
        gateway_reference_id: &str,
    ) -> RepositoryResult<Option<TransactionRecord>>;

    async fn find_latest_by_transaction_id(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> RepositoryResult<Option<TransactionRecord>>;

    /// All records for a payment, oldest first.
    async fn list_by_payment_id(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> RepositoryResult<Vec<TransactionRecord>>;

    /// Records of one kind for a payment, newest first.
    async fn list_by_payment_and_kind(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
        kind: TransactionKind,
    ) -> RepositoryResult<Vec<TransactionRecord>>;

    /// Rewrites the envelope if the record is still at `expected_revision`.
    /// Returns `false` when another writer got there first.
    async fn update_envelope(
        &self,
        record_id: i64,
        expected_revision: i32,
        envelope: &OutcomeEnvelope,
    ) -> RepositoryResult<bool>;

    async fn search(
        &self,
        tenant_id: Uuid,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<TransactionRecord>>;

    async fn count(&self, tenant_id: Uuid, key: &str) -> RepositoryResult<i64>;
}

/// Tokenized card store. Deleted rows are invisible to every read.
#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    async fn insert(&self, method: NewPaymentMethod) -> RepositoryResult<PaymentMethodRecord>;

    async fn get_by_payment_method_id(
        &self,
        tenant_id: Uuid,
        payment_method_id: Uuid,
    ) -> RepositoryResult<Option<PaymentMethodRecord>>;

    async fn find_by_card_id(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        gateway_card_id: &str,
    ) -> RepositoryResult<Option<PaymentMethodRecord>>;

    async fn list_for_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>>;

    async fn list_for_payer(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        gateway_payer_id: &str,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>>;

    /// Payer id of the account's most recent vault entry.
    async fn payer_id_for_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> RepositoryResult<Option<String>>;

    async fn update_card(
        &self,
        record_id: i64,
        metadata: &CardMetadata,
        is_default: bool,
    ) -> RepositoryResult<()>;

    async fn clear_default(&self, tenant_id: Uuid, account_id: Uuid) -> RepositoryResult<()>;

    async fn set_default(&self, tenant_id: Uuid, payment_method_id: Uuid) -> RepositoryResult<()>;

    async fn soft_delete(&self, tenant_id: Uuid, payment_method_id: Uuid) -> RepositoryResult<()>;

    async fn soft_delete_record(&self, record_id: i64) -> RepositoryResult<()>;

    async fn search(
        &self,
        tenant_id: Uuid,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>>;

    async fn count(&self, tenant_id: Uuid, key: &str) -> RepositoryResult<i64>;
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Host rejected call with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Host returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Contact and billing details the host keeps for an account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostAccount {
    pub account_id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Callbacks into the billing platform that owns accounts and payments.
#[async_trait]
pub trait HostPlatform: Send + Sync {
    async fn get_account(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
    ) -> Result<HostAccount, HostError>;

    async fn notify_pending_transaction_resolved(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        transaction: &TransactionResult,
        success: bool,
    ) -> Result<(), HostError>;

    /// Registers a gateway card with the host; returns the host payment-method id.
    async fn register_payment_method(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        gateway_card_id: &str,
        properties: &Value,
    ) -> Result<Uuid, HostError>;
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub offset: i64,
    pub next_offset: Option<i64>,
    pub total: i64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(offset: i64, total: i64, items: Vec<T>) -> Self {
        let end = offset + items.len() as i64;
        let next_offset = (end < total).then_some(end);
        Self {
            offset,
            next_offset,
            total,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_next_offset() {
        let page = Page::new(0, 5, vec![1, 2]);
        assert_eq!(page.next_offset, Some(2));
        let last = Page::new(4, 5, vec![5]);
        assert_eq!(last.next_offset, None);
    }
}
