//! In-memory stores for `STORAGE=memory` and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    CardMetadata, NewPaymentMethod, NewTransactionRecord, OutcomeEnvelope, PaymentMethodRecord,
    TransactionKind, TransactionRecord,
};
use crate::ports::{
    PaymentMethodStore, RepositoryError, RepositoryResult, TransactionLedger,
};

fn matches_key(key: &str, fields: &[Option<&str>]) -> bool {
    let needle = key.to_lowercase();
    fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// One live default per (tenant, account), like the partial unique index.
fn ensure_single_default(
    methods: &[PaymentMethodRecord],
    tenant_id: Uuid,
    account_id: Uuid,
    record_id: Option<i64>,
) -> RepositoryResult<()> {
    let taken = methods.iter().any(|m| {
        m.is_default
            && !m.is_deleted
            && m.tenant_id == tenant_id
            && m.account_id == account_id
            && Some(m.record_id) != record_id
    });
    if taken {
        return Err(RepositoryError::Conflict(format!(
            "account {} already has a default payment method",
            account_id
        )));
    }
    Ok(())
}

fn page<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[derive(Default)]
pub struct InMemoryLedger {
    records: RwLock<Vec<TransactionRecord>>,
    next_id: AtomicI64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, in insertion order.
    pub async fn all(&self) -> Vec<TransactionRecord> {
        self.records.read().await.clone()
    }

    async fn latest_where<F>(&self, predicate: F) -> Option<TransactionRecord>
    where
        F: Fn(&TransactionRecord) -> bool,
    {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .find(|r| predicate(r))
            .cloned()
    }

    async fn matching(&self, tenant_id: Uuid, key: &str) -> Vec<TransactionRecord> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| {
                let payment = r.payment_id.to_string();
                let transaction = r.transaction_id.to_string();
                let account = r.account_id.to_string();
                let envelope = r.envelope.to_value().to_string();
                matches_key(
                    key,
                    &[
                        Some(payment.as_str()),
                        Some(transaction.as_str()),
                        Some(account.as_str()),
                        r.gateway_transaction_id.as_deref(),
                        r.gateway_reference_id.as_deref(),
                        Some(envelope.as_str()),
                    ],
                )
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TransactionLedger for InMemoryLedger {
    async fn insert(&self, record: NewTransactionRecord) -> RepositoryResult<TransactionRecord> {
        let record = TransactionRecord {
            record_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            account_id: record.account_id,
            payment_id: record.payment_id,
            transaction_id: record.transaction_id,
            tenant_id: record.tenant_id,
            kind: record.kind,
            amount: record.amount,
            currency: record.currency,
            gateway_transaction_id: record.gateway_transaction_id,
            gateway_reference_id: record.gateway_reference_id,
            gateway_payer_id: record.gateway_payer_id,
            gateway_card_id: record.gateway_card_id,
            envelope: record.envelope,
            revision: 0,
            created_at: record.created_at,
        };
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn get_by_record_id(&self, record_id: i64) -> RepositoryResult<TransactionRecord> {
        self.latest_where(|r| r.record_id == record_id)
            .await
            .ok_or_else(|| RepositoryError::NotFound(record_id.to_string()))
    }

    async fn find_by_gateway_transaction_id(
        &self,
        tenant_id: Uuid,
        gateway_transaction_id: &str,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        Ok(self
            .latest_where(|r| {
                r.tenant_id == tenant_id
                    && r.gateway_transaction_id.as_deref() == Some(gateway_transaction_id)
            })
            .await)
    }

    async fn find_by_gateway_reference_id(
        &self,
        tenant_id: Uuid,
        gateway_reference_id: &str,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        Ok(self
            .latest_where(|r| {
                r.tenant_id == tenant_id
                    && r.gateway_reference_id.as_deref() == Some(gateway_reference_id)
            })
            .await)
    }

    async fn find_latest_by_transaction_id(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        Ok(self
            .latest_where(|r| r.tenant_id == tenant_id && r.transaction_id == transaction_id)
            .await)
    }

    async fn list_by_payment_id(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn list_by_payment_and_kind(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
        kind: TransactionKind,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.tenant_id == tenant_id && r.payment_id == payment_id && r.kind == kind)
            .cloned()
            .collect())
    }

    async fn update_envelope(
        &self,
        record_id: i64,
        expected_revision: i32,
        envelope: &OutcomeEnvelope,
    ) -> RepositoryResult<bool> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.record_id == record_id) {
            Some(record) if record.revision == expected_revision => {
                record.envelope = envelope.clone();
                record.revision += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(record_id.to_string())),
        }
    }

    async fn search(
        &self,
        tenant_id: Uuid,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        Ok(page(self.matching(tenant_id, key).await, offset, limit))
    }

    async fn count(&self, tenant_id: Uuid, key: &str) -> RepositoryResult<i64> {
        Ok(self.matching(tenant_id, key).await.len() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryVault {
    methods: RwLock<Vec<PaymentMethodRecord>>,
    next_id: AtomicI64,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row, deleted ones included.
    pub async fn all(&self) -> Vec<PaymentMethodRecord> {
        self.methods.read().await.clone()
    }

    async fn live_where<F>(&self, predicate: F) -> Vec<PaymentMethodRecord>
    where
        F: Fn(&PaymentMethodRecord) -> bool,
    {
        self.methods
            .read()
            .await
            .iter()
            .filter(|m| !m.is_deleted && predicate(m))
            .cloned()
            .collect()
    }

    async fn matching(&self, tenant_id: Uuid, key: &str) -> Vec<PaymentMethodRecord> {
        let mut found = self
            .live_where(|m| {
                let pm = m.payment_method_id.to_string();
                let account = m.account_id.to_string();
                let metadata = m.metadata.to_value().to_string();
                m.tenant_id == tenant_id
                    && matches_key(
                        key,
                        &[
                            Some(pm.as_str()),
                            Some(account.as_str()),
                            Some(m.gateway_card_id.as_str()),
                            Some(m.gateway_payer_id.as_str()),
                            Some(metadata.as_str()),
                        ],
                    )
            })
            .await;
        found.reverse();
        found
    }
}

#[async_trait]
impl PaymentMethodStore for InMemoryVault {
    async fn insert(&self, method: NewPaymentMethod) -> RepositoryResult<PaymentMethodRecord> {
        let mut methods = self.methods.write().await;
        let duplicate = methods.iter().any(|m| {
            m.tenant_id == method.tenant_id && m.payment_method_id == method.payment_method_id
        });
        if duplicate {
            return Err(RepositoryError::Corrupt(format!(
                "payment method {} already exists",
                method.payment_method_id
            )));
        }
        if method.is_default {
            ensure_single_default(&methods, method.tenant_id, method.account_id, None)?;
        }
        let now = Utc::now();
        let record = PaymentMethodRecord {
            record_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            account_id: method.account_id,
            payment_method_id: method.payment_method_id,
            tenant_id: method.tenant_id,
            gateway_card_id: method.gateway_card_id,
            gateway_payer_id: method.gateway_payer_id,
            is_default: method.is_default,
            is_deleted: false,
            metadata: method.metadata,
            created_at: now,
            updated_at: now,
        };
        methods.push(record.clone());
        Ok(record)
    }

    async fn get_by_payment_method_id(
        &self,
        tenant_id: Uuid,
        payment_method_id: Uuid,
    ) -> RepositoryResult<Option<PaymentMethodRecord>> {
        Ok(self
            .live_where(|m| m.tenant_id == tenant_id && m.payment_method_id == payment_method_id)
            .await
            .pop())
    }

    async fn find_by_card_id(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        gateway_card_id: &str,
    ) -> RepositoryResult<Option<PaymentMethodRecord>> {
        Ok(self
            .live_where(|m| {
                m.tenant_id == tenant_id
                    && m.account_id == account_id
                    && m.gateway_card_id == gateway_card_id
            })
            .await
            .pop())
    }

    async fn list_for_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>> {
        Ok(self
            .live_where(|m| m.tenant_id == tenant_id && m.account_id == account_id)
            .await)
    }

    async fn list_for_payer(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        gateway_payer_id: &str,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>> {
        Ok(self
            .live_where(|m| {
                m.tenant_id == tenant_id
                    && m.account_id == account_id
                    && m.gateway_payer_id == gateway_payer_id
            })
            .await)
    }

    async fn payer_id_for_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> RepositoryResult<Option<String>> {
        Ok(self
            .live_where(|m| m.tenant_id == tenant_id && m.account_id == account_id)
            .await
            .pop()
            .map(|m| m.gateway_payer_id))
    }

    async fn update_card(
        &self,
        record_id: i64,
        metadata: &CardMetadata,
        is_default: bool,
    ) -> RepositoryResult<()> {
        let mut methods = self.methods.write().await;
        let index = methods
            .iter()
            .position(|m| m.record_id == record_id)
            .ok_or_else(|| RepositoryError::NotFound(record_id.to_string()))?;
        if is_default {
            let (tenant_id, account_id) = (methods[index].tenant_id, methods[index].account_id);
            ensure_single_default(&methods, tenant_id, account_id, Some(record_id))?;
        }
        let method = &mut methods[index];
        method.metadata = metadata.clone();
        method.is_default = is_default;
        method.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_default(&self, tenant_id: Uuid, account_id: Uuid) -> RepositoryResult<()> {
        let mut methods = self.methods.write().await;
        for method in methods
            .iter_mut()
            .filter(|m| m.tenant_id == tenant_id && m.account_id == account_id && m.is_default)
        {
            method.is_default = false;
            method.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_default(&self, tenant_id: Uuid, payment_method_id: Uuid) -> RepositoryResult<()> {
        let mut methods = self.methods.write().await;
        let index = methods
            .iter()
            .position(|m| {
                !m.is_deleted
                    && m.tenant_id == tenant_id
                    && m.payment_method_id == payment_method_id
            })
            .ok_or_else(|| RepositoryError::NotFound(payment_method_id.to_string()))?;
        let (account_id, record_id) = (methods[index].account_id, methods[index].record_id);
        ensure_single_default(&methods, tenant_id, account_id, Some(record_id))?;
        let method = &mut methods[index];
        method.is_default = true;
        method.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete(&self, tenant_id: Uuid, payment_method_id: Uuid) -> RepositoryResult<()> {
        let mut methods = self.methods.write().await;
        for method in methods
            .iter_mut()
            .filter(|m| m.tenant_id == tenant_id && m.payment_method_id == payment_method_id)
        {
            method.is_deleted = true;
            method.is_default = false;
            method.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn soft_delete_record(&self, record_id: i64) -> RepositoryResult<()> {
        let mut methods = self.methods.write().await;
        if let Some(method) = methods.iter_mut().find(|m| m.record_id == record_id) {
            method.is_deleted = true;
            method.is_default = false;
            method.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: Uuid,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>> {
        Ok(page(self.matching(tenant_id, key).await, offset, limit))
    }

    async fn count(&self, tenant_id: Uuid, key: &str) -> RepositoryResult<i64> {
        Ok(self.matching(tenant_id, key).await.len() as i64)
    }
}
