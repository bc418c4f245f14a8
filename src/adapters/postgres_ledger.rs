//! Postgres implementation of TransactionLedger.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{like_pattern, parse_uuid};
use crate::domain::{NewTransactionRecord, OutcomeEnvelope, TransactionKind, TransactionRecord};
use crate::ports::{RepositoryError, RepositoryResult, TransactionLedger};

const COLUMNS: &str = "record_id, account_id, payment_id, transaction_id, tenant_id, \
     transaction_kind, amount, currency, gateway_transaction_id, gateway_reference_id, \
     gateway_payer_id, gateway_card_id, envelope, revision, created_at";

/// Postgres-backed gateway interaction ledger.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_latest_where(
        &self,
        predicate: &str,
        tenant_id: Uuid,
        value: &str,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_responses WHERE tenant_id = $1 AND {} = $2 \
             ORDER BY record_id DESC LIMIT 1",
            COLUMNS, predicate
        );
        let row = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(LedgerRow::into_domain).transpose()
    }
}

#[async_trait]
impl TransactionLedger for PostgresLedger {
    async fn insert(&self, record: NewTransactionRecord) -> RepositoryResult<TransactionRecord> {
        let sql = format!(
            "INSERT INTO ompay_responses (
                account_id, payment_id, transaction_id, tenant_id, transaction_kind,
                amount, currency, gateway_transaction_id, gateway_reference_id,
                gateway_payer_id, gateway_card_id, envelope, revision, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, $13)
            RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(record.account_id.to_string())
            .bind(record.payment_id.to_string())
            .bind(record.transaction_id.to_string())
            .bind(record.tenant_id.to_string())
            .bind(record.kind.as_str())
            .bind(&record.amount)
            .bind(&record.currency)
            .bind(&record.gateway_transaction_id)
            .bind(&record.gateway_reference_id)
            .bind(&record.gateway_payer_id)
            .bind(&record.gateway_card_id)
            .bind(record.envelope.to_value())
            .bind(record.created_at)
            .fetch_one(&self.pool)
            .await?;

        row.into_domain()
    }

    async fn get_by_record_id(&self, record_id: i64) -> RepositoryResult<TransactionRecord> {
        let sql = format!("SELECT {} FROM ompay_responses WHERE record_id = $1", COLUMNS);
        let row = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound(record_id.to_string()))?
            .into_domain()
    }

    async fn find_by_gateway_transaction_id(
        &self,
        tenant_id: Uuid,
        gateway_transaction_id: &str,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        self.fetch_latest_where("gateway_transaction_id", tenant_id, gateway_transaction_id)
            .await
    }

    async fn find_by_gateway_reference_id(
        &self,
        tenant_id: Uuid,
        gateway_reference_id: &str,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        self.fetch_latest_where("gateway_reference_id", tenant_id, gateway_reference_id)
            .await
    }

    async fn find_latest_by_transaction_id(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> RepositoryResult<Option<TransactionRecord>> {
        self.fetch_latest_where("transaction_id", tenant_id, &transaction_id.to_string())
            .await
    }

    async fn list_by_payment_id(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_responses WHERE tenant_id = $1 AND payment_id = $2 \
             ORDER BY record_id ASC",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(payment_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(LedgerRow::into_domain).collect()
    }

    async fn list_by_payment_and_kind(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
        kind: TransactionKind,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_responses \
             WHERE tenant_id = $1 AND payment_id = $2 AND transaction_kind = $3 \
             ORDER BY record_id DESC",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(payment_id.to_string())
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(LedgerRow::into_domain).collect()
    }

    async fn update_envelope(
        &self,
        record_id: i64,
        expected_revision: i32,
        envelope: &OutcomeEnvelope,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE ompay_responses SET envelope = $3, revision = revision + 1 \
             WHERE record_id = $1 AND revision = $2",
        )
        .bind(record_id)
        .bind(expected_revision)
        .bind(envelope.to_value())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn search(
        &self,
        tenant_id: Uuid,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<TransactionRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_responses WHERE tenant_id = $1 AND ({}) \
             ORDER BY record_id DESC LIMIT $3 OFFSET $4",
            COLUMNS, SEARCH_PREDICATE
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(like_pattern(key))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(LedgerRow::into_domain).collect()
    }

    async fn count(&self, tenant_id: Uuid, key: &str) -> RepositoryResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM ompay_responses WHERE tenant_id = $1 AND ({})",
            SEARCH_PREDICATE
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(tenant_id.to_string())
            .bind(like_pattern(key))
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

const SEARCH_PREDICATE: &str = "payment_id ILIKE $2 OR transaction_id ILIKE $2 \
     OR account_id ILIKE $2 OR gateway_transaction_id ILIKE $2 \
     OR gateway_reference_id ILIKE $2 OR envelope::text ILIKE $2";

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    record_id: i64,
    account_id: String,
    payment_id: String,
    transaction_id: String,
    tenant_id: String,
    transaction_kind: String,
    amount: Option<BigDecimal>,
    currency: Option<String>,
    gateway_transaction_id: Option<String>,
    gateway_reference_id: Option<String>,
    gateway_payer_id: Option<String>,
    gateway_card_id: Option<String>,
    envelope: serde_json::Value,
    revision: i32,
    created_at: DateTime<Utc>,
}

impl LedgerRow {
    fn into_domain(self) -> RepositoryResult<TransactionRecord> {
        let kind = self
            .transaction_kind
            .parse::<TransactionKind>()
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

        Ok(TransactionRecord {
            record_id: self.record_id,
            account_id: parse_uuid("account_id", &self.account_id)?,
            payment_id: parse_uuid("payment_id", &self.payment_id)?,
            transaction_id: parse_uuid("transaction_id", &self.transaction_id)?,
            tenant_id: parse_uuid("tenant_id", &self.tenant_id)?,
            kind,
            amount: self.amount,
            currency: self.currency,
            gateway_transaction_id: self.gateway_transaction_id,
            gateway_reference_id: self.gateway_reference_id,
            gateway_payer_id: self.gateway_payer_id,
            gateway_card_id: self.gateway_card_id,
            envelope: OutcomeEnvelope::from_value(self.envelope),
            revision: self.revision,
            created_at: self.created_at,
        })
    }
}
