//! Postgres implementation of PaymentMethodStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{like_pattern, parse_uuid};
use crate::domain::{CardMetadata, NewPaymentMethod, PaymentMethodRecord};
use crate::ports::{PaymentMethodStore, RepositoryError, RepositoryResult};

const COLUMNS: &str = "record_id, account_id, payment_method_id, tenant_id, gateway_card_id, \
     gateway_payer_id, is_default, is_deleted, metadata, created_at, updated_at";

const SEARCH_PREDICATE: &str = "payment_method_id ILIKE $2 OR account_id ILIKE $2 \
     OR gateway_card_id ILIKE $2 OR gateway_payer_id ILIKE $2 OR metadata::text ILIKE $2";

#[derive(Clone)]
pub struct PostgresVault {
    pool: PgPool,
}

impl PostgresVault {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentMethodStore for PostgresVault {
    async fn insert(&self, method: NewPaymentMethod) -> RepositoryResult<PaymentMethodRecord> {
        let sql = format!(
            "INSERT INTO ompay_payment_methods (
                account_id, payment_method_id, tenant_id, gateway_card_id, gateway_payer_id,
                is_default, is_deleted, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, NOW(), NOW())
            RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, VaultRow>(&sql)
            .bind(method.account_id.to_string())
            .bind(method.payment_method_id.to_string())
            .bind(method.tenant_id.to_string())
            .bind(&method.gateway_card_id)
            .bind(&method.gateway_payer_id)
            .bind(method.is_default)
            .bind(method.metadata.to_value())
            .fetch_one(&self.pool)
            .await?;

        row.into_domain()
    }

    async fn get_by_payment_method_id(
        &self,
        tenant_id: Uuid,
        payment_method_id: Uuid,
    ) -> RepositoryResult<Option<PaymentMethodRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_payment_methods \
             WHERE tenant_id = $1 AND payment_method_id = $2 AND NOT is_deleted",
            COLUMNS
        );
        let row = sqlx::query_as::<_, VaultRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(payment_method_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(VaultRow::into_domain).transpose()
    }

    async fn find_by_card_id(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        gateway_card_id: &str,
    ) -> RepositoryResult<Option<PaymentMethodRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_payment_methods \
             WHERE tenant_id = $1 AND account_id = $2 AND gateway_card_id = $3 AND NOT is_deleted \
             ORDER BY record_id DESC LIMIT 1",
            COLUMNS
        );
        let row = sqlx::query_as::<_, VaultRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(account_id.to_string())
            .bind(gateway_card_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(VaultRow::into_domain).transpose()
    }

    async fn list_for_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_payment_methods \
             WHERE tenant_id = $1 AND account_id = $2 AND NOT is_deleted \
             ORDER BY record_id ASC",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, VaultRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(account_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(VaultRow::into_domain).collect()
    }

    async fn list_for_payer(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        gateway_payer_id: &str,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_payment_methods \
             WHERE tenant_id = $1 AND account_id = $2 AND gateway_payer_id = $3 AND NOT is_deleted \
             ORDER BY record_id ASC",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, VaultRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(account_id.to_string())
            .bind(gateway_payer_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(VaultRow::into_domain).collect()
    }

    async fn payer_id_for_account(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> RepositoryResult<Option<String>> {
        let payer = sqlx::query_scalar::<_, String>(
            "SELECT gateway_payer_id FROM ompay_payment_methods \
             WHERE tenant_id = $1 AND account_id = $2 AND NOT is_deleted \
             ORDER BY record_id DESC LIMIT 1",
        )
        .bind(tenant_id.to_string())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(payer)
    }

    async fn update_card(
        &self,
        record_id: i64,
        metadata: &CardMetadata,
        is_default: bool,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE ompay_payment_methods SET metadata = $2, is_default = $3, updated_at = NOW() \
             WHERE record_id = $1",
        )
        .bind(record_id)
        .bind(metadata.to_value())
        .bind(is_default)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_default(&self, tenant_id: Uuid, account_id: Uuid) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE ompay_payment_methods SET is_default = FALSE, updated_at = NOW() \
             WHERE tenant_id = $1 AND account_id = $2 AND is_default",
        )
        .bind(tenant_id.to_string())
        .bind(account_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_default(&self, tenant_id: Uuid, payment_method_id: Uuid) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE ompay_payment_methods SET is_default = TRUE, updated_at = NOW() \
             WHERE tenant_id = $1 AND payment_method_id = $2 AND NOT is_deleted",
        )
        .bind(tenant_id.to_string())
        .bind(payment_method_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(payment_method_id.to_string()));
        }
        Ok(())
    }

    async fn soft_delete(&self, tenant_id: Uuid, payment_method_id: Uuid) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE ompay_payment_methods \
             SET is_deleted = TRUE, is_default = FALSE, updated_at = NOW() \
             WHERE tenant_id = $1 AND payment_method_id = $2",
        )
        .bind(tenant_id.to_string())
        .bind(payment_method_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn soft_delete_record(&self, record_id: i64) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE ompay_payment_methods \
             SET is_deleted = TRUE, is_default = FALSE, updated_at = NOW() \
             WHERE record_id = $1",
        )
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn search(
        &self,
        tenant_id: Uuid,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentMethodRecord>> {
        let sql = format!(
            "SELECT {} FROM ompay_payment_methods \
             WHERE tenant_id = $1 AND NOT is_deleted AND ({}) \
             ORDER BY record_id DESC LIMIT $3 OFFSET $4",
            COLUMNS, SEARCH_PREDICATE
        );
        let rows = sqlx::query_as::<_, VaultRow>(&sql)
            .bind(tenant_id.to_string())
            .bind(like_pattern(key))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(VaultRow::into_domain).collect()
    }

    async fn count(&self, tenant_id: Uuid, key: &str) -> RepositoryResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM ompay_payment_methods \
             WHERE tenant_id = $1 AND NOT is_deleted AND ({})",
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

#[derive(Debug, sqlx::FromRow)]
struct VaultRow {
    record_id: i64,
    account_id: String,
    payment_method_id: String,
    tenant_id: String,
    gateway_card_id: String,
    gateway_payer_id: String,
    is_default: bool,
    is_deleted: bool,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VaultRow {
    fn into_domain(self) -> RepositoryResult<PaymentMethodRecord> {
        Ok(PaymentMethodRecord {
            record_id: self.record_id,
            account_id: parse_uuid("account_id", &self.account_id)?,
            payment_method_id: parse_uuid("payment_method_id", &self.payment_method_id)?,
            tenant_id: parse_uuid("tenant_id", &self.tenant_id)?,
            gateway_card_id: self.gateway_card_id,
            gateway_payer_id: self.gateway_payer_id,
            is_default: self.is_default,
            is_deleted: self.is_deleted,
            metadata: CardMetadata::from_value(&self.metadata),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
