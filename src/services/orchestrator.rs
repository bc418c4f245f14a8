use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    CallContext, CanonicalStatus, OutcomeEnvelope, TransactionKind, TransactionRecord,
};
use crate::gateway::{GatewayClient, GatewayError};
use crate::ports::{HostError, HostPlatform, PaymentMethodStore, RepositoryError, TransactionLedger};

/// Path the hosted card form posts its nonce to, relative to the host base URL.
pub const NONCE_CALLBACK_PATH: &str = "/plugins/ompay/process-nonce";

const MAX_RECONCILE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),

    #[error("Host platform error: {0}")]
    Host(#[from] HostError),

    #[error("No originating transaction for {kind} on payment {payment_id}")]
    MissingOriginatingTransaction {
        kind: TransactionKind,
        payment_id: Uuid,
    },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Payment method not found: {0}")]
    PaymentMethodNotFound(Uuid),

    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub host_base_url: String,
    pub is_sandbox: bool,
}

/// Gateway-facing side of every payment lifecycle operation.
///
/// Operations are split across `payments`, `reconciliation` and
/// `payment_methods`; this module holds the shared state-transition routine.
pub struct PaymentOrchestrator {
    pub(super) gateway: GatewayClient,
    pub(super) ledger: Arc<dyn TransactionLedger>,
    pub(super) vault: Arc<dyn PaymentMethodStore>,
    pub(super) host: Arc<dyn HostPlatform>,
    pub(super) settings: OrchestratorSettings,
}

/// What a reconciliation attempt did to one ledger record.
#[derive(Debug, Clone)]
pub enum Reconciled {
    /// The new outcome maps to the status already recorded.
    Unchanged(TransactionRecord),
    Transitioned {
        record: TransactionRecord,
        previous: CanonicalStatus,
        notified: bool,
    },
}

impl Reconciled {
    pub fn record(&self) -> &TransactionRecord {
        match self {
            Reconciled::Unchanged(record) => record,
            Reconciled::Transitioned { record, .. } => record,
        }
    }

    pub fn into_record(self) -> TransactionRecord {
        match self {
            Reconciled::Unchanged(record) => record,
            Reconciled::Transitioned { record, .. } => record,
        }
    }
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: GatewayClient,
        ledger: Arc<dyn TransactionLedger>,
        vault: Arc<dyn PaymentMethodStore>,
        host: Arc<dyn HostPlatform>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            gateway,
            ledger,
            vault,
            host,
            settings,
        }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Rewrites a record's envelope when the new outcome changes its status.
    ///
    /// `next` builds the candidate envelope from the current record. Writes are
    /// compare-and-swap on the record revision; a lost race re-reads the record
    /// and evaluates again, so concurrent channels produce one transition and
    /// one host notification. The host is notified only when the record left
    /// PENDING.
    pub(super) async fn reconcile_record<F>(
        &self,
        ctx: &CallContext,
        record: TransactionRecord,
        next: F,
    ) -> Result<Reconciled, PaymentError>
    where
        F: Fn(&OutcomeEnvelope) -> OutcomeEnvelope,
    {
        let mut current = record;
        for _ in 0..MAX_RECONCILE_ATTEMPTS {
            let previous = current.status();
            let envelope = next(&current.envelope);
            let status = envelope.status_for(current.kind);

            if status == previous {
                tracing::info!(
                    "No status change for transaction {} (gateway id {:?}): {}",
                    current.transaction_id,
                    current.gateway_transaction_id,
                    status
                );
                return Ok(Reconciled::Unchanged(current));
            }

            if !self
                .ledger
                .update_envelope(current.record_id, current.revision, &envelope)
                .await?
            {
                tracing::warn!(
                    "Record {} changed concurrently, re-reading before reconciling",
                    current.record_id
                );
                current = self.ledger.get_by_record_id(current.record_id).await?;
                continue;
            }

            let updated = TransactionRecord {
                envelope,
                revision: current.revision + 1,
                ..current
            };
            tracing::info!(
                "Transaction {} moved from {} to {}",
                updated.transaction_id,
                previous,
                status
            );

            let notified = if previous.is_pending() {
                self.notify_resolved(ctx, &updated, status).await
            } else {
                tracing::info!(
                    "Transaction {} was {} before this update, host not notified",
                    updated.transaction_id,
                    previous
                );
                false
            };

            return Ok(Reconciled::Transitioned {
                record: updated,
                previous,
                notified,
            });
        }

        tracing::warn!(
            "Gave up reconciling record {} after {} concurrent updates",
            current.record_id,
            MAX_RECONCILE_ATTEMPTS
        );
        let latest = self.ledger.get_by_record_id(current.record_id).await?;
        Ok(Reconciled::Unchanged(latest))
    }

    async fn notify_resolved(
        &self,
        ctx: &CallContext,
        record: &TransactionRecord,
        status: CanonicalStatus,
    ) -> bool {
        let success = status == CanonicalStatus::Processed;
        match self
            .host
            .notify_pending_transaction_resolved(
                ctx,
                record.account_id,
                &record.to_result(),
                success,
            )
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "Notified host that transaction {} resolved (success={})",
                    record.transaction_id,
                    success
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    "Failed to notify host for transaction {}: {}",
                    record.transaction_id,
                    e
                );
                false
            }
        }
    }
}
