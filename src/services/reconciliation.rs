//! Bringing pending ledger records up to date from webhooks and polling.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::orchestrator::{PaymentError, PaymentOrchestrator, Reconciled};
use crate::domain::{
    CallContext, CanonicalStatus, NotificationUpdate, OutcomeEnvelope, TransactionRecord, ValueExt,
};
use crate::gateway::payloads;

const PAYMENT_RESOURCE: &str = "payment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationDisposition {
    /// The notification moved a transaction to a new status.
    Applied,
    /// The transaction already had the notified status.
    Unchanged,
    /// No ledger record matches the notified ids.
    UnknownTransaction,
    /// Not a payment notification, or nothing actionable in it.
    Ignored,
}

/// Result of processing one webhook body.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub disposition: NotificationDisposition,
    pub notification_id: Option<String>,
    pub notification_kind: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub gateway_reference_id: Option<String>,
    pub payment_id: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
    pub previous_status: Option<CanonicalStatus>,
    pub new_status: Option<CanonicalStatus>,
    pub host_notified: bool,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
}

impl NotificationOutcome {
    fn new(disposition: NotificationDisposition, notification: &Value) -> Self {
        Self {
            disposition,
            notification_id: notification.get_string("id"),
            notification_kind: notification.get_string("kind"),
            gateway_transaction_id: None,
            gateway_reference_id: None,
            payment_id: None,
            transaction_id: None,
            previous_status: None,
            new_status: None,
            host_notified: false,
            result_code: None,
            result_description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshFailure {
    pub transaction_id: Uuid,
    pub error: String,
}

/// Summary of one polling refresh over a payment.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub payment_id: Uuid,
    pub examined: usize,
    pub updated: Vec<Uuid>,
    pub unchanged: usize,
    pub notified: usize,
    pub failures: Vec<RefreshFailure>,
}

impl PaymentOrchestrator {
    /// Applies a gateway webhook body.
    ///
    /// Notifications for unknown transactions are accepted and ignored so the
    /// gateway does not keep retrying them.
    pub async fn handle_webhook_body(
        &self,
        ctx: &CallContext,
        raw: &str,
    ) -> Result<NotificationOutcome, PaymentError> {
        let notification: Value = serde_json::from_str(raw)
            .map_err(|e| PaymentError::InvalidNotification(format!("invalid JSON: {}", e)))?;
        if !notification.is_object() {
            return Err(PaymentError::InvalidNotification(
                "notification is not an object".to_string(),
            ));
        }

        let resource_type = notification.get_string("resource_type");
        tracing::info!(
            "Notification: id={:?}, type={:?}, kind={:?}",
            notification.get_string("id"),
            resource_type,
            notification.get_string("kind")
        );

        let resource = match notification.get_nested("resource") {
            Some(resource) => resource,
            None => {
                tracing::warn!("Notification {:?} has no resource", notification.get_string("id"));
                return Ok(NotificationOutcome::new(
                    NotificationDisposition::Ignored,
                    &notification,
                ));
            }
        };
        if resource_type.as_deref() != Some(PAYMENT_RESOURCE) {
            tracing::warn!("Unhandled notification resource_type {:?}", resource_type);
            return Ok(NotificationOutcome::new(NotificationDisposition::Ignored, &notification));
        }

        let gateway_id = resource.get_string("id").ok_or_else(|| {
            PaymentError::InvalidNotification(
                "payment notification without resource id".to_string(),
            )
        })?;
        let reference_id = resource.get_string("reference_id");
        let result = resource.get_nested("result");

        let mut outcome = NotificationOutcome::new(NotificationDisposition::Ignored, &notification);
        outcome.gateway_transaction_id = Some(gateway_id.clone());
        outcome.gateway_reference_id = reference_id.clone();
        outcome.result_code = result.and_then(|r| r.get_string("code"));
        outcome.result_description = result.and_then(|r| r.get_string("description"));

        let state = match resource.get_string("state") {
            Some(state) => state,
            None => {
                tracing::warn!("Payment notification for {} carries no state", gateway_id);
                return Ok(outcome);
            }
        };

        let record = match self
            .locate_notified_record(ctx, &gateway_id, reference_id.as_deref())
            .await?
        {
            Some(record) => record,
            None => {
                tracing::warn!(
                    "Received notification for unknown gateway transaction {} (reference {:?})",
                    gateway_id,
                    reference_id
                );
                outcome.disposition = NotificationDisposition::UnknownTransaction;
                return Ok(outcome);
            }
        };

        outcome.payment_id = Some(record.payment_id);
        outcome.transaction_id = Some(record.transaction_id);
        outcome.previous_status = Some(record.status());

        let kind = notification.get_string("kind");
        let notification_id = notification.get_string("id");
        let update = NotificationUpdate {
            state: &state,
            kind: kind.as_deref(),
            notification_id: notification_id.as_deref(),
            result,
            transaction: resource.get_nested("transaction"),
            processed_at: ctx.now,
        };

        let reconciled = self
            .reconcile_record(ctx, record, |envelope| {
                envelope.merged_with_notification(&update)
            })
            .await?;

        match &reconciled {
            Reconciled::Unchanged(record) => {
                outcome.disposition = NotificationDisposition::Unchanged;
                outcome.new_status = Some(record.status());
            }
            Reconciled::Transitioned {
                record,
                previous,
                notified,
            } => {
                outcome.disposition = NotificationDisposition::Applied;
                outcome.previous_status = Some(*previous);
                outcome.new_status = Some(record.status());
                outcome.host_notified = *notified;
            }
        }
        Ok(outcome)
    }

    /// By gateway transaction id, then by records pointing back at it, then by
    /// the notification's own reference id.
    async fn locate_notified_record(
        &self,
        ctx: &CallContext,
        gateway_id: &str,
        reference_id: Option<&str>,
    ) -> Result<Option<TransactionRecord>, PaymentError> {
        if let Some(record) = self
            .ledger
            .find_by_gateway_transaction_id(ctx.tenant_id, gateway_id)
            .await?
        {
            return Ok(Some(record));
        }
        if let Some(record) = self
            .ledger
            .find_by_gateway_reference_id(ctx.tenant_id, gateway_id)
            .await?
        {
            return Ok(Some(record));
        }
        match reference_id {
            Some(reference) => {
                tracing::info!(
                    "Gateway id {} not found, trying reference id {}",
                    gateway_id,
                    reference
                );
                Ok(self
                    .ledger
                    .find_by_gateway_transaction_id(ctx.tenant_id, reference)
                    .await?)
            }
            None => Ok(None),
        }
    }

    /// Re-fetches every locally PENDING record of a payment from the gateway.
    /// A failure on one record is reported and does not stop the others.
    pub async fn refresh_pending(
        &self,
        ctx: &CallContext,
        payment_id: Uuid,
    ) -> Result<RefreshReport, PaymentError> {
        let records = self.ledger.list_by_payment_id(ctx.tenant_id, payment_id).await?;
        let pending: Vec<TransactionRecord> = records
            .into_iter()
            .filter(|r| r.status().is_pending())
            .collect();

        let mut report = RefreshReport {
            payment_id,
            examined: pending.len(),
            updated: Vec::new(),
            unchanged: 0,
            notified: 0,
            failures: Vec::new(),
        };

        for record in pending {
            let transaction_id = record.transaction_id;
            match self.refresh_record(ctx, record).await {
                Ok(Reconciled::Transitioned { notified, .. }) => {
                    report.updated.push(transaction_id);
                    if notified {
                        report.notified += 1;
                    }
                }
                Ok(Reconciled::Unchanged(_)) => report.unchanged += 1,
                Err(e) => {
                    tracing::error!("Failed to refresh transaction {}: {}", transaction_id, e);
                    report.failures.push(RefreshFailure {
                        transaction_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Replaces a record's envelope with the gateway's current view of it.
    pub(super) async fn refresh_record(
        &self,
        ctx: &CallContext,
        record: TransactionRecord,
    ) -> Result<Reconciled, PaymentError> {
        let gateway_id = match record.gateway_transaction_id.clone() {
            Some(id) => id,
            None => {
                tracing::warn!(
                    "Transaction {} has no gateway id, nothing to refresh",
                    record.transaction_id
                );
                return Ok(Reconciled::Unchanged(record));
            }
        };

        let response = self
            .gateway
            .get(&payloads::payment_resource_path(&gateway_id))
            .await?;
        let fetched = OutcomeEnvelope::from_value(response.require_success()?);

        self.reconcile_record(ctx, record, |_| fetched.clone()).await
    }
}
