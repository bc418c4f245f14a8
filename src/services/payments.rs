//! Initiation, follow-up operations and read paths.

use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::orchestrator::{PaymentError, PaymentOrchestrator, NONCE_CALLBACK_PATH};
use crate::domain::{
    CallContext, CanonicalStatus, NewTransactionRecord, OutcomeEnvelope, TransactionKind,
    TransactionRecord, TransactionResult, ValueExt,
};
use crate::gateway::payloads::{self, FundingInstrument, PaymentRequest, PaymentSnapshot};
use crate::gateway::{GatewayError, GatewayResponse};
use crate::ports::{HostAccount, Page};

/// Caller property naming the gateway transaction to act on.
pub const TRANSACTION_ID_PROPERTY: &str = "ompay_transaction_id";
/// Fallback caller property naming the original gateway transaction.
pub const ORIGINAL_TRANSACTION_ID_PROPERTY: &str = "ompay_original_transaction_id";
pub const INVOICE_NUMBER_PROPERTY: &str = "invoice_number";

#[derive(Debug, Clone, Default)]
pub struct PaymentOptions {
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    pub force_3ds: bool,
    pub description: Option<String>,
    pub invoice_number: Option<String>,
}

/// An AUTHORIZE or PURCHASE request.
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub kind: TransactionKind,
    pub account_id: Uuid,
    pub payment_id: Uuid,
    pub transaction_id: Uuid,
    /// Stored card to charge when no nonce is given.
    pub payment_method_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub currency: String,
    pub nonce: Option<String>,
    pub options: PaymentOptions,
}

/// A CAPTURE, VOID or REFUND request.
#[derive(Debug, Clone)]
pub struct FollowUpRequest {
    pub account_id: Uuid,
    pub payment_id: Uuid,
    pub transaction_id: Uuid,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub properties: Map<String, Value>,
}

/// What the hosted card form needs to tokenize a card.
#[derive(Debug, Clone, Serialize)]
pub struct FormDescriptor {
    pub client_token: String,
    pub form_action_url: String,
    pub account_id: Uuid,
    pub is_sandbox: bool,
}

struct Originating {
    gateway_transaction_id: String,
    record: Option<TransactionRecord>,
}

fn default_description(kind: TransactionKind) -> Option<&'static str> {
    match kind {
        TransactionKind::Capture => Some("Capture Processed"),
        TransactionKind::Void => Some("Void Processed"),
        TransactionKind::Refund => Some("Refund Processed"),
        _ => None,
    }
}

/// Kinds and gateway states that can be acted on by `kind`, in priority order.
fn originating_candidates(kind: TransactionKind) -> &'static [(TransactionKind, &'static str)] {
    match kind {
        TransactionKind::Capture | TransactionKind::Void => {
            &[(TransactionKind::Authorize, "authorised")]
        }
        TransactionKind::Refund => &[
            (TransactionKind::Capture, "captured"),
            (TransactionKind::Purchase, "captured"),
            (TransactionKind::Purchase, "authorised"),
        ],
        _ => &[],
    }
}

fn structured_value(response: &GatewayResponse) -> Result<Value, GatewayError> {
    response.value().cloned().ok_or_else(|| {
        GatewayError::MalformedResponse(format!(
            "no structured body in response with status {}",
            response.status
        ))
    })
}

impl PaymentOrchestrator {
    pub async fn authorize(
        &self,
        ctx: &CallContext,
        mut request: InitiateRequest,
    ) -> Result<TransactionResult, PaymentError> {
        request.kind = TransactionKind::Authorize;
        self.initiate(ctx, request).await
    }

    pub async fn purchase(
        &self,
        ctx: &CallContext,
        mut request: InitiateRequest,
    ) -> Result<TransactionResult, PaymentError> {
        request.kind = TransactionKind::Purchase;
        self.initiate(ctx, request).await
    }

    /// Submits an AUTHORIZE or PURCHASE and records the gateway's answer.
    ///
    /// Without a nonce or stored payment method this is a status re-check of
    /// the existing ledger entry for the transaction.
    pub async fn initiate(
        &self,
        ctx: &CallContext,
        request: InitiateRequest,
    ) -> Result<TransactionResult, PaymentError> {
        if !matches!(request.kind, TransactionKind::Authorize | TransactionKind::Purchase) {
            return Err(PaymentError::InvalidRequest(format!(
                "{} cannot be initiated",
                request.kind
            )));
        }

        let instrument = match (&request.nonce, request.payment_method_id) {
            (Some(nonce), _) if !nonce.trim().is_empty() => FundingInstrument::Nonce(nonce.clone()),
            (_, Some(pm_id)) => {
                let method = self
                    .vault
                    .get_by_payment_method_id(ctx.tenant_id, pm_id)
                    .await?
                    .ok_or(PaymentError::PaymentMethodNotFound(pm_id))?;
                FundingInstrument::StoredCard {
                    card_id: method.gateway_card_id,
                    payer_id: method.gateway_payer_id,
                }
            }
            _ => return self.recheck_status(ctx, request.transaction_id).await,
        };

        let payer = self.host_account(ctx, request.account_id).await;
        let body = payloads::payment_body(&PaymentRequest {
            kind: request.kind,
            amount: &request.amount,
            currency: &request.currency,
            instrument,
            payer: payer.as_ref(),
            invoice_number: request
                .options
                .invoice_number
                .clone()
                .unwrap_or_else(|| request.payment_id.to_string()),
            description: request.options.description.clone(),
            return_url: request.options.return_url.clone(),
            cancel_url: request.options.cancel_url.clone(),
            force_3ds: request.options.force_3ds,
        });

        let response = self.gateway.post(&payloads::payment_path(), &body).await?;
        let value = structured_value(&response)?;
        let snapshot = PaymentSnapshot::read(&value);
        let envelope = OutcomeEnvelope::from_value(value).with_http_status(response.status);

        let record = self
            .ledger
            .insert(NewTransactionRecord {
                account_id: request.account_id,
                payment_id: request.payment_id,
                transaction_id: request.transaction_id,
                tenant_id: ctx.tenant_id,
                kind: request.kind,
                amount: Some(request.amount.clone()),
                currency: Some(request.currency.clone()),
                gateway_transaction_id: snapshot.id.clone(),
                gateway_reference_id: snapshot.reference_id.clone(),
                gateway_payer_id: snapshot.payer_id.clone(),
                gateway_card_id: snapshot.card_id.clone(),
                envelope,
                created_at: ctx.now,
            })
            .await?;

        let result = record.to_result();
        tracing::info!(
            "{} for payment {} recorded as {} (gateway id {:?}, state {:?})",
            request.kind,
            request.payment_id,
            result.status,
            snapshot.id,
            snapshot.state
        );

        if result.status == CanonicalStatus::Processed {
            self.enroll_from_payment(ctx, request.account_id, &snapshot).await;
        }

        Ok(result)
    }

    async fn recheck_status(
        &self,
        ctx: &CallContext,
        transaction_id: Uuid,
    ) -> Result<TransactionResult, PaymentError> {
        let record = self
            .ledger
            .find_latest_by_transaction_id(ctx.tenant_id, transaction_id)
            .await?
            .ok_or(PaymentError::TransactionNotFound(transaction_id))?;

        if record.status().is_pending() {
            tracing::info!("Transaction {} is pending, refreshing from gateway", transaction_id);
            let reconciled = self.refresh_record(ctx, record).await?;
            return Ok(reconciled.record().to_result());
        }
        Ok(record.to_result())
    }

    /// Best-effort payer details; a failed lookup leaves them out of the payload.
    async fn host_account(&self, ctx: &CallContext, account_id: Uuid) -> Option<HostAccount> {
        match self.host.get_account(ctx, account_id).await {
            Ok(account) => Some(account),
            Err(e) => {
                tracing::warn!("Could not load host account {}: {}", account_id, e);
                None
            }
        }
    }

    pub async fn capture(
        &self,
        ctx: &CallContext,
        request: FollowUpRequest,
    ) -> Result<TransactionResult, PaymentError> {
        self.follow_up(ctx, TransactionKind::Capture, request).await
    }

    pub async fn void(
        &self,
        ctx: &CallContext,
        request: FollowUpRequest,
    ) -> Result<TransactionResult, PaymentError> {
        self.follow_up(ctx, TransactionKind::Void, request).await
    }

    pub async fn refund(
        &self,
        ctx: &CallContext,
        request: FollowUpRequest,
    ) -> Result<TransactionResult, PaymentError> {
        self.follow_up(ctx, TransactionKind::Refund, request).await
    }

    async fn follow_up(
        &self,
        ctx: &CallContext,
        kind: TransactionKind,
        request: FollowUpRequest,
    ) -> Result<TransactionResult, PaymentError> {
        let amount = match kind {
            TransactionKind::Void => None,
            _ => Some(request.amount.clone().ok_or_else(|| {
                PaymentError::InvalidRequest(format!("{} requires an amount", kind))
            })?),
        };

        let originating = self
            .find_originating(ctx, kind, request.payment_id, &request.properties)
            .await?
            .ok_or(PaymentError::MissingOriginatingTransaction {
                kind,
                payment_id: request.payment_id,
            })?;

        let invoice_number = request
            .properties
            .get_string(INVOICE_NUMBER_PROPERTY)
            .unwrap_or_else(|| request.payment_id.to_string());
        let body = match &amount {
            Some(amount) => payloads::amount_body(amount, &invoice_number),
            None => payloads::void_body(&invoice_number),
        };
        let path = payloads::follow_up_path(&originating.gateway_transaction_id, kind);

        let response = self.gateway.post(&path, &body).await?;
        let value = structured_value(&response)?;
        let snapshot = PaymentSnapshot::read(&value);
        let envelope = OutcomeEnvelope::from_value(value).with_http_status(response.status);

        let original = originating.record.as_ref();
        let record = self
            .ledger
            .insert(NewTransactionRecord {
                account_id: request.account_id,
                payment_id: request.payment_id,
                transaction_id: request.transaction_id,
                tenant_id: ctx.tenant_id,
                kind,
                amount: amount.clone(),
                currency: request
                    .currency
                    .clone()
                    .or_else(|| original.and_then(|r| r.currency.clone())),
                gateway_transaction_id: snapshot.id.clone(),
                gateway_reference_id: Some(originating.gateway_transaction_id.clone()),
                gateway_payer_id: snapshot
                    .payer_id
                    .clone()
                    .or_else(|| original.and_then(|r| r.gateway_payer_id.clone())),
                gateway_card_id: snapshot
                    .card_id
                    .clone()
                    .or_else(|| original.and_then(|r| r.gateway_card_id.clone())),
                envelope,
                created_at: ctx.now,
            })
            .await?;

        let mut result = record.to_result();
        if result.status == kind.success_status() && result.gateway_error.is_none() {
            result.gateway_error = default_description(kind).map(str::to_string);
        }

        tracing::info!(
            "{} of gateway transaction {} for payment {} recorded as {}",
            kind,
            originating.gateway_transaction_id,
            request.payment_id,
            result.status
        );
        Ok(result)
    }

    /// Caller-supplied gateway id first, then the newest successful ledger record.
    async fn find_originating(
        &self,
        ctx: &CallContext,
        kind: TransactionKind,
        payment_id: Uuid,
        properties: &Map<String, Value>,
    ) -> Result<Option<Originating>, PaymentError> {
        let explicit = properties
            .get_string(TRANSACTION_ID_PROPERTY)
            .or_else(|| properties.get_string(ORIGINAL_TRANSACTION_ID_PROPERTY));
        if let Some(gateway_transaction_id) = explicit {
            let record = self
                .ledger
                .find_by_gateway_transaction_id(ctx.tenant_id, &gateway_transaction_id)
                .await?;
            return Ok(Some(Originating {
                gateway_transaction_id,
                record,
            }));
        }

        for (candidate_kind, state) in originating_candidates(kind) {
            let records = self
                .ledger
                .list_by_payment_and_kind(ctx.tenant_id, payment_id, *candidate_kind)
                .await?;
            let found = records.into_iter().find_map(|record| {
                if !record.envelope.has_state(state) {
                    return None;
                }
                record
                    .gateway_transaction_id
                    .clone()
                    .map(|gateway_transaction_id| Originating {
                        gateway_transaction_id,
                        record: Some(record),
                    })
            });
            if found.is_some() {
                return Ok(found);
            }
        }

        tracing::warn!("No originating transaction for {} on payment {}", kind, payment_id);
        Ok(None)
    }

    /// Every ledger record of a payment, oldest first.
    pub async fn get_payment_info(
        &self,
        ctx: &CallContext,
        payment_id: Uuid,
        refresh: bool,
    ) -> Result<Vec<TransactionResult>, PaymentError> {
        if refresh {
            match self.refresh_pending(ctx, payment_id).await {
                Ok(report) => tracing::info!(
                    "Refreshed payment {}: {} examined, {} updated",
                    payment_id,
                    report.examined,
                    report.updated.len()
                ),
                Err(e) => tracing::warn!("Refresh of payment {} failed: {}", payment_id, e),
            }
        }

        let records = self.ledger.list_by_payment_id(ctx.tenant_id, payment_id).await?;
        Ok(records.iter().map(TransactionRecord::to_result).collect())
    }

    pub async fn search_payments(
        &self,
        ctx: &CallContext,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Page<TransactionResult>, PaymentError> {
        let total = self.ledger.count(ctx.tenant_id, key).await?;
        let records = self.ledger.search(ctx.tenant_id, key, offset, limit).await?;
        let items = records.iter().map(TransactionRecord::to_result).collect();
        Ok(Page::new(offset, total, items))
    }

    /// Obtains a client token and describes where the form should post its nonce.
    pub async fn build_form_descriptor(
        &self,
        _ctx: &CallContext,
        account_id: Uuid,
    ) -> Result<FormDescriptor, PaymentError> {
        let response = self
            .gateway
            .post(payloads::CLIENT_TOKEN_PATH, &payloads::client_token_body())
            .await?;
        let value = response.require_success()?;
        let client_token = payloads::read_access_token(&value).ok_or_else(|| {
            GatewayError::MalformedResponse("client token response has no accessToken".to_string())
        })?;

        Ok(FormDescriptor {
            client_token,
            form_action_url: format!(
                "{}{}",
                self.settings.host_base_url.trim_end_matches('/'),
                NONCE_CALLBACK_PATH
            ),
            account_id,
            is_sandbox: self.settings.is_sandbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_candidates_prefer_capture() {
        let candidates = originating_candidates(TransactionKind::Refund);
        assert_eq!(candidates[0], (TransactionKind::Capture, "captured"));
        assert_eq!(candidates[2], (TransactionKind::Purchase, "authorised"));
    }

    #[test]
    fn test_capture_and_void_use_authorization() {
        for kind in [TransactionKind::Capture, TransactionKind::Void] {
            assert_eq!(
                originating_candidates(kind),
                &[(TransactionKind::Authorize, "authorised")]
            );
        }
        assert!(originating_candidates(TransactionKind::Purchase).is_empty());
    }

    #[test]
    fn test_default_descriptions() {
        assert_eq!(default_description(TransactionKind::Void), Some("Void Processed"));
        assert_eq!(default_description(TransactionKind::Authorize), None);
    }
}
