//! Card vault operations.

use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use super::orchestrator::{PaymentError, PaymentOrchestrator};
use crate::domain::{
    CallContext, CardMetadata, GatewayCard, NewPaymentMethod, PaymentMethodRecord,
};
use crate::gateway::payloads::{self, PaymentSnapshot};
use crate::ports::Page;

/// Counts from one vault synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Host-initiated enrollment of a gateway card.
#[derive(Debug, Clone)]
pub struct AddPaymentMethod {
    pub account_id: Uuid,
    pub payment_method_id: Uuid,
    pub gateway_card_id: String,
    pub gateway_payer_id: String,
    pub metadata: CardMetadata,
    pub set_default: bool,
}

impl PaymentOrchestrator {
    /// Stores a card; a card already enrolled for the account is returned as is.
    pub async fn enroll(
        &self,
        ctx: &CallContext,
        method: AddPaymentMethod,
    ) -> Result<PaymentMethodRecord, PaymentError> {
        if let Some(existing) = self
            .vault
            .find_by_card_id(ctx.tenant_id, method.account_id, &method.gateway_card_id)
            .await?
        {
            tracing::info!(
                "Card {} already enrolled for account {} as {}",
                method.gateway_card_id,
                method.account_id,
                existing.payment_method_id
            );
            return Ok(existing);
        }

        if method.set_default {
            self.vault.clear_default(ctx.tenant_id, method.account_id).await?;
        }
        let record = self
            .vault
            .insert(NewPaymentMethod {
                account_id: method.account_id,
                payment_method_id: method.payment_method_id,
                tenant_id: ctx.tenant_id,
                gateway_card_id: method.gateway_card_id,
                gateway_payer_id: method.gateway_payer_id,
                is_default: method.set_default,
                metadata: method.metadata,
            })
            .await?;

        tracing::info!(
            "Enrolled payment method {} (card {}, payer {}) for account {}, default={}",
            record.payment_method_id,
            record.gateway_card_id,
            record.gateway_payer_id,
            record.account_id,
            record.is_default
        );
        Ok(record)
    }

    pub async fn add_payment_method(
        &self,
        ctx: &CallContext,
        method: AddPaymentMethod,
    ) -> Result<PaymentMethodRecord, PaymentError> {
        if method.gateway_card_id.trim().is_empty() {
            return Err(PaymentError::InvalidRequest(
                "gateway card id is required".to_string(),
            ));
        }
        self.enroll(ctx, method).await
    }

    /// Vault enrollment after a processed payment. Never fails the payment.
    pub(super) async fn enroll_from_payment(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        snapshot: &PaymentSnapshot,
    ) {
        let (card_id, payer_id) = match (&snapshot.card_id, &snapshot.payer_id) {
            (Some(card), Some(payer)) => (card.clone(), payer.clone()),
            _ => return,
        };

        match self.vault.find_by_card_id(ctx.tenant_id, account_id, &card_id).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Vault lookup for card {} failed: {}", card_id, e);
                return;
            }
        }

        let payment_method_id = match self
            .host
            .register_payment_method(ctx, account_id, &card_id, &snapshot.card.to_value())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    "Host refused to register card {} for account {}: {}",
                    card_id,
                    account_id,
                    e
                );
                return;
            }
        };

        let has_default = match self.vault.list_for_account(ctx.tenant_id, account_id).await {
            Ok(methods) => methods.iter().any(|m| m.is_default),
            Err(e) => {
                tracing::error!("Could not list payment methods for {}: {}", account_id, e);
                return;
            }
        };

        let enrolled = self
            .enroll(
                ctx,
                AddPaymentMethod {
                    account_id,
                    payment_method_id,
                    gateway_card_id: card_id.clone(),
                    gateway_payer_id: payer_id,
                    metadata: snapshot.card.clone(),
                    set_default: !has_default,
                },
            )
            .await;
        if let Err(e) = enrolled {
            tracing::error!("Failed to enroll card {} for account {}: {}", card_id, account_id, e);
        }
    }

    /// Makes the payer's local cards mirror `cards`.
    pub async fn synchronize(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        gateway_payer_id: &str,
        cards: &[GatewayCard],
    ) -> Result<SyncReport, PaymentError> {
        let mut local = self
            .vault
            .list_for_payer(ctx.tenant_id, account_id, gateway_payer_id)
            .await?;

        let mut seen = HashSet::new();
        let cards: Vec<&GatewayCard> = cards
            .iter()
            .filter(|c| seen.insert(c.card_id.clone()))
            .collect();
        // The account may only hold one default; the first one reported wins.
        let default_card = cards.iter().find(|c| c.is_default).map(|c| c.card_id.clone());
        if default_card.is_some() {
            self.vault.clear_default(ctx.tenant_id, account_id).await?;
        }

        let mut report = SyncReport::default();
        for card in cards {
            let is_default = default_card.as_deref() == Some(card.card_id.as_str());
            match local.iter().position(|m| m.gateway_card_id == card.card_id) {
                Some(index) => {
                    let existing = local.swap_remove(index);
                    self.vault
                        .update_card(existing.record_id, &card.metadata, is_default)
                        .await?;
                    report.updated += 1;
                }
                None => {
                    self.vault
                        .insert(NewPaymentMethod {
                            account_id,
                            payment_method_id: Uuid::new_v4(),
                            tenant_id: ctx.tenant_id,
                            gateway_card_id: card.card_id.clone(),
                            gateway_payer_id: gateway_payer_id.to_string(),
                            is_default,
                            metadata: card.metadata.clone(),
                        })
                        .await?;
                    report.inserted += 1;
                }
            }
        }

        for stale in local {
            self.vault.soft_delete_record(stale.record_id).await?;
            tracing::info!(
                "Marked payment method {} deleted, card {} no longer at gateway for payer {}",
                stale.payment_method_id,
                stale.gateway_card_id,
                gateway_payer_id
            );
            report.removed += 1;
        }

        Ok(report)
    }

    /// Fetches the payer's cards from the gateway and mirrors them locally.
    pub async fn refresh_payment_methods(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
    ) -> Result<Option<SyncReport>, PaymentError> {
        let payer_id = match self.vault.payer_id_for_account(ctx.tenant_id, account_id).await? {
            Some(payer) => payer,
            None => {
                tracing::info!(
                    "Account {} has no gateway payer yet, nothing to refresh",
                    account_id
                );
                return Ok(None);
            }
        };

        let response = self.gateway.get(&payloads::payer_cards_path(&payer_id)).await?;
        let cards = payloads::read_card_list(&response.require_success()?);
        let report = self.synchronize(ctx, account_id, &payer_id, &cards).await?;
        Ok(Some(report))
    }

    pub async fn list_payment_methods(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        refresh: bool,
    ) -> Result<Vec<PaymentMethodRecord>, PaymentError> {
        if refresh {
            if let Err(e) = self.refresh_payment_methods(ctx, account_id).await {
                tracing::warn!(
                    "Could not refresh payment methods for account {}: {}",
                    account_id,
                    e
                );
            }
        }
        Ok(self.vault.list_for_account(ctx.tenant_id, account_id).await?)
    }

    pub async fn get_payment_method(
        &self,
        ctx: &CallContext,
        payment_method_id: Uuid,
    ) -> Result<Option<PaymentMethodRecord>, PaymentError> {
        Ok(self
            .vault
            .get_by_payment_method_id(ctx.tenant_id, payment_method_id)
            .await?)
    }

    /// Removes the card at the gateway if possible, then always soft-deletes locally.
    pub async fn delete_payment_method(
        &self,
        ctx: &CallContext,
        payment_method_id: Uuid,
    ) -> Result<(), PaymentError> {
        let method = match self
            .vault
            .get_by_payment_method_id(ctx.tenant_id, payment_method_id)
            .await?
        {
            Some(method) => method,
            None => {
                tracing::warn!("Payment method {} not found or already deleted", payment_method_id);
                return Ok(());
            }
        };

        let path = payloads::payer_card_path(&method.gateway_payer_id, &method.gateway_card_id);
        match self.gateway.delete(&path).await {
            Ok(response) if response.is_success() => {
                tracing::info!("Deleted card {} at gateway", method.gateway_card_id)
            }
            Ok(response) if response.is_not_found() => tracing::info!(
                "Card {} already absent at gateway",
                method.gateway_card_id
            ),
            Ok(response) => tracing::warn!(
                "Gateway refused to delete card {} (status {}), deleting locally anyway",
                method.gateway_card_id,
                response.status
            ),
            Err(e) => tracing::warn!(
                "Gateway delete of card {} failed, deleting locally anyway: {}",
                method.gateway_card_id,
                e
            ),
        }

        self.vault.soft_delete(ctx.tenant_id, payment_method_id).await?;
        tracing::info!("Soft-deleted payment method {}", payment_method_id);
        Ok(())
    }

    /// Updates the payer's default at the gateway if possible, then always locally.
    pub async fn set_default_payment_method(
        &self,
        ctx: &CallContext,
        account_id: Uuid,
        payment_method_id: Uuid,
    ) -> Result<(), PaymentError> {
        let method = self
            .vault
            .get_by_payment_method_id(ctx.tenant_id, payment_method_id)
            .await?
            .filter(|m| m.account_id == account_id)
            .ok_or(PaymentError::PaymentMethodNotFound(payment_method_id))?;

        let body = payloads::default_card_body(&method.gateway_card_id);
        match self
            .gateway
            .put(&payloads::payer_path(&method.gateway_payer_id), &body)
            .await
        {
            Ok(response) if response.is_success() => tracing::info!(
                "Gateway default for payer {} set to card {}",
                method.gateway_payer_id,
                method.gateway_card_id
            ),
            Ok(response) => tracing::warn!(
                "Gateway refused default update for payer {} (status {})",
                method.gateway_payer_id,
                response.status
            ),
            Err(e) => tracing::warn!(
                "Gateway default update for payer {} failed: {}",
                method.gateway_payer_id,
                e
            ),
        }

        self.vault.clear_default(ctx.tenant_id, account_id).await?;
        self.vault.set_default(ctx.tenant_id, payment_method_id).await?;
        Ok(())
    }

    pub async fn search_payment_methods(
        &self,
        ctx: &CallContext,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Page<PaymentMethodRecord>, PaymentError> {
        let total = self.vault.count(ctx.tenant_id, key).await?;
        let items = self.vault.search(ctx.tenant_id, key, offset, limit).await?;
        Ok(Page::new(offset, total, items))
    }
}
