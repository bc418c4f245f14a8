//! Ledger entities.
//! One `TransactionRecord` per gateway interaction; only the envelope ever changes.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::envelope::OutcomeEnvelope;
use super::status::CanonicalStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Authorize,
    Purchase,
    Capture,
    Void,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Authorize => "AUTHORIZE",
            TransactionKind::Purchase => "PURCHASE",
            TransactionKind::Capture => "CAPTURE",
            TransactionKind::Void => "VOID",
            TransactionKind::Refund => "REFUND",
        }
    }

    /// Canonical status a successful call of this kind resolves to.
    pub fn success_status(&self) -> CanonicalStatus {
        match self {
            TransactionKind::Void => CanonicalStatus::Canceled,
            _ => CanonicalStatus::Processed,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction kind: {0}")]
pub struct UnknownTransactionKind(pub String);

impl FromStr for TransactionKind {
    type Err = UnknownTransactionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTHORIZE" => Ok(TransactionKind::Authorize),
            "PURCHASE" => Ok(TransactionKind::Purchase),
            "CAPTURE" => Ok(TransactionKind::Capture),
            "VOID" => Ok(TransactionKind::Void),
            "REFUND" => Ok(TransactionKind::Refund),
            _ => Err(UnknownTransactionKind(s.to_string())),
        }
    }
}

/// A persisted gateway interaction.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub record_id: i64,
    pub account_id: Uuid,
    pub payment_id: Uuid,
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub gateway_reference_id: Option<String>,
    pub gateway_payer_id: Option<String>,
    pub gateway_card_id: Option<String>,
    pub envelope: OutcomeEnvelope,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Status implied by the stored envelope.
    pub fn status(&self) -> CanonicalStatus {
        self.envelope.status_for(self.kind)
    }

    /// Projects the record into the caller-facing result.
    pub fn to_result(&self) -> TransactionResult {
        let status = self.status();
        self.to_result_with_status(status)
    }

    pub fn to_result_with_status(&self, status: CanonicalStatus) -> TransactionResult {
        TransactionResult {
            payment_id: self.payment_id,
            transaction_id: self.transaction_id,
            kind: self.kind,
            amount: self.amount.clone(),
            currency: self.currency.clone(),
            status,
            gateway_error: self.envelope.result_description(),
            gateway_error_code: self.envelope.result_code(),
            first_reference_id: self.gateway_transaction_id.clone(),
            second_reference_id: self.gateway_reference_id.clone(),
            created_at: self.created_at,
            authenticate_url: self.envelope.authenticate_url(),
            redirect_url: self.envelope.redirect_url(),
            properties: self.envelope.scalar_properties(),
        }
    }
}

/// Fields written once when a gateway interaction is recorded.
#[derive(Debug, Clone)]
pub struct NewTransactionRecord {
    pub account_id: Uuid,
    pub payment_id: Uuid,
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub gateway_reference_id: Option<String>,
    pub gateway_payer_id: Option<String>,
    pub gateway_card_id: Option<String>,
    pub envelope: OutcomeEnvelope,
    pub created_at: DateTime<Utc>,
}

/// Canonical outcome handed back to the host platform.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub payment_id: Uuid,
    pub transaction_id: Uuid,
    pub kind: TransactionKind,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub status: CanonicalStatus,
    pub gateway_error: Option<String>,
    pub gateway_error_code: Option<String>,
    pub first_reference_id: Option<String>,
    pub second_reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticate_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    pub properties: Map<String, Value>,
}

impl TransactionResult {
    /// URL the payer must visit to complete 3-D Secure, if any.
    pub fn three_ds_url(&self) -> Option<&str> {
        self.authenticate_url
            .as_deref()
            .or(self.redirect_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(envelope: Value) -> TransactionRecord {
        TransactionRecord {
            record_id: 1,
            account_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            kind: TransactionKind::Authorize,
            amount: Some(BigDecimal::from(10)),
            currency: Some("USD".to_string()),
            gateway_transaction_id: Some("pay_1".to_string()),
            gateway_reference_id: None,
            gateway_payer_id: None,
            gateway_card_id: None,
            envelope: OutcomeEnvelope::from_value(envelope),
            revision: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            TransactionKind::Authorize,
            TransactionKind::Purchase,
            TransactionKind::Capture,
            TransactionKind::Void,
            TransactionKind::Refund,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionKind>(), Ok(kind));
        }
        assert!("CREDIT".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_success_status_per_kind() {
        assert_eq!(TransactionKind::Void.success_status(), CanonicalStatus::Canceled);
        assert_eq!(TransactionKind::Refund.success_status(), CanonicalStatus::Processed);
    }

    #[test]
    fn test_to_result_reads_envelope() {
        let rec = record(json!({
            "state": "pending",
            "authenticate_url": "https://x",
            "result": {"code": "3DS", "description": "Challenge required"}
        }));
        let result = rec.to_result();
        assert_eq!(result.status, CanonicalStatus::Pending);
        assert_eq!(result.three_ds_url(), Some("https://x"));
        assert_eq!(result.gateway_error_code.as_deref(), Some("3DS"));
        assert_eq!(result.first_reference_id.as_deref(), Some("pay_1"));
    }
}
