//! Vault entities. Only gateway-issued identifiers are stored, never card numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::value::ValueExt;

/// Display-only card details kept beside a vault entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_data: Option<Value>,
}

impl CardMetadata {
    /// Reads card details from a gateway credit-card object.
    pub fn from_gateway_card(card: &Map<String, Value>) -> Self {
        Self {
            card_type: card.get_string("type").or_else(|| card.get_string("card_type")),
            last4: card.get_string("last4"),
            expire_month: card.get_string("expire_month"),
            expire_year: card.get_string("expire_year"),
            name: card.get_string("name"),
            bin_data: card.get("bin_data").filter(|v| !v.is_null()).cloned(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Lenient read of a stored blob; unknown keys are ignored.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodRecord {
    pub record_id: i64,
    pub account_id: Uuid,
    pub payment_method_id: Uuid,
    pub tenant_id: Uuid,
    pub gateway_card_id: String,
    pub gateway_payer_id: String,
    pub is_default: bool,
    pub is_deleted: bool,
    pub metadata: CardMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub account_id: Uuid,
    pub payment_method_id: Uuid,
    pub tenant_id: Uuid,
    pub gateway_card_id: String,
    pub gateway_payer_id: String,
    pub is_default: bool,
    pub metadata: CardMetadata,
}

/// A card as reported by the gateway's card listing.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCard {
    pub card_id: String,
    pub is_default: bool,
    pub metadata: CardMetadata,
}

impl GatewayCard {
    pub fn from_value(card: &Map<String, Value>) -> Option<Self> {
        let card_id = card.get_string("id")?;
        Some(Self {
            card_id,
            is_default: card.get_bool("is_default").unwrap_or(false),
            metadata: CardMetadata::from_gateway_card(card),
        })
    }
}
