//! The outcome envelope: the gateway's latest full response for one ledger record.
//!
//! This is the only mutable part of a transaction record. It is always written
//! wholesale; unknown fields are carried through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::{map_optional_state, CanonicalStatus};
use super::transaction::TransactionKind;
use super::value::ValueExt;

/// Set when the call that produced the envelope did not return 2xx.
pub const HTTP_STATUS_KEY: &str = "http_status";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeEnvelope(Map<String, Value>);

/// Fields of a gateway notification merged into an existing envelope.
#[derive(Debug, Clone)]
pub struct NotificationUpdate<'a> {
    pub state: &'a str,
    pub kind: Option<&'a str>,
    pub notification_id: Option<&'a str>,
    pub result: Option<&'a Map<String, Value>>,
    pub transaction: Option<&'a Map<String, Value>>,
    pub processed_at: DateTime<Utc>,
}

impl OutcomeEnvelope {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Builds an envelope from any JSON value; non-objects are kept under `rawResponse`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::default(),
            other => {
                let mut map = Map::new();
                map.insert("rawResponse".to_string(), other);
                Self(map)
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn state(&self) -> Option<String> {
        self.0.get_string("state")
    }

    /// Canonical status implied by the recorded gateway state.
    pub fn status(&self) -> CanonicalStatus {
        map_optional_state(self.state().as_deref())
    }

    /// Status of a `kind` interaction: a failed HTTP call that did not reach
    /// the kind's success status is an error, whatever its state says.
    pub fn status_for(&self, kind: TransactionKind) -> CanonicalStatus {
        let status = self.status();
        let call_failed = self
            .0
            .get(HTTP_STATUS_KEY)
            .and_then(Value::as_u64)
            .map(|code| !(200..300).contains(&code))
            .unwrap_or(false);
        if call_failed && status != kind.success_status() {
            CanonicalStatus::Error
        } else {
            status
        }
    }

    /// Records the HTTP status of the originating call when it was not 2xx.
    pub fn with_http_status(mut self, http_status: u16) -> Self {
        if !(200..300).contains(&http_status) {
            self.0
                .insert(HTTP_STATUS_KEY.to_string(), Value::from(http_status));
        }
        self
    }

    pub fn result_code(&self) -> Option<String> {
        self.0.get_nested("result").and_then(|r| r.get_string("code"))
    }

    pub fn result_description(&self) -> Option<String> {
        self.0
            .get_nested("result")
            .and_then(|r| r.get_string("description").or_else(|| r.get_string("message")))
    }

    pub fn gateway_transaction_id(&self) -> Option<String> {
        self.0.get_string("id")
    }

    pub fn reference_id(&self) -> Option<String> {
        self.0.get_string("reference_id")
    }

    pub fn authenticate_url(&self) -> Option<String> {
        self.three_ds_field("authenticate_url")
    }

    pub fn redirect_url(&self) -> Option<String> {
        self.three_ds_field("redirect_url")
    }

    fn three_ds_field(&self, key: &str) -> Option<String> {
        self.0
            .get_string(key)
            .or_else(|| self.0.get_nested("three_ds").and_then(|t| t.get_string(key)))
    }

    /// Whether the recorded state equals `state`, ignoring case.
    pub fn has_state(&self, state: &str) -> bool {
        self.state()
            .map(|s| s.eq_ignore_ascii_case(state))
            .unwrap_or(false)
    }

    /// Top-level scalar fields, exposed to callers as transaction properties.
    pub fn scalar_properties(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(_, v)| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns a copy with the notification's state, result and metadata merged in.
    pub fn merged_with_notification(&self, update: &NotificationUpdate<'_>) -> Self {
        let mut map = self.0.clone();
        map.remove(HTTP_STATUS_KEY);
        map.insert("state".to_string(), Value::String(update.state.to_string()));
        if let Some(kind) = update.kind {
            map.insert("notification_kind".to_string(), Value::String(kind.to_string()));
        }
        if let Some(id) = update.notification_id {
            map.insert("notification_id".to_string(), Value::String(id.to_string()));
        }
        map.insert(
            "notification_processed_time".to_string(),
            Value::String(update.processed_at.to_rfc3339()),
        );
        if let Some(result) = update.result {
            map.insert("result".to_string(), Value::Object(result.clone()));
        }
        if let Some(transaction) = update.transaction {
            if transaction.get("amount").map(Value::is_object).unwrap_or(false) {
                map.insert("transaction".to_string(), Value::Object(transaction.clone()));
            }
        }
        Self(map)
    }
}
