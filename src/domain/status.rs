//! Canonical transaction status and the gateway state mapping.
//!
//! Every component classifies gateway outcomes through [`map_gateway_state`];
//! nothing else interprets raw state strings.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalStatus {
    Processed,
    Pending,
    Error,
    Canceled,
    Undefined,
}

impl CanonicalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStatus::Processed => "PROCESSED",
            CanonicalStatus::Pending => "PENDING",
            CanonicalStatus::Error => "ERROR",
            CanonicalStatus::Canceled => "CANCELED",
            CanonicalStatus::Undefined => "UNDEFINED",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CanonicalStatus::Pending)
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a gateway state string onto the canonical status set.
///
/// Case-insensitive and total: unrecognised states are logged and reported as
/// [`CanonicalStatus::Undefined`].
pub fn map_gateway_state(state: &str) -> CanonicalStatus {
    match state.trim().to_ascii_lowercase().as_str() {
        "authorised" | "captured" => CanonicalStatus::Processed,
        "pending" | "requires_action" => CanonicalStatus::Pending,
        "declined" | "failed" => CanonicalStatus::Error,
        "voided" | "cancelled" => CanonicalStatus::Canceled,
        _ => {
            tracing::warn!("Unknown OMPay payment state received: {}", state);
            CanonicalStatus::Undefined
        }
    }
}

/// Same as [`map_gateway_state`] for an optional state; a missing state is undefined.
pub fn map_optional_state(state: Option<&str>) -> CanonicalStatus {
    state.map(map_gateway_state).unwrap_or(CanonicalStatus::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_states_map_to_canonical_status() {
        assert_eq!(map_gateway_state("authorised"), CanonicalStatus::Processed);
        assert_eq!(map_gateway_state("captured"), CanonicalStatus::Processed);
        assert_eq!(map_gateway_state("pending"), CanonicalStatus::Pending);
        assert_eq!(map_gateway_state("requires_action"), CanonicalStatus::Pending);
        assert_eq!(map_gateway_state("declined"), CanonicalStatus::Error);
        assert_eq!(map_gateway_state("failed"), CanonicalStatus::Error);
        assert_eq!(map_gateway_state("voided"), CanonicalStatus::Canceled);
        assert_eq!(map_gateway_state("cancelled"), CanonicalStatus::Canceled);
    }

    #[test]
    fn test_mapping_is_case_insensitive() {
        assert_eq!(map_gateway_state("AUTHORISED"), CanonicalStatus::Processed);
        assert_eq!(map_gateway_state("Requires_Action"), CanonicalStatus::Pending);
        assert_eq!(map_gateway_state("VoIdEd"), CanonicalStatus::Canceled);
    }

    #[test]
    fn test_unknown_states_are_undefined() {
        for state in ["", "refunded", "authorized", "DONE", "unknown", "  "] {
            assert_eq!(map_gateway_state(state), CanonicalStatus::Undefined);
        }
        assert_eq!(map_optional_state(None), CanonicalStatus::Undefined);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        for state in ["authorised", "pending", "declined", "voided", "garbage"] {
            assert_eq!(map_gateway_state(state), map_gateway_state(state));
        }
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&CanonicalStatus::Canceled).unwrap();
        assert_eq!(json, "\"CANCELED\"");
        assert_eq!(CanonicalStatus::Pending.to_string(), "PENDING");
    }
}
