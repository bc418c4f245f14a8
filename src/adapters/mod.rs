//! Adapters implementing the ports.

pub mod http_host;
pub mod memory;
pub mod postgres_ledger;
pub mod postgres_vault;

pub use http_host::HttpHostPlatform;
pub use memory::{InMemoryLedger, InMemoryVault};
pub use postgres_ledger::PostgresLedger;
pub use postgres_vault::PostgresVault;

use uuid::Uuid;

use crate::ports::{RepositoryError, RepositoryResult};

pub(crate) fn parse_uuid(column: &str, raw: &str) -> RepositoryResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| RepositoryError::Corrupt(format!("{} '{}': {}", column, raw, e)))
}

/// `%key%` with LIKE wildcards in the key escaped.
pub(crate) fn like_pattern(key: &str) -> String {
    let escaped = key
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("pay_1"), "%pay\\_1%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
    }

    #[test]
    fn test_parse_uuid_reports_column() {
        let err = parse_uuid("payment_id", "garbage").unwrap_err();
        assert!(err.to_string().contains("payment_id"));
    }
}
