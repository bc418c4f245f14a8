use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Tenant and clock supplied by the host platform for one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub tenant_id: Uuid,
    pub now: DateTime<Utc>,
}

impl CallContext {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            now: Utc::now(),
        }
    }
}
