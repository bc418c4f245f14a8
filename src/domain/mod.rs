//! Domain layer: framework-agnostic entities and pure rules.

pub mod context;
pub mod envelope;
pub mod payment_method;
pub mod status;
pub mod transaction;
pub mod value;

pub use context::CallContext;
pub use envelope::{NotificationUpdate, OutcomeEnvelope, HTTP_STATUS_KEY};
pub use payment_method::{CardMetadata, GatewayCard, NewPaymentMethod, PaymentMethodRecord};
pub use status::{map_gateway_state, CanonicalStatus};
pub use transaction::{NewTransactionRecord, TransactionKind, TransactionRecord, TransactionResult};
pub use value::ValueExt;
