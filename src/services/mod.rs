pub mod orchestrator;
pub mod payment_methods;
pub mod payments;
pub mod reconciliation;

pub use orchestrator::{OrchestratorSettings, PaymentError, PaymentOrchestrator, Reconciled};
pub use payment_methods::{AddPaymentMethod, SyncReport};
pub use payments::{FollowUpRequest, FormDescriptor, InitiateRequest, PaymentOptions};
pub use reconciliation::{NotificationDisposition, NotificationOutcome, RefreshReport};
