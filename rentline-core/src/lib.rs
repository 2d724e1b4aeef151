pub mod alerts;
pub mod context;
pub mod events;
pub mod lease;
pub mod payment;
pub mod repository;
pub mod routing;

use rentline_shared::AvailabilityBlock;

pub use context::RequestContext;
pub use events::ChangeFeed;
pub use repository::{AvailabilityStore, StoreError};

/// Error taxonomy shared by every component. Crate-local errors convert into it.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Availability conflict: {message}")]
    ConflictError {
        message: String,
        /// Authoritative block set the caller must re-render from
        blocks: Vec<AvailabilityBlock>,
    },
    #[error("Invalid pricing input: {0}")]
    PricingInputError(String),
    #[error("Discount rejected: {0}")]
    DiscountError(String),
    #[error("Payment failed: {0}")]
    PaymentError(String),
    #[error("Hold scheduling failed: {0}")]
    SchedulingError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
