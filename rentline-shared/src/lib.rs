pub mod models;
pub mod pii;

pub use models::blocks::{midnight_utc, AvailabilityBlock, BlockReason};
pub use models::events::{BlockChange, BlockChangeEvent};
pub use pii::Masked;
