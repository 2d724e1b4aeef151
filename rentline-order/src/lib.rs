pub mod models;
pub mod manager;
pub mod changes;
pub mod repository;
pub mod holds;
pub mod resolution;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use models::{Booking, BookingStatus, HoldResolution, HoldSchedule, HoldStatus, InspectionOutcome};
pub use manager::BookingManager;
pub use changes::ChangeHandler;
pub use repository::{BookingRepository, HoldRepository, MemoryBookingRepository, MemoryHoldRepository};
pub use holds::{HoldScheduler, HoldSchedulerConfig, SweepReport};
pub use resolution::HoldResolutionHandler;
pub use orchestrator::{BookingOrchestrator, Confirmation, OrchestratorDeps, QuoteRequest, Quotation};
