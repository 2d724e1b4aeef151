pub mod calendar;
pub mod selection;
pub mod delivery;
pub mod pricing;
pub mod discount;
pub mod inventory;

pub use calendar::{availability_for, DayAvailability, UnavailableReason};
pub use selection::{DateRangeSelection, SelectionError};
pub use delivery::{DeliveryBreakdown, DeliveryPolicy, RoundedDistance};
pub use pricing::{PriceQuote, PricingEngine, PricingError, PricingInput, PricingRules};
pub use discount::{
    DiscountCatalog, DiscountCode, DiscountDescriptor, DiscountError, DiscountKind, DiscountResolver,
    MemoryDiscountCatalog,
};
pub use inventory::BlockInventory;
