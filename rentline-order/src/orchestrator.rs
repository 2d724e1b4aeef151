use chrono::{Duration, NaiveDate};
use rentline_catalog::calendar::{
    first_conflict, month_bounds, month_grid, next_available_start, validate_range,
};
use rentline_catalog::{
    DayAvailability, DeliveryBreakdown, DiscountDescriptor, DiscountResolver, PriceQuote,
    PricingEngine, RoundedDistance,
};
use rentline_core::payment::{PaymentAdapter, VerificationStatus};
use rentline_core::routing::RoutingProvider;
use rentline_core::{AvailabilityStore, CoreError, RequestContext, StoreError};
use rentline_shared::{AvailabilityBlock, BlockChangeEvent, BlockReason};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::changes::ChangeHandler;
use crate::holds::{HoldScheduler, SweepReport};
use crate::manager::BookingManager;
use crate::models::{Booking, BookingStatus, HoldResolution, HoldSchedule, InspectionOutcome};
use crate::repository::BookingRepository;
use crate::resolution::HoldResolutionHandler;

/// Days scanned ahead when suggesting the next free start
const NEXT_AVAILABLE_HORIZON_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub resource_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub destination: String,
    #[serde(default)]
    pub waiver_selected: bool,
    pub discount_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quotation {
    pub quote: PriceQuote,
    pub delivery: DeliveryBreakdown,
    pub distance_km: RoundedDistance,
    pub discount: Option<DiscountDescriptor>,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub booking: Booking,
    pub hold: HoldSchedule,
}

pub struct OrchestratorDeps {
    pub bookings: Arc<dyn BookingRepository>,
    pub availability: Arc<dyn AvailabilityStore>,
    pub routing: Arc<dyn RoutingProvider>,
    pub payments: Arc<dyn PaymentAdapter>,
    pub discounts: DiscountResolver,
    pub pricing: PricingEngine,
    pub holds: Arc<HoldScheduler>,
    pub resolution: Arc<HoldResolutionHandler>,
}

/// Owns bookings from the first quote until they are confirmed, and drives
/// every later lifecycle step. Every call takes its own `RequestContext`.
pub struct BookingOrchestrator {
    bookings: Arc<dyn BookingRepository>,
    availability: Arc<dyn AvailabilityStore>,
    routing: Arc<dyn RoutingProvider>,
    payments: Arc<dyn PaymentAdapter>,
    discounts: DiscountResolver,
    pricing: PricingEngine,
    holds: Arc<HoldScheduler>,
    resolution: Arc<HoldResolutionHandler>,
}

impl BookingOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            bookings: deps.bookings,
            availability: deps.availability,
            routing: deps.routing,
            payments: deps.payments,
            discounts: deps.discounts,
            pricing: deps.pricing,
            holds: deps.holds,
            resolution: deps.resolution,
        }
    }

    pub fn discounts(&self) -> &DiscountResolver {
        &self.discounts
    }

    pub fn holds(&self) -> &HoldScheduler {
        &self.holds
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockChangeEvent> {
        self.availability.subscribe()
    }

    // Calendar

    pub async fn month_availability(
        &self,
        resource_id: Uuid,
        year: i32,
        month: u32,
        ctx: &RequestContext,
    ) -> Result<(Vec<AvailabilityBlock>, Vec<DayAvailability>), CoreError> {
        let (first, last) = month_bounds(year, month)?;
        let blocks = self.availability.blocks_in_range(resource_id, first, last).await?;
        let grid = month_grid(year, month, ctx.today(), &blocks)?;
        Ok((blocks, grid))
    }

    pub async fn next_available(
        &self,
        resource_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        ctx: &RequestContext,
    ) -> Result<Option<NaiveDate>, CoreError> {
        validate_range(start, end, ctx.today())?;
        let horizon_end = end + Duration::days(NEXT_AVAILABLE_HORIZON_DAYS);
        let blocks = self.availability.blocks_in_range(resource_id, start, horizon_end).await?;
        Ok(next_available_start(
            start,
            end,
            ctx.today(),
            &blocks,
            NEXT_AVAILABLE_HORIZON_DAYS,
        ))
    }

    // Quotes and bookings

    pub async fn quote(&self, request: &QuoteRequest, ctx: &RequestContext) -> Result<Quotation, CoreError> {
        let days = validate_range(request.start_date, request.end_date, ctx.today())?;
        let estimate = self.routing.estimate(&request.destination).await?;
        let distance = RoundedDistance::from_raw_km(estimate.distance_km)?;

        let discount = self
            .resolve_discount(request.discount_code.as_deref(), days, distance, request.waiver_selected, ctx)
            .await?;
        let quote = self
            .pricing
            .quote(&self.pricing.input(days, distance, request.waiver_selected, discount.clone()))?;

        Ok(Quotation {
            quote,
            delivery: self.pricing.delivery_breakdown(distance),
            distance_km: distance,
            discount,
            currency: self.pricing.rules().currency.clone(),
        })
    }

    /// Create a draft from a quote request and submit its dates right away
    pub async fn create_booking(
        &self,
        customer_id: &str,
        request: &QuoteRequest,
        ctx: &RequestContext,
    ) -> Result<Booking, CoreError> {
        let quotation = self.quote(request, ctx).await?;
        let booking = Booking::new(
            request.resource_id,
            customer_id.to_string(),
            request.start_date,
            request.end_date,
            request.destination.clone(),
            quotation.distance_km,
            request.waiver_selected,
            quotation.discount,
            quotation.quote,
        );
        self.bookings.insert(&booking).await?;
        info!(request_id = %ctx.request_id, "Created draft booking {} for resource {}", booking.id, booking.resource_id);

        self.submit_dates(booking.id, ctx).await
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, CoreError> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))
    }

    /// Draft → AwaitingAvailability → AwaitingCardVerification, re-checked
    /// against the store rather than whatever calendar the client rendered
    pub async fn submit_dates(&self, booking_id: Uuid, ctx: &RequestContext) -> Result<Booking, CoreError> {
        let mut booking = self.get_booking(booking_id).await?;
        validate_range(booking.start_date, booking.end_date, ctx.today())?;

        BookingManager::submit(&mut booking)?;
        self.save(&booking, BookingStatus::Draft).await?;

        let blocks = self
            .availability
            .blocks_in_range(booking.resource_id, booking.start_date, booking.end_date)
            .await?;
        if first_conflict(booking.start_date, booking.end_date, &blocks).is_some() {
            BookingManager::availability_lost(&mut booking)?;
            self.save(&booking, BookingStatus::AwaitingAvailability).await?;
            warn!(request_id = %ctx.request_id, "Booking {} lost its dates at submission", booking.id);
            return Err(conflict(&booking, blocks));
        }

        BookingManager::availability_confirmed(&mut booking)?;
        self.save(&booking, BookingStatus::AwaitingAvailability).await?;
        info!(request_id = %ctx.request_id, "Booking {} awaiting card verification", booking.id);
        Ok(booking)
    }

    /// Pick new dates for a draft; the caller re-submits afterwards
    pub async fn change_dates(
        &self,
        booking_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        ctx: &RequestContext,
    ) -> Result<Booking, CoreError> {
        let mut booking = self.get_booking(booking_id).await?;
        validate_range(start, end, ctx.today())?;

        let quote = ChangeHandler::requote(&self.pricing, &booking, start, end)?;
        ChangeHandler::change_dates(&mut booking, start, end, quote)?;
        self.save(&booking, BookingStatus::Draft).await?;
        Ok(booking)
    }

    /// AwaitingCardVerification → Confirmed. Creates the `booked` block and
    /// the pending hold; a lost race sends the booking back to Draft.
    pub async fn confirm_card_verification(
        &self,
        booking_id: Uuid,
        verification_ref: &str,
        ctx: &RequestContext,
    ) -> Result<Confirmation, CoreError> {
        let mut booking = self.get_booking(booking_id).await?;
        if booking.status != BookingStatus::AwaitingCardVerification {
            return Err(CoreError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Confirmed.to_string(),
            });
        }
        validate_range(booking.start_date, booking.end_date, ctx.today())?;

        let verification = self.payments.verify_card(verification_ref).await?;
        let payment_method_id = match (verification.status, verification.payment_method_id) {
            (VerificationStatus::Succeeded, Some(pm)) => pm,
            (status, _) => {
                warn!(request_id = %ctx.request_id, "Card verification for booking {} ended {:?}", booking.id, status);
                return Err(CoreError::PaymentError(format!(
                    "card verification did not succeed ({:?})",
                    status
                )));
            }
        };

        // Never trust the discount from the quote
        let days = booking.rental_days();
        booking.discount = self
            .resolve_discount(
                booking.discount_code.as_deref(),
                days,
                booking.distance_km,
                booking.waiver_selected,
                ctx,
            )
            .await?;
        booking.pricing = self.pricing.quote(&self.pricing.input(
            days,
            booking.distance_km,
            booking.waiver_selected,
            booking.discount.clone(),
        ))?;

        let block = AvailabilityBlock::for_days(
            booking.resource_id,
            booking.start_date,
            booking.end_date,
            BlockReason::Booked,
        )
        .with_booking(booking.id);

        let block = match self.availability.check_and_reserve(block).await {
            Ok(block) => block,
            Err(StoreError::Conflict(_)) => {
                let blocks = self
                    .availability
                    .blocks_in_range(booking.resource_id, booking.start_date, booking.end_date)
                    .await?;
                BookingManager::availability_lost(&mut booking)?;
                self.save(&booking, BookingStatus::AwaitingCardVerification).await?;
                warn!(request_id = %ctx.request_id, "Booking {} lost the race for its dates", booking.id);
                return Err(conflict(&booking, blocks));
            }
            Err(e) => return Err(e.into()),
        };

        // The use is taken before the booking counts as confirmed
        let redeemed = booking.discount.as_ref().map(|d| d.code.clone());
        if let Some(code) = redeemed.as_deref() {
            if let Err(e) = self.discounts.redeem(code, ctx).await {
                warn!(request_id = %ctx.request_id, "Discount {} unavailable for booking {}: {}", code, booking.id, e);
                self.undo_reservation(block.id).await;
                return Err(e.into());
            }
        }

        booking.block_id = Some(block.id);
        booking.payment_method_id = Some(payment_method_id.clone());
        BookingManager::confirm(&mut booking)?;
        if let Err(e) = self.save(&booking, BookingStatus::AwaitingCardVerification).await {
            self.undo_reservation(block.id).await;
            if let Some(code) = redeemed.as_deref() {
                if let Err(undo) = self.discounts.restore(code, ctx).await {
                    error!("Could not give back discount {} after failed confirmation: {}", code, undo);
                }
            }
            return Err(e);
        }
        info!(request_id = %ctx.request_id, "Booking {} confirmed, total {}", booking.id, booking.pricing.rounded().total);

        let hold = self.holds.schedule(&booking, payment_method_id, ctx).await?;
        Ok(Confirmation { booking, hold })
    }

    /// Cancel from any non-terminal state. A confirmed booking also gives up
    /// its hold and its block.
    pub async fn cancel(&self, booking_id: Uuid, ctx: &RequestContext) -> Result<Booking, CoreError> {
        let mut booking = self.get_booking(booking_id).await?;
        let previous = booking.status;
        BookingManager::cancel(&mut booking)?;
        // A concurrent reschedule or return loses here, before anything is given up
        self.save(&booking, previous).await?;
        info!(request_id = %ctx.request_id, "Booking {} cancelled from {}", booking.id, previous);

        let retracted = if previous == BookingStatus::Confirmed {
            self.holds.retract(booking.id, ctx).await.map(|_| ())
        } else {
            Ok(())
        };
        if let Some(block_id) = booking.block_id {
            if let Err(e) = self.availability.remove_block(block_id).await {
                error!("Block {} of cancelled booking {} was not removed: {}", block_id, booking.id, e);
                return Err(e.into());
            }
        }
        retracted?;
        Ok(booking)
    }

    /// Resolve the hold from the inspection, then Confirmed → Completed
    pub async fn complete_return(
        &self,
        booking_id: Uuid,
        outcome: &InspectionOutcome,
        ctx: &RequestContext,
    ) -> Result<(Booking, HoldResolution), CoreError> {
        let mut booking = self.get_booking(booking_id).await?;
        HoldResolutionHandler::capture_amount(outcome, Decimal::MAX)?;
        BookingManager::complete(&mut booking)?;
        // Only the caller that completes the booking goes on to move money
        self.save(&booking, BookingStatus::Confirmed).await?;

        let resolution = match self.resolution.resolve(booking.id, outcome, ctx).await {
            Ok(resolution) => resolution,
            Err(e) => {
                // Reopened so the inspection can be recorded again
                booking.update_status(BookingStatus::Confirmed);
                if let Err(undo) = self.save(&booking, BookingStatus::Completed).await {
                    error!("Could not reopen booking {} after failed hold resolution: {}", booking.id, undo);
                }
                return Err(e);
            }
        };
        info!(request_id = %ctx.request_id, "Booking {} completed", booking.id);
        Ok((booking, resolution))
    }

    /// Move a confirmed booking to new dates: block first, then the hold
    pub async fn reschedule(
        &self,
        booking_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        ctx: &RequestContext,
    ) -> Result<Confirmation, CoreError> {
        let mut booking = self.get_booking(booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(CoreError::InvalidTransition {
                from: booking.status.to_string(),
                to: "RESCHEDULED".to_string(),
            });
        }
        validate_range(start, end, ctx.today())?;

        let block_id = booking
            .block_id
            .ok_or_else(|| CoreError::InternalError(format!("confirmed booking {} has no block", booking.id)))?;
        let payment_method_id = booking.payment_method_id.clone().ok_or_else(|| {
            CoreError::InternalError(format!("confirmed booking {} has no payment method", booking.id))
        })?;
        let quote = ChangeHandler::requote(&self.pricing, &booking, start, end)?;
        let (old_start, old_end) = (booking.start_date, booking.end_date);

        match self.availability.move_block(block_id, start, end).await {
            Ok(_) => {}
            Err(StoreError::Conflict(_)) => {
                let blocks = self.availability.blocks_in_range(booking.resource_id, start, end).await?;
                return Err(conflict(&booking, blocks));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.holds.retract(booking.id, ctx).await {
            if let Err(undo) = self.availability.move_block(block_id, old_start, old_end).await {
                error!("Could not move block {} back after failed reschedule: {}", block_id, undo);
            }
            return Err(e);
        }

        ChangeHandler::reschedule(&mut booking, start, end, quote)?;
        self.save(&booking, BookingStatus::Confirmed).await?;
        info!(request_id = %ctx.request_id, "Booking {} rescheduled to {}..{}", booking.id, start, end);

        let hold = self.holds.schedule(&booking, payment_method_id, ctx).await?;
        Ok(Confirmation { booking, hold })
    }

    // Operator actions

    /// Maintenance, blackout, reserved or buffer block. Booked blocks only
    /// come from confirmations.
    pub async fn add_block(
        &self,
        resource_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
        reason: BlockReason,
        note: Option<String>,
        ctx: &RequestContext,
    ) -> Result<AvailabilityBlock, CoreError> {
        if reason == BlockReason::Booked {
            return Err(CoreError::ValidationError(
                "booked blocks are created by confirming a booking".to_string(),
            ));
        }
        if last < first {
            return Err(CoreError::ValidationError(format!(
                "block ends {} before it starts {}",
                last, first
            )));
        }

        let mut block = AvailabilityBlock::for_days(resource_id, first, last, reason);
        block.note = note;
        match self.availability.check_and_reserve(block).await {
            Ok(block) => {
                info!(request_id = %ctx.request_id, "Added {} block {} on resource {}", block.reason, block.id, resource_id);
                Ok(block)
            }
            Err(StoreError::Conflict(blocks)) => Err(CoreError::ConflictError {
                message: format!("{}..{} overlaps existing blocks", first, last),
                blocks,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove_block(&self, block_id: Uuid, ctx: &RequestContext) -> Result<AvailabilityBlock, CoreError> {
        let block = self
            .availability
            .get_block(block_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("availability block {}", block_id)))?;
        if let Some(booking_id) = block.booking_id {
            return Err(CoreError::ValidationError(format!(
                "block {} belongs to booking {}; cancel the booking instead",
                block_id, booking_id
            )));
        }

        self.availability.remove_block(block_id).await?;
        info!(request_id = %ctx.request_id, "Removed block {}", block_id);
        Ok(block)
    }

    pub async fn reconcile_holds(&self, ctx: &RequestContext) -> Result<SweepReport, CoreError> {
        self.holds.reconcile(ctx).await
    }

    async fn resolve_discount(
        &self,
        code: Option<&str>,
        days: i64,
        distance: RoundedDistance,
        waiver_selected: bool,
        ctx: &RequestContext,
    ) -> Result<Option<DiscountDescriptor>, CoreError> {
        let Some(code) = code.filter(|c| !c.trim().is_empty()) else {
            return Ok(None);
        };
        let subtotal = self.pricing.subtotal_before_discount(days, distance, waiver_selected)?;
        Ok(Some(self.discounts.validate(code, subtotal, ctx).await?))
    }

    async fn undo_reservation(&self, block_id: Uuid) {
        if let Err(undo) = self.availability.remove_block(block_id).await {
            error!("Could not remove block {} after failed confirmation: {}", block_id, undo);
        }
    }

    async fn save(&self, booking: &Booking, expected: BookingStatus) -> Result<(), CoreError> {
        if !self.bookings.update_if_status(booking, expected).await? {
            return Err(CoreError::InvalidTransition {
                from: expected.to_string(),
                to: booking.status.to_string(),
            });
        }
        Ok(())
    }
}

fn conflict(booking: &Booking, blocks: Vec<AvailabilityBlock>) -> CoreError {
    CoreError::ConflictError {
        message: format!(
            "{}..{} is no longer available for booking {}",
            booking.start_date, booking.end_date, booking.id
        ),
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holds::HoldSchedulerConfig;
    use crate::models::HoldStatus;
    use crate::repository::{MemoryBookingRepository, MemoryHoldRepository};
    use crate::testing::at;
    use rentline_catalog::discount::{DiscountCatalog, DiscountCode, DiscountKind, MemoryDiscountCatalog};
    use rentline_core::alerts::AlertKind;
    use rentline_core::lease::HoldLease;
    use rentline_catalog::BlockInventory;
    use rentline_core::alerts::AlertLog;
    use rentline_core::lease::LocalLease;
    use rentline_core::payment::SimulatedPaymentAdapter;
    use rentline_core::routing::FixedRouting;
    use rust_decimal_macros::dec;

    struct Harness {
        orchestrator: Arc<BookingOrchestrator>,
        inventory: Arc<BlockInventory>,
        payments: Arc<SimulatedPaymentAdapter>,
        catalog: Arc<MemoryDiscountCatalog>,
        alerts: Arc<AlertLog>,
        lease: Arc<LocalLease>,
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryBookingRepository::new()), false)
    }

    fn harness_with(bookings: Arc<dyn BookingRepository>, stale_discounts: bool) -> Harness {
        let inventory = Arc::new(BlockInventory::default());
        let payments = Arc::new(SimulatedPaymentAdapter::new());
        let catalog = Arc::new(MemoryDiscountCatalog::new());
        let holds = Arc::new(MemoryHoldRepository::new());
        let alerts = Arc::new(AlertLog::new());
        let lease = Arc::new(LocalLease::new());
        let discounts: Arc<dyn DiscountCatalog> = if stale_discounts {
            Arc::new(UnreadUsage(catalog.clone()))
        } else {
            catalog.clone()
        };

        let scheduler = Arc::new(HoldScheduler::new(
            holds.clone(),
            payments.clone(),
            lease.clone(),
            alerts.clone(),
            HoldSchedulerConfig::default(),
        ));
        let orchestrator = Arc::new(BookingOrchestrator::new(OrchestratorDeps {
            bookings,
            availability: inventory.clone(),
            routing: Arc::new(FixedRouting::new().with_fallback(39.84)),
            payments: payments.clone(),
            discounts: DiscountResolver::new(discounts),
            pricing: PricingEngine::default(),
            holds: scheduler,
            resolution: Arc::new(HoldResolutionHandler::new(
                holds,
                payments.clone(),
                lease.clone(),
                alerts.clone(),
            )),
        }));

        Harness {
            orchestrator,
            inventory,
            payments,
            catalog,
            alerts,
            lease,
        }
    }

    /// Booking store where another writer moves the booking right after the next read
    #[derive(Default)]
    struct InterferingBookings {
        inner: MemoryBookingRepository,
        next_read: std::sync::Mutex<Option<BookingStatus>>,
    }

    impl InterferingBookings {
        fn after_next_read(&self, status: BookingStatus) {
            *self.next_read.lock().unwrap() = Some(status);
        }
    }

    #[async_trait::async_trait]
    impl BookingRepository for InterferingBookings {
        async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
            self.inner.insert(booking).await
        }

        async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
            let booking = self.inner.get(booking_id).await?;
            let interference = self.next_read.lock().unwrap().take();
            if let (Some(status), Some(current)) = (interference, booking.as_ref()) {
                let mut moved = current.clone();
                moved.update_status(status);
                self.inner.update_if_status(&moved, current.status).await?;
            }
            Ok(booking)
        }

        async fn update_if_status(&self, booking: &Booking, expected: BookingStatus) -> Result<bool, StoreError> {
            self.inner.update_if_status(booking, expected).await
        }
    }

    /// Catalog read that never sees other bookings' uses, as when two
    /// confirmations validate the same code at once
    struct UnreadUsage(Arc<MemoryDiscountCatalog>);

    #[async_trait::async_trait]
    impl DiscountCatalog for UnreadUsage {
        async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError> {
            Ok(self.0.find_code(code).await?.map(|mut c| {
                c.used_count = 0;
                c
            }))
        }

        async fn redeem(&self, code: &str) -> Result<bool, StoreError> {
            self.0.redeem(code).await
        }

        async fn restore(&self, code: &str) -> Result<(), StoreError> {
            self.0.restore(code).await
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2027, 3, d).unwrap()
    }

    fn request(resource_id: Uuid, start: u32, end: u32) -> QuoteRequest {
        QuoteRequest {
            resource_id,
            start_date: day(start),
            end_date: day(end),
            destination: "88 Lakeshore Rd".to_string(),
            waiver_selected: false,
            discount_code: None,
        }
    }

    fn early_ctx() -> RequestContext {
        RequestContext::at(at(2027, 2, 1, 12))
    }

    #[tokio::test]
    async fn test_quote_rounds_distance_once() {
        let h = harness();
        let quotation = h.orchestrator.quote(&request(Uuid::new_v4(), 10, 12), &early_ctx()).await.unwrap();

        assert_eq!(quotation.distance_km.km(), dec!(39.8));
        assert_eq!(quotation.quote.total, dec!(1447.62));
        assert_eq!(quotation.delivery.total, quotation.quote.delivery_fee);
    }

    #[tokio::test]
    async fn test_same_day_range_is_validation_error() {
        let h = harness();
        let result = h.orchestrator.quote(&request(Uuid::new_v4(), 10, 10), &early_ctx()).await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_confirm_then_cancel() {
        let h = harness();
        let resource = Uuid::new_v4();
        let ctx = early_ctx();

        let booking = h.orchestrator.create_booking("cust-1", &request(resource, 10, 12), &ctx).await.unwrap();
        assert_eq!(booking.status, BookingStatus::AwaitingCardVerification);

        let confirmation = h
            .orchestrator
            .confirm_card_verification(booking.id, "seti_1", &ctx)
            .await
            .unwrap();
        assert_eq!(confirmation.booking.status, BookingStatus::Confirmed);
        assert_eq!(confirmation.hold.status, HoldStatus::Pending);
        assert_eq!(h.inventory.block_count(resource).await, 1);

        let cancelled = h.orchestrator.cancel(booking.id, &ctx).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(h.inventory.block_count(resource).await, 0);
        let hold = h.orchestrator.holds().hold_for(booking.id).await.unwrap().unwrap();
        assert_eq!(hold.status, HoldStatus::Cancelled);
        assert_eq!(h.payments.place_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_confirms_exactly_one_wins() {
        let h = harness();
        let resource = Uuid::new_v4();
        let ctx = early_ctx();

        let first = h.orchestrator.create_booking("cust-a", &request(resource, 10, 12), &ctx).await.unwrap();
        let second = h.orchestrator.create_booking("cust-b", &request(resource, 11, 14), &ctx).await.unwrap();

        let tasks: Vec<_> = [(first.id, "seti_a"), (second.id, "seti_b")]
            .into_iter()
            .map(|(id, verification)| {
                let orchestrator = h.orchestrator.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move { orchestrator.confirm_card_verification(id, verification, &ctx).await })
            })
            .collect();

        let mut confirmed = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(c) => {
                    assert_eq!(c.booking.status, BookingStatus::Confirmed);
                    confirmed += 1;
                }
                Err(CoreError::ConflictError { blocks, .. }) => {
                    assert!(blocks.iter().any(|b| b.reason == BlockReason::Booked));
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }
        assert_eq!((confirmed, conflicts), (1, 1));
        assert_eq!(h.inventory.block_count(resource).await, 1);

        let statuses = [
            h.orchestrator.get_booking(first.id).await.unwrap().status,
            h.orchestrator.get_booking(second.id).await.unwrap().status,
        ];
        assert!(statuses.contains(&BookingStatus::Confirmed));
        assert!(statuses.contains(&BookingStatus::Draft));
    }

    #[tokio::test]
    async fn test_booked_range_rejected_at_submission() {
        let h = harness();
        let resource = Uuid::new_v4();
        let ctx = early_ctx();

        let booking = h.orchestrator.create_booking("cust-a", &request(resource, 10, 12), &ctx).await.unwrap();
        h.orchestrator.confirm_card_verification(booking.id, "seti_a", &ctx).await.unwrap();

        let result = h.orchestrator.create_booking("cust-b", &request(resource, 12, 13), &ctx).await;
        match result {
            Err(CoreError::ConflictError { blocks, .. }) => assert_eq!(blocks.len(), 1),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_late_booking_places_hold_on_confirmation() {
        let h = harness();
        let ctx = RequestContext::at(at(2027, 3, 9, 0));

        let booking = h
            .orchestrator
            .create_booking("cust-1", &request(Uuid::new_v4(), 10, 12), &ctx)
            .await
            .unwrap();
        let confirmation = h
            .orchestrator
            .confirm_card_verification(booking.id, "seti_1", &ctx)
            .await
            .unwrap();

        assert_eq!(confirmation.hold.status, HoldStatus::Placed);
        assert_eq!(h.payments.place_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_verification_leaves_booking_unconfirmed() {
        let h = harness();
        h.payments.fail_verification("seti_bad");
        let ctx = early_ctx();

        let booking = h
            .orchestrator
            .create_booking("cust-1", &request(Uuid::new_v4(), 10, 12), &ctx)
            .await
            .unwrap();
        let result = h.orchestrator.confirm_card_verification(booking.id, "seti_bad", &ctx).await;

        assert!(matches!(result, Err(CoreError::PaymentError(_))));
        assert_eq!(
            h.orchestrator.get_booking(booking.id).await.unwrap().status,
            BookingStatus::AwaitingCardVerification
        );
    }

    #[tokio::test]
    async fn test_discount_revalidated_at_confirmation() {
        let h = harness();
        let mut code = DiscountCode::new("ONCE10", DiscountKind::Percentage, dec!(10));
        code.max_uses = Some(1);
        h.catalog.insert(code).await;
        let ctx = early_ctx();

        let mut first_request = request(Uuid::new_v4(), 10, 12);
        first_request.discount_code = Some("once10".to_string());
        let mut second_request = request(Uuid::new_v4(), 10, 12);
        second_request.discount_code = Some("ONCE10".to_string());

        let first = h.orchestrator.create_booking("cust-a", &first_request, &ctx).await.unwrap();
        let second = h.orchestrator.create_booking("cust-b", &second_request, &ctx).await.unwrap();
        assert_eq!(second.pricing.discount_amount, dec!(125.88));

        let confirmed = h.orchestrator.confirm_card_verification(first.id, "seti_a", &ctx).await.unwrap();
        assert_eq!(confirmed.booking.pricing.total, dec!(1302.858));

        let result = h.orchestrator.confirm_card_verification(second.id, "seti_b", &ctx).await;
        assert!(matches!(result, Err(CoreError::DiscountError(_))));
        assert_eq!(
            h.orchestrator.get_booking(second.id).await.unwrap().status,
            BookingStatus::AwaitingCardVerification
        );
    }

    #[tokio::test]
    async fn test_reschedule_moves_block_and_replaces_hold() {
        let h = harness();
        let resource = Uuid::new_v4();
        // Inside the lead window so the first hold is placed
        let ctx = RequestContext::at(at(2027, 3, 9, 0));

        let booking = h.orchestrator.create_booking("cust-1", &request(resource, 10, 12), &ctx).await.unwrap();
        h.orchestrator.confirm_card_verification(booking.id, "seti_1", &ctx).await.unwrap();

        let moved = h.orchestrator.reschedule(booking.id, day(20), day(23), &ctx).await.unwrap();
        assert_eq!(moved.booking.start_date, day(20));
        assert_eq!(moved.booking.pricing.days, 3);
        assert_eq!(moved.hold.status, HoldStatus::Pending);
        assert_eq!(h.payments.releases().len(), 1);

        let blocks = h.inventory.blocks_in_range(resource, day(1), day(31)).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].first_day(), day(20));
    }

    #[tokio::test]
    async fn test_reschedule_into_blackout_conflicts() {
        let h = harness();
        let resource = Uuid::new_v4();
        let ctx = early_ctx();

        let booking = h.orchestrator.create_booking("cust-1", &request(resource, 10, 12), &ctx).await.unwrap();
        h.orchestrator.confirm_card_verification(booking.id, "seti_1", &ctx).await.unwrap();
        h.orchestrator
            .add_block(resource, day(21), day(22), BlockReason::Blackout, None, &ctx)
            .await
            .unwrap();

        let result = h.orchestrator.reschedule(booking.id, day(20), day(23), &ctx).await;
        assert!(matches!(result, Err(CoreError::ConflictError { .. })));
        assert_eq!(h.orchestrator.get_booking(booking.id).await.unwrap().start_date, day(10));
    }

    #[tokio::test]
    async fn test_return_with_damage_completes_booking() {
        let h = harness();
        let ctx = RequestContext::at(at(2027, 3, 9, 0));

        let booking = h
            .orchestrator
            .create_booking("cust-1", &request(Uuid::new_v4(), 10, 12), &ctx)
            .await
            .unwrap();
        h.orchestrator.confirm_card_verification(booking.id, "seti_1", &ctx).await.unwrap();

        let (completed, resolution) = h
            .orchestrator
            .complete_return(booking.id, &InspectionOutcome::damaged(dec!(75)), &RequestContext::at(at(2027, 3, 12, 15)))
            .await
            .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(resolution.captured_amount, dec!(75));
        assert_eq!(resolution.released_amount, dec!(425));
    }

    #[tokio::test]
    async fn test_return_with_failed_hold_completes_booking() {
        let h = harness();
        h.payments.decline_payment_method("pm_seti_x");
        h.payments.decline_payment_method("pm_seti_y");
        let ctx = RequestContext::at(at(2027, 3, 9, 0));
        let returned = RequestContext::at(at(2027, 3, 12, 15));

        let clean = h.orchestrator.create_booking("cust-1", &request(Uuid::new_v4(), 10, 12), &ctx).await.unwrap();
        let confirmation = h.orchestrator.confirm_card_verification(clean.id, "seti_x", &ctx).await.unwrap();
        assert_eq!(confirmation.hold.status, HoldStatus::Failed);

        let (completed, resolution) = h
            .orchestrator
            .complete_return(clean.id, &InspectionOutcome::clean(), &returned)
            .await
            .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(resolution.status, Some(HoldStatus::Failed));
        assert_eq!(resolution.captured_amount, Decimal::ZERO);
        assert_eq!(h.alerts.count(AlertKind::UnsecuredDamage), 0);

        let damaged = h.orchestrator.create_booking("cust-2", &request(Uuid::new_v4(), 10, 12), &ctx).await.unwrap();
        h.orchestrator.confirm_card_verification(damaged.id, "seti_y", &ctx).await.unwrap();
        let (completed, _) = h
            .orchestrator
            .complete_return(damaged.id, &InspectionOutcome::damaged(dec!(300)), &returned)
            .await
            .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(h.alerts.count(AlertKind::UnsecuredDamage), 1);
        assert!(h.payments.captures().is_empty());
    }

    #[tokio::test]
    async fn test_failed_resolution_reopens_booking() {
        let h = harness();
        let ctx = RequestContext::at(at(2027, 3, 9, 0));
        let returned = RequestContext::at(at(2027, 3, 12, 15));

        let booking = h.orchestrator.create_booking("cust-1", &request(Uuid::new_v4(), 10, 12), &ctx).await.unwrap();
        h.orchestrator.confirm_card_verification(booking.id, "seti_1", &ctx).await.unwrap();

        // A placement attempt still holds the booking's lease
        h.lease.try_acquire(booking.id, std::time::Duration::from_secs(60)).await.unwrap();
        let busy = h
            .orchestrator
            .complete_return(booking.id, &InspectionOutcome::damaged(dec!(75)), &returned)
            .await;
        assert!(busy.is_err());
        assert_eq!(h.orchestrator.get_booking(booking.id).await.unwrap().status, BookingStatus::Confirmed);
        assert!(h.payments.captures().is_empty());

        h.lease.release(booking.id).await.unwrap();
        let (completed, resolution) = h
            .orchestrator
            .complete_return(booking.id, &InspectionOutcome::damaged(dec!(75)), &returned)
            .await
            .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(resolution.captured_amount, dec!(75));
        assert_eq!(h.payments.captures().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_losing_to_concurrent_writer_keeps_block_and_hold() {
        let bookings = Arc::new(InterferingBookings::default());
        let h = harness_with(bookings.clone(), false);
        let resource = Uuid::new_v4();
        let ctx = early_ctx();

        let booking = h.orchestrator.create_booking("cust-1", &request(resource, 10, 12), &ctx).await.unwrap();
        h.orchestrator.confirm_card_verification(booking.id, "seti_1", &ctx).await.unwrap();

        bookings.after_next_read(BookingStatus::Completed);
        let result = h.orchestrator.cancel(booking.id, &ctx).await;

        assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
        assert_eq!(h.inventory.block_count(resource).await, 1);
        let hold = h.orchestrator.holds().hold_for(booking.id).await.unwrap().unwrap();
        assert_eq!(hold.status, HoldStatus::Pending);
    }

    #[tokio::test]
    async fn test_return_losing_to_concurrent_cancel_moves_no_money() {
        let bookings = Arc::new(InterferingBookings::default());
        let h = harness_with(bookings.clone(), false);
        let ctx = RequestContext::at(at(2027, 3, 9, 0));

        let booking = h.orchestrator.create_booking("cust-1", &request(Uuid::new_v4(), 10, 12), &ctx).await.unwrap();
        h.orchestrator.confirm_card_verification(booking.id, "seti_1", &ctx).await.unwrap();

        bookings.after_next_read(BookingStatus::Cancelled);
        let result = h
            .orchestrator
            .complete_return(booking.id, &InspectionOutcome::damaged(dec!(75)), &RequestContext::at(at(2027, 3, 12, 15)))
            .await;

        assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
        assert!(h.payments.captures().is_empty());
        let hold = h.orchestrator.holds().hold_for(booking.id).await.unwrap().unwrap();
        assert_eq!(hold.status, HoldStatus::Placed);
    }

    #[tokio::test]
    async fn test_exhausted_discount_blocks_confirmation() {
        let h = harness_with(Arc::new(MemoryBookingRepository::new()), true);
        let mut code = DiscountCode::new("ONCE10", DiscountKind::Percentage, dec!(10));
        code.max_uses = Some(1);
        h.catalog.insert(code).await;
        let ctx = early_ctx();
        let (first_resource, second_resource) = (Uuid::new_v4(), Uuid::new_v4());

        let mut first_request = request(first_resource, 10, 12);
        first_request.discount_code = Some("ONCE10".to_string());
        let mut second_request = request(second_resource, 10, 12);
        second_request.discount_code = Some("ONCE10".to_string());
        let first = h.orchestrator.create_booking("cust-a", &first_request, &ctx).await.unwrap();
        let second = h.orchestrator.create_booking("cust-b", &second_request, &ctx).await.unwrap();

        h.orchestrator.confirm_card_verification(first.id, "seti_a", &ctx).await.unwrap();
        let result = h.orchestrator.confirm_card_verification(second.id, "seti_b", &ctx).await;

        assert!(matches!(result, Err(CoreError::DiscountError(_))));
        assert_eq!(
            h.orchestrator.get_booking(second.id).await.unwrap().status,
            BookingStatus::AwaitingCardVerification
        );
        assert_eq!(h.inventory.block_count(second_resource).await, 0);
        assert_eq!(h.catalog.find_code("ONCE10").await.unwrap().unwrap().used_count, 1);
    }

    #[tokio::test]
    async fn test_booked_blocks_cannot_be_added_or_removed_directly() {
        let h = harness();
        let resource = Uuid::new_v4();
        let ctx = early_ctx();

        let manual = h
            .orchestrator
            .add_block(resource, day(1), day(2), BlockReason::Booked, None, &ctx)
            .await;
        assert!(matches!(manual, Err(CoreError::ValidationError(_))));

        let booking = h.orchestrator.create_booking("cust-1", &request(resource, 10, 12), &ctx).await.unwrap();
        let confirmation = h.orchestrator.confirm_card_verification(booking.id, "seti_1", &ctx).await.unwrap();
        let block_id = confirmation.booking.block_id.unwrap();
        assert!(matches!(
            h.orchestrator.remove_block(block_id, &ctx).await,
            Err(CoreError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_month_availability_and_next_start() {
        let h = harness();
        let resource = Uuid::new_v4();
        let ctx = early_ctx();

        h.orchestrator
            .add_block(resource, day(5), day(8), BlockReason::Maintenance, Some("annual service".to_string()), &ctx)
            .await
            .unwrap();

        let (blocks, grid) = h.orchestrator.month_availability(resource, 2027, 3, &ctx).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(grid.len(), 31);
        assert!(!grid[5].available);

        let next = h.orchestrator.next_available(resource, day(4), day(6), &ctx).await.unwrap();
        assert_eq!(next, Some(day(9)));
    }
}
