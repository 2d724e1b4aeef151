use chrono::{DateTime, Duration, NaiveDate, Utc};
use rentline_catalog::{DiscountDescriptor, PriceQuote, RoundedDistance};
use rentline_shared::{midnight_utc, Masked};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Draft,
    AwaitingAvailability,
    AwaitingCardVerification,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Draft => "DRAFT",
            BookingStatus::AwaitingAvailability => "AWAITING_AVAILABILITY",
            BookingStatus::AwaitingCardVerification => "AWAITING_CARD_VERIFICATION",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(BookingStatus::Draft),
            "AWAITING_AVAILABILITY" => Ok(BookingStatus::AwaitingAvailability),
            "AWAITING_CARD_VERIFICATION" => Ok(BookingStatus::AwaitingCardVerification),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// A customer's reservation of one resource for a contiguous range.
/// Keeps the quote inputs so the booking can be re-priced without routing again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub customer_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub destination: String,
    pub distance_km: RoundedDistance,
    pub waiver_selected: bool,
    pub discount_code: Option<String>,
    pub discount: Option<DiscountDescriptor>,
    pub pricing: PriceQuote,
    pub status: BookingStatus,

    /// The `booked` block, once confirmed
    pub block_id: Option<Uuid>,

    pub payment_method_id: Option<Masked<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resource_id: Uuid,
        customer_id: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        destination: String,
        distance_km: RoundedDistance,
        waiver_selected: bool,
        discount: Option<DiscountDescriptor>,
        pricing: PriceQuote,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            resource_id,
            customer_id,
            start_date,
            end_date,
            destination,
            distance_km,
            waiver_selected,
            discount_code: discount.as_ref().map(|d| d.code.clone()),
            discount,
            pricing,
            status: BookingStatus::Draft,
            block_id: None,
            payment_method_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn rental_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// Pickup instant, midnight UTC of the start day
    pub fn pickup_at(&self) -> DateTime<Utc> {
        midnight_utc(self.start_date)
    }

    pub fn update_status(&mut self, new_status: BookingStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Pending,
    Placed,
    Released,
    Captured,
    Failed,
    /// Pending entry retracted before any authorization existed
    Cancelled,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Pending => "pending",
            HoldStatus::Placed => "placed",
            HoldStatus::Released => "released",
            HoldStatus::Captured => "captured",
            HoldStatus::Failed => "failed",
            HoldStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(HoldStatus::Pending),
            "placed" => Ok(HoldStatus::Placed),
            "released" => Ok(HoldStatus::Released),
            "captured" => Ok(HoldStatus::Captured),
            "failed" => Ok(HoldStatus::Failed),
            "cancelled" => Ok(HoldStatus::Cancelled),
            other => Err(format!("unknown hold status: {}", other)),
        }
    }
}

/// Deferred security hold for one booking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldSchedule {
    pub booking_id: Uuid,
    pub scheduled_at_utc: DateTime<Utc>,
    pub pickup_at_utc: DateTime<Utc>,
    pub status: HoldStatus,
    pub hold_amount: Decimal,
    pub currency: String,
    pub payment_method_id: Masked<String>,
    pub authorization_id: Option<String>,
    pub captured_amount: Option<Decimal>,
    pub released_amount: Option<Decimal>,
    pub failure_reason: Option<String>,
    pub placed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HoldSchedule {
    /// Pending hold firing `lead` before the booking's pickup
    pub fn for_booking(
        booking: &Booking,
        lead: Duration,
        currency: &str,
        payment_method_id: Masked<String>,
    ) -> Self {
        let now = Utc::now();
        let pickup = booking.pickup_at();
        Self {
            booking_id: booking.id,
            scheduled_at_utc: pickup - lead,
            pickup_at_utc: pickup,
            status: HoldStatus::Pending,
            hold_amount: booking.pricing.hold_amount,
            currency: currency.to_string(),
            payment_method_id,
            authorization_id: None,
            captured_amount: None,
            released_amount: None,
            failure_reason: None,
            placed_at: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Same key for every placement attempt of this booking and pickup date
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:security_hold:{}",
            self.booking_id,
            self.pickup_at_utc.timestamp_millis()
        )
    }

    /// Key for the capture or release after the return inspection
    pub fn resolution_key(&self) -> String {
        format!(
            "{}:security_hold_resolution:{}",
            self.booking_id,
            self.pickup_at_utc.timestamp_millis()
        )
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Pending && self.scheduled_at_utc <= now
    }

    pub fn update_status(&mut self, new_status: HoldStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// Result of the post-return inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionOutcome {
    pub clean: bool,
    pub damage_amount: Option<Decimal>,
    pub notes: Option<String>,
}

impl InspectionOutcome {
    pub fn clean() -> Self {
        Self {
            clean: true,
            damage_amount: None,
            notes: None,
        }
    }

    pub fn damaged(amount: Decimal) -> Self {
        Self {
            clean: false,
            damage_amount: Some(amount),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldResolution {
    pub booking_id: Uuid,
    /// `None` when the booking never had a hold entry
    pub status: Option<HoldStatus>,
    pub captured_amount: Decimal,
    pub released_amount: Decimal,
}
