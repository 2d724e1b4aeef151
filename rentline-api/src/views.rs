use chrono::{DateTime, NaiveDate, Utc};
use rentline_catalog::{PriceQuote, RoundedDistance};
use rentline_order::{Booking, BookingStatus, HoldSchedule, HoldStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Customer/admin view of a booking. Leaves out the payment method.
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub customer_id: String,
    pub status: BookingStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rental_days: i64,
    pub destination: String,
    pub distance_km: RoundedDistance,
    pub waiver_selected: bool,
    pub discount_code: Option<String>,
    pub pricing: PriceQuote,
    pub block_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Booking> for BookingResponse {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            resource_id: booking.resource_id,
            customer_id: booking.customer_id.clone(),
            status: booking.status,
            start_date: booking.start_date,
            end_date: booking.end_date,
            rental_days: booking.rental_days(),
            destination: booking.destination.clone(),
            distance_km: booking.distance_km,
            waiver_selected: booking.waiver_selected,
            discount_code: booking.discount_code.clone(),
            pricing: booking.pricing.rounded(),
            block_id: booking.block_id,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub booking_id: Uuid,
    pub status: HoldStatus,
    pub scheduled_at_utc: DateTime<Utc>,
    pub pickup_at_utc: DateTime<Utc>,
    pub hold_amount: Decimal,
    pub currency: String,
    pub captured_amount: Option<Decimal>,
    pub released_amount: Option<Decimal>,
    pub failure_reason: Option<String>,
}

impl From<&HoldSchedule> for HoldResponse {
    fn from(hold: &HoldSchedule) -> Self {
        Self {
            booking_id: hold.booking_id,
            status: hold.status,
            scheduled_at_utc: hold.scheduled_at_utc,
            pickup_at_utc: hold.pickup_at_utc,
            hold_amount: hold.hold_amount,
            currency: hold.currency.clone(),
            captured_amount: hold.captured_amount,
            released_amount: hold.released_amount,
            failure_reason: hold.failure_reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub booking: BookingResponse,
    pub hold: HoldResponse,
}
