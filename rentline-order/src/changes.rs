use chrono::{NaiveDate, Utc};
use rentline_catalog::{PriceQuote, PricingEngine, PricingError};
use rentline_core::CoreError;

use crate::models::{Booking, BookingStatus};

/// Date changes on existing bookings
pub struct ChangeHandler;

impl ChangeHandler {
    /// Price a new range with the booking's stored distance, waiver and discount
    pub fn requote(
        engine: &PricingEngine,
        booking: &Booking,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceQuote, PricingError> {
        let days = (end - start).num_days();
        engine.quote(&engine.input(
            days,
            booking.distance_km,
            booking.waiver_selected,
            booking.discount.clone(),
        ))
    }

    /// New dates on a booking that has not been confirmed yet
    pub fn change_dates(
        booking: &mut Booking,
        start: NaiveDate,
        end: NaiveDate,
        quote: PriceQuote,
    ) -> Result<(), ChangeError> {
        if booking.status != BookingStatus::Draft {
            return Err(ChangeError::BookingNotModifiable {
                booking_id: booking.id.to_string(),
                status: booking.status,
            });
        }
        Self::apply(booking, start, end, quote);
        Ok(())
    }

    /// Move a confirmed booking; the caller has already moved its block
    pub fn reschedule(
        booking: &mut Booking,
        start: NaiveDate,
        end: NaiveDate,
        quote: PriceQuote,
    ) -> Result<(), ChangeError> {
        if booking.status != BookingStatus::Confirmed {
            return Err(ChangeError::BookingNotModifiable {
                booking_id: booking.id.to_string(),
                status: booking.status,
            });
        }
        Self::apply(booking, start, end, quote);
        Ok(())
    }

    fn apply(booking: &mut Booking, start: NaiveDate, end: NaiveDate, quote: PriceQuote) {
        booking.start_date = start;
        booking.end_date = end;
        booking.pricing = quote;
        booking.updated_at = Utc::now();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
    #[error("Booking {booking_id} cannot change dates while {status}")]
    BookingNotModifiable {
        booking_id: String,
        status: BookingStatus,
    },
}

impl From<ChangeError> for CoreError {
    fn from(err: ChangeError) -> Self {
        match err {
            ChangeError::BookingNotModifiable { status, .. } => CoreError::InvalidTransition {
                from: status.to_string(),
                to: "DATES_CHANGED".to_string(),
            },
        }
    }
}
