use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rentline_catalog::{PricingEngine, RoundedDistance};
use uuid::Uuid;

use crate::models::Booking;

pub(crate) fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub(crate) fn booking_on(start: NaiveDate, end: NaiveDate) -> Booking {
    let engine = PricingEngine::default();
    let distance = RoundedDistance::from_raw_km(12.0).unwrap();
    let quote = engine
        .quote(&engine.input((end - start).num_days(), distance, false, None))
        .unwrap();
    Booking::new(
        Uuid::new_v4(),
        "customer-1".to_string(),
        start,
        end,
        "12 Harbour St".to_string(),
        distance,
        false,
        None,
        quote,
    )
}
