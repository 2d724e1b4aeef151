use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rentline_catalog::{DiscountDescriptor, PriceQuote, RoundedDistance};
use rentline_core::StoreError;
use rentline_order::{Booking, BookingRepository, BookingStatus, HoldRepository, HoldSchedule, HoldStatus};
use rentline_shared::Masked;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::backend;

const BOOKING_COLUMNS: &str = "id, resource_id, customer_id, start_date, end_date, destination, \
     distance_km, waiver_selected, discount_code, discount_json, pricing_json, status, block_id, \
     payment_method_id, created_at, updated_at";

const HOLD_COLUMNS: &str = "booking_id, scheduled_at_utc, pickup_at_utc, status, hold_amount, \
     currency, payment_method_id, authorization_id, captured_amount, released_amount, \
     failure_reason, placed_at, resolved_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    resource_id: Uuid,
    customer_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    destination: String,
    distance_km: Decimal,
    waiver_selected: bool,
    discount_code: Option<String>,
    discount_json: Option<Json<DiscountDescriptor>>,
    pricing_json: Json<PriceQuote>,
    status: String,
    block_id: Option<Uuid>,
    payment_method_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            resource_id: row.resource_id,
            customer_id: row.customer_id,
            start_date: row.start_date,
            end_date: row.end_date,
            destination: row.destination,
            distance_km: RoundedDistance::try_from(row.distance_km)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            waiver_selected: row.waiver_selected,
            discount_code: row.discount_code,
            discount: row.discount_json.map(|d| d.0),
            pricing: row.pricing_json.0,
            status: row.status.parse().map_err(StoreError::Backend)?,
            block_id: row.block_id,
            payment_method_id: row.payment_method_id.map(Masked),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, booking_id: Uuid) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM bookings WHERE id = $1)")
            .bind(booking_id)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO bookings ({})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            BOOKING_COLUMNS
        ))
        .bind(booking.id)
        .bind(booking.resource_id)
        .bind(&booking.customer_id)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(&booking.destination)
        .bind(booking.distance_km.km())
        .bind(booking.waiver_selected)
        .bind(&booking.discount_code)
        .bind(booking.discount.as_ref().map(Json))
        .bind(Json(&booking.pricing))
        .bind(booking.status.as_str())
        .bind(booking.block_id)
        .bind(booking.payment_method_id.as_ref().map(|pm| pm.expose().clone()))
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(Booking::try_from).transpose()
    }

    async fn update_if_status(&self, booking: &Booking, expected: BookingStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET
                start_date = $3, end_date = $4, discount_code = $5, discount_json = $6,
                pricing_json = $7, status = $8, block_id = $9, payment_method_id = $10,
                updated_at = $11
             WHERE id = $1 AND status = $2",
        )
        .bind(booking.id)
        .bind(expected.as_str())
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(&booking.discount_code)
        .bind(booking.discount.as_ref().map(Json))
        .bind(Json(&booking.pricing))
        .bind(booking.status.as_str())
        .bind(booking.block_id)
        .bind(booking.payment_method_id.as_ref().map(|pm| pm.expose().clone()))
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.exists(booking.id).await? {
            return Err(StoreError::NotFound(format!("booking {}", booking.id)));
        }
        Ok(false)
    }
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    booking_id: Uuid,
    scheduled_at_utc: DateTime<Utc>,
    pickup_at_utc: DateTime<Utc>,
    status: String,
    hold_amount: Decimal,
    currency: String,
    payment_method_id: String,
    authorization_id: Option<String>,
    captured_amount: Option<Decimal>,
    released_amount: Option<Decimal>,
    failure_reason: Option<String>,
    placed_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HoldRow> for HoldSchedule {
    type Error = StoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        Ok(HoldSchedule {
            booking_id: row.booking_id,
            scheduled_at_utc: row.scheduled_at_utc,
            pickup_at_utc: row.pickup_at_utc,
            status: row.status.parse().map_err(StoreError::Backend)?,
            hold_amount: row.hold_amount,
            currency: row.currency,
            payment_method_id: Masked(row.payment_method_id),
            authorization_id: row.authorization_id,
            captured_amount: row.captured_amount,
            released_amount: row.released_amount,
            failure_reason: row.failure_reason,
            placed_at: row.placed_at,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_holds(rows: Vec<HoldRow>) -> Result<Vec<HoldSchedule>, StoreError> {
    rows.into_iter().map(HoldSchedule::try_from).collect()
}

pub struct PgHoldRepository {
    pool: PgPool,
}

impl PgHoldRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HoldRepository for PgHoldRepository {
    async fn upsert(&self, hold: &HoldSchedule) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO hold_schedules ({})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT (booking_id) DO UPDATE SET
                scheduled_at_utc = EXCLUDED.scheduled_at_utc,
                pickup_at_utc = EXCLUDED.pickup_at_utc,
                status = EXCLUDED.status,
                hold_amount = EXCLUDED.hold_amount,
                currency = EXCLUDED.currency,
                payment_method_id = EXCLUDED.payment_method_id,
                authorization_id = EXCLUDED.authorization_id,
                captured_amount = EXCLUDED.captured_amount,
                released_amount = EXCLUDED.released_amount,
                failure_reason = EXCLUDED.failure_reason,
                placed_at = EXCLUDED.placed_at,
                resolved_at = EXCLUDED.resolved_at,
                updated_at = EXCLUDED.updated_at",
            HOLD_COLUMNS
        ))
        .bind(hold.booking_id)
        .bind(hold.scheduled_at_utc)
        .bind(hold.pickup_at_utc)
        .bind(hold.status.as_str())
        .bind(hold.hold_amount)
        .bind(&hold.currency)
        .bind(hold.payment_method_id.expose())
        .bind(&hold.authorization_id)
        .bind(hold.captured_amount)
        .bind(hold.released_amount)
        .bind(&hold.failure_reason)
        .bind(hold.placed_at)
        .bind(hold.resolved_at)
        .bind(hold.created_at)
        .bind(hold.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> Result<Option<HoldSchedule>, StoreError> {
        let row = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {} FROM hold_schedules WHERE booking_id = $1",
            HOLD_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(HoldSchedule::try_from).transpose()
    }

    async fn transition(&self, hold: &HoldSchedule, expected: HoldStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE hold_schedules SET
                status = $3, authorization_id = $4, captured_amount = $5, released_amount = $6,
                failure_reason = $7, placed_at = $8, resolved_at = $9, updated_at = $10
             WHERE booking_id = $1 AND status = $2",
        )
        .bind(hold.booking_id)
        .bind(expected.as_str())
        .bind(hold.status.as_str())
        .bind(&hold.authorization_id)
        .bind(hold.captured_amount)
        .bind(hold.released_amount)
        .bind(&hold.failure_reason)
        .bind(hold.placed_at)
        .bind(hold.resolved_at)
        .bind(hold.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get(hold.booking_id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("hold for booking {}", hold.booking_id))),
        }
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<HoldSchedule>, StoreError> {
        let rows = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {} FROM hold_schedules
             WHERE status = 'pending' AND scheduled_at_utc <= $1
             ORDER BY scheduled_at_utc
             LIMIT $2",
            HOLD_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        into_holds(rows)
    }

    async fn list_by_status(&self, status: HoldStatus, limit: i64) -> Result<Vec<HoldSchedule>, StoreError> {
        let rows = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {} FROM hold_schedules WHERE status = $1 ORDER BY scheduled_at_utc LIMIT $2",
            HOLD_COLUMNS
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        into_holds(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn hold_row(status: &str) -> HoldRow {
        let now = Utc::now();
        HoldRow {
            booking_id: Uuid::new_v4(),
            scheduled_at_utc: now,
            pickup_at_utc: now + chrono::Duration::hours(48),
            status: status.to_string(),
            hold_amount: dec!(500),
            currency: "CAD".to_string(),
            payment_method_id: "pm_card_visa".to_string(),
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

    #[test]
    fn test_hold_row_keeps_payment_method_masked() {
        let hold = HoldSchedule::try_from(hold_row("pending")).unwrap();
        assert_eq!(hold.status, HoldStatus::Pending);
        assert_eq!(hold.payment_method_id.expose(), "pm_card_visa");
        assert_eq!(format!("{:?}", hold.payment_method_id), "********");
    }

    #[test]
    fn test_unknown_hold_status_is_rejected() {
        assert!(HoldSchedule::try_from(hold_row("voided")).is_err());
    }
}
