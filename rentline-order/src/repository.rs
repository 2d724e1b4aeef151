use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentline_core::StoreError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, HoldSchedule, HoldStatus};

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Writes `booking` only if the stored status is still `expected`.
    /// Returns `false` when another writer got there first.
    async fn update_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait HoldRepository: Send + Sync {
    /// Insert, or replace the entry of the same booking
    async fn upsert(&self, hold: &HoldSchedule) -> Result<(), StoreError>;

    async fn get(&self, booking_id: Uuid) -> Result<Option<HoldSchedule>, StoreError>;

    /// Compare-and-set on status: writes `hold` only if the stored status is `expected`
    async fn transition(&self, hold: &HoldSchedule, expected: HoldStatus) -> Result<bool, StoreError>;

    /// Pending holds scheduled at or before `now`, oldest first
    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<HoldSchedule>, StoreError>;

    async fn list_by_status(&self, status: HoldStatus, limit: i64) -> Result<Vec<HoldSchedule>, StoreError>;
}

#[derive(Default)]
pub struct MemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        self.bookings.write().await.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(&booking_id).cloned())
    }

    async fn update_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<bool, StoreError> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get_mut(&booking.id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", booking.id)))?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = booking.clone();
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryHoldRepository {
    holds: RwLock<HashMap<Uuid, HoldSchedule>>,
}

impl MemoryHoldRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HoldRepository for MemoryHoldRepository {
    async fn upsert(&self, hold: &HoldSchedule) -> Result<(), StoreError> {
        self.holds.write().await.insert(hold.booking_id, hold.clone());
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> Result<Option<HoldSchedule>, StoreError> {
        Ok(self.holds.read().await.get(&booking_id).cloned())
    }

    async fn transition(&self, hold: &HoldSchedule, expected: HoldStatus) -> Result<bool, StoreError> {
        let mut holds = self.holds.write().await;
        let stored = holds
            .get_mut(&hold.booking_id)
            .ok_or_else(|| StoreError::NotFound(format!("hold for booking {}", hold.booking_id)))?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = hold.clone();
        Ok(true)
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<HoldSchedule>, StoreError> {
        let holds = self.holds.read().await;
        let mut due: Vec<HoldSchedule> = holds.values().filter(|h| h.is_due(now)).cloned().collect();
        due.sort_by_key(|h| h.scheduled_at_utc);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn list_by_status(&self, status: HoldStatus, limit: i64) -> Result<Vec<HoldSchedule>, StoreError> {
        let holds = self.holds.read().await;
        let mut found: Vec<HoldSchedule> = holds.values().filter(|h| h.status == status).cloned().collect();
        found.sort_by_key(|h| h.scheduled_at_utc);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }
}
