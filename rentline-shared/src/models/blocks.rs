use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Why a date range on a resource is unavailable
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Booked,
    Maintenance,
    Blackout,
    Buffer,
    Reserved,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Booked => "booked",
            BlockReason::Maintenance => "maintenance",
            BlockReason::Blackout => "blackout",
            BlockReason::Buffer => "buffer",
            BlockReason::Reserved => "reserved",
        }
    }

    /// Whether a new booking request may not overlap a block of this reason.
    /// Buffer blocks only shade the calendar.
    pub fn blocks_new_booking(&self) -> bool {
        match self {
            BlockReason::Booked
            | BlockReason::Reserved
            | BlockReason::Blackout
            | BlockReason::Maintenance => true,
            BlockReason::Buffer => false,
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(BlockReason::Booked),
            "maintenance" => Ok(BlockReason::Maintenance),
            "blackout" => Ok(BlockReason::Blackout),
            "buffer" => Ok(BlockReason::Buffer),
            "reserved" => Ok(BlockReason::Reserved),
            other => Err(format!("unknown block reason: {}", other)),
        }
    }
}

/// A date range on a resource marking it unavailable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityBlock {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub reason: BlockReason,

    /// Set for `booked` blocks created by a confirmed booking
    pub booking_id: Option<Uuid>,

    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityBlock {
    /// Block covering whole days `first..=last` (midnight UTC on both ends)
    pub fn for_days(
        resource_id: Uuid,
        first: NaiveDate,
        last: NaiveDate,
        reason: BlockReason,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id,
            start_utc: midnight_utc(first),
            end_utc: midnight_utc(last),
            reason,
            booking_id: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_booking(mut self, booking_id: Uuid) -> Self {
        self.booking_id = Some(booking_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// First blocked day, normalized to its UTC calendar day
    pub fn first_day(&self) -> NaiveDate {
        self.start_utc.date_naive()
    }

    /// Last blocked day (inclusive), normalized to its UTC calendar day
    pub fn last_day(&self) -> NaiveDate {
        self.end_utc.date_naive()
    }

    pub fn covers(&self, day: NaiveDate) -> bool {
        self.first_day() <= day && day <= self.last_day()
    }

    /// Inclusive-both-ends overlap on normalized days
    pub fn overlaps_days(&self, first: NaiveDate, last: NaiveDate) -> bool {
        self.first_day() <= last && first <= self.last_day()
    }

    /// Whether `self`, already stored, prevents `candidate` from being created.
    /// A block never conflicts with itself, and buffer candidates never conflict.
    pub fn conflicts_with(&self, candidate: &AvailabilityBlock) -> bool {
        self.id != candidate.id
            && self.resource_id == candidate.resource_id
            && self.reason.blocks_new_booking()
            && candidate.reason.blocks_new_booking()
            && self.overlaps_days(candidate.first_day(), candidate.last_day())
    }
}

pub fn midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_overlap_is_inclusive_on_both_ends() {
        let block = AvailabilityBlock::for_days(Uuid::new_v4(), day(2026, 11, 10), day(2026, 11, 12), BlockReason::Booked);

        assert!(block.overlaps_days(day(2026, 11, 12), day(2026, 11, 14)));
        assert!(block.overlaps_days(day(2026, 11, 8), day(2026, 11, 10)));
        assert!(!block.overlaps_days(day(2026, 11, 13), day(2026, 11, 15)));
    }

    #[test]
    fn test_days_ignore_time_of_day() {
        let mut block = AvailabilityBlock::for_days(Uuid::new_v4(), day(2026, 11, 10), day(2026, 11, 10), BlockReason::Maintenance);
        block.start_utc = Utc.with_ymd_and_hms(2026, 11, 10, 23, 59, 0).unwrap();
        block.end_utc = Utc.with_ymd_and_hms(2026, 11, 10, 0, 1, 0).unwrap();

        assert!(block.covers(day(2026, 11, 10)));
        assert!(!block.covers(day(2026, 11, 11)));
    }

    #[test]
    fn test_reason_round_trips_through_str() {
        for reason in [BlockReason::Booked, BlockReason::Maintenance, BlockReason::Blackout, BlockReason::Buffer, BlockReason::Reserved] {
            assert_eq!(reason.as_str().parse::<BlockReason>().unwrap(), reason);
        }
        assert!(!BlockReason::Buffer.blocks_new_booking());
        assert!(BlockReason::Blackout.blocks_new_booking());
    }
}
