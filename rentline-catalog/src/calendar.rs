use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rentline_shared::{AvailabilityBlock, BlockReason};
use serde::{Deserialize, Serialize};

use crate::selection::SelectionError;

/// Calendar day of `ts` in UTC. Every day comparison goes through this.
pub fn utc_day<Tz: TimeZone>(ts: &DateTime<Tz>) -> NaiveDate {
    ts.with_timezone(&Utc).date_naive()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Past,
    Booked,
    Reserved,
    Maintenance,
    Blackout,
    Buffer,
}

impl UnavailableReason {
    /// Higher wins when several blocks cover the same day
    fn precedence(&self) -> u8 {
        match self {
            UnavailableReason::Past => 6,
            UnavailableReason::Booked => 5,
            UnavailableReason::Reserved => 4,
            UnavailableReason::Maintenance => 3,
            UnavailableReason::Blackout => 2,
            UnavailableReason::Buffer => 1,
        }
    }
}

impl From<BlockReason> for UnavailableReason {
    fn from(reason: BlockReason) -> Self {
        match reason {
            BlockReason::Booked => UnavailableReason::Booked,
            BlockReason::Reserved => UnavailableReason::Reserved,
            BlockReason::Maintenance => UnavailableReason::Maintenance,
            BlockReason::Blackout => UnavailableReason::Blackout,
            BlockReason::Buffer => UnavailableReason::Buffer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub available: bool,
    pub reason: Option<UnavailableReason>,
}

/// Availability of one normalized day against a block set.
/// Pure: same inputs, same answer.
pub fn availability_for(
    date: NaiveDate,
    today: NaiveDate,
    blocks: &[AvailabilityBlock],
) -> DayAvailability {
    if date < today {
        return DayAvailability {
            date,
            available: false,
            reason: Some(UnavailableReason::Past),
        };
    }

    let reason = blocks
        .iter()
        .filter(|b| b.covers(date))
        .map(|b| UnavailableReason::from(b.reason))
        .max_by_key(|r| r.precedence());

    DayAvailability {
        date,
        available: reason.is_none(),
        reason,
    }
}

/// Same as `availability_for` for an arbitrary timestamp in any zone
pub fn availability_at<Tz: TimeZone>(
    ts: &DateTime<Tz>,
    today: NaiveDate,
    blocks: &[AvailabilityBlock],
) -> DayAvailability {
    availability_for(utc_day(ts), today, blocks)
}

/// First and last day of a calendar month
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), SelectionError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(SelectionError::InvalidMonth { year, month })?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or(SelectionError::InvalidMonth { year, month })?;

    Ok((first, next - Duration::days(1)))
}

/// One entry per day of the month, in order
pub fn month_grid(
    year: i32,
    month: u32,
    today: NaiveDate,
    blocks: &[AvailabilityBlock],
) -> Result<Vec<DayAvailability>, SelectionError> {
    let (first, last) = month_bounds(year, month)?;
    Ok(first
        .iter_days()
        .take_while(|d| *d <= last)
        .map(|d| availability_for(d, today, blocks))
        .collect())
}

/// Every block that would prevent booking `first..=last`
pub fn conflicts<'a>(
    first: NaiveDate,
    last: NaiveDate,
    blocks: &'a [AvailabilityBlock],
) -> Vec<&'a AvailabilityBlock> {
    blocks
        .iter()
        .filter(|b| b.reason.blocks_new_booking() && b.overlaps_days(first, last))
        .collect()
}

pub fn first_conflict(
    first: NaiveDate,
    last: NaiveDate,
    blocks: &[AvailabilityBlock],
) -> Option<&AvailabilityBlock> {
    conflicts(first, last, blocks).into_iter().next()
}

/// Earliest start after `start` where a range of the same length fits,
/// looking at most `horizon_days` ahead
pub fn next_available_start(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    blocks: &[AvailabilityBlock],
    horizon_days: i64,
) -> Option<NaiveDate> {
    let span = end - start;
    (1..=horizon_days)
        .map(|offset| start + Duration::days(offset))
        .filter(|candidate| *candidate >= today)
        .find(|candidate| first_conflict(*candidate, *candidate + span, blocks).is_none())
}

/// Checks a requested range and returns its rental day count
pub fn validate_range(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Result<i64, SelectionError> {
    if start == end {
        return Err(SelectionError::SameDay(start));
    }
    if end < start {
        return Err(SelectionError::EndBeforeStart { start, end });
    }
    if start < today {
        return Err(SelectionError::StartInPast(start));
    }
    Ok((end - start).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use uuid::Uuid;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn block(resource: Uuid, first: NaiveDate, last: NaiveDate, reason: BlockReason) -> AvailabilityBlock {
        AvailabilityBlock::for_days(resource, first, last, reason)
    }

    #[test]
    fn test_past_day_wins_over_everything() {
        let resource = Uuid::new_v4();
        let blocks = vec![block(resource, day(2026, 3, 1), day(2026, 3, 5), BlockReason::Booked)];

        let result = availability_for(day(2026, 3, 2), day(2026, 3, 3), &blocks);
        assert!(!result.available);
        assert_eq!(result.reason, Some(UnavailableReason::Past));
    }

    #[test]
    fn test_block_end_day_is_inclusive() {
        let resource = Uuid::new_v4();
        let blocks = vec![block(resource, day(2026, 3, 10), day(2026, 3, 12), BlockReason::Maintenance)];
        let today = day(2026, 3, 1);

        assert!(!availability_for(day(2026, 3, 12), today, &blocks).available);
        assert!(availability_for(day(2026, 3, 13), today, &blocks).available);
        assert!(availability_for(day(2026, 3, 9), today, &blocks).available);
    }

    #[test]
    fn test_reason_precedence_booked_over_blackout() {
        let resource = Uuid::new_v4();
        let blocks = vec![
            block(resource, day(2026, 3, 10), day(2026, 3, 10), BlockReason::Buffer),
            block(resource, day(2026, 3, 1), day(2026, 3, 31), BlockReason::Blackout),
            block(resource, day(2026, 3, 9), day(2026, 3, 11), BlockReason::Booked),
        ];

        let result = availability_for(day(2026, 3, 10), day(2026, 3, 1), &blocks);
        assert_eq!(result.reason, Some(UnavailableReason::Booked));
    }

    #[test]
    fn test_availability_is_idempotent() {
        let resource = Uuid::new_v4();
        let blocks = vec![block(resource, day(2026, 4, 2), day(2026, 4, 4), BlockReason::Reserved)];
        let first = availability_for(day(2026, 4, 3), day(2026, 4, 1), &blocks);
        let second = availability_for(day(2026, 4, 3), day(2026, 4, 1), &blocks);
        assert_eq!(first, second);
    }

    #[test]
    fn test_timestamp_normalized_to_utc_day() {
        let resource = Uuid::new_v4();
        let blocks = vec![block(resource, day(2026, 5, 2), day(2026, 5, 2), BlockReason::Blackout)];

        // 2026-05-01 20:00 at UTC-06:00 is 2026-05-02 02:00 UTC
        let offset = FixedOffset::west_opt(6 * 3600).unwrap();
        let ts = offset.with_ymd_and_hms(2026, 5, 1, 20, 0, 0).unwrap();

        let result = availability_at(&ts, day(2026, 4, 1), &blocks);
        assert_eq!(result.date, day(2026, 5, 2));
        assert_eq!(result.reason, Some(UnavailableReason::Blackout));
    }

    #[test]
    fn test_month_grid_covers_every_day() {
        let grid = month_grid(2028, 2, day(2028, 1, 1), &[]).unwrap();
        assert_eq!(grid.len(), 29);
        assert!(grid.iter().all(|d| d.available));
        assert!(month_grid(2028, 13, day(2028, 1, 1), &[]).is_err());
    }

    #[test]
    fn test_buffer_never_conflicts() {
        let resource = Uuid::new_v4();
        let blocks = vec![block(resource, day(2026, 6, 1), day(2026, 6, 3), BlockReason::Buffer)];
        assert!(first_conflict(day(2026, 6, 2), day(2026, 6, 4), &blocks).is_none());
    }

    #[test]
    fn test_next_available_start_skips_conflicts() {
        let resource = Uuid::new_v4();
        let blocks = vec![block(resource, day(2026, 6, 3), day(2026, 6, 6), BlockReason::Booked)];

        let next = next_available_start(day(2026, 6, 1), day(2026, 6, 3), day(2026, 5, 20), &blocks, 30);
        assert_eq!(next, Some(day(2026, 6, 7)));

        let none = next_available_start(day(2026, 6, 1), day(2026, 6, 3), day(2026, 5, 20), &blocks, 3);
        assert_eq!(none, None);
    }

    #[test]
    fn test_validate_range() {
        let today = day(2026, 6, 1);
        assert_eq!(validate_range(day(2026, 6, 2), day(2026, 6, 4), today).unwrap(), 2);
        assert!(matches!(
            validate_range(day(2026, 6, 2), day(2026, 6, 2), today),
            Err(SelectionError::SameDay(_))
        ));
        assert!(matches!(
            validate_range(day(2026, 5, 30), day(2026, 6, 2), today),
            Err(SelectionError::StartInPast(_))
        ));
        assert!(matches!(
            validate_range(day(2026, 6, 4), day(2026, 6, 2), today),
            Err(SelectionError::EndBeforeStart { .. })
        ));
    }
}
