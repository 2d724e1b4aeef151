use rentline_core::CoreError;

use crate::models::{Booking, BookingStatus};

/// Booking lifecycle transitions. Each method checks the source state and
/// moves the booking; persistence is the caller's job.
pub struct BookingManager;

impl BookingManager {
    /// Transition: Draft → AwaitingAvailability (date range submitted)
    pub fn submit(booking: &mut Booking) -> Result<(), BookingError> {
        Self::expect(booking, &[BookingStatus::Draft], BookingStatus::AwaitingAvailability)?;
        booking.update_status(BookingStatus::AwaitingAvailability);
        Ok(())
    }

    /// Transition: AwaitingAvailability → AwaitingCardVerification (re-check found no conflict)
    pub fn availability_confirmed(booking: &mut Booking) -> Result<(), BookingError> {
        Self::expect(
            booking,
            &[BookingStatus::AwaitingAvailability],
            BookingStatus::AwaitingCardVerification,
        )?;
        booking.update_status(BookingStatus::AwaitingCardVerification);
        Ok(())
    }

    /// Transition back to Draft after losing an availability race, either at
    /// the re-check or at the final reserve during confirmation
    pub fn availability_lost(booking: &mut Booking) -> Result<(), BookingError> {
        Self::expect(
            booking,
            &[BookingStatus::AwaitingAvailability, BookingStatus::AwaitingCardVerification],
            BookingStatus::Draft,
        )?;
        booking.update_status(BookingStatus::Draft);
        Ok(())
    }

    /// Transition: AwaitingCardVerification → Confirmed
    pub fn confirm(booking: &mut Booking) -> Result<(), BookingError> {
        Self::expect(
            booking,
            &[BookingStatus::AwaitingCardVerification],
            BookingStatus::Confirmed,
        )?;
        booking.update_status(BookingStatus::Confirmed);
        Ok(())
    }

    /// Cancel from any non-terminal state
    pub fn cancel(booking: &mut Booking) -> Result<(), BookingError> {
        if booking.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Cancelled.to_string(),
            });
        }
        booking.update_status(BookingStatus::Cancelled);
        Ok(())
    }

    /// Transition: Confirmed → Completed (returned and hold resolved)
    pub fn complete(booking: &mut Booking) -> Result<(), BookingError> {
        Self::expect(booking, &[BookingStatus::Confirmed], BookingStatus::Completed)?;
        booking.update_status(BookingStatus::Completed);
        Ok(())
    }

    fn expect(
        booking: &Booking,
        allowed: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<(), BookingError> {
        if !allowed.contains(&booking.status) {
            return Err(BookingError::InvalidTransition {
                from: booking.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl From<BookingError> for CoreError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::InvalidTransition { from, to } => CoreError::InvalidTransition { from, to },
        }
    }
}
