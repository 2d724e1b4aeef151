use chrono::Duration;
use rentline_core::alerts::{AlertKind, OperatorAlert, OperatorAlerts};
use rentline_core::lease::HoldLease;
use rentline_core::payment::{HoldRequest, PaymentAdapter};
use rentline_core::{CoreError, RequestContext};
use rentline_shared::Masked;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{Booking, HoldSchedule, HoldStatus};
use crate::repository::HoldRepository;

#[derive(Debug, Clone)]
pub struct HoldSchedulerConfig {
    /// How long before pickup the hold is placed
    pub lead: Duration,
    pub currency: String,
    pub lease_ttl: std::time::Duration,
    pub sweep_batch_size: i64,
    /// A due hold found later than this after its instant raises an alert
    pub late_alert_after: Duration,
}

impl Default for HoldSchedulerConfig {
    fn default() -> Self {
        Self {
            lead: Duration::hours(48),
            currency: "CAD".to_string(),
            lease_ttl: std::time::Duration::from_secs(60),
            sweep_batch_size: 100,
            late_alert_after: Duration::minutes(15),
        }
    }
}

/// Outcome of one reconciliation sweep
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub placed: usize,
    pub failed: usize,
    pub late: usize,
    /// Due holds another worker was already placing
    pub skipped: usize,
    pub errors: usize,
}

/// Places each booking's security hold at most once, at T-lead.
///
/// Holds are durable rows, not timers: `reconcile` finds every pending hold
/// whose instant has passed, so a restart between confirmation and T-48
/// loses nothing. Placement is serialized per booking by the lease, guarded
/// by a status compare-and-set, and deduplicated at the processor by the
/// idempotency key.
pub struct HoldScheduler {
    holds: Arc<dyn HoldRepository>,
    payments: Arc<dyn PaymentAdapter>,
    lease: Arc<dyn HoldLease>,
    alerts: Arc<dyn OperatorAlerts>,
    config: HoldSchedulerConfig,
}

impl HoldScheduler {
    pub fn new(
        holds: Arc<dyn HoldRepository>,
        payments: Arc<dyn PaymentAdapter>,
        lease: Arc<dyn HoldLease>,
        alerts: Arc<dyn OperatorAlerts>,
        config: HoldSchedulerConfig,
    ) -> Self {
        Self {
            holds,
            payments,
            lease,
            alerts,
            config,
        }
    }

    pub fn config(&self) -> &HoldSchedulerConfig {
        &self.config
    }

    /// Enqueue the hold of a confirmed booking. A booking confirmed inside the
    /// lead window gets its hold placed right away.
    pub async fn schedule(
        &self,
        booking: &Booking,
        payment_method_id: Masked<String>,
        ctx: &RequestContext,
    ) -> Result<HoldSchedule, CoreError> {
        let hold = HoldSchedule::for_booking(booking, self.config.lead, &self.config.currency, payment_method_id);
        self.holds.upsert(&hold).await?;
        info!(
            request_id = %ctx.request_id,
            "Hold for booking {} scheduled at {}",
            booking.id, hold.scheduled_at_utc
        );

        if hold.scheduled_at_utc <= ctx.now {
            info!("Booking {} is inside the hold lead window, placing now", booking.id);
            return self.place(booking.id, ctx).await;
        }
        Ok(hold)
    }

    /// Attempt placement of one booking's hold. Safe to call any number of
    /// times, concurrently: only a `pending` hold is ever sent to the processor.
    pub async fn place(&self, booking_id: Uuid, ctx: &RequestContext) -> Result<HoldSchedule, CoreError> {
        if !self.lease.try_acquire(booking_id, self.config.lease_ttl).await? {
            info!("Hold placement for booking {} already in flight", booking_id);
            return self.load(booking_id).await;
        }

        let result = self.place_leased(booking_id, ctx).await;

        if let Err(e) = self.lease.release(booking_id).await {
            warn!("Failed to release hold lease for booking {}: {}", booking_id, e);
        }
        result
    }

    async fn place_leased(&self, booking_id: Uuid, ctx: &RequestContext) -> Result<HoldSchedule, CoreError> {
        let mut hold = self.load(booking_id).await?;
        if hold.status != HoldStatus::Pending {
            return Ok(hold);
        }

        let request = HoldRequest {
            booking_id,
            amount: hold.hold_amount,
            currency: hold.currency.clone(),
            payment_method_id: hold.payment_method_id.clone(),
            idempotency_key: hold.idempotency_key(),
        };

        match self.payments.place_hold(&request).await {
            Ok(authorization) => {
                hold.authorization_id = Some(authorization.authorization_id.clone());
                hold.placed_at = Some(ctx.now);
                hold.update_status(HoldStatus::Placed);

                if !self.holds.transition(&hold, HoldStatus::Pending).await? {
                    // Retracted while the processor call was in flight
                    warn!(
                        "Hold for booking {} left pending state during placement, releasing {}",
                        booking_id, authorization.authorization_id
                    );
                    self.release_authorization(booking_id, &authorization.authorization_id)
                        .await?;
                    return self.load(booking_id).await;
                }

                info!(
                    request_id = %ctx.request_id,
                    "Placed {} {} hold for booking {}",
                    hold.hold_amount, hold.currency, booking_id
                );
                Ok(hold)
            }
            Err(failure) => {
                hold.failure_reason = Some(failure.to_string());
                hold.update_status(HoldStatus::Failed);
                if !self.holds.transition(&hold, HoldStatus::Pending).await? {
                    info!(
                        "Hold for booking {} was retracted during a failed placement: {}",
                        booking_id, failure
                    );
                    return self.load(booking_id).await;
                }

                error!("Hold placement failed for booking {}: {}", booking_id, failure);

                self.alerts
                    .raise(OperatorAlert::new(
                        booking_id,
                        AlertKind::HoldPlacementFailed,
                        format!(
                            "Security hold of {} {} could not be placed before pickup at {}: {}",
                            hold.hold_amount, hold.currency, hold.pickup_at_utc, failure
                        ),
                    ))
                    .await;
                Ok(hold)
            }
        }
    }

    /// Place every pending hold whose instant has passed
    pub async fn reconcile(&self, ctx: &RequestContext) -> Result<SweepReport, CoreError> {
        let due = self.holds.list_due(ctx.now, self.config.sweep_batch_size).await?;
        let mut report = SweepReport {
            examined: due.len(),
            ..SweepReport::default()
        };

        for pending in due {
            let overdue = ctx.now - pending.scheduled_at_utc;
            if overdue > self.config.late_alert_after {
                report.late += 1;
                warn!(
                    "Hold for booking {} fired {} minutes late",
                    pending.booking_id,
                    overdue.num_minutes()
                );
                self.alerts
                    .raise(OperatorAlert::new(
                        pending.booking_id,
                        AlertKind::HoldFiredLate,
                        format!(
                            "Hold scheduled for {} was still pending {} minutes later",
                            pending.scheduled_at_utc,
                            overdue.num_minutes()
                        ),
                    ))
                    .await;
            }

            match self.place(pending.booking_id, ctx).await {
                Ok(hold) => match hold.status {
                    HoldStatus::Placed => report.placed += 1,
                    HoldStatus::Failed => report.failed += 1,
                    _ => report.skipped += 1,
                },
                Err(e) => {
                    error!("Sweep could not place hold for booking {}: {}", pending.booking_id, e);
                    report.errors += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                request_id = %ctx.request_id,
                "Hold sweep: {} due, {} placed, {} failed, {} late",
                report.examined, report.placed, report.failed, report.late
            );
        }
        Ok(report)
    }

    /// Retract a booking's hold: cancel it while pending, release it through
    /// the processor once placed. Resolved holds are returned untouched.
    pub async fn retract(&self, booking_id: Uuid, ctx: &RequestContext) -> Result<Option<HoldSchedule>, CoreError> {
        // A pending hold can turn placed between the read and the write;
        // the second pass then releases it.
        for _ in 0..2 {
            let Some(mut hold) = self.holds.get(booking_id).await? else {
                return Ok(None);
            };

            match hold.status {
                HoldStatus::Pending => {
                    hold.resolved_at = Some(ctx.now);
                    hold.update_status(HoldStatus::Cancelled);
                    if self.holds.transition(&hold, HoldStatus::Pending).await? {
                        info!("Pending hold for booking {} cancelled", booking_id);
                        return Ok(Some(hold));
                    }
                }
                HoldStatus::Placed => return self.release_placed(hold, ctx).await.map(Some),
                _ => return Ok(Some(hold)),
            }
        }
        Err(CoreError::SchedulingError(format!(
            "hold for booking {} kept changing during retraction",
            booking_id
        )))
    }

    async fn release_placed(&self, mut hold: HoldSchedule, ctx: &RequestContext) -> Result<HoldSchedule, CoreError> {
        let authorization_id = hold.authorization_id.clone().ok_or_else(|| {
            CoreError::InternalError(format!("placed hold for booking {} has no authorization", hold.booking_id))
        })?;
        self.release_authorization(hold.booking_id, &authorization_id).await?;

        hold.captured_amount = Some(Decimal::ZERO);
        hold.released_amount = Some(hold.hold_amount);
        hold.resolved_at = Some(ctx.now);
        hold.update_status(HoldStatus::Released);
        if !self.holds.transition(&hold, HoldStatus::Placed).await? {
            return self.load(hold.booking_id).await;
        }
        info!("Placed hold for booking {} released", hold.booking_id);
        Ok(hold)
    }

    pub async fn hold_for(&self, booking_id: Uuid) -> Result<Option<HoldSchedule>, CoreError> {
        Ok(self.holds.get(booking_id).await?)
    }

    /// Holds waiting on an operator
    pub async fn failed_holds(&self, limit: i64) -> Result<Vec<HoldSchedule>, CoreError> {
        Ok(self.holds.list_by_status(HoldStatus::Failed, limit).await?)
    }

    /// Release at the processor; a failure leaves money authorized, so it goes to an operator
    async fn release_authorization(&self, booking_id: Uuid, authorization_id: &str) -> Result<(), CoreError> {
        if let Err(failure) = self.payments.release_hold(authorization_id).await {
            self.alerts
                .raise(OperatorAlert::new(
                    booking_id,
                    AlertKind::HoldReleaseFailed,
                    format!("Authorization {} could not be released: {}", authorization_id, failure),
                ))
                .await;
            return Err(failure.into());
        }
        Ok(())
    }

    async fn load(&self, booking_id: Uuid) -> Result<HoldSchedule, CoreError> {
        self.holds
            .get(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("hold for booking {}", booking_id)))
    }
}
