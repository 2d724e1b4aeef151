use rentline_core::alerts::{AlertKind, OperatorAlert, OperatorAlerts};
use rentline_core::lease::HoldLease;
use rentline_core::payment::PaymentAdapter;
use rentline_core::{CoreError, RequestContext};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{HoldResolution, HoldSchedule, HoldStatus, InspectionOutcome};
use crate::repository::HoldRepository;

/// Closes out a booking's hold after the equipment comes back.
///
/// Runs under the same per-booking lease as hold placement, so a capture
/// never overlaps a placement or another resolution of the same hold.
pub struct HoldResolutionHandler {
    holds: Arc<dyn HoldRepository>,
    payments: Arc<dyn PaymentAdapter>,
    lease: Arc<dyn HoldLease>,
    alerts: Arc<dyn OperatorAlerts>,
    lease_ttl: Duration,
}

impl HoldResolutionHandler {
    pub fn new(
        holds: Arc<dyn HoldRepository>,
        payments: Arc<dyn PaymentAdapter>,
        lease: Arc<dyn HoldLease>,
        alerts: Arc<dyn OperatorAlerts>,
    ) -> Self {
        Self {
            holds,
            payments,
            lease,
            alerts,
            lease_ttl: Duration::from_secs(60),
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Amount to capture for an outcome, never more than the hold
    pub fn capture_amount(outcome: &InspectionOutcome, hold_amount: Decimal) -> Result<Decimal, CoreError> {
        if let Some(damage) = outcome.damage_amount {
            if damage.is_sign_negative() && !damage.is_zero() {
                return Err(CoreError::PricingInputError(format!(
                    "damage amount must not be negative, got {}",
                    damage
                )));
            }
        }
        if outcome.clean {
            return Ok(Decimal::ZERO);
        }
        Ok(outcome.damage_amount.unwrap_or(Decimal::ZERO).min(hold_amount))
    }

    pub async fn resolve(
        &self,
        booking_id: Uuid,
        outcome: &InspectionOutcome,
        ctx: &RequestContext,
    ) -> Result<HoldResolution, CoreError> {
        if !self.lease.try_acquire(booking_id, self.lease_ttl).await? {
            return Err(CoreError::InvalidTransition {
                from: HoldStatus::Placed.to_string(),
                to: "resolving".to_string(),
            });
        }

        let result = self.resolve_leased(booking_id, outcome, ctx).await;

        if let Err(e) = self.lease.release(booking_id).await {
            warn!("Failed to release hold lease for booking {}: {}", booking_id, e);
        }
        result
    }

    async fn resolve_leased(
        &self,
        booking_id: Uuid,
        outcome: &InspectionOutcome,
        ctx: &RequestContext,
    ) -> Result<HoldResolution, CoreError> {
        let Some(mut hold) = self.holds.get(booking_id).await? else {
            let damage = Self::capture_amount(outcome, Decimal::MAX)?;
            return Ok(self.unsecured(booking_id, None, damage, ctx).await);
        };

        let capture = Self::capture_amount(outcome, hold.hold_amount)?;
        match hold.status {
            HoldStatus::Placed => {}
            HoldStatus::Failed | HoldStatus::Cancelled => {
                let damage = Self::capture_amount(outcome, Decimal::MAX)?;
                return Ok(self.unsecured(booking_id, Some(hold.status), damage, ctx).await);
            }
            HoldStatus::Pending => {
                // Never placed; it must not fire after the return
                hold.resolved_at = Some(ctx.now);
                hold.update_status(HoldStatus::Cancelled);
                if !self.holds.transition(&hold, HoldStatus::Pending).await? {
                    return Err(CoreError::SchedulingError(format!(
                        "hold for booking {} changed while closing it out",
                        booking_id
                    )));
                }
                let damage = Self::capture_amount(outcome, Decimal::MAX)?;
                return Ok(self.unsecured(booking_id, Some(HoldStatus::Cancelled), damage, ctx).await);
            }
            resolved @ (HoldStatus::Released | HoldStatus::Captured) => {
                return Err(CoreError::InvalidTransition {
                    from: resolved.to_string(),
                    to: if capture > Decimal::ZERO {
                        HoldStatus::Captured.to_string()
                    } else {
                        HoldStatus::Released.to_string()
                    },
                });
            }
        }

        let target = if capture > Decimal::ZERO {
            HoldStatus::Captured
        } else {
            HoldStatus::Released
        };
        let authorization_id = authorization_of(&hold)?;

        let captured = if capture > Decimal::ZERO {
            // The processor releases whatever is not captured
            self.payments
                .capture_hold(&authorization_id, capture, &hold.resolution_key())
                .await?
        } else {
            self.payments.release_hold(&authorization_id).await?;
            Decimal::ZERO
        };
        let released = hold.hold_amount - captured;

        hold.captured_amount = Some(captured);
        hold.released_amount = Some(released);
        hold.resolved_at = Some(ctx.now);
        hold.update_status(target);

        if !self.holds.transition(&hold, HoldStatus::Placed).await? {
            error!(
                "Hold for booking {} left placed state while authorization {} was being resolved",
                booking_id, authorization_id
            );
            return Err(CoreError::InvalidTransition {
                from: HoldStatus::Placed.to_string(),
                to: target.to_string(),
            });
        }

        info!(
            request_id = %ctx.request_id,
            "Hold for booking {} resolved: captured {}, released {}",
            booking_id, captured, released
        );
        Ok(HoldResolution {
            booking_id,
            status: Some(target),
            captured_amount: captured,
            released_amount: released,
        })
    }

    /// Nothing is authorized, so nothing moves at the processor. Damage is
    /// left to an operator.
    async fn unsecured(
        &self,
        booking_id: Uuid,
        status: Option<HoldStatus>,
        damage: Decimal,
        ctx: &RequestContext,
    ) -> HoldResolution {
        let state = status.map(|s| s.to_string()).unwrap_or_else(|| "missing".to_string());
        if damage > Decimal::ZERO {
            self.alerts
                .raise(OperatorAlert::new(
                    booking_id,
                    AlertKind::UnsecuredDamage,
                    format!(
                        "Inspection found {} of damage but the security hold is {}; collect it manually",
                        damage, state
                    ),
                ))
                .await;
        } else {
            info!(request_id = %ctx.request_id, "Booking {} returned clean with hold {}", booking_id, state);
        }

        HoldResolution {
            booking_id,
            status,
            captured_amount: Decimal::ZERO,
            released_amount: Decimal::ZERO,
        }
    }
}

fn authorization_of(hold: &HoldSchedule) -> Result<String, CoreError> {
    hold.authorization_id.clone().ok_or_else(|| {
        CoreError::InternalError(format!("placed hold for booking {} has no authorization", hold.booking_id))
    })
}
