use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::pricing::PricingError;

/// Driving distance in km, rounded to one decimal place exactly once.
///
/// The only way to obtain one is from the raw provider value (or from an
/// already-stored value, which re-rounds to the same number), so every fee
/// and every displayed leg is computed from the same rounded distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct RoundedDistance(Decimal);

impl RoundedDistance {
    pub fn from_raw_km(raw_km: f64) -> Result<Self, PricingError> {
        if !raw_km.is_finite() {
            return Err(PricingError::InvalidDistance(raw_km.to_string()));
        }
        let km = Decimal::from_f64(raw_km)
            .ok_or_else(|| PricingError::InvalidDistance(raw_km.to_string()))?;
        Self::try_from(km)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn km(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for RoundedDistance {
    type Error = PricingError;

    fn try_from(km: Decimal) -> Result<Self, Self::Error> {
        if km.is_sign_negative() && !km.is_zero() {
            return Err(PricingError::InvalidDistance(km.to_string()));
        }
        Ok(Self(km.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)))
    }
}

impl From<RoundedDistance> for Decimal {
    fn from(distance: RoundedDistance) -> Self {
        distance.0
    }
}

impl std::fmt::Display for RoundedDistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} km", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Delivery,
    Pickup,
}

/// Flat fee per leg up to `included_km`, then `per_km` per excess km per leg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryPolicy {
    pub leg_fee: Decimal,
    pub included_km: Decimal,
    pub per_km: Decimal,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            leg_fee: Decimal::from(150),
            included_km: Decimal::from(30),
            per_km: Decimal::from(3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegCharge {
    pub leg: Leg,
    pub base_fee: Decimal,
    pub excess_km: Decimal,
    pub excess_fee: Decimal,
    pub total: Decimal,
}

/// Per-leg display of a delivery fee. `total` always equals the sum of the legs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryBreakdown {
    pub distance_km: RoundedDistance,
    pub legs: Vec<LegCharge>,
    pub total: Decimal,
}

impl DeliveryPolicy {
    pub fn validate(&self) -> Result<(), PricingError> {
        for (field, value) in [
            ("leg_fee", self.leg_fee),
            ("included_km", self.included_km),
            ("per_km", self.per_km),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(PricingError::NegativeAmount { field, value });
            }
        }
        Ok(())
    }

    pub fn excess_km(&self, distance: RoundedDistance) -> Decimal {
        (distance.km() - self.included_km).max(Decimal::ZERO)
    }

    pub fn breakdown(&self, distance: RoundedDistance) -> DeliveryBreakdown {
        let excess_km = self.excess_km(distance);
        let legs: Vec<LegCharge> = [Leg::Delivery, Leg::Pickup]
            .into_iter()
            .map(|leg| {
                let excess_fee = excess_km * self.per_km;
                LegCharge {
                    leg,
                    base_fee: self.leg_fee,
                    excess_km,
                    excess_fee,
                    total: self.leg_fee + excess_fee,
                }
            })
            .collect();
        let total = legs.iter().map(|l| l.total).sum();

        DeliveryBreakdown {
            distance_km: distance,
            legs,
            total,
        }
    }

    /// `2F + 2C * max(0, d - K)`
    pub fn fee(&self, distance: RoundedDistance) -> Decimal {
        self.breakdown(distance).total
    }
}
