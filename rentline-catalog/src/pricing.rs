use rentline_core::CoreError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::delivery::{DeliveryBreakdown, DeliveryPolicy, RoundedDistance};
use crate::discount::DiscountDescriptor;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("Rental must be at least one day, got {0}")]
    NonPositiveDays(i64),

    #[error("{field} must not be negative, got {value}")]
    NegativeAmount { field: &'static str, value: Decimal },

    #[error("Invalid distance: {0}")]
    InvalidDistance(String),

    #[error("Malformed discount: {0}")]
    MalformedDiscount(String),
}

impl From<PricingError> for CoreError {
    fn from(err: PricingError) -> Self {
        CoreError::PricingInputError(err.to_string())
    }
}

/// Business constants the engine prices with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRules {
    pub daily_rate: Decimal,
    pub waiver_daily_rate: Decimal,
    pub tax_rate: Decimal,
    pub delivery: DeliveryPolicy,

    /// Security hold, reported next to the quote but never part of `total`
    pub hold_amount: Decimal,

    pub currency: String,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            daily_rate: Decimal::from(450),
            waiver_daily_rate: Decimal::from(29),
            tax_rate: Decimal::new(15, 2),
            delivery: DeliveryPolicy::default(),
            hold_amount: Decimal::from(500),
            currency: "CAD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingInput {
    pub days: i64,
    pub daily_rate: Decimal,
    pub distance: RoundedDistance,
    pub waiver_selected: bool,
    pub waiver_daily_rate: Decimal,
    pub discount: Option<DiscountDescriptor>,
    pub tax_rate: Decimal,
}

/// Itemized price. Fields hold unrounded amounts; use `rounded()` for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub days: i64,
    pub daily_rate: Decimal,
    pub subtotal_equipment: Decimal,
    pub delivery_fee: Decimal,
    pub waiver_cost: Decimal,
    pub discount_amount: Decimal,
    pub subtotal_after_discount: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
    pub hold_amount: Decimal,
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl PriceQuote {
    pub fn subtotal_before_discount(&self) -> Decimal {
        self.subtotal_equipment + self.delivery_fee + self.waiver_cost
    }

    /// Display copy, every amount at 2 decimals
    pub fn rounded(&self) -> PriceQuote {
        PriceQuote {
            days: self.days,
            daily_rate: money(self.daily_rate),
            subtotal_equipment: money(self.subtotal_equipment),
            delivery_fee: money(self.delivery_fee),
            waiver_cost: money(self.waiver_cost),
            discount_amount: money(self.discount_amount),
            subtotal_after_discount: money(self.subtotal_after_discount),
            taxes: money(self.taxes),
            total: money(self.total),
            hold_amount: money(self.hold_amount),
        }
    }

    /// Whether `total` is reproduced from the itemized fields
    pub fn reconciles(&self, tax_rate: Decimal) -> bool {
        let after_discount = self.subtotal_before_discount() - self.discount_amount;
        after_discount == self.subtotal_after_discount
            && money(after_discount + after_discount * tax_rate) == money(self.total)
    }
}

fn non_negative(field: &'static str, value: Decimal) -> Result<(), PricingError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(PricingError::NegativeAmount { field, value });
    }
    Ok(())
}

/// The fixed pipeline: equipment, delivery, waiver, discount, tax.
/// Pure; nothing is rounded between steps.
pub fn price(
    input: &PricingInput,
    delivery: &DeliveryPolicy,
    hold_amount: Decimal,
) -> Result<PriceQuote, PricingError> {
    if input.days <= 0 {
        return Err(PricingError::NonPositiveDays(input.days));
    }
    non_negative("daily_rate", input.daily_rate)?;
    non_negative("waiver_daily_rate", input.waiver_daily_rate)?;
    non_negative("tax_rate", input.tax_rate)?;
    non_negative("hold_amount", hold_amount)?;
    delivery.validate()?;

    let days = Decimal::from(input.days);

    let subtotal_equipment = days * input.daily_rate;
    let delivery_fee = delivery.fee(input.distance);
    let waiver_cost = if input.waiver_selected {
        days * input.waiver_daily_rate
    } else {
        Decimal::ZERO
    };
    let subtotal_before_discount = subtotal_equipment + delivery_fee + waiver_cost;

    let discount_amount = match &input.discount {
        Some(discount) => {
            discount.validate_shape()?;
            discount.amount_for(subtotal_before_discount)
        }
        None => Decimal::ZERO,
    };
    let subtotal_after_discount = subtotal_before_discount - discount_amount;
    let taxes = subtotal_after_discount * input.tax_rate;
    let total = subtotal_after_discount + taxes;

    Ok(PriceQuote {
        days: input.days,
        daily_rate: input.daily_rate,
        subtotal_equipment,
        delivery_fee,
        waiver_cost,
        discount_amount,
        subtotal_after_discount,
        taxes,
        total,
        hold_amount,
    })
}

/// Applies the configured `PricingRules` to booking inputs
#[derive(Debug, Clone)]
pub struct PricingEngine {
    rules: PricingRules,
}

impl PricingEngine {
    pub fn new(rules: PricingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &PricingRules {
        &self.rules
    }

    pub fn input(
        &self,
        days: i64,
        distance: RoundedDistance,
        waiver_selected: bool,
        discount: Option<DiscountDescriptor>,
    ) -> PricingInput {
        PricingInput {
            days,
            daily_rate: self.rules.daily_rate,
            distance,
            waiver_selected,
            waiver_daily_rate: self.rules.waiver_daily_rate,
            discount,
            tax_rate: self.rules.tax_rate,
        }
    }

    pub fn quote(&self, input: &PricingInput) -> Result<PriceQuote, PricingError> {
        price(input, &self.rules.delivery, self.rules.hold_amount)
    }

    pub fn delivery_breakdown(&self, distance: RoundedDistance) -> DeliveryBreakdown {
        self.rules.delivery.breakdown(distance)
    }

    /// Pre-discount subtotal a discount's minimum amount is checked against
    pub fn subtotal_before_discount(
        &self,
        days: i64,
        distance: RoundedDistance,
        waiver_selected: bool,
    ) -> Result<Decimal, PricingError> {
        let quote = self.quote(&self.input(days, distance, waiver_selected, None))?;
        Ok(quote.subtotal_before_discount())
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discount::DiscountKind;
    use rust_decimal_macros::dec;

    fn engine() -> PricingEngine {
        PricingEngine::default()
    }

    fn distance(km: f64) -> RoundedDistance {
        RoundedDistance::from_raw_km(km).unwrap()
    }

    fn descriptor(kind: DiscountKind, value: Decimal) -> DiscountDescriptor {
        DiscountDescriptor {
            code: "TEST".to_string(),
            kind,
            value,
            min_booking_amount: None,
        }
    }

    #[test]
    fn test_two_day_quote_with_excess_distance() {
        let engine = engine();
        let quote = engine.quote(&engine.input(2, distance(39.84), false, None)).unwrap();

        assert_eq!(quote.subtotal_equipment, dec!(900));
        assert_eq!(quote.delivery_fee, dec!(358.8));
        assert_eq!(quote.subtotal_before_discount(), dec!(1258.8));
        assert_eq!(quote.taxes, dec!(188.82));
        assert_eq!(quote.total, dec!(1447.62));
        assert_eq!(quote.hold_amount, dec!(500));
    }

    #[test]
    fn test_percentage_discount_before_tax() {
        let engine = engine();
        let discount = descriptor(DiscountKind::Percentage, dec!(10));
        let quote = engine
            .quote(&engine.input(2, distance(39.84), false, Some(discount)))
            .unwrap();

        assert_eq!(quote.discount_amount, dec!(125.88));
        assert_eq!(quote.subtotal_after_discount, dec!(1132.92));
        assert_eq!(quote.taxes, dec!(169.938));
        assert_eq!(quote.total, dec!(1302.858));
        assert_eq!(quote.rounded().total, dec!(1302.86));
        assert_eq!(quote.rounded().taxes, dec!(169.94));
    }

    #[test]
    fn test_fixed_discount_is_clamped() {
        let engine = engine();
        let discount = descriptor(DiscountKind::Fixed, dec!(5000));
        let quote = engine
            .quote(&engine.input(1, distance(10.0), true, Some(discount)))
            .unwrap();

        assert_eq!(quote.discount_amount, quote.subtotal_before_discount());
        assert_eq!(quote.subtotal_after_discount, Decimal::ZERO);
        assert_eq!(quote.taxes, Decimal::ZERO);
        assert_eq!(quote.total, Decimal::ZERO);
    }

    #[test]
    fn test_waiver_included_before_discount() {
        let engine = engine();
        let discount = descriptor(DiscountKind::Percentage, dec!(50));
        let quote = engine
            .quote(&engine.input(3, distance(12.0), true, Some(discount)))
            .unwrap();

        assert_eq!(quote.waiver_cost, dec!(87));
        // (1350 + 300 + 87) / 2
        assert_eq!(quote.discount_amount, dec!(868.5));
    }

    #[test]
    fn test_zero_days_rejected() {
        let engine = engine();
        let result = engine.quote(&engine.input(0, distance(10.0), false, None));
        assert_eq!(result, Err(PricingError::NonPositiveDays(0)));
    }

    #[test]
    fn test_malformed_discount_rejected() {
        let engine = engine();
        let over = descriptor(DiscountKind::Percentage, dec!(120));
        assert!(matches!(
            engine.quote(&engine.input(2, distance(10.0), false, Some(over))),
            Err(PricingError::MalformedDiscount(_))
        ));

        let negative = descriptor(DiscountKind::Fixed, dec!(-5));
        assert!(matches!(
            engine.quote(&engine.input(2, distance(10.0), false, Some(negative))),
            Err(PricingError::MalformedDiscount(_))
        ));
    }

    #[test]
    fn test_quote_reconciles_from_itemized_fields() {
        let engine = engine();
        for (days, km, waiver, pct) in [
            (1, 3.3, false, dec!(0)),
            (2, 39.84, true, dec!(10)),
            (7, 88.16, true, dec!(33.3)),
            (30, 31.05, false, dec!(100)),
        ] {
            let discount = (pct > Decimal::ZERO).then(|| descriptor(DiscountKind::Percentage, pct));
            let quote = engine.quote(&engine.input(days, distance(km), waiver, discount)).unwrap();
            assert!(quote.reconciles(engine.rules().tax_rate));
        }
    }
}
