use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentline_core::{CoreError, RequestContext, StoreError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::pricing::PricingError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for DiscountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountKind::Percentage),
            "fixed" => Ok(DiscountKind::Fixed),
            other => Err(format!("unknown discount kind: {}", other)),
        }
    }
}

/// What the pricing engine needs to apply a validated code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountDescriptor {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_booking_amount: Option<Decimal>,
}

impl DiscountDescriptor {
    pub fn validate_shape(&self) -> Result<(), PricingError> {
        let valid = match self.kind {
            DiscountKind::Percentage => {
                self.value > Decimal::ZERO && self.value <= Decimal::ONE_HUNDRED
            }
            DiscountKind::Fixed => self.value > Decimal::ZERO,
        };
        if !valid {
            return Err(PricingError::MalformedDiscount(format!(
                "{} value {} for code {}",
                self.kind.as_str(),
                self.value,
                self.code
            )));
        }
        Ok(())
    }

    /// Percentage of the subtotal, or the fixed value clamped to it
    pub fn amount_for(&self, subtotal: Decimal) -> Decimal {
        match self.kind {
            DiscountKind::Percentage => subtotal * self.value / Decimal::ONE_HUNDRED,
            DiscountKind::Fixed => self.value.min(subtotal),
        }
    }
}

/// Catalog entry for a discount code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    pub name: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_booking_amount: Option<Decimal>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl DiscountCode {
    pub fn new(code: &str, kind: DiscountKind, value: Decimal) -> Self {
        Self {
            code: normalize_code(code),
            name: code.to_string(),
            kind,
            value,
            min_booking_amount: None,
            max_uses: None,
            used_count: 0,
            valid_from: None,
            valid_until: None,
            is_active: true,
        }
    }

    pub fn descriptor(&self) -> DiscountDescriptor {
        DiscountDescriptor {
            code: self.code.clone(),
            kind: self.kind,
            value: self.value,
            min_booking_amount: self.min_booking_amount,
        }
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, thiserror::Error)]
pub enum DiscountError {
    #[error("Invalid or expired discount code")]
    UnknownCode(String),

    #[error("Discount code is not yet active")]
    NotYetActive(String),

    #[error("Discount code has expired")]
    Expired(String),

    #[error("Minimum booking amount of {minimum} required for this code")]
    BelowMinimum { code: String, minimum: Decimal },

    #[error("Discount code usage limit reached")]
    UsageLimitReached(String),

    #[error(transparent)]
    Malformed(#[from] PricingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DiscountError> for CoreError {
    fn from(err: DiscountError) -> Self {
        match err {
            DiscountError::Malformed(e) => e.into(),
            DiscountError::Store(e) => e.into(),
            other => CoreError::DiscountError(other.to_string()),
        }
    }
}

#[async_trait]
pub trait DiscountCatalog: Send + Sync {
    /// Lookup by normalized (upper-case) code
    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError>;

    /// Record one use of a code unless its usage limit is already reached.
    /// Returns `false` when no use was left.
    async fn redeem(&self, code: &str) -> Result<bool, StoreError>;

    /// Give back a use taken by `redeem`
    async fn restore(&self, code: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryDiscountCatalog {
    codes: RwLock<HashMap<String, DiscountCode>>,
}

impl MemoryDiscountCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, code: DiscountCode) {
        self.codes.write().await.insert(normalize_code(&code.code), code);
    }
}

#[async_trait]
impl DiscountCatalog for MemoryDiscountCatalog {
    async fn find_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError> {
        Ok(self.codes.read().await.get(code).cloned())
    }

    async fn redeem(&self, code: &str) -> Result<bool, StoreError> {
        let mut codes = self.codes.write().await;
        let entry = codes
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(format!("discount code {}", code)))?;
        if entry.max_uses.is_some_and(|max| entry.used_count >= max) {
            return Ok(false);
        }
        entry.used_count += 1;
        Ok(true)
    }

    async fn restore(&self, code: &str) -> Result<(), StoreError> {
        let mut codes = self.codes.write().await;
        let entry = codes
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(format!("discount code {}", code)))?;
        entry.used_count = (entry.used_count - 1).max(0);
        Ok(())
    }
}

/// Validates codes against the catalog. Called once for the quote and again
/// at confirmation, since a quoted code may have expired or run out since.
#[derive(Clone)]
pub struct DiscountResolver {
    catalog: Arc<dyn DiscountCatalog>,
}

impl DiscountResolver {
    pub fn new(catalog: Arc<dyn DiscountCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn validate(
        &self,
        code: &str,
        subtotal: Decimal,
        ctx: &RequestContext,
    ) -> Result<DiscountDescriptor, DiscountError> {
        let normalized = normalize_code(code);
        let entry = self
            .catalog
            .find_code(&normalized)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| DiscountError::UnknownCode(normalized.clone()))?;

        if entry.valid_from.is_some_and(|from| ctx.now < from) {
            return Err(DiscountError::NotYetActive(normalized));
        }
        if entry.valid_until.is_some_and(|until| ctx.now > until) {
            return Err(DiscountError::Expired(normalized));
        }
        if let Some(minimum) = entry.min_booking_amount {
            if subtotal < minimum {
                return Err(DiscountError::BelowMinimum { code: normalized, minimum });
            }
        }
        if entry.max_uses.is_some_and(|max| entry.used_count >= max) {
            return Err(DiscountError::UsageLimitReached(normalized));
        }

        let descriptor = entry.descriptor();
        descriptor.validate_shape()?;
        debug!(request_id = %ctx.request_id, "Discount {} accepted", descriptor.code);
        Ok(descriptor)
    }

    /// Takes one use of the code. Validation only reads the count, so two
    /// bookings can both pass it; this is where the limit actually holds.
    pub async fn redeem(&self, code: &str, ctx: &RequestContext) -> Result<(), DiscountError> {
        let normalized = normalize_code(code);
        if !self.catalog.redeem(&normalized).await? {
            return Err(DiscountError::UsageLimitReached(normalized));
        }
        info!(request_id = %ctx.request_id, "Discount {} redeemed", normalized);
        Ok(())
    }

    pub async fn restore(&self, code: &str, ctx: &RequestContext) -> Result<(), DiscountError> {
        let normalized = normalize_code(code);
        self.catalog.restore(&normalized).await?;
        info!(request_id = %ctx.request_id, "Discount {} use given back", normalized);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn resolver_with(code: DiscountCode) -> (DiscountResolver, Arc<MemoryDiscountCatalog>) {
        let catalog = Arc::new(MemoryDiscountCatalog::new());
        catalog.insert(code).await;
        (DiscountResolver::new(catalog.clone()), catalog)
    }

    #[tokio::test]
    async fn test_code_matched_case_insensitively() {
        let (resolver, _) = resolver_with(DiscountCode::new("SPRING10", DiscountKind::Percentage, dec!(10))).await;
        let descriptor = resolver
            .validate(" spring10 ", dec!(1000), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(descriptor.code, "SPRING10");
        assert_eq!(descriptor.value, dec!(10));
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_codes_rejected() {
        let mut inactive = DiscountCode::new("OLD", DiscountKind::Fixed, dec!(50));
        inactive.is_active = false;
        let (resolver, _) = resolver_with(inactive).await;
        let ctx = RequestContext::new();

        assert!(matches!(
            resolver.validate("OLD", dec!(100), &ctx).await,
            Err(DiscountError::UnknownCode(_))
        ));
        assert!(matches!(
            resolver.validate("NOPE", dec!(100), &ctx).await,
            Err(DiscountError::UnknownCode(_))
        ));
    }

    #[tokio::test]
    async fn test_validity_window() {
        let ctx = RequestContext::new();
        let mut future = DiscountCode::new("SOON", DiscountKind::Fixed, dec!(50));
        future.valid_from = Some(ctx.now + Duration::days(1));
        let (resolver, _) = resolver_with(future).await;
        assert!(matches!(
            resolver.validate("SOON", dec!(100), &ctx).await,
            Err(DiscountError::NotYetActive(_))
        ));

        let mut past = DiscountCode::new("GONE", DiscountKind::Fixed, dec!(50));
        past.valid_until = Some(ctx.now - Duration::days(1));
        let (resolver, _) = resolver_with(past).await;
        assert!(matches!(
            resolver.validate("GONE", dec!(100), &ctx).await,
            Err(DiscountError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_minimum_amount_and_usage_limit() {
        let ctx = RequestContext::new();
        let mut code = DiscountCode::new("BIG", DiscountKind::Fixed, dec!(100));
        code.min_booking_amount = Some(dec!(1000));
        code.max_uses = Some(1);
        let (resolver, _) = resolver_with(code).await;

        assert!(matches!(
            resolver.validate("BIG", dec!(999.99), &ctx).await,
            Err(DiscountError::BelowMinimum { .. })
        ));
        assert!(resolver.validate("BIG", dec!(1000), &ctx).await.is_ok());

        resolver.redeem("big", &ctx).await.unwrap();
        assert!(matches!(
            resolver.validate("BIG", dec!(1000), &ctx).await,
            Err(DiscountError::UsageLimitReached(_))
        ));
    }

    #[tokio::test]
    async fn test_redeem_enforces_usage_limit() {
        let ctx = RequestContext::new();
        let mut code = DiscountCode::new("ONCE", DiscountKind::Percentage, dec!(10));
        code.max_uses = Some(1);
        let (resolver, catalog) = resolver_with(code).await;

        // Both callers validated before either redeemed
        assert!(resolver.validate("ONCE", dec!(100), &ctx).await.is_ok());
        assert!(resolver.validate("ONCE", dec!(100), &ctx).await.is_ok());

        resolver.redeem("ONCE", &ctx).await.unwrap();
        assert!(matches!(
            resolver.redeem("once", &ctx).await,
            Err(DiscountError::UsageLimitReached(_))
        ));
        assert_eq!(catalog.find_code("ONCE").await.unwrap().unwrap().used_count, 1);

        resolver.restore("ONCE", &ctx).await.unwrap();
        assert_eq!(catalog.find_code("ONCE").await.unwrap().unwrap().used_count, 0);
        assert!(resolver.redeem("ONCE", &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_catalog_entry_is_pricing_input_error() {
        let (resolver, _) = resolver_with(DiscountCode::new("HALF", DiscountKind::Percentage, dec!(150))).await;
        let err = resolver
            .validate("HALF", dec!(100), &RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(CoreError::from(err), CoreError::PricingInputError(_)));
    }

    #[test]
    fn test_fixed_amount_clamped_to_subtotal() {
        let descriptor = DiscountCode::new("FLAT", DiscountKind::Fixed, dec!(200)).descriptor();
        assert_eq!(descriptor.amount_for(dec!(150)), dec!(150));
        assert_eq!(descriptor.amount_for(dec!(1500)), dec!(200));
    }
}
