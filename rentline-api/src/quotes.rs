use axum::{extract::State, routing::post, Json, Router};
use rentline_catalog::{DeliveryBreakdown, DiscountDescriptor, DiscountError, PriceQuote, RoundedDistance};
use rentline_core::{CoreError, RequestContext};
use rentline_order::QuoteRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    /// Display copy at 2 decimals
    pub quote: PriceQuote,
    pub delivery: DeliveryBreakdown,
    pub distance_km: RoundedDistance,
    pub discount: Option<DiscountDescriptor>,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateDiscountRequest {
    pub code: String,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ValidateDiscountResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<DiscountDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/quotes", post(create_quote))
        .route("/v1/discounts/validate", post(validate_discount))
}

async fn create_quote(
    State(state): State<AppState>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let ctx = RequestContext::new();
    let quotation = state.orchestrator.quote(&req, &ctx).await?;

    Ok(Json(QuoteResponse {
        quote: quotation.quote.rounded(),
        delivery: quotation.delivery,
        distance_km: quotation.distance_km,
        discount: quotation.discount,
        currency: quotation.currency,
    }))
}

async fn validate_discount(
    State(state): State<AppState>,
    Json(req): Json<ValidateDiscountRequest>,
) -> Result<Json<ValidateDiscountResponse>, AppError> {
    let ctx = RequestContext::new();
    match state.orchestrator.discounts().validate(&req.code, req.subtotal, &ctx).await {
        Ok(discount) => Ok(Json(ValidateDiscountResponse {
            valid: true,
            discount: Some(discount),
            error: None,
        })),
        Err(DiscountError::Store(e)) => Err(CoreError::from(e).into()),
        Err(e) => {
            debug!(request_id = %ctx.request_id, "Discount {} rejected: {}", req.code, e);
            Ok(Json(ValidateDiscountResponse {
                valid: false,
                discount: None,
                error: Some(e.to_string()),
            }))
        }
    }
}
