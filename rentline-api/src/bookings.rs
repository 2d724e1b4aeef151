use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use rentline_core::{CoreError, RequestContext};
use rentline_order::{Booking, QuoteRequest};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{customer_auth_middleware, CustomerClaims};
use crate::state::AppState;
use crate::views::{BookingResponse, ConfirmationResponse, HoldResponse};

#[derive(Debug, Deserialize)]
pub struct DatesRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CardVerificationRequest {
    /// Processor reference of the completed verification attempt
    pub verification_ref: String,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/dates", post(change_dates))
        .route("/v1/bookings/{id}/card-verification", post(confirm_card_verification))
        .route("/v1/bookings/{id}/reschedule", post(reschedule))
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware))
}

/// Bookings of other customers are reported as missing
async fn owned_booking(state: &AppState, claims: &CustomerClaims, booking_id: Uuid) -> Result<Booking, AppError> {
    let booking = state.orchestrator.get_booking(booking_id).await?;
    if booking.customer_id != claims.sub {
        return Err(CoreError::NotFound(format!("booking {}", booking_id)).into());
    }
    Ok(booking)
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<QuoteRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let ctx = RequestContext::new();
    let booking = state.orchestrator.create_booking(&claims.sub, &req, &ctx).await?;
    info!(request_id = %ctx.request_id, "Customer {} opened booking {}", claims.sub, booking.id);

    Ok((StatusCode::CREATED, Json(BookingResponse::from(&booking))))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = owned_booking(&state, &claims, booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// New dates for a draft, re-submitted against the store in the same call
async fn change_dates(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<DatesRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    owned_booking(&state, &claims, booking_id).await?;
    let ctx = RequestContext::new();

    state
        .orchestrator
        .change_dates(booking_id, req.start_date, req.end_date, &ctx)
        .await?;
    let booking = state.orchestrator.submit_dates(booking_id, &ctx).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

async fn confirm_card_verification(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<CardVerificationRequest>,
) -> Result<Json<ConfirmationResponse>, AppError> {
    owned_booking(&state, &claims, booking_id).await?;
    let ctx = RequestContext::new();

    let confirmation = state
        .orchestrator
        .confirm_card_verification(booking_id, &req.verification_ref, &ctx)
        .await?;
    Ok(Json(ConfirmationResponse {
        booking: BookingResponse::from(&confirmation.booking),
        hold: HoldResponse::from(&confirmation.hold),
    }))
}

async fn reschedule(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<DatesRequest>,
) -> Result<Json<ConfirmationResponse>, AppError> {
    owned_booking(&state, &claims, booking_id).await?;
    let ctx = RequestContext::new();

    let confirmation = state
        .orchestrator
        .reschedule(booking_id, req.start_date, req.end_date, &ctx)
        .await?;
    Ok(Json(ConfirmationResponse {
        booking: BookingResponse::from(&confirmation.booking),
        hold: HoldResponse::from(&confirmation.hold),
    }))
}
