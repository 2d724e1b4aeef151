use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use rentline_core::RequestContext;
use rentline_order::{HoldResolution, InspectionOutcome, SweepReport};
use rentline_shared::{AvailabilityBlock, BlockReason};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{admin_auth_middleware, AdminClaims};
use crate::state::AppState;
use crate::views::{BookingResponse, HoldResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBlockRequest {
    pub resource_id: Uuid,
    pub start_date: NaiveDate,
    /// Inclusive
    pub end_date: NaiveDate,
    pub reason: BlockReason,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InspectionResponse {
    pub booking: BookingResponse,
    pub resolution: HoldResolution,
}

#[derive(Debug, Deserialize)]
pub struct FailedHoldsQuery {
    pub limit: Option<i64>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/admin/bookings/{id}/inspection", post(record_inspection))
        .route("/v1/admin/blocks", post(create_block))
        .route("/v1/admin/blocks/{id}", delete(remove_block))
        .route("/v1/admin/holds/reconcile", post(reconcile_holds))
        .route("/v1/admin/holds/failed", get(failed_holds))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}

// ============================================================================
// Bookings
// ============================================================================

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let ctx = RequestContext::new();
    let booking = state.orchestrator.cancel(booking_id, &ctx).await?;
    info!(request_id = %ctx.request_id, "Booking {} cancelled by {}", booking_id, claims.email);
    Ok(Json(BookingResponse::from(&booking)))
}

async fn record_inspection(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(booking_id): Path<Uuid>,
    Json(outcome): Json<InspectionOutcome>,
) -> Result<Json<InspectionResponse>, AppError> {
    let ctx = RequestContext::new();
    let (booking, resolution) = state.orchestrator.complete_return(booking_id, &outcome, &ctx).await?;
    info!(
        request_id = %ctx.request_id,
        "Inspection for booking {} recorded by {}: clean={}",
        booking_id, claims.email, outcome.clean
    );
    Ok(Json(InspectionResponse {
        booking: BookingResponse::from(&booking),
        resolution,
    }))
}

// ============================================================================
// Blocks
// ============================================================================

async fn create_block(
    State(state): State<AppState>,
    Json(req): Json<CreateBlockRequest>,
) -> Result<(StatusCode, Json<AvailabilityBlock>), AppError> {
    let ctx = RequestContext::new();
    let block = state
        .orchestrator
        .add_block(req.resource_id, req.start_date, req.end_date, req.reason, req.note, &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn remove_block(
    State(state): State<AppState>,
    Path(block_id): Path<Uuid>,
) -> Result<Json<AvailabilityBlock>, AppError> {
    let ctx = RequestContext::new();
    Ok(Json(state.orchestrator.remove_block(block_id, &ctx).await?))
}

// ============================================================================
// Holds
// ============================================================================

async fn reconcile_holds(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    let ctx = RequestContext::new();
    Ok(Json(state.orchestrator.reconcile_holds(&ctx).await?))
}

async fn failed_holds(
    State(state): State<AppState>,
    Query(query): Query<FailedHoldsQuery>,
) -> Result<Json<Vec<HoldResponse>>, AppError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let holds = state.orchestrator.holds().failed_holds(limit).await?;
    Ok(Json(holds.iter().map(HoldResponse::from).collect()))
}
