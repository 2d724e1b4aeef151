use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use futures_util::{Stream, StreamExt};
use rentline_catalog::DayAvailability;
use rentline_core::RequestContext;
use rentline_shared::AvailabilityBlock;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Serialize)]
pub struct MonthAvailabilityResponse {
    pub resource_id: Uuid,
    pub year: i32,
    pub month: u32,
    pub blocks: Vec<AvailabilityBlock>,
    pub days: Vec<DayAvailability>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct NextAvailableResponse {
    pub resource_id: Uuid,
    pub requested_start: NaiveDate,
    pub requested_end: NaiveDate,
    /// `None` when nothing frees up within the search horizon
    pub next_start: Option<NaiveDate>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/resources/{id}/availability", get(month_availability))
        .route("/v1/resources/{id}/availability/next", get(next_available))
        .route("/v1/resources/{id}/availability/stream", get(availability_stream))
}

async fn month_availability(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<MonthAvailabilityResponse>, AppError> {
    let ctx = RequestContext::new();
    let (blocks, days) = state
        .orchestrator
        .month_availability(resource_id, query.year, query.month, &ctx)
        .await?;

    Ok(Json(MonthAvailabilityResponse {
        resource_id,
        year: query.year,
        month: query.month,
        blocks,
        days,
    }))
}

async fn next_available(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<NextAvailableResponse>, AppError> {
    let ctx = RequestContext::new();
    let next_start = state
        .orchestrator
        .next_available(resource_id, query.start, query.end, &ctx)
        .await?;

    Ok(Json(NextAvailableResponse {
        resource_id,
        requested_start: query.start,
        requested_end: query.end,
        next_start,
    }))
}

/// Block changes for one resource. A refresh hint only: clients re-query the month.
async fn availability_stream(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.orchestrator.subscribe();
    debug!("Calendar subscriber attached to resource {}", resource_id);

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.resource_id == resource_id => {
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok::<_, Infallible>(Event::default().event("block_changed").data(data)))
            }
            // Lagged receivers skip ahead; the client re-renders on the next event
            _ => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
