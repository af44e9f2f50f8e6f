use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use flowdesk_shared::Booking;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::WorkspaceContext;
use crate::error::ApiResult;
use crate::scheduling::BookerInfo;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub date: NaiveDate,
    pub slots: Vec<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub start: DateTime<Utc>,
    #[serde(flatten)]
    pub booker: BookerInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Routes used by people booking through a public link.
pub fn public_booking_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:slug/slots", get(available_slots))
        .route("/:slug", post(create_booking))
}

pub fn booking_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id/cancel", post(cancel_booking))
}

async fn available_slots(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<SlotQuery>,
) -> ApiResult<Json<SlotsResponse>> {
    let slots = state.bookings.available_slots(&slug, query.date).await?;
    Ok(Json(SlotsResponse {
        date: query.date,
        slots,
    }))
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(request): Json<BookRequest>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    let booking = state.bookings.book(&slug, request.start, request.booker).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(booking_id): Path<Uuid>,
    request: Option<Json<CancelRequest>>,
) -> ApiResult<Json<Booking>> {
    let reason = request.and_then(|Json(r)| r.reason);
    let booking = state
        .bookings
        .cancel(ctx.workspace_id, booking_id, reason, ctx.user_id)
        .await?;
    Ok(Json(booking))
}
