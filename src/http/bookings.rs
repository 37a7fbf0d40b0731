use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use ulid::Ulid;

use super::extract::{Body, CurrentUser, Params, path_id};
use super::views::{BookingView, DashboardView};
use crate::booking::{self, BOOKING_CONFIRMED_MESSAGE, BookingRequest};
use crate::dashboard;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    teacher_id: Ulid,
    start_time: DateTime<Utc>,
    duration_minutes: u32,
    notes: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", get(list).post(create))
        .route("/api/bookings/{id}/cancel", post(cancel))
        .route("/api/dashboard", get(summary))
}

async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
    Params(q): Params<ListQuery>,
) -> Json<Value> {
    let details = booking::list_bookings(&state, &current.user, q.status.as_deref()).await;
    let bookings: Vec<BookingView> = details.iter().map(BookingView::from).collect();
    Json(json!({ "bookings": bookings }))
}

async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Body(body): Body<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let details = booking::create_booking(
        &state,
        &current.user,
        BookingRequest {
            teacher_id: body.teacher_id,
            start: body.start_time.timestamp_millis(),
            duration_minutes: body.duration_minutes,
            notes: body.notes,
        },
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "booking": BookingView::from(&details),
            "message": BOOKING_CONFIRMED_MESSAGE,
        })),
    ))
}

async fn cancel(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = path_id(&id, "Booking")?;
    let details = booking::cancel_booking(&state, &current.user, id).await?;
    Ok(Json(json!({ "booking": BookingView::from(&details) })))
}

async fn summary(State(state): State<AppState>, current: CurrentUser) -> Json<DashboardView> {
    let stats = dashboard::dashboard(&state, &current.user).await;
    Json(DashboardView::from(&stats))
}
