use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::{Body, CurrentUser, Params, path_id};
use super::views::{AvailabilityView, SlotView, TeacherView};
use crate::error::ApiError;
use crate::state::AppState;
use crate::teachers::{self, ProfileUpdate, WindowSpec};

const DEFAULT_SLOT_MINUTES: u32 = 60;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    language: Option<String>,
    min_rate: Option<String>,
    max_rate: Option<String>,
}

#[derive(Deserialize)]
struct SlotsQuery {
    date: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileBody {
    bio: Option<String>,
    hourly_rate: Option<f64>,
    languages: Option<Vec<String>>,
    years_experience: Option<u32>,
    buffer_time: Option<u32>,
    is_active: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WindowBody {
    day_of_week: u8,
    start_time: String,
    end_time: String,
    #[serde(default = "recurring")]
    is_recurring: bool,
}

fn recurring() -> bool {
    true
}

#[derive(Deserialize)]
struct AvailabilityBody {
    availability: Vec<WindowBody>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/teachers", get(list))
        .route("/api/teachers/profile", get(own_profile).patch(update_profile))
        .route("/api/teachers/profile/availability", put(replace_availability))
        .route("/api/teachers/{id}", get(detail))
        .route("/api/teachers/{id}/slots", get(slots))
}

fn rate(raw: Option<String>) -> Result<Option<f64>, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ApiError::bad_request("Rate must be a number")),
    }
}

async fn list(
    State(state): State<AppState>,
    _current: CurrentUser,
    Params(q): Params<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let listings =
        teachers::list_teachers(&state, q.language, rate(q.min_rate)?, rate(q.max_rate)?).await?;
    let teachers: Vec<TeacherView> = listings.iter().map(TeacherView::from).collect();
    Ok(Json(json!({ "teachers": teachers })))
}

async fn detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = path_id(&id, "Teacher")?;
    let (listing, availability) = teachers::teacher_detail(&state, &current.user, id).await?;
    let availability: Vec<AvailabilityView> = availability.iter().map(AvailabilityView::from).collect();
    Ok(Json(json!({
        "teacher": TeacherView::from(&listing),
        "availability": availability,
    })))
}

async fn slots(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<String>,
    Params(q): Params<SlotsQuery>,
) -> Result<Json<Value>, ApiError> {
    let id = path_id(&id, "Teacher")?;
    let date = q
        .date
        .ok_or_else(|| ApiError::bad_request("Date must be YYYY-MM-DD"))?;
    let duration = match q.duration.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_SLOT_MINUTES,
        Some(s) => s
            .parse()
            .map_err(|_| ApiError::bad_request("Duration must be a whole number of minutes"))?,
    };
    let spans = teachers::open_slots(&state, id, &date, duration).await?;
    let slots: Vec<SlotView> = spans.iter().map(SlotView::from).collect();
    Ok(Json(json!({ "slots": slots })))
}

async fn own_profile(State(state): State<AppState>, current: CurrentUser) -> Result<Json<Value>, ApiError> {
    let profile = teachers::own_profile(&state, &current.user).await?;
    Ok(Json(json!({ "teacher": TeacherView::new(&profile, None) })))
}

async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Body(body): Body<ProfileBody>,
) -> Result<Json<Value>, ApiError> {
    let update = ProfileUpdate {
        bio: body.bio,
        hourly_rate: body.hourly_rate,
        languages: body.languages,
        years_experience: body.years_experience,
        buffer_time: body.buffer_time,
        is_active: body.is_active,
    };
    let profile = teachers::update_profile(&state, &current.user, update).await?;
    Ok(Json(json!({ "teacher": TeacherView::new(&profile, None) })))
}

async fn replace_availability(
    State(state): State<AppState>,
    current: CurrentUser,
    Body(body): Body<AvailabilityBody>,
) -> Result<Json<Value>, ApiError> {
    let specs = body
        .availability
        .into_iter()
        .map(|w| WindowSpec {
            day_of_week: w.day_of_week,
            start_time: w.start_time,
            end_time: w.end_time,
            is_recurring: w.is_recurring,
        })
        .collect();
    let windows = teachers::replace_availability(&state, &current.user, specs).await?;
    let availability: Vec<AvailabilityView> = windows.iter().map(AvailabilityView::from).collect();
    Ok(Json(json!({ "availability": availability })))
}
