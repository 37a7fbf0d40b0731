use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::extract::{Body, CurrentUser, SESSION_COOKIE};
use super::views::{UserView, utc};
use crate::accounts::{self, OAuthIdentity, Registration, SignedIn};
use crate::error::ApiError;
use crate::model::Role;
use crate::state::AppState;
use crate::store::now_ms;

#[derive(Deserialize)]
struct RegisterBody {
    email: String,
    password: String,
    name: Option<String>,
    role: Role,
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct CredentialsBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct OAuthBody {
    provider: String,
    email: String,
    name: Option<String>,
    image: Option<String>,
}

#[derive(Deserialize)]
struct RoleBody {
    role: Role,
}

#[derive(Deserialize)]
struct EmailBody {
    email: String,
}

#[derive(Deserialize)]
struct ResetBody {
    token: String,
    password: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/oauth", post(sign_in_oauth))
        .route("/api/auth/session", get(session))
        .route("/api/auth/update-role", post(update_role))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password", post(reset_password))
        .route("/api/auth/signout", post(sign_out))
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

/// Session response: the token in the body and as a cookie.
fn signed_in(s: SignedIn) -> Response {
    let max_age = ((s.expires_at - now_ms()) / 1000).max(0);
    let expires_at: DateTime<Utc> = utc(s.expires_at);
    let body = json!({
        "token": &s.token,
        "expiresAt": expires_at,
        "user": UserView::from(&s.user),
        "next": s.next,
    });
    (
        AppendHeaders([(SET_COOKIE, session_cookie(&s.token, max_age))]),
        Json(body),
    )
        .into_response()
}

async fn register(
    State(state): State<AppState>,
    Body(body): Body<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user = accounts::register(
        &state,
        Registration {
            email: body.email,
            password: body.password,
            name: body.name,
            role: body.role,
            timezone: body.timezone,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": UserView::from(&user) }))))
}

async fn sign_in(
    State(state): State<AppState>,
    Body(body): Body<CredentialsBody>,
) -> Result<Response, ApiError> {
    let s = accounts::sign_in_credentials(&state, &body.email, &body.password).await?;
    Ok(signed_in(s))
}

async fn sign_in_oauth(
    State(state): State<AppState>,
    Body(body): Body<OAuthBody>,
) -> Result<Response, ApiError> {
    let s = accounts::sign_in_oauth(
        &state,
        OAuthIdentity {
            provider: body.provider,
            email: body.email,
            name: body.name,
            image: body.image,
        },
    )
    .await?;
    Ok(signed_in(s))
}

async fn session(current: CurrentUser) -> Json<serde_json::Value> {
    Json(json!({ "user": UserView::from(&current.user) }))
}

async fn update_role(
    State(state): State<AppState>,
    current: CurrentUser,
    Body(body): Body<RoleBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = accounts::update_role(&state, &current.user, body.role).await?;
    Ok(Json(json!({ "user": UserView::from(&user) })))
}

async fn forgot_password(
    State(state): State<AppState>,
    Body(body): Body<EmailBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = accounts::forgot_password(&state, &body.email).await?;
    Ok(Json(json!({ "message": message })))
}

async fn reset_password(
    State(state): State<AppState>,
    Body(body): Body<ResetBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = accounts::reset_password(&state, &body.token, &body.password).await?;
    Ok(Json(json!({ "message": message })))
}

async fn sign_out(State(state): State<AppState>, current: CurrentUser) -> Result<Response, ApiError> {
    accounts::sign_out(&state, &current.token).await?;
    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie("", 0))]),
        Json(json!({ "message": "Signed out" })),
    )
        .into_response())
}
