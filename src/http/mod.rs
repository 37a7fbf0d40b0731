//! The JSON API over axum.

mod auth;
mod bookings;
pub mod extract;
mod teachers;
pub mod views;

use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::observability::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL, route_label};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = cors(&state.config.public_url);
    Router::new()
        .route("/healthz", get(healthz))
        .merge(auth::routes())
        .merge(teachers::routes())
        .merge(bookings::routes())
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Browsers may call the API from the public site with the session cookie.
fn cors(public_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);
    match HeaderValue::from_str(public_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => layer,
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let route = route_label(req.uri().path());
    let started = Instant::now();
    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();
    metrics::counter!(HTTP_REQUESTS_TOTAL, "route" => route.clone(), "status" => status).increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "route" => route)
        .record(started.elapsed().as_secs_f64());
    response
}
