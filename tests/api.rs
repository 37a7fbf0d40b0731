use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Datelike, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use flexibook::config::Config;
use flexibook::mailer::MemoryMailer;
use flexibook::meeting::MockMeetingLinks;
use flexibook::model::HOUR_MS;
use flexibook::state::AppState;
use flexibook::store::{Store, now_ms};

// ── Test infrastructure ──────────────────────────────────────

struct TestApp {
    router: Router,
    mailer: Arc<MemoryMailer>,
}

fn start_test_app() -> TestApp {
    let dir = std::env::temp_dir().join(format!("flexibook_api_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Arc::new(Store::open(dir.join("flexibook.wal")).unwrap());
    let mailer = Arc::new(MemoryMailer::new());
    let config = Config {
        data_dir: dir,
        public_url: "https://flexibook.test".into(),
        meeting_base_url: "https://meet.test".into(),
        ..Config::default()
    };
    let state = AppState::new(
        store,
        mailer.clone(),
        Arc::new(MockMeetingLinks::new("https://meet.test")),
        config,
    );
    TestApp {
        router: flexibook::http::router(state),
        mailer,
    }
}

impl TestApp {
    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn register(&self, email: &str, role: &str) -> Value {
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "email": email, "password": "secret1", "name": "Tester", "role": role })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["user"].clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/signin",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// A registered, signed-in teacher who accepts bookings.
    async fn active_teacher(&self, email: &str, rate: f64, buffer: u32) -> (String, String) {
        let user = self.register(email, "TEACHER").await;
        let token = self.sign_in(email, "secret1").await;
        let (status, _) = self
            .call(
                "PATCH",
                "/api/teachers/profile",
                Some(&token),
                Some(json!({ "hourlyRate": rate, "bufferTime": buffer, "isActive": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        (user["id"].as_str().unwrap().to_string(), token)
    }

    async fn student(&self, email: &str) -> String {
        self.register(email, "STUDENT").await;
        self.sign_in(email, "secret1").await
    }
}

fn rfc3339(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms).unwrap().to_rfc3339()
}

fn future_hour(hours: i64) -> i64 {
    (now_ms() / HOUR_MS + hours) * HOUR_MS
}

fn booking_body(teacher_id: &str, start: i64, minutes: u32) -> Value {
    json!({ "teacherId": teacher_id, "startTime": rfc3339(start), "durationMinutes": minutes })
}

// ── Auth ─────────────────────────────────────────────────────

#[tokio::test]
async fn register_sign_in_and_out() {
    let app = start_test_app();
    let user = app.register("Ada@Example.com", "STUDENT").await;
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["role"], "STUDENT");

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "ada@example.com", "password": "secret1", "role": "STUDENT" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User with this email already exists");

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/signin",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let token = app.sign_in("ada@example.com", "secret1").await;
    let (status, body) = app.call("GET", "/api/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ada@example.com");

    let (status, _) = app.call("POST", "/api/auth/signout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.call("GET", "/api/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let app = start_test_app();
    let token = app.student("cookie@example.com").await;
    let req = Request::builder()
        .uri("/api/auth/session")
        .header(header::COOKIE, format!("theme=dark; flexibook_session={token}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn sign_in_sets_cookie() {
    let app = start_test_app();
    app.register("c@example.com", "STUDENT").await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/signin")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "email": "c@example.com", "password": "secret1" }).to_string()))
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("flexibook_session="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn oauth_user_picks_a_role() {
    let app = start_test_app();
    let (status, body) = app
        .call(
            "POST",
            "/api/auth/oauth",
            None,
            Some(json!({ "provider": "google", "email": "g@example.com", "name": "G" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["next"], "/auth/select-role");
    assert!(body["user"]["role"].is_null());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .call("POST", "/api/auth/update-role", Some(&token), Some(json!({ "role": "TEACHER" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "TEACHER");

    let (status, body) = app.call("GET", "/api/teachers/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teacher"]["isActive"], false);
    assert_eq!(body["teacher"]["hourlyRate"], 50.0);

    let (status, _) = app
        .call("POST", "/api/auth/update-role", Some(&token), Some(json!({ "role": "ADMIN" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn password_reset_round() {
    let app = start_test_app();
    app.register("r@example.com", "STUDENT").await;

    let (status, body) = app
        .call("POST", "/api/auth/forgot-password", None, Some(json!({ "email": "nobody@example.com" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let unknown_message = body["message"].clone();
    let (_, body) = app
        .call("POST", "/api/auth/forgot-password", None, Some(json!({ "email": "r@example.com" })))
        .await;
    assert_eq!(body["message"], unknown_message);

    let mails = app.mailer.sent().await;
    assert_eq!(mails.len(), 1);
    let token = mails[0]
        .body
        .split("token=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap()
        .to_string();

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/reset-password",
            None,
            Some(json!({ "token": token, "password": "newsecret" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password has been reset successfully.");
    app.sign_in("r@example.com", "newsecret").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/reset-password",
            None,
            Some(json!({ "token": token, "password": "another1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired token.");
}

// ── Teachers ─────────────────────────────────────────────────

#[tokio::test]
async fn teacher_directory_filters() {
    let app = start_test_app();
    let token = app.student("s@example.com").await;
    app.active_teacher("cheap@example.com", 20.0, 0).await;
    app.active_teacher("dear@example.com", 80.0, 0).await;
    app.register("hidden@example.com", "TEACHER").await;

    let (status, body) = app.call("GET", "/api/teachers", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let teachers = body["teachers"].as_array().unwrap();
    assert_eq!(teachers.len(), 2);
    // Newest first.
    assert_eq!(teachers[0]["user"]["email"], "dear@example.com");

    let (_, body) = app
        .call("GET", "/api/teachers?minRate=30&maxRate=100", Some(&token), None)
        .await;
    let teachers = body["teachers"].as_array().unwrap();
    assert_eq!(teachers.len(), 1);
    assert_eq!(teachers[0]["hourlyRate"], 80.0);

    let (_, body) = app.call("GET", "/api/teachers?language=german", Some(&token), None).await;
    assert!(body["teachers"].as_array().unwrap().is_empty());

    let (status, _) = app.call("GET", "/api/teachers?minRate=lots", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call("GET", "/api/teachers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_is_teacher_only() {
    let app = start_test_app();
    let token = app.student("s@example.com").await;
    let (status, _) = app
        .call("PATCH", "/api/teachers/profile", Some(&token), Some(json!({ "bio": "hi" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call("GET", "/api/teachers/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn availability_and_open_slots() {
    let app = start_test_app();
    let (teacher_id, teacher_token) = app.active_teacher("t@example.com", 40.0, 0).await;
    let student = app.student("s@example.com").await;

    let date = Utc::now().date_naive() + Duration::days(8);
    let weekday = date.weekday().num_days_from_sunday();
    let (status, body) = app
        .call(
            "PUT",
            "/api/teachers/profile/availability",
            Some(&teacher_token),
            Some(json!({ "availability": [
                { "dayOfWeek": weekday, "startTime": "09:00", "endTime": "11:00" }
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["availability"][0]["startTime"], "09:00");

    let (_, body) = app
        .call("GET", &format!("/api/teachers/{teacher_id}"), Some(&student), None)
        .await;
    assert_eq!(body["availability"].as_array().unwrap().len(), 1);

    let slots_uri = format!("/api/teachers/{teacher_id}/slots?date={date}&duration=60");
    let (status, body) = app.call("GET", &slots_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    // 09:00, 09:15, 09:30, 09:45 and 10:00.
    assert_eq!(body["slots"].as_array().unwrap().len(), 5);

    let nine = date.and_hms_opt(9, 0, 0).unwrap().and_utc().timestamp_millis();
    let (status, _) = app
        .call("POST", "/api/bookings", Some(&student), Some(booking_body(&teacher_id, nine, 60)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.call("GET", &slots_uri, Some(&student), None).await;
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0]["startTime"], rfc3339_z(nine + HOUR_MS));

    let (status, _) = app
        .call("GET", &format!("/api/teachers/{teacher_id}/slots?date=tomorrow"), Some(&student), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn rfc3339_z(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .unwrap()
        .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

#[tokio::test]
async fn inactive_teacher_is_hidden() {
    let app = start_test_app();
    let teacher = app.register("t@example.com", "TEACHER").await;
    let teacher_id = teacher["id"].as_str().unwrap();
    let teacher_token = app.sign_in("t@example.com", "secret1").await;
    let student = app.student("s@example.com").await;

    let uri = format!("/api/teachers/{teacher_id}");
    let (status, _) = app.call("GET", &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call("GET", &uri, Some(&teacher_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call("POST", "/api/bookings", Some(&student), Some(booking_body(teacher_id, future_hour(30), 60)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This teacher is not accepting bookings");
}

// ── Bookings ─────────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle() {
    let app = start_test_app();
    let (teacher_id, teacher_token) = app.active_teacher("t@example.com", 40.0, 15).await;
    let ada = app.student("ada@example.com").await;
    let bob = app.student("bob@example.com").await;
    let start = future_hour(48);

    let (status, body) = app
        .call(
            "POST",
            "/api/bookings",
            Some(&ada),
            Some(json!({
                "teacherId": teacher_id,
                "startTime": rfc3339(start),
                "durationMinutes": 45,
                "notes": "Conversation practice",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["message"], "Booking confirmed successfully (mock payment)");
    let booking = &body["booking"];
    assert_eq!(booking["status"], "CONFIRMED");
    assert_eq!(booking["durationMinutes"], 45);
    assert_eq!(booking["payment"]["amount"], 30.0);
    assert_eq!(booking["payment"]["status"], "COMPLETED");
    assert!(booking["meetingLink"].as_str().unwrap().starts_with("https://meet.test/"));
    let booking_id = booking["id"].as_str().unwrap().to_string();

    // Ends at :45, so a :55 start violates the 15 minute buffer.
    let (status, body) = app
        .call("POST", "/api/bookings", Some(&bob), Some(booking_body(&teacher_id, start + 55 * 60_000, 60)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "This time slot is no longer available");
    let (status, _) = app
        .call("POST", "/api/bookings", Some(&bob), Some(booking_body(&teacher_id, start + HOUR_MS, 60)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.call("GET", "/api/bookings", Some(&ada), None).await;
    assert_eq!(body["bookings"].as_array().unwrap().len(), 1);
    let (_, body) = app.call("GET", "/api/bookings", Some(&teacher_token), None).await;
    let theirs = body["bookings"].as_array().unwrap();
    assert_eq!(theirs.len(), 2);
    // Latest lesson first.
    assert_eq!(theirs[1]["id"], booking_id.as_str());

    let (status, _) = app
        .call("POST", &format!("/api/bookings/{booking_id}/cancel"), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .call("POST", &format!("/api/bookings/{booking_id}/cancel"), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "CANCELLED");
    assert_eq!(body["booking"]["payment"]["status"], "REFUNDED");
    let (status, _) = app
        .call("POST", &format!("/api/bookings/{booking_id}/cancel"), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.call("GET", "/api/bookings?status=CANCELLED", Some(&ada), None).await;
    assert_eq!(body["bookings"].as_array().unwrap().len(), 1);
    let (_, body) = app.call("GET", "/api/bookings?status=CONFIRMED", Some(&ada), None).await;
    assert!(body["bookings"].as_array().unwrap().is_empty());
    let (_, body) = app.call("GET", "/api/bookings?status=ALL", Some(&ada), None).await;
    assert_eq!(body["bookings"].as_array().unwrap().len(), 1);

    // The freed slot is bookable again.
    let (status, _) = app
        .call("POST", "/api/bookings", Some(&bob), Some(booking_body(&teacher_id, start, 45)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.call("GET", "/api/dashboard", Some(&teacher_token), None).await;
    assert_eq!(body["role"], "TEACHER");
    assert_eq!(body["totalBookings"], 3);
    assert_eq!(body["upcomingCount"], 2);
    // 60 minutes and 45 minutes at 40.00 an hour.
    assert_eq!(body["earnings"], 70.0);
}

#[tokio::test]
async fn booking_validation() {
    let app = start_test_app();
    let (teacher_id, teacher_token) = app.active_teacher("t@example.com", 40.0, 0).await;
    let student = app.student("s@example.com").await;

    let (status, _) = app
        .call("POST", "/api/bookings", None, Some(booking_body(&teacher_id, future_hour(30), 60)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .call("POST", "/api/bookings", Some(&student), Some(booking_body(&Ulid::new().to_string(), future_hour(30), 60)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Teacher not found");

    for minutes in [10, 250, 47] {
        let (status, _) = app
            .call("POST", "/api/bookings", Some(&student), Some(booking_body(&teacher_id, future_hour(30), minutes)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{minutes} minutes");
    }

    let (status, _) = app
        .call("POST", "/api/bookings", Some(&student), Some(booking_body(&teacher_id, now_ms() - HOUR_MS, 60)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("POST", "/api/bookings", Some(&teacher_token), Some(booking_body(&teacher_id, future_hour(30), 60)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call("POST", "/api/bookings", Some(&student), Some(json!({ "teacherId": "nope" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = app
        .call("POST", "/api/bookings/not-an-id/cancel", Some(&student), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_requests_book_a_slot_once() {
    let app = Arc::new(start_test_app());
    let (teacher_id, _) = app.active_teacher("t@example.com", 40.0, 0).await;
    let start = future_hour(72);

    let mut tokens = Vec::new();
    for i in 0..8 {
        tokens.push(app.student(&format!("s{i}@example.com")).await);
    }
    let mut handles = Vec::new();
    for token in tokens {
        let app = app.clone();
        let body = booking_body(&teacher_id, start, 60);
        handles.push(tokio::spawn(async move {
            app.call("POST", "/api/bookings", Some(&token), Some(body)).await.0
        }));
    }
    let mut created = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!((created, conflicts), (1, 7));
}

#[tokio::test]
async fn health_check() {
    let app = start_test_app();
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
