//! Shared fixtures for unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use crate::accounts::{Registration, register};
use crate::config::Config;
use crate::mailer::MemoryMailer;
use crate::meeting::{MeetingLinkGenerator, MockMeetingLinks, UnavailableMeetingLinks};
use crate::model::*;
use crate::state::AppState;
use crate::store::{Store, now_ms};

pub fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("flexibook_test_app");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn build(name: &str, meetings: Arc<dyn MeetingLinkGenerator>) -> (AppState, Arc<MemoryMailer>) {
    let store = Arc::new(Store::open(test_wal_path(name)).unwrap());
    let mailer = Arc::new(MemoryMailer::new());
    let config = Config {
        public_url: "https://flexibook.test".into(),
        meeting_base_url: "https://meet.test".into(),
        ..Config::default()
    };
    (AppState::new(store, mailer.clone(), meetings, config), mailer)
}

pub fn test_state(name: &str) -> (AppState, Arc<MemoryMailer>) {
    build(name, Arc::new(MockMeetingLinks::new("https://meet.test")))
}

pub fn test_state_without_meetings(name: &str) -> (AppState, Arc<MemoryMailer>) {
    build(name, Arc::new(UnavailableMeetingLinks))
}

/// Start of the hour `hours` from now.
pub fn future_hour(hours: i64) -> Ms {
    (now_ms() / HOUR_MS + hours) * HOUR_MS
}

pub async fn new_student(state: &AppState, email: &str) -> User {
    register(
        state,
        Registration {
            email: email.into(),
            password: "secret1".into(),
            name: Some("Student".into()),
            role: Role::Student,
            timezone: None,
        },
    )
    .await
    .unwrap()
}

/// A registered teacher whose profile is still inactive.
pub async fn new_teacher(state: &AppState, email: &str) -> User {
    register(
        state,
        Registration {
            email: email.into(),
            password: "secret1".into(),
            name: Some("Teacher".into()),
            role: Role::Teacher,
            timezone: None,
        },
    )
    .await
    .unwrap()
}

pub async fn active_teacher(state: &AppState, email: &str, rate_cents: Cents, buffer_minutes: u32) -> User {
    let user = new_teacher(state, email).await;
    state
        .store
        .update_teacher_profile(
            user.id,
            ProfilePatch {
                hourly_rate_cents: Some(rate_cents),
                buffer_minutes: Some(buffer_minutes),
                is_active: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    user
}
