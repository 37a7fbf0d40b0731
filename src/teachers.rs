use chrono::NaiveDate;
use ulid::Ulid;

use crate::error::ApiError;
use crate::model::*;
use crate::state::AppState;
use crate::store::{now_ms, parse_hhmm};

/// Convert an amount in currency units (e.g. `42.5`) to cents.
pub fn units_to_cents(units: f64) -> Result<Cents, ApiError> {
    if !units.is_finite() || units < 0.0 {
        return Err(ApiError::bad_request("Rate must be a non-negative number"));
    }
    let cents = (units * 100.0).round();
    if cents > Cents::MAX as f64 {
        return Err(ApiError::bad_request("Rate too large"));
    }
    Ok(cents as Cents)
}

pub fn cents_to_units(cents: Cents) -> f64 {
    cents as f64 / 100.0
}

/// A weekly window as sent by the profile editor.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub is_recurring: bool,
}

/// Profile changes as sent by the profile editor, rates in currency units.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub hourly_rate: Option<f64>,
    pub languages: Option<Vec<String>>,
    pub years_experience: Option<u32>,
    pub buffer_time: Option<u32>,
    pub is_active: Option<bool>,
}

pub async fn list_teachers(
    state: &AppState,
    language: Option<String>,
    min_rate: Option<f64>,
    max_rate: Option<f64>,
) -> Result<Vec<TeacherListing>, ApiError> {
    let filter = TeacherFilter {
        language: language.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        min_rate_cents: min_rate.map(units_to_cents).transpose()?,
        max_rate_cents: max_rate.map(units_to_cents).transpose()?,
    };
    Ok(state.store.list_teachers(&filter).await)
}

/// A teacher's public page. Inactive profiles are visible only to their owner.
pub async fn teacher_detail(
    state: &AppState,
    viewer: &User,
    teacher_id: Ulid,
) -> Result<(TeacherListing, Vec<Availability>), ApiError> {
    let not_found = || ApiError::not_found("Teacher not found");
    let profile = state
        .store
        .teacher_profile(&teacher_id)
        .await
        .ok_or_else(not_found)?;
    if !profile.is_active && viewer.id != teacher_id {
        return Err(not_found());
    }
    let user = state.store.find_user(&teacher_id).ok_or_else(not_found)?;
    let availability = state.store.availability_for(&teacher_id).await?;
    Ok((TeacherListing { profile, user }, availability))
}

pub async fn open_slots(
    state: &AppState,
    teacher_id: Ulid,
    date: &str,
    duration_minutes: u32,
) -> Result<Vec<Span>, ApiError> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("Date must be YYYY-MM-DD"))?;
    Ok(state
        .store
        .teacher_open_slots(&teacher_id, date, duration_minutes, now_ms())
        .await?)
}

fn require_teacher(user: &User) -> Result<(), ApiError> {
    if user.role == Some(Role::Teacher) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only teachers can manage a teacher profile"))
    }
}

pub async fn own_profile(state: &AppState, user: &User) -> Result<TeacherProfile, ApiError> {
    require_teacher(user)?;
    state
        .store
        .teacher_profile(&user.id)
        .await
        .ok_or_else(|| ApiError::not_found("Teacher not found"))
}

pub async fn update_profile(
    state: &AppState,
    user: &User,
    update: ProfileUpdate,
) -> Result<TeacherProfile, ApiError> {
    require_teacher(user)?;
    let patch = ProfilePatch {
        bio: update.bio,
        hourly_rate_cents: update.hourly_rate.map(units_to_cents).transpose()?,
        languages: update.languages.map(|langs| {
            langs
                .into_iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        }),
        years_experience: update.years_experience,
        buffer_minutes: update.buffer_time,
        is_active: update.is_active,
    };
    Ok(state.store.update_teacher_profile(user.id, patch).await?)
}

pub async fn replace_availability(
    state: &AppState,
    user: &User,
    specs: Vec<WindowSpec>,
) -> Result<Vec<Availability>, ApiError> {
    require_teacher(user)?;
    let mut windows = Vec::with_capacity(specs.len());
    for spec in specs {
        let (Some(start_minute), Some(end_minute)) =
            (parse_hhmm(&spec.start_time), parse_hhmm(&spec.end_time))
        else {
            return Err(ApiError::bad_request("Times must be HH:MM"));
        };
        windows.push(Availability {
            id: Ulid::new(),
            teacher_id: user.id,
            day_of_week: spec.day_of_week,
            start_minute,
            end_minute,
            is_recurring: spec.is_recurring,
        });
    }
    state.store.replace_availability(user.id, windows).await?;
    Ok(state.store.availability_for(&user.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use axum::http::StatusCode;

    fn window(day: u8, start: &str, end: &str) -> WindowSpec {
        WindowSpec {
            day_of_week: day,
            start_time: start.into(),
            end_time: end.into(),
            is_recurring: true,
        }
    }

    #[test]
    fn currency_conversion() {
        assert_eq!(units_to_cents(40.0).unwrap(), 4000);
        assert_eq!(units_to_cents(19.99).unwrap(), 1999);
        assert!(units_to_cents(-1.0).is_err());
        assert!(units_to_cents(f64::NAN).is_err());
        assert_eq!(cents_to_units(4250), 42.5);
    }

    #[tokio::test]
    async fn directory_lists_active_teachers_by_rate() {
        let (state, _) = test_state("teachers_directory.wal");
        let cheap = active_teacher(&state, "cheap@example.com", 2000, 0).await;
        active_teacher(&state, "dear@example.com", 9000, 0).await;
        new_teacher(&state, "hidden@example.com").await;

        let all = list_teachers(&state, None, None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let affordable = list_teachers(&state, Some("English".into()), None, Some(50.0))
            .await
            .unwrap();
        assert_eq!(affordable.len(), 1);
        assert_eq!(affordable[0].user.id, cheap.id);
        assert!(list_teachers(&state, None, Some(-3.0), None).await.is_err());
    }

    #[tokio::test]
    async fn inactive_detail_only_for_owner() {
        let (state, _) = test_state("teachers_detail.wal");
        let teacher = new_teacher(&state, "t@example.com").await;
        let student = new_student(&state, "s@example.com").await;
        let err = teacher_detail(&state, &student, teacher.id).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(teacher_detail(&state, &teacher, teacher.id).await.is_ok());
    }

    #[tokio::test]
    async fn profile_editing_is_for_teachers() {
        let (state, _) = test_state("teachers_profile.wal");
        let teacher = new_teacher(&state, "t@example.com").await;
        let student = new_student(&state, "s@example.com").await;

        let err = own_profile(&state, &student).await.unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let updated = update_profile(
            &state,
            &teacher,
            ProfileUpdate {
                hourly_rate: Some(35.5),
                languages: Some(vec![" Spanish ".into(), "".into()]),
                buffer_time: Some(10),
                is_active: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.hourly_rate_cents, 3550);
        assert_eq!(updated.languages, vec!["Spanish".to_string()]);
        assert!(updated.is_active);
        assert_eq!(own_profile(&state, &teacher).await.unwrap(), updated);

        let bad = update_profile(
            &state,
            &teacher,
            ProfileUpdate {
                buffer_time: Some(10_000),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn availability_round_trip_and_slots() {
        let (state, _) = test_state("teachers_availability.wal");
        let teacher = active_teacher(&state, "t@example.com", 4000, 0).await;

        let saved = replace_availability(
            &state,
            &teacher,
            vec![window(3, "14:00", "17:00"), window(1, "09:00", "12:00")],
        )
        .await
        .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].day_of_week, 1);
        assert_eq!(saved[0].start_minute, 540);

        let bad = replace_availability(&state, &teacher, vec![window(1, "9am", "12:00")]).await;
        assert!(bad.is_err());

        // 2030-01-07 is a Monday: 09:00-12:00 fits nine 60 minute starts.
        let slots = open_slots(&state, teacher.id, "2030-01-07", 60).await.unwrap();
        assert_eq!(slots.len(), 9);
        assert!(open_slots(&state, teacher.id, "07/01/2030", 60).await.is_err());
        assert!(open_slots(&state, teacher.id, "2030-01-08", 60).await.unwrap().is_empty());
    }
}
