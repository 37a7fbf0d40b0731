use tracing::info;
use ulid::Ulid;

use crate::auth::{PasswordError, hash_password_blocking};
use crate::limits::{DEFAULT_CURRENCY, DEFAULT_TIMEZONE};
use crate::model::*;
use crate::payment::lesson_price;
use crate::store::{Store, StoreError, now_ms};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

async fn demo_user(email: &str, name: &str, role: Role, password: &str, now: Ms) -> Result<User, SeedError> {
    Ok(User {
        id: Ulid::new(),
        email: email.to_string(),
        name: Some(name.to_string()),
        image: None,
        password_hash: Some(hash_password_blocking(password.to_string()).await?),
        role: Some(role),
        timezone: DEFAULT_TIMEZONE.to_string(),
        created_at: now,
    })
}

/// Load demo accounts and one booked lesson into an empty store.
/// Returns false, touching nothing, when the store already has users.
pub async fn seed(store: &Store) -> Result<bool, SeedError> {
    if store.user_count() > 0 {
        return Ok(false);
    }
    let now = now_ms();

    let admin = demo_user("admin@example.com", "Admin User", Role::Admin, "admin123", now).await?;
    store.create_user(admin).await?;

    let teacher = demo_user("teacher@example.com", "Teacher User", Role::Teacher, "teacher123", now).await?;
    let teacher_id = teacher.id;
    store.create_user(teacher).await?;
    let profile = TeacherProfile {
        user_id: teacher_id,
        bio: Some("Experienced language tutor.".into()),
        hourly_rate_cents: 4000,
        languages: vec!["English".into(), "Spanish".into()],
        years_experience: Some(5),
        buffer_minutes: 0,
        is_active: true,
        created_at: now,
    };
    let rate = profile.hourly_rate_cents;
    store.create_teacher_profile(profile).await?;
    let window = |day_of_week, start_minute, end_minute| Availability {
        id: Ulid::new(),
        teacher_id,
        day_of_week,
        start_minute,
        end_minute,
        is_recurring: true,
    };
    store
        .replace_availability(teacher_id, vec![window(1, 9 * 60, 12 * 60), window(3, 14 * 60, 17 * 60)])
        .await?;

    let student = demo_user("student@example.com", "Student User", Role::Student, "student123", now).await?;
    let student_id = student.id;
    store.create_user(student).await?;

    let start = now + 24 * HOUR_MS;
    let booking = Booking {
        id: Ulid::new(),
        student_id,
        teacher_id,
        span: Span::new(start, start + HOUR_MS),
        duration_minutes: 60,
        notes: None,
        student_timezone: DEFAULT_TIMEZONE.into(),
        teacher_timezone: DEFAULT_TIMEZONE.into(),
        status: BookingStatus::Confirmed,
        meeting_link: None,
        created_at: now,
    };
    let booking_id = booking.id;
    store.insert_booking_checked(booking).await?;
    store
        .record_payment(Payment {
            id: Ulid::new(),
            booking_id,
            amount_cents: lesson_price(rate, 60),
            currency: DEFAULT_CURRENCY.into(),
            status: PaymentStatus::Completed,
            provider_ref: None,
            created_at: now,
        })
        .await?;
    store
        .schedule_notification(Notification {
            id: Ulid::new(),
            booking_id,
            kind: NotificationKind::BookingConfirmed,
            status: NotificationStatus::Sent,
            scheduled_at: now,
            sent_at: Some(now),
        })
        .await?;

    info!("seeded demo data: admin, teacher, student and one booking {booking_id}");
    Ok(true)
}
