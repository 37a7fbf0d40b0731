use tracing::{info, warn};
use ulid::Ulid;

use crate::error::ApiError;
use crate::limits::*;
use crate::meeting::MeetingRequest;
use crate::model::*;
use crate::payment::mock_charge;
use crate::state::AppState;
use crate::store::{StoreError, now_ms};

pub const BOOKING_CONFIRMED_MESSAGE: &str = "Booking confirmed successfully (mock payment)";

/// Reminders sent ahead of a lesson, with how long before the start.
const REMINDERS: [(NotificationKind, Ms); 2] = [
    (NotificationKind::Reminder24h, 24 * HOUR_MS),
    (NotificationKind::Reminder1h, HOUR_MS),
];

#[derive(Debug, Clone)]
pub struct BookingRequest {
    /// The teacher's user id.
    pub teacher_id: Ulid,
    pub start: Ms,
    pub duration_minutes: u32,
    pub notes: Option<String>,
}

fn validate_request(req: &BookingRequest, now: Ms) -> Result<(), ApiError> {
    if !(MIN_LESSON_MINUTES..=MAX_LESSON_MINUTES).contains(&req.duration_minutes)
        || req.duration_minutes % LESSON_GRANULARITY_MINUTES != 0
    {
        return Err(ApiError::bad_request(format!(
            "Duration must be between {MIN_LESSON_MINUTES} and {MAX_LESSON_MINUTES} minutes in steps of {LESSON_GRANULARITY_MINUTES}"
        )));
    }
    if req
        .notes
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_NOTES_LEN)
    {
        return Err(ApiError::bad_request(format!(
            "Notes must be at most {MAX_NOTES_LEN} characters"
        )));
    }
    if req.start <= now {
        return Err(ApiError::bad_request("Start time must be in the future"));
    }
    Ok(())
}

fn notification(booking_id: Ulid, kind: NotificationKind, scheduled_at: Ms) -> Notification {
    Notification {
        id: Ulid::new(),
        booking_id,
        kind,
        status: NotificationStatus::Pending,
        scheduled_at,
        sent_at: None,
    }
}

/// Confirmation now, plus each reminder whose time is still ahead.
pub fn confirmation_notifications(booking: &Booking, now: Ms) -> Vec<Notification> {
    let mut out = vec![notification(booking.id, NotificationKind::BookingConfirmed, now)];
    for (kind, lead) in REMINDERS {
        let at = booking.span.start - lead;
        if at > now {
            out.push(notification(booking.id, kind, at));
        }
    }
    out
}

/// Book a lesson for `student`. The payment is mocked and always succeeds,
/// so the booking is confirmed immediately.
pub async fn create_booking(
    state: &AppState,
    student: &User,
    req: BookingRequest,
) -> Result<BookingDetails, ApiError> {
    let now = now_ms();
    validate_request(&req, now)?;

    let store = &state.store;
    let profile = store
        .teacher_profile(&req.teacher_id)
        .await
        .ok_or_else(|| ApiError::not_found("Teacher not found"))?;
    let teacher = store
        .find_user(&req.teacher_id)
        .ok_or_else(|| ApiError::not_found("Teacher not found"))?;
    if !profile.is_active {
        return Err(ApiError::bad_request("This teacher is not accepting bookings"));
    }
    if teacher.id == student.id {
        return Err(ApiError::bad_request("You cannot book a lesson with yourself"));
    }

    let start = req.start;
    let end = start + req.duration_minutes as Ms * MINUTE_MS;
    let booking = Booking {
        id: Ulid::new(),
        student_id: student.id,
        teacher_id: teacher.id,
        span: Span::new(start, end),
        duration_minutes: req.duration_minutes,
        notes: req.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        student_timezone: if student.timezone.is_empty() {
            DEFAULT_TIMEZONE.to_string()
        } else {
            student.timezone.clone()
        },
        teacher_timezone: teacher.timezone.clone(),
        status: BookingStatus::Confirmed,
        meeting_link: None,
        created_at: now,
    };
    let booking_id = booking.id;
    store.insert_booking_checked(booking.clone()).await?;
    metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);

    store
        .record_payment(mock_charge(&booking, profile.hourly_rate_cents, now))
        .await?;

    let meeting = MeetingRequest {
        booking_id,
        teacher_id: teacher.id,
        span: booking.span,
        teacher_name: teacher.name.clone(),
        teacher_email: teacher.email.clone(),
        student_name: student.name.clone(),
        student_email: student.email.clone(),
    };
    match state.meetings.generate(&meeting).await {
        Ok(link) => store.attach_meeting_link(booking_id, link).await?,
        Err(e) => warn!(booking = %booking_id, "failed to generate meeting link: {e}"),
    }

    for n in confirmation_notifications(&booking, now) {
        store.schedule_notification(n).await?;
    }

    info!(booking = %booking_id, teacher = %teacher.id, student = %student.id, "booking confirmed");
    let booking = store
        .booking(&booking_id)
        .await
        .ok_or_else(ApiError::internal)?;
    Ok(store.details(booking))
}

/// Cancel a booking on behalf of its student or teacher. The payment is
/// refunded and any reminders still pending are dropped.
pub async fn cancel_booking(
    state: &AppState,
    user: &User,
    booking_id: Ulid,
) -> Result<BookingDetails, ApiError> {
    let store = &state.store;
    let booking = store
        .booking(&booking_id)
        .await
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;
    if booking.student_id != user.id && booking.teacher_id != user.id {
        return Err(ApiError::forbidden("You cannot cancel this booking"));
    }

    let now = now_ms();
    let cancelled = store
        .cancel_booking(booking_id, now)
        .await
        .map_err(|e| match e {
            StoreError::InvalidInput(_) => {
                ApiError::bad_request("Only upcoming confirmed bookings can be cancelled")
            }
            other => other.into(),
        })?;

    store.refund_payment(booking_id).await?;
    for n in store.notifications_for(&booking_id) {
        if n.status == NotificationStatus::Pending {
            store
                .mark_notification(n.id, NotificationStatus::Failed, None)
                .await?;
        }
    }
    store
        .schedule_notification(notification(booking_id, NotificationKind::BookingCancelled, now))
        .await?;

    info!(booking = %booking_id, by = %user.id, "booking cancelled");
    Ok(store.details(cancelled))
}

/// Parse a `status` query value. `ALL`, unknown values and absence mean no
/// filter.
pub fn status_filter(raw: Option<&str>) -> Option<BookingStatus> {
    raw.and_then(|s| s.parse().ok())
}

/// Bookings the user is part of, newest lesson first. Teachers also see the
/// lessons booked with them.
pub async fn list_bookings(
    state: &AppState,
    user: &User,
    status: Option<&str>,
) -> Vec<BookingDetails> {
    let as_teacher = user.role == Some(Role::Teacher);
    state
        .store
        .bookings_for_user(&user.id, as_teacher, status_filter(status))
        .await
}
