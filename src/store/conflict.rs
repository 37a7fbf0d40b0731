use crate::limits::*;
use crate::model::*;

use super::StoreError;

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// True when `candidate` leaves at least `buffer` idle time on both sides of
/// every span in `existing`. Touching spans are fine when `buffer` is zero.
pub fn check_availability<I>(candidate: &Span, existing: I, buffer: Ms) -> bool
where
    I: IntoIterator<Item = Span>,
{
    existing
        .into_iter()
        .all(|other| !other.padded(buffer).overlaps(candidate))
}

/// First active booking that keeps `span` from being booked, honouring the
/// teacher's buffer.
pub(crate) fn find_conflict(rs: &TeacherSchedule, span: &Span) -> Option<ulid::Ulid> {
    let buffer = rs.profile.buffer_ms();
    // Widen the search so bookings ending within `buffer` of our start are seen.
    let search = span.padded(buffer);
    rs.active_overlapping(&search)
        .find(|b| !check_availability(span, [b.span], buffer))
        .map(|b| b.id)
}

pub(crate) fn check_no_conflict(rs: &TeacherSchedule, span: &Span) -> Result<(), StoreError> {
    match find_conflict(rs, span) {
        Some(id) => Err(StoreError::Conflict(id)),
        None => Ok(()),
    }
}

pub(crate) fn validate_lesson_span(span: &Span, duration_minutes: u32, now: Ms) -> Result<(), StoreError> {
    if !(MIN_LESSON_MINUTES..=MAX_LESSON_MINUTES).contains(&duration_minutes)
        || duration_minutes % LESSON_GRANULARITY_MINUTES != 0
    {
        return Err(StoreError::invalid(format!(
            "duration must be {MIN_LESSON_MINUTES}-{MAX_LESSON_MINUTES} minutes in steps of {LESSON_GRANULARITY_MINUTES}"
        )));
    }
    if span.duration_ms() != duration_minutes as Ms * MINUTE_MS {
        return Err(StoreError::invalid("end does not match duration"));
    }
    if span.start <= now {
        return Err(StoreError::invalid("lesson must start in the future"));
    }
    if span.start > now + MAX_BOOKING_HORIZON_MS {
        return Err(StoreError::LimitExceeded("lesson too far in the future"));
    }
    Ok(())
}
