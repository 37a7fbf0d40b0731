use chrono::NaiveDate;
use chrono_tz::Tz;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::open_slots;
use super::{Store, StoreError};

/// Parse an IANA zone name, falling back to UTC.
pub fn parse_tz(name: &str) -> Tz {
    name.parse().unwrap_or(Tz::UTC)
}

impl Store {
    // ── Users & sessions ─────────────────────────────────────

    pub fn find_user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        let id = *self.emails.get(&email.trim().to_lowercase())?.value();
        self.find_user(&id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// The user behind a live session, if any.
    pub fn session_user(&self, digest: &str, now: Ms) -> Option<User> {
        let user_id = {
            let session = self.sessions.get(digest)?;
            if is_expired(session.expires_at, now) {
                return None;
            }
            session.user_id
        };
        self.find_user(&user_id)
    }

    // ── Teachers ─────────────────────────────────────────────

    pub async fn teacher_profile(&self, teacher_id: &Ulid) -> Option<TeacherProfile> {
        let rs = self.schedule(teacher_id)?;
        let guard = rs.read().await;
        Some(guard.profile.clone())
    }

    pub async fn availability_for(&self, teacher_id: &Ulid) -> Result<Vec<Availability>, StoreError> {
        let rs = self
            .schedule(teacher_id)
            .ok_or_else(|| StoreError::not_found("teacher", teacher_id))?;
        let guard = rs.read().await;
        let mut windows = guard.availability.clone();
        windows.sort_by_key(|w| (w.day_of_week, w.start_minute));
        Ok(windows)
    }

    /// Active teachers matching `filter`, newest profile first.
    pub async fn list_teachers(&self, filter: &TeacherFilter) -> Vec<TeacherListing> {
        let schedules: Vec<_> = self.schedules.iter().map(|e| e.value().clone()).collect();
        let mut listings = Vec::new();
        for rs in schedules {
            let profile = rs.read().await.profile.clone();
            if !profile.is_active {
                continue;
            }
            if let Some(language) = &filter.language
                && !profile
                    .languages
                    .iter()
                    .any(|l| l.eq_ignore_ascii_case(language))
            {
                continue;
            }
            if filter.min_rate_cents.is_some_and(|min| profile.hourly_rate_cents < min)
                || filter.max_rate_cents.is_some_and(|max| profile.hourly_rate_cents > max)
            {
                continue;
            }
            let Some(user) = self.find_user(&profile.user_id) else {
                continue;
            };
            listings.push(TeacherListing { profile, user });
        }
        listings.sort_by(|a, b| {
            b.profile
                .created_at
                .cmp(&a.profile.created_at)
                .then_with(|| b.profile.user_id.cmp(&a.profile.user_id))
        });
        listings
    }

    /// Open lesson starts for a teacher on `date`, in the teacher's timezone.
    pub async fn teacher_open_slots(
        &self,
        teacher_id: &Ulid,
        date: NaiveDate,
        duration_minutes: u32,
        now: Ms,
    ) -> Result<Vec<Span>, StoreError> {
        if !(MIN_LESSON_MINUTES..=MAX_LESSON_MINUTES).contains(&duration_minutes) {
            return Err(StoreError::invalid(format!(
                "duration must be {MIN_LESSON_MINUTES}-{MAX_LESSON_MINUTES} minutes"
            )));
        }
        let tz = self
            .find_user(teacher_id)
            .map(|u| parse_tz(&u.timezone))
            .unwrap_or(Tz::UTC);
        let rs = self
            .schedule(teacher_id)
            .ok_or_else(|| StoreError::not_found("teacher", teacher_id))?;
        let guard = rs.read().await;
        Ok(open_slots(&guard, tz, date, duration_minutes, now))
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn booking(&self, booking_id: &Ulid) -> Option<Booking> {
        let teacher_id = *self.booking_teacher.get(booking_id)?.value();
        let rs = self.schedule(&teacher_id)?;
        let guard = rs.read().await;
        guard.booking(*booking_id).cloned()
    }

    pub fn payment_for(&self, booking_id: &Ulid) -> Option<Payment> {
        self.payments.get(booking_id).map(|e| e.value().clone())
    }

    pub fn details(&self, booking: Booking) -> BookingDetails {
        BookingDetails {
            student: self.find_user(&booking.student_id),
            teacher: self.find_user(&booking.teacher_id),
            payment: self.payment_for(&booking.id),
            booking,
        }
    }

    /// Bookings the user takes part in: as the student, and as the teacher
    /// when `as_teacher` is set. Newest lesson first.
    pub async fn bookings_for_user(
        &self,
        user_id: &Ulid,
        as_teacher: bool,
        status: Option<BookingStatus>,
    ) -> Vec<BookingDetails> {
        let mut bookings = Vec::new();

        let student_ids = self
            .student_bookings
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        for id in &student_ids {
            if let Some(b) = self.booking(id).await {
                bookings.push(b);
            }
        }

        if as_teacher && let Some(rs) = self.schedule(user_id) {
            let guard = rs.read().await;
            bookings.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.student_id != *user_id)
                    .cloned(),
            );
        }

        bookings.retain(|b| status.is_none_or(|s| b.status == s));
        bookings.sort_by(|a, b| b.span.start.cmp(&a.span.start).then_with(|| b.id.cmp(&a.id)));
        bookings.into_iter().map(|b| self.details(b)).collect()
    }

    // ── Notifications ────────────────────────────────────────

    pub fn notifications_for(&self, booking_id: &Ulid) -> Vec<Notification> {
        let mut out: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|e| e.booking_id == *booking_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|n| (n.scheduled_at, n.id));
        out
    }

    /// Pending notifications whose time has come, oldest first.
    pub fn due_notifications(&self, now: Ms) -> Vec<Notification> {
        let mut out: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|e| e.status == NotificationStatus::Pending && e.scheduled_at <= now)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|n| (n.scheduled_at, n.id));
        out
    }
}
