use std::collections::HashSet;

use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_lesson_span};
use super::{Store, StoreError, WalCommand};

fn validate_profile(p: &TeacherProfile) -> Result<(), StoreError> {
    if p.bio.as_ref().is_some_and(|b| b.len() > MAX_BIO_LEN) {
        return Err(StoreError::LimitExceeded("bio too long"));
    }
    if !(0..=MAX_HOURLY_RATE_CENTS).contains(&p.hourly_rate_cents) {
        return Err(StoreError::invalid("hourly rate out of range"));
    }
    if p.languages.len() > MAX_LANGUAGES {
        return Err(StoreError::LimitExceeded("too many languages"));
    }
    if p.languages
        .iter()
        .any(|l| l.trim().is_empty() || l.len() > MAX_LANGUAGE_LEN)
    {
        return Err(StoreError::invalid("invalid language"));
    }
    if p.years_experience.is_some_and(|y| y > MAX_YEARS_EXPERIENCE) {
        return Err(StoreError::invalid("years of experience out of range"));
    }
    if p.buffer_minutes > MAX_BUFFER_MINUTES {
        return Err(StoreError::invalid("buffer time out of range"));
    }
    Ok(())
}

fn validate_window(teacher_id: Ulid, w: &Availability) -> Result<(), StoreError> {
    if w.teacher_id != teacher_id {
        return Err(StoreError::invalid("availability belongs to another teacher"));
    }
    if w.day_of_week > 6 {
        return Err(StoreError::invalid("day of week must be 0-6"));
    }
    if w.start_minute >= w.end_minute || w.end_minute > MINUTES_PER_DAY {
        return Err(StoreError::invalid("window must start before it ends"));
    }
    Ok(())
}

impl Store {
    // ── Accounts ─────────────────────────────────────────────

    pub async fn create_user(&self, user: User) -> Result<(), StoreError> {
        if user.email.len() > MAX_EMAIL_LEN || user.email != user.email.to_lowercase() {
            return Err(StoreError::invalid("email must be lowercase and at most 254 bytes"));
        }
        if user.name.as_ref().is_some_and(|n| n.len() > MAX_NAME_LEN) {
            return Err(StoreError::LimitExceeded("name too long"));
        }
        if user.image.as_ref().is_some_and(|i| i.len() > MAX_IMAGE_URL_LEN) {
            return Err(StoreError::LimitExceeded("image url too long"));
        }
        if user.timezone.len() > MAX_TIMEZONE_LEN {
            return Err(StoreError::LimitExceeded("timezone too long"));
        }
        let _commit = self.commit_gate.read().await;
        let _accounts = self.account_lock.lock().await;
        if self.emails.contains_key(&user.email) {
            return Err(StoreError::AlreadyExists("user", user.email));
        }
        if self.users.contains_key(&user.id) {
            return Err(StoreError::AlreadyExists("user", user.id.to_string()));
        }
        self.persist(Event::UserCreated { user }).await
    }

    pub async fn set_user_role(&self, id: Ulid, role: Role) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        if !self.users.contains_key(&id) {
            return Err(StoreError::not_found("user", id));
        }
        self.persist(Event::UserRoleSet { id, role }).await
    }

    pub async fn set_password(&self, id: Ulid, password_hash: String) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        if !self.users.contains_key(&id) {
            return Err(StoreError::not_found("user", id));
        }
        self.persist(Event::PasswordChanged { id, password_hash }).await
    }

    // ── Teachers ─────────────────────────────────────────────

    pub async fn create_teacher_profile(&self, profile: TeacherProfile) -> Result<(), StoreError> {
        validate_profile(&profile)?;
        let _commit = self.commit_gate.read().await;
        let _accounts = self.account_lock.lock().await;
        if !self.users.contains_key(&profile.user_id) {
            return Err(StoreError::not_found("user", profile.user_id));
        }
        if self.schedules.contains_key(&profile.user_id) {
            return Err(StoreError::AlreadyExists("teacher profile", profile.user_id.to_string()));
        }
        self.persist(Event::TeacherProfileCreated { profile }).await
    }

    pub async fn update_teacher_profile(
        &self,
        teacher_id: Ulid,
        patch: ProfilePatch,
    ) -> Result<TeacherProfile, StoreError> {
        let _commit = self.commit_gate.read().await;
        let rs = self
            .schedule(&teacher_id)
            .ok_or_else(|| StoreError::not_found("teacher", teacher_id))?;
        let mut guard = rs.write().await;

        let mut profile = guard.profile.clone();
        if let Some(bio) = patch.bio {
            profile.bio = Some(bio);
        }
        if let Some(rate) = patch.hourly_rate_cents {
            profile.hourly_rate_cents = rate;
        }
        if let Some(languages) = patch.languages {
            profile.languages = languages;
        }
        if let Some(years) = patch.years_experience {
            profile.years_experience = Some(years);
        }
        if let Some(buffer) = patch.buffer_minutes {
            profile.buffer_minutes = buffer;
        }
        if let Some(active) = patch.is_active {
            profile.is_active = active;
        }
        validate_profile(&profile)?;
        if profile == guard.profile {
            return Ok(profile);
        }

        self.persist_and_apply(&mut guard, Event::TeacherProfileUpdated { profile: profile.clone() })
            .await?;
        Ok(profile)
    }

    pub async fn replace_availability(
        &self,
        teacher_id: Ulid,
        windows: Vec<Availability>,
    ) -> Result<(), StoreError> {
        if windows.len() > MAX_AVAILABILITY_WINDOWS {
            return Err(StoreError::LimitExceeded("too many availability windows"));
        }
        for w in &windows {
            validate_window(teacher_id, w)?;
        }
        let _commit = self.commit_gate.read().await;
        let rs = self
            .schedule(&teacher_id)
            .ok_or_else(|| StoreError::not_found("teacher", teacher_id))?;
        let mut guard = rs.write().await;
        self.persist_and_apply(&mut guard, Event::AvailabilityReplaced { teacher_id, windows })
            .await
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Insert a booking after checking it against the teacher's calendar.
    /// The check and the insert happen under the schedule's write lock.
    pub async fn insert_booking_checked(&self, booking: Booking) -> Result<(), StoreError> {
        if booking.notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(StoreError::LimitExceeded("notes too long"));
        }
        validate_lesson_span(&booking.span, booking.duration_minutes, now_ms())?;
        if booking.student_id == booking.teacher_id {
            return Err(StoreError::invalid("teachers cannot book themselves"));
        }
        let _commit = self.commit_gate.read().await;
        if self.booking_teacher.contains_key(&booking.id) {
            return Err(StoreError::AlreadyExists("booking", booking.id.to_string()));
        }
        let rs = self
            .schedule(&booking.teacher_id)
            .ok_or_else(|| StoreError::not_found("teacher", booking.teacher_id))?;
        let mut guard = rs.write().await;
        if !guard.has_room_for_booking(MAX_ACTIVE_BOOKINGS_PER_TEACHER) {
            return Err(StoreError::LimitExceeded("too many upcoming bookings on teacher"));
        }

        if let Err(e) = check_no_conflict(&guard, &booking.span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        self.persist_and_apply(&mut guard, Event::BookingCreated { booking })
            .await
    }

    pub async fn attach_meeting_link(&self, booking_id: Ulid, link: String) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        let (teacher_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        self.persist_and_apply(
            &mut guard,
            Event::MeetingLinkAttached {
                booking_id,
                teacher_id,
                link,
            },
        )
        .await
    }

    pub async fn set_booking_status(
        &self,
        booking_id: Ulid,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        let (teacher_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        self.persist_and_apply(
            &mut guard,
            Event::BookingStatusChanged {
                booking_id,
                teacher_id,
                status,
            },
        )
        .await
    }

    /// Cancel an active booking that has not started yet.
    pub async fn cancel_booking(&self, booking_id: Ulid, now: Ms) -> Result<Booking, StoreError> {
        let _commit = self.commit_gate.read().await;
        let (teacher_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("booking", booking_id))?;
        if !booking.status.is_active() {
            return Err(StoreError::invalid(format!("booking is {}", booking.status)));
        }
        if booking.span.start <= now {
            return Err(StoreError::invalid("lesson has already started"));
        }
        self.persist_and_apply(
            &mut guard,
            Event::BookingStatusChanged {
                booking_id,
                teacher_id,
                status: BookingStatus::Cancelled,
            },
        )
        .await?;
        Ok(Booking {
            status: BookingStatus::Cancelled,
            ..booking
        })
    }

    /// Mark confirmed lessons that ended before `now` as completed.
    pub async fn complete_finished_bookings(&self, now: Ms) -> Result<usize, StoreError> {
        let schedules: Vec<_> = self.schedules.iter().map(|e| e.value().clone()).collect();
        let mut finished = Vec::new();
        for rs in schedules {
            let guard = rs.read().await;
            finished.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.status == BookingStatus::Confirmed && b.span.end <= now)
                    .map(|b| b.id),
            );
        }
        for id in &finished {
            self.set_booking_status(*id, BookingStatus::Completed).await?;
        }
        Ok(finished.len())
    }

    /// Lookup booking → teacher, acquire the schedule's write lock.
    async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<TeacherSchedule>), StoreError> {
        let teacher_id = self
            .booking_teacher
            .get(booking_id)
            .map(|e| *e.value())
            .ok_or_else(|| StoreError::not_found("booking", booking_id))?;
        let rs = self
            .schedule(&teacher_id)
            .ok_or_else(|| StoreError::not_found("teacher", teacher_id))?;
        Ok((teacher_id, rs.write_owned().await))
    }

    // ── Payments ─────────────────────────────────────────────

    pub async fn record_payment(&self, payment: Payment) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        if !self.booking_teacher.contains_key(&payment.booking_id) {
            return Err(StoreError::not_found("booking", payment.booking_id));
        }
        if self.payments.contains_key(&payment.booking_id) {
            return Err(StoreError::AlreadyExists("payment", payment.booking_id.to_string()));
        }
        self.persist(Event::PaymentRecorded { payment }).await
    }

    pub async fn set_payment_status(
        &self,
        booking_id: Ulid,
        status: PaymentStatus,
    ) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        if !self.payments.contains_key(&booking_id) {
            return Err(StoreError::not_found("payment", booking_id));
        }
        self.persist(Event::PaymentStatusChanged { booking_id, status }).await
    }

    /// Mark the payment of a booking as refunded. No-op for bookings that
    /// never had a payment.
    pub async fn refund_payment(&self, booking_id: Ulid) -> Result<bool, StoreError> {
        if !self.payments.contains_key(&booking_id) {
            return Ok(false);
        }
        self.set_payment_status(booking_id, PaymentStatus::Refunded)
            .await?;
        Ok(true)
    }

    // ── Notifications ────────────────────────────────────────

    pub async fn schedule_notification(&self, notification: Notification) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        if !self.booking_teacher.contains_key(&notification.booking_id) {
            return Err(StoreError::not_found("booking", notification.booking_id));
        }
        self.persist(Event::NotificationScheduled { notification }).await
    }

    pub async fn mark_notification(
        &self,
        id: Ulid,
        status: NotificationStatus,
        sent_at: Option<Ms>,
    ) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        if !self.notifications.contains_key(&id) {
            return Err(StoreError::not_found("notification", id));
        }
        self.persist(Event::NotificationMarked { id, status, sent_at }).await
    }

    // ── Tokens & sessions ────────────────────────────────────

    pub async fn issue_reset_token(&self, token: ResetToken) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        self.persist(Event::ResetTokenIssued { token }).await
    }

    /// Remove and return a reset token. Expired tokens are removed too but
    /// reported as invalid.
    pub async fn consume_reset_token(&self, digest: &str, now: Ms) -> Result<ResetToken, StoreError> {
        let _commit = self.commit_gate.read().await;
        let token = self
            .reset_tokens
            .get(digest)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::invalid("invalid or expired token"))?;
        self.persist(Event::ResetTokenConsumed {
            digest: digest.to_string(),
        })
        .await?;
        if is_expired(token.expires_at, now) {
            return Err(StoreError::invalid("invalid or expired token"));
        }
        Ok(token)
    }

    pub async fn issue_session(&self, session: Session) -> Result<(), StoreError> {
        let _commit = self.commit_gate.read().await;
        if !self.users.contains_key(&session.user_id) {
            return Err(StoreError::not_found("user", session.user_id));
        }
        self.persist(Event::SessionIssued { session }).await
    }

    /// Returns false if there was no such session.
    pub async fn revoke_session(&self, digest: &str) -> Result<bool, StoreError> {
        let _commit = self.commit_gate.read().await;
        if !self.sessions.contains_key(digest) {
            return Ok(false);
        }
        self.persist(Event::SessionRevoked {
            digest: digest.to_string(),
        })
        .await?;
        Ok(true)
    }

    /// Drop expired sessions and reset tokens. Returns how many were removed.
    pub async fn collect_expired(&self, now: Ms) -> Result<usize, StoreError> {
        let sessions: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| is_expired(e.expires_at, now))
            .map(|e| e.key().clone())
            .collect();
        let tokens: Vec<String> = self
            .reset_tokens
            .iter()
            .filter(|e| is_expired(e.expires_at, now))
            .map(|e| e.key().clone())
            .collect();

        let _commit = self.commit_gate.read().await;
        let removed = sessions.len() + tokens.len();
        for digest in sessions {
            self.persist(Event::SessionRevoked { digest }).await?;
        }
        for digest in tokens {
            self.persist(Event::ResetTokenConsumed { digest }).await?;
        }
        Ok(removed)
    }

    // ── Maintenance ──────────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _exclusive = self.commit_gate.write().await;
        let mut events = Vec::new();

        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        events.extend(users.into_iter().map(|user| Event::UserCreated { user }));

        let mut teacher_ids: Vec<Ulid> = self.schedules.iter().map(|e| *e.key()).collect();
        teacher_ids.sort();
        let mut seen_bookings = HashSet::new();
        for teacher_id in teacher_ids {
            let Some(rs) = self.schedule(&teacher_id) else {
                continue;
            };
            let guard = rs.read().await;
            events.push(Event::TeacherProfileCreated {
                profile: guard.profile.clone(),
            });
            if !guard.availability.is_empty() {
                events.push(Event::AvailabilityReplaced {
                    teacher_id,
                    windows: guard.availability.clone(),
                });
            }
            for booking in &guard.bookings {
                seen_bookings.insert(booking.id);
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }

        events.extend(
            self.payments
                .iter()
                .filter(|e| seen_bookings.contains(e.key()))
                .map(|e| Event::PaymentRecorded {
                    payment: e.value().clone(),
                }),
        );
        events.extend(
            self.notifications
                .iter()
                .filter(|e| seen_bookings.contains(&e.booking_id))
                .map(|e| Event::NotificationScheduled {
                    notification: e.value().clone(),
                }),
        );
        events.extend(self.reset_tokens.iter().map(|e| Event::ResetTokenIssued {
            token: e.value().clone(),
        }));
        events.extend(self.sessions.iter().map(|e| Event::SessionIssued {
            session: e.value().clone(),
        }));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
