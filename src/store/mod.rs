mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{
    format_hhmm, merge_overlapping, open_slots, parse_hhmm, subtract_intervals, time_slots,
    window_spans,
};
pub use conflict::{check_availability, now_ms};
pub use error::StoreError;
pub use queries::parse_tz;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tracing::warn;
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedSchedule = Arc<RwLock<TeacherSchedule>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// take the first append, drain whatever else is already queued, then fsync
/// once and answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so stale bytes never leak into the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

/// In-memory state for the whole marketplace, rebuilt from the WAL on open.
///
/// Each teacher's profile, weekly windows and bookings sit behind one lock so
/// the conflict check and the insert of a booking happen atomically.
pub struct Store {
    pub(super) users: DashMap<Ulid, User>,
    /// Lowercase email → user id.
    pub(super) emails: DashMap<String, Ulid>,
    /// Teacher user id → schedule.
    pub(super) schedules: DashMap<Ulid, SharedSchedule>,
    /// Booking id → teacher user id.
    pub(super) booking_teacher: DashMap<Ulid, Ulid>,
    /// Student user id → booking ids.
    pub(super) student_bookings: DashMap<Ulid, Vec<Ulid>>,
    /// Booking id → payment.
    pub(super) payments: DashMap<Ulid, Payment>,
    pub(super) notifications: DashMap<Ulid, Notification>,
    /// Token digest → reset token.
    pub(super) reset_tokens: DashMap<String, ResetToken>,
    /// Token digest → session.
    pub(super) sessions: DashMap<String, Session>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively so the
    /// snapshot never misses an event that is already in the log.
    pub(super) commit_gate: RwLock<()>,
    /// Serializes sign-ups so the email uniqueness check cannot race.
    pub(super) account_lock: Mutex<()>,
}

impl Store {
    /// Replay the WAL at `wal_path` and start the background writer.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.discarded_bytes > 0 {
            warn!(
                "discarded {} trailing bytes from {}",
                replay.discarded_bytes,
                wal_path.display()
            );
            Wal::truncate_to(&wal_path, replay.valid_len)?;
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            schedules: DashMap::new(),
            booking_teacher: DashMap::new(),
            student_bookings: DashMap::new(),
            payments: DashMap::new(),
            notifications: DashMap::new(),
            reset_tokens: DashMap::new(),
            sessions: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            account_lock: Mutex::new(()),
        };

        // We are the only owner of these locks during replay, so try_write
        // always succeeds; never block here since we may be inside async code.
        for event in &replay.events {
            store.apply_shared(event);
            if let Some(teacher_id) = event.teacher_id()
                && let Some(rs) = store.schedule(&teacher_id)
                && let Ok(mut guard) = rs.try_write()
            {
                apply_to_schedule(&mut guard, event);
            }
        }

        Ok(store)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    /// WAL-append + apply for events that touch no teacher schedule.
    pub(super) async fn persist(&self, event: Event) -> Result<(), StoreError> {
        self.wal_append(&event).await?;
        self.apply_shared(&event);
        Ok(())
    }

    /// WAL-append + apply for events on a schedule the caller has write-locked.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut TeacherSchedule,
        event: Event,
    ) -> Result<(), StoreError> {
        self.wal_append(&event).await?;
        self.apply_shared(&event);
        apply_to_schedule(rs, &event);
        Ok(())
    }

    pub fn schedule(&self, teacher_id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(teacher_id).map(|e| e.value().clone())
    }

    /// Apply the parts of an event that live outside teacher schedules.
    fn apply_shared(&self, event: &Event) {
        match event {
            Event::UserCreated { user } => {
                self.emails.insert(user.email.clone(), user.id);
                self.users.insert(user.id, user.clone());
            }
            Event::UserRoleSet { id, role } => {
                if let Some(mut user) = self.users.get_mut(id) {
                    user.role = Some(*role);
                }
            }
            Event::PasswordChanged { id, password_hash } => {
                if let Some(mut user) = self.users.get_mut(id) {
                    user.password_hash = Some(password_hash.clone());
                }
            }
            Event::TeacherProfileCreated { profile } => {
                self.schedules.insert(
                    profile.user_id,
                    Arc::new(RwLock::new(TeacherSchedule::new(profile.clone()))),
                );
            }
            Event::BookingCreated { booking } => {
                self.booking_teacher.insert(booking.id, booking.teacher_id);
                self.student_bookings
                    .entry(booking.student_id)
                    .or_default()
                    .push(booking.id);
            }
            Event::PaymentRecorded { payment } => {
                self.payments.insert(payment.booking_id, payment.clone());
            }
            Event::PaymentStatusChanged { booking_id, status } => {
                if let Some(mut payment) = self.payments.get_mut(booking_id) {
                    payment.status = *status;
                }
            }
            Event::NotificationScheduled { notification } => {
                self.notifications.insert(notification.id, notification.clone());
            }
            Event::NotificationMarked { id, status, sent_at } => {
                if let Some(mut n) = self.notifications.get_mut(id) {
                    n.status = *status;
                    n.sent_at = *sent_at;
                }
            }
            Event::ResetTokenIssued { token } => {
                self.reset_tokens.insert(token.digest.clone(), token.clone());
            }
            Event::ResetTokenConsumed { digest } => {
                self.reset_tokens.remove(digest);
            }
            Event::SessionIssued { session } => {
                self.sessions.insert(session.digest.clone(), session.clone());
            }
            Event::SessionRevoked { digest } => {
                self.sessions.remove(digest);
            }
            // Schedule-only events.
            Event::TeacherProfileUpdated { .. }
            | Event::AvailabilityReplaced { .. }
            | Event::MeetingLinkAttached { .. }
            | Event::BookingStatusChanged { .. } => {}
        }
    }
}

/// Apply an event to a schedule. The caller holds the lock.
fn apply_to_schedule(rs: &mut TeacherSchedule, event: &Event) {
    match event {
        Event::TeacherProfileUpdated { profile } => {
            rs.profile = profile.clone();
        }
        Event::AvailabilityReplaced { windows, .. } => {
            rs.availability = windows.clone();
        }
        Event::BookingCreated { booking } => {
            rs.insert_booking(booking.clone());
        }
        Event::MeetingLinkAttached {
            booking_id, link, ..
        } => {
            if let Some(b) = rs.booking_mut(*booking_id) {
                b.meeting_link = Some(link.clone());
            }
        }
        Event::BookingStatusChanged {
            booking_id, status, ..
        } => {
            if let Some(b) = rs.booking_mut(*booking_id) {
                b.status = *status;
            }
        }
        _ => {}
    }
}
