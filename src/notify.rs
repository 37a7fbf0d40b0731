use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::mailer::Mail;
use crate::model::*;
use crate::state::AppState;
use crate::store::{StoreError, now_ms, parse_tz};

const DISPATCH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// Lesson start in the reader's own timezone.
pub fn local_time(ms: Ms, timezone: &str) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(t) => t
            .with_timezone(&parse_tz(timezone))
            .format("%A %-d %B %Y, %H:%M %Z")
            .to_string(),
        None => ms.to_string(),
    }
}

fn subject(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::BookingConfirmed => "Your lesson is booked",
        NotificationKind::Reminder24h => "Your lesson is tomorrow",
        NotificationKind::Reminder1h => "Your lesson starts in one hour",
        NotificationKind::BookingCancelled => "Your lesson was cancelled",
    }
}

/// One mail per participant of the booking.
pub fn render(kind: NotificationKind, booking: &Booking, student: &User, teacher: &User) -> Vec<Mail> {
    let mut mails = Vec::with_capacity(2);
    for (reader, timezone, other) in [
        (student, &booking.student_timezone, teacher),
        (teacher, &booking.teacher_timezone, student),
    ] {
        let with = other.name.as_deref().unwrap_or(&other.email);
        let when = local_time(booking.span.start, timezone);
        let mut body = format!(
            "{} lesson with {with} on {when} ({} minutes).",
            match kind {
                NotificationKind::BookingCancelled => "Cancelled:",
                _ => "Upcoming:",
            },
            booking.duration_minutes
        );
        if kind != NotificationKind::BookingCancelled
            && let Some(link) = &booking.meeting_link
        {
            body.push_str(&format!(" Join at {link}"));
        }
        mails.push(Mail {
            to: reader.email.clone(),
            subject: subject(kind).to_string(),
            body,
        });
    }
    mails
}

async fn deliver(state: &AppState, n: &Notification) -> bool {
    let store = &state.store;
    let Some(booking) = store.booking(&n.booking_id).await else {
        return false;
    };
    // Reminders for a lesson that no longer happens are dropped.
    if n.kind != NotificationKind::BookingCancelled && booking.status == BookingStatus::Cancelled {
        return false;
    }
    let (Some(student), Some(teacher)) = (
        store.find_user(&booking.student_id),
        store.find_user(&booking.teacher_id),
    ) else {
        return false;
    };

    let mails = render(n.kind, &booking, &student, &teacher);
    let results = join_all(mails.iter().map(|mail| state.mailer.send(mail))).await;
    let mut ok = true;
    for (mail, result) in mails.iter().zip(results) {
        if let Err(e) = result {
            warn!(notification = %n.id, to = %mail.to, "delivery failed: {e}");
            ok = false;
        }
    }
    ok
}

/// Send every pending notification that is due. Each is marked sent or
/// failed exactly once; failed ones are not retried.
pub async fn dispatch_due(state: &AppState, now: Ms) -> Result<DispatchReport, StoreError> {
    let mut report = DispatchReport::default();
    for n in state.store.due_notifications(now) {
        if deliver(state, &n).await {
            state
                .store
                .mark_notification(n.id, NotificationStatus::Sent, Some(now_ms()))
                .await?;
            metrics::counter!(crate::observability::NOTIFICATIONS_SENT_TOTAL, "status" => "sent")
                .increment(1);
            report.sent += 1;
        } else {
            state
                .store
                .mark_notification(n.id, NotificationStatus::Failed, None)
                .await?;
            metrics::counter!(crate::observability::NOTIFICATIONS_SENT_TOTAL, "status" => "failed")
                .increment(1);
            report.failed += 1;
        }
    }
    Ok(report)
}

/// Background task that delivers due notifications.
pub async fn run_dispatcher(state: AppState) {
    let mut interval = tokio::time::interval(DISPATCH_INTERVAL);
    loop {
        interval.tick().await;
        match dispatch_due(&state, now_ms()).await {
            Ok(r) if r.sent + r.failed > 0 => {
                info!("dispatched notifications: {} sent, {} failed", r.sent, r.failed)
            }
            Ok(_) => {}
            Err(e) => debug!("dispatcher stopped early: {e}"),
        }
    }
}
