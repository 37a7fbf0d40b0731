use crate::booking::list_bookings;
use crate::model::*;
use crate::state::AppState;
use crate::store::now_ms;

const UPCOMING_SHOWN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardStats {
    pub role: Option<Role>,
    pub total_bookings: usize,
    pub upcoming_count: usize,
    /// Whole hours of lessons that were not cancelled.
    pub hours_learned: u64,
    /// Paid amounts of confirmed and completed lessons.
    pub earnings_cents: Cents,
    /// The next few lessons, soonest first.
    pub upcoming: Vec<BookingDetails>,
}

/// Headline numbers for a user's dashboard. Teachers see the lessons they
/// give; everyone else the lessons they take.
pub fn summarize(role: Option<Role>, bookings: Vec<BookingDetails>, now: Ms) -> DashboardStats {
    let total_bookings = bookings.len();
    let minutes: u64 = bookings
        .iter()
        .filter(|d| d.booking.status != BookingStatus::Cancelled)
        .map(|d| d.booking.duration_minutes as u64)
        .sum();
    let earnings_cents = bookings
        .iter()
        .filter(|d| {
            matches!(
                d.booking.status,
                BookingStatus::Confirmed | BookingStatus::Completed
            )
        })
        .filter_map(|d| d.payment.as_ref())
        .filter(|p| p.status == PaymentStatus::Completed)
        .map(|p| p.amount_cents)
        .sum();

    let mut upcoming: Vec<BookingDetails> = bookings
        .into_iter()
        .filter(|d| d.booking.span.start > now && d.booking.status.is_active())
        .collect();
    upcoming.sort_by_key(|d| d.booking.span.start);
    let upcoming_count = upcoming.len();
    upcoming.truncate(UPCOMING_SHOWN);

    DashboardStats {
        role,
        total_bookings,
        upcoming_count,
        hours_learned: minutes / 60,
        earnings_cents,
        upcoming,
    }
}

pub async fn dashboard(state: &AppState, user: &User) -> DashboardStats {
    let bookings = list_bookings(state, user, None).await;
    summarize(user.role, bookings, now_ms())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{BookingRequest, cancel_booking, create_booking};
    use crate::testing::*;

    #[tokio::test]
    async fn student_and_teacher_views() {
        let (state, _) = test_state("dashboard.wal");
        let teacher = active_teacher(&state, "t@example.com", 6000, 0).await;
        let student = new_student(&state, "s@example.com").await;

        let mut ids = Vec::new();
        for (hours, minutes) in [(50, 90), (26, 60), (74, 45), (98, 60)] {
            let details = create_booking(
                &state,
                &student,
                BookingRequest {
                    teacher_id: teacher.id,
                    start: future_hour(hours),
                    duration_minutes: minutes,
                    notes: None,
                },
            )
            .await
            .unwrap();
            ids.push(details.booking.id);
        }
        cancel_booking(&state, &student, ids[3]).await.unwrap();

        let mine = dashboard(&state, &student).await;
        assert_eq!(mine.total_bookings, 4);
        assert_eq!(mine.upcoming_count, 3);
        // 90 + 60 + 45 minutes.
        assert_eq!(mine.hours_learned, 3);
        let next: Vec<_> = mine.upcoming.iter().map(|d| d.booking.id).collect();
        assert_eq!(next, vec![ids[1], ids[0], ids[2]]);

        let theirs = dashboard(&state, &teacher).await;
        assert_eq!(theirs.role, Some(Role::Teacher));
        assert_eq!(theirs.total_bookings, 4);
        // 90 + 60 + 45 minutes at 60.00 an hour; the refunded lesson is excluded.
        assert_eq!(theirs.earnings_cents, 9000 + 6000 + 4500);
    }

    #[test]
    fn empty_dashboard() {
        let stats = summarize(Some(Role::Student), Vec::new(), 0);
        assert_eq!(stats.total_bookings, 0);
        assert_eq!(stats.hours_learned, 0);
        assert!(stats.upcoming.is_empty());
    }
}
