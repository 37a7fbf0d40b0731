use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type inside the store.
pub type Ms = i64;

/// Money in minor units (cents).
pub type Cents = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;

/// Sessions and reset tokens stop working at their `expires_at` instant.
pub fn is_expired(expires_at: Ms, now: Ms) -> bool {
    expires_at <= now
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Grow the span by `pad` on both sides.
    pub fn padded(&self, pad: Ms) -> Span {
        Span::new(self.start - pad, self.end + pad)
    }
}

// ── Enumerations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Bookings in these states occupy the teacher's calendar.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::PendingPayment | BookingStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "PENDING_PAYMENT",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(BookingStatus::PendingPayment),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "BOOKING_CONFIRMED")]
    BookingConfirmed,
    #[serde(rename = "REMINDER_24H")]
    Reminder24h,
    #[serde(rename = "REMINDER_1H")]
    Reminder1h,
    #[serde(rename = "BOOKING_CANCELLED")]
    BookingCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

// ── Records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    /// Always stored lowercase.
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    /// PHC-encoded hash. `None` for accounts that only sign in through OAuth.
    pub password_hash: Option<String>,
    /// `None` until an OAuth sign-up picks a role.
    pub role: Option<Role>,
    pub timezone: String,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherProfile {
    /// The teacher's user id; bookings reference this.
    pub user_id: Ulid,
    pub bio: Option<String>,
    pub hourly_rate_cents: Cents,
    pub languages: Vec<String>,
    pub years_experience: Option<u32>,
    /// Idle time required between two lessons.
    pub buffer_minutes: u32,
    pub is_active: bool,
    pub created_at: Ms,
}

impl TeacherProfile {
    pub fn buffer_ms(&self) -> Ms {
        self.buffer_minutes as Ms * MINUTE_MS
    }
}

/// A weekly window, expressed in the teacher's local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub id: Ulid,
    pub teacher_id: Ulid,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u8,
    /// Minutes since local midnight.
    pub start_minute: u16,
    /// Minutes since local midnight, at most 24:00.
    pub end_minute: u16,
    pub is_recurring: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub student_id: Ulid,
    pub teacher_id: Ulid,
    pub span: Span,
    pub duration_minutes: u32,
    pub notes: Option<String>,
    pub student_timezone: String,
    pub teacher_timezone: String,
    pub status: BookingStatus,
    pub meeting_link: Option<String>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub amount_cents: Cents,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_ref: Option<String>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub scheduled_at: Ms,
    pub sent_at: Option<Ms>,
}

/// Password-reset token. Only the digest of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetToken {
    pub digest: String,
    pub email: String,
    pub expires_at: Ms,
}

/// Signed-in session. Only the digest of the bearer token is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub digest: String,
    pub user_id: Ulid,
    pub expires_at: Ms,
}

// ── Per-teacher state ────────────────────────────────────────────

/// Everything the booking path needs for one teacher, guarded by a single lock.
#[derive(Debug, Clone)]
pub struct TeacherSchedule {
    pub profile: TeacherProfile,
    pub availability: Vec<Availability>,
    /// All bookings (any status), sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl TeacherSchedule {
    pub fn new(profile: TeacherProfile) -> Self {
        Self {
            profile,
            availability: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    /// Whether another calendar-blocking booking fits under `max_active`.
    /// Cancelled and completed lessons do not count.
    pub fn has_room_for_booking(&self, max_active: usize) -> bool {
        self.bookings.iter().filter(|b| b.status.is_active()).count() < max_active
    }

    /// Active (calendar-blocking) bookings overlapping the query window.
    pub fn active_overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        self.overlapping(query).filter(|b| b.status.is_active())
    }
}

/// The event types, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserCreated {
        user: User,
    },
    UserRoleSet {
        id: Ulid,
        role: Role,
    },
    PasswordChanged {
        id: Ulid,
        password_hash: String,
    },
    TeacherProfileCreated {
        profile: TeacherProfile,
    },
    TeacherProfileUpdated {
        profile: TeacherProfile,
    },
    AvailabilityReplaced {
        teacher_id: Ulid,
        windows: Vec<Availability>,
    },
    BookingCreated {
        booking: Booking,
    },
    MeetingLinkAttached {
        booking_id: Ulid,
        teacher_id: Ulid,
        link: String,
    },
    BookingStatusChanged {
        booking_id: Ulid,
        teacher_id: Ulid,
        status: BookingStatus,
    },
    PaymentRecorded {
        payment: Payment,
    },
    PaymentStatusChanged {
        booking_id: Ulid,
        status: PaymentStatus,
    },
    NotificationScheduled {
        notification: Notification,
    },
    NotificationMarked {
        id: Ulid,
        status: NotificationStatus,
        sent_at: Option<Ms>,
    },
    ResetTokenIssued {
        token: ResetToken,
    },
    ResetTokenConsumed {
        digest: String,
    },
    SessionIssued {
        session: Session,
    },
    SessionRevoked {
        digest: String,
    },
}

impl Event {
    /// The teacher schedule an event mutates, if any.
    pub fn teacher_id(&self) -> Option<Ulid> {
        match self {
            Event::TeacherProfileUpdated { profile } => Some(profile.user_id),
            Event::AvailabilityReplaced { teacher_id, .. }
            | Event::MeetingLinkAttached { teacher_id, .. }
            | Event::BookingStatusChanged { teacher_id, .. } => Some(*teacher_id),
            Event::BookingCreated { booking } => Some(booking.teacher_id),
            _ => None,
        }
    }
}

/// Teacher-editable profile fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub bio: Option<String>,
    pub hourly_rate_cents: Option<Cents>,
    pub languages: Option<Vec<String>>,
    pub years_experience: Option<u32>,
    pub buffer_minutes: Option<u32>,
    pub is_active: Option<bool>,
}

// ── Query result types ───────────────────────────────────────────

/// Filter for the teacher directory. Rates are in cents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeacherFilter {
    pub language: Option<String>,
    pub min_rate_cents: Option<Cents>,
    pub max_rate_cents: Option<Cents>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherListing {
    pub profile: TeacherProfile,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDetails {
    pub booking: Booking,
    pub student: Option<User>,
    pub teacher: Option<User>,
    pub payment: Option<Payment>,
}
