//! JSON shapes of the API. Field names are camelCase, times RFC 3339 in UTC,
//! money in currency units.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use ulid::Ulid;

use crate::dashboard::DashboardStats;
use crate::model::*;
use crate::store::format_hhmm;
use crate::teachers::cents_to_units;

pub fn utc(ms: Ms) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// The public part of a user, embedded in bookings and listings.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Ulid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            image: u.image.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Ulid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub role: Option<Role>,
    pub timezone: String,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            image: u.image.clone(),
            role: u.role,
            timezone: u.timezone.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherView {
    pub user_id: Ulid,
    pub bio: Option<String>,
    pub hourly_rate: f64,
    pub languages: Vec<String>,
    pub years_experience: Option<u32>,
    pub buffer_time: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

impl TeacherView {
    pub fn new(profile: &TeacherProfile, user: Option<&User>) -> Self {
        Self {
            user_id: profile.user_id,
            bio: profile.bio.clone(),
            hourly_rate: cents_to_units(profile.hourly_rate_cents),
            languages: profile.languages.clone(),
            years_experience: profile.years_experience,
            buffer_time: profile.buffer_minutes,
            is_active: profile.is_active,
            created_at: utc(profile.created_at),
            user: user.map(UserSummary::from),
        }
    }
}

impl From<&TeacherListing> for TeacherView {
    fn from(l: &TeacherListing) -> Self {
        Self::new(&l.profile, Some(&l.user))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityView {
    pub id: Ulid,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub is_recurring: bool,
}

impl From<&Availability> for AvailabilityView {
    fn from(a: &Availability) -> Self {
        Self {
            id: a.id,
            day_of_week: a.day_of_week,
            start_time: format_hhmm(a.start_minute),
            end_time: format_hhmm(a.end_minute),
            is_recurring: a.is_recurring,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<&Span> for SlotView {
    fn from(s: &Span) -> Self {
        Self {
            start_time: utc(s.start),
            end_time: utc(s.end),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: Ulid,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentView {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id,
            amount: cents_to_units(p.amount_cents),
            currency: p.currency.clone(),
            status: p.status,
            provider_ref: p.provider_ref.clone(),
            created_at: utc(p.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Ulid,
    pub student_id: Ulid,
    pub teacher_id: Ulid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub notes: Option<String>,
    pub student_timezone: String,
    pub teacher_timezone: String,
    pub status: BookingStatus,
    pub meeting_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub student: Option<UserSummary>,
    pub teacher: Option<UserSummary>,
    pub payment: Option<PaymentView>,
}

impl From<&BookingDetails> for BookingView {
    fn from(d: &BookingDetails) -> Self {
        let b = &d.booking;
        Self {
            id: b.id,
            student_id: b.student_id,
            teacher_id: b.teacher_id,
            start_time: utc(b.span.start),
            end_time: utc(b.span.end),
            duration_minutes: b.duration_minutes,
            notes: b.notes.clone(),
            student_timezone: b.student_timezone.clone(),
            teacher_timezone: b.teacher_timezone.clone(),
            status: b.status,
            meeting_link: b.meeting_link.clone(),
            created_at: utc(b.created_at),
            student: d.student.as_ref().map(UserSummary::from),
            teacher: d.teacher.as_ref().map(UserSummary::from),
            payment: d.payment.as_ref().map(PaymentView::from),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub role: Option<Role>,
    pub total_bookings: usize,
    pub upcoming_count: usize,
    pub hours_learned: u64,
    pub earnings: f64,
    pub upcoming: Vec<BookingView>,
}

impl From<&DashboardStats> for DashboardView {
    fn from(s: &DashboardStats) -> Self {
        Self {
            role: s.role,
            total_bookings: s.total_bookings,
            upcoming_count: s.upcoming_count,
            hours_learned: s.hours_learned,
            earnings: cents_to_units(s.earnings_cents),
            upcoming: s.upcoming.iter().map(BookingView::from).collect(),
        }
    }
}
