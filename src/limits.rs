use crate::model::{Cents, Ms, HOUR_MS};

pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NAME_LEN: usize = 120;
pub const MAX_BIO_LEN: usize = 4_000;
pub const MAX_NOTES_LEN: usize = 1_000;
pub const MAX_TIMEZONE_LEN: usize = 64;
pub const MAX_IMAGE_URL_LEN: usize = 2_048;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 128;

pub const MAX_LANGUAGES: usize = 20;
pub const MAX_LANGUAGE_LEN: usize = 40;
pub const MAX_AVAILABILITY_WINDOWS: usize = 56;
pub const MAX_BUFFER_MINUTES: u32 = 240;
pub const MAX_HOURLY_RATE_CENTS: Cents = 100_000_00;
pub const MAX_YEARS_EXPERIENCE: u32 = 80;
/// Confirmed or pending lessons per teacher; finished ones are not counted.
pub const MAX_ACTIVE_BOOKINGS_PER_TEACHER: usize = 50_000;

pub const MIN_LESSON_MINUTES: u32 = 15;
pub const MAX_LESSON_MINUTES: u32 = 240;
/// Lesson lengths must be a multiple of this.
pub const LESSON_GRANULARITY_MINUTES: u32 = 5;
/// Spacing of bookable slot starts inside an availability window.
pub const SLOT_STEP_MINUTES: u16 = 15;

/// Bookings further out than this are rejected.
pub const MAX_BOOKING_HORIZON_MS: Ms = 365 * 24 * HOUR_MS;
pub const RESET_TOKEN_TTL_MS: Ms = HOUR_MS;

pub const DEFAULT_HOURLY_RATE_CENTS: Cents = 50_00;
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_CURRENCY: &str = "usd";

pub const MINUTES_PER_DAY: u16 = 24 * 60;
