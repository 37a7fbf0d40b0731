use ulid::Ulid;

use crate::limits::DEFAULT_CURRENCY;
use crate::model::{Booking, Cents, Ms, Payment, PaymentStatus};

/// Price of a lesson: the hourly rate pro rata, rounded to the nearest cent
/// (halves round up).
pub fn lesson_price(hourly_rate_cents: Cents, duration_minutes: u32) -> Cents {
    (hourly_rate_cents * duration_minutes as Cents + 30) / 60
}

/// Stand-in for a card charge: always succeeds and references the booking.
pub fn mock_charge(booking: &Booking, hourly_rate_cents: Cents, now: Ms) -> Payment {
    Payment {
        id: Ulid::new(),
        booking_id: booking.id,
        amount_cents: lesson_price(hourly_rate_cents, booking.duration_minutes),
        currency: DEFAULT_CURRENCY.to_string(),
        status: PaymentStatus::Completed,
        provider_ref: Some(format!("mock_{}", booking.id)),
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_pro_rata() {
        assert_eq!(lesson_price(4000, 60), 4000);
        assert_eq!(lesson_price(4000, 90), 6000);
        assert_eq!(lesson_price(5000, 45), 3750);
        // 3333 * 20 / 60 = 1111
        assert_eq!(lesson_price(3333, 20), 1111);
        // 1000 * 25 / 60 = 416.67
        assert_eq!(lesson_price(1000, 25), 417);
        // 10 * 15 / 60 = 2.5
        assert_eq!(lesson_price(10, 15), 3);
        assert_eq!(lesson_price(0, 60), 0);
    }
}
