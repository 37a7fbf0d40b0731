use chrono::{Datelike, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::limits::*;
use crate::model::*;

// ── Weekly windows → concrete spans ──────────────────────────────

/// Parse `"HH:MM"` into minutes since midnight. `"24:00"` is accepted as end of day.
pub fn parse_hhmm(s: &str) -> Option<u16> {
    let (h, m) = s.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    if m >= 60 {
        return None;
    }
    let total = h * 60 + m;
    (total <= MINUTES_PER_DAY).then_some(total)
}

pub fn format_hhmm(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Labels of slot starts from `start` (inclusive) to `end` (exclusive).
pub fn time_slots(start_minute: u16, end_minute: u16, step: u16) -> Vec<String> {
    if step == 0 {
        return Vec::new();
    }
    (start_minute..end_minute)
        .step_by(step as usize)
        .map(format_hhmm)
        .collect()
}

/// Resolve a local wall-clock minute on `date` to an instant.
/// Longest forward clock jump searched when a local time does not exist.
const MAX_GAP_MINUTES: i64 = 180;

/// Ambiguous times take the earlier instant. A time skipped by a forward jump
/// maps to the instant of the jump, so a window start moves forward and a
/// window end moves back to the nearest time that exists.
fn local_instant(tz: Tz, date: NaiveDate, minute: u16) -> Option<Ms> {
    let naive = date.and_time(NaiveTime::MIN) + chrono::Duration::minutes(minute as i64);
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return Some(dt.timestamp_millis());
    }
    (1..=MAX_GAP_MINUTES).find_map(|back| {
        let before = naive - chrono::Duration::minutes(back);
        tz.from_local_datetime(&before)
            .latest()
            .map(|dt| dt.timestamp_millis() + MINUTE_MS)
    })
}

/// Concrete spans for the recurring windows that fall on `date` in `tz`.
pub fn window_spans(windows: &[Availability], tz: Tz, date: NaiveDate) -> Vec<Span> {
    let weekday = date.weekday().num_days_from_sunday() as u8;
    let mut spans: Vec<Span> = windows
        .iter()
        .filter(|w| w.is_recurring && w.day_of_week == weekday && w.start_minute < w.end_minute)
        .filter_map(|w| {
            let start = local_instant(tz, date, w.start_minute)?;
            let end = local_instant(tz, date, w.end_minute)?;
            (start < end).then(|| Span::new(start, end))
        })
        .collect();
    spans.sort_by_key(|s| s.start);
    merge_overlapping(&spans)
}

/// Lesson starts on `date` where a `duration_minutes` lesson fits inside a
/// window, clears every active booking by the teacher's buffer, and begins
/// after `now`.
pub fn open_slots(
    rs: &TeacherSchedule,
    tz: Tz,
    date: NaiveDate,
    duration_minutes: u32,
    now: Ms,
) -> Vec<Span> {
    let duration = duration_minutes as Ms * MINUTE_MS;
    let step = SLOT_STEP_MINUTES as Ms * MINUTE_MS;
    if duration <= 0 {
        return Vec::new();
    }
    let windows = window_spans(&rs.availability, tz, date);
    let Some(day) = windows
        .first()
        .zip(windows.last())
        .map(|(first, last)| Span::new(first.start, last.end))
    else {
        return Vec::new();
    };

    let buffer = rs.profile.buffer_ms();
    let mut blocked: Vec<Span> = rs
        .active_overlapping(&day.padded(buffer))
        .map(|b| b.span.padded(buffer))
        .collect();
    blocked.sort_by_key(|s| s.start);
    let free = subtract_intervals(&windows, &merge_overlapping(&blocked));

    let mut slots = Vec::new();
    for window in &windows {
        let mut t = window.start;
        while t + duration <= window.end {
            let slot = Span::new(t, t + duration);
            if t > now && free.iter().any(|f| f.contains_span(&slot)) {
                slots.push(slot);
            }
            t += step;
        }
    }
    slots
}

// ── Interval arithmetic ──────────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Remove `to_remove` from `base`. Both inputs must be sorted and disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
