//! Date and wall-clock helpers shared by the engine.
//!
//! Every conversion between a local `(date, hour)` and an instant goes
//! through the zone handed in by the caller; nothing here reads a default
//! zone.

use chrono::{
    DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;

use crate::model::Span;

/// 0=Sunday .. 6=Saturday.
pub fn day_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Normalize a backend time string to `HH:MM`.
///
/// Accepts `H`, `HH`, `H:MM`, `HH:MM` and `HH:MM:SS`. `24:00` is allowed so
/// a window can close at midnight. Anything else yields `None`.
pub fn normalize_hhmm(raw: &str) -> Option<String> {
    let mut parts = raw.trim().split(':');
    let hour: u32 = parse_field(parts.next()?)?;
    let minute: u32 = match parts.next() {
        Some(m) if m.len() == 2 => parse_field(m)?,
        Some(_) => return None,
        None => 0,
    };
    if let Some(sec) = parts.next()
        && (sec.len() != 2 || parse_field::<u32>(sec)? > 59)
    {
        return None;
    }
    if parts.next().is_some() || minute > 59 || hour > 24 || (hour == 24 && minute != 0) {
        return None;
    }
    Some(format!("{hour:02}:{minute:02}"))
}

fn parse_field<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Hour component of a normalized time string. Minutes are dropped: slot
/// generation only models whole hours.
pub fn parse_hour(raw: &str) -> Option<u32> {
    let normalized = normalize_hhmm(raw)?;
    normalized[..2].parse().ok()
}

/// Parse a `[start, end)` pair of time strings into whole hours.
/// Inverted or empty windows count as unparseable.
pub fn parse_hour_window(start: &str, end: &str) -> Option<(u32, u32)> {
    let start = parse_hour(start)?;
    let end = parse_hour(end)?;
    (start < end).then_some((start, end))
}

/// Resolve a local wall-clock time in `tz`. Ambiguous times (DST fold) take
/// the earlier instant; nonexistent times (DST gap) yield `None`.
pub fn local_instant(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&local).earliest()
}

fn local_hour_start(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    if hour < 24 {
        date.and_hms_opt(hour, 0, 0)
    } else {
        date.checked_add_days(Days::new(1))?.and_hms_opt(hour - 24, 0, 0)
    }
}

/// Instants bounding `[date@hour:00, date@(hour+1):00)` in `tz`.
pub fn hour_bounds(tz: &Tz, date: NaiveDate, hour: u32) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let start = local_instant(tz, local_hour_start(date, hour)?)?;
    // Never longer than one hour, even when the next hour falls in a DST
    // gap or the earliest reading of a fold lands an hour later.
    let one_hour = start + TimeDelta::hours(1);
    let end = local_hour_start(date, hour + 1)
        .and_then(|local| local_instant(tz, local))
        .map_or(one_hour, |end| end.min(one_hour));
    (start < end).then_some((start, end))
}

/// The hour-long candidate interval as a millisecond span.
pub fn hour_span(tz: &Tz, date: NaiveDate, hour: u32) -> Option<Span> {
    let (start, end) = hour_bounds(tz, date, hour)?;
    Some(Span::new(start.timestamp_millis(), end.timestamp_millis()))
}

/// Same bounds with an explicit UTC offset, for wire payloads.
pub fn hour_bounds_fixed(
    tz: &Tz,
    date: NaiveDate,
    hour: u32,
) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let (start, end) = hour_bounds(tz, date, hour)?;
    Some((start.fixed_offset(), end.fixed_offset()))
}

/// Local calendar date and hour of an instant.
pub fn local_date_hour(tz: &Tz, at: DateTime<Utc>) -> (NaiveDate, u32) {
    let local = at.with_timezone(tz);
    (local.date_naive(), local.hour())
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    let first = first_of_month(date);
    first
        .checked_add_months(chrono::Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}
