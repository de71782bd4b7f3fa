//! Permissive, locale-agnostic timestamp parsing for uploaded files.
//!
//! Values carrying no offset are taken as UTC.

use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    macros::format_description,
    Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("value is empty")]
    Empty,
    #[error("unrecognized date/time format")]
    Unrecognized,
}

pub fn parse_timestamp(input: &str) -> Result<OffsetDateTime, TimestampError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(TimestampError::Empty);
    }

    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(ts);
    }
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc2822) {
        return Ok(ts);
    }
    if let Some(ts) = parse_numeric(s) {
        return ts;
    }

    let (local, offset) = split_offset(s).ok_or(TimestampError::Unrecognized)?;
    let local = parse_local(local).ok_or(TimestampError::Unrecognized)?;
    Ok(local.assume_offset(offset))
}

/// Shortest digit run read as Unix epoch seconds.
const MIN_EPOCH_DIGITS: usize = 9;

/// All-digit values: `YYYY`, `YYYYMMDD`, or epoch seconds. `None` when `s` is
/// not purely numeric; any numeric value is decided here.
fn parse_numeric(s: &str) -> Option<Result<OffsetDateTime, TimestampError>> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let signed = digits.len() != s.len();

    let date = match (signed, digits.len()) {
        (false, 4) => s
            .parse::<i32>()
            .ok()
            .and_then(|year| Date::from_calendar_date(year, Month::January, 1).ok()),
        (false, 8) => Date::parse(s, format_description!("[year][month][day]")).ok(),
        (_, n) if n >= MIN_EPOCH_DIGITS => {
            let ts = s
                .parse::<i64>()
                .ok()
                .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
            return Some(ts.ok_or(TimestampError::Unrecognized));
        }
        _ => None,
    };

    Some(
        date.map(|d| PrimitiveDateTime::new(d, Time::MIDNIGHT).assume_utc())
            .ok_or(TimestampError::Unrecognized),
    )
}

/// Split a trailing `Z`, `UTC`, `GMT`, `+HH:MM`, `+HHMM` or `+HH` off the local part.
fn split_offset(s: &str) -> Option<(&str, UtcOffset)> {
    if let Some(local) = s.strip_suffix(['Z', 'z']) {
        return Some((local.trim_end(), UtcOffset::UTC));
    }
    if let Some((local, zone)) = s.rsplit_once(' ') {
        if zone.eq_ignore_ascii_case("UTC") || zone.eq_ignore_ascii_case("GMT") {
            return Some((local.trim_end(), UtcOffset::UTC));
        }
    }

    // Only look for a sign after the date, whose own dashes are not offsets.
    let Some(time_start) = s.find(['T', 't', ' ']) else {
        return Some((s, UtcOffset::UTC));
    };
    let Some(sign_at) = s[time_start..].rfind(['+', '-']).map(|i| i + time_start) else {
        return Some((s, UtcOffset::UTC));
    };

    let offset_str = s[sign_at..].trim();
    let offset = UtcOffset::parse(
        offset_str,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .or_else(|_| {
        UtcOffset::parse(
            offset_str,
            format_description!("[offset_hour sign:mandatory][offset_minute]"),
        )
    })
    .or_else(|_| UtcOffset::parse(offset_str, format_description!("[offset_hour sign:mandatory]")))
    .ok()?;

    Some((s[..sign_at].trim_end(), offset))
}

// Unpadded month, day and hour fields also accept their zero-padded forms.
fn parse_local(s: &str) -> Option<PrimitiveDateTime> {
    let date_times = [
        format_description!(
            "[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute]:[second].[subsecond]"
        ),
        format_description!("[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute]:[second]"),
        format_description!("[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute]"),
        format_description!("[year]-[month padding:none]-[day padding:none]T[hour padding:none]"),
        format_description!(
            "[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second].[subsecond]"
        ),
        format_description!("[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second]"),
        format_description!("[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]"),
        format_description!("[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]:[second]"),
        format_description!("[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]"),
    ];
    // Lowercase `t` separators are accepted as well.
    let normalized = s.replacen('t', "T", 1);
    if let Some(ts) = date_times
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(&normalized, fmt).ok())
    {
        return Some(ts);
    }

    let dates = [
        format_description!("[year]-[month padding:none]-[day padding:none]"),
        format_description!("[year]/[month padding:none]/[day padding:none]"),
    ];
    dates
        .iter()
        .find_map(|fmt| Date::parse(s, fmt).ok())
        .map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
}
