//! Duration parsing/formatting (spec §3 `ElevateRequest.Duration`, §8 invariant 3)
//!
//! Accepts both ISO-8601 (`PT1H30M`, `P1D`) and Go-style (`1h30m`, `90s`)
//! forms, rejects anything under a minute, and formats back out as
//! ISO-8601 (`PT…`) since that's the canonical on-the-wire form used by the
//! encoding envelope.

use std::time::Duration;

use crate::error::ThandError;

const MINUTE: u64 = 60;

/// Parse a duration string in either ISO-8601 or Go style.
pub fn parse_duration(input: &str) -> Result<Duration, ThandError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ThandError::validation("duration is empty"));
    }

    let seconds = if trimmed.starts_with('P') || trimmed.starts_with('p') {
        parse_iso8601(trimmed)?
    } else {
        parse_go_style(trimmed)?
    };

    if seconds < MINUTE {
        return Err(ThandError::validation(format!(
            "duration {input:?} is shorter than the 1 minute minimum"
        )));
    }

    Ok(Duration::from_secs(seconds))
}

/// Format a duration back out as ISO-8601 (`PT…`), the canonical output form.
pub fn format_duration_iso8601(d: Duration) -> String {
    let mut total = d.as_secs();
    let days = total / 86_400;
    total %= 86_400;
    let hours = total / 3_600;
    total %= 3_600;
    let minutes = total / 60;
    let secs = total % 60;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 {
            out.push_str(&format!("{secs}S"));
        }
    }
    if out == "P" {
        out.push_str("T0S");
    }
    out
}

/// Parses a subset of ISO-8601 durations: `P[nD]T[nH][nM][nS]` or `PnD`.
fn parse_iso8601(input: &str) -> Result<u64, ThandError> {
    let rest = &input[1..]; // strip leading P/p
    let (date_part, time_part) = match rest.find(['T', 't']) {
        Some(idx) => (&rest[..idx], &rest[idx + 1..]),
        None => (rest, ""),
    };

    let mut seconds: u64 = 0;
    seconds += take_component(date_part, 'D', 86_400)?;
    seconds += take_component(time_part, 'H', 3_600)?;
    seconds += take_component(time_part, 'M', 60)?;
    seconds += take_component(time_part, 'S', 1)?;

    if seconds == 0 && date_part.is_empty() && time_part.is_empty() {
        return Err(ThandError::validation(format!(
            "{input:?} is not a valid ISO-8601 duration"
        )));
    }

    Ok(seconds)
}

fn take_component(segment: &str, unit: char, multiplier: u64) -> Result<u64, ThandError> {
    let Some(idx) = segment.find(unit) else {
        return Ok(0);
    };
    let mut start = idx;
    while start > 0
        && (segment.as_bytes()[start - 1].is_ascii_digit() || segment.as_bytes()[start - 1] == b'.')
    {
        start -= 1;
    }
    let digits = &segment[start..idx];
    let value: u64 = digits
        .parse()
        .map_err(|_| ThandError::validation(format!("invalid ISO-8601 component {digits:?}{unit}")))?;
    Ok(value * multiplier)
}

/// Parses Go-style durations: sequences of `<number><unit>` with units
/// `h`, `m`, `s`, `ms` (ms is accepted but truncates to 0 seconds contribution
/// unless >= 1000ms, consistent with a seconds-resolution model).
fn parse_go_style(input: &str) -> Result<u64, ThandError> {
    let bytes = input.as_bytes();
    let mut i = 0;
    let mut total_ms: u64 = 0;
    let mut matched_any = false;

    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        if start == i {
            return Err(ThandError::validation(format!(
                "{input:?} is not a valid Go-style duration"
            )));
        }
        let number_str = &input[start..i];

        let unit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let unit = &input[unit_start..i];

        let number: f64 = number_str
            .parse()
            .map_err(|_| ThandError::validation(format!("invalid duration number {number_str:?}")))?;

        let unit_ms: f64 = match unit {
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            "ms" => 1.0,
            other => {
                return Err(ThandError::validation(format!(
                    "unknown duration unit {other:?}"
                )))
            }
        };

        total_ms += (number * unit_ms).round() as u64;
        matched_any = true;
    }

    if !matched_any {
        return Err(ThandError::validation(format!(
            "{input:?} is not a valid Go-style duration"
        )));
    }

    Ok(total_ms / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso8601_hours_minutes() {
        let d = parse_duration("PT1H30M").unwrap();
        assert_eq!(d.as_secs(), 90 * 60);
    }

    #[test]
    fn parses_iso8601_days() {
        let d = parse_duration("P1D").unwrap();
        assert_eq!(d.as_secs(), 86_400);
    }

    #[test]
    fn parses_go_style() {
        let d = parse_duration("1h30m").unwrap();
        assert_eq!(d.as_secs(), 90 * 60);
    }

    #[test]
    fn rejects_sub_minute() {
        assert!(parse_duration("30s").is_err());
        assert!(parse_duration("PT30S").is_err());
    }

    #[test]
    fn formats_round_trip_shape() {
        let d = parse_duration("PT1H").unwrap();
        assert_eq!(format_duration_iso8601(d), "PT1H");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("banana").is_err());
    }
}
