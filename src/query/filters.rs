//! Value parsers for the `size:` and date property filters.
//!
//! Both produce a `(lower, upper)` bound pair ready for a range scan of the
//! matching sorted index. Errors carry a reason only; the parser attaches
//! the position.

use chrono::{DateTime, NaiveDate};
use std::ops::Bound;

pub type Span<T> = (Bound<T>, Bound<T>);

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;
const TB: u64 = 1024 * GB;

const DAY: i64 = 86_400;

/// Named size classes
const SIZE_CLASSES: &[(&str, Span<u64>)] = &[
    ("empty", (Bound::Included(0), Bound::Included(0))),
    ("tiny", (Bound::Excluded(0), Bound::Included(10 * KB))),
    ("small", (Bound::Excluded(10 * KB), Bound::Included(100 * KB))),
    ("medium", (Bound::Excluded(100 * KB), Bound::Included(MB))),
    ("large", (Bound::Excluded(MB), Bound::Included(16 * MB))),
    ("huge", (Bound::Excluded(16 * MB), Bound::Included(128 * MB))),
    ("gigantic", (Bound::Excluded(128 * MB), Bound::Unbounded)),
];

/// Parse `size:` values: `N`, `=N`, `>N`, `>=N`, `<N`, `<=N`, `A..B` or a
/// size class. Amounts take an optional `b`/`kb`/`mb`/`gb`/`tb` unit.
pub fn parse_size(value: &str) -> Result<Span<u64>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("missing size value".into());
    }

    let lower = value.to_ascii_lowercase();
    if let Some((_, span)) = SIZE_CLASSES.iter().find(|(name, _)| *name == lower) {
        return Ok(*span);
    }

    if let Some((a, b)) = value.split_once("..") {
        let (lo, hi) = (parse_amount(a)?, parse_amount(b)?);
        if lo > hi {
            return Err(format!("empty size range '{value}'"));
        }
        return Ok((Bound::Included(lo), Bound::Included(hi)));
    }

    let (op, rest) = split_comparison(value);
    let n = parse_amount(rest)?;
    Ok(match op {
        Comparison::Eq => (Bound::Included(n), Bound::Included(n)),
        Comparison::Gt => (Bound::Excluded(n), Bound::Unbounded),
        Comparison::Ge => (Bound::Included(n), Bound::Unbounded),
        Comparison::Lt => (Bound::Unbounded, Bound::Excluded(n)),
        Comparison::Le => (Bound::Unbounded, Bound::Included(n)),
    })
}

fn parse_amount(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() {
        return Err(format!("invalid size '{s}'"));
    }

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => KB,
        "m" | "mb" => MB,
        "g" | "gb" => GB,
        "t" | "tb" => TB,
        other => return Err(format!("unknown size unit '{other}'")),
    };

    if number.contains('.') {
        let n: f64 = number.parse().map_err(|_| format!("invalid size '{s}'"))?;
        return Ok((n * multiplier as f64).round() as u64);
    }
    let n: u64 = number.parse().map_err(|_| format!("invalid size '{s}'"))?;
    n.checked_mul(multiplier)
        .ok_or_else(|| format!("size '{s}' is too large"))
}

/// Parse date values relative to `now` (Unix seconds, UTC): `YYYY-MM-DD`,
/// `today`, `yesterday` or raw Unix seconds, optionally with a comparison
/// prefix, or a `A..B` range. Days cover midnight to midnight UTC.
pub fn parse_date(value: &str, now: i64) -> Result<Span<i64>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("missing date value".into());
    }

    if let Some((a, b)) = value.split_once("..") {
        let (lo, _) = parse_moment(a, now)?;
        let (_, hi) = parse_moment(b, now)?;
        if lo >= hi {
            return Err(format!("empty date range '{value}'"));
        }
        return Ok((Bound::Included(lo), Bound::Excluded(hi)));
    }

    let (op, rest) = split_comparison(value);
    let (start, end) = parse_moment(rest, now)?;
    Ok(match op {
        Comparison::Eq => (Bound::Included(start), Bound::Excluded(end)),
        Comparison::Gt => (Bound::Included(end), Bound::Unbounded),
        Comparison::Ge => (Bound::Included(start), Bound::Unbounded),
        Comparison::Lt => (Bound::Unbounded, Bound::Excluded(start)),
        Comparison::Le => (Bound::Unbounded, Bound::Excluded(end)),
    })
}

/// Half-open `[start, end)` interval a date word denotes
fn parse_moment(s: &str, now: i64) -> Result<(i64, i64), String> {
    let s = s.trim();
    let today = day_start(now).ok_or_else(|| "clock out of range".to_string())?;
    match s.to_ascii_lowercase().as_str() {
        "today" => return Ok((today, today + DAY)),
        "yesterday" => return Ok((today - DAY, today)),
        _ => {}
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let start = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| format!("invalid date '{s}'"))?;
        return Ok((start, start + DAY));
    }

    match s.parse::<i64>() {
        Ok(secs) => Ok((secs, secs.saturating_add(1))),
        Err(_) => Err(format!("invalid date '{s}'")),
    }
}

fn day_start(now: i64) -> Option<i64> {
    let date = DateTime::from_timestamp(now, 0)?.date_naive();
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

fn split_comparison(value: &str) -> (Comparison, &str) {
    for (prefix, op) in [
        (">=", Comparison::Ge),
        ("<=", Comparison::Le),
        (">", Comparison::Gt),
        ("<", Comparison::Lt),
        ("=", Comparison::Eq),
    ] {
        if let Some(rest) = value.strip_prefix(prefix) {
            return (op, rest);
        }
    }
    (Comparison::Eq, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Bound::{Excluded, Included, Unbounded};

    // 2024-03-15 12:00:00 UTC
    const NOW: i64 = 1_710_504_000;
    const MARCH_15: i64 = 1_710_460_800;

    #[test]
    fn test_size_units() {
        assert_eq!(parse_size("10").unwrap(), (Included(10), Included(10)));
        assert_eq!(parse_size(">1kb").unwrap(), (Excluded(1024), Unbounded));
        assert_eq!(parse_size("<=2MB").unwrap(), (Unbounded, Included(2 * MB)));
        assert_eq!(parse_size("1.5k").unwrap(), (Included(1536), Included(1536)));
    }

    #[test]
    fn test_size_range_and_classes() {
        assert_eq!(parse_size("1kb..2kb").unwrap(), (Included(1024), Included(2048)));
        assert_eq!(parse_size("empty").unwrap(), (Included(0), Included(0)));
        assert_eq!(parse_size("Gigantic").unwrap(), (Excluded(128 * MB), Unbounded));
    }

    #[test]
    fn test_size_errors() {
        assert!(parse_size("").is_err());
        assert!(parse_size(">").is_err());
        assert!(parse_size("10xb").is_err());
        assert!(parse_size("5..1").is_err());
    }

    #[test]
    fn test_date_day_forms() {
        assert_eq!(
            parse_date("2024-03-15", NOW).unwrap(),
            (Included(MARCH_15), Excluded(MARCH_15 + DAY))
        );
        assert_eq!(
            parse_date("today", NOW).unwrap(),
            (Included(MARCH_15), Excluded(MARCH_15 + DAY))
        );
        assert_eq!(
            parse_date("yesterday", NOW).unwrap(),
            (Included(MARCH_15 - DAY), Excluded(MARCH_15))
        );
    }

    #[test]
    fn test_date_comparisons() {
        assert_eq!(parse_date(">2024-03-15", NOW).unwrap(), (Included(MARCH_15 + DAY), Unbounded));
        assert_eq!(parse_date("<2024-03-15", NOW).unwrap(), (Unbounded, Excluded(MARCH_15)));
        assert_eq!(parse_date(">=1000", NOW).unwrap(), (Included(1000), Unbounded));
    }

    #[test]
    fn test_date_range_is_inclusive_of_both_days() {
        assert_eq!(
            parse_date("2024-03-14..2024-03-15", NOW).unwrap(),
            (Included(MARCH_15 - DAY), Excluded(MARCH_15 + DAY))
        );
    }

    #[test]
    fn test_date_errors() {
        assert!(parse_date("", NOW).is_err());
        assert!(parse_date("2024-13-01", NOW).is_err());
        assert!(parse_date("soon", NOW).is_err());
    }
}
