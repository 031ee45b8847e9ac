//! Value normalization and safe casts
//!
//! Raw CSV text goes through two pure steps before it reaches the database:
//!
//! 1. [`normalize_field`]: trim, empty becomes absent, truncate to a maximum
//!    number of characters.
//! 2. [`apply_cast`]: convert to the column's [`CastRule`]. A value that does
//!    not parse becomes absent. Casting never fails a row.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::str::FromStr;
use uuid::Uuid;

use crate::spec::CastRule;

/// Longest text value kept, in characters
pub const DEFAULT_MAX_FIELD_LEN: usize = 2000;

/// Largest scientific-notation exponent a decimal cast will look at
const MAX_DECIMAL_EXPONENT: u64 = 1000;

/// Offset-bearing forms, converted to UTC
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// A typed, non-null column value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Decimal(BigDecimal),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
}

/// A normalized row, aligned with the insert plan's columns
pub type Row = Vec<Option<SqlValue>>;

/// Trim `raw`; absent when nothing is left, otherwise at most `max_len` characters
pub fn normalize_field(raw: &str, max_len: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.char_indices().nth(max_len) {
        Some((cut, _)) => Some(trimmed[..cut].to_string()),
        None => Some(trimmed.to_string()),
    }
}

/// Convert an already-normalized value under `rule`; absent if it does not fit
pub fn apply_cast(value: &str, rule: CastRule) -> Option<SqlValue> {
    match rule {
        CastRule::Int => value.parse().ok().map(SqlValue::Int),
        CastRule::BigInt => value.parse().ok().map(SqlValue::BigInt),
        CastRule::Float => value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(SqlValue::Float),
        CastRule::Decimal { precision, scale } => {
            parse_decimal(value, precision, scale).map(SqlValue::Decimal)
        },
        CastRule::Timestamp => parse_timestamp(value).map(SqlValue::Timestamp),
        CastRule::Uuid => Uuid::parse_str(value).ok().map(SqlValue::Uuid),
    }
}

/// Both steps: text when `cast` is `None`
pub fn normalize_value(raw: &str, cast: Option<CastRule>, max_len: usize) -> Option<SqlValue> {
    let value = normalize_field(raw, max_len)?;
    match cast {
        None => Some(SqlValue::Text(value)),
        Some(rule) => apply_cast(&value, rule),
    }
}

fn parse_decimal(value: &str, precision: u8, scale: u8) -> Option<BigDecimal> {
    if let Some((_, exponent)) = value.rsplit_once(|c| c == 'e' || c == 'E') {
        let exponent: i64 = exponent.parse().ok()?;
        if exponent.unsigned_abs() > MAX_DECIMAL_EXPONENT {
            return None;
        }
    }

    let parsed = BigDecimal::from_str(value).ok()?;

    // Reject before rounding so the rescale never builds an oversized integer
    let (_, fraction_digits) = parsed.as_bigint_and_exponent();
    let integer_digits = i64::try_from(parsed.digits()).ok()?.checked_sub(fraction_digits)?;
    if integer_digits > i64::from(precision) - i64::from(scale) {
        return None;
    }

    let rounded = parsed.with_scale_round(i64::from(scale), RoundingMode::HalfUp);
    (rounded.digits() <= u64::from(precision)).then_some(rounded)
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.naive_utc());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
