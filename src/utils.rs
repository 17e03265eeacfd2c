use crate::error::{Result, TrendError};
use chrono::{Datelike, Month, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar month encoded as `year * 100 + month`.
///
/// Integer ordering of keys equals chronological ordering, so every range
/// comparison in the crate goes through `MonthKey` rather than strings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct MonthKey(i32);

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        MonthKey(year * 100 + month as i32)
    }

    pub fn from_raw(raw: i32) -> Self {
        MonthKey(raw)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.div_euclid(100)
    }

    pub fn month(self) -> u32 {
        self.0.rem_euclid(100) as u32
    }

    pub fn is_valid(self) -> bool {
        (1..=12).contains(&self.month())
    }

    /// Moves the key by `delta` calendar months, rolling over year boundaries.
    ///
    /// Returns `None` when the result leaves the supported year range.
    pub fn checked_shift(self, delta: i32) -> Option<Self> {
        let total = i64::from(self.year()) * 12 + i64::from(self.month()) - 1 + i64::from(delta);
        let year = i32::try_from(total.div_euclid(12))
            .ok()
            .filter(|&y| is_supported_year(y))?;
        Some(MonthKey::new(year, (total.rem_euclid(12) + 1) as u32))
    }

    /// Like [`MonthKey::checked_shift`], saturating at the supported year range.
    pub fn shift(self, delta: i32) -> Self {
        self.checked_shift(delta).unwrap_or_else(|| {
            if delta < 0 {
                MonthKey::new(NaiveDate::MIN.year(), 1)
            } else {
                MonthKey::new(NaiveDate::MAX.year(), 12)
            }
        })
    }

    pub fn label(self) -> String {
        month_label(self.year(), self.month())
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

/// Years representable as a `MonthKey`, the same range chrono dates cover.
pub fn is_supported_year(year: i32) -> bool {
    (NaiveDate::MIN.year()..=NaiveDate::MAX.year()).contains(&year)
}

pub fn to_key(year: i32, month: u32) -> MonthKey {
    MonthKey::new(year, month)
}

pub fn from_key(key: MonthKey) -> (i32, u32) {
    (key.year(), key.month())
}

pub fn clamp_key(key: MonthKey, min: MonthKey, max: MonthKey) -> MonthKey {
    if key < min {
        min
    } else if key > max {
        max
    } else {
        key
    }
}

/// Shifts a `YYYY-MM` month string by `delta` months (negative moves backwards).
pub fn shift_months(month: &str, delta: i32) -> Result<String> {
    let key = parse_month_string(month)?;
    key.checked_shift(delta)
        .map(format_month_string)
        .ok_or_else(|| TrendError::InvalidMonth(format!("{} shifted by {} months", month, delta)))
}

/// Parses a `YYYY-MM` string into a key.
pub fn parse_month_string(month: &str) -> Result<MonthKey> {
    let first_of_month = format!("{}-01", month.trim());
    let date = NaiveDate::parse_from_str(&first_of_month, "%Y-%m-%d")
        .map_err(|_| TrendError::InvalidMonth(month.to_string()))?;
    Ok(MonthKey::new(date.year(), date.month()))
}

pub fn format_month_string(key: MonthKey) -> String {
    key.to_string()
}

/// Full English month name for 1..=12.
pub fn month_name(month: u32) -> Option<&'static str> {
    let month = u8::try_from(month).ok()?;
    Month::try_from(month).ok().map(|m| m.name())
}

/// Chart label for a month, e.g. `Jan 2024`.
pub fn month_label(year: i32, month: u32) -> String {
    match month_name(month) {
        Some(name) => format!("{} {}", &name[..3], year),
        None => format!("{:04}-{:02}", year, month),
    }
}

/// Reads a period cell as a month number.
///
/// Accepts plain numbers `1`..`12` (leading zeros allowed) or a case-insensitive
/// prefix of at least three letters of an English month name (`jan`, `Sept`,
/// `DECEMBER`). Anything else yields `None`.
pub fn parse_month_token(token: &str) -> Option<u32> {
    let token = token.trim().trim_end_matches('.');
    if token.is_empty() {
        return None;
    }

    if token.chars().all(|c| c.is_ascii_digit()) {
        return token.parse::<u32>().ok().filter(|m| (1..=12).contains(m));
    }

    if token.len() < 3 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let lower = token.to_ascii_lowercase();
    (1..=12u32).find(|&m| {
        month_name(m)
            .map(|name| name.to_ascii_lowercase().starts_with(&lower))
            .unwrap_or(false)
    })
}
