use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

pub const SECONDS_PER_DAY: i64 = 86_400;

const MONTHS_RU: [&str; 12] = [
    "янв", "фев", "мар", "апр", "мая", "июн", "июл", "авг", "сен", "окт", "ноя", "дек",
];

static FOLDER_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}\.\d{2}\.\d{4}").expect("static regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("expected HH:MM:SS, got {value:?}")]
    Format { value: String },

    #[error("{field} out of range in {value:?}")]
    OutOfRange { field: &'static str, value: String },
}

/// Parse `HH:MM:SS` into a count of seconds.
///
/// Hours are unbounded so the same parser serves durations longer than a day.
pub fn parse_hms(value: &str) -> Result<i64, TimeParseError> {
    let format_err = || TimeParseError::Format {
        value: value.to_string(),
    };

    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(format_err());
    }

    let mut fields = [0i64; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(format_err());
        }
        *slot = part.parse().map_err(|_| format_err())?;
    }

    let [hours, minutes, seconds] = fields;
    if minutes >= 60 {
        return Err(TimeParseError::OutOfRange {
            field: "minutes",
            value: value.to_string(),
        });
    }
    if seconds >= 60 {
        return Err(TimeParseError::OutOfRange {
            field: "seconds",
            value: value.to_string(),
        });
    }

    hours
        .checked_mul(3600)
        .and_then(|s| s.checked_add(minutes * 60 + seconds))
        .ok_or_else(|| TimeParseError::OutOfRange {
            field: "hours",
            value: value.to_string(),
        })
}

/// A calendar date plus seconds-of-day in `[0, 86400)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub date: NaiveDate,
    pub seconds: u32,
}

impl Timestamp {
    /// `HH:MM:SS`
    pub fn clock(&self) -> String {
        let s = self.seconds;
        format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
    }

    /// Date label as printed on the picture, e.g. `07 мар. 2024 г.`
    pub fn stamp_date(&self) -> String {
        let month = MONTHS_RU[self.date.month0() as usize];
        format!("{:02} {}. {} г.", self.date.day(), month, self.date.year())
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.stamp_date(), self.clock())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.clock())
    }
}

/// Roll whole days out of `seconds` into `base_date`.
///
/// Negative values roll back into earlier days, so the result always lies in
/// `[0, 86400)`. Normalizing an already-normalized value is a no-op.
pub fn normalize(seconds: i64, base_date: NaiveDate) -> Timestamp {
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    let rest = seconds.rem_euclid(SECONDS_PER_DAY);

    let shifted = if days >= 0 {
        base_date.checked_add_days(Days::new(days as u64))
    } else {
        base_date.checked_sub_days(Days::new(days.unsigned_abs()))
    };

    Timestamp {
        // only unrepresentable for dates beyond chrono's range
        date: shifted.unwrap_or(base_date),
        seconds: rest as u32,
    }
}

/// Extract the first `DD.MM.YYYY` date from a folder name.
pub fn folder_date(name: &str) -> Option<NaiveDate> {
    let found = FOLDER_DATE.find(name)?;
    NaiveDate::parse_from_str(found.as_str(), "%d.%m.%Y").ok()
}

/// Date of a folder whose name starts with `DD.MM.YYYY`.
pub fn leading_folder_date(name: &str) -> Option<NaiveDate> {
    let found = FOLDER_DATE.find(name)?;
    if found.start() != 0 {
        return None;
    }
    NaiveDate::parse_from_str(found.as_str(), "%d.%m.%Y").ok()
}
