//! Field validation and normalization shared by every store backend.

use chrono::{Local, NaiveDate, NaiveTime};

use crate::error::{Result, SightingError};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Source of "today" for the future-date check.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always reports the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Trim, collapse internal whitespace and title-case a free-text field.
pub fn normalize_text(field: &'static str, raw: &str) -> Result<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(SightingError::validation(
            field,
            format!("{} must not be empty.", capitalize_first(field)),
        ));
    }
    Ok(title_case(&collapsed))
}

/// Upper-case every letter that follows a non-letter, lower-case the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_is_letter = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// True when `raw` has exactly the digit/separator layout of `pattern`,
/// where `D` stands for an ASCII digit.
fn matches_shape(raw: &str, pattern: &str) -> bool {
    raw.len() == pattern.len()
        && raw.bytes().zip(pattern.bytes()).all(|(c, p)| match p {
            b'D' => c.is_ascii_digit(),
            other => c == other,
        })
}

/// Parse a `YYYY-MM-DD` date and reject anything after `today`.
pub fn parse_date(raw: &str, today: NaiveDate) -> Result<NaiveDate> {
    if !matches_shape(raw, "DDDD-DD-DD") {
        return Err(SightingError::validation(
            "date",
            "Invalid date format. Expected YYYY-MM-DD.",
        ));
    }
    let date = NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
        SightingError::validation("date", "Invalid date format. Expected YYYY-MM-DD.")
    })?;
    if date > today {
        return Err(SightingError::validation(
            "date",
            "Date cannot be in the future.",
        ));
    }
    Ok(date)
}

/// Parse a 24-hour `HH:MM` time of day.
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    if !matches_shape(raw, "DD:DD") {
        return Err(SightingError::validation(
            "time",
            "Time must be in HH:MM format.",
        ));
    }
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|_| SightingError::validation("time", "Time must be in HH:MM format."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_normalize_collapses_and_titles() {
        assert_eq!(
            normalize_text("species", "  red   FOX ").unwrap(),
            "Red Fox"
        );
        assert_eq!(
            normalize_text("location", "black-forest\tedge").unwrap(),
            "Black-Forest Edge"
        );
    }

    #[test]
    fn test_title_case_after_apostrophe() {
        assert_eq!(title_case("o'neil's pond"), "O'Neil'S Pond");
    }

    #[test]
    fn test_empty_text_rejected() {
        match normalize_text("species", "   ") {
            Err(SightingError::Validation { field, reason }) => {
                assert_eq!(field, "species");
                assert_eq!(reason, "Species must not be empty.");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_date_today_is_accepted() {
        let today = day("2024-06-01");
        assert_eq!(parse_date("2024-06-01", today).unwrap(), today);
    }

    #[test]
    fn test_future_date_rejected() {
        let err = parse_date("2024-06-02", day("2024-06-01")).unwrap_err();
        assert_eq!(err.detail(), "Date cannot be in the future.");
    }

    #[test]
    fn test_date_shape_is_strict() {
        let today = day("2024-06-01");
        assert!(parse_date("2024-1-01", today).is_err());
        assert!(parse_date("2024/01/01", today).is_err());
        assert!(parse_date("2023-02-30", today).is_err());
        assert!(parse_date(" 2024-01-01", today).is_err());
        assert!(parse_date("2024-01-01\n", today).is_err());
    }

    #[test]
    fn test_time_validation() {
        assert_eq!(
            parse_time("09:05").unwrap(),
            NaiveTime::from_hms_opt(9, 5, 0).unwrap()
        );
        assert!(parse_time("25:61").is_err());
        assert!(parse_time("24:00").is_err());
        assert!(parse_time("9:05").is_err());
        assert!(parse_time("09:05:00").is_err());
        assert!(parse_time("09:05 ").is_err());
    }
}
