use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SightingError};
use crate::validate::{self, normalize_text, parse_date, parse_time};

/// A stored observation. `date` and `time` serialize as `YYYY-MM-DD` and `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightingRecord {
    pub id: u64,
    pub species: String,
    pub location: String,
    #[serde(with = "date_format")]
    pub date: NaiveDate,
    #[serde(with = "time_format")]
    pub time: NaiveTime,
}

impl SightingRecord {
    /// One-line rendering: `<species> at <location> on <date> at <time>`.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SightingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} on {} at {}",
            self.species,
            self.location,
            self.date.format(validate::DATE_FORMAT),
            self.time.format(validate::TIME_FORMAT)
        )
    }
}

/// Raw create request, exactly as a caller submitted it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSighting {
    pub species: String,
    pub location: String,
    pub date: String,
    pub time: String,
}

impl NewSighting {
    pub fn new(species: &str, location: &str, date: &str, time: &str) -> Self {
        Self {
            species: species.to_string(),
            location: location.to_string(),
            date: date.to_string(),
            time: time.to_string(),
        }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<ValidSighting> {
        Ok(ValidSighting {
            species: normalize_text("species", &self.species)?,
            location: normalize_text("location", &self.location)?,
            date: parse_date(&self.date, today)?,
            time: parse_time(&self.time)?,
        })
    }
}

/// A create request whose fields passed validation and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSighting {
    pub species: String,
    pub location: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl ValidSighting {
    /// Duplicate rule: species and location compare case-insensitively,
    /// date and time exactly.
    pub fn same_identity(&self, species: &str, location: &str, date: NaiveDate, time: NaiveTime) -> bool {
        self.date == date
            && self.time == time
            && self.species.to_lowercase() == species.to_lowercase()
            && self.location.to_lowercase() == location.to_lowercase()
    }

    pub fn into_record(self, id: u64) -> SightingRecord {
        SightingRecord {
            id,
            species: self.species,
            location: self.location,
            date: self.date,
            time: self.time,
        }
    }
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SightingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl SightingUpdate {
    pub fn is_empty(&self) -> bool {
        self.species.is_none() && self.location.is_none() && self.date.is_none() && self.time.is_none()
    }

    /// Validates every provided field before anything is applied, so a bad
    /// field never leaves the record half-updated.
    pub fn validate(&self, today: NaiveDate) -> Result<ValidUpdate> {
        Ok(ValidUpdate {
            species: self
                .species
                .as_deref()
                .map(|s| normalize_text("species", s))
                .transpose()?,
            location: self
                .location
                .as_deref()
                .map(|s| normalize_text("location", s))
                .transpose()?,
            date: self
                .date
                .as_deref()
                .map(|s| parse_date(s, today))
                .transpose()?,
            time: self.time.as_deref().map(parse_time).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidUpdate {
    pub species: Option<String>,
    pub location: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl ValidUpdate {
    pub fn apply(self, record: &mut SightingRecord) {
        if let Some(species) = self.species {
            record.species = species;
        }
        if let Some(location) = self.location {
            record.location = location;
        }
        if let Some(date) = self.date {
            record.date = date;
        }
        if let Some(time) = self.time {
            record.time = time;
        }
    }
}

/// Case-insensitive substring filter over species and location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub species: Option<String>,
    pub location: Option<String>,
}

impl SearchFilter {
    pub fn new(species: Option<&str>, location: Option<&str>) -> Self {
        Self {
            species: species.map(str::to_string),
            location: location.map(str::to_string),
        }
    }

    pub fn matches(&self, record: &SightingRecord) -> bool {
        fn contains(needle: &Option<String>, haystack: &str) -> bool {
            match needle {
                Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
                None => true,
            }
        }
        contains(&self.species, &record.species) && contains(&self.location, &record.location)
    }
}

/// Fields recovered from a legacy one-line summary.
///
/// Kept only for talking to old deployments that answer list/search with
/// summary strings instead of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SightingSummary {
    pub species: String,
    pub location: String,
    pub date: String,
    pub time: String,
}

impl SightingSummary {
    /// Turn the summary into a record. Accepts `HH:MM` and the `HH:MM:SS`
    /// form some database-backed servers emit.
    pub fn into_record(self, id: u64) -> Result<SightingRecord> {
        let date = NaiveDate::parse_from_str(&self.date, validate::DATE_FORMAT)
            .map_err(|_| SightingError::Corrupt(format!("summary date {:?}", self.date)))?;
        let time = NaiveTime::parse_from_str(&self.time, validate::TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(&self.time, "%H:%M:%S"))
            .map_err(|_| SightingError::Corrupt(format!("summary time {:?}", self.time)))?;
        Ok(SightingRecord {
            id,
            species: self.species,
            location: self.location,
            date,
            time,
        })
    }
}

impl FromStr for SightingSummary {
    type Err = SightingError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || SightingError::Corrupt(format!("summary {:?}", s));
        let (head, tail) = s.split_once(" on ").ok_or_else(malformed)?;
        // Species may itself contain " at ", so the location split is taken
        // from the right.
        let (species, location) = head.rsplit_once(" at ").ok_or_else(malformed)?;
        let (date, time) = tail.split_once(" at ").ok_or_else(malformed)?;
        Ok(Self {
            species: species.trim().to_string(),
            location: location.trim().to_string(),
            date: date.trim().to_string(),
            time: time.trim().to_string(),
        })
    }
}

mod date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::validate::DATE_FORMAT;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::validate::TIME_FORMAT;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fox() -> SightingRecord {
        SightingRecord {
            id: 1,
            species: "Fox".to_string(),
            location: "Forest".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_summary_layout() {
        assert_eq!(fox().summary(), "Fox at Forest on 2024-01-01 at 09:00");
    }

    #[test]
    fn test_legacy_summary_with_at_in_species() {
        let summary: SightingSummary = "Cat At Home at Kitchen on 2024-01-01 at 09:00:00"
            .parse()
            .unwrap();
        assert_eq!(summary.species, "Cat At Home");
        assert_eq!(summary.location, "Kitchen");
        assert_eq!(summary.date, "2024-01-01");
        assert_eq!(summary.time, "09:00:00");

        let record = summary.into_record(7).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }

    #[test]
    fn test_legacy_summary_rejects_garbage() {
        assert!("just a fox".parse::<SightingSummary>().is_err());
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(fox()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "species": "Fox",
                "location": "Forest",
                "date": "2024-01-01",
                "time": "09:00"
            })
        );
        let back: SightingRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, fox());
    }

    #[test]
    fn test_search_filter_is_case_insensitive_substring() {
        let record = fox();
        assert!(SearchFilter::new(Some("fo"), None).matches(&record));
        assert!(SearchFilter::new(Some("FOX"), Some("rest")).matches(&record));
        assert!(!SearchFilter::new(None, Some("xyz")).matches(&record));
        assert!(SearchFilter::default().matches(&record));
    }

    #[test]
    fn test_update_validates_all_fields_before_applying() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let update = SightingUpdate {
            location: Some("meadow".to_string()),
            time: Some("99:99".to_string()),
            ..Default::default()
        };
        assert!(update.validate(today).is_err());

        let update = SightingUpdate {
            location: Some("  open   meadow ".to_string()),
            ..Default::default()
        };
        let mut record = fox();
        update.validate(today).unwrap().apply(&mut record);
        assert_eq!(record.location, "Open Meadow");
        assert_eq!(record.species, "Fox");
        assert_eq!(record.date, fox().date);
        assert_eq!(record.time, fox().time);
    }

    #[test]
    fn test_identity_ignores_case_of_text_fields() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let valid = NewSighting::new("fox", "FOREST", "2024-01-01", "09:00")
            .validate(today)
            .unwrap();
        let record = fox();
        assert!(valid.same_identity(&record.species, &record.location, record.date, record.time));
        assert!(!valid.same_identity(
            &record.species,
            &record.location,
            record.date,
            NaiveTime::from_hms_opt(9, 1, 0).unwrap()
        ));
    }
}
