//! Error types for the sighting store and its adapters.

use thiserror::Error;

/// Which list-style query came back empty. The two cases carry different
/// messages on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyKind {
    NoRecords,
    NoMatches,
}

impl std::fmt::Display for EmptyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmptyKind::NoRecords => f.write_str("No sightings recorded"),
            EmptyKind::NoMatches => f.write_str("No sightings found for the given filters."),
        }
    }
}

#[derive(Error, Debug)]
pub enum SightingError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Sighting already exists with the same details.")]
    Duplicate,

    #[error("Sighting not found")]
    NotFound(u64),

    #[error("{0}")]
    Empty(EmptyKind),

    #[error("Remote API returned {status}: {detail}")]
    Remote { status: u16, detail: String },

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Malformed stored value: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SightingError>;

impl SightingError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Stable category string reported alongside every error response.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Duplicate => "duplicate",
            Self::NotFound(_) => "not_found",
            Self::Empty(_) => "empty",
            _ => "internal",
        }
    }

    /// Response status code for the error category.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 422,
            Self::Duplicate => 400,
            Self::NotFound(_) | Self::Empty(_) => 404,
            Self::Remote { status, .. } => *status,
            _ => 500,
        }
    }

    /// Human-readable detail line. Validation errors report only the reason,
    /// which already names what was wrong.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for SightingError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}
