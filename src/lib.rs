//! Record keeping for wildlife sightings: a validated store with in-memory
//! and SQLite backends, a transport-independent API contract, an HTTP client
//! for remote deployments and CSV import/export.

pub mod api;
pub mod client;
pub mod error;
pub mod export;
pub mod memory;
pub mod record;
pub mod sqlite;
pub mod store;
pub mod validate;

pub use error::{EmptyKind, Result, SightingError};
pub use record::{NewSighting, SearchFilter, SightingRecord, SightingUpdate};
pub use store::SightingStore;
