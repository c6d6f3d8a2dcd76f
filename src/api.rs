//! Request/response contract of the sighting API, independent of any HTTP
//! server. Each operation turns a store result into a status code and a JSON
//! body; a transport only has to copy them onto the wire.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, warn};
use serde_json::{Value, json};

use crate::error::SightingError;
use crate::record::{NewSighting, SearchFilter, SightingRecord, SightingUpdate};
use crate::store::SightingStore;

pub const WELCOME: &str = "Welcome to the Sighting Tracker API! Use /docs for more information.";
pub const DELETED: &str = "Sighting deleted successfully";

/// Shape of list and search bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFormat {
    /// id -> `"<species> at <location> on <date> at <time>"`
    #[default]
    Legacy,
    /// id -> full record object
    Records,
}

impl ListFormat {
    /// `format=records` selects records; anything else keeps the legacy shape.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("records") => ListFormat::Records,
            _ => ListFormat::Legacy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<SightingError> for ApiResponse {
    fn from(err: SightingError) -> Self {
        let status = err.status_code();
        if status >= 500 {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected ({}): {}", status, err);
        }
        let mut body = json!({ "detail": err.detail(), "category": err.category() });
        if let SightingError::Validation { field, .. } = &err {
            body["field"] = json!(field);
        }
        Self { status, body }
    }
}

pub struct SightingApi<S: SightingStore + ?Sized> {
    store: Arc<S>,
}

impl<S: SightingStore + ?Sized> SightingApi<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn root(&self) -> ApiResponse {
        ApiResponse::ok(json!({ "message": WELCOME }))
    }

    /// `POST /sightings/` with a JSON body.
    pub fn create(&self, body: &str) -> ApiResponse {
        respond(
            parse_body::<NewSighting>(body)
                .and_then(|sighting| self.store.create(&sighting))
                .and_then(record_body),
        )
    }

    /// `GET /sightings/`
    pub fn list(&self, format: ListFormat) -> ApiResponse {
        respond(self.store.list().and_then(|records| {
            let keyed = records.into_iter().map(|r| (r.id, r)).collect();
            list_body(keyed, format)
        }))
    }

    /// `GET /sightings/search/`
    pub fn search(&self, filter: &SearchFilter, format: ListFormat) -> ApiResponse {
        respond(
            self.store
                .search(filter)
                .and_then(|found| list_body(found, format)),
        )
    }

    /// `PUT /sightings/{id}` with a JSON body holding any subset of fields.
    pub fn update(&self, id: u64, body: &str) -> ApiResponse {
        respond(
            parse_body::<SightingUpdate>(body)
                .and_then(|update| self.store.update(id, &update))
                .and_then(record_body),
        )
    }

    /// `DELETE /sightings/{id}`
    pub fn delete(&self, id: u64) -> ApiResponse {
        respond(self.store.delete(id).map(|()| json!({ "detail": DELETED })))
    }
}

fn respond(result: crate::error::Result<Value>) -> ApiResponse {
    match result {
        Ok(body) => ApiResponse::ok(body),
        Err(err) => err.into(),
    }
}

/// Unreadable request bodies are the caller's fault, not ours.
fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> crate::error::Result<T> {
    serde_json::from_str(body).map_err(|e| SightingError::validation("body", e.to_string()))
}

fn record_body(record: SightingRecord) -> crate::error::Result<Value> {
    Ok(serde_json::to_value(record)?)
}

fn list_body(records: BTreeMap<u64, SightingRecord>, format: ListFormat) -> crate::error::Result<Value> {
    let body = match format {
        ListFormat::Legacy => {
            let summaries: BTreeMap<u64, String> =
                records.into_iter().map(|(id, r)| (id, r.summary())).collect();
            serde_json::to_value(summaries)?
        }
        ListFormat::Records => serde_json::to_value(records)?,
    };
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::conformance::today;
    use crate::validate::FixedClock;

    fn api() -> SightingApi<MemoryStore> {
        let store = MemoryStore::new().with_clock(Arc::new(FixedClock(today())));
        SightingApi::new(Arc::new(store))
    }

    const FOX: &str = r#"{"species": "fox", "location": "forest", "date": "2024-01-01", "time": "09:00"}"#;

    #[test]
    fn test_root_message() {
        assert_eq!(api().root().body["message"], WELCOME);
    }

    #[test]
    fn test_create_returns_record() {
        let resp = api().create(FOX);
        assert_eq!(resp.status, 200);
        assert_eq!(
            resp.body,
            json!({"id": 1, "species": "Fox", "location": "Forest", "date": "2024-01-01", "time": "09:00"})
        );
    }

    #[test]
    fn test_duplicate_is_400() {
        let api = api();
        api.create(FOX);
        let resp = api.create(FOX);
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["category"], "duplicate");
        assert!(resp.body.get("field").is_none());
        assert_eq!(resp.body["detail"], "Sighting already exists with the same details.");
    }

    #[test]
    fn test_missing_field_is_422() {
        let resp = api().create(r#"{"species": "fox"}"#);
        assert_eq!(resp.status, 422);
        assert_eq!(resp.body["category"], "validation");
    }

    #[test]
    fn test_future_date_is_422() {
        let resp = api()
            .create(r#"{"species": "fox", "location": "forest", "date": "2099-01-01", "time": "09:00"}"#);
        assert_eq!(resp.status, 422);
        assert_eq!(resp.body["detail"], "Date cannot be in the future.");
        assert_eq!(resp.body["field"], "date");
    }

    #[test]
    fn test_list_formats() {
        let api = api();
        assert_eq!(api.list(ListFormat::Legacy).status, 404);
        assert_eq!(
            api.list(ListFormat::Legacy).body["detail"],
            "No sightings recorded"
        );

        api.create(FOX);
        let legacy = api.list(ListFormat::Legacy);
        assert_eq!(legacy.body, json!({"1": "Fox at Forest on 2024-01-01 at 09:00"}));

        let records = api.list(ListFormat::Records);
        assert_eq!(records.body["1"]["location"], "Forest");
    }

    #[test]
    fn test_search_no_match_is_404() {
        let api = api();
        api.create(FOX);
        let resp = api.search(&SearchFilter::new(None, Some("xyz")), ListFormat::Legacy);
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body["category"], "empty");
        assert_eq!(resp.body["detail"], "No sightings found for the given filters.");
    }

    #[test]
    fn test_update_and_delete() {
        let api = api();
        api.create(FOX);

        let resp = api.update(1, r#"{"time": "10:30"}"#);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["time"], "10:30");
        assert_eq!(resp.body["species"], "Fox");

        assert_eq!(api.update(9, r#"{"time": "10:30"}"#).status, 404);
        assert_eq!(api.delete(1).body["detail"], DELETED);

        let again = api.delete(1);
        assert_eq!(again.status, 404);
        assert_eq!(again.body["detail"], "Sighting not found");
    }

    #[test]
    fn test_format_query() {
        assert_eq!(ListFormat::from_query(Some("records")), ListFormat::Records);
        assert_eq!(ListFormat::from_query(None), ListFormat::Legacy);
    }
}
