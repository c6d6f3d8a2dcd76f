//! The store contract every backend implements.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::record::{NewSighting, SearchFilter, SightingRecord, SightingUpdate};

/// Owns the sighting records and the id counter.
///
/// Methods take `&self`; implementations serialize writers internally so a
/// store can be shared behind an `Arc`.
pub trait SightingStore: Send + Sync {
    /// Validate, normalize and insert a new record. Ids start at 1 and are
    /// never reused.
    fn create(&self, sighting: &NewSighting) -> Result<SightingRecord>;

    /// All records in id order. An empty store is an error.
    fn list(&self) -> Result<Vec<SightingRecord>>;

    /// Records matching the filter keyed by id. No match is an error.
    fn search(&self, filter: &SearchFilter) -> Result<BTreeMap<u64, SightingRecord>>;

    fn get(&self, id: u64) -> Result<SightingRecord>;

    /// Apply the provided fields atomically and return the updated record.
    fn update(&self, id: u64, update: &SightingUpdate) -> Result<SightingRecord>;

    fn delete(&self, id: u64) -> Result<()>;

    fn count(&self) -> Result<usize>;
}

/// Behavior checks shared by every backend's tests.
#[cfg(test)]
pub(crate) mod conformance {
    use chrono::NaiveDate;

    use super::SightingStore;
    use crate::error::{EmptyKind, SightingError};
    use crate::record::{NewSighting, SearchFilter, SightingUpdate};

    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn fox() -> NewSighting {
        NewSighting::new("Fox", "Forest", "2024-01-01", "09:00")
    }

    pub fn ids_increase(store: &dyn SightingStore) {
        let a = store.create(&fox()).unwrap();
        let b = store
            .create(&NewSighting::new("Owl", "Forest", "2024-01-01", "09:00"))
            .unwrap();
        let c = store
            .create(&NewSighting::new("Fox", "Forest", "2024-01-02", "09:00"))
            .unwrap();
        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
    }

    pub fn duplicate_rejected(store: &dyn SightingStore) {
        store.create(&fox()).unwrap();
        let err = store
            .create(&NewSighting::new("  FOX ", "forest", "2024-01-01", "09:00"))
            .unwrap_err();
        assert!(matches!(err, SightingError::Duplicate));
        assert_eq!(store.count().unwrap(), 1);
    }

    pub fn create_normalizes(store: &dyn SightingStore) {
        let record = store
            .create(&NewSighting::new("  red   fox", "black forest ", "2024-01-01", "09:00"))
            .unwrap();
        assert_eq!(record.species, "Red Fox");
        assert_eq!(record.location, "Black Forest");
    }

    pub fn future_date_rejected(store: &dyn SightingStore) {
        let err = store
            .create(&NewSighting::new("Fox", "Forest", "2024-06-02", "09:00"))
            .unwrap_err();
        assert!(matches!(err, SightingError::Validation { field: "date", .. }));
        store
            .create(&NewSighting::new("Fox", "Forest", "2024-06-01", "09:00"))
            .unwrap();
    }

    pub fn malformed_time_rejected(store: &dyn SightingStore) {
        let err = store
            .create(&NewSighting::new("Fox", "Forest", "2024-01-01", "25:61"))
            .unwrap_err();
        assert!(matches!(err, SightingError::Validation { field: "time", .. }));
        assert_eq!(store.count().unwrap(), 0);
    }

    pub fn list_empty_then_one(store: &dyn SightingStore) {
        assert!(matches!(
            store.list().unwrap_err(),
            SightingError::Empty(EmptyKind::NoRecords)
        ));
        store.create(&fox()).unwrap();
        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 1);
    }

    pub fn search_filters(store: &dyn SightingStore) {
        store.create(&fox()).unwrap();
        store
            .create(&NewSighting::new("Owl", "Marsh", "2024-01-01", "21:30"))
            .unwrap();

        let found = store.search(&SearchFilter::new(Some("fox"), None)).unwrap();
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![1]);

        let found = store.search(&SearchFilter::default()).unwrap();
        assert_eq!(found.len(), 2);

        let err = store
            .search(&SearchFilter::new(None, Some("xyz")))
            .unwrap_err();
        assert!(matches!(err, SightingError::Empty(EmptyKind::NoMatches)));
    }

    pub fn update_missing_id(store: &dyn SightingStore) {
        store.create(&fox()).unwrap();
        let update = SightingUpdate {
            location: Some("Meadow".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.update(42, &update).unwrap_err(),
            SightingError::NotFound(42)
        ));
        assert_eq!(store.get(1).unwrap().location, "Forest");
    }

    pub fn update_location_only(store: &dyn SightingStore) {
        let before = store.create(&fox()).unwrap();
        let update = SightingUpdate {
            location: Some("open meadow".to_string()),
            ..Default::default()
        };
        let after = store.update(before.id, &update).unwrap();
        assert_eq!(after.location, "Open Meadow");
        assert_eq!(after.species, before.species);
        assert_eq!(after.date, before.date);
        assert_eq!(after.time, before.time);
    }

    pub fn update_is_atomic(store: &dyn SightingStore) {
        let before = store.create(&fox()).unwrap();
        let update = SightingUpdate {
            location: Some("Meadow".to_string()),
            date: Some("2030-01-01".to_string()),
            ..Default::default()
        };
        let err = store.update(before.id, &update).unwrap_err();
        assert!(matches!(err, SightingError::Validation { field: "date", .. }));
        assert_eq!(store.get(before.id).unwrap(), before);
    }

    pub fn update_round_trip(store: &dyn SightingStore) {
        let before = store.create(&fox()).unwrap();
        let update = SightingUpdate {
            species: Some("badger".to_string()),
            location: Some("hedgerow".to_string()),
            date: Some("2024-05-31".to_string()),
            time: Some("23:59".to_string()),
        };
        store.update(before.id, &update).unwrap();
        let after = store.get(before.id).unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.species, "Badger");
        assert_eq!(after.location, "Hedgerow");
        assert_eq!(after.date.to_string(), "2024-05-31");
        assert_eq!(after.time.format("%H:%M").to_string(), "23:59");
    }

    pub fn delete_twice(store: &dyn SightingStore) {
        let record = store.create(&fox()).unwrap();
        store.delete(record.id).unwrap();
        assert!(matches!(
            store.delete(record.id).unwrap_err(),
            SightingError::NotFound(_)
        ));
    }

    pub fn ids_not_reused(store: &dyn SightingStore) {
        let first = store.create(&fox()).unwrap();
        store.delete(first.id).unwrap();
        let second = store.create(&fox()).unwrap();
        assert_eq!(second.id, first.id + 1);
    }

    /// Eight threads race to create the same sighting; exactly one wins.
    pub fn concurrent_duplicate_creates(store: &dyn SightingStore) {
        let created = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| store.create(&fox()).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });
        assert_eq!(created, 1);
        assert_eq!(store.count().unwrap(), 1);
    }
}

/// Generate one `#[test]` per conformance check, each on a fresh store built
/// by `$make`.
#[cfg(test)]
macro_rules! conformance_tests {
    (@each $make:expr; $($check:ident),* $(,)?) => {
        $(
            #[test]
            fn $check() {
                let store = $make;
                crate::store::conformance::$check(&store);
            }
        )*
    };
    ($make:expr) => {
        conformance_tests!(@each $make;
            ids_increase,
            duplicate_rejected,
            create_normalizes,
            future_date_rejected,
            malformed_time_rejected,
            list_empty_then_one,
            search_filters,
            update_missing_id,
            update_location_only,
            update_is_atomic,
            update_round_trip,
            delete_twice,
            ids_not_reused,
            concurrent_duplicate_creates,
        );
    };
}

#[cfg(test)]
pub(crate) use conformance_tests;
