//! Volatile store: a map from id to record plus the id counter.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use log::{debug, info, warn};

use crate::error::{EmptyKind, Result, SightingError};
use crate::record::{NewSighting, SearchFilter, SightingRecord, SightingUpdate};
use crate::store::SightingStore;
use crate::validate::{Clock, SystemClock};

struct Inner {
    records: BTreeMap<u64, SightingRecord>,
    next_id: u64,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: BTreeMap::new(),
                next_id: 1,
            }),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SightingStore for MemoryStore {
    fn create(&self, sighting: &NewSighting) -> Result<SightingRecord> {
        let valid = sighting.validate(self.clock.today())?;

        // The write guard spans the duplicate scan and the insert.
        let mut inner = self.inner.write()?;
        if inner
            .records
            .values()
            .any(|r| valid.same_identity(&r.species, &r.location, r.date, r.time))
        {
            warn!("Rejected duplicate sighting: {} at {}", valid.species, valid.location);
            return Err(SightingError::Duplicate);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let record = valid.into_record(id);
        inner.records.insert(id, record.clone());
        info!("Recorded sighting {}: {}", id, record);
        Ok(record)
    }

    fn list(&self) -> Result<Vec<SightingRecord>> {
        let inner = self.inner.read()?;
        if inner.records.is_empty() {
            return Err(SightingError::Empty(EmptyKind::NoRecords));
        }
        Ok(inner.records.values().cloned().collect())
    }

    fn search(&self, filter: &SearchFilter) -> Result<BTreeMap<u64, SightingRecord>> {
        let inner = self.inner.read()?;
        let found: BTreeMap<u64, SightingRecord> = inner
            .records
            .iter()
            .filter(|(_, r)| filter.matches(r))
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        debug!("Search {:?} matched {} sightings", filter, found.len());
        if found.is_empty() {
            return Err(SightingError::Empty(EmptyKind::NoMatches));
        }
        Ok(found)
    }

    fn get(&self, id: u64) -> Result<SightingRecord> {
        self.inner
            .read()?
            .records
            .get(&id)
            .cloned()
            .ok_or(SightingError::NotFound(id))
    }

    fn update(&self, id: u64, update: &SightingUpdate) -> Result<SightingRecord> {
        let mut inner = self.inner.write()?;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(SightingError::NotFound(id))?;
        let valid = update.validate(self.clock.today())?;
        valid.apply(record);
        info!("Updated sighting {}: {}", id, record);
        Ok(record.clone())
    }

    fn delete(&self, id: u64) -> Result<()> {
        let mut inner = self.inner.write()?;
        match inner.records.remove(&id) {
            Some(record) => {
                info!("Deleted sighting {}: {}", id, record);
                Ok(())
            }
            None => Err(SightingError::NotFound(id)),
        }
    }

    fn count(&self) -> Result<usize> {
        Ok(self.inner.read()?.records.len())
    }
}
