//! SQLite-backed store with a single `sightings` table.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime};
use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::error::{EmptyKind, Result, SightingError};
use crate::record::{NewSighting, SearchFilter, SightingRecord, SightingUpdate};
use crate::store::SightingStore;
use crate::validate::{Clock, DATE_FORMAT, SystemClock, TIME_FORMAT};

// AUTOINCREMENT keeps deleted ids from being handed out again.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sightings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        species TEXT NOT NULL,
        location TEXT NOT NULL,
        date TEXT NOT NULL,
        time TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sightings_species ON sightings(species);
";

const SELECT_COLUMNS: &str = "SELECT id, species, location, date, time FROM sightings";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

/// Row as stored, before the text columns are parsed back into chrono types.
struct RawRow {
    id: i64,
    species: String,
    location: String,
    date: String,
    time: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            species: row.get(1)?,
            location: row.get(2)?,
            date: row.get(3)?,
            time: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<SightingRecord> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|_| SightingError::Corrupt(format!("date {:?} in row {}", self.date, self.id)))?;
        let time = NaiveTime::parse_from_str(&self.time, TIME_FORMAT)
            .map_err(|_| SightingError::Corrupt(format!("time {:?} in row {}", self.time, self.id)))?;
        let id = u64::try_from(self.id)
            .map_err(|_| SightingError::Corrupt(format!("negative id {}", self.id)))?;
        Ok(SightingRecord {
            id,
            species: self.species,
            location: self.location,
            date,
            time,
        })
    }
}

fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn time_text(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Ids beyond the SQLite integer range cannot exist in the table.
fn row_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| SightingError::NotFound(id))
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn select_all(conn: &Connection) -> Result<Vec<SightingRecord>> {
        let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
        let rows = stmt
            .query_map([], RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RawRow::into_record).collect()
    }

    fn select_one(conn: &Connection, id: u64) -> Result<SightingRecord> {
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![row_id(id)?],
                RawRow::from_row,
            )
            .optional()?;
        row.ok_or(SightingError::NotFound(id))?.into_record()
    }
}

impl SightingStore for SqliteStore {
    fn create(&self, sighting: &NewSighting) -> Result<SightingRecord> {
        let valid = sighting.validate(self.clock.today())?;
        let date = date_text(valid.date);
        let time = time_text(valid.time);

        let mut conn = self.conn.lock()?;
        // IMMEDIATE takes the write lock up front, so no other writer can
        // slip in between the duplicate scan and the insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let candidates = {
            let mut stmt =
                tx.prepare("SELECT species, location FROM sightings WHERE date = ?1 AND time = ?2")?;
            let rows = stmt
                .query_map(params![date, time], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        if candidates
            .iter()
            .any(|(species, location)| valid.same_identity(species, location, valid.date, valid.time))
        {
            warn!("Rejected duplicate sighting: {} at {}", valid.species, valid.location);
            return Err(SightingError::Duplicate);
        }

        tx.execute(
            "INSERT INTO sightings (species, location, date, time) VALUES (?1, ?2, ?3, ?4)",
            params![valid.species, valid.location, date, time],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        let id = u64::try_from(id).map_err(|_| SightingError::Corrupt(format!("rowid {}", id)))?;
        let record = valid.into_record(id);
        info!("Recorded sighting {}: {}", id, record);
        Ok(record)
    }

    fn list(&self) -> Result<Vec<SightingRecord>> {
        let conn = self.conn.lock()?;
        let records = Self::select_all(&conn)?;
        if records.is_empty() {
            return Err(SightingError::Empty(EmptyKind::NoRecords));
        }
        Ok(records)
    }

    fn search(&self, filter: &SearchFilter) -> Result<BTreeMap<u64, SightingRecord>> {
        let conn = self.conn.lock()?;
        let found: BTreeMap<u64, SightingRecord> = Self::select_all(&conn)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .map(|r| (r.id, r))
            .collect();
        debug!("Search {:?} matched {} sightings", filter, found.len());
        if found.is_empty() {
            return Err(SightingError::Empty(EmptyKind::NoMatches));
        }
        Ok(found)
    }

    fn get(&self, id: u64) -> Result<SightingRecord> {
        let conn = self.conn.lock()?;
        Self::select_one(&conn, id)
    }

    fn update(&self, id: u64, update: &SightingUpdate) -> Result<SightingRecord> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut record = Self::select_one(&tx, id)?;
        update.validate(self.clock.today())?.apply(&mut record);

        tx.execute(
            "UPDATE sightings SET species = ?1, location = ?2, date = ?3, time = ?4 WHERE id = ?5",
            params![
                record.species,
                record.location,
                date_text(record.date),
                time_text(record.time),
                row_id(id)?
            ],
        )?;
        tx.commit()?;
        info!("Updated sighting {}: {}", id, record);
        Ok(record)
    }

    fn delete(&self, id: u64) -> Result<()> {
        let conn = self.conn.lock()?;
        let removed = conn.execute("DELETE FROM sightings WHERE id = ?1", params![row_id(id)?])?;
        if removed == 0 {
            return Err(SightingError::NotFound(id));
        }
        info!("Deleted sighting {}", id);
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM sightings", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}
