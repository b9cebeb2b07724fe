//! SQLite storage backend.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::debug;

use crate::backend::StoreBackend;
use crate::error::{StoreError, StoreResult};
use crate::record::{AttemptFilter, AttemptRow, AttemptUpdate, TrackFilter, TrackRow, TrackUpdate};

/// Table holding one row per offline attempt.
pub const ATTEMPTS_TABLE: &str = "scorm_offline_attempts";
/// Table holding one row per tracked element.
pub const TRACKS_TABLE: &str = "scorm_offline_tracks";

const SCHEMA_VERSION: i64 = 1;

const ATTEMPT_COLUMNS: &str =
    "scorm_id, user_id, attempt, course_id, time_created, time_modified, snapshot";
const TRACK_COLUMNS: &str =
    "scorm_id, user_id, attempt, sco_id, element, value, time_modified, synced";

/// A storage backend persisting both tables in a SQLite database.
///
/// All statements run on a single connection guarded by a mutex, so every
/// `update_*` call is one atomic SQL statement.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) a database file and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened sqlite offline store");
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn ensure_schema(conn: &Connection) -> StoreResult<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current > SCHEMA_VERSION {
        return Err(StoreError::Corrupted(format!(
            "schema version {current} is newer than supported {SCHEMA_VERSION}"
        )));
    }
    if current < 1 {
        conn.execute_batch(&format!(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS {ATTEMPTS_TABLE} (
                 scorm_id INTEGER NOT NULL,
                 user_id INTEGER NOT NULL,
                 attempt INTEGER NOT NULL,
                 course_id INTEGER NOT NULL,
                 time_created INTEGER NOT NULL,
                 time_modified INTEGER NOT NULL,
                 snapshot TEXT,
                 PRIMARY KEY (scorm_id, user_id, attempt)
             );
             CREATE TABLE IF NOT EXISTS {TRACKS_TABLE} (
                 scorm_id INTEGER NOT NULL,
                 user_id INTEGER NOT NULL,
                 attempt INTEGER NOT NULL,
                 sco_id INTEGER NOT NULL,
                 element TEXT NOT NULL,
                 value TEXT,
                 time_modified INTEGER NOT NULL,
                 synced INTEGER NOT NULL DEFAULT 0,
                 PRIMARY KEY (scorm_id, user_id, attempt, sco_id, element)
             );
             PRAGMA user_version = {SCHEMA_VERSION};
             COMMIT;"
        ))?;
    }
    Ok(())
}

fn int(value: u64) -> Value {
    Value::Integer(value as i64)
}

fn attempt_where(filter: &AttemptFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(v) = filter.scorm_id {
        clauses.push("scorm_id = ?");
        values.push(int(v));
    }
    if let Some(v) = filter.user_id {
        clauses.push("user_id = ?");
        values.push(int(v));
    }
    if let Some(v) = filter.attempt {
        clauses.push("attempt = ?");
        values.push(int(u64::from(v)));
    }
    (where_sql(&clauses), values)
}

fn track_where(filter: &TrackFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(v) = filter.scorm_id {
        clauses.push("scorm_id = ?");
        values.push(int(v));
    }
    if let Some(v) = filter.user_id {
        clauses.push("user_id = ?");
        values.push(int(v));
    }
    if let Some(v) = filter.attempt {
        clauses.push("attempt = ?");
        values.push(int(u64::from(v)));
    }
    if let Some(v) = filter.sco_id {
        clauses.push("sco_id = ?");
        values.push(int(v));
    }
    if let Some(v) = &filter.element {
        clauses.push("element = ?");
        values.push(Value::Text(v.clone()));
    }
    if let Some(v) = filter.synced {
        clauses.push("synced = ?");
        values.push(Value::Integer(i64::from(v)));
    }
    (where_sql(&clauses), values)
}

fn where_sql(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<AttemptRow> {
    Ok(AttemptRow {
        scorm_id: row.get::<_, i64>(0)? as u64,
        user_id: row.get::<_, i64>(1)? as u64,
        attempt: row.get::<_, i64>(2)? as u32,
        course_id: row.get::<_, i64>(3)? as u64,
        time_created: row.get(4)?,
        time_modified: row.get(5)?,
        snapshot: row.get(6)?,
    })
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<TrackRow> {
    Ok(TrackRow {
        scorm_id: row.get::<_, i64>(0)? as u64,
        user_id: row.get::<_, i64>(1)? as u64,
        attempt: row.get::<_, i64>(2)? as u32,
        sco_id: row.get::<_, i64>(3)? as u64,
        element: row.get(4)?,
        value: row.get(5)?,
        time_modified: row.get(6)?,
        synced: row.get::<_, i64>(7)? != 0,
    })
}

fn duplicate_or(table: &'static str, key: String, err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(code, _) = &err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::DuplicateKey { table, key };
        }
    }
    StoreError::Sqlite(err)
}

impl StoreBackend for SqliteBackend {
    fn put_attempt(&self, row: &AttemptRow) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!("INSERT OR REPLACE INTO {ATTEMPTS_TABLE} ({ATTEMPT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                row.scorm_id as i64,
                row.user_id as i64,
                i64::from(row.attempt),
                row.course_id as i64,
                row.time_created,
                row.time_modified,
                row.snapshot,
            ],
        )?;
        Ok(())
    }

    fn get_attempts(&self, filter: &AttemptFilter) -> StoreResult<Vec<AttemptRow>> {
        let (sql_where, values) = attempt_where(filter);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM {ATTEMPTS_TABLE}{sql_where} ORDER BY scorm_id, user_id, attempt"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), attempt_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_attempts(
        &self,
        filter: &AttemptFilter,
        update: &AttemptUpdate,
    ) -> StoreResult<usize> {
        if update.is_empty() {
            return Ok(0);
        }
        let mut sets = Vec::new();
        let mut values = Vec::new();
        if let Some(attempt) = update.attempt {
            sets.push("attempt = ?");
            values.push(int(u64::from(attempt)));
        }
        if let Some(time) = update.time_modified {
            sets.push("time_modified = ?");
            values.push(Value::Integer(time));
        }
        if let Some(snapshot) = &update.snapshot {
            sets.push("snapshot = ?");
            values.push(snapshot.clone().map_or(Value::Null, Value::Text));
        }
        let (sql_where, where_values) = attempt_where(filter);
        values.extend(where_values);

        let conn = self.conn.lock();
        conn.execute(
            &format!("UPDATE {ATTEMPTS_TABLE} SET {}{sql_where}", sets.join(", ")),
            params_from_iter(values.iter()),
        )
        .map_err(|err| duplicate_or("attempts", format!("{filter:?}"), err))
    }

    fn delete_attempts(&self, filter: &AttemptFilter) -> StoreResult<usize> {
        let (sql_where, values) = attempt_where(filter);
        let conn = self.conn.lock();
        Ok(conn.execute(
            &format!("DELETE FROM {ATTEMPTS_TABLE}{sql_where}"),
            params_from_iter(values.iter()),
        )?)
    }

    fn put_track(&self, row: &TrackRow) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!("INSERT OR REPLACE INTO {TRACKS_TABLE} ({TRACK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                row.scorm_id as i64,
                row.user_id as i64,
                i64::from(row.attempt),
                row.sco_id as i64,
                row.element,
                row.value,
                row.time_modified,
                i64::from(row.synced),
            ],
        )?;
        Ok(())
    }

    fn get_tracks(&self, filter: &TrackFilter) -> StoreResult<Vec<TrackRow>> {
        let (sql_where, values) = track_where(filter);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRACK_COLUMNS} FROM {TRACKS_TABLE}{sql_where} ORDER BY scorm_id, user_id, attempt, sco_id, element"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), track_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_tracks(&self, filter: &TrackFilter, update: &TrackUpdate) -> StoreResult<usize> {
        if update.is_empty() {
            return Ok(0);
        }
        let mut sets = Vec::new();
        let mut values = Vec::new();
        if let Some(attempt) = update.attempt {
            sets.push("attempt = ?");
            values.push(int(u64::from(attempt)));
        }
        if let Some(synced) = update.synced {
            sets.push("synced = ?");
            values.push(Value::Integer(i64::from(synced)));
        }
        let (sql_where, where_values) = track_where(filter);
        values.extend(where_values);

        let conn = self.conn.lock();
        conn.execute(
            &format!("UPDATE {TRACKS_TABLE} SET {}{sql_where}", sets.join(", ")),
            params_from_iter(values.iter()),
        )
        .map_err(|err| duplicate_or("tracks", format!("{filter:?}"), err))
    }

    fn delete_tracks(&self, filter: &TrackFilter) -> StoreResult<usize> {
        let (sql_where, values) = track_where(filter);
        let conn = self.conn.lock();
        Ok(conn.execute(
            &format!("DELETE FROM {TRACKS_TABLE}{sql_where}"),
            params_from_iter(values.iter()),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AttemptKey;

    fn attempt(n: u32) -> AttemptRow {
        AttemptRow {
            scorm_id: 5,
            user_id: 9,
            attempt: n,
            course_id: 1,
            time_created: 1_700_000_000,
            time_modified: 1_700_000_000,
            snapshot: Some("{}".into()),
        }
    }

    #[test]
    fn sqlite_put_and_get_attempt() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put_attempt(&attempt(1)).unwrap();

        let rows = backend.get_attempts(&AttemptFilter::user(9)).unwrap();
        assert_eq!(rows, vec![attempt(1)]);
    }

    #[test]
    fn sqlite_update_onto_existing_key_is_duplicate() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.put_attempt(&attempt(1)).unwrap();
        backend.put_attempt(&attempt(2)).unwrap();

        let result = backend.update_attempts(
            &AttemptFilter::user(9).with_attempt(1),
            &AttemptUpdate {
                attempt: Some(2),
                ..AttemptUpdate::default()
            },
        );
        assert!(result.unwrap_err().is_duplicate_key());
    }

    #[test]
    fn sqlite_track_synced_filter() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let key = AttemptKey {
            scorm_id: 5,
            user_id: 9,
            attempt: 1,
        };
        for (element, synced) in [("a", true), ("b", false)] {
            backend
                .put_track(&TrackRow {
                    scorm_id: 5,
                    user_id: 9,
                    attempt: 1,
                    sco_id: 3,
                    element: element.into(),
                    value: None,
                    time_modified: 0,
                    synced,
                })
                .unwrap();
        }

        let synced = backend
            .get_tracks(&TrackFilter::attempt(key).with_synced(true))
            .unwrap();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].element, "a");
        assert_eq!(synced[0].value, None);
    }

    #[test]
    fn sqlite_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");
        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.put_attempt(&attempt(3)).unwrap();
        }
        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.get_attempts(&AttemptFilter::all()).unwrap().len(), 1);
    }
}
