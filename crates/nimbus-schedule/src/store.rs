//! SQLite-backed schedule storage.
//!
//! One row per target; a `NULL` trigger time means "use the default
//! schedule time". Store failures propagate — a silently lost schedule
//! mutation is a correctness bug.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveTime;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Malformed trigger time in store: {0}")]
    MalformedTime(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const TIME_FORMAT: &str = "%H:%M:%S";

/// One persisted schedule row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRecord {
    pub target_id: String,
    /// Time of day in UTC; `None` means the default schedule time.
    pub trigger_time: Option<NaiveTime>,
}

/// Persistent storage for per-target schedules.
pub struct ScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS wordcloud_schedule (
        target_id TEXT PRIMARY KEY,
        trigger_time TEXT
    );";

impl ScheduleStore {
    /// Open (or create) the schedule database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("Schedule store opened: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or overwrite the schedule row for a target.
    pub async fn upsert(&self, target_id: &str, trigger_time: Option<NaiveTime>) -> Result<()> {
        let conn = self.conn.clone();
        let target_id = target_id.to_string();
        let time_text = trigger_time.map(|t| t.format(TIME_FORMAT).to_string());
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO wordcloud_schedule (target_id, trigger_time)
                 VALUES (?1, ?2)
                 ON CONFLICT(target_id) DO UPDATE SET
                    trigger_time = excluded.trigger_time",
                rusqlite::params![target_id, time_text],
            )?;
            Ok(())
        })
        .await?
    }

    /// Tri-state lookup: `None` if no row exists (scheduling off),
    /// `Some(None)` for a row using the default time, `Some(Some(t))` for an
    /// explicit override.
    pub async fn get(&self, target_id: &str) -> Result<Option<Option<NaiveTime>>> {
        let conn = self.conn.clone();
        let target_id = target_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let row = conn
                .query_row(
                    "SELECT trigger_time FROM wordcloud_schedule WHERE target_id = ?1",
                    rusqlite::params![target_id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            match row {
                None => Ok(None),
                Some(None) => Ok(Some(None)),
                Some(Some(text)) => Ok(Some(Some(parse_time(&text)?))),
            }
        })
        .await?
    }

    /// Delete the schedule row for a target. Returns whether a row existed.
    pub async fn remove(&self, target_id: &str) -> Result<bool> {
        let conn = self.conn.clone();
        let target_id = target_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(
                "DELETE FROM wordcloud_schedule WHERE target_id = ?1",
                rusqlite::params![target_id],
            )?;
            Ok(count > 0)
        })
        .await?
    }

    /// Distinct non-null trigger times currently referenced by any record.
    pub async fn distinct_trigger_times(&self) -> Result<Vec<NaiveTime>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT DISTINCT trigger_time FROM wordcloud_schedule
                 WHERE trigger_time IS NOT NULL",
            )?;
            let times = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            times.iter().map(|text| parse_time(text)).collect()
        })
        .await?
    }

    /// All records bound to a trigger time (`None` selects the default-time
    /// records).
    pub async fn list_for_trigger(
        &self,
        trigger_time: Option<NaiveTime>,
    ) -> Result<Vec<ScheduleRecord>> {
        let conn = self.conn.clone();
        let time_text = trigger_time.map(|t| t.format(TIME_FORMAT).to_string());
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let rows = match &time_text {
                Some(text) => {
                    let mut stmt = conn.prepare(
                        "SELECT target_id, trigger_time FROM wordcloud_schedule
                         WHERE trigger_time = ?1",
                    )?;
                    stmt.query_map(rusqlite::params![text], row_to_pair)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT target_id, trigger_time FROM wordcloud_schedule
                         WHERE trigger_time IS NULL",
                    )?;
                    stmt.query_map([], row_to_pair)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            rows.into_iter()
                .map(|(target_id, time_text)| {
                    let trigger_time = time_text.as_deref().map(parse_time).transpose()?;
                    Ok(ScheduleRecord {
                        target_id,
                        trigger_time,
                    })
                })
                .collect()
        })
        .await?
    }
}

fn row_to_pair(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn parse_time(text: &str) -> std::result::Result<NaiveTime, StoreError> {
    NaiveTime::parse_from_str(text, TIME_FORMAT)
        .map_err(|_| StoreError::MalformedTime(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_tri_state_get() {
        let store = ScheduleStore::open_in_memory().unwrap();

        // No row at all.
        assert_eq!(store.get("t1").await.unwrap(), None);

        // Row with the default time.
        store.upsert("t1", None).await.unwrap();
        assert_eq!(store.get("t1").await.unwrap(), Some(None));

        // Overwritten in place with an explicit time; still one row.
        store.upsert("t1", Some(time(10, 0))).await.unwrap();
        assert_eq!(store.get("t1").await.unwrap(), Some(Some(time(10, 0))));
        let all_default = store.list_for_trigger(None).await.unwrap();
        assert!(all_default.is_empty());
        let at_ten = store.list_for_trigger(Some(time(10, 0))).await.unwrap();
        assert_eq!(at_ten.len(), 1);
        assert_eq!(at_ten[0].target_id, "t1");
    }

    #[tokio::test]
    async fn test_remove() {
        let store = ScheduleStore::open_in_memory().unwrap();
        store.upsert("t1", None).await.unwrap();
        assert!(store.remove("t1").await.unwrap());
        assert_eq!(store.get("t1").await.unwrap(), None);
        // Removing again is a no-op.
        assert!(!store.remove("t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_distinct_trigger_times() {
        let store = ScheduleStore::open_in_memory().unwrap();
        store.upsert("t1", Some(time(10, 0))).await.unwrap();
        store.upsert("t2", Some(time(10, 0))).await.unwrap();
        store.upsert("t3", Some(time(14, 30))).await.unwrap();
        store.upsert("t4", None).await.unwrap();

        let mut times = store.distinct_trigger_times().await.unwrap();
        times.sort();
        assert_eq!(times, vec![time(10, 0), time(14, 30)]);
    }

    #[tokio::test]
    async fn test_list_for_trigger() {
        let store = ScheduleStore::open_in_memory().unwrap();
        store.upsert("t1", Some(time(10, 0))).await.unwrap();
        store.upsert("t2", None).await.unwrap();
        store.upsert("t3", None).await.unwrap();

        let defaults = store.list_for_trigger(None).await.unwrap();
        assert_eq!(defaults.len(), 2);
        assert!(defaults.iter().all(|r| r.trigger_time.is_none()));

        let at_ten = store.list_for_trigger(Some(time(10, 0))).await.unwrap();
        assert_eq!(at_ten.len(), 1);
        assert_eq!(at_ten[0].trigger_time, Some(time(10, 0)));

        let nobody = store.list_for_trigger(Some(time(9, 0))).await.unwrap();
        assert!(nobody.is_empty());
    }
}
