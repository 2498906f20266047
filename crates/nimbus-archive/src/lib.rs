//! nimbus-archive: SQLite-backed message history.
//!
//! Records plain-text chat messages per target and serves the half-open
//! range queries the generation pipeline needs.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use nimbus_pipeline::MessageStore;
use nimbus_types::MessageScope;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// One archived chat message.
#[derive(Debug, Clone)]
pub struct ArchivedMessage {
    pub target_id: String,
    pub author_id: String,
    /// Message instant, stored as UTC microseconds.
    pub time: DateTime<Utc>,
    pub body: String,
}

/// SQLite-backed message archive.
pub struct MessageArchive {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        time_us INTEGER NOT NULL,
        body TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_target_time
        ON messages (target_id, time_us);";

impl MessageArchive {
    /// Open (or create) the archive database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("Message archive opened: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory archive (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Record one message.
    pub async fn save_message(&self, message: &ArchivedMessage) -> Result<()> {
        let conn = self.conn.clone();
        let message = message.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO messages (target_id, author_id, time_us, body)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    message.target_id,
                    message.author_id,
                    message.time.timestamp_micros(),
                    message.body,
                ],
            )?;
            Ok(())
        })
        .await?
    }

    /// Number of messages stored for a target.
    pub async fn count_messages(&self, target_id: &str) -> Result<i64> {
        let conn = self.conn.clone();
        let target_id = target_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE target_id = ?1",
                    rusqlite::params![target_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            Ok(count)
        })
        .await?
    }

    async fn fetch(
        &self,
        scope: MessageScope,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        exclude_authors: Vec<String>,
    ) -> Result<Vec<String>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();

            let mut sql = String::from(
                "SELECT body FROM messages
                 WHERE target_id = ?1 AND time_us >= ?2 AND time_us < ?3",
            );
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(scope.target_id),
                Box::new(start.timestamp_micros()),
                Box::new(stop.timestamp_micros()),
            ];
            if let Some(author_id) = scope.author_id {
                sql.push_str(&format!(" AND author_id = ?{}", params.len() + 1));
                params.push(Box::new(author_id));
            }
            for author in exclude_authors {
                sql.push_str(&format!(" AND author_id != ?{}", params.len() + 1));
                params.push(Box::new(author));
            }
            sql.push_str(" ORDER BY time_us ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl MessageStore for MessageArchive {
    async fn fetch_plain_text(
        &self,
        scope: &MessageScope,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        exclude_authors: &HashSet<String>,
    ) -> anyhow::Result<Vec<String>> {
        let rows = self
            .fetch(
                scope.clone(),
                start,
                stop,
                exclude_authors.iter().cloned().collect(),
            )
            .await?;
        Ok(rows)
    }
}
