use chrono::{SecondsFormat, Utc};
use lifeos_core::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Handle to the durable store. Cheap to clone; all record modules go
/// through the same connection.
#[derive(Clone)]
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT,
                agent_type  TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id          TEXT PRIMARY KEY,
                session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role        TEXT NOT NULL CHECK (role IN ('user', 'agent', 'system')),
                content     TEXT NOT NULL,
                metadata    TEXT,
                created_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session
                ON messages(session_id, created_at);

            CREATE TABLE IF NOT EXISTS contexts (
                id           TEXT PRIMARY KEY,
                session_id   TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                context_type TEXT NOT NULL,
                key          TEXT NOT NULL,
                value        TEXT NOT NULL,
                expires_at   TEXT,
                updated_at   TEXT NOT NULL,
                UNIQUE (session_id, context_type, key)
            );

            CREATE TABLE IF NOT EXISTS events (
                id              TEXT PRIMARY KEY,
                event_type      TEXT NOT NULL,
                session_id      TEXT,
                user_id         TEXT,
                payload         TEXT NOT NULL,
                metadata        TEXT,
                parent_event_id TEXT,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, created_at);

            CREATE TABLE IF NOT EXISTS audit_log (
                id            TEXT PRIMARY KEY,
                action_type   TEXT NOT NULL,
                action        TEXT NOT NULL,
                details       TEXT NOT NULL,
                user_id       TEXT,
                session_id    TEXT,
                event_id      TEXT,
                resource      TEXT,
                ip_address    TEXT,
                user_agent    TEXT,
                success       INTEGER NOT NULL,
                error_message TEXT,
                created_at    TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

/// RFC3339 UTC timestamp with fixed microsecond precision, so string
/// comparison in SQL matches chronological order.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn format_timestamp(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(&temp_dir.path().join("test.db")).unwrap();
        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('sessions', 'messages', 'contexts', 'events', 'audit_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = format_timestamp(Utc::now());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = format_timestamp(Utc::now());
        assert!(earlier < later);
    }
}
