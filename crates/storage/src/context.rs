use chrono::{DateTime, Utc};
use lifeos_core::Result;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{format_timestamp, now_timestamp, Database};

/// A typed key/value fact scoped to one session. At most one row exists per
/// (session, type, key); writes upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    pub session_id: String,
    pub context_type: String,
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: Option<String>,
    pub updated_at: String,
}

fn map_context(row: &Row) -> rusqlite::Result<ContextRecord> {
    let value_str: String = row.get(4)?;
    Ok(ContextRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        context_type: row.get(2)?,
        key: row.get(3)?,
        value: serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null),
        expires_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Database {
    pub fn upsert_context(
        &self,
        session_id: &str,
        context_type: &str,
        key: &str,
        value: &serde_json::Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ContextRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let expires_str = expires_at.map(format_timestamp);
        let value_str = value.to_string();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO contexts (id, session_id, context_type, key, value, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (session_id, context_type, key) \
             DO UPDATE SET value = ?5, expires_at = ?6, updated_at = ?7",
            params![id, session_id, context_type, key, value_str, expires_str, now],
        )?;
        debug!(session = %session_id, context_type, key, "Context upserted");

        // The insert id is discarded on conflict; read the row back.
        let record = conn.query_row(
            "SELECT id, session_id, context_type, key, value, expires_at, updated_at \
             FROM contexts WHERE session_id = ?1 AND context_type = ?2 AND key = ?3",
            params![session_id, context_type, key],
            map_context,
        )?;
        Ok(record)
    }

    /// Non-expired context entries for the session, optionally filtered by
    /// type. Entries with no expiry never expire.
    pub fn get_contexts(
        &self,
        session_id: &str,
        context_type: Option<&str>,
    ) -> Result<Vec<ContextRecord>> {
        let now = now_timestamp();
        let conn = self.conn.lock().unwrap();
        let mut records = Vec::new();
        match context_type {
            Some(ctx_type) => {
                let mut stmt = conn.prepare(
                    "SELECT id, session_id, context_type, key, value, expires_at, updated_at \
                     FROM contexts WHERE session_id = ?1 AND context_type = ?2 \
                     AND (expires_at IS NULL OR expires_at > ?3)",
                )?;
                let rows = stmt.query_map(params![session_id, ctx_type, now], map_context)?;
                for row in rows {
                    records.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, session_id, context_type, key, value, expires_at, updated_at \
                     FROM contexts WHERE session_id = ?1 \
                     AND (expires_at IS NULL OR expires_at > ?2)",
                )?;
                let rows = stmt.query_map(params![session_id, now], map_context)?;
                for row in rows {
                    records.push(row?);
                }
            }
        }
        Ok(records)
    }

    /// Delete expired entries for the session. Idempotent.
    pub fn cleanup_expired_contexts(&self, session_id: &str) -> Result<usize> {
        let now = now_timestamp();
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM contexts WHERE session_id = ?1 \
             AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![session_id, now],
        )?;
        if deleted > 0 {
            info!(session = %session_id, deleted, "Cleaned up expired contexts");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(db: &Database) -> String {
        db.create_session(None).unwrap().id
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let db = Database::open_in_memory().unwrap();
        let sid = session(&db);

        db.upsert_context(&sid, "USER_PREFERENCES", "diet", &serde_json::json!("vegan"), None)
            .unwrap();
        db.upsert_context(&sid, "USER_PREFERENCES", "diet", &serde_json::json!("keto"), None)
            .unwrap();

        let contexts = db.get_contexts(&sid, Some("USER_PREFERENCES")).unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].value, serde_json::json!("keto"));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let db = Database::open_in_memory().unwrap();
        let sid = session(&db);

        db.upsert_context(&sid, "TEMPORAL", "tz", &serde_json::json!("UTC"), None)
            .unwrap();

        let contexts = db.get_contexts(&sid, None).unwrap();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].expires_at.is_none());
    }

    #[test]
    fn test_expired_entry_excluded_from_reads() {
        let db = Database::open_in_memory().unwrap();
        let sid = session(&db);

        let past = Utc::now() - Duration::hours(1);
        let future = Utc::now() + Duration::hours(1);
        db.upsert_context(&sid, "TEMPORAL", "gone", &serde_json::json!(1), Some(past))
            .unwrap();
        db.upsert_context(&sid, "TEMPORAL", "kept", &serde_json::json!(2), Some(future))
            .unwrap();

        let contexts = db.get_contexts(&sid, Some("TEMPORAL")).unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].key, "kept");
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let sid = session(&db);

        let past = Utc::now() - Duration::hours(1);
        db.upsert_context(&sid, "TEMPORAL", "old", &serde_json::json!(1), Some(past))
            .unwrap();

        assert_eq!(db.cleanup_expired_contexts(&sid).unwrap(), 1);
        assert_eq!(db.cleanup_expired_contexts(&sid).unwrap(), 0);
    }

    #[test]
    fn test_same_key_different_type_is_distinct() {
        let db = Database::open_in_memory().unwrap();
        let sid = session(&db);

        db.upsert_context(&sid, "USER_PREFERENCES", "focus", &serde_json::json!("a"), None)
            .unwrap();
        db.upsert_context(&sid, "TEMPORAL", "focus", &serde_json::json!("b"), None)
            .unwrap();

        assert_eq!(db.get_contexts(&sid, None).unwrap().len(), 2);
    }
}
