use lifeos_core::types::MessageRole;
use lifeos_core::{Error, Result};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{now_timestamp, Database};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub agent_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

fn map_session(row: &Row) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        agent_type: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_message(row: &Row) -> rusqlite::Result<MessageRecord> {
    let role_str: String = row.get(2)?;
    let metadata_str: Option<String> = row.get(4)?;
    Ok(MessageRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: MessageRole::from_str(&role_str).unwrap_or(MessageRole::System),
        content: row.get(3)?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(5)?,
    })
}

impl Database {
    /// Create a session with a fresh identifier.
    pub fn create_session(&self, user_id: Option<&str>) -> Result<SessionRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (id, user_id, agent_type, created_at, updated_at) \
             VALUES (?1, ?2, NULL, ?3, ?3)",
            params![id, user_id, now],
        )?;
        info!(session = %id, "Session created");
        Ok(SessionRecord {
            id,
            user_id: user_id.map(|s| s.to_string()),
            agent_type: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                "SELECT id, user_id, agent_type, created_at, updated_at \
                 FROM sessions WHERE id = ?1",
                params![session_id],
                map_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Record which agent last served the session and bump `updated_at`.
    pub fn touch_session(&self, session_id: &str, agent_type: Option<&str>) -> Result<()> {
        let now = now_timestamp();
        let conn = self.conn.lock().unwrap();
        let changed = match agent_type {
            Some(agent) => conn.execute(
                "UPDATE sessions SET agent_type = ?2, updated_at = ?3 WHERE id = ?1",
                params![session_id, agent, now],
            )?,
            None => conn.execute(
                "UPDATE sessions SET updated_at = ?2 WHERE id = ?1",
                params![session_id, now],
            )?,
        };
        if changed == 0 {
            return Err(Error::Session(format!("Session not found: {}", session_id)));
        }
        Ok(())
    }

    pub fn list_sessions(&self, user_id: Option<&str>) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut sessions = Vec::new();
        match user_id {
            Some(user) => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, agent_type, created_at, updated_at \
                     FROM sessions WHERE user_id = ?1 ORDER BY updated_at DESC",
                )?;
                let rows = stmt.query_map(params![user], map_session)?;
                for row in rows {
                    sessions.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, agent_type, created_at, updated_at \
                     FROM sessions ORDER BY updated_at DESC",
                )?;
                let rows = stmt.query_map([], map_session)?;
                for row in rows {
                    sessions.push(row?);
                }
            }
        }
        Ok(sessions)
    }

    /// Delete a session and (by cascade) its messages and context entries.
    /// Events and audit entries referencing it are retained.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        if deleted > 0 {
            info!(session = %session_id, "Session deleted");
        }
        Ok(deleted > 0)
    }

    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<MessageRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let metadata_str = metadata.map(|m| m.to_string());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (id, session_id, role, content, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, session_id, role.as_str(), content, metadata_str, now],
        )?;
        debug!(session = %session_id, role = role.as_str(), "Message appended");
        Ok(MessageRecord {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            metadata: metadata.cloned(),
            created_at: now,
        })
    }

    /// Last `limit` messages for the session, returned oldest-first.
    /// Fetched newest-first and reversed; rowid breaks timestamp ties.
    pub fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, metadata, created_at \
             FROM messages WHERE session_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], map_message)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }

    /// Every message for the session, oldest-first.
    pub fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, metadata, created_at \
             FROM messages WHERE session_id = ?1 \
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![session_id], map_message)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn count_messages(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get_session() {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(Some("alice")).unwrap();

        let fetched = db.get_session(&session.id).unwrap().unwrap();
        assert_eq!(fetched.user_id.as_deref(), Some("alice"));
        assert!(fetched.agent_type.is_none());

        assert!(db.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_anonymous_session() {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();
        assert!(session.user_id.is_none());
    }

    #[test]
    fn test_touch_session_sets_agent_type() {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();
        db.touch_session(&session.id, Some("wellness_agent")).unwrap();

        let fetched = db.get_session(&session.id).unwrap().unwrap();
        assert_eq!(fetched.agent_type.as_deref(), Some("wellness_agent"));

        assert!(db.touch_session("missing", None).is_err());
    }

    #[test]
    fn test_recent_messages_chronological_and_limited() {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();

        for i in 0..5 {
            db.append_message(&session.id, MessageRole::User, &format!("msg {}", i), None)
                .unwrap();
        }

        let messages = db.recent_messages(&session.id, 3).unwrap();
        assert_eq!(messages.len(), 3);
        // Last three, oldest first
        assert_eq!(messages[0].content, "msg 2");
        assert_eq!(messages[2].content, "msg 4");
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn test_delete_session_cascades_messages() {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();
        db.append_message(&session.id, MessageRole::User, "hello", None)
            .unwrap();

        assert!(db.delete_session(&session.id).unwrap());
        assert_eq!(db.count_messages(&session.id).unwrap(), 0);
        assert!(!db.delete_session(&session.id).unwrap());
    }

    #[test]
    fn test_message_metadata_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();
        let metadata = serde_json::json!({"agent": "study_agent"});
        db.append_message(&session.id, MessageRole::Agent, "reply", Some(&metadata))
            .unwrap();

        let messages = db.recent_messages(&session.id, 10).unwrap();
        assert_eq!(messages[0].metadata.as_ref().unwrap()["agent"], "study_agent");
    }
}
