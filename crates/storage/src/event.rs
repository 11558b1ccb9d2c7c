use lifeos_core::Result;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

use crate::db::{now_timestamp, Database};

/// Immutable record of one orchestration step. Parent links form a forest;
/// events are only ever created pointing at an already-persisted event, so
/// chains are acyclic by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub event_type: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub payload: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub parent_event_id: Option<String>,
    pub created_at: String,
}

fn map_event(row: &Row) -> rusqlite::Result<EventRecord> {
    let payload_str: String = row.get(4)?;
    let metadata_str: Option<String> = row.get(5)?;
    Ok(EventRecord {
        id: row.get(0)?,
        event_type: row.get(1)?,
        session_id: row.get(2)?,
        user_id: row.get(3)?,
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        parent_event_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl Database {
    pub fn insert_event(
        &self,
        event_type: &str,
        session_id: Option<&str>,
        user_id: Option<&str>,
        payload: &serde_json::Value,
        metadata: Option<&serde_json::Value>,
        parent_event_id: Option<&str>,
    ) -> Result<EventRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events \
             (id, event_type, session_id, user_id, payload, metadata, parent_event_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                event_type,
                session_id,
                user_id,
                payload.to_string(),
                metadata.map(|m| m.to_string()),
                parent_event_id,
                now
            ],
        )?;
        Ok(EventRecord {
            id,
            event_type: event_type.to_string(),
            session_id: session_id.map(|s| s.to_string()),
            user_id: user_id.map(|s| s.to_string()),
            payload: payload.clone(),
            metadata: metadata.cloned(),
            parent_event_id: parent_event_id.map(|s| s.to_string()),
            created_at: now,
        })
    }

    pub fn get_event(&self, event_id: &str) -> Result<Option<EventRecord>> {
        let conn = self.conn.lock().unwrap();
        let event = conn
            .query_row(
                "SELECT id, event_type, session_id, user_id, payload, metadata, \
                 parent_event_id, created_at FROM events WHERE id = ?1",
                params![event_id],
                map_event,
            )
            .optional()?;
        Ok(event)
    }

    /// Walk parent links from `event_id` to the root, returning the chain in
    /// root-to-leaf order. A visited set guards against malformed cycles.
    pub fn event_chain(&self, event_id: &str) -> Result<Vec<EventRecord>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.get_event(event_id)?;

        while let Some(event) = current {
            if !visited.insert(event.id.clone()) {
                warn!(event = %event.id, "Cycle detected in event chain, truncating walk");
                break;
            }
            let parent_id = event.parent_event_id.clone();
            chain.push(event);
            current = match parent_id {
                Some(id) => self.get_event(&id)?,
                None => None,
            };
        }

        chain.reverse();
        Ok(chain)
    }

    pub fn list_events(&self, session_id: &str) -> Result<Vec<EventRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, session_id, user_id, payload, metadata, \
             parent_event_id, created_at FROM events WHERE session_id = ?1 \
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![session_id], map_event)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_chain_root_to_leaf() {
        let db = Database::open_in_memory().unwrap();
        let payload = serde_json::json!({});

        let root = db
            .insert_event("INTENT_RECEIVED", None, None, &payload, None, None)
            .unwrap();
        let mid = db
            .insert_event("AGENT_SELECTED", None, None, &payload, None, Some(&root.id))
            .unwrap();
        let leaf = db
            .insert_event("CONTEXT_FETCHED", None, None, &payload, None, Some(&mid.id))
            .unwrap();

        let chain = db.event_chain(&leaf.id).unwrap();
        let types: Vec<&str> = chain.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["INTENT_RECEIVED", "AGENT_SELECTED", "CONTEXT_FETCHED"]);
    }

    #[test]
    fn test_event_survives_session_deletion() {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();
        let event = db
            .insert_event(
                "INTENT_RECEIVED",
                Some(&session.id),
                None,
                &serde_json::json!({"message": "hi"}),
                None,
                None,
            )
            .unwrap();

        db.delete_session(&session.id).unwrap();
        assert!(db.get_event(&event.id).unwrap().is_some());
    }

    #[test]
    fn test_chain_of_single_event() {
        let db = Database::open_in_memory().unwrap();
        let event = db
            .insert_event("INTENT_RECEIVED", None, None, &serde_json::json!({}), None, None)
            .unwrap();
        let chain = db.event_chain(&event.id).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].id, event.id);
    }
}
