use lifeos_core::Result;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{now_timestamp, Database};

/// Append-only audit record. No update or delete path exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub action_type: String,
    pub action: String,
    pub details: serde_json::Value,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub event_id: Option<String>,
    pub resource: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Fields for one audit entry, filled in by the audit logger facade.
#[derive(Debug, Clone, Default)]
pub struct NewAuditEntry {
    pub action_type: String,
    pub action: String,
    pub details: serde_json::Value,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub event_id: Option<String>,
    pub resource: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

fn map_audit(row: &Row) -> rusqlite::Result<AuditRecord> {
    let details_str: String = row.get(3)?;
    Ok(AuditRecord {
        id: row.get(0)?,
        action_type: row.get(1)?,
        action: row.get(2)?,
        details: serde_json::from_str(&details_str).unwrap_or(serde_json::Value::Null),
        user_id: row.get(4)?,
        session_id: row.get(5)?,
        event_id: row.get(6)?,
        resource: row.get(7)?,
        ip_address: row.get(8)?,
        user_agent: row.get(9)?,
        success: row.get::<_, i64>(10)? != 0,
        error_message: row.get(11)?,
        created_at: row.get(12)?,
    })
}

impl Database {
    pub fn insert_audit(&self, entry: NewAuditEntry) -> Result<AuditRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        // Successful actions never carry an error message.
        let error_message = if entry.success { None } else { entry.error_message };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_log \
             (id, action_type, action, details, user_id, session_id, event_id, resource, \
              ip_address, user_agent, success, error_message, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id,
                entry.action_type,
                entry.action,
                entry.details.to_string(),
                entry.user_id,
                entry.session_id,
                entry.event_id,
                entry.resource,
                entry.ip_address,
                entry.user_agent,
                entry.success as i64,
                error_message,
                now
            ],
        )?;
        Ok(AuditRecord {
            id,
            action_type: entry.action_type,
            action: entry.action,
            details: entry.details,
            user_id: entry.user_id,
            session_id: entry.session_id,
            event_id: entry.event_id,
            resource: entry.resource,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            success: entry.success,
            error_message,
            created_at: now,
        })
    }

    pub fn list_audit(&self, session_id: Option<&str>) -> Result<Vec<AuditRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut records = Vec::new();
        match session_id {
            Some(sid) => {
                let mut stmt = conn.prepare(
                    "SELECT id, action_type, action, details, user_id, session_id, event_id, \
                     resource, ip_address, user_agent, success, error_message, created_at \
                     FROM audit_log WHERE session_id = ?1 ORDER BY created_at, rowid",
                )?;
                let rows = stmt.query_map(params![sid], map_audit)?;
                for row in rows {
                    records.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, action_type, action, details, user_id, session_id, event_id, \
                     resource, ip_address, user_agent, success, error_message, created_at \
                     FROM audit_log ORDER BY created_at, rowid",
                )?;
                let rows = stmt.query_map([], map_audit)?;
                for row in rows {
                    records.push(row?);
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_list() {
        let db = Database::open_in_memory().unwrap();
        let record = db
            .insert_audit(NewAuditEntry {
                action_type: "USER_ACTION".to_string(),
                action: "chat_message".to_string(),
                details: serde_json::json!({"length": 12}),
                user_id: Some("alice".to_string()),
                success: true,
                ..Default::default()
            })
            .unwrap();
        assert!(record.success);

        let all = db.list_audit(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].action, "chat_message");
    }

    #[test]
    fn test_success_drops_error_message() {
        let db = Database::open_in_memory().unwrap();
        let record = db
            .insert_audit(NewAuditEntry {
                action_type: "AGENT_ACTION".to_string(),
                action: "respond".to_string(),
                details: serde_json::json!({}),
                success: true,
                error_message: Some("stale".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_failure_keeps_error_message() {
        let db = Database::open_in_memory().unwrap();
        let record = db
            .insert_audit(NewAuditEntry {
                action_type: "AGENT_ACTION".to_string(),
                action: "respond".to_string(),
                details: serde_json::json!({}),
                success: false,
                error_message: Some("backend unreachable".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(record.error_message.as_deref(), Some("backend unreachable"));
    }

    #[test]
    fn test_audit_survives_session_deletion() {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();
        db.insert_audit(NewAuditEntry {
            action_type: "AGENT_ACTION".to_string(),
            action: "respond".to_string(),
            details: serde_json::json!({}),
            session_id: Some(session.id.clone()),
            success: true,
            ..Default::default()
        })
        .unwrap();

        db.delete_session(&session.id).unwrap();
        assert_eq!(db.list_audit(Some(&session.id)).unwrap().len(), 1);
    }
}
