use lifeos_core::Result;
use lifeos_storage::{AuditRecord, Database, NewAuditEntry};
use tracing::info;

pub const USER_ACTION: &str = "USER_ACTION";
pub const AGENT_ACTION: &str = "AGENT_ACTION";
pub const AUTHENTICATION: &str = "AUTHENTICATION";

/// Thin facade over the append-only audit table. Categorizes entries so
/// callers never hand-write action types.
#[derive(Clone)]
pub struct AuditLogger {
    db: Database,
}

impl AuditLogger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Write an arbitrary audit entry. The convenience wrappers below fix
    /// the action type for the common cases.
    pub fn log(&self, entry: NewAuditEntry) -> Result<AuditRecord> {
        self.db.insert_audit(entry)
    }

    pub fn log_user_action(
        &self,
        action: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
        details: serde_json::Value,
        event_id: Option<&str>,
    ) -> Result<AuditRecord> {
        let record = self.db.insert_audit(NewAuditEntry {
            action_type: USER_ACTION.to_string(),
            action: action.to_string(),
            details,
            user_id: user_id.map(|s| s.to_string()),
            session_id: session_id.map(|s| s.to_string()),
            event_id: event_id.map(|s| s.to_string()),
            success: true,
            ..Default::default()
        })?;
        info!(action, user = ?user_id, "User action audited");
        Ok(record)
    }

    pub fn log_agent_action(
        &self,
        agent: &str,
        action: &str,
        session_id: Option<&str>,
        details: serde_json::Value,
        success: bool,
        error_message: Option<&str>,
        event_id: Option<&str>,
    ) -> Result<AuditRecord> {
        let record = self.db.insert_audit(NewAuditEntry {
            action_type: AGENT_ACTION.to_string(),
            action: action.to_string(),
            details,
            session_id: session_id.map(|s| s.to_string()),
            event_id: event_id.map(|s| s.to_string()),
            resource: Some(agent.to_string()),
            success,
            error_message: error_message.map(|s| s.to_string()),
            ..Default::default()
        })?;
        info!(agent, action, success, "Agent action audited");
        Ok(record)
    }

    pub fn log_authentication(
        &self,
        user_id: Option<&str>,
        success: bool,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<AuditRecord> {
        let action = if success { "login_success" } else { "login_failure" };
        let record = self.db.insert_audit(NewAuditEntry {
            action_type: AUTHENTICATION.to_string(),
            action: action.to_string(),
            details: serde_json::Value::Null,
            user_id: user_id.map(|s| s.to_string()),
            ip_address: ip_address.map(|s| s.to_string()),
            user_agent: user_agent.map(|s| s.to_string()),
            success,
            error_message: error_message.map(|s| s.to_string()),
            ..Default::default()
        })?;
        info!(user = ?user_id, success, "Authentication audited");
        Ok(record)
    }

    pub fn entries(&self, session_id: Option<&str>) -> Result<Vec<AuditRecord>> {
        self.db.list_audit(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> (Database, AuditLogger) {
        let db = Database::open_in_memory().unwrap();
        (db.clone(), AuditLogger::new(db))
    }

    #[test]
    fn test_user_action_category() {
        let (_db, logger) = logger();
        let record = logger
            .log_user_action(
                "chat_message",
                Some("alice"),
                Some("s1"),
                serde_json::json!({"length": 5}),
                None,
            )
            .unwrap();
        assert_eq!(record.action_type, USER_ACTION);
        assert!(record.success);
    }

    #[test]
    fn test_agent_action_records_resource() {
        let (_db, logger) = logger();
        let record = logger
            .log_agent_action(
                "wellness_agent",
                "respond",
                Some("s1"),
                serde_json::json!({}),
                false,
                Some("backend unreachable"),
                None,
            )
            .unwrap();
        assert_eq!(record.resource.as_deref(), Some("wellness_agent"));
        assert!(!record.success);
        assert_eq!(record.error_message.as_deref(), Some("backend unreachable"));
    }

    #[test]
    fn test_authentication_action_name_tracks_outcome() {
        let (_db, logger) = logger();
        let ok = logger
            .log_authentication(Some("alice"), true, Some("127.0.0.1"), None, None)
            .unwrap();
        assert_eq!(ok.action, "login_success");

        let bad = logger
            .log_authentication(None, false, Some("127.0.0.1"), None, Some("bad token"))
            .unwrap();
        assert_eq!(bad.action, "login_failure");
        assert_eq!(bad.error_message.as_deref(), Some("bad token"));
    }

    #[test]
    fn test_entries_filter_by_session() {
        let (_db, logger) = logger();
        logger
            .log_user_action("a", None, Some("s1"), serde_json::Value::Null, None)
            .unwrap();
        logger
            .log_user_action("b", None, Some("s2"), serde_json::Value::Null, None)
            .unwrap();
        assert_eq!(logger.entries(Some("s1")).unwrap().len(), 1);
        assert_eq!(logger.entries(None).unwrap().len(), 2);
    }
}
