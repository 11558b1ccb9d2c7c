use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use lifeos_core::Result;
use lifeos_storage::{ContextRecord, Database};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Context type under which user preferences are stored.
pub const USER_PREFERENCES: &str = "USER_PREFERENCES";

/// One prior turn, as handed to the classifier and the context bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalContext {
    pub timestamp: String,
    pub time_of_day: String,
    pub day_of_week: String,
    pub date: String,
    pub hour: u32,
    pub is_weekend: bool,
}

/// The consolidated bundle assembled for one orchestration turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullContext {
    pub conversation_history: Vec<HistoryEntry>,
    pub user_preferences: BTreeMap<String, serde_json::Value>,
    pub temporal_context: TemporalContext,
    pub session_contexts: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

/// Per-session view over the durable store: typed context entries plus
/// conversation-history retrieval.
pub struct ContextManager {
    db: Database,
    session_id: String,
}

fn time_of_day(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

impl ContextManager {
    pub fn new(db: Database, session_id: &str) -> Self {
        Self {
            db,
            session_id: session_id.to_string(),
        }
    }

    /// Non-expired context entries grouped as type -> key -> value.
    pub fn get_context(
        &self,
        context_type: Option<&str>,
    ) -> Result<BTreeMap<String, BTreeMap<String, serde_json::Value>>> {
        let records = self.db.get_contexts(&self.session_id, context_type)?;
        let mut grouped: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
        for record in records {
            grouped
                .entry(record.context_type)
                .or_default()
                .insert(record.key, record.value);
        }
        Ok(grouped)
    }

    /// Upsert one entry; `ttl_hours` of None means the entry never expires.
    pub fn set_context(
        &self,
        context_type: &str,
        key: &str,
        value: &serde_json::Value,
        ttl_hours: Option<i64>,
    ) -> Result<ContextRecord> {
        let expires_at = ttl_hours.map(|hours| Utc::now() + Duration::hours(hours));
        self.db
            .upsert_context(&self.session_id, context_type, key, value, expires_at)
    }

    /// Last `limit` messages, oldest-first.
    pub fn conversation_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let messages = self.db.recent_messages(&self.session_id, limit)?;
        Ok(messages
            .into_iter()
            .map(|m| HistoryEntry {
                role: m.role.as_str().to_string(),
                content: m.content,
                timestamp: m.created_at,
            })
            .collect())
    }

    pub fn user_preferences(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        let mut grouped = self.get_context(Some(USER_PREFERENCES))?;
        Ok(grouped.remove(USER_PREFERENCES).unwrap_or_default())
    }

    pub fn set_user_preference(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.set_context(USER_PREFERENCES, key, value, None)?;
        Ok(())
    }

    pub fn temporal_context(&self) -> TemporalContext {
        Self::temporal_context_at(Utc::now())
    }

    fn temporal_context_at(now: DateTime<Utc>) -> TemporalContext {
        TemporalContext {
            timestamp: now.to_rfc3339(),
            time_of_day: time_of_day(now.hour()).to_string(),
            day_of_week: now.format("%A").to_string(),
            date: now.format("%Y-%m-%d").to_string(),
            hour: now.hour(),
            is_weekend: matches!(now.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun),
        }
    }

    /// Assemble the bundle handed to each orchestration turn.
    pub fn build_full_context(&self, history_limit: usize) -> Result<FullContext> {
        let context = FullContext {
            conversation_history: self.conversation_history(history_limit)?,
            user_preferences: self.user_preferences()?,
            temporal_context: self.temporal_context(),
            session_contexts: self.get_context(None)?,
        };
        debug!(
            session = %self.session_id,
            history = context.conversation_history.len(),
            context_types = context.session_contexts.len(),
            "Context bundle built"
        );
        Ok(context)
    }

    /// Delete expired entries for this session. Idempotent.
    pub fn cleanup_expired(&self) -> Result<usize> {
        self.db.cleanup_expired_contexts(&self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lifeos_core::types::MessageRole;

    fn manager() -> (Database, ContextManager) {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();
        let manager = ContextManager::new(db.clone(), &session.id);
        (db, manager)
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(time_of_day(5), "morning");
        assert_eq!(time_of_day(11), "morning");
        assert_eq!(time_of_day(12), "afternoon");
        assert_eq!(time_of_day(16), "afternoon");
        assert_eq!(time_of_day(17), "evening");
        assert_eq!(time_of_day(20), "evening");
        assert_eq!(time_of_day(21), "night");
        assert_eq!(time_of_day(4), "night");
        assert_eq!(time_of_day(0), "night");
    }

    #[test]
    fn test_temporal_context_weekend() {
        // 2026-08-29 is a Saturday
        let saturday = Utc.with_ymd_and_hms(2026, 8, 29, 14, 0, 0).unwrap();
        let ctx = ContextManager::temporal_context_at(saturday);
        assert!(ctx.is_weekend);
        assert_eq!(ctx.day_of_week, "Saturday");
        assert_eq!(ctx.time_of_day, "afternoon");
        assert_eq!(ctx.date, "2026-08-29");

        let monday = Utc.with_ymd_and_hms(2026, 8, 31, 8, 0, 0).unwrap();
        assert!(!ContextManager::temporal_context_at(monday).is_weekend);
    }

    #[test]
    fn test_set_and_get_context_grouping() {
        let (_db, manager) = manager();
        manager
            .set_context("USER_PREFERENCES", "diet", &serde_json::json!("vegan"), None)
            .unwrap();
        manager
            .set_context("TEMPORAL", "tz", &serde_json::json!("UTC"), Some(2))
            .unwrap();

        let all = manager.get_context(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["USER_PREFERENCES"]["diet"], serde_json::json!("vegan"));

        let filtered = manager.get_context(Some("TEMPORAL")).unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_user_preferences_shortcut() {
        let (_db, manager) = manager();
        manager
            .set_user_preference("focus_hours", &serde_json::json!([9, 12]))
            .unwrap();
        let prefs = manager.user_preferences().unwrap();
        assert_eq!(prefs["focus_hours"], serde_json::json!([9, 12]));
    }

    #[test]
    fn test_full_context_shape() {
        let (db, manager) = manager();
        let session_id = db.list_sessions(None).unwrap()[0].id.clone();
        db.append_message(&session_id, MessageRole::User, "hello", None)
            .unwrap();
        db.append_message(&session_id, MessageRole::Agent, "hi there", None)
            .unwrap();
        manager
            .set_user_preference("diet", &serde_json::json!("keto"))
            .unwrap();

        let full = manager.build_full_context(10).unwrap();
        assert_eq!(full.conversation_history.len(), 2);
        assert_eq!(full.conversation_history[0].role, "user");
        assert_eq!(full.conversation_history[1].role, "agent");
        assert_eq!(full.user_preferences["diet"], serde_json::json!("keto"));
        assert!(full.session_contexts.contains_key(USER_PREFERENCES));
    }

    #[test]
    fn test_history_limit_and_order() {
        let (db, manager) = manager();
        let session_id = db.list_sessions(None).unwrap()[0].id.clone();
        for i in 0..6 {
            db.append_message(&session_id, MessageRole::User, &format!("m{}", i), None)
                .unwrap();
        }

        let history = manager.conversation_history(4).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "m2");
        assert_eq!(history[3].content, "m5");
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
