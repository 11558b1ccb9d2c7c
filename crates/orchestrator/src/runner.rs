use lifeos_core::types::{ChatMessage, LLMResponse};
use lifeos_core::Result;
use lifeos_providers::{ChatOptions, ChunkReceiver, Provider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::agents::AgentKind;
use crate::context::FullContext;

/// Cap on the in-memory transcript per session, counted in messages. Oldest
/// turns fall off first; the durable message table is unaffected.
const TRANSCRIPT_CAP: usize = 20;

/// One domain agent: a system instruction, a provider handle, and in-memory
/// per-session transcripts. Transcripts are working state for prompt
/// assembly; the durable conversation lives in the message table.
pub struct AgentRunner {
    kind: AgentKind,
    provider: Arc<dyn Provider>,
    options: ChatOptions,
    transcripts: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl AgentRunner {
    pub fn new(kind: AgentKind, provider: Arc<dyn Provider>, options: ChatOptions) -> Self {
        Self {
            kind,
            provider,
            options,
            transcripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// Buffered turn: returns the complete reply and commits both sides of
    /// the exchange to the transcript. A failed call commits nothing.
    pub async fn invoke(
        &self,
        session_id: &str,
        message: &str,
        context: &FullContext,
    ) -> Result<LLMResponse> {
        let messages = self.assemble(session_id, message, context);
        let response = self.provider.chat(&messages, self.options).await?;
        self.commit_turn(session_id, message, &response.content);
        Ok(response)
    }

    /// Streaming turn: hands back the raw chunk stream. The caller is
    /// responsible for accumulating chunks and calling `commit_turn` once
    /// the stream finished cleanly.
    pub async fn invoke_stream(
        &self,
        session_id: &str,
        message: &str,
        context: &FullContext,
    ) -> Result<ChunkReceiver> {
        let messages = self.assemble(session_id, message, context);
        self.provider.chat_stream(&messages, self.options).await
    }

    /// Append one completed exchange to the session transcript.
    pub fn commit_turn(&self, session_id: &str, user_message: &str, reply: &str) {
        let mut transcripts = self.transcripts.lock().unwrap();
        let transcript = transcripts.entry(session_id.to_string()).or_default();
        transcript.push(ChatMessage::user(user_message));
        transcript.push(ChatMessage::assistant(reply));
        if transcript.len() > TRANSCRIPT_CAP {
            let excess = transcript.len() - TRANSCRIPT_CAP;
            transcript.drain(..excess);
        }
        debug!(
            agent = self.kind.as_str(),
            session = session_id,
            len = transcript.len(),
            "Transcript updated"
        );
    }

    pub fn clear_transcript(&self, session_id: &str) {
        self.transcripts.lock().unwrap().remove(session_id);
    }

    fn assemble(&self, session_id: &str, message: &str, context: &FullContext) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(&format!(
            "{}\n\n{}",
            self.kind.system_instruction(),
            context_preamble(context)
        ))];
        if let Some(transcript) = self.transcripts.lock().unwrap().get(session_id) {
            messages.extend(transcript.iter().cloned());
        }
        messages.push(ChatMessage::user(message));
        messages
    }
}

/// Render the context bundle as a prompt section the model can use.
fn context_preamble(context: &FullContext) -> String {
    let temporal = &context.temporal_context;
    let mut preamble = format!(
        "Current context:\n- It is {} on {}, {} ({}).",
        temporal.time_of_day,
        temporal.day_of_week,
        temporal.date,
        if temporal.is_weekend { "weekend" } else { "weekday" },
    );
    if !context.user_preferences.is_empty() {
        preamble.push_str(&format!(
            "\n- User preferences: {}",
            serde_json::Value::Object(
                context
                    .user_preferences
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            )
        ));
    }
    preamble
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextManager, FullContext};
    use crate::testing::MockProvider;
    use lifeos_storage::Database;
    use std::collections::BTreeMap;

    fn empty_context() -> FullContext {
        let db = Database::open_in_memory().unwrap();
        let session = db.create_session(None).unwrap();
        ContextManager::new(db, &session.id)
            .build_full_context(10)
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_commits_transcript() {
        let provider = MockProvider::new(vec![Ok("first reply".to_string())]);
        let runner = AgentRunner::new(
            AgentKind::Study,
            provider.clone(),
            ChatOptions::default(),
        );
        let context = empty_context();

        let response = runner.invoke("s1", "teach me sorting", &context).await.unwrap();
        assert_eq!(response.content, "first reply");

        // Next assembly carries the committed exchange.
        let messages = runner.assemble("s1", "and searching?", &context);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "teach me sorting");
        assert_eq!(messages[2].content, "first reply");
    }

    #[tokio::test]
    async fn test_failed_invoke_commits_nothing() {
        let provider = MockProvider::new(vec![Err(lifeos_core::Error::Provider(
            "down".to_string(),
        ))]);
        let runner = AgentRunner::new(
            AgentKind::Study,
            provider,
            ChatOptions::default(),
        );
        let context = empty_context();

        assert!(runner.invoke("s1", "hello", &context).await.is_err());
        let messages = runner.assemble("s1", "again", &context);
        // system + new user message only
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn test_transcripts_are_per_session() {
        let provider = MockProvider::new(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
        ]);
        let runner = AgentRunner::new(
            AgentKind::Wellness,
            provider,
            ChatOptions::default(),
        );
        let context = empty_context();

        runner.invoke("s1", "one", &context).await.unwrap();
        runner.invoke("s2", "two", &context).await.unwrap();

        assert_eq!(runner.assemble("s1", "next", &context).len(), 4);
        runner.clear_transcript("s1");
        assert_eq!(runner.assemble("s1", "next", &context).len(), 2);
        assert_eq!(runner.assemble("s2", "next", &context).len(), 4);
    }

    #[test]
    fn test_transcript_cap() {
        let provider = MockProvider::new(vec![]);
        let runner = AgentRunner::new(
            AgentKind::Productivity,
            provider,
            ChatOptions::default(),
        );
        for i in 0..30 {
            runner.commit_turn("s1", &format!("u{}", i), &format!("a{}", i));
        }
        let transcripts = runner.transcripts.lock().unwrap();
        let transcript = &transcripts["s1"];
        assert_eq!(transcript.len(), TRANSCRIPT_CAP);
        assert_eq!(transcript.last().unwrap().content, "a29");
    }

    #[test]
    fn test_context_preamble_mentions_preferences() {
        let mut context = empty_context();
        context
            .user_preferences
            .insert("diet".to_string(), serde_json::json!("vegan"));
        let preamble = context_preamble(&context);
        assert!(preamble.contains("diet"));
        assert!(preamble.contains("vegan"));

        let bare = FullContext {
            user_preferences: BTreeMap::new(),
            ..context
        };
        assert!(!context_preamble(&bare).contains("preferences"));
    }
}
