use lifeos_core::config::Config;
use lifeos_core::types::MessageRole;
use lifeos_core::{Error, Result};
use lifeos_providers::{ChatOptions, Provider};
use lifeos_storage::{Database, EventRecord, SessionRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::agents::AgentKind;
use crate::audit::AuditLogger;
use crate::bus::{
    EventBus, NewEvent, ACTIONS_APPLIED, AGENT_RESPONSE, AGENT_SELECTED, AUDIT_LOGGED,
    CONTEXT_FETCHED, ERROR_OCCURRED, INTENT_RECEIVED,
};
use crate::context::ContextManager;
use crate::intent::{IntentClassification, IntentClassifier};
use crate::runner::AgentRunner;

/// One inbound chat turn.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// Skip classification and route straight to the named agent.
    pub force_agent: Option<String>,
}

/// Result of one buffered turn. Routing misses and agent failures are
/// reported here with `success: false`; only infrastructure faults (storage,
/// malformed session id) surface as errors.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub success: bool,
    pub session_id: String,
    pub agent: Option<String>,
    pub response: Option<String>,
    pub classification: IntentClassification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_agents: Option<Vec<&'static str>>,
}

/// Frames of a streaming turn. Every stream carries exactly one terminal
/// frame: `Done` after a clean drain, `Error` otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    AgentSelected {
        session_id: String,
        agent: String,
        confidence: f64,
    },
    Chunk {
        content: String,
    },
    Done {
        session_id: String,
        agent: String,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        available_agents: Option<Vec<&'static str>>,
    },
}

/// Message pipeline: classify, route, assemble context, invoke the agent,
/// persist, audit. Every step is chained through the event bus so a turn
/// can be reconstructed from its leaf event.
pub struct Orchestrator {
    db: Database,
    bus: Arc<EventBus>,
    audit: AuditLogger,
    classifier: IntentClassifier,
    agents: HashMap<AgentKind, Arc<AgentRunner>>,
    history_limit: usize,
    stall_timeout: Duration,
}

struct RoutedTurn {
    session: SessionRecord,
    classification: IntentClassification,
    selected_event: EventRecord,
    agent: Option<AgentKind>,
}

impl Orchestrator {
    pub fn new(db: Database, provider: Arc<dyn Provider>, config: &Config) -> Self {
        let classifier_options = ChatOptions {
            temperature: config.classifier.temperature,
            max_tokens: config.classifier.max_tokens,
        };
        let agent_options = ChatOptions {
            temperature: config.agents.temperature,
            max_tokens: config.agents.max_tokens,
        };

        let agents = AgentKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    Arc::new(AgentRunner::new(kind, provider.clone(), agent_options)),
                )
            })
            .collect();

        Self {
            db: db.clone(),
            bus: Arc::new(EventBus::new(db.clone())),
            audit: AuditLogger::new(db),
            classifier: IntentClassifier::new(Some(provider), classifier_options),
            agents,
            history_limit: config.agents.history_limit,
            stall_timeout: Duration::from_secs(config.streaming.stall_timeout_secs),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn available_agents() -> Vec<&'static str> {
        AgentKind::implemented_names()
    }

    /// Delete a session and the transcripts every agent holds for it.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        for runner in self.agents.values() {
            runner.clear_transcript(session_id);
        }
        self.db.delete_session(session_id)
    }

    /// Run one buffered turn end to end.
    pub async fn handle_message(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let routed = self.route(&request).await?;
        let session_id = routed.session.id.clone();

        let Some(agent) = routed.agent else {
            return self.finish_routing_miss(&routed).await;
        };
        let runner = self.runner(agent)?;

        let manager = ContextManager::new(self.db.clone(), &session_id);
        manager.cleanup_expired()?;
        let context = manager.build_full_context(self.history_limit)?;
        let context_event = self
            .bus
            .publish(
                CONTEXT_FETCHED,
                NewEvent {
                    session_id: Some(session_id.clone()),
                    user_id: request.user_id.clone(),
                    payload: serde_json::json!({
                        "history_messages": context.conversation_history.len(),
                        "context_types": context.session_contexts.len(),
                    }),
                    parent_event_id: Some(routed.selected_event.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let response = match runner.invoke(&session_id, &request.message, &context).await {
            Ok(response) => response,
            Err(err) => {
                return self
                    .finish_agent_failure(&routed, agent, &context_event, err)
                    .await;
            }
        };

        self.finish_success(
            &routed,
            agent,
            &context_event,
            &request.message,
            &response.content,
        )
        .await
    }

    /// Run one streaming turn. Classification and routing happen before this
    /// returns; chunk delivery and the terminal frame arrive on the channel.
    pub async fn handle_message_stream(
        self: &Arc<Self>,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<StreamFrame>> {
        let routed = self.route(&request).await?;
        let (tx, rx) = mpsc::channel(32);

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.drive_stream(routed, request, tx).await;
        });
        Ok(rx)
    }

    async fn drive_stream(
        self: Arc<Self>,
        routed: RoutedTurn,
        request: TurnRequest,
        tx: mpsc::Sender<StreamFrame>,
    ) {
        let session_id = routed.session.id.clone();

        let Some(agent) = routed.agent else {
            let outcome = self.finish_routing_miss(&routed).await;
            let message = match outcome {
                Ok(outcome) => outcome.error.unwrap_or_else(|| "No agent available".to_string()),
                Err(err) => err.to_string(),
            };
            let _ = tx
                .send(StreamFrame::Error {
                    message,
                    available_agents: Some(Self::available_agents()),
                })
                .await;
            return;
        };
        let runner = match self.runner(agent) {
            Ok(runner) => runner,
            Err(err) => {
                let _ = tx
                    .send(StreamFrame::Error {
                        message: err.to_string(),
                        available_agents: None,
                    })
                    .await;
                return;
            }
        };

        let _ = tx
            .send(StreamFrame::AgentSelected {
                session_id: session_id.clone(),
                agent: agent.as_str().to_string(),
                confidence: routed.classification.confidence,
            })
            .await;

        let result = self
            .stream_turn(&routed, agent, runner, &request, &tx)
            .await;
        match result {
            Ok(()) => {
                let _ = tx
                    .send(StreamFrame::Done {
                        session_id,
                        agent: agent.as_str().to_string(),
                    })
                    .await;
            }
            Err(err) => {
                let _ = tx
                    .send(StreamFrame::Error {
                        message: err.to_string(),
                        available_agents: None,
                    })
                    .await;
            }
        }
    }

    /// Consume the chunk stream, forwarding each chunk. On a clean drain the
    /// accumulated reply goes through the same persistence and audit path as
    /// a buffered turn. Any chunk error or stall aborts the turn with
    /// nothing persisted.
    async fn stream_turn(
        &self,
        routed: &RoutedTurn,
        agent: AgentKind,
        runner: Arc<AgentRunner>,
        request: &TurnRequest,
        tx: &mpsc::Sender<StreamFrame>,
    ) -> Result<()> {
        let session_id = &routed.session.id;

        let manager = ContextManager::new(self.db.clone(), session_id);
        manager.cleanup_expired()?;
        let context = manager.build_full_context(self.history_limit)?;
        let context_event = self
            .bus
            .publish(
                CONTEXT_FETCHED,
                NewEvent {
                    session_id: Some(session_id.clone()),
                    user_id: request.user_id.clone(),
                    payload: serde_json::json!({
                        "history_messages": context.conversation_history.len(),
                        "context_types": context.session_contexts.len(),
                    }),
                    parent_event_id: Some(routed.selected_event.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let mut chunks = runner
            .invoke_stream(session_id, &request.message, &context)
            .await?;
        let mut accumulated = String::new();

        loop {
            match timeout(self.stall_timeout, chunks.recv()).await {
                Ok(Some(Ok(chunk))) => {
                    accumulated.push_str(&chunk);
                    if tx.send(StreamFrame::Chunk { content: chunk }).await.is_err() {
                        // Client went away; stop pulling and drop the turn.
                        warn!(session = %session_id, "Stream client disconnected");
                        return Err(Error::Other("client disconnected".to_string()));
                    }
                }
                Ok(Some(Err(err))) => {
                    let message = err.to_string();
                    self.finish_agent_failure(routed, agent, &context_event, err)
                        .await?;
                    return Err(Error::Other(message));
                }
                Ok(None) => break,
                Err(_) => {
                    let err = Error::Timeout(format!(
                        "no chunk within {}s",
                        self.stall_timeout.as_secs()
                    ));
                    let message = err.to_string();
                    self.finish_agent_failure(routed, agent, &context_event, err)
                        .await?;
                    return Err(Error::Other(message));
                }
            }
        }

        runner.commit_turn(session_id, &request.message, &accumulated);
        self.finish_success(routed, agent, &context_event, &request.message, &accumulated)
            .await?;
        Ok(())
    }

    /// Shared head of the pipeline: resolve the session, persist the user
    /// message, publish INTENT_RECEIVED, classify, publish AGENT_SELECTED.
    async fn route(&self, request: &TurnRequest) -> Result<RoutedTurn> {
        let session = match &request.session_id {
            Some(id) => self
                .db
                .get_session(id)?
                .ok_or_else(|| Error::Session(format!("Session not found: {}", id)))?,
            None => self.db.create_session(request.user_id.as_deref())?,
        };

        // Classifier history is the state before this turn.
        let manager = ContextManager::new(self.db.clone(), &session.id);
        let history = manager.conversation_history(5)?;

        self.db
            .append_message(&session.id, MessageRole::User, &request.message, None)?;

        let intent_event = self
            .bus
            .publish(
                INTENT_RECEIVED,
                NewEvent {
                    session_id: Some(session.id.clone()),
                    user_id: request.user_id.clone(),
                    payload: serde_json::json!({
                        "message": request.message,
                        "force_agent": request.force_agent,
                    }),
                    ..Default::default()
                },
            )
            .await?;

        self.audit.log_user_action(
            "chat_message",
            request.user_id.as_deref(),
            Some(&session.id),
            serde_json::json!({"length": request.message.len()}),
            Some(&intent_event.id),
        )?;

        let classification = match &request.force_agent {
            Some(name) => match AgentKind::from_str(name) {
                Some(kind) => IntentClassification::forced(kind),
                None => {
                    warn!(agent = %name, "Forced agent is not implemented");
                    IntentClassification {
                        primary_agent: name.clone(),
                        confidence: 0.0,
                        secondary_agents: Vec::new(),
                        reasoning: "Requested agent is not implemented".to_string(),
                        is_multi_agent: false,
                    }
                }
            },
            None => self.classifier.classify(&request.message, &history).await?,
        };

        let selected_event = self
            .bus
            .publish(
                AGENT_SELECTED,
                NewEvent {
                    session_id: Some(session.id.clone()),
                    user_id: request.user_id.clone(),
                    payload: serde_json::to_value(&classification)?,
                    parent_event_id: Some(intent_event.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let agent = AgentKind::from_str(&classification.primary_agent)
            .filter(|kind| self.agents.contains_key(kind));

        Ok(RoutedTurn {
            session,
            classification,
            selected_event,
            agent,
        })
    }

    fn runner(&self, agent: AgentKind) -> Result<Arc<AgentRunner>> {
        self.agents
            .get(&agent)
            .cloned()
            .ok_or_else(|| Error::UnknownAgent(agent.as_str().to_string()))
    }

    /// Routing miss: the classification produced no implemented agent. The
    /// turn ends as a structured failure listing what is available.
    async fn finish_routing_miss(&self, routed: &RoutedTurn) -> Result<TurnOutcome> {
        let session_id = &routed.session.id;
        let message = format!(
            "No implemented agent for intent '{}'",
            routed.classification.primary_agent
        );
        warn!(session = %session_id, intent = %routed.classification.primary_agent, "Routing miss");

        self.bus
            .publish(
                ERROR_OCCURRED,
                NewEvent {
                    session_id: Some(session_id.clone()),
                    payload: serde_json::json!({
                        "error": message,
                        "intent": routed.classification.primary_agent,
                        "available_agents": Self::available_agents(),
                    }),
                    parent_event_id: Some(routed.selected_event.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(TurnOutcome {
            success: false,
            session_id: session_id.clone(),
            agent: None,
            response: None,
            classification: routed.classification.clone(),
            error: Some(message),
            available_agents: Some(Self::available_agents()),
        })
    }

    /// Agent invocation failed: audit the failure, chain an error event, and
    /// report a structured failure with no partial reply persisted.
    async fn finish_agent_failure(
        &self,
        routed: &RoutedTurn,
        agent: AgentKind,
        context_event: &EventRecord,
        err: Error,
    ) -> Result<TurnOutcome> {
        let session_id = &routed.session.id;
        let message = err.to_string();
        warn!(session = %session_id, agent = agent.as_str(), error = %message, "Agent turn failed");

        let error_event = self
            .bus
            .publish(
                ERROR_OCCURRED,
                NewEvent {
                    session_id: Some(session_id.clone()),
                    payload: serde_json::json!({
                        "error": message,
                        "agent": agent.as_str(),
                    }),
                    parent_event_id: Some(context_event.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        self.audit.log_agent_action(
            agent.as_str(),
            "respond",
            Some(session_id),
            serde_json::json!({}),
            false,
            Some(&message),
            Some(&error_event.id),
        )?;

        Ok(TurnOutcome {
            success: false,
            session_id: session_id.clone(),
            agent: Some(agent.as_str().to_string()),
            response: None,
            classification: routed.classification.clone(),
            error: Some(message),
            available_agents: None,
        })
    }

    /// Tail of a successful turn: persist the reply, chain the remaining
    /// events, audit the agent action.
    async fn finish_success(
        &self,
        routed: &RoutedTurn,
        agent: AgentKind,
        context_event: &EventRecord,
        user_message: &str,
        reply: &str,
    ) -> Result<TurnOutcome> {
        let session_id = &routed.session.id;

        self.db.append_message(
            session_id,
            MessageRole::Agent,
            reply,
            Some(&serde_json::json!({"agent": agent.as_str()})),
        )?;
        self.db.touch_session(session_id, Some(agent.as_str()))?;

        let response_event = self
            .bus
            .publish(
                AGENT_RESPONSE,
                NewEvent {
                    session_id: Some(session_id.clone()),
                    payload: serde_json::json!({
                        "agent": agent.as_str(),
                        "response_length": reply.len(),
                    }),
                    parent_event_id: Some(context_event.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        // Side-effect actions (reminders, list mutations) are not yet
        // extracted from replies; the step exists so chains keep their shape.
        let actions_event = self
            .bus
            .publish(
                ACTIONS_APPLIED,
                NewEvent {
                    session_id: Some(session_id.clone()),
                    payload: serde_json::json!({"actions": []}),
                    parent_event_id: Some(response_event.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let audit_record = self.audit.log_agent_action(
            agent.as_str(),
            "respond",
            Some(session_id),
            serde_json::json!({
                "message_length": user_message.len(),
                "response_length": reply.len(),
            }),
            true,
            None,
            Some(&response_event.id),
        )?;

        self.bus
            .publish(
                AUDIT_LOGGED,
                NewEvent {
                    session_id: Some(session_id.clone()),
                    payload: serde_json::json!({"audit_id": audit_record.id}),
                    parent_event_id: Some(actions_event.id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            session = %session_id,
            agent = agent.as_str(),
            "Turn completed"
        );

        Ok(TurnOutcome {
            success: true,
            session_id: session_id.clone(),
            agent: Some(agent.as_str().to_string()),
            response: Some(reply.to_string()),
            classification: routed.classification.clone(),
            error: None,
            available_agents: None,
        })
    }
}
