use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use lifeos_core::Result;
use lifeos_storage::{Database, EventRecord};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

pub const INTENT_RECEIVED: &str = "INTENT_RECEIVED";
pub const AGENT_SELECTED: &str = "AGENT_SELECTED";
pub const CONTEXT_FETCHED: &str = "CONTEXT_FETCHED";
pub const AGENT_RESPONSE: &str = "AGENT_RESPONSE";
pub const ACTIONS_APPLIED: &str = "ACTIONS_APPLIED";
pub const AUDIT_LOGGED: &str = "AUDIT_LOGGED";
pub const ERROR_OCCURRED: &str = "ERROR_OCCURRED";

/// Reacts to events after they are persisted. Handler failures are isolated:
/// they never fail the publish and never stop sibling handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &EventRecord) -> Result<()>;
}

/// Runs on every event before any handler. Middleware failures are logged
/// and skipped, same isolation as handlers.
#[async_trait]
pub trait EventMiddleware: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, event: &EventRecord) -> Result<()>;
}

/// Fields for one published event, minus the identity and timestamp the
/// store assigns.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub payload: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub parent_event_id: Option<String>,
}

/// Persist-first event bus: every published event is durable before any
/// middleware or handler sees it, so the audit trail does not depend on
/// subscriber health.
pub struct EventBus {
    db: Database,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    middleware: RwLock<Vec<Arc<dyn EventMiddleware>>>,
}

impl EventBus {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            handlers: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().unwrap();
        handlers
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    /// Remove every handler with the given name from one event type.
    pub fn unsubscribe(&self, event_type: &str, handler_name: &str) {
        let mut handlers = self.handlers.write().unwrap();
        if let Some(list) = handlers.get_mut(event_type) {
            list.retain(|h| h.name() != handler_name);
        }
    }

    pub fn add_middleware(&self, middleware: Arc<dyn EventMiddleware>) {
        self.middleware.write().unwrap().push(middleware);
    }

    pub async fn publish(&self, event_type: &str, event: NewEvent) -> Result<EventRecord> {
        self.publish_inner(event_type, event, true).await
    }

    /// `allow_error_chain` is false when publishing ERROR_OCCURRED itself:
    /// a failing error handler is logged but never spawns another error
    /// event, which bounds the recursion at depth one.
    fn publish_inner<'a>(
        &'a self,
        event_type: &'a str,
        event: NewEvent,
        allow_error_chain: bool,
    ) -> BoxFuture<'a, Result<EventRecord>> {
        async move {
            let record = self.db.insert_event(
                event_type,
                event.session_id.as_deref(),
                event.user_id.as_deref(),
                &event.payload,
                event.metadata.as_ref(),
                event.parent_event_id.as_deref(),
            )?;
            debug!(event = %record.id, event_type, "Event published");

            // Clone registries out of the locks; no guard is held across an
            // await point.
            let middleware: Vec<Arc<dyn EventMiddleware>> =
                self.middleware.read().unwrap().clone();
            for mw in middleware {
                if let Err(err) = mw.process(&record).await {
                    error!(middleware = mw.name(), error = %err, "Middleware failed");
                }
            }

            let handlers: Vec<Arc<dyn EventHandler>> = self
                .handlers
                .read()
                .unwrap()
                .get(event_type)
                .cloned()
                .unwrap_or_default();
            for handler in handlers {
                if let Err(err) = handler.handle(&record).await {
                    error!(
                        handler = handler.name(),
                        event = %record.id,
                        error = %err,
                        "Event handler failed"
                    );
                    if allow_error_chain {
                        let error_event = NewEvent {
                            session_id: record.session_id.clone(),
                            user_id: record.user_id.clone(),
                            payload: serde_json::json!({
                                "original_event_id": record.id,
                                "original_event_type": record.event_type,
                                "handler": handler.name(),
                                "error": err.to_string(),
                            }),
                            metadata: None,
                            parent_event_id: Some(record.id.clone()),
                        };
                        if let Err(err) =
                            self.publish_inner(ERROR_OCCURRED, error_event, false).await
                        {
                            error!(error = %err, "Failed to publish error event");
                        }
                    }
                }
            }

            Ok(record)
        }
        .boxed()
    }

    /// Parent chain of `event_id`, root first.
    pub fn event_chain(&self, event_id: &str) -> Result<Vec<EventRecord>> {
        self.db.event_chain(event_id)
    }
}
