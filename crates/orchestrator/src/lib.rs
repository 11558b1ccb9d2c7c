pub mod agents;
pub mod audit;
pub mod bus;
pub mod context;
pub mod intent;
pub mod orchestrator;
pub mod runner;

#[cfg(test)]
mod testing;

pub use agents::AgentKind;
pub use audit::AuditLogger;
pub use bus::{EventBus, EventHandler, EventMiddleware, NewEvent};
pub use context::{ContextManager, FullContext};
pub use intent::{IntentClassification, IntentClassifier};
pub use orchestrator::{Orchestrator, StreamFrame, TurnOutcome, TurnRequest};
pub use runner::AgentRunner;
