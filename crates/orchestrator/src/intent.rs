use lifeos_core::types::ChatMessage;
use lifeos_core::Result;
use lifeos_providers::{ChatOptions, Provider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agents::{AgentKind, PLANNER_SENTINEL};
use crate::context::HistoryEntry;

/// Classification result for one inbound message. `primary_agent` is a wire
/// name; it may be the planner sentinel when no routable intent was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub primary_agent: String,
    pub confidence: f64,
    #[serde(default)]
    pub secondary_agents: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub is_multi_agent: bool,
}

impl IntentClassification {
    pub fn forced(agent: AgentKind) -> Self {
        Self {
            primary_agent: agent.as_str().to_string(),
            confidence: 1.0,
            secondary_agents: Vec::new(),
            reasoning: "Agent explicitly requested by caller".to_string(),
            is_multi_agent: false,
        }
    }
}

/// Routes messages to domain agents. An LLM does the classification when a
/// provider is configured; otherwise (or on any LLM failure) a deterministic
/// keyword scorer takes over, so classification itself never fails a turn.
pub struct IntentClassifier {
    provider: Option<Arc<dyn Provider>>,
    options: ChatOptions,
}

impl IntentClassifier {
    pub fn new(provider: Option<Arc<dyn Provider>>, options: ChatOptions) -> Self {
        Self { provider, options }
    }

    pub async fn classify(
        &self,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<IntentClassification> {
        let Some(provider) = &self.provider else {
            return Ok(Self::fallback(message));
        };

        match self.classify_llm(provider.as_ref(), message, history).await {
            Ok(classification) => Ok(classification),
            Err(err) => {
                warn!(error = %err, "LLM classification failed, using keyword fallback");
                Ok(Self::fallback(message))
            }
        }
    }

    async fn classify_llm(
        &self,
        provider: &dyn Provider,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<IntentClassification> {
        let messages = vec![
            ChatMessage::system(&Self::build_prompt(message, history)),
            ChatMessage::user(message),
        ];
        let response = provider.chat(&messages, self.options).await?;
        let json = strip_code_fences(&response.content);

        let classification: IntentClassification = serde_json::from_str(json)?;
        if AgentKind::from_str(&classification.primary_agent)
            .map(|kind| AgentKind::ROUTABLE.contains(&kind))
            != Some(true)
        {
            warn!(
                agent = %classification.primary_agent,
                "Classifier returned a non-routable agent, using keyword fallback"
            );
            return Ok(Self::fallback(message));
        }
        debug!(
            agent = %classification.primary_agent,
            confidence = classification.confidence,
            "Intent classified"
        );
        Ok(classification)
    }

    fn build_prompt(message: &str, history: &[HistoryEntry]) -> String {
        let mut catalogue = String::new();
        for kind in AgentKind::ROUTABLE {
            catalogue.push_str(&format!("- {}: {}\n", kind.as_str(), kind.capabilities()));
        }

        let mut recent = String::new();
        for entry in history.iter().rev().take(5).rev() {
            recent.push_str(&format!("{}: {}\n", entry.role, entry.content));
        }
        if recent.is_empty() {
            recent.push_str("(no prior messages)\n");
        }

        format!(
            "You are an intent classifier for a personal assistant. Analyze the user's \
             message and select the single best agent to handle it.\n\n\
             Available agents:\n{catalogue}\n\
             Recent conversation:\n{recent}\n\
             User message: {message}\n\n\
             Respond with ONLY a JSON object, no other text:\n\
             {{\"primary_agent\": \"<agent name>\", \"confidence\": <0.0-1.0>, \
             \"secondary_agents\": [], \"reasoning\": \"<one sentence>\", \
             \"is_multi_agent\": false}}"
        )
    }

    /// Deterministic keyword scoring. Each case-insensitive keyword hit is
    /// worth a third of full confidence, capped at 1.0; ties keep the first
    /// agent seen in routing order. Zero hits yield the planner sentinel.
    pub fn fallback(message: &str) -> IntentClassification {
        let lowered = message.to_lowercase();
        let mut best: Option<(AgentKind, usize)> = None;

        for kind in AgentKind::ROUTABLE {
            let hits = kind
                .keywords()
                .iter()
                .filter(|kw| lowered.contains(&kw.to_lowercase()))
                .count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((kind, hits));
            }
        }

        match best {
            Some((kind, hits)) => IntentClassification {
                primary_agent: kind.as_str().to_string(),
                confidence: (hits as f64 / 3.0).min(1.0),
                secondary_agents: Vec::new(),
                reasoning: format!("Keyword match ({} hits) for {}", hits, kind.as_str()),
                is_multi_agent: false,
            },
            None => IntentClassification {
                primary_agent: PLANNER_SENTINEL.to_string(),
                confidence: 0.3,
                secondary_agents: Vec::new(),
                reasoning: "Fallback classification - no clear intent detected".to_string(),
                is_multi_agent: false,
            },
        }
    }
}

/// Strip a Markdown code fence from an LLM reply, tolerating a `json`
/// language tag. Returns the inner text, or the input trimmed if unfenced.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
