use async_trait::async_trait;
use lifeos_core::types::{ChatMessage, LLMResponse};
use lifeos_core::{Error, Result};
use lifeos_providers::{ChatOptions, ChunkReceiver, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Scripted provider for pipeline tests: pops replies in order and counts
/// calls so tests can assert how many LLM round trips a turn cost.
pub struct MockProvider {
    replies: Mutex<Vec<Result<String>>>,
    pub calls: AtomicUsize,
    pub last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockProvider {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Result<String> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(Error::Provider("mock provider exhausted".to_string()));
        }
        replies.remove(0)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chat(&self, messages: &[ChatMessage], _options: ChatOptions) -> Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        let content = self.next_reply()?;
        Ok(LLMResponse {
            content,
            finish_reason: "stop".to_string(),
            usage: serde_json::Value::Null,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        _options: ChatOptions,
    ) -> Result<ChunkReceiver> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        // Keep the scripted error so it surfaces as a chunk failure rather
        // than a failure to open the stream.
        let reply = self.next_reply();
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            match reply {
                Ok(content) => {
                    // Split into word chunks so accumulation is exercised.
                    for chunk in content.split_inclusive(' ') {
                        if tx.send(Ok(chunk.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                }
            }
        });
        Ok(rx)
    }
}
