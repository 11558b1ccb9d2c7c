pub mod factory;
pub mod groq;

use async_trait::async_trait;
use lifeos_core::types::{ChatMessage, LLMResponse};
use lifeos_core::Result;
use tokio::sync::mpsc;

/// Sampling parameters for one LLM call. Classification and generation use
/// the same provider instance with different options.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 8000,
        }
    }
}

/// A chunk stream from a streaming completion. Chunk boundaries carry no
/// semantic meaning; the channel closes after the terminal chunk or error.
pub type ChunkReceiver = mpsc::Receiver<Result<String>>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Buffered completion: the full assistant message, or an error with no
    /// partial output.
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<LLMResponse>;

    /// Streaming completion: text chunks as the backend produces them.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChunkReceiver>;
}

pub use factory::create_provider;
pub use groq::GroqProvider;
