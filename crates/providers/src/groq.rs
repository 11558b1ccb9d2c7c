use async_trait::async_trait;
use futures::StreamExt;
use lifeos_core::types::{ChatMessage, LLMResponse};
use lifeos_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{ChatOptions, ChunkReceiver, Provider};

const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Find the largest byte index <= `max_bytes` that is a valid char boundary.
fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Client for Groq's OpenAI-compatible chat-completions API.
pub struct GroqProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl GroqProvider {
    pub fn new(api_key: &str, api_base: Option<&str>, model: &str) -> Self {
        let resolved_base = api_base
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using default");
                Client::new()
            });
        Self {
            client,
            api_key: api_key.to_string(),
            api_base: resolved_base,
            model: model.to_string(),
        }
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
        stream: bool,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        info!(
            url = %url,
            model = %self.model,
            messages_count = request.messages.len(),
            stream = request.stream,
            "Calling LLM"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "LLM API error");
            return Err(Error::Provider(format!("API error {}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for GroqProvider {
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<LLMResponse> {
        let request = self.build_request(messages, options, false);
        let response = self.send(&request).await?;

        let raw_body = response
            .text()
            .await
            .map_err(|e| Error::Provider(format!("Failed to read response: {}", e)))?;

        {
            let end = truncate_at_char_boundary(&raw_body, 500);
            debug!(body_len = raw_body.len(), preview = %&raw_body[..end], "LLM raw response");
        }

        let chat_response: ChatResponse = serde_json::from_str(&raw_body).map_err(|e| {
            let end = truncate_at_char_boundary(&raw_body, 500);
            Error::Provider(format!(
                "Failed to parse response: {}. Body: {}",
                e,
                &raw_body[..end]
            ))
        })?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("No choices in response".to_string()))?;

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: chat_response.usage.unwrap_or(Value::Null),
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChunkReceiver> {
        let request = self.build_request(messages, options, true);
        let response = self.send(&request).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut line_buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(Error::Provider(format!("Stream read failed: {}", e))))
                            .await;
                        return;
                    }
                };

                line_buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE events are newline-delimited; a partial line stays in
                // the buffer until the next network chunk completes it.
                while let Some(newline) = line_buffer.find('\n') {
                    let line: String = line_buffer.drain(..=newline).collect();
                    let line = line.trim();

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        return;
                    }

                    let Ok(chunk) = serde_json::from_str::<ChatStreamChunk>(data) else {
                        debug!(data = %data, "Skipping unparseable stream chunk");
                        continue;
                    };

                    for choice in chunk.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                                // Receiver dropped; stop producing.
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_at_char_boundary() {
        let s = "héllo";
        // 'é' spans bytes 1..3; index 2 is not a boundary
        assert_eq!(truncate_at_char_boundary(s, 2), 1);
        assert_eq!(truncate_at_char_boundary(s, 100), s.len());
    }

    #[test]
    fn test_parse_stream_chunk() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"},"index":0}]}"#;
        let chunk: ChatStreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));
    }

    #[test]
    fn test_parse_stream_chunk_without_content() {
        // Final chunks often carry only a finish_reason and an empty delta.
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop","index":0}]}"#;
        let chunk: ChatStreamChunk = serde_json::from_str(data).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn test_parse_buffered_response() {
        let body = r#"{
            "choices": [{"message": {"content": "hi"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("hi")
        );
    }

    #[test]
    fn test_api_base_trailing_slash_stripped() {
        let provider = GroqProvider::new("k", Some("https://example.com/v1/"), "m");
        assert_eq!(provider.api_base, "https://example.com/v1");
    }
}
