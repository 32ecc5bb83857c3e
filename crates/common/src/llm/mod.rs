//! OpenAI-compatible chat completions client
//!
//! Shared by the query rewriter and the answer generator.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use backoff::{future::retry, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completions client
pub struct ChatClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { config, client })
    }

    /// Run a chat completion and return the first choice's text
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if self.config.api_key.is_empty() {
            // Mock response for development/testing
            return Ok(Self::mock_response(messages));
        }

        let start = Instant::now();
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(self.config.timeout_secs)),
            ..ExponentialBackoff::default()
        };

        let result = retry(backoff, || async {
            self.send(messages).await.map_err(|e| {
                // Client-side errors will not improve on retry
                let rejected = matches!(&e, AppError::LlmError { message } if message.starts_with("API error 4"));
                if rejected {
                    backoff::Error::permanent(e)
                } else {
                    warn!(error = %e, "Chat completion failed, retrying");
                    backoff::Error::transient(e)
                }
            })
        })
        .await;

        crate::metrics::record_llm_call(start.elapsed().as_secs_f64(), &self.config.model, result.is_ok());
        result
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self.client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LlmError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: format!("API error {}: {}", status.as_u16(), body),
            });
        }

        let chat_response: ChatResponse = response.json().await
            .map_err(|e| AppError::LlmError {
                message: format!("Failed to parse response: {}", e),
            })?;

        let text = chat_response.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::LlmError {
                message: "Empty response from LLM".to_string(),
            })?;

        debug!(chars = text.chars().count(), "Chat completion received");
        Ok(text)
    }

    /// Generate mock response for testing
    fn mock_response(messages: &[ChatMessage]) -> String {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.lines().last().unwrap_or_default().trim().to_string())
            .unwrap_or_default();

        format!("[Mock response - LLM API key not configured] {}", question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_completion_without_key() {
        let client = ChatClient::new(LlmConfig::default()).unwrap();
        let answer = client
            .complete(&[
                ChatMessage::system("You are helpful."),
                ChatMessage::user("Context...\nWho founded the republic?"),
            ])
            .await
            .unwrap();

        assert!(answer.starts_with("[Mock response"));
        assert!(answer.ends_with("Who founded the republic?"));
    }
}
