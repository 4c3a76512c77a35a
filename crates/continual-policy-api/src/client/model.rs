//! OpenAI-compatible chat-completions model client
//!
//! Sends the system and user prompts as a two-message chat, asks for a JSON
//! object response and parses the first choice's content. The client never
//! retries; retry-until-valid belongs to the invocation loop.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use continual_policy_core::{ModelError, ModelInvoker};

use crate::config::ModelConfig;
use crate::error::{Result, ServiceError};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    response_format: ResponseFormat,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// HTTP model client
pub struct HttpModelInvoker {
    client: Client,
    config: ModelConfig,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpModelInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModelInvoker")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field("authenticated", &self.api_key.is_some())
            .finish()
    }
}

impl HttpModelInvoker {
    /// Build a client, reading the API key from `config.api_key_env` if set
    pub fn new(config: ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty());
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: ModelConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ServiceError::config(format!("failed to build HTTP client: {}", e)))?;

        if api_key.is_none() {
            tracing::warn!(
                api_key_env = %config.api_key_env,
                "No model API key found, sending unauthenticated requests"
            );
        }

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(self.config.timeout_ms)
        } else {
            ModelError::Transport(err.to_string())
        }
    }
}

/// Strip a surrounding markdown code fence, if any
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            body.strip_suffix("```").unwrap_or(body).trim()
        }
        None => trimmed,
    }
}

#[async_trait]
impl ModelInvoker for HttpModelInvoker {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> std::result::Result<Value, ModelError> {
        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ModelError::Unavailable(format!(
                "authentication failed: {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = %status,
                endpoint = %self.config.endpoint,
                "Model request failed"
            );
            return Err(ModelError::Transport(format!(
                "unexpected status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("malformed completion: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("completion has no content".to_string()))?;

        serde_json::from_str(strip_code_fence(&content))
            .map_err(|e| ModelError::InvalidResponse(format!("content is not JSON: {}", e)))
    }
}
