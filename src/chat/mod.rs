//! Chat completion client shared by every generation stage.
//!
//! The contextualizer, answer synthesizer, and follow-up generator all speak to the same
//! OpenAI-compatible `/chat/completions` endpoint; they differ only in the messages, sampling
//! parameters, and output mode carried by [`CompletionRequest`].

use crate::config::Config;
use crate::upstream::{UpstreamError, format_endpoint, send_json};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const SERVICE: &str = "chat-completion";

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instruction channel.
    System,
    /// Human side of the conversation.
    User,
    /// Model side of the conversation.
    Assistant,
}

/// Single message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: ChatRole,
    /// Message body.
    pub content: String,
}

impl ChatMessage {
    /// Instruction message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Human message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Model message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Shape requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Free text.
    Text,
    /// A single JSON object (`response_format: json_object`).
    JsonObject,
}

/// Parameters of one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Ordered messages sent to the model.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output length ceiling.
    pub max_tokens: u32,
    /// Requested output shape.
    pub output: OutputMode,
}

/// Interface implemented by chat completion providers.
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Return the content of the first completion choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError>;
}

/// Connection settings for the chat completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Chat model identifier.
    pub model: String,
    /// Per-call wall-clock budget.
    pub timeout: Duration,
}

impl ChatSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone().unwrap_or_default(),
            model: config.chat_model.clone(),
            timeout: config.upstream_timeout(),
        }
    }
}

/// Chat completion client backed by the OpenAI API.
pub struct OpenAiChatClient {
    http: Client,
    settings: ChatSettings,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    /// Construct a client over a shared HTTP connection pool.
    pub fn with_client(http: Client, settings: ChatSettings) -> Self {
        tracing::debug!(model = %settings.model, "Initialized chat completion client");
        Self { http, settings }
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.output == OutputMode::JsonObject
            && let Some(object) = body.as_object_mut()
        {
            object.insert(
                "response_format".into(),
                json!({ "type": "json_object" }),
            );
        }
        body
    }
}

#[async_trait]
impl ChatCompletionClient for OpenAiChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        let http_request = self
            .http
            .post(format_endpoint(&self.settings.base_url, "chat/completions"))
            .bearer_auth(&self.settings.api_key)
            .json(&self.payload(&request));

        let body: CompletionResponse =
            send_json(SERVICE, self.settings.timeout, http_request).await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| UpstreamError::malformed(SERVICE, "response contained no message"))?;

        tracing::debug!(
            messages = request.messages.len(),
            chars = content.chars().count(),
            "Completion received"
        );
        Ok(content)
    }
}
