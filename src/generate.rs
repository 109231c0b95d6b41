//! External AI collaborator for generated conversations.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint and keeps a
//! running conversation history so each reply has the context of the turns
//! before it. Generation failures are reported as [`Error::Generation`] and
//! never abort the process; the conversation source decides what to do.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observability;

/// Default instructions given to the collaborator model.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a customer talking to a support agent in a web \
chat. Keep replies short, conversational, and in character. Ask follow-up questions about your \
issue. Never mention that you are an AI.";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// How many prior turns to replay to the model. Two entries per turn.
const MAX_HISTORY_MESSAGES: usize = 20;

/// Capability to produce the next collaborator reply.
#[async_trait::async_trait]
pub trait Generator: Send {
    /// Generates a reply to `prompt`, in the context of prior turns.
    async fn generate(&mut self, prompt: &str) -> Result<String>;

    /// Discards accumulated conversation context.
    fn reset(&mut self);
}

/// Configuration for a completion endpoint.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Base URL of the service, e.g. `https://api.openai.com/v1`.
    pub url: String,
    /// Model identifier to request.
    pub model: String,
    /// Bearer token, when the endpoint requires one.
    pub api_key: Option<String>,
    /// System prompt framing the collaborator's persona.
    pub system_prompt: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GeneratorConfig {
    /// Creates a configuration with the default persona and timeout.
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Replaces the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible chat-completions service.
pub struct CompletionClient {
    client: reqwest::Client,
    config: GeneratorConfig,
    history: Vec<ChatMessage>,
}

impl CompletionClient {
    /// Creates a client for the configured endpoint.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::generation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            history: Vec::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl Generator for CompletionClient {
    async fn generate(&mut self, prompt: &str) -> Result<String> {
        observability::GENERATIONS.click();

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: self.config.system_prompt.clone(),
        });
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: 256,
            temperature: 0.8,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            observability::GENERATION_ERRORS.click();
            Error::generation(format!("completion request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            observability::GENERATION_ERRORS.click();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::generation(format!(
                "completion service returned HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            observability::GENERATION_ERRORS.click();
            Error::generation(format!("unparseable completion response: {e}"))
        })?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                observability::GENERATION_ERRORS.click();
                Error::generation("completion response contained no choices")
            })?;
        let reply = reply.trim().to_string();
        if reply.is_empty() {
            observability::GENERATION_ERRORS.click();
            return Err(Error::generation("completion response was empty"));
        }

        self.history.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        self.history.push(ChatMessage {
            role: "assistant".to_string(),
            content: reply.clone(),
        });
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..excess);
        }

        Ok(reply)
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}
