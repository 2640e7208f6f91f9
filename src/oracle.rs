//! Completion Oracle
//!
//! Agents never generate text themselves; every decision that needs language
//! goes through a [`CompletionOracle`]. The production implementation talks
//! to an OpenAI-compatible chat-completions endpoint (SiliconFlow by default).
//! Calls are single-attempt: callers degrade gracefully on failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OracleConfig;

/// Oracle errors
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle API key not configured")]
    NotConfigured,

    #[error("Oracle request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Oracle API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Oracle returned no choices")]
    EmptyResponse,
}

/// What a completion is for (used for logging and test doubles)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Participation,
    Reply,
    Thought,
    Analysis,
    Plan,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Participation => "participation",
            Self::Reply => "reply",
            Self::Thought => "thought",
            Self::Analysis => "analysis",
            Self::Plan => "plan",
        }
    }
}

/// A single completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: Purpose,
    pub system_prompt: String,
    /// Prior turns as (role, content)
    pub prior_turns: Vec<(String, String)>,
    pub user_message: Option<String>,
    /// Sampling temperature; provider default when `None`
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    pub fn new(purpose: Purpose, system_prompt: impl Into<String>) -> Self {
        Self {
            purpose,
            system_prompt: system_prompt.into(),
            prior_turns: Vec::new(),
            user_message: None,
            temperature: None,
        }
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_prior_turns(mut self, turns: Vec<(String, String)>) -> Self {
        self.prior_turns = turns;
        self
    }
}

/// Opaque text-completion service
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError>;
}

/// Message in the chat body
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// API request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

/// API response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// OpenAI-compatible chat-completions client
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    config: OracleConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn build_body(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: request.system_prompt.clone(),
        }];

        messages.extend(request.prior_turns.iter().map(|(role, content)| ChatMessage {
            role: role.clone(),
            content: content.clone(),
        }));

        if let Some(user) = &request.user_message {
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: user.clone(),
            });
        }

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl CompletionOracle for ChatCompletionsClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        let api_key = self.config.api_key.as_ref().ok_or(OracleError::NotConfigured)?;
        let body = self.build_body(&request);

        debug!(
            "Calling oracle: purpose={}, model={}, messages={}",
            request.purpose.as_str(),
            body.model,
            body.messages.len()
        );

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let parsed: ChatResponse = response.json().await?;

        if let Some(usage) = &parsed.usage {
            info!(
                "Oracle response: purpose={}, in={}, out={}",
                request.purpose.as_str(),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(OracleError::EmptyResponse)
    }
}
