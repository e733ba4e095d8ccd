use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;

pub const COMPLETION_MODEL: &str = "text-davinci-003";
pub const MAX_TOKENS: u32 = 150;

/// Reply sent to the chat whenever the completion service can't produce one.
pub const FALLBACK_REPLY: &str = "Ga ngerti bro, coba tanya bayu xixi";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    text: String,
}

/// Outcome of a completion call. Failures never escape as errors; they are
/// replaced by [`FALLBACK_REPLY`] and the cause is kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Generated(String),
    Fallback { reason: String },
}

impl Completion {
    /// The text to deliver to the chat.
    pub fn text(&self) -> &str {
        match self {
            Completion::Generated(text) => text,
            Completion::Fallback { .. } => FALLBACK_REPLY,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Completion::Fallback { .. })
    }
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Completion;
}

pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.openai_api_base.clone(),
            api_key: config.gpt_token.clone(),
        }
    }

    /// Single completion request. Returns the first candidate's text verbatim.
    pub async fn try_complete(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: COMPLETION_MODEL,
            prompt,
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/completions", self.base_url);

        debug!("Sending completion request: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to completion API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({}): {}", status, error_body);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .context("No choices in completion response")
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str) -> Completion {
        match self.try_complete(prompt).await {
            Ok(text) => Completion::Generated(text),
            Err(e) => {
                warn!("Completion failed, using fallback reply: {:#}", e);
                Completion::Fallback {
                    reason: format!("{:#}", e),
                }
            }
        }
    }
}
