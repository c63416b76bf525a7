use crate::config::AppConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// External rewriting capability. Present or absent per configuration; the
/// engine's rule tables remain the guaranteed fallback either way.
#[async_trait]
pub trait GuidelineRewriter: Send + Sync {
    async fn rewrite(&self, text: &str, guidelines: &str) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// OpenAI chat-completions backed rewriter.
pub struct OpenAiRewriter {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiRewriter {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl GuidelineRewriter for OpenAiRewriter {
    async fn rewrite(&self, text: &str, guidelines: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: format!(
                        "Modify the following text according to these guidelines: {}",
                        guidelines
                    ),
                },
                ChatMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            max_tokens: 2000,
        };

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "OpenAI request failed with status {}",
                response.status()
            ));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("OpenAI response contained no choices"))
    }

    fn name(&self) -> &'static str {
        "OpenAI GPT"
    }
}

/// Builds the rewriter configured at startup, or `None` when no provider is
/// available.
pub fn create_rewriter(config: &AppConfig) -> Option<Arc<dyn GuidelineRewriter>> {
    match &config.openai_api_key {
        Some(key) => {
            tracing::info!("LLM rewriter enabled: OpenAI ({})", config.openai_model);
            Some(Arc::new(OpenAiRewriter::new(
                key.clone(),
                config.openai_model.clone(),
            )))
        }
        None => {
            tracing::info!("No LLM rewriter configured, rule tables only");
            None
        }
    }
}
