mod client;
pub(crate) mod types;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::traits::{ChatAgent, ChatRequest, MessageRole};

use client::ClaudeClient;

/// Claude agent backed by the Anthropic messages API. System messages are
/// hoisted into the top-level `system` field the API expects.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl ChatAgent for Claude {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let mut system: Option<String> = None;
        let mut messages = Vec::new();

        for m in &request.messages {
            match m.role {
                MessageRole::System => match system {
                    Some(ref mut s) => {
                        s.push('\n');
                        s.push_str(&m.content);
                    }
                    None => system = Some(m.content.clone()),
                },
                MessageRole::User => messages.push(types::WireMessage::user(&m.content)),
                MessageRole::Assistant => messages.push(types::WireMessage::assistant(&m.content)),
            }
        }

        let wire = types::ChatRequestWire {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            messages,
            system,
            temperature: request.temperature,
        };

        let response = self.client().chat(&wire).await?;

        response
            .content
            .into_iter()
            .find_map(|block| match block {
                types::ContentBlock::Text { text } => Some(text),
                types::ContentBlock::Other => None,
            })
            .ok_or_else(|| anyhow!("No text content from Claude"))
    }

    fn platform(&self) -> &str {
        "Claude"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
