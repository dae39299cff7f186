mod client;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::openai::types as wire;
use crate::traits::{ChatAgent, ChatRequest, MessageRole};

use client::PerplexityClient;

/// Perplexity agent. The API is OpenAI-compatible, so this reuses the OpenAI
/// wire types against api.perplexity.ai.
#[derive(Clone)]
pub struct Perplexity {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl Perplexity {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("PERPLEXITY_API_KEY")
            .map_err(|_| anyhow!("PERPLEXITY_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> PerplexityClient {
        let client = PerplexityClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl ChatAgent for Perplexity {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let messages = request
            .messages
            .iter()
            .map(|m| match m.role {
                MessageRole::System => wire::WireMessage::system(&m.content),
                MessageRole::User => wire::WireMessage::user(&m.content),
                MessageRole::Assistant => wire::WireMessage::assistant(&m.content),
            })
            .collect();

        let wire_request = wire::ChatRequestWire {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: Some(request.max_tokens),
            // Perplexity has no JSON mode; callers parse the reply text.
            response_format: None,
        };

        let response = self.client().chat(&wire_request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response from Perplexity"))
    }

    fn platform(&self) -> &str {
        "Perplexity"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
