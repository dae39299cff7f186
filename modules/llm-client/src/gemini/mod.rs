mod client;
pub(crate) mod types;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::traits::{ChatAgent, ChatRequest, MessageRole};

use client::GeminiClient;

/// Gemini agent backed by the Google generateContent API. System messages
/// become the `systemInstruction` field; assistant turns map to the "model"
/// role.
#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl ChatAgent for Gemini {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let mut system_instruction: Option<types::Content> = None;
        let mut contents = Vec::new();

        for m in &request.messages {
            match m.role {
                MessageRole::System => {
                    system_instruction = Some(types::Content::system(&m.content));
                }
                MessageRole::User => contents.push(types::Content::user(&m.content)),
                MessageRole::Assistant => contents.push(types::Content::model(&m.content)),
            }
        }

        let wire = types::GenerateRequest {
            contents,
            system_instruction,
            generation_config: types::GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request.json.then(|| "application/json".to_string()),
            },
        };

        let response = self.client().generate(&self.model, &wire).await?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow!("No candidates from Gemini"))
    }

    fn platform(&self) -> &str {
        "Gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
