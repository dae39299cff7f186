use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Message Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// Chat Request
// =============================================================================

/// Provider-agnostic chat request. Each agent translates this into its own
/// wire format.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object reply where supported
    /// (OpenAI `response_format`, Gemini `response_mime_type`). Ignored by
    /// providers without a JSON mode.
    pub json: bool,
}

impl ChatRequest {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            temperature: None,
            max_tokens: 1000,
            json: false,
        }
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::system(content));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ChatAgent Trait
// =============================================================================

/// Object-safe chat seam. The tester holds a map of `Arc<dyn ChatAgent>` so
/// providers can be swapped or stubbed without touching its control flow.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    /// Send one chat request and return the assistant's text reply.
    async fn chat(&self, request: &ChatRequest) -> Result<String>;

    /// Human-readable platform name ("ChatGPT", "Claude", ...).
    fn platform(&self) -> &str;

    /// Model identifier used for requests.
    fn model(&self) -> &str;
}
