pub mod claude;
pub mod gemini;
pub mod openai;
pub mod perplexity;
pub mod schema;
pub mod traits;
pub mod util;

pub use claude::Claude;
pub use gemini::Gemini;
pub use openai::OpenAi;
pub use perplexity::Perplexity;
pub use schema::StructuredOutput;
pub use traits::{ChatAgent, ChatRequest, Message, MessageRole};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agents_report_their_platform_and_model() {
        let agents: Vec<(Box<dyn ChatAgent>, &str)> = vec![
            (Box::new(OpenAi::new("key", "gpt-4o-mini")), "ChatGPT"),
            (
                Box::new(Claude::new("key", "claude-3-haiku-20240307")),
                "Claude",
            ),
            (Box::new(Gemini::new("key", "gemini-1.5-flash")), "Gemini"),
            (Box::new(Perplexity::new("key", "sonar")), "Perplexity"),
        ];
        for (agent, platform) in &agents {
            assert_eq!(agent.platform(), *platform);
            assert!(!agent.model().is_empty());
        }
    }
}
