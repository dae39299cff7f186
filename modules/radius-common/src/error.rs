use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadiusError {
    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
