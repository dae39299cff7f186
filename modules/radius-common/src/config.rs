use std::env;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Application configuration loaded from environment variables. Every LLM
/// provider key is optional — absence is a first-class condition handled by
/// fallback paths, never an error.
#[derive(Debug, Clone, Default)]
pub struct RadiusConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,

    /// Optional Postgres document store. Unset degrades persistence to the
    /// in-memory cache.
    pub database_url: Option<String>,

    pub max_pages: usize,
    pub num_questions: usize,
    pub request_timeout_secs: u64,
}

impl RadiusConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: optional_env("OPENAI_API_KEY"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            perplexity_api_key: optional_env("PERPLEXITY_API_KEY"),
            database_url: optional_env("DATABASE_URL"),
            max_pages: env_or("RADIUS_MAX_PAGES", 10),
            num_questions: env_or("RADIUS_NUM_QUESTIONS", 15),
            request_timeout_secs: env_or("RADIUS_REQUEST_TIMEOUT_SECS", 15),
        }
    }

    /// Log which integrations are configured without echoing secrets.
    pub fn log_redacted(&self) {
        info!(
            openai = self.openai_api_key.is_some(),
            anthropic = self.anthropic_api_key.is_some(),
            gemini = self.gemini_api_key.is_some(),
            perplexity = self.perplexity_api_key.is_some(),
            database = self.database_url.is_some(),
            max_pages = self.max_pages,
            "Radius config loaded"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Dimension weights for the overall score. The 30/35/20/15 split is an
/// uncalibrated product decision, exposed here rather than hardcoded in the
/// scoring engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub accuracy: f64,
    pub consistency: f64,
    pub safety: f64,
    pub readability: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            accuracy: 0.30,
            consistency: 0.35,
            safety: 0.20,
            readability: 0.15,
        }
    }
}

/// Crawl-volume thresholds that map to HIGH/MEDIUM/LOW knowledge-base
/// confidence. Like the scoring weights, these are configuration, not
/// calibrated behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub high_min_pages: u32,
    pub high_min_chars: usize,
    pub medium_min_pages: u32,
    pub medium_min_chars: usize,
    pub high_score: f64,
    pub medium_score: f64,
    pub low_score: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high_min_pages: 5,
            high_min_chars: 10_000,
            medium_min_pages: 3,
            medium_min_chars: 5_000,
            high_score: 0.85,
            medium_score: 0.65,
            low_score: 0.4,
        }
    }
}
