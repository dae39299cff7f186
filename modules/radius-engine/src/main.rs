use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use radius_common::RadiusConfig;
use radius_engine::store::PgStore;
use radius_engine::{AnalysisOptions, RadiusEngine};

/// AI visibility analysis: crawl a company website, build a knowledge base,
/// and measure how often LLMs mention the brand in realistic user queries.
#[derive(Parser)]
#[command(name = "radius", version, about)]
struct Args {
    /// Target website, e.g. "acme.io" or "https://acme.io"
    url: String,

    #[arg(long, default_value_t = 10)]
    max_pages: usize,

    #[arg(long, default_value_t = 15)]
    num_questions: usize,

    /// Skip the per-platform LLM testing stage and score from
    /// knowledge-base confidence only.
    #[arg(long)]
    skip_llm_tests: bool,

    /// Postgres URL for persisting results. Overrides DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("radius_engine=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = RadiusConfig::from_env();
    if args.database_url.is_some() {
        config.database_url = args.database_url.clone();
    }
    config.log_redacted();

    let mut engine = RadiusEngine::from_config(config.clone())?;
    if let Some(database_url) = &config.database_url {
        match PgStore::connect(database_url).await {
            Ok(store) => engine = engine.with_store(Arc::new(store)),
            Err(e) => warn!(error = %e, "Database unavailable, keeping results in memory only"),
        }
    }

    let options = AnalysisOptions::builder()
        .max_pages(args.max_pages)
        .num_questions(args.num_questions)
        .run_llm_tests(!args.skip_llm_tests)
        .build();

    info!(url = %args.url, "Radius starting");
    let record = engine.run_full_analysis(&args.url, &options).await;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
