use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use llm_client::{ChatAgent, Claude, Gemini, OpenAi, Perplexity};
use radius_common::{
    AnalysisRecord, BrandInfo, DataProvenance, KnowledgeBase, Platform, RadiusConfig, RadiusError,
    NOT_STATED,
};

use crate::crawler::{Crawler, HttpFetcher, PageFetcher};
use crate::knowledge::KnowledgeRefiner;
use crate::questions::QuestionGenerator;
use crate::scoring::ScoringEngine;
use crate::store::{AnalysisStore, MemoryStore};
use crate::tester::{plan_providers, LlmTester, ProviderKeys};

const REFINER_MODEL: &str = "gpt-4o";
const TESTER_OPENAI_MODEL: &str = "gpt-4o-mini";
const TESTER_CLAUDE_MODEL: &str = "claude-3-haiku-20240307";
const TESTER_GEMINI_MODEL: &str = "gemini-1.5-flash";
const TESTER_PERPLEXITY_MODEL: &str = "sonar";

#[derive(Debug, Clone, TypedBuilder)]
pub struct AnalysisOptions {
    #[builder(default = 10)]
    pub max_pages: usize,
    #[builder(default = 15)]
    pub num_questions: usize,
    /// LLM testing is the expensive stage; with it off the overall score is
    /// derived from knowledge-base confidence alone.
    #[builder(default = true)]
    pub run_llm_tests: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Payload for the manual "test in [platform]" action.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TestQuestion {
    pub question: String,
    pub question_id: String,
    pub category: radius_common::QuestionCategory,
    pub platform: Platform,
    pub note: String,
}

/// The full pipeline: crawl, refine, generate questions, test visibility,
/// score, persist. Each stage degrades to fallback output rather than
/// failing the run, so an analysis always completes.
pub struct RadiusEngine {
    config: RadiusConfig,
    fetcher: Arc<dyn PageFetcher>,
    refiner_agent: Option<Arc<dyn ChatAgent>>,
    tester_agents: BTreeMap<Platform, Arc<dyn ChatAgent>>,
    store: Option<Arc<dyn AnalysisStore>>,
    cache: Arc<MemoryStore>,
}

impl RadiusEngine {
    pub fn from_config(config: RadiusConfig) -> Result<Self, RadiusError> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(
            HttpFetcher::new(config.request_timeout_secs)
                .map_err(|e| RadiusError::Config(format!("HTTP client: {e}")))?,
        );

        let refiner_agent: Option<Arc<dyn ChatAgent>> = config
            .openai_api_key
            .as_ref()
            .map(|key| Arc::new(OpenAi::new(key.clone(), REFINER_MODEL)) as Arc<dyn ChatAgent>);

        let mut tester_agents: BTreeMap<Platform, Arc<dyn ChatAgent>> = BTreeMap::new();
        if let Some(key) = &config.openai_api_key {
            tester_agents.insert(
                Platform::Chatgpt,
                Arc::new(OpenAi::new(key.clone(), TESTER_OPENAI_MODEL)),
            );
        }
        if let Some(key) = &config.anthropic_api_key {
            tester_agents.insert(
                Platform::Claude,
                Arc::new(Claude::new(key.clone(), TESTER_CLAUDE_MODEL)),
            );
        }
        if let Some(key) = &config.gemini_api_key {
            tester_agents.insert(
                Platform::Gemini,
                Arc::new(Gemini::new(key.clone(), TESTER_GEMINI_MODEL)),
            );
        }
        if let Some(key) = &config.perplexity_api_key {
            tester_agents.insert(
                Platform::Perplexity,
                Arc::new(Perplexity::new(key.clone(), TESTER_PERPLEXITY_MODEL)),
            );
        }

        Ok(Self {
            config,
            fetcher,
            refiner_agent,
            tester_agents,
            store: None,
            cache: Arc::new(MemoryStore::new()),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn AnalysisStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_refiner_agent(mut self, agent: Arc<dyn ChatAgent>) -> Self {
        self.refiner_agent = Some(agent);
        self
    }

    pub fn with_tester_agent(mut self, platform: Platform, agent: Arc<dyn ChatAgent>) -> Self {
        self.tester_agents.insert(platform, agent);
        self
    }

    /// Union of configured API keys and explicitly injected agents. A
    /// platform with an injected client is planned as a real run even when
    /// its key is absent from the environment.
    fn provider_keys(&self) -> ProviderKeys {
        let mut keys = ProviderKeys::from(&self.config);
        for platform in self.tester_agents.keys() {
            match platform {
                Platform::Chatgpt => keys.openai = true,
                Platform::Claude => keys.anthropic = true,
                Platform::Gemini => keys.gemini = true,
                Platform::Perplexity => keys.perplexity = true,
            }
        }
        keys
    }

    /// Run the pipeline end to end. Always returns a complete record; a
    /// failed stage contributes fallback data instead of aborting.
    pub async fn run_full_analysis(&self, url: &str, options: &AnalysisOptions) -> AnalysisRecord {
        let analysis_id = new_analysis_id();
        let started_at = Utc::now();
        info!(analysis_id = %analysis_id, url, "Starting analysis");

        // Phase 1: crawl
        let crawl = match Crawler::new(url, Arc::clone(&self.fetcher), options.max_pages) {
            Ok(crawler) => crawler.crawl().await,
            Err(e) => {
                warn!(error = %e, "Invalid target URL, crawling nothing");
                Crawler::empty_result(url)
            }
        };

        // Phases 2-3: knowledge base
        let refiner = KnowledgeRefiner::new(self.refiner_agent.clone());
        let kb_result = refiner.refine(&crawl).await;

        let brand_info = brand_info(&kb_result.knowledge_base, &crawl.metadata.domain);

        // Phase 4: questions
        let generator =
            QuestionGenerator::new(self.refiner_agent.clone(), options.num_questions);
        let questions = generator.generate(&kb_result).await;

        // Phase 5: visibility testing (optional)
        let llm_visibility = if options.run_llm_tests {
            let plans = plan_providers(&self.provider_keys());
            let tester = LlmTester::new(self.tester_agents.clone(), plans);
            Some(tester.run(&questions, &kb_result).await)
        } else {
            info!("LLM testing skipped");
            None
        };

        // Phase 6: scoring
        let engine = ScoringEngine::new();
        let scores = match &llm_visibility {
            Some(report) => engine.calculate(&kb_result, report, &questions),
            None => engine.confidence_only(&kb_result, &questions),
        };
        let overall_score = scores.overall_score.score;

        let record = AnalysisRecord {
            analysis_id: analysis_id.clone(),
            url: url.to_string(),
            analyzed_at: started_at,
            brand_info,
            crawl,
            knowledge_base: kb_result,
            questions,
            llm_visibility,
            scores,
            overall_score,
            data_provenance: DataProvenance {
                cache_used: false,
                fresh_crawl: true,
                fresh_llm_call: true,
                timestamp: started_at,
            },
        };

        self.persist(&record).await;

        info!(
            analysis_id = %record.analysis_id,
            score = record.overall_score,
            confidence = %record.knowledge_base.metadata.overall_confidence,
            questions = record.questions.questions.len(),
            "Analysis complete"
        );
        record
    }

    /// Persistence failure is logged and swallowed; the in-memory cache
    /// always receives a copy so `get_analysis` works without a database.
    async fn persist(&self, record: &AnalysisRecord) {
        if let Some(store) = &self.store {
            match store.put(record).await {
                Ok(()) => info!(analysis_id = %record.analysis_id, "Analysis saved"),
                Err(e) => warn!(error = %e, "Failed to save analysis, keeping in-memory copy"),
            }
        }
        if let Err(e) = self.cache.put(record).await {
            warn!(error = %e, "Failed to cache analysis");
        }
    }

    pub async fn get_analysis(
        &self,
        analysis_id: &str,
    ) -> Result<Option<AnalysisRecord>, RadiusError> {
        if let Some(store) = &self.store {
            match store.get(analysis_id).await {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Store lookup failed, trying cache"),
            }
        }
        Ok(self.cache.get(analysis_id).await?)
    }

    /// The "test in platform" question: the first DISCOVERY question of the
    /// already-generated set, verbatim, or the first question when no
    /// discovery question exists. Never regenerated at click time so manual
    /// replays match what was scored.
    pub fn get_test_question(record: &AnalysisRecord, platform: Platform) -> Option<TestQuestion> {
        let questions = &record.questions.questions;
        questions
            .iter()
            .find(|q| q.category == radius_common::QuestionCategory::Discovery)
            .or_else(|| questions.first())
            .map(|q| TestQuestion {
                question: q.text.clone(),
                question_id: q.id.clone(),
                category: q.category,
                platform,
                note: "This is the same question used for scoring. Results should be reproducible."
                    .to_string(),
            })
    }

    /// Feedback-driven KB refinement is accepted but not yet acted on.
    pub async fn acknowledge_feedback(
        &self,
        analysis_id: &str,
        feedback: serde_json::Value,
    ) -> serde_json::Value {
        info!(analysis_id, "Feedback received");
        serde_json::json!({
            "status": "feedback_received",
            "analysis_id": analysis_id,
            "feedback": feedback,
            "message": "Knowledge Base refinement queued",
        })
    }
}

fn new_analysis_id() -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_string();
    format!("radius_{stamp}_{suffix}")
}

fn brand_info(kb: &KnowledgeBase, domain: &str) -> BrandInfo {
    let industry = match kb.business_model.primary_offering.trim() {
        "" | NOT_STATED => "Technology".to_string(),
        other => other.to_string(),
    };
    BrandInfo {
        name: kb.company_overview.name.clone(),
        domain: domain.to_string(),
        tagline: kb.company_overview.tagline.clone(),
        description: kb.company_overview.description.clone(),
        industry,
    }
}
