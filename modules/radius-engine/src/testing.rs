//! Shared doubles and fixtures for unit and integration tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use llm_client::{ChatAgent, ChatRequest};
use radius_common::{
    ConfidenceLabel, CrawlMetadata, CrawlResult, ExtractedSignals, HallucinationRisk, KbMetadata,
    KbSource, KnowledgeBase, KnowledgeBaseResult, PageSection, Platform, PlatformResult,
    QuestionResult, RawDataSummary, ResponseAnalysis, Sentiment,
};

use crate::crawler::{FetchedPage, PageFetcher};

/// In-memory [`PageFetcher`] keyed by URL path. Paths not registered return
/// a 404 with an empty body.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, (u16, String)>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, path: &str, status: u16, body: &str) -> Self {
        self.pages.insert(path.to_string(), (status, body.to_string()));
        self
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.to_string(),
        };
        let (status, body) = self
            .pages
            .get(&path)
            .cloned()
            .unwrap_or((404, String::new()));
        Ok(FetchedPage { status, body })
    }
}

/// [`ChatAgent`] that replays canned replies. Queued replies are consumed in
/// order; once the queue is empty the default reply repeats, or the call
/// fails when no default was set.
pub struct ScriptedAgent {
    platform: String,
    model: String,
    queue: Mutex<VecDeque<String>>,
    default_reply: Option<String>,
    failure: Option<String>,
}

impl ScriptedAgent {
    /// Agent that always returns the same reply.
    pub fn replying(platform: &str, reply: &str) -> Self {
        Self {
            platform: platform.to_string(),
            model: format!("{platform}-test"),
            queue: Mutex::new(VecDeque::new()),
            default_reply: Some(reply.to_string()),
            failure: None,
        }
    }

    /// Agent that consumes replies in order, then fails.
    pub fn sequence(platform: &str, replies: Vec<&str>) -> Self {
        Self {
            platform: platform.to_string(),
            model: format!("{platform}-test"),
            queue: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            default_reply: None,
            failure: None,
        }
    }

    /// Agent whose every call fails with the given message.
    pub fn failing(platform: &str, message: &str) -> Self {
        Self {
            platform: platform.to_string(),
            model: format!("{platform}-test"),
            queue: Mutex::new(VecDeque::new()),
            default_reply: None,
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl ChatAgent for ScriptedAgent {
    async fn chat(&self, _request: &ChatRequest) -> Result<String> {
        if let Some(message) = &self.failure {
            bail!("{message}");
        }
        let next = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next.or_else(|| self.default_reply.clone()) {
            Some(reply) => Ok(reply),
            None => bail!("ScriptedAgent exhausted"),
        }
    }

    fn platform(&self) -> &str {
        &self.platform
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Crawl result with `pages_successful` pages and `section_chars` characters
/// of homepage content.
pub fn crawl_fixture(domain: &str, pages_successful: u32, section_chars: usize) -> CrawlResult {
    let mut raw_content = BTreeMap::new();
    if section_chars > 0 {
        let filler = "acme payments ".repeat(section_chars / 14 + 1);
        raw_content.insert(PageSection::Homepage, filler[..section_chars].to_string());
    }
    CrawlResult {
        metadata: CrawlMetadata {
            domain: domain.to_string(),
            base_url: format!("https://{domain}"),
            crawl_timestamp: Utc::now(),
            pages_attempted: pages_successful.max(1),
            pages_successful,
            cache_used: false,
        },
        pages: BTreeMap::new(),
        raw_content,
        extracted: ExtractedSignals {
            title: String::new(),
            meta_description: String::new(),
            headings: Vec::new(),
            social_proof: Vec::new(),
            pricing_info: Vec::new(),
            trust_signals: Vec::new(),
        },
    }
}

/// Knowledge base result with a named company and a plausible offering.
pub fn kb_fixture(company: &str) -> KnowledgeBaseResult {
    let mut kb = KnowledgeBase::default();
    kb.company_overview.name = company.to_string();
    kb.company_overview.description =
        format!("{company} provides payment infrastructure for software companies.");
    kb.business_model.model_type = "B2B".to_string();
    kb.business_model.primary_offering = "payment infrastructure".to_string();
    kb.target_customers.segments = vec!["startups".to_string(), "platforms".to_string()];

    KnowledgeBaseResult {
        knowledge_base: kb,
        metadata: KbMetadata {
            created_at: Utc::now(),
            source: KbSource::GptRefined,
            model: Some("gpt-test".to_string()),
            pages_analyzed: 5,
            total_content_chars: 12_000,
            overall_confidence: ConfidenceLabel::High,
            confidence_score: 0.85,
            cache_used: false,
        },
        field_confidence: BTreeMap::new(),
        raw_data_summary: RawDataSummary {
            domain: format!("{}.com", company.to_lowercase()),
            crawl_timestamp: Utc::now(),
            sections_with_content: vec![PageSection::Homepage],
        },
    }
}

/// Question set with `n` generic questions, ids `q1..qN`.
pub fn question_set_fixture(company: &str, n: usize) -> radius_common::QuestionSet {
    use radius_common::{Question, QuestionCategory, QuestionSetMetadata, QuestionSource};

    let questions: Vec<Question> = (1..=n)
        .map(|i| Question {
            id: format!("q{i}"),
            text: format!("What are the best payment providers? (variant {i})"),
            category: QuestionCategory::Discovery,
            user_intent: "finding options".to_string(),
            expected_mention: "listed as an option".to_string(),
            business_relevance: "core visibility".to_string(),
        })
        .collect();

    let mut by_category: BTreeMap<QuestionCategory, Vec<Question>> = QuestionCategory::ALL
        .into_iter()
        .map(|c| (c, Vec::new()))
        .collect();
    for q in &questions {
        by_category.entry(q.category).or_default().push(q.clone());
    }
    let categories = by_category.iter().map(|(c, qs)| (*c, qs.len())).collect();

    radius_common::QuestionSet {
        company_name: company.to_string(),
        metadata: QuestionSetMetadata {
            generated_at: Utc::now(),
            total_questions: questions.len(),
            categories,
            source: QuestionSource::GptGenerated,
            cache_used: false,
        },
        questions,
        by_category,
    }
}

/// Fully populated analysis envelope for store tests, built from the other
/// fixtures with the confidence-only score path.
pub fn analysis_record_fixture(analysis_id: &str) -> radius_common::AnalysisRecord {
    use radius_common::{AnalysisRecord, BrandInfo, DataProvenance};

    let crawl = crawl_fixture("acme.io", 5, 12_000);
    let knowledge_base = kb_fixture("Acme");
    let questions = question_set_fixture("Acme", 3);
    let scores = crate::scoring::ScoringEngine::new().confidence_only(&knowledge_base, &questions);
    let overall_score = scores.overall_score.score;

    AnalysisRecord {
        analysis_id: analysis_id.to_string(),
        url: "https://acme.io".to_string(),
        analyzed_at: Utc::now(),
        brand_info: BrandInfo {
            name: "Acme".to_string(),
            domain: "acme.io".to_string(),
            tagline: String::new(),
            description: "Payment infrastructure.".to_string(),
            industry: "payment infrastructure".to_string(),
        },
        crawl,
        knowledge_base,
        questions,
        llm_visibility: None,
        scores,
        overall_score,
        data_provenance: DataProvenance {
            cache_used: false,
            fresh_crawl: true,
            fresh_llm_call: true,
            timestamp: Utc::now(),
        },
    }
}

/// Platform result from a list of per-question mention flags, with neutral
/// sentiment and low hallucination risk throughout.
pub fn platform_result_fixture(platform: Platform, mentioned: &[bool]) -> PlatformResult {
    let results: Vec<QuestionResult> = mentioned
        .iter()
        .enumerate()
        .map(|(i, &hit)| QuestionResult {
            question_id: format!("q{}", i + 1),
            question: format!("Question {}", i + 1),
            response: Some("A response about payment tools.".to_string()),
            analysis: Some(ResponseAnalysis {
                mentioned: hit,
                mention_position: hit.then_some(10),
                product_mentions: u32::from(hit),
                sentiment: Sentiment::Neutral,
                hallucination_risk: HallucinationRisk::Low,
                response_length: 400,
                contains_recommendation: false,
            }),
            error: None,
        })
        .collect();

    let mention_count = mentioned.iter().filter(|&&m| m).count();
    let mention_rate = if mentioned.is_empty() {
        0.0
    } else {
        mention_count as f64 / mentioned.len() as f64
    };

    PlatformResult {
        platform,
        model: Some(format!("{platform}-test")),
        available: true,
        simulated: false,
        reason: None,
        summary: None,
        questions_tested: mentioned.len(),
        mention_count,
        mention_rate,
        results,
        tested_at: Utc::now(),
    }
}
