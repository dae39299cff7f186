use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Crawl Types ---

/// Which bucket of the site a priority path belongs to. Raw page text is
/// accumulated per section before being handed to the knowledge refiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSection {
    Homepage,
    About,
    Products,
    Pricing,
    Documentation,
    Support,
    Blog,
    Customers,
    Trust,
    Resources,
}

impl std::fmt::Display for PageSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PageSection::Homepage => "homepage",
            PageSection::About => "about",
            PageSection::Products => "products",
            PageSection::Pricing => "pricing",
            PageSection::Documentation => "documentation",
            PageSection::Support => "support",
            PageSection::Blog => "blog",
            PageSection::Customers => "customers",
            PageSection::Trust => "trust",
            PageSection::Resources => "resources",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHeading {
    /// "h1", "h2" or "h3"
    pub level: String,
    pub text: String,
}

/// One successfully fetched and cleaned page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub headings: Vec<PageHeading>,
    /// Visible text with noise tags stripped, capped at 15000 chars.
    pub text: String,
    pub crawled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlMetadata {
    pub domain: String,
    pub base_url: String,
    pub crawl_timestamp: DateTime<Utc>,
    pub pages_attempted: u32,
    pub pages_successful: u32,
    /// Always false — every analysis re-crawls.
    pub cache_used: bool,
}

/// Regex-extracted business signals, deduplicated across pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedSignals {
    pub title: String,
    pub meta_description: String,
    pub headings: Vec<PageHeading>,
    pub social_proof: Vec<String>,
    pub pricing_info: Vec<String>,
    pub trust_signals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub metadata: CrawlMetadata,
    /// Keyed by the path that was fetched ("/", "/about", ...).
    pub pages: BTreeMap<String, PageRecord>,
    /// Cleaned text accumulated per section, capped at 8000 chars each.
    pub raw_content: BTreeMap<PageSection, String>,
    pub extracted: ExtractedSignals,
}

impl CrawlResult {
    /// Total characters of section content, used for confidence thresholds.
    pub fn total_content_chars(&self) -> usize {
        self.raw_content.values().map(|v| v.len()).sum()
    }
}

// --- Knowledge Base ---

/// Marker the refiner prompt requires for anything the site does not state.
pub const NOT_STATED: &str = "Not explicitly stated";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompanyOverview {
    pub name: String,
    pub tagline: String,
    pub description: String,
    pub founded: String,
    pub headquarters: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BusinessModel {
    /// B2B / B2C / marketplace / ...
    #[serde(rename = "type")]
    pub model_type: String,
    pub primary_offering: String,
    pub revenue_model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProductEntry {
    pub name: String,
    pub description: String,
    pub target_user: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TargetCustomers {
    pub segments: Vec<String>,
    pub company_sizes: Vec<String>,
    pub industries: Vec<String>,
    pub use_cases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ValueProposition {
    pub primary_benefit: String,
    pub differentiators: Vec<String>,
    pub proof_points: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TrustAndSafety {
    pub certifications: Vec<String>,
    pub compliance: Vec<String>,
    pub security_features: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PricingInfo {
    pub model: String,
    pub tiers: Vec<String>,
    pub transparency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ConfidenceNotes {
    pub high_confidence: Vec<String>,
    pub medium_confidence: Vec<String>,
    pub low_confidence: Vec<String>,
}

/// What the refiner LLM returns. Every field tolerates absence so a partial
/// reply still parses; empty scalars are back-filled with [`NOT_STATED`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct KnowledgeBase {
    pub company_overview: CompanyOverview,
    pub business_model: BusinessModel,
    pub products_and_services: Vec<ProductEntry>,
    pub target_customers: TargetCustomers,
    pub value_proposition: ValueProposition,
    pub trust_and_safety: TrustAndSafety,
    pub pricing: PricingInfo,
    pub confidence_notes: ConfidenceNotes,
}

/// Coarse confidence in a knowledge base, derived from crawl volume only —
/// never from the model's self-assessment. Ordering: LOW < MEDIUM < HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceLabel::Low => write!(f, "LOW"),
            ConfidenceLabel::Medium => write!(f, "MEDIUM"),
            ConfidenceLabel::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldConfidence {
    Verified,
    Partial,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KbSource {
    GptRefined,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbMetadata {
    pub created_at: DateTime<Utc>,
    pub source: KbSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub pages_analyzed: u32,
    pub total_content_chars: usize,
    pub overall_confidence: ConfidenceLabel,
    pub confidence_score: f64,
    pub cache_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataSummary {
    pub domain: String,
    pub crawl_timestamp: DateTime<Utc>,
    pub sections_with_content: Vec<PageSection>,
}

/// A knowledge base plus the provenance and confidence scaffolding around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseResult {
    pub knowledge_base: KnowledgeBase,
    pub metadata: KbMetadata,
    /// "section.field" → confidence, computed locally after parsing.
    pub field_confidence: BTreeMap<String, FieldConfidence>,
    pub raw_data_summary: RawDataSummary,
}

// --- Questions ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionCategory {
    Discovery,
    Comparison,
    Trust,
    UseCase,
    Decision,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 5] = [
        QuestionCategory::Discovery,
        QuestionCategory::Comparison,
        QuestionCategory::Trust,
        QuestionCategory::UseCase,
        QuestionCategory::Decision,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub category: QuestionCategory,
    pub user_intent: String,
    pub expected_mention: String,
    pub business_relevance: String,
}

/// Wire shape of the question generator's reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GeneratedQuestions {
    pub questions: Vec<Question>,
}

impl Default for Question {
    fn default() -> Self {
        Self {
            id: String::new(),
            text: String::new(),
            category: QuestionCategory::Discovery,
            user_intent: String::new(),
            expected_mention: String::new(),
            business_relevance: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    GptGenerated,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSetMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_questions: usize,
    pub categories: BTreeMap<QuestionCategory, usize>,
    pub source: QuestionSource,
    pub cache_used: bool,
}

/// Generated once per knowledge base and reused verbatim for testing and the
/// "test in platform" UI action. Never regenerated after scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub company_name: String,
    pub questions: Vec<Question>,
    pub by_category: BTreeMap<QuestionCategory, Vec<Question>>,
    pub metadata: QuestionSetMetadata,
}

// --- LLM Visibility Testing ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Chatgpt,
    Claude,
    Gemini,
    Perplexity,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Chatgpt,
        Platform::Claude,
        Platform::Gemini,
        Platform::Perplexity,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Chatgpt => "ChatGPT",
            Platform::Claude => "Claude",
            Platform::Gemini => "Gemini",
            Platform::Perplexity => "Perplexity",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HallucinationRisk {
    Low,
    Medium,
}

/// Purely lexical per-response analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseAnalysis {
    pub mentioned: bool,
    /// Character offset of the first brand mention, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention_position: Option<usize>,
    pub product_mentions: u32,
    pub sentiment: Sentiment,
    pub hallucination_risk: HallucinationRisk,
    pub response_length: usize,
    pub contains_recommendation: bool,
}

/// One question's outcome on one platform. A per-question failure carries
/// `error` and leaves `response`/`analysis` empty; the batch continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ResponseAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub available: bool,
    /// True when the numbers were estimated (single-key simulation) or are
    /// canned demo data rather than real per-question responses.
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub questions_tested: usize,
    pub mention_count: usize,
    pub mention_rate: f64,
    pub results: Vec<QuestionResult>,
    pub tested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilitySummary {
    pub company_name: String,
    pub overall_mention_rate: f64,
    pub total_mentions: usize,
    pub total_questions: usize,
    pub platform_rates: BTreeMap<Platform, f64>,
    pub visibility_grade: String,
    pub platforms_tested: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityReport {
    pub company_name: String,
    pub test_timestamp: DateTime<Utc>,
    pub platforms: BTreeMap<Platform, PlatformResult>,
    pub summary: VisibilitySummary,
    pub questions_tested: usize,
    pub platforms_available: Vec<Platform>,
    pub cache_used: bool,
}

// --- Scoring ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: u32,
    pub grade: String,
    pub reason: String,
    pub details: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScores {
    pub accuracy: DimensionScore,
    pub consistency: DimensionScore,
    pub safety: DimensionScore,
    pub readability: DimensionScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallScore {
    pub score: u32,
    pub grade: String,
    pub reason: String,
    pub weights: crate::config::ScoringWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformScore {
    pub score: u32,
    pub grade: String,
    pub reason: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub title: String,
    pub description: String,
    pub impact: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreMetadata {
    pub calculated_at: DateTime<Utc>,
    pub kb_confidence: ConfidenceLabel,
    pub questions_used: usize,
    pub platforms_tested: Vec<Platform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    pub company_name: String,
    pub overall_score: OverallScore,
    /// None when LLM tests were skipped and only the KB-confidence score
    /// applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_scores: Option<DimensionScores>,
    pub platform_scores: BTreeMap<Platform, PlatformScore>,
    pub recommendations: Vec<Recommendation>,
    pub metadata: ScoreMetadata,
}

// --- Analysis Envelope ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandInfo {
    pub name: String,
    pub domain: String,
    pub tagline: String,
    pub description: String,
    pub industry: String,
}

/// Asserts that nothing in this record was served from a cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataProvenance {
    pub cache_used: bool,
    pub fresh_crawl: bool,
    pub fresh_llm_call: bool,
    pub timestamp: DateTime<Utc>,
}

/// The envelope persisted once per run. Retrieved by id, never updated in
/// place; re-running the same URL produces a new record with a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub url: String,
    pub analyzed_at: DateTime<Utc>,
    pub brand_info: BrandInfo,
    pub crawl: CrawlResult,
    pub knowledge_base: KnowledgeBaseResult,
    pub questions: QuestionSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_visibility: Option<VisibilityReport>,
    pub scores: ScoreReport,
    pub overall_score: u32,
    pub data_provenance: DataProvenance,
}
