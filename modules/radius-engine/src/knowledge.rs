use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use llm_client::util::{extract_json_object, truncate_to_char_boundary};
use llm_client::{ChatAgent, ChatRequest, StructuredOutput};
use radius_common::{
    ConfidenceLabel, ConfidenceThresholds, CrawlResult, FieldConfidence, KbMetadata, KbSource,
    KnowledgeBase, KnowledgeBaseResult, RadiusError, RawDataSummary, NOT_STATED,
};

const MAX_CONTEXT_CHARS: usize = 15_000;
const MAX_KB_TOKENS: u32 = 3_000;

/// Reject a generated KB outright when its prose is thinner than this.
const MIN_KB_WORDS: usize = 30;

/// Placeholder fragments that mean the model echoed the template instead of
/// describing the company.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "please describe",
    "lorem ipsum",
    "[company",
    "your company name",
    "example text",
    "insert ",
];

const REFINER_SYSTEM_PROMPT: &str = r#"You are a business analyst building a structured knowledge base from raw website data.

STRICT RULES:
1. ONLY use information explicitly stated in the provided content
2. Clean marketing language into neutral, factual descriptions
3. Resolve contradictions by preferring more specific information
4. If something is unclear or not stated, mark it as "Not explicitly stated"
5. DO NOT invent products, services, or capabilities
6. DO NOT add assumptions not supported by the text
7. DO NOT introduce competitive comparisons or opinions"#;

/// System prompt with the knowledge-base schema generated from the output
/// type, so prompt and parser can never drift apart.
fn refiner_system_prompt() -> String {
    format!(
        "{REFINER_SYSTEM_PROMPT}\n\n\
         OUTPUT FORMAT: a single JSON object matching this schema:\n{schema}\n\n\
         Return ONLY valid JSON. No explanations outside the JSON.",
        schema = KnowledgeBase::output_schema()
    )
}

/// Turns a crawl into a structured, confidence-scored knowledge base. The
/// LLM cleans and normalizes; confidence is computed locally from crawl
/// volume, never taken from the model.
pub struct KnowledgeRefiner {
    agent: Option<Arc<dyn ChatAgent>>,
    thresholds: ConfidenceThresholds,
}

impl KnowledgeRefiner {
    pub fn new(agent: Option<Arc<dyn ChatAgent>>) -> Self {
        Self {
            agent,
            thresholds: ConfidenceThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: ConfidenceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Refine a crawl into a knowledge base. Never fails: a missing agent,
    /// an API error or a rejected reply all produce the LOW-confidence
    /// fallback rather than an error.
    pub async fn refine(&self, crawl: &CrawlResult) -> KnowledgeBaseResult {
        let Some(agent) = &self.agent else {
            warn!("No refinement agent configured, returning fallback knowledge base");
            return self.fallback(crawl);
        };

        let context = build_context(crawl);

        match self.call_llm(agent.as_ref(), &context).await {
            Ok(kb) => {
                info!("Knowledge base refined");
                self.accept(kb, crawl, agent.model())
            }
            Err(e) => {
                warn!(error = %e, "Knowledge refinement failed, returning fallback");
                self.fallback(crawl)
            }
        }
    }

    async fn call_llm(&self, agent: &dyn ChatAgent, context: &str) -> Result<KnowledgeBase> {
        let user_prompt = format!(
            "Analyze this website data and create a structured knowledge base:\n\n{context}\n\n\
             Remember: only include what is explicitly stated, use neutral factual language, \
             and mark anything unclear as \"{NOT_STATED}\".\n\nReturn the knowledge base as JSON:"
        );

        let request = ChatRequest::new()
            .system(refiner_system_prompt())
            .user(user_prompt)
            .temperature(0.0)
            .max_tokens(MAX_KB_TOKENS)
            .json();

        let reply = agent
            .chat(&request)
            .await
            .map_err(|e| RadiusError::Llm(e.to_string()))?;
        let json = extract_json_object(&reply).context("Reply contains no JSON object")?;
        let kb: KnowledgeBase =
            serde_json::from_str(json).context("Reply is not a valid knowledge base")?;

        validate(&kb)?;
        Ok(kb)
    }

    fn accept(&self, mut kb: KnowledgeBase, crawl: &CrawlResult, model: &str) -> KnowledgeBaseResult {
        fill_markers(&mut kb);

        let pages = crawl.metadata.pages_successful;
        let chars = crawl.total_content_chars();
        let (label, score) = self.confidence(pages, chars);
        let field_confidence = score_fields(&kb);

        KnowledgeBaseResult {
            knowledge_base: kb,
            metadata: KbMetadata {
                created_at: Utc::now(),
                source: KbSource::GptRefined,
                model: Some(model.to_string()),
                pages_analyzed: pages,
                total_content_chars: chars,
                overall_confidence: label,
                confidence_score: score,
                cache_used: false,
            },
            field_confidence,
            raw_data_summary: summarize_raw_data(crawl),
        }
    }

    /// Confidence from crawl volume alone. Monotone: more pages and more
    /// characters never lower the label.
    pub fn confidence(&self, pages: u32, chars: usize) -> (ConfidenceLabel, f64) {
        let t = &self.thresholds;
        if pages >= t.high_min_pages && chars > t.high_min_chars {
            (ConfidenceLabel::High, t.high_score)
        } else if pages >= t.medium_min_pages && chars > t.medium_min_chars {
            (ConfidenceLabel::Medium, t.medium_score)
        } else {
            (ConfidenceLabel::Low, t.low_score)
        }
    }

    /// LOW-confidence KB for when refinement is unavailable or rejected.
    /// Every field is explicitly marked rather than fabricated.
    pub fn fallback(&self, crawl: &CrawlResult) -> KnowledgeBaseResult {
        let domain = &crawl.metadata.domain;
        let extracted = &crawl.extracted;

        let mut kb = KnowledgeBase::default();
        kb.company_overview.name = if extracted.title.is_empty() {
            brand_from_domain(domain)
        } else {
            extracted.title.clone()
        };
        kb.company_overview.tagline =
            truncate_to_char_boundary(&extracted.meta_description, 200).to_string();
        kb.company_overview.description =
            "Company information could not be fully analyzed. Manual review recommended."
                .to_string();
        kb.value_proposition.proof_points = extracted.social_proof.clone();
        kb.trust_and_safety.certifications = extracted.trust_signals.clone();
        kb.confidence_notes.low_confidence =
            vec!["All fields - LLM refinement unavailable".to_string()];
        fill_markers(&mut kb);

        KnowledgeBaseResult {
            knowledge_base: kb,
            metadata: KbMetadata {
                created_at: Utc::now(),
                source: KbSource::Fallback,
                model: None,
                pages_analyzed: crawl.metadata.pages_successful,
                total_content_chars: crawl.total_content_chars(),
                overall_confidence: ConfidenceLabel::Low,
                confidence_score: self.thresholds.low_score,
                cache_used: false,
            },
            field_confidence: BTreeMap::new(),
            raw_data_summary: summarize_raw_data(crawl),
        }
    }
}

/// "example.com" → "Example"
pub fn brand_from_domain(domain: &str) -> String {
    let label = domain.split('.').next().unwrap_or(domain);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => label.to_string(),
    }
}

/// Concatenate crawl output into one capped context string with explicit
/// section headers, most important content first.
pub fn build_context(crawl: &CrawlResult) -> String {
    use radius_common::PageSection::*;

    let mut parts = Vec::new();

    parts.push(format!("DOMAIN: {}", crawl.metadata.domain));
    parts.push(format!("PAGES CRAWLED: {}", crawl.metadata.pages_successful));
    parts.push(String::new());

    let extracted = &crawl.extracted;
    if !extracted.title.is_empty() {
        parts.push(format!("WEBSITE TITLE: {}", extracted.title));
    }
    if !extracted.meta_description.is_empty() {
        parts.push(format!("META DESCRIPTION: {}", extracted.meta_description));
    }

    if !extracted.headings.is_empty() {
        parts.push("\nKEY HEADINGS:".to_string());
        for h in extracted.headings.iter().take(20) {
            parts.push(format!("  - [{}] {}", h.level, h.text));
        }
    }
    if !extracted.social_proof.is_empty() {
        let sample = extracted.social_proof.iter().take(10).cloned().collect::<Vec<_>>();
        parts.push(format!("\nSOCIAL PROOF: {}", sample.join(", ")));
    }
    if !extracted.pricing_info.is_empty() {
        let sample = extracted.pricing_info.iter().take(10).cloned().collect::<Vec<_>>();
        parts.push(format!("\nPRICING SIGNALS: {}", sample.join(", ")));
    }
    if !extracted.trust_signals.is_empty() {
        let sample = extracted.trust_signals.iter().take(10).cloned().collect::<Vec<_>>();
        parts.push(format!("\nTRUST SIGNALS: {}", sample.join(", ")));
    }
    parts.push(String::new());

    // (section, header, char cap) in priority order
    let sections = [
        (Homepage, "HOMEPAGE CONTENT", 3000),
        (About, "ABOUT PAGE CONTENT", 2000),
        (Products, "PRODUCTS/SERVICES CONTENT", 2500),
        (Pricing, "PRICING CONTENT", 1500),
        (Customers, "CUSTOMERS/CASE STUDIES", 1500),
        (Trust, "SECURITY/COMPLIANCE", 1000),
    ];
    for (section, header, cap) in sections {
        if let Some(content) = crawl.raw_content.get(&section) {
            if !content.is_empty() {
                parts.push(format!("=== {header} ==="));
                parts.push(truncate_to_char_boundary(content, cap).to_string());
                parts.push(String::new());
            }
        }
    }

    let joined = parts.join("\n");
    truncate_to_char_boundary(&joined, MAX_CONTEXT_CHARS).to_string()
}

/// Gate against template echoes and content-free replies.
fn validate(kb: &KnowledgeBase) -> Result<()> {
    let serialized = serde_json::to_string(kb)?.to_lowercase();
    for marker in PLACEHOLDER_MARKERS {
        if serialized.contains(marker) {
            return Err(RadiusError::Validation(format!(
                "Knowledge base contains placeholder text: {marker:?}"
            ))
            .into());
        }
    }

    let words = scalar_text(kb).split_whitespace().count();
    if words < MIN_KB_WORDS {
        return Err(RadiusError::Validation(format!("Knowledge base too thin: {words} words")).into());
    }
    Ok(())
}

/// All scalar string content of the KB joined with spaces.
fn scalar_text(kb: &KnowledgeBase) -> String {
    let mut out = String::new();
    let value = serde_json::to_value(kb).unwrap_or_default();
    collect_strings(&value, &mut out);
    out
}

fn collect_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_strings(item, out);
            }
        }
        serde_json::Value::Object(fields) => {
            for v in fields.values() {
                collect_strings(v, out);
            }
        }
        _ => {}
    }
}

/// Replace empty scalar fields with the explicit marker so every field holds
/// either content or "Not explicitly stated", never a silent blank.
fn fill_markers(kb: &mut KnowledgeBase) {
    fn fill(field: &mut String) {
        if field.trim().is_empty() {
            *field = NOT_STATED.to_string();
        }
    }

    fill(&mut kb.company_overview.name);
    fill(&mut kb.company_overview.tagline);
    fill(&mut kb.company_overview.description);
    fill(&mut kb.company_overview.founded);
    fill(&mut kb.company_overview.headquarters);
    fill(&mut kb.business_model.model_type);
    fill(&mut kb.business_model.primary_offering);
    fill(&mut kb.business_model.revenue_model);
    fill(&mut kb.value_proposition.primary_benefit);
    fill(&mut kb.pricing.model);
    fill(&mut kb.pricing.transparency);
}

fn summarize_raw_data(crawl: &CrawlResult) -> RawDataSummary {
    RawDataSummary {
        domain: crawl.metadata.domain.clone(),
        crawl_timestamp: crawl.metadata.crawl_timestamp,
        sections_with_content: crawl
            .raw_content
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| *k)
            .collect(),
    }
}

/// Per-field confidence computed by walking the serialized KB: strings are
/// MISSING when empty or explicitly unstated, PARTIAL when terse; lists are
/// MISSING when empty, PARTIAL with a single entry.
fn score_fields(kb: &KnowledgeBase) -> BTreeMap<String, FieldConfidence> {
    let mut scores = BTreeMap::new();
    let value = serde_json::to_value(kb).unwrap_or_default();

    if let serde_json::Value::Object(sections) = value {
        for (section, content) in sections {
            match content {
                serde_json::Value::Object(fields) => {
                    for (field, v) in fields {
                        scores.insert(format!("{section}.{field}"), score_value(&v));
                    }
                }
                serde_json::Value::Array(items) => {
                    let score = if items.is_empty() {
                        FieldConfidence::Missing
                    } else {
                        FieldConfidence::Verified
                    };
                    scores.insert(section, score);
                }
                _ => {}
            }
        }
    }

    scores
}

fn score_value(value: &serde_json::Value) -> FieldConfidence {
    match value {
        serde_json::Value::String(s) => {
            let lower = s.to_lowercase();
            if s.is_empty()
                || lower.contains("not stated")
                || lower.contains("not mentioned")
                || lower.contains("not explicitly stated")
                || lower.contains("not determined")
            {
                FieldConfidence::Missing
            } else if s.len() < 10 {
                FieldConfidence::Partial
            } else {
                FieldConfidence::Verified
            }
        }
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                FieldConfidence::Missing
            } else if items.len() < 2 {
                FieldConfidence::Partial
            } else {
                FieldConfidence::Verified
            }
        }
        _ => FieldConfidence::Verified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{crawl_fixture, ScriptedAgent};

    const VALID_KB_REPLY: &str = r#"{
        "company_overview": {
            "name": "Acme",
            "tagline": "Payments for developers",
            "description": "Acme builds payment processing infrastructure for software companies. The platform handles card payments, invoicing and payouts through a single API.",
            "founded": "2019",
            "headquarters": ""
        },
        "business_model": {
            "type": "B2B",
            "primary_offering": "payment infrastructure",
            "revenue_model": "transaction fees"
        },
        "products_and_services": [
            {"name": "Payments API", "description": "Card processing for web and mobile applications", "target_user": "developers"}
        ],
        "target_customers": {"segments": ["startups"], "company_sizes": [], "industries": ["software"], "use_cases": ["online checkout"]},
        "value_proposition": {"primary_benefit": "one integration for all payment methods", "differentiators": ["developer-first API"], "proof_points": ["trusted by 500 companies"]},
        "trust_and_safety": {"certifications": ["SOC 2"], "compliance": ["PCI DSS"], "security_features": []},
        "pricing": {"model": "usage-based", "tiers": ["Starter", "Scale"], "transparency": "Public"},
        "confidence_notes": {"high_confidence": ["products"], "medium_confidence": [], "low_confidence": []}
    }"#;

    #[test]
    fn confidence_follows_volume_thresholds() {
        let refiner = KnowledgeRefiner::new(None);
        assert_eq!(
            refiner.confidence(5, 10_001),
            (ConfidenceLabel::High, 0.85)
        );
        assert_eq!(
            refiner.confidence(5, 10_000),
            (ConfidenceLabel::Medium, 0.65)
        );
        assert_eq!(refiner.confidence(3, 5_001), (ConfidenceLabel::Medium, 0.65));
        assert_eq!(refiner.confidence(2, 50_000), (ConfidenceLabel::Low, 0.4));
        assert_eq!(refiner.confidence(0, 0), (ConfidenceLabel::Low, 0.4));
    }

    #[test]
    fn confidence_is_monotone_in_both_inputs() {
        let refiner = KnowledgeRefiner::new(None);
        let mut previous = ConfidenceLabel::Low;
        for pages in [0, 1, 3, 5, 8] {
            let (label, _) = refiner.confidence(pages, 12_000);
            assert!(label >= previous);
            previous = label;
        }
    }

    #[test]
    fn brand_name_from_domain_capitalizes_first_label() {
        assert_eq!(brand_from_domain("example.com"), "Example");
        assert_eq!(brand_from_domain("acme.co.uk"), "Acme");
    }

    #[tokio::test]
    async fn missing_agent_yields_fallback() {
        let refiner = KnowledgeRefiner::new(None);
        let crawl = crawl_fixture("example.com", 1, 500);
        let result = refiner.refine(&crawl).await;

        assert_eq!(result.metadata.source, KbSource::Fallback);
        assert_eq!(result.metadata.overall_confidence, ConfidenceLabel::Low);
        assert!((result.metadata.confidence_score - 0.4).abs() < f64::EPSILON);
        assert_eq!(result.knowledge_base.company_overview.name, "Example");
    }

    #[tokio::test]
    async fn valid_reply_is_accepted_and_backfilled() {
        let agent = Arc::new(ScriptedAgent::replying("openai", VALID_KB_REPLY));
        let refiner = KnowledgeRefiner::new(Some(agent));
        let crawl = crawl_fixture("acme.io", 6, 12_000);
        let result = refiner.refine(&crawl).await;

        assert_eq!(result.metadata.source, KbSource::GptRefined);
        assert_eq!(result.metadata.overall_confidence, ConfidenceLabel::High);
        // empty headquarters was back-filled with the marker
        assert_eq!(result.knowledge_base.company_overview.headquarters, NOT_STATED);
        assert_eq!(
            result.field_confidence.get("company_overview.headquarters"),
            Some(&FieldConfidence::Missing)
        );
        assert_eq!(
            result.field_confidence.get("company_overview.description"),
            Some(&FieldConfidence::Verified)
        );
    }

    #[tokio::test]
    async fn placeholder_reply_is_rejected() {
        let reply = VALID_KB_REPLY.replace("Acme builds", "Please describe your company here and");
        let agent = Arc::new(ScriptedAgent::replying("openai", &reply));
        let refiner = KnowledgeRefiner::new(Some(agent));
        let crawl = crawl_fixture("acme.io", 6, 12_000);
        let result = refiner.refine(&crawl).await;

        assert_eq!(result.metadata.source, KbSource::Fallback);
    }

    #[tokio::test]
    async fn thin_reply_is_rejected() {
        let agent = Arc::new(ScriptedAgent::replying(
            "openai",
            r#"{"company_overview": {"name": "Acme"}}"#,
        ));
        let refiner = KnowledgeRefiner::new(Some(agent));
        let crawl = crawl_fixture("acme.io", 6, 12_000);
        let result = refiner.refine(&crawl).await;

        assert_eq!(result.metadata.source, KbSource::Fallback);
    }

    #[tokio::test]
    async fn agent_error_yields_fallback() {
        let agent = Arc::new(ScriptedAgent::failing("openai", "rate limited"));
        let refiner = KnowledgeRefiner::new(Some(agent));
        let crawl = crawl_fixture("acme.io", 6, 12_000);
        let result = refiner.refine(&crawl).await;

        assert_eq!(result.metadata.source, KbSource::Fallback);
    }

    #[test]
    fn refiner_prompt_embeds_the_kb_schema() {
        let prompt = refiner_system_prompt();
        assert!(prompt.contains("\"company_overview\""));
        assert!(prompt.contains("\"trust_and_safety\""));
        assert!(prompt.contains("additionalProperties"));
    }

    #[tokio::test]
    async fn agent_failure_carries_the_llm_category() {
        let refiner = KnowledgeRefiner::new(None);
        let agent = ScriptedAgent::failing("openai", "rate limited");
        let err = refiner.call_llm(&agent, "site content").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RadiusError>(),
            Some(RadiusError::Llm(_))
        ));
    }

    #[tokio::test]
    async fn rejected_reply_carries_the_validation_category() {
        let refiner = KnowledgeRefiner::new(None);
        let agent = ScriptedAgent::replying("openai", r#"{"company_overview": {"name": "Acme"}}"#);
        let err = refiner.call_llm(&agent, "site content").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RadiusError>(),
            Some(RadiusError::Validation(_))
        ));
    }

    #[test]
    fn context_stays_under_cap_and_labels_sections() {
        let crawl = crawl_fixture("acme.io", 6, 40_000);
        let context = build_context(&crawl);

        assert!(context.len() <= MAX_CONTEXT_CHARS);
        assert!(context.contains("DOMAIN: acme.io"));
        assert!(context.contains("=== HOMEPAGE CONTENT ==="));
    }
}
