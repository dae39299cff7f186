use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use llm_client::util::extract_json_object;
use llm_client::{ChatAgent, ChatRequest, StructuredOutput};
use radius_common::{
    GeneratedQuestions, KnowledgeBase, KnowledgeBaseResult, Question, QuestionCategory,
    QuestionSet, QuestionSetMetadata, QuestionSource, RadiusError, NOT_STATED,
};

/// Slight creativity for diverse questions; deterministic enough to stay on
/// topic.
const QUESTION_TEMPERATURE: f32 = 0.3;
const MAX_QUESTION_TOKENS: u32 = 3_000;

const QUESTION_SYSTEM_PROMPT: &str = r#"You are a question designer for an AI visibility engine.

Your task is to generate REALISTIC questions that real users would ask LLMs about this company.

CRITICAL REQUIREMENTS:
1. Questions must be SPECIFIC to this company's business model
2. Questions must reflect how REAL USERS search for solutions
3. Questions must be NEUTRAL (not leading or biased)
4. Questions must cover different user intents

QUESTION CATEGORIES:
1. DISCOVERY - Finding solutions in the category
2. COMPARISON - Comparing against alternatives
3. TRUST - Security, reliability, compliance questions
4. USE_CASE - Specific use case fit questions
5. DECISION - Final buying decision questions

EXAMPLES OF BAD QUESTIONS (DO NOT GENERATE):
- "What is [Company]?" (too direct, not how users search)
- "Is [Company] good?" (too vague)
- Generic questions that work for any company

EXAMPLES OF GOOD QUESTIONS:
- For a payment processor: "What payment gateway has the best developer API for startups?"
- For a CRM: "What CRM is best for sales teams under 50 people?""#;

/// System prompt with the reply schema generated from the output type, so
/// prompt and parser can never drift apart.
fn question_system_prompt() -> String {
    format!(
        "{QUESTION_SYSTEM_PROMPT}\n\n\
         OUTPUT FORMAT: a single JSON object matching this schema:\n{schema}\n\n\
         Return ONLY valid JSON.",
        schema = GeneratedQuestions::output_schema()
    )
}

/// Generates the per-company question set from a refined knowledge base.
/// The set is produced once per analysis and reused verbatim downstream.
pub struct QuestionGenerator {
    agent: Option<Arc<dyn ChatAgent>>,
    num_questions: usize,
}

impl QuestionGenerator {
    pub fn new(agent: Option<Arc<dyn ChatAgent>>, num_questions: usize) -> Self {
        Self {
            agent,
            num_questions,
        }
    }

    /// Generate questions. Never fails: a missing agent or a bad reply
    /// degrades to the fixed 3-question fallback set.
    pub async fn generate(&self, kb_result: &KnowledgeBaseResult) -> QuestionSet {
        let kb = &kb_result.knowledge_base;

        let Some(agent) = &self.agent else {
            warn!("No question agent configured, using fallback question set");
            return fallback_questions(kb);
        };

        match self.call_llm(agent.as_ref(), kb).await {
            Ok(questions) => {
                info!(count = questions.len(), "Questions generated");
                structure_questions(questions, kb, QuestionSource::GptGenerated)
            }
            Err(e) => {
                warn!(error = %e, "Question generation failed, using fallback set");
                fallback_questions(kb)
            }
        }
    }

    async fn call_llm(&self, agent: &dyn ChatAgent, kb: &KnowledgeBase) -> Result<Vec<Question>> {
        let summary = summarize_kb(kb);
        let user_prompt = format!(
            "Generate {n} visibility test questions for this company:\n\n{summary}\n\n\
             Requirements:\n\
             1. Questions must be specific to THIS company's business model\n\
             2. Include a mix of all 5 categories (DISCOVERY, COMPARISON, TRUST, USE_CASE, DECISION)\n\
             3. Questions should be what real users would type into ChatGPT/Claude/Perplexity\n\
             4. Do NOT use the company name in discovery questions (users don't know about them yet)\n\
             5. Include some questions where competitors might dominate\n\n\
             Generate {n} unique, business-relevant questions:",
            n = self.num_questions
        );

        let request = ChatRequest::new()
            .system(question_system_prompt())
            .user(user_prompt)
            .temperature(QUESTION_TEMPERATURE)
            .max_tokens(MAX_QUESTION_TOKENS)
            .json();

        let reply = agent
            .chat(&request)
            .await
            .map_err(|e| RadiusError::Llm(e.to_string()))?;
        let json = extract_json_object(&reply).context("Reply contains no JSON object")?;
        let parsed: serde_json::Value =
            serde_json::from_str(json).context("Reply is not valid JSON")?;

        // Tolerate individually malformed entries rather than discarding the
        // whole reply.
        let mut questions = Vec::new();
        if let Some(items) = parsed.get("questions").and_then(|q| q.as_array()) {
            for item in items {
                match serde_json::from_value::<Question>(item.clone()) {
                    Ok(q) if !q.text.trim().is_empty() => questions.push(q),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Skipping malformed question"),
                }
            }
        }
        if questions.is_empty() {
            return Err(
                RadiusError::Validation("Reply contained no usable questions".to_string()).into(),
            );
        }

        for (i, q) in questions.iter_mut().enumerate() {
            if q.id.trim().is_empty() {
                q.id = format!("q{}", i + 1);
            }
        }
        Ok(questions)
    }
}

fn structure_questions(
    questions: Vec<Question>,
    kb: &KnowledgeBase,
    source: QuestionSource,
) -> QuestionSet {
    let mut by_category: BTreeMap<QuestionCategory, Vec<Question>> = QuestionCategory::ALL
        .into_iter()
        .map(|c| (c, Vec::new()))
        .collect();
    for q in &questions {
        by_category.entry(q.category).or_default().push(q.clone());
    }

    let categories = by_category
        .iter()
        .map(|(cat, qs)| (*cat, qs.len()))
        .collect();

    QuestionSet {
        company_name: kb.company_overview.name.clone(),
        metadata: QuestionSetMetadata {
            generated_at: Utc::now(),
            total_questions: questions.len(),
            categories,
            source,
            cache_used: false,
        },
        questions,
        by_category,
    }
}

/// Three generic questions templated from the primary offering, for when no
/// LLM is reachable.
pub fn fallback_questions(kb: &KnowledgeBase) -> QuestionSet {
    let offering = match kb.business_model.primary_offering.trim() {
        "" | NOT_STATED => "services".to_string(),
        other => other.to_string(),
    };

    let questions = vec![
        Question {
            id: "q1".to_string(),
            text: format!("What are the best {offering} providers?"),
            category: QuestionCategory::Discovery,
            user_intent: "Finding options".to_string(),
            expected_mention: "Company should appear as an option".to_string(),
            business_relevance: "Core visibility".to_string(),
        },
        Question {
            id: "q2".to_string(),
            text: format!("How do I choose a {offering} solution?"),
            category: QuestionCategory::Decision,
            user_intent: "Decision making".to_string(),
            expected_mention: "Company criteria should match".to_string(),
            business_relevance: "Decision influence".to_string(),
        },
        Question {
            id: "q3".to_string(),
            text: format!("What should I look for in a {offering}?"),
            category: QuestionCategory::UseCase,
            user_intent: "Understanding requirements".to_string(),
            expected_mention: "Features should align".to_string(),
            business_relevance: "Feature visibility".to_string(),
        },
    ];

    structure_questions(questions, kb, QuestionSource::Fallback)
}

fn summarize_kb(kb: &KnowledgeBase) -> String {
    let mut parts = Vec::new();

    let overview = &kb.company_overview;
    parts.push(format!("COMPANY: {}", overview.name));
    parts.push(format!("TAGLINE: {}", overview.tagline));
    parts.push(format!("DESCRIPTION: {}", overview.description));

    let biz = &kb.business_model;
    parts.push(format!("\nBUSINESS TYPE: {}", biz.model_type));
    parts.push(format!("PRIMARY OFFERING: {}", biz.primary_offering));
    parts.push(format!("REVENUE MODEL: {}", biz.revenue_model));

    if !kb.products_and_services.is_empty() {
        parts.push("\nPRODUCTS/SERVICES:".to_string());
        for p in kb.products_and_services.iter().take(5) {
            let description: String = p.description.chars().take(100).collect();
            parts.push(format!("  - {}: {}", p.name, description));
        }
    }

    let target = &kb.target_customers;
    if !target.segments.is_empty() {
        parts.push(format!(
            "\nTARGET SEGMENTS: {}",
            target.segments.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !target.industries.is_empty() {
        parts.push(format!(
            "INDUSTRIES: {}",
            target.industries.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !target.use_cases.is_empty() {
        parts.push(format!(
            "USE CASES: {}",
            target.use_cases.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    let value = &kb.value_proposition;
    if !value.primary_benefit.is_empty() {
        parts.push(format!("\nPRIMARY BENEFIT: {}", value.primary_benefit));
    }
    if !value.differentiators.is_empty() {
        parts.push(format!(
            "DIFFERENTIATORS: {}",
            value.differentiators.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    if !kb.trust_and_safety.certifications.is_empty() {
        parts.push(format!(
            "\nCERTIFICATIONS: {}",
            kb.trust_and_safety.certifications.join(", ")
        ));
    }

    parts.push(format!("\nPRICING MODEL: {}", kb.pricing.model));
    if !kb.pricing.tiers.is_empty() {
        parts.push(format!("TIERS: {}", kb.pricing.tiers.join(", ")));
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{kb_fixture, ScriptedAgent};

    #[tokio::test]
    async fn missing_agent_yields_three_question_fallback() {
        let generator = QuestionGenerator::new(None, 15);
        let kb_result = kb_fixture("Acme");
        let set = generator.generate(&kb_result).await;

        assert_eq!(set.questions.len(), 3);
        assert_eq!(set.metadata.source, QuestionSource::Fallback);
        assert_eq!(set.company_name, "Acme");
        assert!(set.questions[0].text.contains("payment infrastructure"));
        assert_eq!(set.by_category[&QuestionCategory::Discovery].len(), 1);
        assert_eq!(set.by_category[&QuestionCategory::Comparison].len(), 0);
    }

    #[tokio::test]
    async fn fallback_offering_defaults_when_unstated() {
        let mut kb_result = kb_fixture("Acme");
        kb_result.knowledge_base.business_model.primary_offering = NOT_STATED.to_string();
        let set = fallback_questions(&kb_result.knowledge_base);

        assert!(set.questions[0].text.contains("services"));
    }

    #[tokio::test]
    async fn generated_questions_are_bucketed_and_get_ids() {
        let reply = r#"{"questions": [
            {"text": "What payment gateway has the best API?", "category": "DISCOVERY",
             "user_intent": "finding", "expected_mention": "listed", "business_relevance": "core"},
            {"id": "q-custom", "text": "Is Acme PCI compliant?", "category": "TRUST",
             "user_intent": "vetting", "expected_mention": "compliance", "business_relevance": "trust"}
        ]}"#;
        let agent = Arc::new(ScriptedAgent::replying("openai", reply));
        let generator = QuestionGenerator::new(Some(agent), 15);
        let set = generator.generate(&kb_fixture("Acme")).await;

        assert_eq!(set.metadata.source, QuestionSource::GptGenerated);
        assert_eq!(set.questions.len(), 2);
        assert_eq!(set.questions[0].id, "q1");
        assert_eq!(set.questions[1].id, "q-custom");
        assert_eq!(set.by_category[&QuestionCategory::Trust].len(), 1);
        assert_eq!(set.metadata.categories[&QuestionCategory::Discovery], 1);
    }

    #[test]
    fn question_prompt_embeds_the_reply_schema() {
        let prompt = question_system_prompt();
        assert!(prompt.contains("\"questions\""));
        assert!(prompt.contains("\"category\""));
        assert!(prompt.contains("DISCOVERY"));
    }

    #[tokio::test]
    async fn unparseable_reply_falls_back() {
        let agent = Arc::new(ScriptedAgent::replying("openai", "I cannot help with that."));
        let generator = QuestionGenerator::new(Some(agent), 15);
        let set = generator.generate(&kb_fixture("Acme")).await;

        assert_eq!(set.metadata.source, QuestionSource::Fallback);
        assert_eq!(set.questions.len(), 3);
    }
}
