mod analyzer;

pub use analyzer::{LexicalAnalyzer, ResponseAnalyzer};

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use llm_client::util::{extract_json_object, truncate_to_char_boundary};
use llm_client::{ChatAgent, ChatRequest};
use radius_common::{
    KnowledgeBaseResult, Platform, PlatformResult, QuestionResult, QuestionSet, RadiusConfig,
    VisibilityReport, VisibilitySummary,
};

/// Per-question API calls are the expensive part of a run, so only the head
/// of the question set is sent to live providers.
const QUESTIONS_PER_PLATFORM: usize = 5;
const TEST_TEMPERATURE: f32 = 0.7;
const MAX_ANSWER_TOKENS: u32 = 1_000;
/// Raw responses are truncated before persisting; analysis runs on the full
/// text.
const MAX_STORED_RESPONSE_CHARS: usize = 1_500;

/// How a provider participates in a run, decided once up front from which
/// API keys are configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderPlan {
    /// Key present, real per-question calls.
    Real,
    /// Only the OpenAI key is configured: this provider's numbers are
    /// estimated by one extra OpenAI call instead of being tested directly.
    Simulated,
    /// No keys at all: canned figures so the pipeline still completes.
    Demo,
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderKeys {
    pub openai: bool,
    pub anthropic: bool,
    pub gemini: bool,
    pub perplexity: bool,
}

impl From<&RadiusConfig> for ProviderKeys {
    fn from(config: &RadiusConfig) -> Self {
        Self {
            openai: config.openai_api_key.is_some(),
            anthropic: config.anthropic_api_key.is_some(),
            gemini: config.gemini_api_key.is_some(),
            perplexity: config.perplexity_api_key.is_some(),
        }
    }
}

/// Decide each platform's tier: with two or more keys, keyed platforms run
/// for real and the rest are unavailable; with exactly the OpenAI key, the
/// other three are simulated; with no keys, everything is demo data.
pub fn plan_providers(keys: &ProviderKeys) -> BTreeMap<Platform, ProviderPlan> {
    let key_for = |platform: Platform| match platform {
        Platform::Chatgpt => (keys.openai, "OPENAI_API_KEY not set"),
        Platform::Claude => (keys.anthropic, "ANTHROPIC_API_KEY not set"),
        Platform::Gemini => (keys.gemini, "GEMINI_API_KEY not set"),
        Platform::Perplexity => (keys.perplexity, "PERPLEXITY_API_KEY not set"),
    };

    let configured = Platform::ALL
        .iter()
        .filter(|p| key_for(**p).0)
        .count();
    let only_openai = configured == 1 && keys.openai;

    Platform::ALL
        .into_iter()
        .map(|platform| {
            let (present, reason) = key_for(platform);
            let plan = if present {
                ProviderPlan::Real
            } else if configured == 0 {
                ProviderPlan::Demo
            } else if only_openai {
                ProviderPlan::Simulated
            } else {
                ProviderPlan::Unavailable {
                    reason: reason.to_string(),
                }
            };
            (platform, plan)
        })
        .collect()
}

/// Tests brand visibility across the four chat platforms. Each platform is
/// an independent black box: we observe responses, we never correct them.
pub struct LlmTester {
    agents: BTreeMap<Platform, Arc<dyn ChatAgent>>,
    plans: BTreeMap<Platform, ProviderPlan>,
    analyzer: Box<dyn ResponseAnalyzer>,
}

impl LlmTester {
    pub fn new(
        agents: BTreeMap<Platform, Arc<dyn ChatAgent>>,
        plans: BTreeMap<Platform, ProviderPlan>,
    ) -> Self {
        Self {
            agents,
            plans,
            analyzer: Box::new(LexicalAnalyzer),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Box<dyn ResponseAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub async fn run(
        &self,
        questions: &QuestionSet,
        kb_result: &KnowledgeBaseResult,
    ) -> VisibilityReport {
        let company = kb_result.knowledge_base.company_overview.name.clone();
        let head = &questions.questions[..questions.questions.len().min(QUESTIONS_PER_PLATFORM)];

        info!(company = %company, questions = head.len(), "Starting multi-platform visibility testing");

        let mut platforms = BTreeMap::new();
        let mut to_simulate = Vec::new();

        for platform in Platform::ALL {
            let plan = self
                .plans
                .get(&platform)
                .cloned()
                .unwrap_or(ProviderPlan::Unavailable {
                    reason: "no plan".to_string(),
                });
            match plan {
                ProviderPlan::Real => match self.agents.get(&platform) {
                    Some(agent) => {
                        let result = self
                            .test_platform(platform, agent.as_ref(), head, kb_result)
                            .await;
                        platforms.insert(platform, result);
                    }
                    None => {
                        platforms.insert(
                            platform,
                            unavailable_result(platform, "client not configured"),
                        );
                    }
                },
                ProviderPlan::Simulated => to_simulate.push(platform),
                ProviderPlan::Demo => {
                    platforms.insert(platform, demo_result(platform, head.len()));
                }
                ProviderPlan::Unavailable { reason } => {
                    platforms.insert(platform, unavailable_result(platform, &reason));
                }
            }
        }

        if !to_simulate.is_empty() {
            let simulated = self
                .simulate_platforms(&company, &to_simulate, head.len())
                .await;
            platforms.extend(simulated);
        }

        let summary = calculate_summary(&company, &platforms);
        let platforms_available = platforms
            .iter()
            .filter(|(_, r)| r.available && !r.simulated)
            .map(|(p, _)| *p)
            .collect();

        VisibilityReport {
            company_name: company,
            test_timestamp: Utc::now(),
            platforms,
            summary,
            questions_tested: head.len(),
            platforms_available,
            cache_used: false,
        }
    }

    async fn test_platform(
        &self,
        platform: Platform,
        agent: &dyn ChatAgent,
        questions: &[radius_common::Question],
        kb_result: &KnowledgeBaseResult,
    ) -> PlatformResult {
        info!(
            platform = agent.platform(),
            model = agent.model(),
            "Testing platform"
        );
        let brand = &kb_result.knowledge_base.company_overview.name;

        let mut results = Vec::with_capacity(questions.len());
        let mut mention_count = 0;

        // One request per question, sequentially. A failed question is
        // recorded and the batch continues.
        for question in questions {
            let request = ChatRequest::new()
                .user(question.text.clone())
                .temperature(TEST_TEMPERATURE)
                .max_tokens(MAX_ANSWER_TOKENS);

            match agent.chat(&request).await {
                Ok(answer) => {
                    let analysis = self
                        .analyzer
                        .analyze(&answer, brand, &kb_result.knowledge_base);
                    if analysis.mentioned {
                        mention_count += 1;
                    }
                    results.push(QuestionResult {
                        question_id: question.id.clone(),
                        question: question.text.clone(),
                        response: Some(
                            truncate_to_char_boundary(&answer, MAX_STORED_RESPONSE_CHARS)
                                .to_string(),
                        ),
                        analysis: Some(analysis),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(platform = agent.platform(), question = %question.id, error = %e, "Question failed");
                    results.push(QuestionResult {
                        question_id: question.id.clone(),
                        question: question.text.clone(),
                        response: None,
                        analysis: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let tested = results.len();
        PlatformResult {
            platform,
            model: Some(agent.model().to_string()),
            available: true,
            simulated: false,
            reason: None,
            summary: None,
            questions_tested: tested,
            mention_count,
            mention_rate: if tested == 0 {
                0.0
            } else {
                mention_count as f64 / tested as f64
            },
            results,
            tested_at: Utc::now(),
        }
    }

    /// One extra OpenAI call estimating how the untested platforms would
    /// respond. Estimates are clearly marked and carry no per-question
    /// results; a failed estimation degrades to demo figures.
    async fn simulate_platforms(
        &self,
        company: &str,
        platforms: &[Platform],
        questions_tested: usize,
    ) -> BTreeMap<Platform, PlatformResult> {
        let Some(agent) = self.agents.get(&Platform::Chatgpt) else {
            return platforms
                .iter()
                .map(|p| (*p, demo_result(*p, questions_tested)))
                .collect();
        };

        match self
            .call_simulation(agent.as_ref(), company, platforms)
            .await
        {
            Ok(estimates) => platforms
                .iter()
                .map(|platform| {
                    let estimate = estimates.get(platform);
                    let rate = estimate
                        .map(|e| e.mention_rate.clamp(0.0, 1.0))
                        .unwrap_or(0.3);
                    let mention_count =
                        (rate * questions_tested as f64).round() as usize;
                    let result = PlatformResult {
                        platform: *platform,
                        model: None,
                        available: true,
                        simulated: true,
                        reason: Some("Estimated from one OpenAI call, not tested directly".to_string()),
                        summary: estimate.map(|e| e.summary.clone()),
                        questions_tested,
                        mention_count,
                        mention_rate: rate,
                        results: Vec::new(),
                        tested_at: Utc::now(),
                    };
                    (*platform, result)
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Platform simulation failed, using demo figures");
                platforms
                    .iter()
                    .map(|p| (*p, demo_result(*p, questions_tested)))
                    .collect()
            }
        }
    }

    async fn call_simulation(
        &self,
        agent: &dyn ChatAgent,
        company: &str,
        platforms: &[Platform],
    ) -> Result<BTreeMap<Platform, SimulatedEstimate>> {
        let names = platforms
            .iter()
            .map(|p| format!("\"{p}\"", p = platform_key(*p)))
            .collect::<Vec<_>>()
            .join(", ");
        let user_prompt = format!(
            "Estimate how visible the company \"{company}\" would be in answers from these \
             AI assistants: {names}. For each, estimate the fraction of relevant user questions \
             whose answer would mention the company.\n\n\
             Return JSON of the form:\n\
             {{\"claude\": {{\"mention_rate\": 0.4, \"summary\": \"one sentence\"}}, ...}}\n\
             using exactly the platform names given. Return ONLY valid JSON."
        );

        let request = ChatRequest::new()
            .system("You estimate brand visibility across AI assistants. Be conservative and realistic.")
            .user(user_prompt)
            .temperature(0.2)
            .max_tokens(500)
            .json();

        let reply = agent.chat(&request).await?;
        let json = extract_json_object(&reply).context("Reply contains no JSON object")?;
        let raw: BTreeMap<String, SimulatedEstimate> =
            serde_json::from_str(json).context("Reply is not a valid estimate map")?;

        let mut estimates = BTreeMap::new();
        for platform in platforms {
            if let Some(estimate) = raw.get(platform_key(*platform)) {
                estimates.insert(*platform, estimate.clone());
            }
        }
        Ok(estimates)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct SimulatedEstimate {
    #[serde(default)]
    mention_rate: f64,
    #[serde(default)]
    summary: String,
}

fn platform_key(platform: Platform) -> &'static str {
    match platform {
        Platform::Chatgpt => "chatgpt",
        Platform::Claude => "claude",
        Platform::Gemini => "gemini",
        Platform::Perplexity => "perplexity",
    }
}

fn unavailable_result(platform: Platform, reason: &str) -> PlatformResult {
    PlatformResult {
        platform,
        model: None,
        available: false,
        simulated: false,
        reason: Some(reason.to_string()),
        summary: None,
        questions_tested: 0,
        mention_count: 0,
        mention_rate: 0.0,
        results: Vec::new(),
        tested_at: Utc::now(),
    }
}

/// Canned per-platform figures for keyless runs.
fn demo_result(platform: Platform, questions_tested: usize) -> PlatformResult {
    let rate = match platform {
        Platform::Chatgpt => 0.6,
        Platform::Claude => 0.4,
        Platform::Gemini => 0.4,
        Platform::Perplexity => 0.2,
    };
    PlatformResult {
        platform,
        model: None,
        available: true,
        simulated: true,
        reason: Some("No API keys configured, demo figures".to_string()),
        summary: None,
        questions_tested,
        mention_count: (rate * questions_tested as f64).round() as usize,
        mention_rate: rate,
        results: Vec::new(),
        tested_at: Utc::now(),
    }
}

fn calculate_summary(
    company: &str,
    platforms: &BTreeMap<Platform, PlatformResult>,
) -> VisibilitySummary {
    let mut total_mentions = 0;
    let mut total_questions = 0;
    let mut platform_rates = BTreeMap::new();

    for (platform, result) in platforms {
        if result.available {
            total_mentions += result.mention_count;
            total_questions += result.questions_tested;
            platform_rates.insert(*platform, result.mention_rate);
        }
    }

    let overall_mention_rate = if total_questions > 0 {
        total_mentions as f64 / total_questions as f64
    } else {
        0.0
    };

    VisibilitySummary {
        company_name: company.to_string(),
        overall_mention_rate,
        total_mentions,
        total_questions,
        platform_rates,
        visibility_grade: visibility_grade(overall_mention_rate).to_string(),
        platforms_tested: platforms.values().filter(|r| r.available).count(),
    }
}

pub fn visibility_grade(mention_rate: f64) -> &'static str {
    if mention_rate >= 0.8 {
        "A"
    } else if mention_rate >= 0.6 {
        "B"
    } else if mention_rate >= 0.4 {
        "C"
    } else if mention_rate >= 0.2 {
        "D"
    } else {
        "F"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{kb_fixture, question_set_fixture, ScriptedAgent};

    fn keys(openai: bool, anthropic: bool, gemini: bool, perplexity: bool) -> ProviderKeys {
        ProviderKeys {
            openai,
            anthropic,
            gemini,
            perplexity,
        }
    }

    #[test]
    fn no_keys_plans_demo_everywhere() {
        let plans = plan_providers(&keys(false, false, false, false));
        assert!(plans.values().all(|p| *p == ProviderPlan::Demo));
    }

    #[test]
    fn only_openai_simulates_the_rest() {
        let plans = plan_providers(&keys(true, false, false, false));
        assert_eq!(plans[&Platform::Chatgpt], ProviderPlan::Real);
        assert_eq!(plans[&Platform::Claude], ProviderPlan::Simulated);
        assert_eq!(plans[&Platform::Gemini], ProviderPlan::Simulated);
        assert_eq!(plans[&Platform::Perplexity], ProviderPlan::Simulated);
    }

    #[test]
    fn multiple_keys_mark_missing_providers_unavailable() {
        let plans = plan_providers(&keys(true, true, false, false));
        assert_eq!(plans[&Platform::Chatgpt], ProviderPlan::Real);
        assert_eq!(plans[&Platform::Claude], ProviderPlan::Real);
        assert_eq!(
            plans[&Platform::Gemini],
            ProviderPlan::Unavailable {
                reason: "GEMINI_API_KEY not set".to_string()
            }
        );
        assert!(matches!(
            plans[&Platform::Perplexity],
            ProviderPlan::Unavailable { .. }
        ));
    }

    #[test]
    fn grade_boundaries() {
        assert_eq!(visibility_grade(0.8), "A");
        assert_eq!(visibility_grade(0.6), "B");
        assert_eq!(visibility_grade(0.4), "C");
        assert_eq!(visibility_grade(0.2), "D");
        assert_eq!(visibility_grade(0.19), "F");
    }

    #[tokio::test]
    async fn two_mentions_out_of_five_is_rate_point_four() {
        let agent = Arc::new(ScriptedAgent::sequence(
            "openai",
            vec![
                "Acme is a strong option.",
                "Stripe and Adyen dominate here.",
                "Consider Acme for startups.",
                "Several processors handle this.",
                "PayPal remains common.",
            ],
        ));
        let mut agents: BTreeMap<Platform, Arc<dyn ChatAgent>> = BTreeMap::new();
        agents.insert(Platform::Chatgpt, agent);
        let mut plans = BTreeMap::new();
        plans.insert(Platform::Chatgpt, ProviderPlan::Real);
        for p in [Platform::Claude, Platform::Gemini, Platform::Perplexity] {
            plans.insert(
                p,
                ProviderPlan::Unavailable {
                    reason: "key not set".to_string(),
                },
            );
        }

        let tester = LlmTester::new(agents, plans);
        let report = tester
            .run(&question_set_fixture("Acme", 5), &kb_fixture("Acme"))
            .await;

        let chatgpt = &report.platforms[&Platform::Chatgpt];
        assert_eq!(chatgpt.questions_tested, 5);
        assert_eq!(chatgpt.mention_count, 2);
        assert!((chatgpt.mention_rate - 0.4).abs() < f64::EPSILON);
        assert_eq!(report.summary.visibility_grade, "C");
        assert_eq!(report.platforms_available, vec![Platform::Chatgpt]);
    }

    #[tokio::test]
    async fn per_question_failure_does_not_abort_the_batch() {
        let agent = Arc::new(ScriptedAgent::failing("openai", "timeout"));
        let mut agents: BTreeMap<Platform, Arc<dyn ChatAgent>> = BTreeMap::new();
        agents.insert(Platform::Chatgpt, agent);
        let mut plans = BTreeMap::new();
        plans.insert(Platform::Chatgpt, ProviderPlan::Real);

        let tester = LlmTester::new(agents, plans);
        let report = tester
            .run(&question_set_fixture("Acme", 3), &kb_fixture("Acme"))
            .await;

        let chatgpt = &report.platforms[&Platform::Chatgpt];
        assert!(chatgpt.available);
        assert_eq!(chatgpt.questions_tested, 3);
        assert_eq!(chatgpt.mention_count, 0);
        assert!(chatgpt.results.iter().all(|r| r.error.is_some()));
    }

    #[tokio::test]
    async fn keyless_run_returns_complete_demo_report() {
        let plans = plan_providers(&ProviderKeys::default());
        let tester = LlmTester::new(BTreeMap::new(), plans);
        let report = tester
            .run(&question_set_fixture("Acme", 5), &kb_fixture("Acme"))
            .await;

        assert_eq!(report.platforms.len(), 4);
        assert!(report.platforms.values().all(|r| r.available && r.simulated));
        assert!(report.platforms_available.is_empty());
        assert!(report.summary.overall_mention_rate > 0.0);
    }

    #[tokio::test]
    async fn simulation_call_marks_results_simulated() {
        let openai = Arc::new(ScriptedAgent::sequence(
            "openai",
            vec![
                "Acme leads the market.",
                "Many options exist.",
                "Acme and Stripe.",
                "Adyen handles this.",
                "PayPal is common.",
                // the sixth reply answers the simulation request
                r#"{"claude": {"mention_rate": 0.4, "summary": "Occasionally cited."},
                    "gemini": {"mention_rate": 0.2, "summary": "Rarely cited."},
                    "perplexity": {"mention_rate": 0.2, "summary": "Rarely cited."}}"#,
            ],
        ));
        let mut agents: BTreeMap<Platform, Arc<dyn ChatAgent>> = BTreeMap::new();
        agents.insert(Platform::Chatgpt, openai);

        let plans = plan_providers(&keys(true, false, false, false));
        let tester = LlmTester::new(agents, plans);
        let report = tester
            .run(&question_set_fixture("Acme", 5), &kb_fixture("Acme"))
            .await;

        let claude = &report.platforms[&Platform::Claude];
        assert!(claude.available && claude.simulated);
        assert!((claude.mention_rate - 0.4).abs() < f64::EPSILON);
        assert_eq!(claude.mention_count, 2);
        assert!(claude.results.is_empty());
        assert!(!report.platforms[&Platform::Chatgpt].simulated);
        assert_eq!(report.platforms_available, vec![Platform::Chatgpt]);
    }
}
