//! Converts raw visibility observations into explainable scores. Every
//! dimension carries a reason string and the evidence it was derived from.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;

use radius_common::{
    DimensionScore, DimensionScores, HallucinationRisk, KnowledgeBaseResult, OverallScore,
    Platform, PlatformScore, Priority, QuestionSet, Recommendation, ScoreMetadata, ScoreReport,
    ScoringWeights, Sentiment, VisibilityReport,
};

pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self {
            weights: ScoringWeights::default(),
        }
    }

    pub fn with_weights(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn calculate(
        &self,
        kb_result: &KnowledgeBaseResult,
        visibility: &VisibilityReport,
        questions: &QuestionSet,
    ) -> ScoreReport {
        let accuracy = accuracy_score(visibility);
        let consistency = consistency_score(visibility);
        let safety = safety_score(visibility);
        let readability = readability_score(visibility);

        let overall = self.overall_score(&accuracy, &consistency, &safety, &readability);
        let recommendations =
            generate_recommendations(&accuracy, &consistency, &safety, visibility);
        let platform_scores = platform_scores(visibility);

        info!(score = overall.score, grade = %overall.grade, "Scores calculated");

        ScoreReport {
            company_name: kb_result.knowledge_base.company_overview.name.clone(),
            overall_score: overall,
            dimension_scores: Some(DimensionScores {
                accuracy,
                consistency,
                safety,
                readability,
            }),
            platform_scores,
            recommendations,
            metadata: ScoreMetadata {
                calculated_at: Utc::now(),
                kb_confidence: kb_result.metadata.overall_confidence,
                questions_used: questions.metadata.total_questions,
                platforms_tested: visibility.platforms_available.clone(),
            },
        }
    }

    /// Cheap score for runs that skip LLM testing: knowledge-base confidence
    /// scaled to a 0-60 band, no dimensions, no platform scores.
    pub fn confidence_only(
        &self,
        kb_result: &KnowledgeBaseResult,
        questions: &QuestionSet,
    ) -> ScoreReport {
        let score = (kb_result.metadata.confidence_score * 60.0) as u32;
        let grade = if score >= 50 { "C" } else { "D" };

        ScoreReport {
            company_name: kb_result.knowledge_base.company_overview.name.clone(),
            overall_score: OverallScore {
                score,
                grade: grade.to_string(),
                reason: "Score based on Knowledge Base quality only. Run LLM tests for full analysis."
                    .to_string(),
                weights: self.weights,
            },
            dimension_scores: None,
            platform_scores: BTreeMap::new(),
            recommendations: Vec::new(),
            metadata: ScoreMetadata {
                calculated_at: Utc::now(),
                kb_confidence: kb_result.metadata.overall_confidence,
                questions_used: questions.metadata.total_questions,
                platforms_tested: Vec::new(),
            },
        }
    }

    fn overall_score(
        &self,
        accuracy: &DimensionScore,
        consistency: &DimensionScore,
        safety: &DimensionScore,
        readability: &DimensionScore,
    ) -> OverallScore {
        let w = &self.weights;
        let weighted = accuracy.score as f64 * w.accuracy
            + consistency.score as f64 * w.consistency
            + safety.score as f64 * w.safety
            + readability.score as f64 * w.readability;
        let score = weighted as u32;

        let mut parts = Vec::new();
        if consistency.score < 50 {
            parts.push("low visibility");
        } else if consistency.score >= 70 {
            parts.push("good visibility");
        }
        if accuracy.score < 60 {
            parts.push("accuracy concerns");
        }
        if safety.score < 60 {
            parts.push("sentiment issues");
        }
        let reason = if parts.is_empty() {
            format!("Overall strong AI visibility with score of {score}/100")
        } else {
            format!("Score of {score}/100 with {}", parts.join(", "))
        };

        OverallScore {
            score,
            grade: score_to_grade(score).to_string(),
            reason,
            weights: self.weights,
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub fn score_to_grade(score: u32) -> &'static str {
    if score >= 90 {
        "A+"
    } else if score >= 80 {
        "A"
    } else if score >= 70 {
        "B"
    } else if score >= 60 {
        "C"
    } else if score >= 50 {
        "D"
    } else {
        "F"
    }
}

/// Analyzed responses per available platform, errors excluded.
fn analyzed_responses(
    visibility: &VisibilityReport,
) -> impl Iterator<Item = &radius_common::ResponseAnalysis> {
    visibility
        .platforms
        .values()
        .filter(|p| p.available)
        .flat_map(|p| p.results.iter())
        .filter_map(|r| r.analysis.as_ref())
}

/// Accuracy: share of analyzed responses whose brand mention carries low
/// hallucination risk. "N/A" when there is nothing to analyze.
fn accuracy_score(visibility: &VisibilityReport) -> DimensionScore {
    let mut total_analyzed = 0u32;
    let mut accurate_mentions = 0u32;
    let mut hallucination_risks = 0u32;

    for analysis in analyzed_responses(visibility) {
        total_analyzed += 1;
        if analysis.mentioned {
            if analysis.hallucination_risk == HallucinationRisk::Low {
                accurate_mentions += 1;
            } else {
                hallucination_risks += 1;
            }
        }
    }

    if total_analyzed == 0 {
        return DimensionScore {
            score: 0,
            grade: "N/A".to_string(),
            reason: "No LLM responses to analyze".to_string(),
            details: BTreeMap::new(),
        };
    }

    let rate = accurate_mentions as f64 / total_analyzed as f64;
    let score = (rate * 100.0) as u32;
    let pct = (rate * 100.0) as u32;
    let reason = if rate >= 0.8 {
        format!("High accuracy: {pct}% of mentions are accurate with minimal hallucination risk")
    } else if rate >= 0.5 {
        format!(
            "Moderate accuracy: {pct}% accuracy rate. {hallucination_risks} potential hallucination risks detected"
        )
    } else {
        format!("Low accuracy: Only {pct}% of mentions appear accurate. Review AI outputs for errors")
    };

    DimensionScore {
        score,
        grade: score_to_grade(score).to_string(),
        reason,
        details: BTreeMap::from([
            ("accurate_mentions".to_string(), accurate_mentions.into()),
            ("hallucination_risks".to_string(), hallucination_risks.into()),
            ("total_analyzed".to_string(), total_analyzed.into()),
        ]),
    }
}

/// Consistency: overall mention rate, penalized by the spread between the
/// best and worst platform.
fn consistency_score(visibility: &VisibilityReport) -> DimensionScore {
    let rate = visibility.summary.overall_mention_rate;
    let mut score = (rate * 100.0) as i64;

    let platform_rates = &visibility.summary.platform_rates;
    if !platform_rates.is_empty() {
        let max = platform_rates.values().cloned().fold(f64::MIN, f64::max);
        let min = platform_rates.values().cloned().fold(f64::MAX, f64::min);
        let penalty = ((max - min) * 20.0) as i64;
        score = (score - penalty).max(0);
    }
    let score = score as u32;

    let pct = (rate * 100.0) as u32;
    let reason = if rate >= 0.7 {
        format!("Strong consistency: Mentioned in {pct}% of queries across platforms")
    } else if rate >= 0.4 {
        format!("Moderate consistency: {pct}% mention rate. Some platforms underperform")
    } else {
        format!("Low consistency: Only {pct}% mention rate. Significant visibility gap")
    };

    let rates_json = platform_rates
        .iter()
        .map(|(p, r)| (p.to_string(), serde_json::json!(r)))
        .collect::<serde_json::Map<_, _>>();

    DimensionScore {
        score,
        grade: score_to_grade(score).to_string(),
        reason,
        details: BTreeMap::from([
            ("overall_mention_rate".to_string(), serde_json::json!(rate)),
            ("platform_rates".to_string(), rates_json.into()),
            (
                "platforms_tested".to_string(),
                visibility.summary.platforms_tested.into(),
            ),
        ]),
    }
}

/// Safety: sentiment distribution over brand mentions. Neutral data earns a
/// middling 50 rather than a failing grade.
fn safety_score(visibility: &VisibilityReport) -> DimensionScore {
    let mut positive = 0u32;
    let mut negative = 0u32;
    let mut neutral = 0u32;

    for analysis in analyzed_responses(visibility) {
        if analysis.mentioned {
            match analysis.sentiment {
                Sentiment::Positive => positive += 1,
                Sentiment::Negative => negative += 1,
                Sentiment::Neutral => neutral += 1,
            }
        }
    }
    let total = positive + negative + neutral;

    if total == 0 {
        return DimensionScore {
            score: 50,
            grade: "C".to_string(),
            reason: "Not enough data to assess safety".to_string(),
            details: BTreeMap::new(),
        };
    }

    let positive_rate = positive as f64 / total as f64;
    let negative_rate = negative as f64 / total as f64;
    let neutral_rate = neutral as f64 / total as f64;
    let raw = positive_rate * 100.0 + neutral_rate * 70.0 - negative_rate * 50.0;
    let score = raw.clamp(0.0, 100.0) as u32;

    let reason = if negative_rate < 0.1 && positive_rate > 0.5 {
        format!(
            "Excellent sentiment: {}% positive mentions with minimal negative content",
            (positive_rate * 100.0) as u32
        )
    } else if negative_rate < 0.2 {
        format!(
            "Good sentiment: Mostly positive/neutral with {}% negative",
            (negative_rate * 100.0) as u32
        )
    } else {
        format!(
            "Sentiment concerns: {}% of mentions have negative sentiment",
            (negative_rate * 100.0) as u32
        )
    };

    DimensionScore {
        score,
        grade: score_to_grade(score).to_string(),
        reason,
        details: BTreeMap::from([
            ("positive_mentions".to_string(), positive.into()),
            ("negative_mentions".to_string(), negative.into()),
            ("neutral_mentions".to_string(), neutral.into()),
            ("total_mentions".to_string(), total.into()),
        ]),
    }
}

/// Readability: substantial, actionable responses score higher. Base 50,
/// bonuses for length and recommendation rate.
fn readability_score(visibility: &VisibilityReport) -> DimensionScore {
    let mut total_responses = 0u32;
    let mut recommendation_count = 0u32;
    let mut total_length = 0usize;

    for analysis in analyzed_responses(visibility) {
        total_responses += 1;
        if analysis.contains_recommendation {
            recommendation_count += 1;
        }
        total_length += analysis.response_length;
    }

    if total_responses == 0 {
        return DimensionScore {
            score: 50,
            grade: "C".to_string(),
            reason: "Not enough data to assess readability".to_string(),
            details: BTreeMap::new(),
        };
    }

    let avg_length = total_length as f64 / total_responses as f64;
    let recommendation_rate = recommendation_count as f64 / total_responses as f64;

    let mut score = 50u32;
    if avg_length > 500.0 {
        score += 20;
    }
    if avg_length > 300.0 {
        score += 10;
    }
    if recommendation_rate > 0.5 {
        score += 20;
    }
    let score = score.min(100);

    DimensionScore {
        score,
        grade: score_to_grade(score).to_string(),
        reason: format!(
            "Responses average {} characters with {}% containing recommendations",
            avg_length as u32,
            (recommendation_rate * 100.0) as u32
        ),
        details: BTreeMap::from([
            ("avg_response_length".to_string(), (avg_length as u64).into()),
            (
                "recommendation_rate".to_string(),
                serde_json::json!(recommendation_rate),
            ),
            ("total_responses".to_string(), total_responses.into()),
        ]),
    }
}

fn platform_scores(visibility: &VisibilityReport) -> BTreeMap<Platform, PlatformScore> {
    visibility
        .platforms
        .iter()
        .map(|(platform, result)| {
            let score = if result.available {
                let score = (result.mention_rate * 100.0) as u32;
                PlatformScore {
                    score,
                    grade: score_to_grade(score).to_string(),
                    reason: format!(
                        "Mentioned in {}/{} questions",
                        result.mention_count, result.questions_tested
                    ),
                    available: true,
                    model: result.model.clone(),
                }
            } else {
                PlatformScore {
                    score: 0,
                    grade: "N/A".to_string(),
                    reason: result
                        .reason
                        .clone()
                        .unwrap_or_else(|| "Platform not available".to_string()),
                    available: false,
                    model: None,
                }
            };
            (*platform, score)
        })
        .collect()
}

fn generate_recommendations(
    accuracy: &DimensionScore,
    consistency: &DimensionScore,
    safety: &DimensionScore,
    visibility: &VisibilityReport,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if consistency.score < 50 {
        recommendations.push(Recommendation {
            priority: Priority::High,
            category: "visibility".to_string(),
            title: "Improve AI Visibility".to_string(),
            description: "Your brand is mentioned in less than 50% of relevant queries. Consider \
                          creating more content that aligns with how users search."
                .to_string(),
            impact: "+20-30 visibility points".to_string(),
            actions: vec![
                "Create FAQ pages answering common questions".to_string(),
                "Publish comparison content".to_string(),
                "Optimize documentation for discoverability".to_string(),
            ],
        });
    }

    for (platform, rate) in &visibility.summary.platform_rates {
        if *rate < 0.3 {
            let name = platform.display_name();
            recommendations.push(Recommendation {
                priority: Priority::Medium,
                category: "platform".to_string(),
                title: format!("Improve {name} Visibility"),
                description: format!(
                    "Low visibility on {name}. This platform may require specific optimization."
                ),
                impact: "+10-15 points on this platform".to_string(),
                actions: vec![
                    format!("Analyze how {name} cites sources"),
                    "Ensure key pages are indexable".to_string(),
                    "Add structured data markup".to_string(),
                ],
            });
        }
    }

    if safety.score < 60 {
        recommendations.push(Recommendation {
            priority: Priority::Medium,
            category: "reputation".to_string(),
            title: "Address Sentiment Concerns".to_string(),
            description: "Some AI responses show neutral or negative sentiment. Monitor and \
                          address any reputation issues."
                .to_string(),
            impact: "Improved brand perception".to_string(),
            actions: vec![
                "Monitor AI mentions regularly".to_string(),
                "Address any negative content".to_string(),
                "Amplify positive customer stories".to_string(),
            ],
        });
    }

    if accuracy.score < 70 && accuracy.grade != "N/A" {
        recommendations.push(Recommendation {
            priority: Priority::High,
            category: "accuracy".to_string(),
            title: "Improve Information Accuracy".to_string(),
            description: "AI responses may contain inaccuracies. Ensure your public information \
                          is clear and consistent."
                .to_string(),
            impact: "Reduced hallucination risk".to_string(),
            actions: vec![
                "Update About page with clear facts".to_string(),
                "Publish verified company information".to_string(),
                "Create authoritative content".to_string(),
            ],
        });
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{kb_fixture, platform_result_fixture, question_set_fixture};
    use chrono::Utc;
    use radius_common::{PlatformResult, VisibilitySummary};

    fn report_from(platforms: Vec<PlatformResult>) -> VisibilityReport {
        let platforms: BTreeMap<Platform, PlatformResult> =
            platforms.into_iter().map(|p| (p.platform, p)).collect();
        let total_mentions: usize = platforms.values().map(|p| p.mention_count).sum();
        let total_questions: usize = platforms.values().map(|p| p.questions_tested).sum();
        let overall = if total_questions > 0 {
            total_mentions as f64 / total_questions as f64
        } else {
            0.0
        };
        let platform_rates = platforms
            .iter()
            .map(|(p, r)| (*p, r.mention_rate))
            .collect();
        let platforms_available: Vec<Platform> = platforms.keys().cloned().collect();

        VisibilityReport {
            company_name: "Acme".to_string(),
            test_timestamp: Utc::now(),
            summary: VisibilitySummary {
                company_name: "Acme".to_string(),
                overall_mention_rate: overall,
                total_mentions,
                total_questions,
                platform_rates,
                visibility_grade: crate::tester::visibility_grade(overall).to_string(),
                platforms_tested: platforms.len(),
            },
            questions_tested: 5,
            platforms_available,
            platforms,
            cache_used: false,
        }
    }

    #[test]
    fn grade_cutoffs() {
        assert_eq!(score_to_grade(95), "A+");
        assert_eq!(score_to_grade(90), "A+");
        assert_eq!(score_to_grade(80), "A");
        assert_eq!(score_to_grade(70), "B");
        assert_eq!(score_to_grade(60), "C");
        assert_eq!(score_to_grade(50), "D");
        assert_eq!(score_to_grade(49), "F");
    }

    #[test]
    fn consistency_matches_single_platform_mention_rate() {
        let report = report_from(vec![platform_result_fixture(
            Platform::Chatgpt,
            &[true, true, false, false, false],
        )]);
        let dim = consistency_score(&report);

        // 2/5 mentions, no cross-platform spread on a single platform
        assert_eq!(dim.score, 40);
        assert_eq!(dim.grade, "F");
    }

    #[test]
    fn consistency_penalizes_platform_spread() {
        let report = report_from(vec![
            platform_result_fixture(Platform::Chatgpt, &[true, true, true, true, false]),
            platform_result_fixture(Platform::Claude, &[false, false, false, false, false]),
        ]);
        let dim = consistency_score(&report);

        // 4/10 overall = 40, spread 0.8 - 0.0 penalizes 16
        assert_eq!(dim.score, 24);
    }

    #[test]
    fn accuracy_is_na_without_responses() {
        let report = report_from(vec![]);
        let dim = accuracy_score(&report);
        assert_eq!(dim.score, 0);
        assert_eq!(dim.grade, "N/A");
    }

    #[test]
    fn safety_defaults_to_middling_without_mentions() {
        let report = report_from(vec![platform_result_fixture(
            Platform::Chatgpt,
            &[false, false, false],
        )]);
        let dim = safety_score(&report);
        assert_eq!(dim.score, 50);
        assert_eq!(dim.grade, "C");
    }

    #[test]
    fn safety_neutral_mentions_score_seventy() {
        let report = report_from(vec![platform_result_fixture(
            Platform::Chatgpt,
            &[true, true, false],
        )]);
        let dim = safety_score(&report);
        // fixture sentiment is neutral throughout
        assert_eq!(dim.score, 70);
    }

    #[test]
    fn readability_rewards_length_and_recommendations() {
        // fixture responses are 400 chars, no recommendations: 50 + 10
        let report = report_from(vec![platform_result_fixture(
            Platform::Chatgpt,
            &[true, false],
        )]);
        let dim = readability_score(&report);
        assert_eq!(dim.score, 60);
    }

    #[test]
    fn overall_is_the_weighted_sum() {
        let report = report_from(vec![platform_result_fixture(
            Platform::Chatgpt,
            &[true, true, true, true, true],
        )]);
        let score_report = ScoringEngine::new().calculate(
            &kb_fixture("Acme"),
            &report,
            &question_set_fixture("Acme", 5),
        );

        let dims = score_report.dimension_scores.as_ref().unwrap();
        let expected = (dims.accuracy.score as f64 * 0.30
            + dims.consistency.score as f64 * 0.35
            + dims.safety.score as f64 * 0.20
            + dims.readability.score as f64 * 0.15) as u32;
        assert_eq!(score_report.overall_score.score, expected);
        assert!(score_report.overall_score.score <= 100);
    }

    #[test]
    fn confidence_only_scales_kb_confidence() {
        let mut kb_result = kb_fixture("Example");
        kb_result.metadata.confidence_score = 0.4;
        let report =
            ScoringEngine::new().confidence_only(&kb_result, &question_set_fixture("Example", 3));

        assert_eq!(report.overall_score.score, 24);
        assert_eq!(report.overall_score.grade, "D");
        assert!(report.dimension_scores.is_none());
        assert!(report.platform_scores.is_empty());
    }

    #[test]
    fn low_consistency_triggers_high_priority_recommendation() {
        let report = report_from(vec![platform_result_fixture(
            Platform::Chatgpt,
            &[true, false, false, false, false],
        )]);
        let score_report = ScoringEngine::new().calculate(
            &kb_fixture("Acme"),
            &report,
            &question_set_fixture("Acme", 5),
        );

        assert!(score_report
            .recommendations
            .iter()
            .any(|r| r.priority == Priority::High && r.category == "visibility"));
        assert!(score_report
            .recommendations
            .iter()
            .any(|r| r.category == "platform"));
    }
}
