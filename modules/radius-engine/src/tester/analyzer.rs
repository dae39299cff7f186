use radius_common::{HallucinationRisk, KnowledgeBase, ResponseAnalysis, Sentiment};

const POSITIVE_WORDS: &[&str] = &[
    "best",
    "excellent",
    "great",
    "leading",
    "top",
    "recommended",
    "popular",
    "trusted",
];

const NEGATIVE_WORDS: &[&str] = &[
    "avoid",
    "issue",
    "problem",
    "concern",
    "limited",
    "expensive",
    "difficult",
];

const RECOMMENDATION_WORDS: &[&str] = &["recommend", "suggest", "consider", "try"];

/// Seam for response analysis so the lexical baseline can be swapped for an
/// embedding- or LLM-based grader without touching the tester.
pub trait ResponseAnalyzer: Send + Sync {
    fn analyze(&self, response: &str, brand: &str, kb: &KnowledgeBase) -> ResponseAnalysis;
}

/// Keyword-based analysis. Deliberately crude: substring brand matching,
/// small fixed sentiment word lists, and a founding-claim heuristic for
/// hallucination risk. No network, no model calls.
pub struct LexicalAnalyzer;

impl ResponseAnalyzer for LexicalAnalyzer {
    fn analyze(&self, response: &str, brand: &str, kb: &KnowledgeBase) -> ResponseAnalysis {
        let response_lower = response.to_lowercase();
        let brand_lower = brand.to_lowercase();

        let mention_position = if brand_lower.is_empty() {
            None
        } else {
            response_lower.find(&brand_lower)
        };
        let mentioned = mention_position.is_some();

        let product_mentions = kb
            .products_and_services
            .iter()
            .filter(|p| {
                let name = p.name.to_lowercase();
                !name.is_empty() && response_lower.contains(&name)
            })
            .count() as u32;

        let positive = POSITIVE_WORDS
            .iter()
            .filter(|w| response_lower.contains(*w))
            .count();
        let negative = NEGATIVE_WORDS
            .iter()
            .filter(|w| response_lower.contains(*w))
            .count();
        let sentiment = if positive > negative {
            Sentiment::Positive
        } else if negative > positive {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };

        // A response that asserts founding facts the site never stated is the
        // one hallucination we can cheaply detect.
        let founded_unstated = kb
            .company_overview
            .founded
            .to_lowercase()
            .contains("not stated")
            || kb.company_overview.founded.trim().is_empty();
        let hallucination_risk = if mentioned && response_lower.contains("founded") && founded_unstated
        {
            HallucinationRisk::Medium
        } else {
            HallucinationRisk::Low
        };

        ResponseAnalysis {
            mentioned,
            mention_position,
            product_mentions,
            sentiment,
            hallucination_risk,
            response_length: response.len(),
            contains_recommendation: RECOMMENDATION_WORDS
                .iter()
                .any(|w| response_lower.contains(*w)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radius_common::ProductEntry;

    fn kb_with(founded: &str) -> KnowledgeBase {
        let mut kb = KnowledgeBase::default();
        kb.company_overview.name = "Acme".to_string();
        kb.company_overview.founded = founded.to_string();
        kb.products_and_services.push(ProductEntry {
            name: "Payments API".to_string(),
            description: String::new(),
            target_user: String::new(),
        });
        kb
    }

    #[test]
    fn detects_mention_and_offset() {
        let kb = kb_with("2019");
        let analysis =
            LexicalAnalyzer.analyze("For startups, Acme is a solid choice.", "Acme", &kb);

        assert!(analysis.mentioned);
        assert_eq!(analysis.mention_position, Some(14));
        assert_eq!(analysis.product_mentions, 0);
    }

    #[test]
    fn mention_matching_is_case_insensitive() {
        let kb = kb_with("2019");
        let analysis = LexicalAnalyzer.analyze("Try ACME and its payments api.", "Acme", &kb);

        assert!(analysis.mentioned);
        assert_eq!(analysis.product_mentions, 1);
        assert!(analysis.contains_recommendation);
    }

    #[test]
    fn sentiment_counts_word_lists() {
        let kb = kb_with("2019");

        let positive =
            LexicalAnalyzer.analyze("The best and most trusted option available.", "Acme", &kb);
        assert_eq!(positive.sentiment, Sentiment::Positive);

        let negative =
            LexicalAnalyzer.analyze("There are problems and it is expensive.", "Acme", &kb);
        assert_eq!(negative.sentiment, Sentiment::Negative);

        let neutral = LexicalAnalyzer.analyze("It processes card payments.", "Acme", &kb);
        assert_eq!(neutral.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn unstated_founding_claim_raises_hallucination_risk() {
        let kb = kb_with("Not explicitly stated");
        let analysis = LexicalAnalyzer.analyze("Acme was founded in 2015.", "Acme", &kb);
        assert_eq!(analysis.hallucination_risk, HallucinationRisk::Medium);

        let kb = kb_with("2019");
        let analysis = LexicalAnalyzer.analyze("Acme was founded in 2019.", "Acme", &kb);
        assert_eq!(analysis.hallucination_risk, HallucinationRisk::Low);
    }
}
