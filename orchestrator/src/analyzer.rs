//! Deterministic query classification and per-provider scoring.
//!
//! Grounded on the keyword-weighted scoring shape of `SmartQueryClassifier`
//! in the reference desktop app (`score_keywords` + `max_by` category
//! selection), generalized to the fixed indicator-token-count weighting and
//! additive bonus table this crate's callers depend on byte-for-byte.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::model::{Complexity, Intent, ProviderDescriptor, QueryCharacteristics, QueryType, Sentiment};

/// Declaration order doubles as the tie-break order: the first type reached
/// with the maximum score wins. Do not reorder without re-checking every
/// classification test that depends on a tie.
static QUERY_TYPE_INDICATORS: &[(QueryType, &[&str])] = &[
    (
        QueryType::Factual,
        &["what is", "who is", "where is", "when did", "how many", "how much", "fact about"],
    ),
    (
        QueryType::Technical,
        &[
            "api", "database", "algorithm", "framework", "authentication", "websocket",
            "encryption", "protocol", "architecture", "node.js", "javascript", "sdk",
            "endpoint", "oauth", "implement", "deployment", "docker", "kubernetes",
        ],
    ),
    (
        QueryType::Academic,
        &[
            "research paper", "research papers", "ai research", "academic study",
            "journal article", "peer reviewed", "scholarly", "dissertation", "thesis",
            "literature review",
        ],
    ),
    (
        QueryType::CurrentEvents,
        &["breaking news", "latest news", "current events", "just announced", "today's news"],
    ),
    (
        QueryType::Code,
        &["code", "function", "debug", "compile", "syntax error", "stack trace", "snippet", "exception"],
    ),
    (
        QueryType::Local,
        &["near me", "nearby", "in my area", "directions to", "closest"],
    ),
    (
        QueryType::Product,
        &["best price", "buy", "review of", "product review", "where to buy", "cheapest"],
    ),
    (
        QueryType::Definition,
        &["definition of", "meaning of", "what does", "stands for", "define"],
    ),
    (
        QueryType::HowTo,
        &["how to", "how do i", "step by step", "tutorial", "instructions for"],
    ),
];

const RECENCY_INDICATORS: &[&str] = &[
    "latest", "recent", "breaking", "today", "now", "this week", "this month", "current",
    "2024", "2025", "newest",
];

const OPERATOR_MARKERS: &[&str] = &["site:", "filetype:", "inurl:", "intitle:", "\""];

const CONJUNCTIONS: &[&str] = &["and", "or", "but", "with", "without", "except"];
const COMPARATIVES: &[&str] = &["vs", "versus", "compare", "better", "worse", "than"];
const INVESTIGATIVE_MARKERS: &[&str] = &["why", "should i", "what if", "is it worth", "pros and cons"];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one", "our",
    "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see", "two",
    "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "with", "that",
    "this", "from", "they", "have", "what", "when", "where", "which", "there", "their", "into",
];

static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:site:|from:|@|on )?([a-z0-9][a-z0-9-]*(?:\.[a-z0-9][a-z0-9-]*)+)\b").unwrap()
});

const SCORE_BASE: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub provider: String,
    pub confidence: f64,
    pub reasoning: String,
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScoredProvider {
    pub provider: String,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Pure function of the query string: byte-identical output across
    /// processes and runs for the same input.
    pub fn analyze(&self, query: &str) -> QueryCharacteristics {
        let lower = query.to_lowercase();
        let query_type = classify_type(&lower);
        let complexity = classify_complexity(&lower);
        let has_operators = OPERATOR_MARKERS.iter().any(|m| lower.contains(m));
        let requires_recency = RECENCY_INDICATORS.iter().any(|w| lower.contains(w));
        let domains_mentioned = extract_domains(&lower);
        let sentiment = classify_sentiment(&lower);
        let keywords = extract_keywords(&lower);
        let likely_intent = classify_intent(query_type, sentiment);

        QueryCharacteristics {
            query_type,
            domains_mentioned,
            requires_recency,
            complexity,
            has_operators,
            sentiment,
            likely_intent,
            keywords,
        }
    }

    /// Scores every candidate descriptor against the characteristics,
    /// returning rank order (descending score, ties preserve input order).
    pub fn rank(
        &self,
        characteristics: &QueryCharacteristics,
        candidates: &[&ProviderDescriptor],
    ) -> Vec<ScoredProvider> {
        let mut scored: Vec<ScoredProvider> = candidates
            .iter()
            .map(|d| {
                let (score, reasons) = score_provider(d, characteristics);
                ScoredProvider {
                    provider: d.name.to_string(),
                    score,
                    reasons,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    pub fn get_recommended_provider(
        &self,
        characteristics: &QueryCharacteristics,
        candidates: &[&ProviderDescriptor],
    ) -> Recommendation {
        if candidates.is_empty() {
            return Recommendation {
                provider: String::new(),
                confidence: 0.0,
                reasoning: String::new(),
                alternatives: Vec::new(),
            };
        }
        let ranked = self.rank(characteristics, candidates);
        let top = &ranked[0];
        Recommendation {
            provider: top.provider.clone(),
            confidence: top.score.clamp(0.0, 100.0),
            reasoning: top.reasons.join("; "),
            alternatives: ranked.iter().skip(1).take(2).map(|s| s.provider.clone()).collect(),
        }
    }
}

fn classify_type(lower: &str) -> QueryType {
    let mut best = QueryType::General;
    let mut best_score = 0u32;
    for (candidate_type, indicators) in QUERY_TYPE_INDICATORS {
        let mut score = 0u32;
        for indicator in *indicators {
            if lower.contains(indicator) {
                score += indicator.split_whitespace().count() as u32;
            }
        }
        if score > best_score {
            best_score = score;
            best = *candidate_type;
        }
    }
    best
}

fn classify_complexity(lower: &str) -> Complexity {
    let word_count = lower.split_whitespace().count();
    let band = if word_count > 15 {
        2
    } else if word_count > 8 {
        1
    } else {
        0
    };
    let words: HashSet<&str> = lower.split_whitespace().map(|w| w.trim_matches(|c: char| !c.is_alphanumeric())).collect();
    let has_conjunction = CONJUNCTIONS.iter().any(|c| words.contains(c));
    let has_comparative = COMPARATIVES.iter().any(|c| words.contains(c));
    let question_marks = lower.matches('?').count();
    let multi_question = if question_marks >= 2 { 2 } else { 0 };

    let total = band + has_conjunction as i32 + has_comparative as i32 + multi_question;
    if total >= 3 {
        Complexity::Complex
    } else if total >= 1 {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}

fn classify_sentiment(lower: &str) -> Sentiment {
    let words: HashSet<&str> = lower.split_whitespace().collect();
    if COMPARATIVES.iter().any(|c| words.contains(c)) {
        Sentiment::Comparative
    } else if INVESTIGATIVE_MARKERS.iter().any(|m| lower.contains(m)) {
        Sentiment::Investigative
    } else {
        Sentiment::Neutral
    }
}

fn classify_intent(query_type: QueryType, sentiment: Sentiment) -> Intent {
    if sentiment == Sentiment::Comparative {
        return Intent::CompareOptions;
    }
    match query_type {
        QueryType::Code | QueryType::HowTo | QueryType::Technical => Intent::Troubleshoot,
        QueryType::Product => Intent::Purchase,
        QueryType::Local => Intent::Locate,
        QueryType::Definition => Intent::Define,
        QueryType::Academic | QueryType::CurrentEvents => Intent::Research,
        _ => Intent::FindInformation,
    }
}

fn extract_domains(lower: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in DOMAIN_PATTERN.captures_iter(lower) {
        let domain = caps.get(1).unwrap().as_str().to_string();
        if !seen.contains(&domain) {
            seen.push(domain);
        }
    }
    seen
}

fn extract_keywords(lower: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for token in lower.split_whitespace() {
        let cleaned: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.len() > 2 && !STOP_WORDS.contains(&cleaned.as_str()) && !seen.contains(&cleaned) {
            seen.push(cleaned);
        }
    }
    seen
}

fn score_provider(d: &ProviderDescriptor, c: &QueryCharacteristics) -> (f64, Vec<String>) {
    let mut score = SCORE_BASE;
    let mut reasons = Vec::new();

    if d.strong_for.contains(&c.query_type) {
        score += 30.0;
        reasons.push(format!("Excellent for {} queries", c.query_type.as_str()));
    } else if c.query_type == QueryType::General {
        score += 10.0;
    }

    if c.complexity == Complexity::Complex && d.complexity_handling >= 0.9 {
        score += 20.0;
        reasons.push("Handles complex queries well".to_string());
    }
    if c.complexity == Complexity::Simple && d.fast_response {
        score += 15.0;
        reasons.push("Fast for simple queries".to_string());
    }
    if c.requires_recency && d.recency_score >= 0.8 {
        score += 20.0;
        reasons.push("Good with recent information".to_string());
    }
    if c.has_operators && d.operator_support >= 0.8 {
        score += 15.0;
        reasons.push("Strong operator support".to_string());
    }
    if let Some(matched) = c.domains_mentioned.iter().find(|dom| {
        d.good_with_domains.contains(&"*") || d.good_with_domains.iter().any(|gd| dom.contains(gd))
    }) {
        score += 10.0;
        reasons.push(format!("Good with {matched}"));
    }
    if d.ai_powered && c.complexity == Complexity::Complex {
        score += 10.0;
        reasons.push("AI-powered analysis".to_string());
    }
    if d.privacy_focused && c.query_type != QueryType::Academic {
        score += 5.0;
        reasons.push("Privacy-focused".to_string());
    }
    if d.no_ads && c.query_type == QueryType::Technical {
        score += 10.0;
        reasons.push("No ads, clean results".to_string());
    }

    (score, reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::PROVIDER_DESCRIPTORS;

    fn search_descriptors() -> Vec<&'static ProviderDescriptor> {
        PROVIDER_DESCRIPTORS
            .iter()
            .filter(|d| d.category == crate::model::Category::Search)
            .collect()
    }

    #[test]
    fn technical_query_recommends_kagi() {
        let analyzer = QueryAnalyzer::new();
        let characteristics = analyzer.analyze("how to implement WebSocket authentication in Node.js");
        assert_eq!(characteristics.query_type, QueryType::Technical);

        let candidates = search_descriptors();
        let recommendation = analyzer.get_recommended_provider(&characteristics, &candidates);
        assert_eq!(recommendation.provider, "kagi");
        assert!(recommendation.confidence >= 95.0, "confidence was {}", recommendation.confidence);
    }

    #[test]
    fn academic_recency_query_recommends_tavily() {
        let analyzer = QueryAnalyzer::new();
        let characteristics = analyzer.analyze("latest AI research papers 2024");
        assert_eq!(characteristics.query_type, QueryType::Academic);
        assert!(characteristics.requires_recency);

        let candidates = search_descriptors();
        let recommendation = analyzer.get_recommended_provider(&characteristics, &candidates);
        assert_eq!(recommendation.provider, "tavily");
    }

    #[test]
    fn deterministic_across_calls() {
        let analyzer = QueryAnalyzer::new();
        let a = analyzer.analyze("best price on noise cancelling headphones");
        let b = analyzer.analyze("best price on noise cancelling headphones");
        assert_eq!(a.query_type, b.query_type);
        assert_eq!(a.keywords, b.keywords);
    }

    #[test]
    fn empty_candidate_set_yields_zero_confidence() {
        let analyzer = QueryAnalyzer::new();
        let characteristics = analyzer.analyze("anything");
        let recommendation = analyzer.get_recommended_provider(&characteristics, &[]);
        assert_eq!(recommendation.provider, "");
        assert_eq!(recommendation.confidence, 0.0);
    }

    #[test]
    fn domain_extraction_strips_selector_prefix() {
        let analyzer = QueryAnalyzer::new();
        let characteristics = analyzer.analyze("site:github.com rust async traits");
        assert!(characteristics.domains_mentioned.contains(&"github.com".to_string()));
        assert!(characteristics.has_operators);
    }
}
