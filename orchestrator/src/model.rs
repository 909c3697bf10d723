//! Shared data-model types used across the analyzer, health manager,
//! tracker, and orchestrator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Factual,
    Technical,
    Academic,
    CurrentEvents,
    Code,
    General,
    Local,
    Product,
    Definition,
    HowTo,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Factual => "factual",
            QueryType::Technical => "technical",
            QueryType::Academic => "academic",
            QueryType::CurrentEvents => "current_events",
            QueryType::Code => "code",
            QueryType::General => "general",
            QueryType::Local => "local",
            QueryType::Product => "product",
            QueryType::Definition => "definition",
            QueryType::HowTo => "how_to",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Neutral,
    Investigative,
    Comparative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Troubleshoot,
    CompareOptions,
    Research,
    Locate,
    Purchase,
    Define,
    FindInformation,
}

/// Pure-function output of the query analyzer; one per request, never stored
/// beyond the lifetime of the call that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCharacteristics {
    pub query_type: QueryType,
    pub domains_mentioned: Vec<String>,
    pub requires_recency: bool,
    pub complexity: Complexity,
    pub has_operators: bool,
    pub sentiment: Sentiment,
    pub likely_intent: Intent,
    pub keywords: Vec<String>,
}

/// The category a provider is registered under; search providers answer
/// `unified_search`, ai_response providers answer `unified_ai_search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Search,
    AiResponse,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Search => "search",
            Category::AiResponse => "ai_response",
        }
    }
}

/// Static, per-back-end capability declaration. Score contributions derived
/// from these fields must reproduce the ground-truth scenarios verbatim.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub category: Category,
    pub strong_for: &'static [QueryType],
    pub recency_score: f64,
    pub complexity_handling: f64,
    pub operator_support: f64,
    pub good_with_domains: &'static [&'static str],
    pub ai_powered: bool,
    pub privacy_focused: bool,
    pub no_ads: bool,
    pub fast_response: bool,
}
