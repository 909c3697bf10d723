//! The `Searcher` adapter contract and the static capability registry.
//!
//! Concrete back-ends (HTTP clients for individual search APIs) are out of
//! scope; this module only fixes the uniform shape adapters must speak and
//! the capability data the analyzer scores against. Grounded on the
//! `McpClient` contract in the reference desktop app's `mcp_service.rs`
//! (pool of named, independently health-tracked clients behind one trait).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::model::{Category, ProviderDescriptor, QueryType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub limit: Option<u32>,
    pub include_domains: Option<Vec<String>>,
    pub exclude_domains: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: Option<f64>,
    pub source_provider: String,
}

/// A registered back-end. Adapters that are not configured (missing
/// credentials) are simply not registered — there is no disabled/unreachable
/// state distinct from absence.
#[async_trait]
pub trait Searcher: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn search(&self, params: SearchParams) -> Result<Vec<SearchResultItem>, SearchError>;
}

/// Static capability table for the standard back-ends. Score contributions
/// derived from these fields are pinned by the ground-truth scenarios this
/// crate's tests check against — do not tune these values casually.
pub static PROVIDER_DESCRIPTORS: &[ProviderDescriptor] = &[
    ProviderDescriptor {
        name: "tavily",
        description: "AI-powered search tuned for research and current events",
        category: Category::Search,
        strong_for: &[QueryType::Academic, QueryType::CurrentEvents, QueryType::Factual],
        recency_score: 0.9,
        complexity_handling: 0.85,
        operator_support: 0.5,
        good_with_domains: &[],
        ai_powered: true,
        privacy_focused: false,
        no_ads: false,
        fast_response: false,
    },
    ProviderDescriptor {
        name: "kagi",
        description: "Privacy-respecting search tuned for technical and code queries",
        category: Category::Search,
        strong_for: &[QueryType::Technical, QueryType::Code, QueryType::HowTo],
        recency_score: 0.5,
        complexity_handling: 0.95,
        operator_support: 0.9,
        good_with_domains: &["github.com", "stackoverflow.com"],
        ai_powered: false,
        privacy_focused: true,
        no_ads: true,
        fast_response: false,
    },
    ProviderDescriptor {
        name: "brave",
        description: "General-purpose, fast search with broad domain coverage",
        category: Category::Search,
        strong_for: &[QueryType::General, QueryType::Local, QueryType::Product],
        recency_score: 0.6,
        complexity_handling: 0.6,
        operator_support: 0.7,
        good_with_domains: &["*"],
        ai_powered: false,
        privacy_focused: true,
        no_ads: false,
        fast_response: true,
    },
    ProviderDescriptor {
        name: "perplexity",
        description: "AI-answer synthesis over live web results",
        category: Category::AiResponse,
        strong_for: &[QueryType::CurrentEvents, QueryType::Academic],
        recency_score: 0.85,
        complexity_handling: 0.9,
        operator_support: 0.2,
        good_with_domains: &[],
        ai_powered: true,
        privacy_focused: false,
        no_ads: false,
        fast_response: false,
    },
];

pub fn descriptor(name: &str) -> Option<&'static ProviderDescriptor> {
    PROVIDER_DESCRIPTORS.iter().find(|d| d.name == name)
}

pub fn descriptors_for(category: Category) -> impl Iterator<Item = &'static ProviderDescriptor> {
    PROVIDER_DESCRIPTORS.iter().filter(move |d| d.category == category)
}

/// A finite, process-local set of back-end handles, keyed by provider name.
/// Registering a provider here is the only way it becomes dispatchable;
/// its descriptor (capability data) is looked up separately by name.
#[derive(Default)]
pub struct Registry {
    searchers: std::collections::HashMap<String, std::sync::Arc<dyn Searcher>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, searcher: std::sync::Arc<dyn Searcher>) {
        self.searchers.insert(searcher.name().to_string(), searcher);
    }

    pub fn get(&self, name: &str) -> Option<std::sync::Arc<dyn Searcher>> {
        self.searchers.get(name).cloned()
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.searchers.keys().cloned().collect()
    }
}
