//! Search orchestration core: classify queries, rank providers, dispatch with
//! retry/backoff, and fall back across a configured provider chain.

pub mod analyzer;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod providers;
pub mod state_store;
pub mod tools;
pub mod tracker;

pub use analyzer::{QueryAnalyzer, Recommendation, ScoredProvider};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigurationOverrides, ConfigurePatch, Mode, ProviderConfig, ProviderSettings};
pub use error::{ErrorKind, OrchestratorError, SearchError};
pub use health::{HealthManager, ProviderHealth};
pub use model::{Category, Complexity, Intent, QueryCharacteristics, QueryType, Sentiment};
pub use orchestrator::{OrchestratorContext, SearchOrchestrator, UnifiedResult};
pub use providers::{Registry, SearchParams, SearchResultItem, Searcher};
pub use state_store::PersistentState;
pub use tracker::{Insights, PerformanceTracker};

/// Builds a fully wired context from a provider registry, reading
/// `OMNISEARCH_*` overrides from the process environment and loading any
/// persisted snapshot from disk. Entry point for binaries embedding this
/// crate; tests build an `OrchestratorContext` directly so they control the
/// clock and never touch the real environment.
pub fn build_context(registry: Registry) -> std::sync::Arc<OrchestratorContext> {
    let env: std::collections::HashMap<String, String> = std::env::vars().collect();
    OrchestratorContext::new(registry, std::sync::Arc::new(clock::SystemClock), &env)
}
