//! The tool surface: plain async functions over a shared `OrchestratorContext`.
//!
//! Grounded on the thin `#[tauri::command]` wrappers in `commands/*.rs` in the
//! reference desktop app — each command there does argument shuffling and
//! delegates to a service; these do the same over `OrchestratorContext`
//! instead of a `tauri::State`, with no IPC framework underneath.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::analyzer::{Recommendation, ScoredProvider};
use crate::config::{ConfigurationOverrides, ConfigurePatch, Mode, ProviderConfig};
use crate::error::OrchestratorError;
use crate::health::ProviderHealth;
use crate::model::{Category, QueryCharacteristics};
use crate::orchestrator::{OrchestratorContext, SearchOrchestrator, UnifiedResult};
use crate::providers;
use crate::tracker::{Insights, QueryPerformanceRecord, RollingAggregates};

#[derive(Debug, Clone)]
pub struct ProviderHealthReport {
    pub providers: HashMap<String, ProviderHealth>,
    pub available_search: Vec<String>,
    pub available_ai_response: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderConfigReport {
    pub configuration: ProviderConfig,
    pub provider_health: HashMap<String, ProviderHealth>,
    pub search_order: Vec<String>,
    pub ai_response_order: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryAnalysisReport {
    pub query: String,
    pub analysis: QueryCharacteristics,
    pub recommendation: Recommendation,
    pub provider_scores: Vec<ScoredProvider>,
}

#[derive(Debug, Clone)]
pub struct PerformanceReport {
    pub insights: Insights,
    pub provider_statistics: HashMap<String, RollingAggregates>,
    pub detailed_export: Vec<QueryPerformanceRecord>,
}

pub async fn unified_search(
    ctx: Arc<OrchestratorContext>,
    query: &str,
    limit: Option<u32>,
    include_domains: Option<Vec<String>>,
    exclude_domains: Option<Vec<String>>,
) -> UnifiedResult {
    SearchOrchestrator::new(ctx)
        .unified_search(query, limit, include_domains, exclude_domains, CancellationToken::new())
        .await
}

pub async fn unified_search_cancellable(
    ctx: Arc<OrchestratorContext>,
    query: &str,
    limit: Option<u32>,
    include_domains: Option<Vec<String>>,
    exclude_domains: Option<Vec<String>>,
    cancellation: CancellationToken,
) -> UnifiedResult {
    SearchOrchestrator::new(ctx)
        .unified_search(query, limit, include_domains, exclude_domains, cancellation)
        .await
}

pub async fn unified_ai_search(
    ctx: Arc<OrchestratorContext>,
    query: &str,
    limit: Option<u32>,
    include_domains: Option<Vec<String>>,
    exclude_domains: Option<Vec<String>>,
) -> UnifiedResult {
    SearchOrchestrator::new(ctx)
        .unified_ai_search(query, limit, include_domains, exclude_domains, CancellationToken::new())
        .await
}

pub fn provider_health(ctx: &Arc<OrchestratorContext>) -> ProviderHealthReport {
    for name in ctx.registry.registered_names() {
        ctx.health.ensure_registered(&name);
    }
    let providers = ctx.health.snapshot();
    let config = ctx.config.lock();
    let available_for = |category: Category| {
        config
            .order_for(category)
            .iter()
            .filter(|name| {
                config.providers.get(*name).map(|s| s.enabled).unwrap_or(false) && ctx.health.is_available(name)
            })
            .cloned()
            .collect()
    };
    ProviderHealthReport {
        available_search: available_for(Category::Search),
        available_ai_response: available_for(Category::AiResponse),
        providers,
    }
}

pub fn reset_provider_health(ctx: &Arc<OrchestratorContext>, provider: &str) {
    ctx.health.reset(provider);
    ctx.schedule_save();
}

pub fn configure_providers(
    ctx: &Arc<OrchestratorContext>,
    patch: ConfigurePatch,
) -> ConfigurationOverrides {
    let overrides = ctx.config.lock().apply_patch(patch);
    ctx.schedule_save();
    overrides
}

pub fn get_provider_config(ctx: &Arc<OrchestratorContext>) -> ProviderConfigReport {
    let configuration = ctx.config.lock().clone();
    ProviderConfigReport {
        search_order: configuration.search_order.clone(),
        ai_response_order: configuration.ai_response_order.clone(),
        provider_health: ctx.health.snapshot(),
        configuration,
    }
}

pub fn analyze_query(ctx: &Arc<OrchestratorContext>, query: &str) -> QueryAnalysisReport {
    let analysis = ctx.analyzer.analyze(query);
    let registered = ctx.registry.registered_names();
    let descriptors: Vec<&'static crate::model::ProviderDescriptor> = registered
        .iter()
        .filter_map(|name| providers::descriptor(name))
        .collect();
    let recommendation = ctx.analyzer.get_recommended_provider(&analysis, &descriptors);
    let provider_scores = ctx.analyzer.rank(&analysis, &descriptors);
    QueryAnalysisReport { query: query.to_string(), analysis, recommendation, provider_scores }
}

pub fn performance_insights(ctx: &Arc<OrchestratorContext>) -> PerformanceReport {
    PerformanceReport {
        insights: ctx.tracker.insights(),
        provider_statistics: ctx.tracker.detailed_export(),
        detailed_export: ctx.tracker.snapshot_history(),
    }
}

pub fn get_mode(ctx: &Arc<OrchestratorContext>) -> Mode {
    ctx.config.lock().mode
}

pub fn set_mode(ctx: &Arc<OrchestratorContext>, mode: Mode) -> Result<(), OrchestratorError> {
    {
        let mut config = ctx.config.lock();
        config.restore_overrides(&ConfigurationOverrides {
            mode: Some(mode),
            search_order: None,
            ai_response_order: None,
            disabled_providers: None,
            fallback_enabled: None,
        });
    }
    ctx.schedule_save();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::providers::{Registry, SearchParams, Searcher};
    use async_trait::async_trait;
    use chrono::Utc;

    struct EchoSearcher;
    #[async_trait]
    impl Searcher for EchoSearcher {
        fn name(&self) -> &str {
            "brave"
        }
        fn description(&self) -> &str {
            "echoes a single fixed result"
        }
        async fn search(
            &self,
            _params: SearchParams,
        ) -> Result<Vec<crate::providers::SearchResultItem>, crate::error::SearchError> {
            Ok(vec![crate::providers::SearchResultItem {
                title: "result".to_string(),
                url: "https://example.com".to_string(),
                snippet: "snippet".to_string(),
                score: Some(1.0),
                source_provider: "brave".to_string(),
            }])
        }
    }

    fn context() -> Arc<OrchestratorContext> {
        let mut registry = Registry::new();
        registry.register(Arc::new(EchoSearcher));
        let path = std::env::temp_dir().join(format!("tools-test-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        OrchestratorContext::with_state_path(registry, ManualClock::new(Utc::now()), &HashMap::new(), path)
    }

    #[tokio::test]
    async fn unified_search_returns_success_for_registered_provider() {
        let ctx = context();
        let result = unified_search(ctx, "anything at all", None, None, None).await;
        assert!(result.success);
        assert_eq!(result.provider_used, "brave");
    }

    #[tokio::test]
    async fn configure_providers_persists_disabled_list() {
        let ctx = context();
        let overrides = configure_providers(
            &ctx,
            ConfigurePatch {
                disabled_providers: Some(vec!["brave".to_string()]),
                ..Default::default()
            },
        );
        assert_eq!(overrides.disabled_providers, Some(vec!["brave".to_string()]));
        assert!(!get_provider_config(&ctx).configuration.providers.get("brave").unwrap().enabled);
    }

    #[tokio::test]
    async fn set_mode_updates_history_and_throttle_defaults() {
        let ctx = context();
        set_mode(&ctx, Mode::Direct).unwrap();
        let report = get_provider_config(&ctx);
        assert_eq!(report.configuration.mode, Mode::Direct);
        assert_eq!(report.configuration.max_history, 100);
        assert_eq!(report.search_order, vec!["brave".to_string()]);
    }

    #[test]
    fn analyze_query_is_exposed_without_dispatch() {
        let ctx = context();
        let report = analyze_query(&ctx, "how to implement websocket authentication");
        assert_eq!(report.analysis.query_type, crate::model::QueryType::Technical);
        assert_eq!(report.recommendation.provider, "brave");
        assert_eq!(report.provider_scores.len(), 1);
    }

    #[test]
    fn provider_health_reports_available_categories() {
        let ctx = context();
        let report = provider_health(&ctx);
        assert_eq!(report.available_search, vec!["brave".to_string()]);
        assert!(report.available_ai_response.is_empty());
        assert!(report.providers.contains_key("brave"));
    }

    #[test]
    fn performance_insights_bundles_statistics_and_history() {
        let ctx = context();
        let report = performance_insights(&ctx);
        assert!(report.provider_statistics.is_empty());
        assert!(report.detailed_export.is_empty());
    }
}
