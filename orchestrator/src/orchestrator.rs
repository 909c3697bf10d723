//! Combined ranking, per-attempt dispatch, retry/backoff/timeout, and
//! fallback across providers.
//!
//! Grounded on two shapes from the reference desktop app: the
//! order-then-fallback-chain construction in
//! `TaskRouterService::route`/`fallback_chain`, and the
//! timeout-wrapped-adapter-call pattern in `McpService::call_tool`
//! (`tokio::time::timeout` racing the outbound call). The bounded-retry,
//! cancellation-aware attempt loop is the structured-concurrency shape the
//! design notes call for: one attempt = provider call raced against a
//! deadline timer, torn down cleanly on either side winning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::analyzer::QueryAnalyzer;
use crate::clock::Clock;
use crate::config::{state_dir, ProviderConfig};
use crate::error::{ErrorKind, SearchError};
use crate::health::HealthManager;
use crate::model::Category;
use crate::providers::{self, Registry, SearchParams, SearchResultItem};
use crate::state_store::{PersistentState, Snapshot};
use crate::tracker::{PerformanceTracker, QueryPerformanceRecord};

pub struct OrchestratorContext {
    pub analyzer: QueryAnalyzer,
    pub health: Arc<HealthManager>,
    pub tracker: Arc<PerformanceTracker>,
    pub config: Arc<Mutex<ProviderConfig>>,
    pub registry: Arc<Registry>,
    pub state: Arc<PersistentState>,
    pub clock: Arc<dyn Clock>,
}

impl OrchestratorContext {
    pub fn new(registry: Registry, clock: Arc<dyn Clock>, env: &HashMap<String, String>) -> Arc<Self> {
        Self::with_state_path(registry, clock, env, state_dir().join("snapshot.json"))
    }

    pub fn with_state_path(
        registry: Registry,
        clock: Arc<dyn Clock>,
        env: &HashMap<String, String>,
        state_path: std::path::PathBuf,
    ) -> Arc<Self> {
        let registered = registry.registered_names();
        let entries: Vec<(&str, Category)> = providers::PROVIDER_DESCRIPTORS
            .iter()
            .filter(|d| registered.iter().any(|n| n == d.name))
            .map(|d| (d.name, d.category))
            .collect();

        let mut config = ProviderConfig::from_registry(&entries);
        config.apply_env_overrides(env);

        let health = Arc::new(HealthManager::new(
            clock.clone(),
            config.circuit_breaker_threshold,
            config.circuit_breaker_timeout_ms,
        ));
        let tracker = Arc::new(PerformanceTracker::new(clock.clone(), config.max_history));
        let state = PersistentState::new(state_path, clock.clone(), config.save_throttle_ms);

        let snapshot = state.load();
        health.restore(snapshot.provider_health);
        tracker.restore_history(snapshot.performance_records);
        config.restore_overrides(&snapshot.configuration_overrides);

        Arc::new(Self {
            analyzer: QueryAnalyzer::new(),
            health,
            tracker,
            config: Arc::new(Mutex::new(config)),
            registry: Arc::new(registry),
            state,
            clock,
        })
    }

    /// Every health/tracker/config mutation must reach this — the throttled,
    /// coalesced write the data model mandates.
    pub fn schedule_save(self: &Arc<Self>) {
        let health = self.health.clone();
        let tracker = self.tracker.clone();
        let config = self.config.clone();
        self.state.schedule_save(Arc::new(move || Snapshot {
            version: "1.0".to_string(),
            last_updated: Utc::now(),
            provider_health: health.snapshot(),
            performance_records: tracker.snapshot_history(),
            configuration_overrides: config.lock().overrides_snapshot(),
        }));
    }
}

#[derive(Debug, Clone)]
pub struct QueryAnalysisInfo {
    pub query_type: String,
    pub recommended_provider: String,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone)]
pub struct UnifiedResult {
    pub results: Vec<SearchResultItem>,
    pub provider_used: String,
    pub fallback_attempts: Vec<String>,
    pub total_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub query_analysis: Option<QueryAnalysisInfo>,
}

impl UnifiedResult {
    fn cancelled(fallback_attempts: Vec<String>, elapsed: Duration) -> Self {
        Self {
            results: Vec::new(),
            provider_used: String::new(),
            fallback_attempts,
            total_time_ms: elapsed.as_millis() as u64,
            success: false,
            error: Some("cancelled".to_string()),
            query_analysis: None,
        }
    }
}

enum AttemptOutcome {
    Success { results: Vec<SearchResultItem>, response_time_ms: u64 },
    Failure { error: SearchError, response_time_ms: u64 },
    Cancelled,
}

pub struct SearchOrchestrator {
    ctx: Arc<OrchestratorContext>,
}

impl SearchOrchestrator {
    pub fn new(ctx: Arc<OrchestratorContext>) -> Self {
        Self { ctx }
    }

    pub async fn unified_search(
        &self,
        query: &str,
        limit: Option<u32>,
        include_domains: Option<Vec<String>>,
        exclude_domains: Option<Vec<String>>,
        cancellation: CancellationToken,
    ) -> UnifiedResult {
        self.dispatch(Category::Search, query, limit, include_domains, exclude_domains, true, cancellation)
            .await
    }

    pub async fn unified_ai_search(
        &self,
        query: &str,
        limit: Option<u32>,
        include_domains: Option<Vec<String>>,
        exclude_domains: Option<Vec<String>>,
        cancellation: CancellationToken,
    ) -> UnifiedResult {
        self.dispatch(Category::AiResponse, query, limit, include_domains, exclude_domains, false, cancellation)
            .await
    }

    async fn dispatch(
        &self,
        category: Category,
        query: &str,
        limit: Option<u32>,
        include_domains: Option<Vec<String>>,
        exclude_domains: Option<Vec<String>>,
        consult_analyzer: bool,
        cancellation: CancellationToken,
    ) -> UnifiedResult {
        let start = Instant::now();
        let characteristics = self.ctx.analyzer.analyze(query);
        tracing::debug!(
            category = category.as_str(),
            query_type = characteristics.query_type.as_str(),
            "dispatching search"
        );

        let (order, fallback_enabled, fallback_delay_ms) = {
            let config = self.ctx.config.lock();
            (config.order_for(category).to_vec(), config.fallback_enabled, config.fallback_delay_ms)
        };

        let available: Vec<String> = order
            .into_iter()
            .filter(|name| self.is_enabled(name) && self.ctx.health.is_available(name))
            .collect();

        let descriptors: Vec<&'static crate::model::ProviderDescriptor> =
            available.iter().filter_map(|n| providers::descriptor(n)).collect();

        let mut query_analysis = None;
        let mut recommended_provider = String::new();
        let mut confidence = 0.0;

        if consult_analyzer {
            let recommendation = self.ctx.analyzer.get_recommended_provider(&characteristics, &descriptors);
            recommended_provider = recommendation.provider.clone();
            confidence = recommendation.confidence;
            query_analysis = Some(QueryAnalysisInfo {
                query_type: characteristics.query_type.as_str().to_string(),
                recommended_provider: recommendation.provider,
                confidence: recommendation.confidence,
                reasoning: recommendation.reasoning,
            });
        }

        let adaptive = self.ctx.tracker.adaptive_rank(&characteristics, &available);

        let dispatch_order: Vec<String> =
            if consult_analyzer && !recommended_provider.is_empty() && confidence > 70.0 && available.contains(&recommended_provider) {
                let mut ordered = vec![recommended_provider.clone()];
                ordered.extend(adaptive.into_iter().filter(|p| p != &recommended_provider));
                ordered
            } else {
                adaptive
            };

        let mut fallback_attempts = Vec::new();

        for (idx, provider_name) in dispatch_order.iter().enumerate() {
            if cancellation.is_cancelled() {
                return UnifiedResult::cancelled(fallback_attempts, start.elapsed());
            }
            if idx > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(fallback_delay_ms)) => {}
                    _ = cancellation.cancelled() => {
                        return UnifiedResult::cancelled(fallback_attempts, start.elapsed());
                    }
                }
            }

            let (max_retries, timeout_ms) = {
                let config = self.ctx.config.lock();
                config
                    .providers
                    .get(provider_name)
                    .map(|s| (s.max_retries, s.timeout_ms))
                    .unwrap_or((2, 30_000))
            };

            let params = SearchParams {
                query: query.to_string(),
                limit,
                include_domains: include_domains.clone(),
                exclude_domains: exclude_domains.clone(),
            };

            match self
                .attempt_with_retries(provider_name, params, max_retries, timeout_ms, &cancellation)
                .await
            {
                AttemptOutcome::Success { results, response_time_ms } => {
                    tracing::info!(
                        provider = provider_name.as_str(),
                        response_time_ms,
                        result_count = results.len(),
                        "search succeeded"
                    );
                    self.ctx.health.record_success(provider_name);
                    self.ctx.tracker.record_query_result(QueryPerformanceRecord {
                        query: query.to_string(),
                        characteristics: characteristics.clone(),
                        provider_used: provider_name.clone(),
                        success: true,
                        response_time_ms,
                        result_count: results.len() as u32,
                        timestamp: self.ctx.clock.now(),
                        error_kind: None,
                        user_feedback: None,
                    });
                    self.ctx.schedule_save();
                    return UnifiedResult {
                        results,
                        provider_used: provider_name.clone(),
                        fallback_attempts,
                        total_time_ms: start.elapsed().as_millis() as u64,
                        success: true,
                        error: None,
                        query_analysis,
                    };
                }
                AttemptOutcome::Failure { error, response_time_ms } => {
                    tracing::warn!(
                        provider = provider_name.as_str(),
                        error_kind = ?error.effective_kind(),
                        error = %error.message,
                        "search attempt failed, falling back"
                    );
                    self.ctx.health.record_failure(provider_name, &error);
                    self.ctx.tracker.record_query_result(QueryPerformanceRecord {
                        query: query.to_string(),
                        characteristics: characteristics.clone(),
                        provider_used: provider_name.clone(),
                        success: false,
                        response_time_ms,
                        result_count: 0,
                        timestamp: self.ctx.clock.now(),
                        error_kind: Some(error.effective_kind()),
                        user_feedback: None,
                    });
                    self.ctx.schedule_save();
                    fallback_attempts.push(provider_name.clone());
                    if !fallback_enabled {
                        break;
                    }
                }
                AttemptOutcome::Cancelled => {
                    return UnifiedResult::cancelled(fallback_attempts, start.elapsed());
                }
            }
        }

        tracing::warn!(
            category = category.as_str(),
            attempts = fallback_attempts.len(),
            "all providers exhausted"
        );
        UnifiedResult {
            results: Vec::new(),
            provider_used: String::new(),
            total_time_ms: start.elapsed().as_millis() as u64,
            success: false,
            error: Some(format!(
                "All {} {} providers failed",
                fallback_attempts.len(),
                category.as_str()
            )),
            query_analysis,
            fallback_attempts,
        }
    }

    fn is_enabled(&self, name: &str) -> bool {
        self.ctx
            .config
            .lock()
            .providers
            .get(name)
            .map(|s| s.enabled)
            .unwrap_or(false)
    }

    /// One provider's up-to-three-attempt sequence: a failed attempt is
    /// retried with exponential backoff unless its error kind says not to,
    /// and every individual call races a per-attempt deadline.
    async fn attempt_with_retries(
        &self,
        provider_name: &str,
        params: SearchParams,
        max_retries: u32,
        timeout_ms: u64,
        cancellation: &CancellationToken,
    ) -> AttemptOutcome {
        let searcher = match self.ctx.registry.get(provider_name) {
            Some(s) => s,
            None => {
                return AttemptOutcome::Failure {
                    error: SearchError::new(provider_name, ErrorKind::ProviderError, "provider not registered"),
                    response_time_ms: 0,
                }
            }
        };

        let mut attempt = 0u32;
        loop {
            if cancellation.is_cancelled() {
                return AttemptOutcome::Cancelled;
            }

            tracing::debug!(provider = provider_name, attempt, "calling provider");
            let call_start = Instant::now();
            let call = searcher.search(params.clone());
            let outcome = tokio::select! {
                res = tokio::time::timeout(Duration::from_millis(timeout_ms), call) => res,
                _ = cancellation.cancelled() => return AttemptOutcome::Cancelled,
            };
            let response_time_ms = call_start.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(Ok(results)) => return AttemptOutcome::Success { results, response_time_ms },
                Ok(Err(error)) => error,
                Err(_elapsed) => SearchError::new(provider_name, ErrorKind::Timeout, "per-attempt deadline exceeded"),
            };

            let retryable = error.effective_kind().is_retryable();
            if !retryable || attempt >= max_retries {
                return AttemptOutcome::Failure { error, response_time_ms };
            }

            let backoff_ms = (1000u64 * 2u64.pow(attempt)).min(5000);
            attempt += 1;
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                _ = cancellation.cancelled() => return AttemptOutcome::Cancelled,
            }
        }
    }
}
