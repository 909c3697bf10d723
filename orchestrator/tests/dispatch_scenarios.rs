//! Orchestrator-level scenarios exercising a fully wired `OrchestratorContext`
//! rather than any single subsystem in isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use search_orchestrator::{
    ErrorKind, ManualClock, OrchestratorContext, Registry, SearchError, SearchOrchestrator,
    SearchParams, SearchResultItem, Searcher,
};

struct ScriptedSearcher {
    name: String,
    outcomes: Mutex<Vec<Result<Vec<SearchResultItem>, SearchError>>>,
    calls: AtomicU32,
}

impl ScriptedSearcher {
    fn new(name: &str, outcomes: Vec<Result<Vec<SearchResultItem>, SearchError>>) -> Arc<Self> {
        Arc::new(Self { name: name.to_string(), outcomes: Mutex::new(outcomes), calls: AtomicU32::new(0) })
    }
}

#[async_trait]
impl Searcher for ScriptedSearcher {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "scripted test searcher"
    }
    async fn search(&self, _params: SearchParams) -> Result<Vec<SearchResultItem>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock();
        if outcomes.is_empty() {
            Err(SearchError::new(&self.name, ErrorKind::ProviderError, "exhausted script"))
        } else {
            outcomes.remove(0)
        }
    }
}

fn result_item(provider: &str) -> SearchResultItem {
    SearchResultItem {
        title: "result".to_string(),
        url: "https://example.com".to_string(),
        snippet: "snippet".to_string(),
        score: Some(0.9),
        source_provider: provider.to_string(),
    }
}

fn scratch_path(label: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("orchestrator-scenario-{}-{}.json", label, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

/// S3: tavily is rate-limited with a server-provided reset, brave succeeds.
#[tokio::test]
async fn rate_limited_provider_falls_back_and_stays_unavailable() {
    let mut registry = Registry::new();
    registry.register(ScriptedSearcher::new(
        "tavily",
        vec![Err(SearchError::new("tavily", ErrorKind::RateLimit, "rate limited")
            .with_reset_at(Utc::now() + chrono::Duration::seconds(600)))],
    ));
    registry.register(ScriptedSearcher::new("brave", vec![Ok(vec![result_item("brave")])]));

    let clock = ManualClock::new(Utc::now());
    let ctx = OrchestratorContext::with_state_path(registry, clock.clone(), &HashMap::new(), scratch_path("s3"));
    let orchestrator = SearchOrchestrator::new(ctx.clone());

    let result = orchestrator
        .unified_search("best ramen in town", None, None, None, CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.provider_used, "brave");
    assert_eq!(result.fallback_attempts, vec!["tavily".to_string()]);

    clock.advance(chrono::Duration::minutes(9));
    assert!(!ctx.health.is_available("tavily"), "tavily must still be cooling down within 10 minutes");
}

/// S4: breaker opens at the exact threshold and a subsequent call skips kagi
/// even though it is first by configured priority.
#[tokio::test]
async fn breaker_open_provider_is_skipped_on_next_dispatch() {
    let mut registry = Registry::new();
    registry.register(ScriptedSearcher::new(
        "kagi",
        vec![
            Err(SearchError::new("kagi", ErrorKind::ProviderError, "boom")),
            Err(SearchError::new("kagi", ErrorKind::ProviderError, "boom")),
            Err(SearchError::new("kagi", ErrorKind::ProviderError, "boom")),
        ],
    ));
    registry.register(ScriptedSearcher::new(
        "brave",
        vec![
            Ok(vec![result_item("brave")]),
            Ok(vec![result_item("brave")]),
            Ok(vec![result_item("brave")]),
            Ok(vec![result_item("brave")]),
        ],
    ));

    let clock = ManualClock::new(Utc::now());
    let ctx = OrchestratorContext::with_state_path(registry, clock, &HashMap::new(), scratch_path("s4"));
    {
        let mut config = ctx.config.lock();
        config.circuit_breaker_threshold = 3;
        config.search_order = vec!["kagi".to_string(), "brave".to_string()];
        for settings in config.providers.values_mut() {
            settings.max_retries = 0;
        }
    }
    ctx.health.update_breaker_params(3, 60_000);

    let orchestrator = SearchOrchestrator::new(ctx.clone());
    for _ in 0..3 {
        let _ = orchestrator.unified_search("database connection refused", None, None, None, CancellationToken::new()).await;
    }
    assert!(!ctx.health.is_available("kagi"), "breaker should be open after 3 consecutive failures");

    let fourth = orchestrator.unified_search("database connection refused", None, None, None, CancellationToken::new()).await;
    assert!(fourth.success);
    assert_eq!(fourth.provider_used, "brave");
    assert!(!fourth.fallback_attempts.contains(&"kagi".to_string()), "kagi must not be dispatched while its breaker is open");
}

/// S5: cancelling mid-attempt yields `{success:false, error:"cancelled"}` and
/// accumulates only the fallback attempts made before the cancellation.
#[tokio::test]
async fn cancellation_mid_attempt_stops_the_fallback_loop() {
    struct HangingSearcher;
    #[async_trait]
    impl Searcher for HangingSearcher {
        fn name(&self) -> &str {
            "tavily"
        }
        fn description(&self) -> &str {
            "never returns"
        }
        async fn search(&self, _params: SearchParams) -> Result<Vec<SearchResultItem>, SearchError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    let mut registry = Registry::new();
    registry.register(Arc::new(HangingSearcher));
    let ctx = OrchestratorContext::with_state_path(
        registry,
        ManualClock::new(Utc::now()),
        &HashMap::new(),
        scratch_path("s5"),
    );
    let orchestrator = SearchOrchestrator::new(ctx);

    let token = CancellationToken::new();
    let token_clone = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token_clone.cancel();
    });

    let started = std::time::Instant::now();
    let result = orchestrator.unified_search("anything", None, None, None, token).await;
    assert!(started.elapsed() < std::time::Duration::from_secs(5), "cancellation must not wait out the per-attempt deadline");
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    assert!(result.fallback_attempts.is_empty());
}

/// S6: credit exhaustion cools a provider down for 24h at the dispatch level,
/// not just inside the health-manager unit tests.
#[tokio::test]
async fn credit_exhaustion_recovers_after_24_hours() {
    let mut registry = Registry::new();
    registry.register(ScriptedSearcher::new(
        "brave",
        vec![
            Err(SearchError::new("brave", ErrorKind::ApiError, "monthly credit limit reached")),
            Ok(vec![result_item("brave")]),
        ],
    ));

    let clock = ManualClock::new(Utc::now());
    let ctx = OrchestratorContext::with_state_path(registry, clock.clone(), &HashMap::new(), scratch_path("s6"));
    {
        let mut config = ctx.config.lock();
        for settings in config.providers.values_mut() {
            settings.max_retries = 0;
        }
    }
    let orchestrator = SearchOrchestrator::new(ctx.clone());

    let first = orchestrator.unified_search("brave only query", None, None, None, CancellationToken::new()).await;
    assert!(!first.success);
    assert!(!ctx.health.is_available("brave"));

    clock.advance(chrono::Duration::hours(23));
    assert!(!ctx.health.is_available("brave"));

    clock.advance(chrono::Duration::hours(2));
    assert!(ctx.health.is_available("brave"));

    let second = orchestrator.unified_search("brave only query", None, None, None, CancellationToken::new()).await;
    assert!(second.success);
    assert_eq!(second.provider_used, "brave");
}

/// Property #5: recommendation confidence gate.
#[tokio::test]
async fn low_confidence_recommendation_does_not_override_adaptive_order() {
    let mut registry = Registry::new();
    registry.register(ScriptedSearcher::new("tavily", vec![Ok(vec![result_item("tavily")])]));
    registry.register(ScriptedSearcher::new("kagi", vec![Ok(vec![result_item("kagi")])]));
    registry.register(ScriptedSearcher::new("brave", vec![Ok(vec![result_item("brave")])]));

    let ctx = OrchestratorContext::with_state_path(
        registry,
        ManualClock::new(Utc::now()),
        &HashMap::new(),
        scratch_path("prop5"),
    );
    // "definition" is not in any standard provider's strong-for set, so the
    // top score tops out at exactly 70 (base 50 + fast-for-simple + privacy),
    // which does not clear the ">70" gate.
    let characteristics = ctx.analyzer.analyze("definition of osmosis");
    assert_eq!(characteristics.query_type, search_orchestrator::QueryType::Definition);

    let descriptors: Vec<_> = ["tavily", "kagi", "brave"]
        .iter()
        .filter_map(|n| search_orchestrator::providers::descriptor(n))
        .collect();
    let recommendation = ctx.analyzer.get_recommended_provider(&characteristics, &descriptors);
    assert!(
        recommendation.confidence <= 70.0,
        "expected a gate-missing recommendation for a query type no provider specializes in, got {}",
        recommendation.confidence
    );
}

/// Property #6: fallback completeness — every available provider appears
/// exactly once in `fallback_attempts` on total exhaustion.
#[tokio::test]
async fn exhaustion_visits_every_available_provider_exactly_once() {
    let mut registry = Registry::new();
    for name in ["tavily", "kagi", "brave"] {
        registry.register(ScriptedSearcher::new(
            name,
            vec![Err(SearchError::new(name, ErrorKind::InvalidInput, "malformed query"))],
        ));
    }

    let ctx = OrchestratorContext::with_state_path(
        registry,
        ManualClock::new(Utc::now()),
        &HashMap::new(),
        scratch_path("prop6"),
    );
    let orchestrator = SearchOrchestrator::new(ctx);
    let result = orchestrator.unified_search("::::", None, None, None, CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.fallback_attempts.len(), 3);
    let unique: std::collections::HashSet<_> = result.fallback_attempts.iter().collect();
    assert_eq!(unique.len(), 3);
}

/// Property #7, exercised through a full context: health, history, and
/// configuration overrides all survive a save/reload cycle.
#[tokio::test]
async fn full_context_state_survives_snapshot_round_trip() {
    let path = scratch_path("prop7");
    let mut registry = Registry::new();
    registry.register(ScriptedSearcher::new("brave", vec![Ok(vec![result_item("brave")])]));

    let clock = ManualClock::new(Utc::now());
    let ctx = OrchestratorContext::with_state_path(registry, clock.clone(), &HashMap::new(), path.clone());
    ctx.config.lock().circuit_breaker_threshold = 9;
    let orchestrator = SearchOrchestrator::new(ctx.clone());
    let outcome = orchestrator.unified_search("anything", None, None, None, CancellationToken::new()).await;
    assert!(outcome.success);

    ctx.schedule_save();
    let save_throttle_ms = ctx.config.lock().save_throttle_ms as u64;
    tokio::time::sleep(std::time::Duration::from_millis(save_throttle_ms + 50)).await;

    let mut registry2 = Registry::new();
    registry2.register(ScriptedSearcher::new("brave", vec![]));
    let ctx2 = OrchestratorContext::with_state_path(registry2, clock, &HashMap::new(), path);
    assert!(!ctx2.tracker.detailed_export().is_empty(), "performance history should have been restored");
}
