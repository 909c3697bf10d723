//! Rolling per-provider statistics and adaptive ranking.
//!
//! Grounded on the weighted multi-factor scoring shape of
//! `RecommendationService::recompute` (fixed-weight linear combination,
//! sort descending, tier/primary selection) in the reference desktop app,
//! adapted from a one-shot RAM/VRAM/perf fit computation to an incrementally
//! maintained per-(provider, query_type) running statistic, per the explicit
//! requirement to avoid the O(n) history scan the tracker's ancestor used.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::ErrorKind;
use crate::model::{QueryCharacteristics, QueryType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPerformanceRecord {
    pub query: String,
    pub characteristics: QueryCharacteristics,
    pub provider_used: String,
    pub success: bool,
    pub response_time_ms: u64,
    pub result_count: u32,
    pub timestamp: DateTime<Utc>,
    pub error_kind: Option<ErrorKind>,
    pub user_feedback: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentWindows {
    pub last_hour: f64,
    pub last_day: f64,
    pub last_week: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingAggregates {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub average_response_time: f64,
    pub query_type_performance: HashMap<QueryType, TypeStats>,
    pub recent_performance: RecentWindows,
}

#[derive(Debug, Clone, Default)]
pub struct Insights {
    pub best_overall: Option<String>,
    pub best_for_speed: Option<String>,
    pub most_reliable: Option<String>,
    pub trending_up: Vec<String>,
    pub trending_down: Vec<String>,
}

pub struct PerformanceTracker {
    clock: Arc<dyn Clock>,
    history: Mutex<Vec<QueryPerformanceRecord>>,
    aggregates: Mutex<HashMap<String, RollingAggregates>>,
    max_history: Mutex<usize>,
}

impl PerformanceTracker {
    pub fn new(clock: Arc<dyn Clock>, max_history: usize) -> Self {
        Self {
            clock,
            history: Mutex::new(Vec::new()),
            aggregates: Mutex::new(HashMap::new()),
            max_history: Mutex::new(max_history),
        }
    }

    pub fn set_max_history(&self, max_history: usize) {
        *self.max_history.lock() = max_history;
        let cap = max_history;
        let mut history = self.history.lock();
        if history.len() > cap {
            let overflow = history.len() - cap;
            history.drain(0..overflow);
        }
    }

    /// O(1) amortized update of the running aggregates; only the recent
    /// window recomputation scans history, as the spec allows.
    pub fn record_query_result(&self, record: QueryPerformanceRecord) {
        let provider = record.provider_used.clone();
        let query_type = record.characteristics.query_type;
        let success = record.success;
        let response_time = record.response_time_ms as f64;

        {
            let mut history = self.history.lock();
            history.push(record);
            let cap = *self.max_history.lock();
            if history.len() > cap {
                let overflow = history.len() - cap;
                history.drain(0..overflow);
            }
        }

        let mut aggregates = self.aggregates.lock();
        let agg = aggregates.entry(provider.clone()).or_default();
        agg.total_requests += 1;
        if success {
            agg.successful_requests += 1;
        } else {
            agg.failed_requests += 1;
        }
        agg.success_rate = agg.successful_requests as f64 / agg.total_requests as f64;
        agg.average_response_time += (response_time - agg.average_response_time) / agg.total_requests as f64;

        let type_stats = agg.query_type_performance.entry(query_type).or_default();
        type_stats.count += 1;
        type_stats.success_rate = (type_stats.success_rate * (type_stats.count - 1) as f64
            + if success { 1.0 } else { 0.0 })
            / type_stats.count as f64;
        type_stats.avg_response_time +=
            (response_time - type_stats.avg_response_time) / type_stats.count as f64;

        drop(aggregates);
        self.recompute_recent_window(&provider);
    }

    fn recompute_recent_window(&self, provider: &str) {
        let now = self.clock.now();
        let history = self.history.lock();
        let overall_rate = self
            .aggregates
            .lock()
            .get(provider)
            .map(|a| a.success_rate)
            .unwrap_or(0.5);

        let window_rate = |span: Duration| -> f64 {
            let cutoff = now - span;
            let mut total = 0u64;
            let mut successes = 0u64;
            for record in history.iter().filter(|r| r.provider_used == provider && r.timestamp >= cutoff) {
                total += 1;
                if record.success {
                    successes += 1;
                }
            }
            if total == 0 {
                overall_rate
            } else {
                successes as f64 / total as f64
            }
        };

        let last_hour = window_rate(Duration::hours(1));
        let last_day = window_rate(Duration::days(1));
        let last_week = window_rate(Duration::weeks(1));
        drop(history);

        let mut aggregates = self.aggregates.lock();
        let agg = aggregates.entry(provider.to_string()).or_default();
        agg.recent_performance = RecentWindows { last_hour, last_day, last_week };
    }

    /// Weighted combination of success rate, recent performance, per-type
    /// success rate, and speed. Providers with no stats score 0.5.
    pub fn adaptive_rank(&self, characteristics: &QueryCharacteristics, candidates: &[String]) -> Vec<String> {
        let aggregates = self.aggregates.lock();
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|name| {
                let score = match aggregates.get(name) {
                    Some(agg) => {
                        let type_rate = agg
                            .query_type_performance
                            .get(&characteristics.query_type)
                            .filter(|t| t.count >= 3)
                            .map(|t| t.success_rate)
                            .unwrap_or(agg.success_rate);
                        let speed_component = (1.0 - agg.average_response_time / 30_000.0).max(0.0);
                        0.2 * agg.success_rate
                            + 0.3 * agg.recent_performance.last_hour
                            + 0.4 * type_rate
                            + 0.1 * speed_component
                    }
                    None => 0.5,
                };
                (name.clone(), score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(name, _)| name).collect()
    }

    pub fn insights(&self) -> Insights {
        let aggregates = self.aggregates.lock();
        let best_overall = aggregates
            .iter()
            .max_by(|(_, a), (_, b)| {
                let sa = a.success_rate * (1.0 - a.average_response_time / 10_000.0);
                let sb = b.success_rate * (1.0 - b.average_response_time / 10_000.0);
                sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(name, _)| name.clone());
        let best_for_speed = aggregates
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.average_response_time
                    .partial_cmp(&b.average_response_time)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(name, _)| name.clone());
        let most_reliable = aggregates
            .iter()
            .max_by(|(_, a), (_, b)| a.success_rate.partial_cmp(&b.success_rate).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| name.clone());

        let mut trending_up = Vec::new();
        let mut trending_down = Vec::new();
        for (name, agg) in aggregates.iter() {
            let delta = agg.recent_performance.last_hour - agg.recent_performance.last_week;
            if delta > 0.1 {
                trending_up.push(name.clone());
            } else if delta < -0.1 {
                trending_down.push(name.clone());
            }
        }

        Insights { best_overall, best_for_speed, most_reliable, trending_up, trending_down }
    }

    pub fn detailed_export(&self) -> HashMap<String, RollingAggregates> {
        self.aggregates.lock().clone()
    }

    pub fn snapshot_history(&self) -> Vec<QueryPerformanceRecord> {
        self.history.lock().clone()
    }

    /// Rebuilds aggregates from scratch on snapshot load, then truncates
    /// history to the cap — the only place a full re-scan is justified.
    pub fn restore_history(&self, mut records: Vec<QueryPerformanceRecord>) {
        let cap = *self.max_history.lock();
        if records.len() > cap {
            let overflow = records.len() - cap;
            records.drain(0..overflow);
        }
        let mut aggregates = HashMap::new();
        for record in &records {
            let agg: &mut RollingAggregates = aggregates.entry(record.provider_used.clone()).or_default();
            agg.total_requests += 1;
            if record.success {
                agg.successful_requests += 1;
            } else {
                agg.failed_requests += 1;
            }
            agg.success_rate = agg.successful_requests as f64 / agg.total_requests as f64;
            agg.average_response_time +=
                (record.response_time_ms as f64 - agg.average_response_time) / agg.total_requests as f64;

            let type_stats = agg.query_type_performance.entry(record.characteristics.query_type).or_default();
            type_stats.count += 1;
            type_stats.success_rate = (type_stats.success_rate * (type_stats.count - 1) as f64
                + if record.success { 1.0 } else { 0.0 })
                / type_stats.count as f64;
            type_stats.avg_response_time +=
                (record.response_time_ms as f64 - type_stats.avg_response_time) / type_stats.count as f64;
        }
        *self.history.lock() = records;
        *self.aggregates.lock() = aggregates;

        let providers: Vec<String> = self.aggregates.lock().keys().cloned().collect();
        for provider in providers {
            self.recompute_recent_window(&provider);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::QueryAnalyzer;
    use crate::clock::ManualClock;

    fn record(provider: &str, success: bool, response_time_ms: u64, query_type: QueryType) -> QueryPerformanceRecord {
        let analyzer = QueryAnalyzer::new();
        let mut characteristics = analyzer.analyze("placeholder query");
        characteristics.query_type = query_type;
        QueryPerformanceRecord {
            query: "placeholder query".to_string(),
            characteristics,
            provider_used: provider.to_string(),
            success,
            response_time_ms,
            result_count: if success { 5 } else { 0 },
            timestamp: Utc::now(),
            error_kind: None,
            user_feedback: None,
        }
    }

    #[test]
    fn incremental_success_rate_matches_running_formula() {
        let clock = ManualClock::new(Utc::now());
        let tracker = PerformanceTracker::new(clock, 1000);
        tracker.record_query_result(record("tavily", true, 100, QueryType::General));
        tracker.record_query_result(record("tavily", false, 200, QueryType::General));
        tracker.record_query_result(record("tavily", true, 300, QueryType::General));
        let export = tracker.detailed_export();
        let agg = export.get("tavily").unwrap();
        assert_eq!(agg.total_requests, 3);
        assert!((agg.success_rate - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn history_eviction_drops_oldest_over_cap() {
        let clock = ManualClock::new(Utc::now());
        let tracker = PerformanceTracker::new(clock, 2);
        tracker.record_query_result(record("brave", true, 100, QueryType::General));
        tracker.record_query_result(record("brave", true, 100, QueryType::General));
        tracker.record_query_result(record("brave", true, 100, QueryType::General));
        assert_eq!(tracker.snapshot_history().len(), 2);
    }

    #[test]
    fn provider_with_no_stats_scores_half() {
        let clock = ManualClock::new(Utc::now());
        let tracker = PerformanceTracker::new(clock, 1000);
        let analyzer = QueryAnalyzer::new();
        let characteristics = analyzer.analyze("anything");
        let ranked = tracker.adaptive_rank(&characteristics, &["kagi".to_string()]);
        assert_eq!(ranked, vec!["kagi".to_string()]);
    }
}
