//! Per-provider circuit breaker and cooldown state machine.
//!
//! Grounded on the breaker bookkeeping in `mcp_service.rs`'s
//! `ensure_connected` (error count, opened-at timestamp, open/closed state
//! per pooled client), generalized from that file's single breaker variant
//! into the richer rate-limit / credit-exhaustion / auth-lockout / breaker
//! state machine this system's error taxonomy requires, and switched from a
//! background-timer model to the lazy-expiry model the data model mandates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{ErrorKind, SearchError};

/// Providers rejoin the failure-decay pool if they've succeeded recently;
/// this bounds how long a flaky-then-recovered provider keeps a stale
/// failure count.
const FAILURE_RESET_WINDOW: Duration = Duration::minutes(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub available: bool,
    pub failure_count: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<LastError>,
    pub rate_limited_until: Option<DateTime<Utc>>,
    pub circuit_breaker_open: bool,
    pub circuit_breaker_open_until: Option<DateTime<Utc>>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            available: true,
            failure_count: 0,
            last_success: None,
            last_error: None,
            rate_limited_until: None,
            circuit_breaker_open: false,
            circuit_breaker_open_until: None,
        }
    }
}

pub struct HealthManager {
    clock: Arc<dyn Clock>,
    state: Mutex<HashMap<String, ProviderHealth>>,
    circuit_breaker_threshold: Mutex<u32>,
    circuit_breaker_timeout_ms: Mutex<i64>,
}

impl HealthManager {
    pub fn new(clock: Arc<dyn Clock>, circuit_breaker_threshold: u32, circuit_breaker_timeout_ms: i64) -> Self {
        Self {
            clock,
            state: Mutex::new(HashMap::new()),
            circuit_breaker_threshold: Mutex::new(circuit_breaker_threshold),
            circuit_breaker_timeout_ms: Mutex::new(circuit_breaker_timeout_ms),
        }
    }

    pub fn update_breaker_params(&self, threshold: u32, timeout_ms: i64) {
        *self.circuit_breaker_threshold.lock() = threshold;
        *self.circuit_breaker_timeout_ms.lock() = timeout_ms;
    }

    pub fn record_success(&self, provider: &str) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let entry = state.entry(provider.to_string()).or_default();
        entry.last_error = None;
        entry.rate_limited_until = None;
        entry.circuit_breaker_open = false;
        entry.circuit_breaker_open_until = None;
        entry.failure_count = 0;
        entry.available = true;
        entry.last_success = Some(now);
    }

    pub fn record_failure(&self, provider: &str, error: &SearchError) {
        let now = self.clock.now();
        let threshold = *self.circuit_breaker_threshold.lock();
        let timeout_ms = *self.circuit_breaker_timeout_ms.lock();
        let mut state = self.state.lock();
        let entry = state.entry(provider.to_string()).or_default();
        entry.last_error = Some(LastError {
            kind: error.kind,
            message: error.message.clone(),
        });

        match error.effective_kind() {
            ErrorKind::RateLimit => {
                entry.rate_limited_until = Some(error.reset_at.unwrap_or(now + Duration::hours(1)));
                entry.available = false;
                tracing::warn!(provider, until = %entry.rate_limited_until.unwrap(), "provider rate-limited");
            }
            ErrorKind::CreditExhausted | ErrorKind::QuotaExceeded => {
                entry.rate_limited_until = Some(now + Duration::hours(24));
                entry.available = false;
                tracing::warn!(provider, "provider credit exhausted, cooling down 24h");
            }
            ErrorKind::AuthenticationError => {
                entry.available = false;
                tracing::error!(provider, "provider authentication failed, marking unavailable");
            }
            ErrorKind::ProviderError | ErrorKind::ApiError | ErrorKind::Timeout => {
                entry.failure_count += 1;
                if entry.failure_count >= threshold {
                    entry.circuit_breaker_open = true;
                    entry.circuit_breaker_open_until = Some(now + Duration::milliseconds(timeout_ms));
                    entry.available = false;
                    tracing::warn!(provider, failure_count = entry.failure_count, "circuit breaker opened");
                }
            }
            ErrorKind::InvalidInput => {}
        }
    }

    /// Applies lazy expiry and returns the resulting availability. Must be
    /// called before every dispatch decision — no background thread keeps
    /// cooldowns in sync otherwise.
    pub fn is_available(&self, provider: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let entry = state.entry(provider.to_string()).or_default();
        expire_lazily(entry, now);
        entry.available
    }

    pub fn reset(&self, provider: &str) {
        let mut state = self.state.lock();
        state.insert(provider.to_string(), ProviderHealth::default());
    }

    pub fn snapshot(&self) -> HashMap<String, ProviderHealth> {
        self.state.lock().clone()
    }

    pub fn restore(&self, snapshot: HashMap<String, ProviderHealth>) {
        *self.state.lock() = snapshot;
    }

    pub fn ensure_registered(&self, provider: &str) {
        self.state.lock().entry(provider.to_string()).or_default();
    }
}

fn expire_lazily(entry: &mut ProviderHealth, now: DateTime<Utc>) {
    if let Some(until) = entry.rate_limited_until {
        if now > until {
            entry.rate_limited_until = None;
            entry.available = true;
        }
    }
    if let Some(until) = entry.circuit_breaker_open_until {
        if now > until {
            entry.circuit_breaker_open = false;
            entry.circuit_breaker_open_until = None;
            entry.failure_count = 0;
            entry.available = true;
        }
    }
    if let Some(last_success) = entry.last_success {
        if now - last_success < FAILURE_RESET_WINDOW && entry.failure_count > 0 {
            entry.failure_count /= 2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manager(threshold: u32) -> (Arc<ManualClock>, HealthManager) {
        let clock = ManualClock::new(Utc::now());
        let manager = HealthManager::new(clock.clone(), threshold, 60_000);
        (clock, manager)
    }

    #[test]
    fn rate_limit_expires_at_reset_time() {
        let (clock, manager) = manager(5);
        let now = clock.now();
        let reset_at = now + Duration::seconds(600);
        manager.record_failure(
            "tavily",
            &SearchError::new("tavily", ErrorKind::RateLimit, "rate limited").with_reset_at(reset_at),
        );
        assert!(!manager.is_available("tavily"));
        clock.advance(Duration::seconds(599));
        assert!(!manager.is_available("tavily"));
        clock.advance(Duration::seconds(2));
        assert!(manager.is_available("tavily"));
    }

    #[test]
    fn breaker_opens_at_exact_threshold() {
        let (_clock, manager) = manager(3);
        for _ in 0..2 {
            manager.record_failure("kagi", &SearchError::new("kagi", ErrorKind::ProviderError, "boom"));
        }
        assert!(manager.is_available("kagi"), "should still be available below threshold");
        manager.record_failure("kagi", &SearchError::new("kagi", ErrorKind::ProviderError, "boom"));
        assert!(!manager.is_available("kagi"));
    }

    #[test]
    fn credit_exhaustion_cools_down_for_24_hours() {
        let (clock, manager) = manager(5);
        manager.record_failure(
            "brave",
            &SearchError::new("brave", ErrorKind::CreditExhausted, "out of credits"),
        );
        assert!(!manager.is_available("brave"));
        clock.advance(Duration::hours(23));
        assert!(!manager.is_available("brave"));
        let failure_count_before = manager.snapshot().get("brave").unwrap().failure_count;
        clock.advance(Duration::hours(2));
        assert!(manager.is_available("brave"));
        assert_eq!(manager.snapshot().get("brave").unwrap().failure_count, failure_count_before);
    }

    #[test]
    fn manual_reset_clears_all_failure_state() {
        let (_clock, manager) = manager(2);
        manager.record_failure("kagi", &SearchError::new("kagi", ErrorKind::ProviderError, "boom"));
        manager.record_failure("kagi", &SearchError::new("kagi", ErrorKind::ProviderError, "boom"));
        assert!(!manager.is_available("kagi"));
        manager.reset("kagi");
        assert!(manager.is_available("kagi"));
    }
}
