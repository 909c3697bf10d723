//! Provider configuration: mode, per-provider settings, fallback/circuit
//! parameters, and environment-variable overrides.
//!
//! Grounded on the defaults-then-patch-then-clamp shape of
//! `RuntimeGovernorService::set_policy` / `apply_patch` in the reference
//! desktop app this crate's dispatch logic descends from, generalized from a
//! single runtime policy row to the full provider configuration surface.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Direct,
    Unified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub priority: u32,
    pub preferred_for: Vec<String>,
    pub max_retries: u32,
    pub timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 0,
            preferred_for: Vec::new(),
            max_retries: 2,
            timeout_ms: 30_000,
        }
    }
}

/// Patch accepted by `configure_providers`; every field is optional so a
/// caller can touch only what it means to change.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConfigurePatch {
    pub provider_order: Option<Vec<String>>,
    pub disabled_providers: Option<Vec<String>>,
    pub fallback_enabled: Option<bool>,
    pub category: Option<Category>,
}

/// The subset of configuration state that gets persisted into the snapshot's
/// `configuration_overrides` field — every mutation goes through
/// `ProviderConfig`'s setters, never a mutated-in-place returned value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationOverrides {
    pub mode: Option<Mode>,
    pub search_order: Option<Vec<String>>,
    pub ai_response_order: Option<Vec<String>>,
    pub disabled_providers: Option<Vec<String>>,
    pub fallback_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub mode: Mode,
    pub providers: HashMap<String, ProviderSettings>,
    pub search_order: Vec<String>,
    pub ai_response_order: Vec<String>,
    pub fallback_enabled: bool,
    pub fallback_delay_ms: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout_ms: i64,
    pub max_history: usize,
    pub save_throttle_ms: i64,
}

impl ProviderConfig {
    /// Seeds default settings from a registry's (name, category) pairs, in
    /// registration order.
    pub fn from_registry(entries: &[(&str, Category)]) -> Self {
        let mut providers = HashMap::new();
        let mut search_order = Vec::new();
        let mut ai_response_order = Vec::new();

        for (name, category) in entries {
            providers.insert((*name).to_string(), ProviderSettings::default());
            match category {
                Category::Search => search_order.push((*name).to_string()),
                Category::AiResponse => ai_response_order.push((*name).to_string()),
            }
        }
        for (idx, name) in search_order.iter().enumerate() {
            if let Some(s) = providers.get_mut(name) {
                s.priority = idx as u32;
            }
        }
        for (idx, name) in ai_response_order.iter().enumerate() {
            if let Some(s) = providers.get_mut(name) {
                s.priority = idx as u32;
            }
        }

        Self {
            mode: Mode::Unified,
            providers,
            search_order,
            ai_response_order,
            fallback_enabled: true,
            fallback_delay_ms: 500,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_ms: 60_000,
            max_history: 1000,
            save_throttle_ms: 5000,
        }
    }

    pub fn order_for(&self, category: Category) -> &[String] {
        match category {
            Category::Search => &self.search_order,
            Category::AiResponse => &self.ai_response_order,
        }
    }

    /// First available provider whose `preferred_for` list substring-matches
    /// the query; falls back to the first available provider in order.
    pub fn get_preferred_provider_for_query(
        &self,
        category: Category,
        query: &str,
        available: &[String],
    ) -> Option<String> {
        let lower = query.to_lowercase();
        let order = self.order_for(category);
        for name in order {
            if !available.contains(name) {
                continue;
            }
            if let Some(settings) = self.providers.get(name) {
                if settings
                    .preferred_for
                    .iter()
                    .any(|kw| lower.contains(&kw.to_lowercase()))
                {
                    return Some(name.clone());
                }
            }
        }
        order.iter().find(|name| available.contains(name)).cloned()
    }

    /// Applies a `configure_providers` patch, returning the persisted
    /// overrides snapshot.
    pub fn apply_patch(&mut self, patch: ConfigurePatch) -> ConfigurationOverrides {
        let category = patch.category.unwrap_or(Category::Search);

        if let Some(order) = patch.provider_order.clone() {
            match category {
                Category::Search => self.search_order = order,
                Category::AiResponse => self.ai_response_order = order,
            }
        }
        if let Some(disabled) = &patch.disabled_providers {
            for settings in self.providers.values_mut() {
                settings.enabled = true;
            }
            for name in disabled {
                if let Some(settings) = self.providers.get_mut(name) {
                    settings.enabled = false;
                }
            }
        }
        if let Some(enabled) = patch.fallback_enabled {
            self.fallback_enabled = enabled;
        }

        self.overrides_snapshot()
    }

    pub fn overrides_snapshot(&self) -> ConfigurationOverrides {
        ConfigurationOverrides {
            mode: Some(self.mode),
            search_order: Some(self.search_order.clone()),
            ai_response_order: Some(self.ai_response_order.clone()),
            disabled_providers: Some(
                self.providers
                    .iter()
                    .filter(|(_, s)| !s.enabled)
                    .map(|(name, _)| name.clone())
                    .collect(),
            ),
            fallback_enabled: Some(self.fallback_enabled),
        }
    }

    pub fn restore_overrides(&mut self, overrides: &ConfigurationOverrides) {
        if let Some(mode) = overrides.mode {
            self.mode = mode;
            self.apply_mode_defaults();
        }
        if let Some(order) = &overrides.search_order {
            self.search_order = order.clone();
        }
        if let Some(order) = &overrides.ai_response_order {
            self.ai_response_order = order.clone();
        }
        if let Some(disabled) = &overrides.disabled_providers {
            for settings in self.providers.values_mut() {
                settings.enabled = true;
            }
            for name in disabled {
                if let Some(settings) = self.providers.get_mut(name) {
                    settings.enabled = false;
                }
            }
        }
        if let Some(enabled) = overrides.fallback_enabled {
            self.fallback_enabled = enabled;
        }
    }

    /// `direct` mode trades a smaller, more frequently flushed history for
    /// lower latency under interactive, on-demand usage.
    fn apply_mode_defaults(&mut self) {
        match self.mode {
            Mode::Direct => {
                self.max_history = 100;
                self.save_throttle_ms = 1000;
            }
            Mode::Unified => {
                self.max_history = 1000;
                self.save_throttle_ms = 5000;
            }
        }
    }

    /// Applies `OMNISEARCH_*` overrides from an explicit map (never reads
    /// `std::env` directly, so tests never race on process-global state).
    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        if let Some(raw) = env.get("OMNISEARCH_MODE") {
            match raw.as_str() {
                "direct" => {
                    self.mode = Mode::Direct;
                    self.apply_mode_defaults();
                }
                "unified" => {
                    self.mode = Mode::Unified;
                    self.apply_mode_defaults();
                }
                other => tracing::warn!(value = other, "invalid OMNISEARCH_MODE, ignoring"),
            }
        }
        if let Some(raw) = env.get("OMNISEARCH_PROVIDER_ORDER") {
            self.search_order = split_csv(raw);
        }
        if let Some(raw) = env.get("OMNISEARCH_AI_PROVIDER_ORDER") {
            self.ai_response_order = split_csv(raw);
        }
        if let Some(raw) = env.get("OMNISEARCH_DISABLED_PROVIDERS") {
            let disabled = split_csv(raw);
            for settings in self.providers.values_mut() {
                settings.enabled = true;
            }
            for name in disabled {
                if let Some(settings) = self.providers.get_mut(&name) {
                    settings.enabled = false;
                }
            }
        }
        if let Some(raw) = env.get("OMNISEARCH_FALLBACK_ENABLED") {
            match raw.to_lowercase().parse::<bool>() {
                Ok(v) => self.fallback_enabled = v,
                Err(_) => tracing::warn!(value = %raw, "invalid OMNISEARCH_FALLBACK_ENABLED, ignoring"),
            }
        }
        apply_bounded_u64(
            env,
            "OMNISEARCH_FALLBACK_DELAY_MS",
            0,
            10_000,
            &mut self.fallback_delay_ms,
        );
        apply_bounded_u32(
            env,
            "OMNISEARCH_CIRCUIT_BREAKER_THRESHOLD",
            1,
            20,
            &mut self.circuit_breaker_threshold,
        );
        apply_bounded_i64(
            env,
            "OMNISEARCH_CIRCUIT_BREAKER_TIMEOUT_MS",
            10_000,
            3_600_000,
            &mut self.circuit_breaker_timeout_ms,
        );
        if let Some(raw) = env.get("OMNISEARCH_MAX_HISTORY") {
            match raw.parse::<usize>() {
                Ok(v) if v > 0 => self.max_history = v,
                _ => tracing::warn!(value = %raw, "invalid OMNISEARCH_MAX_HISTORY, ignoring"),
            }
        }
        if let Some(raw) = env.get("OMNISEARCH_SAVE_THROTTLE_MS") {
            match raw.parse::<i64>() {
                Ok(v) if v >= 0 => self.save_throttle_ms = v,
                _ => tracing::warn!(value = %raw, "invalid OMNISEARCH_SAVE_THROTTLE_MS, ignoring"),
            }
        }
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn apply_bounded_u64(env: &HashMap<String, String>, key: &str, min: u64, max: u64, target: &mut u64) {
    if let Some(raw) = env.get(key) {
        match raw.parse::<u64>() {
            Ok(v) if v >= min && v <= max => *target = v,
            _ => tracing::warn!(value = %raw, key, "invalid numeric override, ignoring"),
        }
    }
}

fn apply_bounded_u32(env: &HashMap<String, String>, key: &str, min: u32, max: u32, target: &mut u32) {
    if let Some(raw) = env.get(key) {
        match raw.parse::<u32>() {
            Ok(v) if v >= min && v <= max => *target = v,
            _ => tracing::warn!(value = %raw, key, "invalid numeric override, ignoring"),
        }
    }
}

fn apply_bounded_i64(env: &HashMap<String, String>, key: &str, min: i64, max: i64, target: &mut i64) {
    if let Some(raw) = env.get(key) {
        match raw.parse::<i64>() {
            Ok(v) if v >= min && v <= max => *target = v,
            _ => tracing::warn!(value = %raw, key, "invalid numeric override, ignoring"),
        }
    }
}

/// Resolves the directory the persisted snapshot (and log files) live under:
/// `OMNISEARCH_STATE_DIR` if set, otherwise the platform temp dir.
pub fn state_dir() -> PathBuf {
    match env::var("OMNISEARCH_STATE_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => env::temp_dir().join("omnisearch"),
    }
}
