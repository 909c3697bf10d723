//! Throttled, coalesced JSON snapshot persistence.
//!
//! Grounded on the cancellation-token-gated periodic jobs in
//! `background_service.rs`, adapted from "spawn forever, tick on an
//! interval" to "spawn once per mutation, debounce via a generation token,
//! flush once" — the single-writer discipline the data model requires.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::ConfigurationOverrides;
use crate::error::OrchestratorError;
use crate::health::ProviderHealth;
use crate::tracker::QueryPerformanceRecord;

const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub provider_health: std::collections::HashMap<String, ProviderHealth>,
    pub performance_records: Vec<QueryPerformanceRecord>,
    pub configuration_overrides: ConfigurationOverrides,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            last_updated: Utc::now(),
            provider_health: std::collections::HashMap::new(),
            performance_records: Vec::new(),
            configuration_overrides: ConfigurationOverrides::default(),
        }
    }
}

pub struct PersistentState {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    save_throttle_ms: Mutex<i64>,
    generation: AtomicU64,
}

impl PersistentState {
    pub fn new(path: PathBuf, clock: Arc<dyn Clock>, save_throttle_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            path,
            clock,
            save_throttle_ms: Mutex::new(save_throttle_ms),
            generation: AtomicU64::new(0),
        })
    }

    pub fn set_save_throttle_ms(&self, ms: i64) {
        *self.save_throttle_ms.lock() = ms;
    }

    /// Synchronous load at startup. A version mismatch or unparsable file is
    /// a soft error: start from empty state rather than failing construction.
    pub fn load(&self) -> Snapshot {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Snapshot>(&content) {
                Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => snapshot,
                Ok(_) => {
                    tracing::warn!(path = %self.path.display(), "snapshot version mismatch, starting from empty state");
                    Snapshot::default()
                }
                Err(error) => {
                    tracing::warn!(path = %self.path.display(), %error, "snapshot unreadable, starting from empty state");
                    Snapshot::default()
                }
            },
            Err(_) => Snapshot::default(),
        }
    }

    /// Rewrites the entire file atomically (write to a temp path, then
    /// rename). Partial updates are never supported.
    pub async fn save_now(&self, mut snapshot: Snapshot) -> Result<(), OrchestratorError> {
        snapshot.last_updated = self.clock.now();
        snapshot.version = SNAPSHOT_VERSION.to_string();
        let encoded = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &encoded).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Coalesces concurrent mutations: each call bumps a generation token
    /// and spawns a debounced flush; a newer call observing a stale
    /// generation when it wakes simply does nothing, because a later call
    /// will flush the freshest snapshot anyway.
    pub fn schedule_save(self: &Arc<Self>, snapshot_fn: Arc<dyn Fn() -> Snapshot + Send + Sync>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let throttle_ms = *self.save_throttle_ms.lock();
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(throttle_ms.max(0) as u64)).await;
            if this.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let snapshot = snapshot_fn();
            if let Err(error) = this.save_now(snapshot).await {
                tracing::warn!(%error, "failed to flush persisted snapshot, continuing on in-memory state");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[tokio::test]
    async fn round_trip_preserves_state_modulo_last_updated() {
        let dir = std::env::temp_dir().join(format!("orchestrator-test-{}", std::process::id()));
        let path = dir.join("snapshot.json");
        let state = PersistentState::new(path.clone(), Arc::new(SystemClock), 0);

        let mut snapshot = Snapshot::default();
        snapshot
            .configuration_overrides
            .search_order
            .replace(vec!["tavily".to_string(), "kagi".to_string()]);

        state.save_now(snapshot.clone()).await.unwrap();
        let loaded = state.load();

        assert_eq!(loaded.provider_health.len(), snapshot.provider_health.len());
        assert_eq!(loaded.configuration_overrides.search_order, snapshot.configuration_overrides.search_order);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_file_loads_empty_state() {
        let path = std::env::temp_dir().join(format!("orchestrator-missing-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let state = PersistentState::new(path, Arc::new(SystemClock), 0);
        let snapshot = state.load();
        assert!(snapshot.provider_health.is_empty());
        assert!(snapshot.performance_records.is_empty());
    }
}
