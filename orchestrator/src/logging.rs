//! Global `tracing` subscriber installation.
//!
//! The reference desktop app pairs its subscriber with a rolling
//! file-logging layer and `log_info!`/`log_warn!`/`log_error!` macros that
//! shell out to it; this crate has no GUI shell writing to a fixed
//! app-data-dir log file, and every call site already reaches for
//! `tracing::info!`/`warn!`/`error!` with structured fields directly (see
//! `orchestrator.rs`'s dispatch logging and `health.rs`'s breaker
//! transitions), so there is nothing left for a macro layer to wrap.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Safe to call more than once per
/// process only in tests, which guard it behind `try_init`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,search_orchestrator=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
}
