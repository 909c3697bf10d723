use serde::{Deserialize, Serialize};

/// The closed error taxonomy shared by adapters and the orchestrator.
///
/// Health-manager transitions and retry eligibility are both driven off this
/// enum; adding a variant means deciding its cooldown and retry behavior in
/// both places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    AuthenticationError,
    RateLimit,
    CreditExhausted,
    QuotaExceeded,
    ProviderError,
    ApiError,
    Timeout,
}

impl ErrorKind {
    /// Errors the orchestrator must surface immediately to the outer fallback
    /// loop rather than retrying against the same provider.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::InvalidInput | ErrorKind::AuthenticationError
        )
    }
}

/// A classifiable failure returned by a `Searcher` adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchError {
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Server-provided rate-limit reset time, when the adapter can parse one.
    pub reset_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SearchError {
    pub fn new(provider: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
            reset_at: None,
        }
    }

    pub fn with_reset_at(mut self, reset_at: chrono::DateTime<chrono::Utc>) -> Self {
        self.reset_at = Some(reset_at);
        self
    }

    /// `API_ERROR` is a catch-all; classify it further from message content,
    /// matching the heuristics adapters cannot be trusted to apply themselves.
    pub fn effective_kind(&self) -> ErrorKind {
        if self.kind != ErrorKind::ApiError {
            return self.kind;
        }
        let lower = self.message.to_lowercase();
        if lower.contains("credit") || lower.contains("quota") || lower.contains("limit") {
            ErrorKind::CreditExhausted
        } else if lower.contains("invalid api key") || lower.contains("unauthorized") {
            ErrorKind::AuthenticationError
        } else {
            ErrorKind::ProviderError
        }
    }
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.message)
    }
}

impl std::error::Error for SearchError {}

/// Internal/orchestration-level failures. None of these cross the public
/// `unified_search` / `unified_ai_search` boundary as an `Err` — callers only
/// ever see a `UnifiedResult`. This type exists for the narrower surface
/// (configuration, persistence, tool functions) that does return `Result`.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn context(self, msg: impl Into<String>) -> Self {
        let ctx = msg.into();
        match self {
            Self::Config(e) => Self::Config(format!("{ctx}: {e}")),
            Self::Internal(e) => Self::Internal(format!("{ctx}: {e}")),
            other => other,
        }
    }
}
