//! Tagged error variants shared across the pipeline.
//!
//! The source system this was distilled from uses an abstract error base
//! class with per-subsystem subclasses; here every stage error is a flat,
//! tagged sum type with a shared metadata shape instead.

use std::fmt;
use std::sync::Arc;

/// Stable error code, used for programmatic matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidQuery,
    ConfigError,
    IndexNotBuilt,
    EmbeddingFailed,
    StoreError,
    RetrievalFailed,
    EnhancementFailed,
    RerankingFailed,
    VerificationFailed,
    AssemblyFailed,
    Aborted,
    CacheError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidQuery => "INVALID_QUERY",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::IndexNotBuilt => "INDEX_NOT_BUILT",
            ErrorCode::EmbeddingFailed => "EMBEDDING_FAILED",
            ErrorCode::StoreError => "STORE_ERROR",
            ErrorCode::RetrievalFailed => "RETRIEVAL_FAILED",
            ErrorCode::EnhancementFailed => "ENHANCEMENT_FAILED",
            ErrorCode::RerankingFailed => "RERANKING_FAILED",
            ErrorCode::VerificationFailed => "VERIFICATION_FAILED",
            ErrorCode::AssemblyFailed => "ASSEMBLY_FAILED",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::CacheError => "CACHE_ERROR",
        }
    }

    /// Whether a caller may reasonably retry an operation that failed with
    /// this code, in the absence of more specific adapter guidance.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::EmbeddingFailed
                | ErrorCode::StoreError
                | ErrorCode::EnhancementFailed
                | ErrorCode::RerankingFailed
                | ErrorCode::VerificationFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single pipeline error, carrying the metadata the engine attaches to
/// every stage fault: code, the engine that raised it, which stage was
/// executing, an optional cause, and retry guidance.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{engine_name}: {code} at stage {stage:?}: {message}")]
pub struct RagError {
    pub code: ErrorCode,
    pub engine_name: &'static str,
    pub stage: Option<&'static str>,
    pub message: String,
    pub retryable: bool,
    pub retry_after_ms: Option<u64>,
    pub hint: Option<String>,
    #[source]
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl RagError {
    pub fn new(code: ErrorCode, engine_name: &'static str, message: impl Into<String>) -> Self {
        let retryable = code.default_retryable();
        Self {
            code,
            engine_name,
            stage: None,
            message: message.into(),
            retryable,
            retry_after_ms: None,
            hint: None,
            cause: None,
        }
    }

    pub fn with_stage(mut self, stage: &'static str) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn invalid_query(engine_name: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidQuery, engine_name, message)
    }

    pub fn config_error(engine_name: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, engine_name, message)
    }

    pub fn aborted(engine_name: &'static str, stage: &'static str) -> Self {
        Self::new(ErrorCode::Aborted, engine_name, "operation cancelled").with_stage(stage)
    }
}

pub type RagResult<T> = Result<T, RagError>;
