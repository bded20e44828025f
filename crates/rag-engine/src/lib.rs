//! Orchestrates classify → enhance → retrieve → rerank → verify →
//! assemble into a single `Engine::search` call (C11), and re-exports
//! the rest of the workspace as a facade so a caller only needs this
//! one crate plus the adapter traits it must implement.

#[cfg(feature = "cli")]
pub mod demo;
pub mod enhance;
pub mod engine;

pub use enhance::{EnhancedQuery, NoopEnhancer, QueryEnhancer};
pub use engine::{Engine, EngineConfig, SearchMetadata, SearchOptions, SearchResult, Timings, VerificationRecord};

pub mod prelude {
    pub use crate::{EnhancedQuery, Engine, EngineConfig, NoopEnhancer, QueryEnhancer, SearchMetadata, SearchOptions, SearchResult, Timings, VerificationRecord};

    pub use rag_cache::{LruTtlCache, NullCache};
    pub use rag_classify::{ClassifierConfig, QueryClassifier};
    pub use rag_context::{Assembler, AssemblerConfig, BudgetConfig, CitationStyle, FormatConfig, MarkdownFormatConfig, Ordering, StructuredFormatConfig, TruncationStrategy};
    pub use rag_core::*;
    pub use rag_fusion::{normalize, rrf_fuse, RrfConfig};
    pub use rag_retrieve::prelude::*;
    pub use rag_rerank::{NoopReranker, Reranker, RerankerResult, RerankerScores, Verification, Verifier, VerifierConfig, VerifiedResult};
}
