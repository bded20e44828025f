//! Shared data model, error taxonomy, and external adapter contracts for
//! the retrieval-augmented-generation pipeline.
//!
//! Every other crate in this workspace depends on `rag-core`: it owns the
//! types that cross stage boundaries (`Chunk`, `RetrievalResult`,
//! `Classification`, `AssembledContext`, ...), the tagged `RagError`
//! variant, and the trait contracts for collaborators the pipeline treats
//! as external (embedding provider, vector store, graph store, LLM
//! provider, cache).

pub mod adapters;
pub mod error;
pub mod model;

pub use adapters::{
    CacheProvider, CacheStats, CancellationToken, ChatMessage, ChatOptions, ChatResponse,
    EdgeDirection, Embedder, GraphEdge, GraphStore, LlmProvider, MetadataFilter, Neighbor,
    NeighborQuery, RetrieveOptions, Retriever, Usage, VectorHit, VectorStore,
};
pub use error::{ErrorCode, RagError, RagResult};
pub use model::{
    AssembledContext, CacheEntry, Chunk, Classification, ClassificationFeatures,
    ConfidenceFactors, ConfidenceScore, Document, QueryType, RankedItem, Recommendation,
    RetrievalResult, RetrievalStrategy, RrfContribution, RrfResult, SignalScores, SourceEntry,
};
