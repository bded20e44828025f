//! Shared data model passed between pipeline stages.

use std::collections::HashMap;
use serde_json::Value;

/// Immutable, retrieved unit of text plus metadata.
///
/// Produced upstream by chunkers (out of scope here) and passed by
/// reference or cheap clone through the rest of the pipeline; nothing
/// downstream mutates a `Chunk`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
    pub document_id: Option<String>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: HashMap::new(),
            document_id: None,
        }
    }

    /// Builds a chunk with a generated id, for callers (ingestion,
    /// corpus loaders) that don't have a stable id of their own to supply.
    pub fn with_generated_id(content: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), content)
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }

    pub fn graph_node_id(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Input to chunking; out-of-scope producers construct these.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
    pub source: Option<String>,
}

/// One ranker's positional result.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub id: String,
    pub rank: usize,
    pub score: f32,
    pub chunk: Chunk,
}

/// Per-ranker contribution to a fused RRF result. `rank`/`score` are
/// absent when this ranker did not return the item at all.
#[derive(Debug, Clone, PartialEq)]
pub struct RrfContribution {
    pub ranker_name: String,
    pub rank: Option<usize>,
    pub score: Option<f32>,
    pub rrf_share: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RrfResult {
    pub id: String,
    pub chunk: Chunk,
    pub fused_score: f32,
    pub contributions: Vec<RrfContribution>,
}

/// Per-signal scores attached to a fused retrieval result.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalScores {
    pub dense: f32,
    pub sparse: f32,
    pub graph: f32,
    pub fused: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceFactors {
    pub rank_agreement: f32,
    pub score_consistency: f32,
    /// Number of rankers (1..=3) that contributed to this result.
    pub signal_count: u8,
    pub multi_signal_presence: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceScore {
    pub overall: f32,
    pub signals: SignalScores,
    pub factors: ConfidenceFactors,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub id: String,
    pub chunk: Chunk,
    pub score: f32,
    pub scores: Option<SignalScores>,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
    pub confidence: Option<ConfidenceScore>,
}

/// Classifier output type, driving how much of the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Simple,
    Factual,
    Complex,
    Conversational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    Rewrite,
    MultiQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationFeatures {
    pub word_count: usize,
    pub char_count: usize,
    pub ends_with_question: bool,
    pub is_greeting: bool,
    pub has_question_words: bool,
    pub has_complex_keywords: bool,
    pub has_follow_up_pattern: bool,
    pub has_pronouns: bool,
    pub potential_entity_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub skip_retrieval: bool,
    pub enable_enhancement: bool,
    pub enable_reranking: bool,
    pub suggested_top_k: usize,
    pub needs_conversation_context: bool,
    pub suggested_strategy: Option<RetrievalStrategy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub query_type: QueryType,
    pub confidence: f32,
    pub features: ClassificationFeatures,
    pub recommendation: Recommendation,
}

/// One entry in the assembled context's source list.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    pub index: usize,
    pub chunk_id: String,
    pub source: Option<String>,
    pub location: Option<String>,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub content: String,
    pub estimated_tokens: usize,
    pub chunk_count: usize,
    pub deduplicated_count: usize,
    pub dropped_count: usize,
    pub sources: Vec<SourceEntry>,
    pub chunks: Vec<Chunk>,
}

/// Bounded cache entry; `expires_at` and `last_access_epoch` are
/// milliseconds since whatever epoch the cache's clock uses.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Option<u64>,
    pub last_access_epoch: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_non_empty() {
        let a = Chunk::with_generated_id("content");
        let b = Chunk::with_generated_id("content");
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
    }
}
