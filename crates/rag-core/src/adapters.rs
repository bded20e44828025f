//! Adapter contracts for the collaborators the core treats as external:
//! the embedding provider, vector store, graph store, and LLM provider.
//! None of these are implemented here — only the interface the engine
//! calls against.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RagResult;
use crate::model::{Chunk, RetrievalResult};

/// Cooperative cancellation, threaded through every adapter call and
/// checked between pipeline stages. Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Metadata filter predicate passed to the vector store. Left opaque:
/// adapters interpret it against their own index schema.
pub type MetadataFilter = HashMap<String, Value>;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>>;
    fn dimensions(&self) -> usize;
    fn max_batch_size(&self) -> usize;
    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub chunk: Chunk,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> RagResult<Vec<VectorHit>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct NeighborQuery {
    pub depth: u32,
    pub direction: Option<EdgeDirection>,
    pub edge_types: Option<Vec<String>>,
    pub node_types: Option<Vec<String>>,
    pub min_weight: f32,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub weight: f32,
}

#[derive(Debug, Clone)]
pub struct Neighbor {
    pub node: String,
    pub edge: GraphEdge,
    pub depth: u32,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_neighbors(&self, node_id: &str, query: NeighborQuery) -> RagResult<Vec<Neighbor>>;
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Usage,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> RagResult<ChatResponse>;
}

/// Options shared by every retriever's `retrieve` call.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub filter: Option<MetadataFilter>,
}

/// Interface the engine fans out to; dense, sparse, and hybrid retrievers
/// all implement this.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
        cancellation: &CancellationToken,
    ) -> RagResult<Vec<RetrievalResult>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache contract. A null-object implementation (`get` always absent,
/// `size` always 0, `has` always false) must be a valid implementor.
#[async_trait]
pub trait CacheProvider<V: Clone + Send + Sync>: Send + Sync {
    async fn get(&self, key: &str) -> Option<V>;
    async fn set(&self, key: String, value: V, ttl_ms: Option<u64>);
    async fn delete(&self, key: &str) -> bool;
    async fn has(&self, key: &str) -> bool;
    async fn clear(&self);
    async fn size(&self) -> usize;
    async fn get_stats(&self) -> CacheStats;
}
