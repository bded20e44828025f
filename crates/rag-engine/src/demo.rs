//! In-memory stand-ins for the embedding provider and vector store, used
//! only by the `rag` CLI binary so it has something to run against
//! without a real model server. Not part of the pipeline's public
//! contract — a real deployment supplies its own `Embedder`/`VectorStore`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use async_trait::async_trait;
use rag_core::{Chunk, MetadataFilter, RagResult, VectorHit, VectorStore};
use rag_core::Embedder;

const DIMENSIONS: usize = 64;

/// Hashes overlapping trigrams into a fixed-width vector. Not a real
/// embedding model — deterministic and local only, so the CLI can
/// demonstrate the pipeline without network access.
pub struct HashEmbedder;

fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSIONS];
    let normalized: String = text.to_lowercase();
    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() {
        return vector;
    }
    for window in chars.windows(3.min(chars.len())) {
        let gram: String = window.iter().collect();
        let mut hasher = DefaultHasher::new();
        gram.hash(&mut hasher);
        let bucket = (hasher.finish() % DIMENSIONS as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        Ok(hash_embed(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn max_batch_size(&self) -> usize {
        256
    }
}

/// Brute-force cosine similarity search over an in-memory corpus.
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<(Chunk, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new(entries: Vec<(Chunk, Vec<f32>)>) -> Self {
        Self { entries: RwLock::new(entries) }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(
        &self,
        vector: &[f32],
        top_k: usize,
        _filter: Option<&MetadataFilter>,
    ) -> RagResult<Vec<VectorHit>> {
        let entries = self.entries.read().expect("vector store lock poisoned");
        let mut scored: Vec<VectorHit> = entries
            .iter()
            .map(|(chunk, embedding)| VectorHit {
                id: chunk.id.clone(),
                score: cosine(vector, embedding),
                chunk: chunk.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}
