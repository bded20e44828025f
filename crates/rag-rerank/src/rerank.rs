//! Reranker adapter contract (C7).

use async_trait::async_trait;
use rag_core::{Chunk, RagResult, RetrievalResult};
use tracing::instrument;

#[derive(Debug, Clone, Copy, Default)]
pub struct RerankerScores {
    pub original_score: f32,
    pub reranker_score: f32,
}

#[derive(Debug, Clone)]
pub struct RerankerResult {
    pub id: String,
    pub chunk: Chunk,
    pub score: f32,
    pub original_rank: usize,
    pub new_rank: usize,
    pub scores: RerankerScores,
}

/// Re-scores a candidate list with a secondary model. Must preserve
/// item identity, be stable (return `[]`) on empty input, and be
/// skippable: the engine falls back to retrieval scores if no reranker
/// is configured.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: Vec<RetrievalResult>) -> RagResult<Vec<RerankerResult>>;
}

/// Identity reranker: preserves retrieval order and scores exactly.
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    #[instrument(skip(self, candidates), fields(candidate_count = candidates.len()))]
    async fn rerank(&self, _query: &str, candidates: Vec<RetrievalResult>) -> RagResult<Vec<RerankerResult>> {
        Ok(candidates
            .into_iter()
            .enumerate()
            .map(|(i, r)| RerankerResult {
                id: r.id,
                chunk: r.chunk,
                score: r.score,
                original_rank: i + 1,
                new_rank: i + 1,
                scores: RerankerScores {
                    original_score: r.score,
                    reranker_score: r.score,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::Chunk;

    fn result(id: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            chunk: Chunk::new(id, "content"),
            score,
            scores: None,
            dense_rank: None,
            sparse_rank: None,
            confidence: None,
        }
    }

    #[tokio::test]
    async fn noop_reranker_preserves_order_and_scores() {
        let reranker = NoopReranker;
        let candidates = vec![result("a", 0.9), result("b", 0.5)];
        let out = reranker.rerank("q", candidates).await.unwrap();
        assert_eq!(out[0].id, "a");
        assert_eq!(out[0].scores.reranker_score, 0.9);
        assert_eq!(out[0].original_rank, out[0].new_rank);
    }

    #[tokio::test]
    async fn noop_reranker_is_stable_on_empty_input() {
        let reranker = NoopReranker;
        let out = reranker.rerank("q", vec![]).await.unwrap();
        assert!(out.is_empty());
    }
}
