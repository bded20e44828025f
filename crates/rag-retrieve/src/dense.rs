//! Dense retriever: embeds a query and asks a vector store for its
//! nearest neighbors.
//!
//! Unlike the BM25 index, nothing here computes similarity itself — that
//! is the vector store's job (HNSW, IVF-PQ, whatever backs it). This
//! crate only owns the contract and the error-code mapping the rest of
//! the pipeline depends on.

use std::sync::Arc;

use async_trait::async_trait;
use rag_core::{
    CancellationToken, Chunk, Embedder, ErrorCode, RagError, RagResult, RankedItem, Retriever,
    RetrieveOptions, RetrievalResult, SignalScores, VectorStore,
};

pub struct DenseRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl DenseRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed `query` and fetch its nearest neighbors, ranked 1-based.
    pub async fn retrieve_ranked(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> RagResult<Vec<RankedItem>> {
        if query.trim().is_empty() {
            return Err(RagError::invalid_query("rag-retrieve:dense", "empty query"));
        }

        let embedding = self.embedder.embed(query).await.map_err(|e| {
            RagError::new(
                ErrorCode::EmbeddingFailed,
                "rag-retrieve:dense",
                e.message.clone(),
            )
            .with_stage("retrieval")
        })?;

        let hits = self
            .store
            .similarity_search(&embedding, options.top_k, options.filter.as_ref())
            .await
            .map_err(|e| {
                RagError::new(ErrorCode::StoreError, "rag-retrieve:dense", e.message.clone())
                    .with_stage("retrieval")
            })?;

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| RankedItem {
                id: hit.id,
                rank: i + 1,
                score: hit.score,
                chunk: hit.chunk,
            })
            .collect())
    }
}

#[async_trait]
impl Retriever for DenseRetriever {
    fn name(&self) -> &str {
        "dense"
    }

    async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
        _cancellation: &CancellationToken,
    ) -> RagResult<Vec<RetrievalResult>> {
        let ranked = self.retrieve_ranked(query, options).await?;
        Ok(ranked
            .into_iter()
            .map(|item| RetrievalResult {
                id: item.id,
                chunk: item.chunk,
                score: item.score,
                scores: Some(SignalScores {
                    dense: item.score,
                    ..Default::default()
                }),
                dense_rank: Some(item.rank),
                sparse_rank: None,
                confidence: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::{MetadataFilter, VectorHit};

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> RagResult<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimensions(&self) -> usize {
            2
        }
        fn max_batch_size(&self) -> usize {
            16
        }
    }

    struct FixedStore;

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn similarity_search(
            &self,
            _vector: &[f32],
            top_k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> RagResult<Vec<VectorHit>> {
            Ok((0..top_k.min(2))
                .map(|i| VectorHit {
                    id: format!("doc{i}"),
                    score: 1.0 - (i as f32 * 0.1),
                    chunk: Chunk::new(format!("doc{i}"), "content"),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn retrieves_ranked_hits() {
        let retriever = DenseRetriever::new(Arc::new(FixedEmbedder), Arc::new(FixedStore));
        let options = RetrieveOptions {
            top_k: 2,
            ..Default::default()
        };
        let results = retriever.retrieve_ranked("hello", &options).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
    }

    #[tokio::test]
    async fn empty_query_is_invalid() {
        let retriever = DenseRetriever::new(Arc::new(FixedEmbedder), Arc::new(FixedStore));
        let err = retriever
            .retrieve_ranked("   ", &RetrieveOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidQuery);
    }
}
