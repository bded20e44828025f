//! Hybrid retriever: dense + sparse (+ optional graph) fused via RRF.
//!
//! `alpha` is documented as a dense/sparse balance but the extremes are
//! special-cased (`alpha = 1` dense-only, `alpha = 0` sparse-only); any
//! value strictly between them runs both rankers and fuses them with
//! symmetric (unweighted) RRF. See `DESIGN.md` for why this workspace
//! keeps that behavior instead of threading `alpha` into the RRF share.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rag_core::{
    CancellationToken, Chunk, ConfidenceFactors, ConfidenceScore, EdgeDirection, ErrorCode,
    GraphStore, NeighborQuery, RagError, RagResult, RankedItem, Retriever, RetrieveOptions,
    RetrievalResult, SignalScores,
};
use rag_fusion::{normalize, rrf_fuse, RrfConfig};
use tracing::{debug, instrument};

use crate::bm25::{Bm25Index, Tokenizer};
use crate::dense::DenseRetriever;

#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub alpha: f32,
    pub graph_weight: f32,
    pub candidate_multiplier: usize,
    pub rrf: RrfConfig,
    /// Metadata key under which a chunk's linked graph node id is stored.
    pub graph_node_key: String,
    pub graph_neighbor_query: NeighborQuery,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            graph_weight: 0.0,
            candidate_multiplier: 3,
            rrf: RrfConfig::default(),
            graph_node_key: "graphNodeId".to_string(),
            graph_neighbor_query: NeighborQuery {
                depth: 1,
                direction: Some(EdgeDirection::Both),
                edge_types: None,
                node_types: None,
                min_weight: 0.0,
                limit: None,
            },
        }
    }
}

pub struct HybridRetriever {
    dense: DenseRetriever,
    bm25: Arc<Bm25Index>,
    tokenizer: Arc<dyn Tokenizer>,
    graph: Option<Arc<dyn GraphStore>>,
    config: HybridConfig,
}

impl HybridRetriever {
    pub fn new(
        dense: DenseRetriever,
        bm25: Arc<Bm25Index>,
        tokenizer: Arc<dyn Tokenizer>,
        graph: Option<Arc<dyn GraphStore>>,
        config: HybridConfig,
    ) -> Self {
        Self {
            dense,
            bm25,
            tokenizer,
            graph,
            config,
        }
    }

    async fn run_sparse(&self, query: &str, candidate_k: usize) -> RagResult<Vec<RankedItem>> {
        let bm25 = self.bm25.clone();
        let tokenizer = self.tokenizer.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || bm25.retrieve_ranked(&query, candidate_k, tokenizer.as_ref()))
            .await
            .map_err(|e| {
                RagError::new(ErrorCode::RetrievalFailed, "rag-retrieve:hybrid", e.to_string())
                    .with_stage("retrieval")
            })
    }

    async fn run_dense(&self, query: &str, candidate_k: usize) -> RagResult<Vec<RankedItem>> {
        let options = RetrieveOptions {
            top_k: candidate_k,
            ..Default::default()
        };
        self.dense.retrieve_ranked(query, &options).await
    }

    async fn graph_scores(
        &self,
        candidates: &[RankedItem],
    ) -> RagResult<HashMap<String, f32>> {
        let Some(graph) = &self.graph else {
            return Ok(HashMap::new());
        };

        let candidate_ids: std::collections::HashSet<&str> =
            candidates.iter().map(|c| c.id.as_str()).collect();
        let mut raw_scores: HashMap<String, f32> = HashMap::new();

        for candidate in candidates {
            let Some(node_id) = candidate.chunk.graph_node_id(&self.config.graph_node_key) else {
                continue;
            };
            let neighbors = graph
                .get_neighbors(node_id, self.config.graph_neighbor_query.clone())
                .await
                .map_err(|e| {
                    RagError::new(ErrorCode::StoreError, "rag-retrieve:hybrid", e.message.clone())
                        .with_stage("retrieval")
                })?;

            let mut score = 0.0f32;
            for neighbor in &neighbors {
                let w = neighbor.edge.weight;
                let depth = neighbor.depth.max(1) as f32;
                if candidate_ids.contains(neighbor.node.as_str()) {
                    score += w;
                }
                score += w / depth;
            }
            raw_scores.insert(candidate.id.clone(), score);
        }

        let max = raw_scores
            .values()
            .cloned()
            .fold(0.0f32, f32::max)
            .max(1e-3);
        for v in raw_scores.values_mut() {
            *v /= max;
        }
        Ok(raw_scores)
    }

    /// Run the full hybrid algorithm and return fused, confidence-scored
    /// results truncated to `options.top_k`.
    #[instrument(skip(self, options), fields(alpha = self.config.alpha, top_k = options.top_k, fallback_used = tracing::field::Empty))]
    pub async fn retrieve_hybrid(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> RagResult<Vec<RetrievalResult>> {
        if query.trim().is_empty() {
            return Err(RagError::invalid_query("rag-retrieve:hybrid", "empty query"));
        }
        if options.top_k == 0 {
            return Err(RagError::config_error("rag-retrieve:hybrid", "topK must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.config.alpha) {
            return Err(RagError::config_error("rag-retrieve:hybrid", "alpha must be in [0,1]"));
        }
        if !(0.0..=1.0).contains(&self.config.graph_weight) {
            return Err(RagError::config_error(
                "rag-retrieve:hybrid",
                "graphWeight must be in [0,1]",
            ));
        }

        let candidate_k = options.top_k * self.config.candidate_multiplier.max(1);

        if self.config.alpha == 1.0 {
            tracing::Span::current().record("fallback_used", "dense_only");
            debug!(candidate_k, "alpha=1.0, skipping sparse ranker");
            let dense = self.run_dense(query, options.top_k).await?;
            return Ok(self.finalize_single_ranker(dense, true, options));
        }
        if self.config.alpha == 0.0 {
            tracing::Span::current().record("fallback_used", "sparse_only");
            debug!(candidate_k, "alpha=0.0, skipping dense ranker");
            let sparse = self.run_sparse(query, options.top_k).await?;
            return Ok(self.finalize_single_ranker(sparse, false, options));
        }

        let (dense, sparse) = tokio::try_join!(
            self.run_dense(query, candidate_k),
            self.run_sparse(query, candidate_k),
        )?;
        debug!(dense_count = dense.len(), sparse_count = sparse.len(), "ran both rankers");

        let mut candidates: HashMap<String, RankedItem> = HashMap::new();
        for item in dense.iter().chain(sparse.iter()) {
            candidates.entry(item.id.clone()).or_insert_with(|| item.clone());
        }
        let candidate_list: Vec<RankedItem> = candidates.into_values().collect();

        let graph_raw = if self.config.graph_weight > 0.0 {
            self.graph_scores(&candidate_list).await?
        } else {
            HashMap::new()
        };

        let dense_by_score = sorted_by_score(&dense);
        let sparse_by_score = sorted_by_score(&sparse);

        let mut lists: Vec<(&str, Vec<RankedItem>)> = vec![
            ("dense", dense_by_score),
            ("sparse", sparse_by_score),
        ];

        let mut graph_list: Vec<RankedItem> = Vec::new();
        if !graph_raw.is_empty() {
            let mut with_scores: Vec<(RankedItem, f32)> = candidate_list
                .iter()
                .filter_map(|item| {
                    graph_raw
                        .get(&item.id)
                        .map(|&score| (item.clone(), score))
                })
                .collect();
            with_scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            graph_list = with_scores
                .into_iter()
                .enumerate()
                .map(|(i, (mut item, score))| {
                    item.rank = i + 1;
                    item.score = score;
                    item
                })
                .collect();
            lists.push(("graph", graph_list.clone()));
        }

        let n_active = lists.len();
        let mut fused = rrf_fuse(&lists, &self.config.rrf);
        normalize(&mut fused, n_active, &self.config.rrf);

        let dense_scores: HashMap<&str, f32> = dense.iter().map(|i| (i.id.as_str(), i.score)).collect();
        let sparse_scores: HashMap<&str, f32> = sparse.iter().map(|i| (i.id.as_str(), i.score)).collect();
        let graph_scores_map: HashMap<&str, f32> = graph_list.iter().map(|i| (i.id.as_str(), i.score)).collect();
        let dense_ranks: HashMap<&str, usize> = dense.iter().map(|i| (i.id.as_str(), i.rank)).collect();
        let sparse_ranks: HashMap<&str, usize> = sparse.iter().map(|i| (i.id.as_str(), i.rank)).collect();

        let mut results: Vec<RetrievalResult> = fused
            .into_iter()
            .map(|r| {
                let confidence = compute_confidence(&r.contributions, n_active);
                RetrievalResult {
                    id: r.id.clone(),
                    chunk: r.chunk,
                    score: r.fused_score,
                    scores: Some(SignalScores {
                        dense: dense_scores.get(r.id.as_str()).copied().unwrap_or(0.0),
                        sparse: sparse_scores.get(r.id.as_str()).copied().unwrap_or(0.0),
                        graph: graph_scores_map.get(r.id.as_str()).copied().unwrap_or(0.0),
                        fused: r.fused_score,
                    }),
                    dense_rank: dense_ranks.get(r.id.as_str()).copied(),
                    sparse_rank: sparse_ranks.get(r.id.as_str()).copied(),
                    confidence: Some(confidence),
                }
            })
            .filter(|r| options.min_score.map(|min| r.score >= min).unwrap_or(true))
            .collect();

        results.truncate(options.top_k);
        Ok(results)
    }

    fn finalize_single_ranker(
        &self,
        items: Vec<RankedItem>,
        is_dense: bool,
        options: &RetrieveOptions,
    ) -> Vec<RetrievalResult> {
        items
            .into_iter()
            .filter(|i| options.min_score.map(|min| i.score >= min).unwrap_or(true))
            .take(options.top_k)
            .map(|item| RetrievalResult {
                id: item.id,
                chunk: item.chunk,
                score: item.score,
                scores: Some(if is_dense {
                    SignalScores {
                        dense: item.score,
                        sparse: 0.0,
                        graph: 0.0,
                        fused: item.score,
                    }
                } else {
                    SignalScores {
                        dense: 0.0,
                        sparse: item.score,
                        graph: 0.0,
                        fused: item.score,
                    }
                }),
                dense_rank: if is_dense { Some(item.rank) } else { None },
                sparse_rank: if is_dense { None } else { Some(item.rank) },
                confidence: Some(ConfidenceScore {
                    overall: 1.0,
                    signals: SignalScores::default(),
                    factors: ConfidenceFactors {
                        rank_agreement: 1.0,
                        score_consistency: 1.0,
                        signal_count: 1,
                        multi_signal_presence: true,
                    },
                }),
            })
            .collect()
    }
}

fn sorted_by_score(items: &[RankedItem]) -> Vec<RankedItem> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    for (i, item) in sorted.iter_mut().enumerate() {
        item.rank = i + 1;
    }
    sorted
}

fn compute_confidence(
    contributions: &[rag_core::RrfContribution],
    n_active: usize,
) -> ConfidenceScore {
    let active: Vec<&rag_core::RrfContribution> =
        contributions.iter().filter(|c| c.rank.is_some()).collect();
    let signal_count = active.len() as u8;
    let multi_signal_presence = active.len() == n_active;

    let rank_agreement = if active.len() <= 1 {
        0.7
    } else {
        let ranks: Vec<f32> = active.iter().map(|c| c.rank.unwrap() as f32).collect();
        let mut pair_diffs = Vec::new();
        for i in 0..ranks.len() {
            for j in (i + 1)..ranks.len() {
                pair_diffs.push((ranks[i] - ranks[j]).abs());
            }
        }
        let mean_diff: f32 = pair_diffs.iter().sum::<f32>() / pair_diffs.len() as f32;
        let max_rank = ranks.iter().cloned().fold(1.0f32, f32::max);
        let normalized = (mean_diff / max_rank.max(1.0)).min(1.0);
        (1.0 - normalized).clamp(0.0, 1.0)
    };

    let score_consistency = if active.len() <= 1 {
        1.0
    } else {
        let scores: Vec<f32> = active.iter().map(|c| c.score.unwrap_or(0.0)).collect();
        let mean: f32 = scores.iter().sum::<f32>() / scores.len() as f32;
        if mean.abs() < 1e-9 {
            1.0
        } else {
            let variance: f32 =
                scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / scores.len() as f32;
            let cv = variance.sqrt() / mean.abs();
            (1.0 - cv).clamp(0.0, 1.0)
        }
    };

    let signal_ratio = signal_count as f32 / n_active.max(1) as f32;
    let overall = ((rank_agreement + score_consistency + signal_ratio) / 3.0).clamp(0.0, 1.0);

    ConfidenceScore {
        overall,
        signals: SignalScores::default(),
        factors: ConfidenceFactors {
            rank_agreement,
            score_consistency,
            signal_count,
            multi_signal_presence,
        },
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    fn name(&self) -> &str {
        "hybrid"
    }

    async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
        _cancellation: &CancellationToken,
    ) -> RagResult<Vec<RetrievalResult>> {
        self.retrieve_hybrid(query, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bm25::{Bm25Config, Bm25Document, DefaultTokenizer};
    use async_trait::async_trait;
    use rag_core::{Embedder, MetadataFilter, VectorHit, VectorStore};

    struct StubEmbedder;
    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> RagResult<Vec<f32>> {
            Ok(vec![1.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
        fn dimensions(&self) -> usize {
            1
        }
        fn max_batch_size(&self) -> usize {
            1
        }
    }

    struct StubStore;
    #[async_trait]
    impl VectorStore for StubStore {
        async fn similarity_search(
            &self,
            _vector: &[f32],
            top_k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> RagResult<Vec<VectorHit>> {
            Ok((0..top_k.min(2))
                .map(|i| VectorHit {
                    id: format!("A{i}" ),
                    score: 0.9 - (i as f32 * 0.1),
                    chunk: Chunk::new(format!("A{i}"), "alpha beta"),
                })
                .collect())
        }
    }

    fn make_hybrid(config: HybridConfig) -> HybridRetriever {
        let docs = vec![
            Bm25Document { id: "A0".into(), content: "alpha beta".into() },
            Bm25Document { id: "B0".into(), content: "gamma delta".into() },
        ];
        let index = Bm25Index::build(&docs, &DefaultTokenizer, Bm25Config::default()).unwrap();
        let dense = DenseRetriever::new(Arc::new(StubEmbedder), Arc::new(StubStore));
        HybridRetriever::new(dense, Arc::new(index), Arc::new(DefaultTokenizer), None, config)
    }

    #[tokio::test]
    async fn alpha_one_skips_sparse() {
        let hybrid = make_hybrid(HybridConfig { alpha: 1.0, ..Default::default() });
        let options = RetrieveOptions { top_k: 2, ..Default::default() };
        let results = hybrid.retrieve_hybrid("alpha", &options).await.unwrap();
        assert!(results.iter().all(|r| r.scores.unwrap().sparse == 0.0));
    }

    #[tokio::test]
    async fn alpha_zero_skips_dense() {
        let hybrid = make_hybrid(HybridConfig { alpha: 0.0, ..Default::default() });
        let options = RetrieveOptions { top_k: 2, ..Default::default() };
        let results = hybrid.retrieve_hybrid("alpha beta", &options).await.unwrap();
        assert!(results.iter().all(|r| r.scores.unwrap().dense == 0.0));
    }

    #[tokio::test]
    async fn two_way_fusion_has_confidence_in_range() {
        let hybrid = make_hybrid(HybridConfig::default());
        let options = RetrieveOptions { top_k: 5, ..Default::default() };
        let results = hybrid.retrieve_hybrid("alpha beta", &options).await.unwrap();
        for r in &results {
            let c = r.confidence.as_ref().unwrap();
            assert!(c.overall >= 0.0 && c.overall <= 1.0);
            assert!(c.factors.signal_count >= 1);
        }
    }
}
