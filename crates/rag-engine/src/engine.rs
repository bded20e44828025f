//! End-to-end orchestration (C11): staging, caching, cancellation, and
//! error-taxonomy mapping over the rest of the pipeline.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rag_context::Assembler;
use rag_core::{
    CacheProvider, CancellationToken, ChatMessage, Classification, ConfidenceFactors,
    ConfidenceScore, ErrorCode, MetadataFilter, QueryType, RagError, RagResult, RetrievalResult,
    RetrievalStrategy, RrfContribution, SignalScores, SourceEntry,
};
use rag_fusion::{normalize, rrf_fuse, RrfConfig};
use rag_retrieve::hybrid::HybridRetriever;
use rag_core::RetrieveOptions;
use rag_rerank::{Reranker, RerankerResult, Verifier};
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::enhance::QueryEnhancer;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub filter: Option<MetadataFilter>,
    pub enhance: Option<bool>,
    pub rerank: Option<bool>,
    pub verify: Option<bool>,
    pub use_cache: Option<bool>,
    pub cache_ttl_ms: Option<u64>,
    pub ordering: Option<rag_context::Ordering>,
    pub max_tokens: Option<usize>,
    pub force_retrieval: bool,
    pub override_type: Option<QueryType>,
    pub conversation_history: Vec<ChatMessage>,
    pub cancellation: CancellationToken,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: None,
            min_score: None,
            filter: None,
            enhance: None,
            rerank: None,
            verify: None,
            use_cache: None,
            cache_ttl_ms: None,
            ordering: None,
            max_tokens: None,
            force_retrieval: false,
            override_type: None,
            conversation_history: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Timings {
    pub enhancement_ms: Option<u64>,
    pub retrieval_ms: u64,
    pub reranking_ms: Option<u64>,
    pub verification_ms: Option<u64>,
    pub assembly_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone)]
pub struct VerificationRecord {
    pub id: String,
    pub verified: bool,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct SearchMetadata {
    pub classification: Option<Classification>,
    pub from_cache: bool,
    /// Set when retrieval was bypassed entirely (e.g. a greeting), per the
    /// documented skip-retrieval boundary behavior.
    pub skipped_retrieval: bool,
    pub timings: Timings,
    pub verifications: Option<Vec<VerificationRecord>>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub content: String,
    pub estimated_tokens: usize,
    pub sources: Vec<SourceEntry>,
    pub assembly: rag_core::AssembledContext,
    pub retrieval_results: Vec<RetrievalResult>,
    pub reranker_results: Option<Vec<RerankerResult>>,
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub config_version: String,
    pub max_concurrent_queries: Option<usize>,
    pub default_use_cache: bool,
    pub default_cache_ttl_ms: Option<u64>,
    pub verifier_degrades_to_passthrough: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_version: "v1".to_string(),
            max_concurrent_queries: None,
            default_use_cache: true,
            default_cache_ttl_ms: None,
            verifier_degrades_to_passthrough: true,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    classifier: rag_classify::QueryClassifier,
    hybrid: HybridRetriever,
    enhancer: Option<Arc<dyn QueryEnhancer>>,
    reranker: Option<Arc<dyn Reranker>>,
    verifier: Option<Arc<Verifier>>,
    assembler_config: rag_context::AssemblerConfig,
    cache: Arc<dyn CacheProvider<SearchResult>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        classifier: rag_classify::QueryClassifier,
        hybrid: HybridRetriever,
        enhancer: Option<Arc<dyn QueryEnhancer>>,
        reranker: Option<Arc<dyn Reranker>>,
        verifier: Option<Arc<Verifier>>,
        assembler_config: rag_context::AssemblerConfig,
        cache: Arc<dyn CacheProvider<SearchResult>>,
    ) -> Self {
        Self { config, classifier, hybrid, enhancer, reranker, verifier, assembler_config, cache }
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    #[instrument(skip(self, options), fields(query_len = query.len()))]
    pub async fn search(&self, query: &str, options: SearchOptions) -> RagResult<SearchResult> {
        let start = Instant::now();

        if query.trim().is_empty() {
            return Err(RagError::invalid_query("rag-engine", "empty query"));
        }
        check_cancelled(&options.cancellation, "init")?;

        let use_cache = options.use_cache.unwrap_or(self.config.default_use_cache);
        let key = cache_key(&self.config.config_version, query, &options);

        if use_cache {
            if let Some(mut cached) = self.cache.get(&key).await {
                cached.metadata.from_cache = true;
                cached.metadata.timings = Timings {
                    total_ms: elapsed_ms(start),
                    ..Default::default()
                };
                return Ok(cached);
            }
        }

        check_cancelled(&options.cancellation, "classify")?;
        let classification = self.classify(query, &options);

        if classification.recommendation.skip_retrieval && !options.force_retrieval {
            let assembler = Assembler::new(self.assembler_config.clone());
            let mut assembly = assembler
                .assemble(Vec::new())
                .map_err(|e| e.with_stage("assembly"))?;
            assembly.content.clear();
            assembly.estimated_tokens = 0;
            let result = SearchResult {
                content: String::new(),
                estimated_tokens: assembly.estimated_tokens,
                sources: assembly.sources.clone(),
                assembly,
                retrieval_results: Vec::new(),
                reranker_results: None,
                metadata: SearchMetadata {
                    classification: Some(classification),
                    from_cache: false,
                    skipped_retrieval: true,
                    timings: Timings { total_ms: elapsed_ms(start), ..Default::default() },
                    verifications: None,
                },
            };
            return Ok(result);
        }

        check_cancelled(&options.cancellation, "enhance")?;
        let enhance_stage_start = Instant::now();
        let should_enhance = options.enhance.unwrap_or(classification.recommendation.enable_enhancement);
        let (effective_queries, enhancement_ms) = if should_enhance {
            if let Some(enhancer) = &self.enhancer {
                let enhanced = enhancer.enhance(query).await.map_err(|e| {
                    RagError::new(ErrorCode::EnhancementFailed, "rag-engine", e.message.clone())
                        .with_stage("enhance")
                })?;
                (enhanced.enhanced, Some(elapsed_ms(enhance_stage_start)))
            } else {
                (vec![query.to_string()], None)
            }
        } else {
            (vec![query.to_string()], None)
        };

        check_cancelled(&options.cancellation, "retrieve")?;
        let retrieval_start = Instant::now();
        let top_k = options.top_k.unwrap_or_else(|| {
            if classification.recommendation.suggested_top_k > 0 {
                classification.recommendation.suggested_top_k
            } else {
                5
            }
        });
        let retrieve_options = RetrieveOptions {
            top_k,
            min_score: options.min_score,
            filter: options.filter.clone(),
        };

        let use_multi_query = effective_queries.len() > 1
            && classification.recommendation.suggested_strategy == Some(RetrievalStrategy::MultiQuery);
        let mut retrieval_results = if use_multi_query {
            self.retrieve_multi_query(&effective_queries, &retrieve_options).await?
        } else {
            self.hybrid
                .retrieve_hybrid(&effective_queries[0], &retrieve_options)
                .await
                .map_err(|e| e.with_stage("retrieval"))?
        };
        let retrieval_ms = elapsed_ms(retrieval_start);

        check_cancelled(&options.cancellation, "rerank")?;
        let should_rerank = options.rerank.unwrap_or(classification.recommendation.enable_reranking);
        let mut reranker_results: Option<Vec<RerankerResult>> = None;
        let mut reranking_ms = None;
        if should_rerank {
            if let Some(reranker) = &self.reranker {
                let rerank_start = Instant::now();
                let original_confidence: std::collections::HashMap<String, ConfidenceScore> = retrieval_results
                    .iter()
                    .filter_map(|r| r.confidence.clone().map(|c| (r.id.clone(), c)))
                    .collect();
                let reranked = reranker
                    .rerank(query, retrieval_results.clone())
                    .await
                    .map_err(|e| {
                        RagError::new(ErrorCode::RerankingFailed, "rag-engine", e.message.clone())
                            .with_stage("rerank")
                    })?;
                retrieval_results = reranked
                    .iter()
                    .map(|r| RetrievalResult {
                        id: r.id.clone(),
                        chunk: r.chunk.clone(),
                        score: r.score,
                        scores: None,
                        dense_rank: None,
                        sparse_rank: None,
                        confidence: original_confidence.get(&r.id).cloned(),
                    })
                    .collect();
                reranking_ms = Some(elapsed_ms(rerank_start));
                reranker_results = Some(reranked);
            }
        }

        check_cancelled(&options.cancellation, "verify")?;
        let should_verify = options.verify.unwrap_or(false);
        let mut verification_ms = None;
        let mut verifications = None;
        if should_verify {
            if let Some(verifier) = &self.verifier {
                let verify_start = Instant::now();
                match verifier.verify(query, retrieval_results.clone()).await {
                    Ok(verified) => {
                        verifications = Some(
                            verified
                                .iter()
                                .map(|v| VerificationRecord {
                                    id: v.result.id.clone(),
                                    verified: v.verification.verified,
                                    score: v.verification.score,
                                })
                                .collect(),
                        );
                    }
                    Err(e) => {
                        if !self.config.verifier_degrades_to_passthrough {
                            return Err(RagError::new(
                                ErrorCode::VerificationFailed,
                                "rag-engine",
                                e.message,
                            )
                            .with_stage("verify"));
                        }
                    }
                }
                verification_ms = Some(elapsed_ms(verify_start));
            }
        }

        check_cancelled(&options.cancellation, "assemble")?;
        let assembly_start = Instant::now();
        let mut assembler_config = self.assembler_config.clone();
        if let Some(ordering) = options.ordering {
            assembler_config.ordering = ordering;
        }
        if let Some(max_tokens) = options.max_tokens {
            assembler_config.budget.max_tokens = Some(max_tokens);
        }
        let assembler = Assembler::new(assembler_config);
        let assembly = assembler
            .assemble(retrieval_results.clone())
            .map_err(|e| e.with_stage("assembly"))?;
        let assembly_ms = elapsed_ms(assembly_start);

        let result = SearchResult {
            content: assembly.content.clone(),
            estimated_tokens: assembly.estimated_tokens,
            sources: assembly.sources.clone(),
            assembly,
            retrieval_results,
            reranker_results,
            metadata: SearchMetadata {
                classification: Some(classification),
                from_cache: false,
                skipped_retrieval: false,
                timings: Timings {
                    enhancement_ms,
                    retrieval_ms,
                    reranking_ms,
                    verification_ms,
                    assembly_ms,
                    total_ms: elapsed_ms(start),
                },
                verifications,
            },
        };

        if use_cache {
            let ttl = options.cache_ttl_ms.or(self.config.default_cache_ttl_ms);
            self.cache.set(key, result.clone(), ttl).await;
        }

        Ok(result)
    }

    fn classify(&self, query: &str, options: &SearchOptions) -> Classification {
        let mut classification = self.classifier.classify(query);
        if let Some(override_type) = options.override_type {
            let features = classification.features.clone();
            classification = Classification {
                query_type: override_type,
                confidence: classification.confidence,
                recommendation: self.classifier.recommend(override_type, &features),
                features,
            };
        }
        classification
    }

    async fn retrieve_multi_query(
        &self,
        queries: &[String],
        options: &RetrieveOptions,
    ) -> RagResult<Vec<RetrievalResult>> {
        let cap = self
            .config
            .max_concurrent_queries
            .unwrap_or(queries.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(cap));

        let futures = queries.iter().map(|query| {
            let semaphore = semaphore.clone();
            let query = query.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                self.hybrid.retrieve_hybrid(&query, options).await
            }
        });
        let per_query_results: Vec<Vec<RetrievalResult>> =
            join_all(futures).await.into_iter().collect::<RagResult<Vec<_>>>()?;

        let names: Vec<String> = (0..per_query_results.len()).map(|i| format!("query{i}")).collect();
        let lists: Vec<(&str, Vec<rag_core::RankedItem>)> = per_query_results
            .iter()
            .zip(names.iter())
            .map(|(results, name)| {
                let items = results
                    .iter()
                    .enumerate()
                    .map(|(rank, r)| rag_core::RankedItem {
                        id: r.id.clone(),
                        rank: rank + 1,
                        score: r.score,
                        chunk: r.chunk.clone(),
                    })
                    .collect();
                (name.as_str(), items)
            })
            .collect();

        let n_active = lists.len();
        let mut fused = rrf_fuse(&lists, &RrfConfig::default());
        normalize(&mut fused, n_active, &RrfConfig::default());

        Ok(fused
            .into_iter()
            .map(|r| {
                let confidence = multi_query_confidence(&r.contributions, n_active);
                RetrievalResult {
                    id: r.id,
                    chunk: r.chunk,
                    score: r.fused_score,
                    scores: Some(SignalScores { dense: 0.0, sparse: 0.0, graph: 0.0, fused: r.fused_score }),
                    dense_rank: None,
                    sparse_rank: None,
                    confidence: Some(confidence),
                }
            })
            .take(options.top_k)
            .collect())
    }
}

fn multi_query_confidence(contributions: &[RrfContribution], n_active: usize) -> ConfidenceScore {
    let active: Vec<&RrfContribution> = contributions.iter().filter(|c| c.rank.is_some()).collect();
    let signal_count = active.len() as u8;
    ConfidenceScore {
        overall: (active.len() as f32 / n_active.max(1) as f32).clamp(0.0, 1.0),
        signals: SignalScores::default(),
        factors: ConfidenceFactors {
            rank_agreement: if active.len() <= 1 { 0.7 } else { 1.0 },
            score_consistency: 1.0,
            signal_count,
            multi_signal_presence: active.len() == n_active,
        },
    }
}

fn check_cancelled(token: &CancellationToken, stage: &'static str) -> RagResult<()> {
    if token.is_cancelled() {
        Err(RagError::aborted("rag-engine", stage))
    } else {
        Ok(())
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn cache_key(config_version: &str, query: &str, options: &SearchOptions) -> String {
    let mut buf = String::new();
    buf.push_str(config_version);
    buf.push('\u{1}');
    buf.push_str(&query.trim().to_lowercase());
    buf.push('\u{1}');
    buf.push_str(&format!(
        "{:?}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}",
        options.top_k,
        options.min_score.map(f32::to_bits),
        options.ordering,
        options.max_tokens,
        options.enhance,
        options.rerank,
        options.verify,
    ));
    buf.push_str(&format!("{:?}", options.override_type));

    let mut hasher = DefaultHasher::new();
    buf.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
