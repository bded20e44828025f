//! Thin demonstration binary over the engine API. Not installation
//! tooling — it wires the pipeline to local, non-production stand-ins
//! for the embedding provider and vector store so `search`/`clear-cache`
//! can be exercised without a model server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_cache::LruTtlCache;
use rag_classify::{ClassifierConfig, QueryClassifier};
use rag_context::AssemblerConfig;
use rag_core::{CacheProvider, Chunk, Embedder};
use rag_engine::demo::{HashEmbedder, InMemoryVectorStore};
use rag_engine::{Engine, EngineConfig, NoopEnhancer, SearchOptions, SearchResult};
use rag_rerank::{NoopReranker, Reranker};
use rag_retrieve::{Bm25Config, Bm25Document, Bm25Index, DefaultTokenizer, DenseRetriever, HybridConfig, HybridRetriever};
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "rag", version, about = "Hybrid retrieval and context assembly demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a query through classify -> retrieve -> (rerank) -> assemble.
    Search {
        query: String,
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        #[arg(long)]
        rerank: bool,
        #[arg(long)]
        alpha: Option<f32>,
    },
    /// Clear the engine's result cache.
    ClearCache {
        #[arg(long)]
        corpus: PathBuf,
    },
}

#[derive(Deserialize)]
struct CorpusRecord {
    #[serde(default)]
    id: Option<String>,
    content: String,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

fn load_corpus(path: &Path) -> Result<Vec<Chunk>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading corpus at {}", path.display()))?;
    let mut chunks = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: CorpusRecord = serde_json::from_str(line)
            .with_context(|| format!("parsing corpus line {}", line_no + 1))?;
        let id = record.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        chunks.push(Chunk {
            id,
            content: record.content,
            metadata: record.metadata,
            document_id: record.document_id,
        });
    }
    Ok(chunks)
}

async fn build_engine(corpus: &Path, rerank: bool, alpha: Option<f32>) -> Result<Engine> {
    let chunks = load_corpus(corpus)?;

    let bm25_docs: Vec<Bm25Document> = chunks
        .iter()
        .map(|c| Bm25Document { id: c.id.clone(), content: c.content.clone() })
        .collect();
    let bm25 = Bm25Index::build(&bm25_docs, &DefaultTokenizer, Bm25Config::default())
        .context("building BM25 index")?;

    let embedder = Arc::new(HashEmbedder);
    let mut entries = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let vector = embedder.embed_batch(&[chunk.content.clone()]).await?.remove(0);
        entries.push((chunk.clone(), vector));
    }
    let store = Arc::new(InMemoryVectorStore::new(entries));

    let dense = DenseRetriever::new(embedder, store);
    let mut hybrid_config = HybridConfig::default();
    if let Some(alpha) = alpha {
        hybrid_config.alpha = alpha;
    }
    let hybrid = HybridRetriever::new(dense, Arc::new(bm25), Arc::new(DefaultTokenizer), None, hybrid_config);

    let classifier = QueryClassifier::new(ClassifierConfig::default());
    let reranker: Option<Arc<dyn Reranker>> = if rerank { Some(Arc::new(NoopReranker)) } else { None };
    let cache: Arc<dyn CacheProvider<SearchResult>> = Arc::new(LruTtlCache::new(256));

    Ok(Engine::new(
        EngineConfig::default(),
        classifier,
        hybrid,
        Some(Arc::new(NoopEnhancer)),
        reranker,
        None,
        AssemblerConfig::default(),
        cache,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Search { query, corpus, top_k, rerank, alpha } => {
            let engine = build_engine(&corpus, rerank, alpha).await?;
            let options = SearchOptions { top_k: Some(top_k), rerank: Some(rerank), ..Default::default() };
            let result = engine.search(&query, options).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;

            println!("{}", result.content);
            eprintln!(
                "\n-- {} sources, {} estimated tokens, {}ms total",
                result.sources.len(),
                result.estimated_tokens,
                result.metadata.timings.total_ms
            );
        }
        Command::ClearCache { corpus } => {
            let engine = build_engine(&corpus, false, None).await?;
            engine.clear_cache().await;
            println!("cache cleared");
        }
    }

    Ok(())
}
