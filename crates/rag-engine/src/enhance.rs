//! Query enhancer adapter contract (C6). No LLM-backed implementation
//! ships here — only the interface the engine fans out through, plus an
//! identity implementation for testing and for callers that don't wire
//! one up.

use std::collections::HashMap;

use async_trait::async_trait;
use rag_core::{RagResult, RetrievalStrategy};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct EnhancedQuery {
    pub original: String,
    pub enhanced: Vec<String>,
    pub strategy: RetrievalStrategy,
    pub metadata: HashMap<String, Value>,
}

#[async_trait]
pub trait QueryEnhancer: Send + Sync {
    async fn enhance(&self, query: &str) -> RagResult<EnhancedQuery>;
}

/// Identity enhancer: returns the query unchanged as its single
/// enhanced variant.
pub struct NoopEnhancer;

#[async_trait]
impl QueryEnhancer for NoopEnhancer {
    async fn enhance(&self, query: &str) -> RagResult<EnhancedQuery> {
        Ok(EnhancedQuery {
            original: query.to_string(),
            enhanced: vec![query.to_string()],
            strategy: RetrievalStrategy::Rewrite,
            metadata: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_enhancer_returns_the_query_unchanged() {
        let enhanced = NoopEnhancer.enhance("what is bm25").await.unwrap();
        assert_eq!(enhanced.original, "what is bm25");
        assert_eq!(enhanced.enhanced, vec!["what is bm25".to_string()]);
    }
}
