//! Turns ranked candidates into a single formatted, token-budgeted
//! context string plus per-source attribution (C9).
//!
//! Pipeline is fixed: optional `topK` clamp, deduplication, ordering,
//! token budgeting, formatting, then preamble/postamble composition.

mod budget;
mod dedup;
mod format;
mod order;

pub use budget::{BudgetConfig, TruncationStrategy};
pub use format::{CitationStyle, FormatConfig, MarkdownFormatConfig, StructuredFormatConfig};
pub use order::Ordering;

use rag_core::{AssembledContext, RagResult, RetrievalResult, SourceEntry};

#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub top_k: Option<usize>,
    pub dedup_enabled: bool,
    pub similarity_threshold: f32,
    pub ordering: Ordering,
    pub sandwich_start_count: Option<usize>,
    pub budget: BudgetConfig,
    pub format: FormatConfig,
    pub preamble: Option<String>,
    pub postamble: Option<String>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            top_k: None,
            dedup_enabled: true,
            similarity_threshold: 0.8,
            ordering: Ordering::Relevance,
            sandwich_start_count: None,
            budget: BudgetConfig::default(),
            format: FormatConfig::default(),
            preamble: None,
            postamble: None,
        }
    }
}

pub struct Assembler {
    config: AssemblerConfig,
}

impl Assembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn assemble(&self, mut candidates: Vec<RetrievalResult>) -> RagResult<AssembledContext> {
        if let Some(top_k) = self.config.top_k {
            candidates.truncate(top_k);
        }
        let supplied = candidates.len();

        let (deduped, deduplicated_count) = if self.config.dedup_enabled {
            dedup::deduplicate(candidates, self.config.similarity_threshold)
        } else {
            (candidates, 0)
        };

        let ordered = order::order(deduped, self.config.ordering, self.config.sandwich_start_count);

        let (budgeted, dropped_count) = budget::apply_budget(ordered, &self.config.budget);
        let chunk_count = budgeted.len();
        debug_assert_eq!(chunk_count + deduplicated_count + dropped_count, supplied);

        let sources: Vec<SourceEntry> = budgeted
            .iter()
            .enumerate()
            .map(|(i, c)| SourceEntry {
                index: i + 1,
                chunk_id: c.chunk.id.clone(),
                source: c.chunk.source().map(|s| s.to_string()),
                location: c
                    .chunk
                    .metadata
                    .get("location")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                score: Some(c.score),
            })
            .collect();

        let body = format::render(&budgeted, &self.config.format);
        let content = compose(&body, &self.config.preamble, &self.config.postamble);
        let estimated_tokens = budget::estimate_tokens(&content);
        let chunks = budgeted.iter().map(|c| c.chunk.clone()).collect();

        Ok(AssembledContext {
            content,
            estimated_tokens,
            chunk_count,
            deduplicated_count,
            dropped_count,
            sources,
            chunks,
        })
    }
}

fn compose(body: &str, preamble: &Option<String>, postamble: &Option<String>) -> String {
    let mut parts = Vec::new();
    if let Some(p) = preamble {
        parts.push(p.as_str());
    }
    parts.push(body);
    if let Some(p) = postamble {
        parts.push(p.as_str());
    }
    parts.join("\n\n")
}

pub mod prelude {
    pub use crate::{Assembler, AssemblerConfig, BudgetConfig, CitationStyle, FormatConfig, MarkdownFormatConfig, Ordering, StructuredFormatConfig, TruncationStrategy};
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::Chunk;

    fn result(id: &str, score: f32, content: &str) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            chunk: Chunk::new(id, content),
            score,
            scores: None,
            dense_rank: None,
            sparse_rank: None,
            confidence: None,
        }
    }

    #[test]
    fn empty_input_returns_empty_root_and_zero_counts() {
        let assembler = Assembler::new(AssemblerConfig::default());
        let out = assembler.assemble(vec![]).unwrap();
        assert_eq!(out.chunk_count, 0);
        assert_eq!(out.content, "<context>\n</context>");
    }

    #[test]
    fn counts_sum_to_supplied_candidates() {
        let assembler = Assembler::new(AssemblerConfig::default());
        let candidates = vec![
            result("a", 0.3, "exact same content padding words"),
            result("b", 0.9, "exact same content padding words"),
            result("c", 0.5, "totally different unrelated text"),
        ];
        let out = assembler.assemble(candidates).unwrap();
        assert_eq!(out.chunk_count + out.deduplicated_count + out.dropped_count, 3);
        assert_eq!(out.deduplicated_count, 1);
    }

    #[test]
    fn sources_are_one_based_and_match_emitted_chunks() {
        let assembler = Assembler::new(AssemblerConfig::default());
        let candidates = vec![result("a", 0.9, "alpha"), result("b", 0.5, "beta")];
        let out = assembler.assemble(candidates).unwrap();
        for (i, source) in out.sources.iter().enumerate() {
            assert_eq!(source.index, i + 1);
            assert_eq!(source.chunk_id, out.chunks[i].id);
        }
    }

    #[test]
    fn top_k_clamp_applies_before_dedup() {
        let mut config = AssemblerConfig::default();
        config.top_k = Some(1);
        let assembler = Assembler::new(config);
        let candidates = vec![result("a", 0.9, "alpha"), result("b", 0.5, "beta")];
        let out = assembler.assemble(candidates).unwrap();
        assert_eq!(out.chunk_count, 1);
    }
}
