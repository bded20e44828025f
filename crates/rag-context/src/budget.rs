//! Token-budget enforcement: drop or truncate candidates that don't fit.

use rag_core::RetrievalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationStrategy {
    Drop,
    Truncate,
}

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub max_tokens: Option<usize>,
    pub context_window_size: Option<usize>,
    pub budget_percentage: Option<f32>,
    pub chunk_overhead_tokens: usize,
    pub truncation_strategy: TruncationStrategy,
    pub min_truncated_chars: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens: None,
            context_window_size: None,
            budget_percentage: None,
            chunk_overhead_tokens: 4,
            truncation_strategy: TruncationStrategy::Drop,
            min_truncated_chars: 100,
        }
    }
}

impl BudgetConfig {
    fn effective_budget(&self) -> Option<usize> {
        self.max_tokens.or_else(|| {
            match (self.context_window_size, self.budget_percentage) {
                (Some(window), Some(pct)) => Some((window as f32 * pct) as usize),
                _ => None,
            }
        })
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    ((text.chars().count() as f32) / 4.0).ceil() as usize
}

/// Applies the budget in the order candidates are given (assumed to be
/// post-dedup, post-ordering). Returns the surviving candidates (with
/// truncated content where applicable) and how many were dropped.
pub fn apply_budget(candidates: Vec<RetrievalResult>, config: &BudgetConfig) -> (Vec<RetrievalResult>, usize) {
    let Some(budget) = config.effective_budget() else {
        return (candidates, 0);
    };

    let mut used = 0usize;
    let mut kept = Vec::with_capacity(candidates.len());
    let mut dropped = 0usize;

    for mut candidate in candidates {
        let overhead = config.chunk_overhead_tokens;
        let content_tokens = estimate_tokens(&candidate.chunk.content);

        if used + overhead + content_tokens <= budget {
            used += overhead + content_tokens;
            kept.push(candidate);
            continue;
        }

        match config.truncation_strategy {
            TruncationStrategy::Drop => {
                dropped += 1;
            }
            TruncationStrategy::Truncate => {
                let remaining_tokens = budget.saturating_sub(used + overhead);
                let available_chars = remaining_tokens * 4;
                if available_chars >= config.min_truncated_chars {
                    let truncated = truncate_to_chars(&candidate.chunk.content, available_chars);
                    used += overhead + estimate_tokens(&truncated);
                    candidate.chunk.content = truncated;
                    kept.push(candidate);
                } else {
                    dropped += 1;
                }
            }
        }
    }

    (kept, dropped)
}

/// Cuts at a word boundary within the last 20% of `max_chars` when one
/// exists, otherwise cuts hard at `max_chars`. Appends `"..."`.
fn truncate_to_chars(content: &str, max_chars: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= max_chars {
        return content.to_string();
    }
    if max_chars == 0 {
        return "...".to_string();
    }

    let window_start = ((max_chars as f32) * 0.8) as usize;
    let mut cut = max_chars;
    for i in (window_start..max_chars).rev() {
        if chars[i].is_whitespace() {
            cut = i;
            break;
        }
    }

    let truncated: String = chars[..cut].iter().collect();
    format!("{}...", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::Chunk;

    fn result(id: &str, content: &str) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            chunk: Chunk::new(id, content),
            score: 1.0,
            scores: None,
            dense_rank: None,
            sparse_rank: None,
            confidence: None,
        }
    }

    #[test]
    fn no_budget_configured_keeps_everything() {
        let (kept, dropped) = apply_budget(vec![result("a", "hello")], &BudgetConfig::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn drop_strategy_skips_overflowing_chunks_but_tries_later_ones() {
        let config = BudgetConfig { max_tokens: Some(3), ..BudgetConfig::default() };
        let candidates = vec![result("a", &"x".repeat(100)), result("b", "hi")];
        let (kept, dropped) = apply_budget(candidates, &config);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "b");
    }

    #[test]
    fn truncate_strategy_cuts_on_word_boundary_and_appends_ellipsis() {
        let config = BudgetConfig {
            max_tokens: Some(30),
            chunk_overhead_tokens: 0,
            truncation_strategy: TruncationStrategy::Truncate,
            min_truncated_chars: 10,
            ..BudgetConfig::default()
        };
        let content = "word ".repeat(40);
        let (kept, dropped) = apply_budget(vec![result("a", &content)], &config);
        assert_eq!(dropped, 0);
        assert!(kept[0].chunk.content.ends_with("..."));
        assert!(kept[0].chunk.content.len() < content.len());
    }

    #[test]
    fn truncate_strategy_drops_when_remaining_space_too_small() {
        let config = BudgetConfig {
            max_tokens: Some(1),
            chunk_overhead_tokens: 0,
            truncation_strategy: TruncationStrategy::Truncate,
            min_truncated_chars: 100,
            ..Default::default()
        };
        let (kept, dropped) = apply_budget(vec![result("a", &"z".repeat(50))], &config);
        assert_eq!(dropped, 1);
        assert!(kept.is_empty());
    }
}
