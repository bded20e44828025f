//! Reciprocal Rank Fusion.
//!
//! Combines `N` ranked lists into one fused ranking:
//!
//! ```text
//! RRF(d) = Σ 1 / (k + rank_i(d))   for every list i that contains d
//! ```
//!
//! Ties are broken by insertion order of first appearance across the
//! input lists, not by id, so fusion is deterministic given deterministic
//! rankers.

use std::collections::HashMap;

use rag_core::{RankedItem, RrfContribution, RrfResult};

/// Smoothing/configuration for a fusion pass.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    pub k: f32,
}

impl RrfConfig {
    pub fn new(k: f32) -> Self {
        Self { k }
    }
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: 60.0 }
    }
}

/// Fuse named ranked lists into a single `RrfResult` list, sorted by
/// `fused_score` descending.
pub fn rrf_fuse(lists: &[(&str, Vec<RankedItem>)], config: &RrfConfig) -> Vec<RrfResult> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, RrfResult> = HashMap::new();

    for (ranker_name, items) in lists {
        for item in items {
            let entry = by_id.entry(item.id.clone()).or_insert_with(|| {
                order.push(item.id.clone());
                RrfResult {
                    id: item.id.clone(),
                    chunk: item.chunk.clone(),
                    fused_score: 0.0,
                    contributions: Vec::new(),
                }
            });
            let share = 1.0 / (config.k + item.rank as f32);
            entry.fused_score += share;
            entry.contributions.push(RrfContribution {
                ranker_name: (*ranker_name).to_string(),
                rank: Some(item.rank),
                score: Some(item.score),
                rrf_share: share,
            });
        }
    }

    // Fill in non-contributions so every result lists every ranker.
    let ranker_names: Vec<&str> = lists.iter().map(|(name, _)| *name).collect();
    for id in &order {
        let result = by_id.get_mut(id).expect("id was just inserted");
        for name in &ranker_names {
            if !result.contributions.iter().any(|c| c.ranker_name == *name) {
                result.contributions.push(RrfContribution {
                    ranker_name: (*name).to_string(),
                    rank: None,
                    score: None,
                    rrf_share: 0.0,
                });
            }
        }
    }

    let mut results: Vec<RrfResult> = order
        .into_iter()
        .map(|id| by_id.remove(&id).expect("id present"))
        .collect();

    // Stable sort preserves insertion order (first appearance) for ties.
    results.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

/// Divide every fused score by the theoretical maximum `n · 1/(k+1)`,
/// mapping scores into `(0, 1]`. No-op on an empty list.
pub fn normalize(results: &mut [RrfResult], num_rankers: usize, config: &RrfConfig) {
    if num_rankers == 0 {
        return;
    }
    let max = num_rankers as f32 * (1.0 / (config.k + 1.0));
    if max <= 0.0 {
        return;
    }
    for r in results {
        r.fused_score /= max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::Chunk;

    fn item(id: &str, rank: usize, score: f32) -> RankedItem {
        RankedItem {
            id: id.to_string(),
            rank,
            score,
            chunk: Chunk::new(id, format!("content for {id}")),
        }
    }

    #[test]
    fn two_way_fusion_orders_by_combined_rank() {
        let dense = vec![item("A", 1, 0.9), item("B", 2, 0.6)];
        let sparse = vec![item("B", 1, 4.2), item("C", 2, 3.1)];
        let config = RrfConfig::default();
        let fused = rrf_fuse(&[("dense", dense), ("sparse", sparse)], &config);

        assert_eq!(fused[0].id, "B");
        assert!(fused[0].fused_score > fused[1].fused_score);
        assert!((fused[1].fused_score - fused[2].fused_score).abs() < 1e-6);
    }

    #[test]
    fn score_equals_sum_of_contributions() {
        let dense = vec![item("A", 1, 0.9)];
        let sparse = vec![item("A", 3, 1.0), item("C", 1, 2.0)];
        let fused = rrf_fuse(&[("dense", dense), ("sparse", sparse)], &RrfConfig::default());
        for r in &fused {
            let sum: f32 = r.contributions.iter().map(|c| c.rrf_share).sum();
            assert!((sum - r.fused_score).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_contribution_has_no_rank_or_score() {
        let dense = vec![item("A", 1, 0.9)];
        let sparse = vec![item("C", 1, 2.0)];
        let fused = rrf_fuse(&[("dense", dense), ("sparse", sparse)], &RrfConfig::default());
        let a = fused.iter().find(|r| r.id == "A").unwrap();
        let sparse_contrib = a.contributions.iter().find(|c| c.ranker_name == "sparse").unwrap();
        assert_eq!(sparse_contrib.rank, None);
        assert_eq!(sparse_contrib.score, None);
        assert_eq!(sparse_contrib.rrf_share, 0.0);
    }

    #[test]
    fn normalization_maps_into_unit_interval() {
        let dense = vec![item("A", 1, 0.9)];
        let sparse = vec![item("A", 1, 0.9)];
        let mut fused = rrf_fuse(&[("dense", dense), ("sparse", sparse)], &RrfConfig::default());
        normalize(&mut fused, 2, &RrfConfig::default());
        assert!((fused[0].fused_score - 1.0).abs() < 1e-4);
    }
}
