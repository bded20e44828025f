//! Reordering strategies applied after deduplication.

use std::collections::BTreeMap;

use rag_core::RetrievalResult;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    Relevance,
    Sandwich,
    Chronological,
}

pub fn order(mut candidates: Vec<RetrievalResult>, ordering: Ordering, sandwich_start_count: Option<usize>) -> Vec<RetrievalResult> {
    match ordering {
        Ordering::Relevance => {
            candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            candidates
        }
        Ordering::Sandwich => sandwich(candidates, sandwich_start_count),
        Ordering::Chronological => chronological(candidates),
    }
}

fn sandwich(mut candidates: Vec<RetrievalResult>, start_count: Option<usize>) -> Vec<RetrievalResult> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let n = candidates.len();
    if n == 0 {
        return candidates;
    }
    let default_start = (n + 1) / 2; // ceil(n/2)
    let start_count = start_count.unwrap_or(default_start).clamp(1, n);

    let tail = candidates.split_off(start_count);
    let mut head = candidates;
    let mut tail_rev = tail;
    tail_rev.reverse();
    head.extend(tail_rev);
    head
}

/// Groups by `document_id`, sorts each group by metadata `startIndex`
/// (missing → 0, ties broken by score descending), groups ordered by
/// document id lexicographically. Items with no `document_id` form
/// their own single-item groups keyed by chunk id.
fn chronological(candidates: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut groups: BTreeMap<String, Vec<RetrievalResult>> = BTreeMap::new();
    for c in candidates {
        let key = c.chunk.document_id.clone().unwrap_or_else(|| format!("\u{0}{}", c.id));
        groups.entry(key).or_default().push(c);
    }

    let mut out = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(|a, b| {
            let pos_a = start_index(a);
            let pos_b = start_index(b);
            pos_a.cmp(&pos_b).then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });
        out.extend(group);
    }
    out
}

fn start_index(result: &RetrievalResult) -> i64 {
    result
        .chunk
        .metadata
        .get("startIndex")
        .and_then(Value::as_i64)
        .unwrap_or(0)
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

    #[test]
    fn relevance_sorts_descending() {
        let out = order(vec![result("a", 0.2), result("b", 0.9)], Ordering::Relevance, None);
        assert_eq!(out[0].id, "b");
    }

    #[test]
    fn sandwich_places_lowest_scores_in_the_middle() {
        let candidates = vec![result("a", 0.9), result("b", 0.7), result("c", 0.5), result("d", 0.3)];
        let out = order(candidates, Ordering::Sandwich, None);
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn chronological_groups_by_document_and_orders_by_start_index() {
        let mut a = result("a", 0.1);
        a.chunk.document_id = Some("doc1".to_string());
        a.chunk.metadata.insert("startIndex".to_string(), Value::from(10));
        let mut b = result("b", 0.1);
        b.chunk.document_id = Some("doc1".to_string());
        b.chunk.metadata.insert("startIndex".to_string(), Value::from(0));

        let out = order(vec![a, b], Ordering::Chronological, None);
        assert_eq!(out[0].id, "b");
        assert_eq!(out[1].id, "a");
    }

    #[test]
    fn chronological_missing_position_does_not_panic() {
        let out = order(vec![result("a", 0.5), result("b", 0.9)], Ordering::Chronological, None);
        assert_eq!(out.len(), 2);
    }
}
