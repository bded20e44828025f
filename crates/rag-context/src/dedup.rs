//! Jaccard-similarity deduplication over ranked candidates.

use std::collections::HashSet;

use rag_core::RetrievalResult;

fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 2)
        .collect()
}

/// `J(a,b) = |a∩b| / |a∪b|`. Two empty sets are defined as identical;
/// an empty set against a non-empty one shares nothing.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

/// Drops near-duplicates, keeping the higher-scored item of each pair.
/// Returns the surviving candidates (original relative order preserved)
/// and the number dropped.
pub fn deduplicate(candidates: Vec<RetrievalResult>, threshold: f32) -> (Vec<RetrievalResult>, usize) {
    let token_sets: Vec<HashSet<String>> = candidates.iter().map(|c| token_set(&c.chunk.content)).collect();
    let n = candidates.len();
    let mut removed = vec![false; n];

    for i in 0..n {
        if removed[i] {
            continue;
        }
        for j in (i + 1)..n {
            if removed[j] {
                continue;
            }
            if jaccard(&token_sets[i], &token_sets[j]) >= threshold {
                if candidates[i].score >= candidates[j].score {
                    removed[j] = true;
                } else {
                    removed[i] = true;
                    break;
                }
            }
        }
    }

    let dropped = removed.iter().filter(|r| **r).count();
    let kept: Vec<RetrievalResult> = candidates
        .into_iter()
        .zip(removed.iter())
        .filter(|(_, r)| !**r)
        .map(|(c, _)| c)
        .collect();
    (kept, dropped)
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
    fn keeps_higher_scoring_duplicate() {
        let candidates = vec![
            result("a", 0.3, "exact same content here"),
            result("b", 0.9, "exact same content here"),
        ];
        let (kept, dropped) = deduplicate(candidates, 0.8);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "b");
        assert_eq!(dropped, 1);
    }

    #[test]
    fn distinct_content_is_not_deduplicated() {
        let candidates = vec![result("a", 0.5, "alpha beta gamma"), result("b", 0.5, "delta epsilon zeta")];
        let (kept, dropped) = deduplicate(candidates, 0.8);
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn two_empty_contents_are_similar() {
        let candidates = vec![result("a", 0.5, ""), result("b", 0.9, "")];
        let (kept, dropped) = deduplicate(candidates, 0.8);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 1);
    }
}
