//! Tokenizer and BM25 inverted index.
//!
//! Okapi BM25 scoring over an in-memory inverted index, built once from a
//! corpus snapshot and read-only thereafter. Postings are stored as
//! parallel arrays indexed by a small integer term id (an arena) rather
//! than nested string-keyed maps, so scoring is cache-friendly and the
//! read-only invariant after `build` is free to enforce: nothing but
//! `build` ever touches the arena.
//!
//! ```text
//! score(q,d) = Σ idf(t) · tf_d(t)·(k1+1) / (tf_d(t) + k1·(1−b+b·|d|/avgdl))
//! idf(t)     = ln((N − df(t) + 0.5) / (df(t) + 0.5) + 1)
//! ```

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use rag_core::{Chunk, RagError, RagResult, RankedItem};

/// Deterministic text-to-terms splitter. A custom tokenizer may be
/// supplied as long as it is deterministic on its input.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Lowercase, split on non-alphanumeric boundaries, drop tokens shorter
/// than 2 characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTokenizer;

impl Tokenizer for DefaultTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|tok| tok.chars().count() >= 2)
            .map(|tok| tok.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Document-frequency filters applied at build time; both default to
/// "no filtering".
#[derive(Debug, Clone, Copy)]
pub struct Bm25Config {
    pub params: Bm25Params,
    pub min_doc_freq: u32,
    pub max_doc_freq_ratio: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            params: Bm25Params::default(),
            min_doc_freq: 1,
            max_doc_freq_ratio: 1.0,
        }
    }
}

#[derive(PartialEq)]
struct FloatOrd(f32);
impl Eq for FloatOrd {}
impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// One input document before indexing.
pub struct Bm25Document {
    pub id: String,
    pub content: String,
}

/// Read-only inverted index built from a corpus snapshot. Rebuilding
/// means constructing a new instance.
pub struct Bm25Index {
    config: Bm25Config,
    doc_ids: Vec<String>,
    doc_contents: Vec<String>,
    doc_id_to_idx: HashMap<String, u32>,
    term_ids: HashMap<String, u32>,
    /// term id -> (doc idx -> term frequency)
    postings: Vec<HashMap<u32, u32>>,
    doc_lengths: Vec<u32>,
    doc_frequencies: Vec<u32>,
    avg_doc_length: f32,
    precomputed_idf: RefCell<Vec<f32>>,
}

impl Bm25Index {
    /// Build the index. Rejects duplicate ids with `CONFIG_ERROR`.
    /// Idempotent: building twice from the same input produces
    /// equivalent indexes.
    pub fn build(
        documents: &[Bm25Document],
        tokenizer: &dyn Tokenizer,
        config: Bm25Config,
    ) -> RagResult<Self> {
        let mut doc_ids = Vec::with_capacity(documents.len());
        let mut doc_contents = Vec::with_capacity(documents.len());
        let mut doc_id_to_idx = HashMap::with_capacity(documents.len());
        let mut term_ids: HashMap<String, u32> = HashMap::new();
        let mut postings: Vec<HashMap<u32, u32>> = Vec::new();
        let mut doc_lengths = Vec::with_capacity(documents.len());
        let mut df_counts: Vec<u32> = Vec::new();

        for doc in documents {
            if doc_id_to_idx.contains_key(&doc.id) {
                return Err(RagError::config_error(
                    "rag-retrieve",
                    format!("duplicate document id: {}", doc.id),
                ));
            }
            let doc_idx = doc_ids.len() as u32;
            doc_id_to_idx.insert(doc.id.clone(), doc_idx);
            doc_ids.push(doc.id.clone());
            doc_contents.push(doc.content.clone());

            let terms = tokenizer.tokenize(&doc.content);
            doc_lengths.push(terms.len() as u32);

            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for term in terms {
                *term_freqs.entry(term).or_insert(0) += 1;
            }
            for (term, freq) in term_freqs {
                let term_id = *term_ids.entry(term).or_insert_with(|| {
                    postings.push(HashMap::new());
                    df_counts.push(0);
                    (postings.len() - 1) as u32
                });
                postings[term_id as usize].insert(doc_idx, freq);
                df_counts[term_id as usize] += 1;
            }
        }

        let n = doc_ids.len() as f32;
        let avg_doc_length = if doc_ids.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<u32>() as f32 / n
        };

        // Apply document-frequency filters by zeroing postings for
        // excluded terms; their idf resolves to 0 so they contribute
        // nothing to scoring or candidate generation.
        for term_id in 0..postings.len() {
            let df = df_counts[term_id];
            let ratio = if n > 0.0 { df as f32 / n } else { 0.0 };
            if df < config.min_doc_freq || ratio > config.max_doc_freq_ratio {
                postings[term_id].clear();
                df_counts[term_id] = 0;
            }
        }

        let mut index = Self {
            config,
            doc_ids,
            doc_contents,
            doc_id_to_idx,
            term_ids,
            postings,
            doc_lengths,
            doc_frequencies: df_counts,
            avg_doc_length,
            precomputed_idf: RefCell::new(Vec::new()),
        };
        index.recompute_idf();
        Ok(index)
    }

    fn recompute_idf(&mut self) {
        let n = self.doc_ids.len() as f32;
        let idf: Vec<f32> = self
            .doc_frequencies
            .iter()
            .map(|&df| {
                if df == 0 {
                    0.0
                } else {
                    let df_f = df as f32;
                    ((n - df_f + 0.5) / (df_f + 0.5) + 1.0).ln()
                }
            })
            .collect();
        *self.precomputed_idf.borrow_mut() = idf;
    }

    pub fn num_docs(&self) -> usize {
        self.doc_ids.len()
    }

    /// `idf(t) ≥ 0` always; unknown or filtered-out terms score 0.
    pub fn idf(&self, term: &str) -> f32 {
        match self.term_ids.get(term) {
            Some(&id) => self.precomputed_idf.borrow()[id as usize],
            None => 0.0,
        }
    }

    fn score_by_idx(&self, doc_idx: u32, query_term_ids: &[(u32, f32)]) -> f32 {
        if self.avg_doc_length == 0.0 {
            return 0.0;
        }
        let doc_length = self.doc_lengths[doc_idx as usize] as f32;
        let params = self.config.params;
        let mut score = 0.0;
        for &(term_id, idf) in query_term_ids {
            if idf == 0.0 {
                continue;
            }
            let tf = self.postings[term_id as usize]
                .get(&doc_idx)
                .copied()
                .unwrap_or(0) as f32;
            if tf == 0.0 {
                continue;
            }
            let numerator = tf * (params.k1 + 1.0);
            let denominator =
                tf + params.k1 * (1.0 - params.b + params.b * doc_length / self.avg_doc_length);
            score += idf * (numerator / denominator);
        }
        score
    }

    /// Score a single document, by id, against a raw query string.
    /// Documents with identical term sets always score identically,
    /// regardless of id.
    pub fn score(&self, doc_id: &str, query_terms: &[String]) -> f32 {
        let Some(&doc_idx) = self.doc_id_to_idx.get(doc_id) else {
            return 0.0;
        };
        let query_term_ids: Vec<(u32, f32)> = query_terms
            .iter()
            .filter_map(|t| self.term_ids.get(t).map(|&id| (id, self.idf(t))))
            .collect();
        self.score_by_idx(doc_idx, &query_term_ids)
    }

    /// Tokenize `query`, score every candidate document that shares at
    /// least one term, and return the top-`k` by score. Ties are broken
    /// by insertion order (original corpus order). An empty query after
    /// tokenization returns `[]`, not an error.
    pub fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        tokenizer: &dyn Tokenizer,
    ) -> Vec<(String, f32)> {
        let query_terms = tokenizer.tokenize(query);
        if query_terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query_term_ids: Vec<(u32, f32)> = query_terms
            .iter()
            .filter_map(|t| self.term_ids.get(t).map(|&id| (id, self.idf(t))))
            .collect();
        if query_term_ids.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<u32> = Vec::new();
        let mut seen: HashSet<u32> = HashSet::new();
        for &(term_id, _) in &query_term_ids {
            for &doc_idx in self.postings[term_id as usize].keys() {
                if seen.insert(doc_idx) {
                    candidates.push(doc_idx);
                }
            }
        }
        // Preserve corpus insertion order among candidates for stable
        // tie-breaking.
        candidates.sort_unstable();

        let mut heap: BinaryHeap<Reverse<(FloatOrd, Reverse<u32>)>> =
            BinaryHeap::with_capacity(top_k + 1);
        for doc_idx in candidates {
            let score = self.score_by_idx(doc_idx, &query_term_ids);
            if !score.is_finite() || score <= 0.0 {
                continue;
            }
            // Reverse(doc_idx) makes earlier-inserted docs compare
            // greater at equal score, so the min-heap evicts later ties
            // first and keeps the earliest.
            let key = (FloatOrd(score), Reverse(doc_idx));
            if heap.len() < top_k {
                heap.push(Reverse(key));
            } else if let Some(&Reverse((FloatOrd(min_score), _))) = heap.peek() {
                if score > min_score {
                    heap.pop();
                    heap.push(Reverse(key));
                }
            }
        }

        let mut results: Vec<(u32, f32)> = heap
            .into_iter()
            .map(|Reverse((FloatOrd(score), Reverse(doc_idx)))| (doc_idx, score))
            .collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        results
            .into_iter()
            .map(|(doc_idx, score)| (self.doc_ids[doc_idx as usize].clone(), score))
            .collect()
    }

    /// Same as `retrieve`, but wraps each hit in a `RankedItem` carrying
    /// the indexed content as a `Chunk`.
    pub fn retrieve_ranked(
        &self,
        query: &str,
        top_k: usize,
        tokenizer: &dyn Tokenizer,
    ) -> Vec<RankedItem> {
        self.retrieve(query, top_k, tokenizer)
            .into_iter()
            .enumerate()
            .map(|(i, (id, score))| {
                let content = self
                    .doc_id_to_idx
                    .get(&id)
                    .map(|&idx| self.doc_contents[idx as usize].clone())
                    .unwrap_or_default();
                RankedItem {
                    id: id.clone(),
                    rank: i + 1,
                    score,
                    chunk: Chunk::new(id, content),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, content: &str) -> Bm25Document {
        Bm25Document {
            id: id.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn retrieves_relevant_documents() {
        let docs = vec![
            doc("0", "the quick brown fox"),
            doc("1", "the lazy dog"),
            doc("2", "quick brown fox jumps"),
        ];
        let index = Bm25Index::build(&docs, &DefaultTokenizer, Bm25Config::default()).unwrap();
        let results = index.retrieve("quick fox", 10, &DefaultTokenizer);
        assert!(results.len() >= 2);
        assert!(results.iter().any(|(_, score)| *score > 0.0));
    }

    #[test]
    fn duplicate_ids_fail_to_build() {
        let docs = vec![doc("same", "a"), doc("same", "b")];
        let err = Bm25Index::build(&docs, &DefaultTokenizer, Bm25Config::default()).unwrap_err();
        assert_eq!(err.code, rag_core::ErrorCode::ConfigError);
    }

    #[test]
    fn empty_query_after_tokenization_returns_empty_not_error() {
        let docs = vec![doc("0", "hello world")];
        let index = Bm25Index::build(&docs, &DefaultTokenizer, Bm25Config::default()).unwrap();
        assert!(index.retrieve("! ? .", 10, &DefaultTokenizer).is_empty());
    }

    #[test]
    fn idf_is_never_negative() {
        let docs = vec![
            doc("0", "common term"),
            doc("1", "common word"),
            doc("2", "rare term"),
        ];
        let index = Bm25Index::build(&docs, &DefaultTokenizer, Bm25Config::default()).unwrap();
        assert!(index.idf("common") >= 0.0);
        assert!(index.idf("rare") >= 0.0);
        assert!(index.idf("rare") > index.idf("common"));
    }

    #[test]
    fn identical_term_sets_score_identically_regardless_of_id() {
        let docs = vec![
            doc("a", "alpha beta gamma"),
            doc("b", "alpha beta gamma"),
            doc("c", "delta epsilon"),
        ];
        let index = Bm25Index::build(&docs, &DefaultTokenizer, Bm25Config::default()).unwrap();
        let query = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(index.score("a", &query), index.score("b", &query));
    }

    #[test]
    fn doc_frequency_filters_exclude_terms() {
        let docs = vec![
            doc("0", "common common common"),
            doc("1", "common rare"),
        ];
        let config = Bm25Config {
            max_doc_freq_ratio: 0.4,
            ..Bm25Config::default()
        };
        let index = Bm25Index::build(&docs, &DefaultTokenizer, config).unwrap();
        // "common" appears in both docs (ratio 1.0 > 0.4) so it is excluded.
        assert_eq!(index.idf("common"), 0.0);
        assert!(index.idf("rare") > 0.0);
    }
}
