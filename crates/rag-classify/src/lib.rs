//! Pure, synchronous query classification.
//!
//! Extracts cheap lexical features from a query and decides, in a fixed
//! order, what kind of query it is and how much of the retrieval
//! pipeline is worth running for it. No network calls, no shared
//! mutable state beyond the frozen config.

use rag_core::{
    Classification, ClassificationFeatures, QueryType, Recommendation, RetrievalStrategy,
};

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub simple_max_words: usize,
    pub complex_min_words: usize,
    pub greetings: Vec<String>,
    pub complex_keywords: Vec<String>,
    pub question_words: Vec<String>,
    pub follow_up_phrases: Vec<String>,
    pub leading_conjunctions: Vec<String>,
    pub referential_verbs: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            simple_max_words: 4,
            complex_min_words: 15,
            greetings: [
                "hello", "hi", "hey", "thanks", "thank you", "bye", "goodbye", "yo", "sup",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            complex_keywords: [
                "compare",
                "contrast",
                "analyze",
                "explain",
                "evaluate",
                "summarize",
                "list",
                "pros and cons",
                "differences",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            question_words: [
                "what", "who", "when", "where", "why", "how", "is", "are", "does",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            follow_up_phrases: ["and also", "tell me more", "what about"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            leading_conjunctions: ["and", "but", "so", "or"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            referential_verbs: [
                "is", "was", "are", "were", "has", "have", "will", "would", "should", "could",
                "can", "does", "do", "means", "means?",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

pub struct QueryClassifier {
    config: ClassifierConfig,
}

impl QueryClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, query: &str) -> Classification {
        let features = self.extract_features(query);
        let (query_type, base_confidence) = self.decide(&features, query);
        let recommendation = self.recommend(query_type, &features);
        Classification {
            query_type,
            confidence: base_confidence.clamp(0.0, 1.0),
            features,
            recommendation,
        }
    }

    fn extract_features(&self, query: &str) -> ClassificationFeatures {
        let trimmed = query.trim();
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        let word_count = words.len();
        let char_count = trimmed.chars().count();
        let ends_with_question = trimmed.ends_with('?');

        let normalized = trimmed.to_lowercase();
        let is_greeting = self
            .config
            .greetings
            .iter()
            .any(|g| normalized.trim_matches(|c: char| c == '!' || c == '.') == *g);

        let has_question_words = self
            .config
            .question_words
            .iter()
            .any(|qw| word_boundary_contains(&normalized, qw));

        let has_complex_keywords = self
            .config
            .complex_keywords
            .iter()
            .any(|kw| normalized.contains(kw.as_str()));

        let has_follow_up_pattern = self
            .config
            .follow_up_phrases
            .iter()
            .any(|p| normalized.contains(p.as_str()))
            || words
                .first()
                .map(|w| {
                    self.config
                        .leading_conjunctions
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(w))
                })
                .unwrap_or(false);

        let has_pronouns = self.has_referential_pronoun(&words);
        let potential_entity_count = count_capitalized_runs(&words);

        ClassificationFeatures {
            word_count,
            char_count,
            ends_with_question,
            is_greeting,
            has_question_words,
            has_complex_keywords,
            has_follow_up_pattern,
            has_pronouns,
            potential_entity_count,
        }
    }

    /// `it` is always referential. `this`/`that` only count when used as
    /// a subject (immediately followed by a verb, or at the end of the
    /// query) — not when modifying a following noun ("this book").
    fn has_referential_pronoun(&self, words: &[&str]) -> bool {
        for (i, word) in words.iter().enumerate() {
            let lower = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if lower == "it" {
                return true;
            }
            if lower == "this" || lower == "that" {
                match words.get(i + 1) {
                    None => return true,
                    Some(next) => {
                        let next_lower = next
                            .trim_matches(|c: char| !c.is_alphanumeric())
                            .to_lowercase();
                        if self.config.referential_verbs.iter().any(|v| *v == next_lower) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn decide(&self, features: &ClassificationFeatures, _query: &str) -> (QueryType, f32) {
        if features.is_greeting {
            return (QueryType::Simple, 0.95);
        }
        if features.word_count <= self.config.simple_max_words && !features.ends_with_question {
            return (QueryType::Simple, 0.7 + signal_strength(features, QueryType::Simple));
        }
        if features.has_pronouns || features.has_follow_up_pattern {
            return (
                QueryType::Conversational,
                0.6 + signal_strength(features, QueryType::Conversational),
            );
        }
        if features.has_complex_keywords || features.word_count > self.config.complex_min_words {
            return (QueryType::Complex, 0.6 + signal_strength(features, QueryType::Complex));
        }
        if features.has_question_words || features.ends_with_question {
            return (QueryType::Factual, 0.6 + signal_strength(features, QueryType::Factual));
        }
        (QueryType::Factual, 0.5)
    }

    /// Exposed so callers overriding the decided `QueryType` (e.g. an
    /// engine honoring `overrideType`) can still derive a recommendation
    /// consistent with the table in this module.
    pub fn recommend(&self, query_type: QueryType, features: &ClassificationFeatures) -> Recommendation {
        match query_type {
            QueryType::Simple => Recommendation {
                skip_retrieval: true,
                enable_enhancement: false,
                enable_reranking: false,
                suggested_top_k: 0,
                needs_conversation_context: false,
                suggested_strategy: None,
            },
            QueryType::Factual => Recommendation {
                skip_retrieval: false,
                enable_enhancement: false,
                enable_reranking: true,
                suggested_top_k: 5,
                needs_conversation_context: false,
                suggested_strategy: None,
            },
            QueryType::Complex => Recommendation {
                skip_retrieval: false,
                enable_enhancement: true,
                enable_reranking: true,
                suggested_top_k: 10,
                needs_conversation_context: false,
                suggested_strategy: Some(if features.word_count <= 20 {
                    RetrievalStrategy::Rewrite
                } else {
                    RetrievalStrategy::MultiQuery
                }),
            },
            QueryType::Conversational => Recommendation {
                skip_retrieval: false,
                enable_enhancement: false,
                enable_reranking: true,
                suggested_top_k: 5,
                needs_conversation_context: true,
                suggested_strategy: None,
            },
        }
    }
}

fn signal_strength(features: &ClassificationFeatures, query_type: QueryType) -> f32 {
    let mut aligned = 0u32;
    let mut total = 0u32;
    match query_type {
        QueryType::Simple => {
            total += 2;
            if features.word_count <= 2 {
                aligned += 1;
            }
            if !features.ends_with_question {
                aligned += 1;
            }
        }
        QueryType::Conversational => {
            total += 2;
            if features.has_pronouns {
                aligned += 1;
            }
            if features.has_follow_up_pattern {
                aligned += 1;
            }
        }
        QueryType::Complex => {
            total += 2;
            if features.has_complex_keywords {
                aligned += 1;
            }
            if features.word_count > 15 {
                aligned += 1;
            }
        }
        QueryType::Factual => {
            total += 2;
            if features.has_question_words {
                aligned += 1;
            }
            if features.ends_with_question {
                aligned += 1;
            }
        }
    }
    0.25 * (aligned as f32 / total.max(1) as f32)
}

fn word_boundary_contains(haystack: &str, needle: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|tok| tok == needle)
}

fn count_capitalized_runs(words: &[&str]) -> usize {
    let mut runs = 0;
    let mut in_run = false;
    for word in words {
        let starts_upper = word.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
        if starts_upper {
            if !in_run {
                runs += 1;
                in_run = true;
            }
        } else {
            in_run = false;
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> QueryClassifier {
        QueryClassifier::new(ClassifierConfig::default())
    }

    #[test]
    fn exact_greeting_is_simple_with_high_confidence() {
        let c = classifier().classify("hello");
        assert_eq!(c.query_type, QueryType::Simple);
        assert!(c.confidence >= 0.9);
        assert!(c.recommendation.skip_retrieval);
    }

    #[test]
    fn short_non_question_is_simple() {
        let c = classifier().classify("pizza recipe please");
        assert_eq!(c.query_type, QueryType::Simple);
    }

    #[test]
    fn referential_it_is_conversational() {
        let c = classifier().classify("can you explain it in more detail with many extra words please now");
        assert_eq!(c.query_type, QueryType::Conversational);
    }

    #[test]
    fn adjectival_this_does_not_trigger_conversational() {
        let c = classifier().classify("what is this book about in great technical detail today");
        assert_ne!(c.query_type, QueryType::Conversational);
    }

    #[test]
    fn complex_keyword_triggers_complex() {
        let c = classifier().classify("compare BM25 and dense retrieval approaches for search");
        assert_eq!(c.query_type, QueryType::Complex);
        assert_eq!(c.recommendation.suggested_top_k, 10);
    }

    #[test]
    fn question_word_triggers_factual() {
        let c = classifier().classify("What is BM25 used for in search systems?");
        assert_eq!(c.query_type, QueryType::Factual);
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = classifier();
        let a = classifier.classify("What is BM25?");
        let b = classifier.classify("What is BM25?");
        assert_eq!(a, b);
    }
}
