//! LLM-gated relevance verifier (C8).
//!
//! Sits between reranking and assembly. Confident results (by the
//! hybrid retriever's `confidence.overall`) are accepted or rejected
//! without spending an LLM call; only the mid-confidence band pays for
//! one.

use std::sync::Arc;

use rag_core::{ChatMessage, ChatOptions, ErrorCode, LlmProvider, RagError, RagResult, RetrievalResult};
use tokio::sync::Semaphore;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub skip_threshold: f32,
    pub filter_threshold: f32,
    pub include_reasoning: bool,
    pub concurrency: usize,
    pub batch_mode: bool,
    /// Threshold (0..10) used when a response can't be parsed as JSON
    /// and we fall back to scanning for the first numeric token.
    pub verification_threshold: f32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            skip_threshold: 0.8,
            filter_threshold: 0.3,
            include_reasoning: false,
            concurrency: 5,
            batch_mode: false,
            verification_threshold: 6.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Verification {
    pub verified: bool,
    pub score: f32,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerifiedResult {
    pub result: RetrievalResult,
    pub verification: Verification,
}

pub struct Verifier {
    llm: Arc<dyn LlmProvider>,
    config: VerifierConfig,
}

enum Band {
    AutoVerified,
    AutoRejected,
    NeedsLlm,
}

impl Verifier {
    pub fn new(llm: Arc<dyn LlmProvider>, config: VerifierConfig) -> Self {
        Self { llm, config }
    }

    fn band(&self, result: &RetrievalResult) -> Band {
        let confidence = result.confidence.as_ref().map(|c| c.overall);
        match confidence {
            Some(c) if c >= self.config.skip_threshold => Band::AutoVerified,
            Some(c) if c < self.config.filter_threshold => Band::AutoRejected,
            _ => Band::NeedsLlm,
        }
    }

    /// Verify every candidate, returning results in the same order they
    /// were supplied.
    #[instrument(skip(self, query, results), fields(candidate_count = results.len(), batch_mode = self.config.batch_mode))]
    pub async fn verify(&self, query: &str, results: Vec<RetrievalResult>) -> RagResult<Vec<VerifiedResult>> {
        if self.config.batch_mode {
            self.verify_batch(query, results).await
        } else {
            self.verify_individual(query, results).await
        }
    }

    async fn verify_individual(&self, query: &str, results: Vec<RetrievalResult>) -> RagResult<Vec<VerifiedResult>> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(results.len());

        for result in results {
            let band = self.band(&result);
            let llm = self.llm.clone();
            let semaphore = semaphore.clone();
            let query = query.to_string();
            let include_reasoning = self.config.include_reasoning;
            let verification_threshold = self.config.verification_threshold;

            handles.push(tokio::spawn(async move {
                let verification = match band {
                    Band::AutoVerified => Verification {
                        verified: true,
                        score: 10.0,
                        reasoning: None,
                    },
                    Band::AutoRejected => Verification {
                        verified: false,
                        score: 0.0,
                        reasoning: None,
                    },
                    Band::NeedsLlm => {
                        let _permit = semaphore.acquire().await.expect("semaphore not closed");
                        call_llm_for_verification(
                            llm.as_ref(),
                            &query,
                            &result,
                            include_reasoning,
                            verification_threshold,
                        )
                        .await?
                    }
                };
                Ok::<_, RagError>(VerifiedResult { result, verification })
            }));
        }

        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(v)) => out.push(v),
                Ok(Err(e)) => return Err(e),
                Err(join_err) => {
                    return Err(RagError::new(
                        ErrorCode::VerificationFailed,
                        "rag-rerank:verify",
                        join_err.to_string(),
                    )
                    .with_stage("verification"));
                }
            }
        }
        Ok(out)
    }

    async fn verify_batch(&self, query: &str, results: Vec<RetrievalResult>) -> RagResult<Vec<VerifiedResult>> {
        let mut auto = Vec::new();
        let mut mid_band: Vec<RetrievalResult> = Vec::new();
        let mut order: Vec<usize> = Vec::new();

        for (i, result) in results.into_iter().enumerate() {
            match self.band(&result) {
                Band::AutoVerified => auto.push((
                    i,
                    VerifiedResult {
                        verification: Verification { verified: true, score: 10.0, reasoning: None },
                        result,
                    },
                )),
                Band::AutoRejected => auto.push((
                    i,
                    VerifiedResult {
                        verification: Verification { verified: false, score: 0.0, reasoning: None },
                        result,
                    },
                )),
                Band::NeedsLlm => {
                    order.push(i);
                    mid_band.push(result);
                }
            }
        }

        let mut batched = if mid_band.is_empty() {
            Vec::new()
        } else {
            let prompt = build_batch_prompt(query, &mid_band);
            let response = self
                .llm
                .chat(
                    &[ChatMessage { role: "user".to_string(), content: prompt }],
                    &ChatOptions::default(),
                )
                .await
                .map_err(|e| {
                    RagError::new(ErrorCode::VerificationFailed, "rag-rerank:verify", e.message.clone())
                        .with_stage("verification")
                })?;

            let verdicts = parse_batch_response(&response.content, mid_band.len());
            mid_band
                .into_iter()
                .zip(verdicts)
                .map(|(result, verification)| VerifiedResult { result, verification })
                .collect()
        };

        let mut indexed: Vec<(usize, VerifiedResult)> = Vec::new();
        indexed.append(&mut auto);
        for (i, v) in order.into_iter().zip(batched.drain(..)) {
            indexed.push((i, v));
        }
        indexed.sort_by_key(|(i, _)| *i);
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

async fn call_llm_for_verification(
    llm: &dyn LlmProvider,
    query: &str,
    result: &RetrievalResult,
    include_reasoning: bool,
    verification_threshold: f32,
) -> RagResult<Verification> {
    let prompt = format!(
        "Query: {query}\nDocument: {}\nRespond with JSON {{\"verified\": bool, \"score\": 0-10{}}}.",
        result.chunk.content,
        if include_reasoning { ", \"reasoning\": string" } else { "" }
    );
    let response = llm
        .chat(
            &[ChatMessage { role: "user".to_string(), content: prompt }],
            &ChatOptions::default(),
        )
        .await
        .map_err(|e| {
            RagError::new(ErrorCode::VerificationFailed, "rag-rerank:verify", e.message.clone())
                .with_stage("verification")
        })?;

    Ok(parse_individual_response(&response.content, verification_threshold))
}

fn parse_individual_response(text: &str, verification_threshold: f32) -> Verification {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        let verified = value.get("verified").and_then(|v| v.as_bool());
        let score = value.get("score").and_then(|v| v.as_f64()).map(|s| s as f32);
        if let (Some(verified), Some(score)) = (verified, score) {
            let reasoning = value
                .get("reasoning")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            return Verification { verified, score, reasoning };
        }
    }

    match first_numeric_token(text) {
        Some(score) => Verification {
            verified: score >= verification_threshold,
            score,
            reasoning: None,
        },
        // Malformed beyond recovery: do not drop evidence, default to
        // a middling pass.
        None => Verification { verified: true, score: 5.0, reasoning: None },
    }
}

fn first_numeric_token(text: &str) -> Option<f32> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_ascii_digit() {
            let start = i;
            let mut end = i + c.len_utf8();
            while let Some(&(j, c2)) = chars.peek() {
                if c2.is_ascii_digit() || c2 == '.' {
                    end = j + c2.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            if let Ok(v) = text[start..end].parse::<f32>() {
                return Some(v);
            }
        }
    }
    None
}

fn build_batch_prompt(query: &str, results: &[RetrievalResult]) -> String {
    let mut prompt = format!("Query: {query}\nFor each document below, judge relevance.\n");
    for (i, r) in results.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i, r.chunk.content));
    }
    prompt.push_str("Respond with a JSON array of {\"verified\": bool, \"score\": 0-10} in order.");
    prompt
}

fn parse_batch_response(text: &str, expected_len: usize) -> Vec<Verification> {
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        if items.len() == expected_len {
            return items
                .into_iter()
                .map(|item| {
                    let verified = item.get("verified").and_then(|v| v.as_bool()).unwrap_or(true);
                    let score = item.get("score").and_then(|v| v.as_f64()).unwrap_or(5.0) as f32;
                    let reasoning = item.get("reasoning").and_then(|v| v.as_str()).map(|s| s.to_string());
                    Verification { verified, score, reasoning }
                })
                .collect();
        }
    }
    // Unparsable: do not drop evidence, default every item to verified.
    (0..expected_len)
        .map(|_| Verification { verified: true, score: 5.0, reasoning: None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_core::{Chunk, ChatResponse, ConfidenceFactors, ConfidenceScore, SignalScores, Usage};

    struct EchoLlm(String);

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn chat(&self, _messages: &[ChatMessage], _options: &ChatOptions) -> RagResult<ChatResponse> {
            Ok(ChatResponse { content: self.0.clone(), usage: Usage::default() })
        }
    }

    fn result_with_confidence(id: &str, overall: f32) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            chunk: Chunk::new(id, "some content"),
            score: 1.0,
            scores: Some(SignalScores::default()),
            dense_rank: None,
            sparse_rank: None,
            confidence: Some(ConfidenceScore {
                overall,
                signals: SignalScores::default(),
                factors: ConfidenceFactors::default(),
            }),
        }
    }

    #[tokio::test]
    async fn high_confidence_skips_llm_call() {
        let verifier = Verifier::new(Arc::new(EchoLlm("unused".into())), VerifierConfig::default());
        let out = verifier.verify("q", vec![result_with_confidence("a", 0.95)]).await.unwrap();
        assert!(out[0].verification.verified);
        assert_eq!(out[0].verification.score, 10.0);
    }

    #[tokio::test]
    async fn low_confidence_rejects_without_llm_call() {
        let verifier = Verifier::new(Arc::new(EchoLlm("unused".into())), VerifierConfig::default());
        let out = verifier.verify("q", vec![result_with_confidence("a", 0.1)]).await.unwrap();
        assert!(!out[0].verification.verified);
    }

    #[tokio::test]
    async fn mid_band_calls_llm_and_parses_json() {
        let verifier = Verifier::new(
            Arc::new(EchoLlm(r#"{"verified": true, "score": 8}"#.into())),
            VerifierConfig::default(),
        );
        let out = verifier.verify("q", vec![result_with_confidence("a", 0.5)]).await.unwrap();
        assert!(out[0].verification.verified);
        assert_eq!(out[0].verification.score, 8.0);
    }

    #[tokio::test]
    async fn malformed_response_falls_back_to_numeric_token() {
        let verifier = Verifier::new(Arc::new(EchoLlm("score is 7 out of 10".into())), VerifierConfig::default());
        let out = verifier.verify("q", vec![result_with_confidence("a", 0.5)]).await.unwrap();
        assert!(out[0].verification.verified);
        assert_eq!(out[0].verification.score, 7.0);
    }

    #[tokio::test]
    async fn completely_unparsable_response_defaults_to_verified_mid_score() {
        let verifier = Verifier::new(Arc::new(EchoLlm("no numbers here at all".into())), VerifierConfig::default());
        let out = verifier.verify("q", vec![result_with_confidence("a", 0.5)]).await.unwrap();
        assert!(out[0].verification.verified);
        assert_eq!(out[0].verification.score, 5.0);
    }

    #[tokio::test]
    async fn results_preserve_input_order() {
        let verifier = Verifier::new(Arc::new(EchoLlm(r#"{"verified": true, "score": 9}"#.into())), VerifierConfig::default());
        let inputs = vec![
            result_with_confidence("a", 0.95),
            result_with_confidence("b", 0.5),
            result_with_confidence("c", 0.1),
        ];
        let out = verifier.verify("q", inputs).await.unwrap();
        assert_eq!(out.iter().map(|v| v.result.id.clone()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
