//! Secondary relevance scoring: an optional reranker pass followed by an
//! optional LLM-gated verification pass. Both stages are skippable; the
//! engine falls back to retrieval-order scores when neither is wired up.

pub mod rerank;
pub mod verify;

pub use rerank::{NoopReranker, Reranker, RerankerResult, RerankerScores};
pub use verify::{Verification, Verifier, VerifierConfig, VerifiedResult};

pub mod prelude {
    pub use crate::rerank::{NoopReranker, Reranker, RerankerResult, RerankerScores};
    pub use crate::verify::{Verification, Verifier, VerifierConfig, VerifiedResult};
}
