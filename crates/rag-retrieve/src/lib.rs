//! First-stage and hybrid retrieval for the pipeline.
//!
//! - [`bm25`]: tokenizer + inverted index + Okapi BM25 scoring (C1).
//! - [`dense`]: embeds a query and delegates similarity search to an
//!   external vector store (C2).
//! - [`hybrid`]: coordinates dense + sparse (+ optional graph) retrieval
//!   concurrently and fuses them via [`rag_fusion`] (C4).

pub mod bm25;
pub mod dense;
pub mod hybrid;

pub use bm25::{Bm25Config, Bm25Document, Bm25Index, Bm25Params, DefaultTokenizer, Tokenizer};
pub use dense::DenseRetriever;
pub use hybrid::{HybridConfig, HybridRetriever};

pub mod prelude {
    pub use crate::bm25::{Bm25Config, Bm25Document, Bm25Index, Bm25Params, DefaultTokenizer, Tokenizer};
    pub use crate::dense::DenseRetriever;
    pub use crate::hybrid::{HybridConfig, HybridRetriever};
}
