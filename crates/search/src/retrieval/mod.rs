//! Similarity retrieval over the document index
//!
//! Provides:
//! - The similarity retriever (rewrite → vector lookup → rerank)
//! - pgvector-backed index scoped to one knowledge space
//! - LLM query rewriting and HTTP reranking capabilities
//! - Persisted chunk lookup for citation metadata

mod lookup;
mod rerank;
mod rewrite;
mod similarity;
mod vector;

pub use lookup::RepositoryChunkLookup;
pub use rerank::HttpReranker;
pub use rewrite::LlmQueryRewriter;
pub use similarity::SimilarityRetriever;
pub use vector::PgVectorIndex;

use async_trait::async_trait;
use hybridqa_common::errors::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw hit from the vector index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// Chunk text
    pub content: String,

    /// Name of the owning document
    pub doc_name: String,

    /// Similarity in [0, 1], or the reranker's unbounded relevance score
    pub score: f64,
}

/// Persisted chunk with stable id and metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub doc_name: String,
    pub content: String,
    pub meta_info: String,
}

/// Vector similarity index
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `top_k` chunks scoring at least `score_floor`, best first
    async fn search(&self, query: &str, top_k: usize, score_floor: f32) -> Result<Vec<ScoredChunk>>;
}

/// Optional capability turning a question into extra search queries
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, question: &str) -> Result<Vec<String>>;
}

/// Optional capability re-scoring a candidate set
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reordered candidates, at most `top_k`
    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, top_k: usize) -> Result<Vec<ScoredChunk>>;

    fn model_name(&self) -> &str;
}

/// Resolves raw hits to persisted chunks
#[async_trait]
pub trait ChunkLookup: Send + Sync {
    /// First persisted chunk with this exact content within the allowed documents
    async fn find_chunk(&self, content: &str, document_ids: &[Uuid]) -> Result<Option<DocumentChunk>>;
}
