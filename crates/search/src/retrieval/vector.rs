//! Vector similarity search using pgvector
//!
//! Embeds the query and runs cosine search over one knowledge space's chunks

use super::{ScoredChunk, VectorIndex};
use async_trait::async_trait;
use hybridqa_common::db::Repository;
use hybridqa_common::embeddings::Embedder;
use hybridqa_common::errors::{AppError, Result};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// pgvector index scoped to a single knowledge space
pub struct PgVectorIndex {
    repo: Repository,
    embedder: Arc<dyn Embedder>,
    space_id: Uuid,
}

impl PgVectorIndex {
    /// Create an index over the given space
    pub fn new(repo: Repository, embedder: Arc<dyn Embedder>, space_id: Uuid) -> Self {
        Self { repo, embedder, space_id }
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    #[instrument(skip(self, query), fields(space_id = %self.space_id))]
    async fn search(&self, query: &str, top_k: usize, score_floor: f32) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed(query).await?;

        let hits = self
            .repo
            .vector_search(&embedding, self.space_id, top_k, score_floor)
            .await
            .map_err(|e| match e {
                AppError::Database(err) => AppError::unavailable("vector index", err),
                other => other,
            })?;

        Ok(hits
            .into_iter()
            .map(|hit| ScoredChunk {
                content: hit.content,
                doc_name: hit.doc_name,
                score: hit.score,
            })
            .collect())
    }
}
