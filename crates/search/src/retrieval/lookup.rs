//! Persisted chunk lookup backed by the repository

use super::{ChunkLookup, DocumentChunk};
use async_trait::async_trait;
use hybridqa_common::db::Repository;
use hybridqa_common::errors::Result;
use uuid::Uuid;

/// Resolves similarity hits to stored chunks by exact content
#[derive(Clone)]
pub struct RepositoryChunkLookup {
    repo: Repository,
}

impl RepositoryChunkLookup {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ChunkLookup for RepositoryChunkLookup {
    async fn find_chunk(&self, content: &str, document_ids: &[Uuid]) -> Result<Option<DocumentChunk>> {
        let chunks = self.repo.find_chunks_by_content(content, document_ids).await?;

        Ok(chunks.into_iter().next().map(|chunk| DocumentChunk {
            id: chunk.id,
            doc_name: chunk.doc_name,
            content: chunk.content,
            meta_info: chunk.meta_info,
        }))
    }
}
