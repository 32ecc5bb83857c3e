//! Repository pattern for database operations
//!
//! Read-side data access for knowledge spaces, documents and chunks.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row returned by the vector similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub doc_name: String,
    pub content: String,
    pub score: f64,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    // ========================================================================
    // Knowledge Space Operations
    // ========================================================================

    /// Find a space by name, falling back to its id
    pub async fn find_space(&self, name_or_id: &str) -> Result<Option<KnowledgeSpace>> {
        let by_name = KnowledgeSpaceEntity::find()
            .filter(KnowledgeSpaceColumn::Name.eq(name_or_id))
            .one(self.read_conn())
            .await?;

        if by_name.is_some() {
            return Ok(by_name);
        }

        match Uuid::parse_str(name_or_id) {
            Ok(id) => KnowledgeSpaceEntity::find_by_id(id)
                .one(self.read_conn())
                .await
                .map_err(Into::into),
            Err(_) => Ok(None),
        }
    }

    /// Ids of every document stored in a space
    pub async fn list_document_ids(&self, space_id: Uuid) -> Result<Vec<Uuid>> {
        DocumentEntity::find()
            .select_only()
            .column(DocumentColumn::Id)
            .filter(DocumentColumn::SpaceId.eq(space_id))
            .order_by_asc(DocumentColumn::CreatedAt)
            .into_tuple::<Uuid>()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Chunk Operations
    // ========================================================================

    /// Persisted chunks with exactly this content, restricted to the given documents
    pub async fn find_chunks_by_content(
        &self,
        content: &str,
        document_ids: &[Uuid],
    ) -> Result<Vec<Chunk>> {
        if document_ids.is_empty() {
            return Ok(vec![]);
        }

        ChunkEntity::find()
            .filter(ChunkColumn::Content.eq(content))
            .filter(ChunkColumn::DocumentId.is_in(document_ids.iter().copied()))
            .order_by_asc(ChunkColumn::ChunkIndex)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Cosine similarity search over a space's chunks
    pub async fn vector_search(
        &self,
        embedding: &[f32],
        space_id: Uuid,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ChunkHit>> {
        let embedding_str = format!(
            "[{}]",
            embedding.iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        let sql = r#"
            SELECT
                c.doc_name,
                c.content,
                1 - (c.embedding::vector <=> $1::vector) as score
            FROM document_chunks c
            JOIN knowledge_documents d ON c.document_id = d.id
            WHERE c.embedding IS NOT NULL
              AND d.space_id = $3
              AND 1 - (c.embedding::vector <=> $1::vector) >= $4
            ORDER BY c.embedding::vector <=> $1::vector
            LIMIT $2
        "#;

        let values: Vec<sea_orm::Value> = vec![
            embedding_str.into(),
            (limit as i64).into(),
            space_id.into(),
            (min_score as f64).into(),
        ];

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);

        let results = self.read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(ChunkHit {
                    doc_name: row.try_get_by_index::<String>(0).ok()?,
                    content: row.try_get_by_index::<String>(1).ok()?,
                    score: row.try_get_by_index::<f64>(2).ok()?,
                })
            })
            .collect();

        Ok(results)
    }
}
