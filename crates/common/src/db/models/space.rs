//! Knowledge space entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Vector types whose spaces are backed by a knowledge graph store
pub const KNOWLEDGE_GRAPH_TYPES: &[&str] = &["KnowledgeGraph", "CommunitySummaryKnowledgeGraph"];

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "knowledge_spaces")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub name: String,

    /// Storage backend of the space (VectorStore, KnowledgeGraph, ...)
    #[sea_orm(column_type = "Text")]
    pub vector_type: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Per-space retrieval and prompt overrides as JSONB
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub context: Option<serde_json::Value>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::document::Entity")]
    Documents,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when the space stores a knowledge graph rather than plain vectors
    pub fn is_knowledge_graph(&self) -> bool {
        KNOWLEDGE_GRAPH_TYPES.contains(&self.vector_type.as_str())
    }

    /// `context.embedding.topk`, accepting numbers or numeric strings
    pub fn context_top_k(&self) -> Option<usize> {
        let value = self.context.as_ref()?.pointer("/embedding/topk")?;
        match value {
            serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `context.embedding.recall_score`, accepting numbers or numeric strings
    pub fn context_recall_score(&self) -> Option<f32> {
        let value = self.context.as_ref()?.pointer("/embedding/recall_score")?;
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(|n| n as f32),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// `context.prompt.template`, when non-empty
    pub fn context_prompt(&self) -> Option<&str> {
        self.context
            .as_ref()?
            .pointer("/prompt/template")?
            .as_str()
            .filter(|t| !t.trim().is_empty())
    }
}
