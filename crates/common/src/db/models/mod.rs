//! SeaORM entity models
//!
//! Database entities for knowledge spaces, documents and chunks

mod space;
mod document;
mod chunk;

pub use space::{
    Entity as KnowledgeSpaceEntity,
    Model as KnowledgeSpace,
    ActiveModel as KnowledgeSpaceActiveModel,
    Column as KnowledgeSpaceColumn,
    KNOWLEDGE_GRAPH_TYPES,
};

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
};

pub use chunk::{
    Entity as ChunkEntity,
    Model as Chunk,
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
};
