//! HybridQA search library
//!
//! Everything one knowledge-chat turn needs between the question and the
//! answer generator:
//! - Graph query mapping, execution and normalization into prose
//! - Similarity retrieval with optional query rewriting and reranking
//! - Context fusion of graph and document evidence
//! - Citation grouping and reference block rendering

pub mod citation;
pub mod fusion;
pub mod graph;
pub mod pipeline;
pub mod retrieval;

pub use citation::{CitationBuilder, ReferenceChunk, ReferenceEntry};
pub use fusion::{ContextFusion, FusedContext, FusionRule};
pub use graph::{GraphElement, GraphQuery, GraphQueryMapper, GraphRecord, GraphResultNormalizer, GraphStore};
pub use pipeline::{HybridPipeline, TurnRequest, TurnResult};
pub use retrieval::{DocumentChunk, ScoredChunk, SimilarityRetriever};
