//! Context fusion of graph and document evidence
//!
//! Fixed priority union, no score weighting:
//! - both present: document context, blank line, graph context
//! - one present: that context verbatim
//! - neither: empty context, which the answer generator treats as no evidence
//!
//! The two blocks are not deduplicated against each other.

use crate::retrieval::ScoredChunk;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Which combination rule produced a fused context
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionRule {
    Both,
    GraphOnly,
    DocumentOnly,
    Empty,
}

impl FusionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionRule::Both => "both",
            FusionRule::GraphOnly => "graph_only",
            FusionRule::DocumentOnly => "document_only",
            FusionRule::Empty => "empty",
        }
    }
}

/// Final context plus the parts it was built from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedContext {
    pub context: String,
    pub graph_context: String,
    pub document_context: String,
    pub rule: FusionRule,
    /// Distinct source file names behind the document context, first seen first
    pub relations: Vec<String>,
}

impl FusedContext {
    /// True when neither source contributed evidence
    pub fn is_empty(&self) -> bool {
        self.rule == FusionRule::Empty
    }
}

/// Merges graph-derived and document-derived text
#[derive(Debug, Clone, Default)]
pub struct ContextFusion;

impl ContextFusion {
    pub fn new() -> Self {
        Self
    }

    /// Combine the two textual blocks by priority
    pub fn fuse(&self, graph_text: &str, doc_text: &str) -> FusedContext {
        let (context, rule) = match (graph_text.is_empty(), doc_text.is_empty()) {
            (false, false) => (format!("{}\n\n{}", doc_text, graph_text), FusionRule::Both),
            (false, true) => (graph_text.to_string(), FusionRule::GraphOnly),
            (true, false) => (doc_text.to_string(), FusionRule::DocumentOnly),
            (true, true) => (String::new(), FusionRule::Empty),
        };

        info!(rule = rule.as_str(), chars = context.chars().count(), "Context fused");

        FusedContext {
            context,
            graph_context: graph_text.to_string(),
            document_context: doc_text.to_string(),
            rule,
            relations: Vec::new(),
        }
    }

    /// Fuse graph text with retrieved chunks, one chunk per line
    pub fn fuse_chunks(&self, graph_text: &str, chunks: &[ScoredChunk]) -> FusedContext {
        let doc_text = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut fused = self.fuse(graph_text, &doc_text);
        fused.relations = source_names(chunks);
        fused
    }
}

/// File names of the chunks' documents, deduplicated
fn source_names(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for chunk in chunks {
        let name = Path::new(&chunk.doc_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| chunk.doc_name.clone());
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, doc_name: &str) -> ScoredChunk {
        ScoredChunk {
            content: content.to_string(),
            doc_name: doc_name.to_string(),
            score: 0.8,
        }
    }

    #[test]
    fn test_priority_rules() {
        let fusion = ContextFusion::new();

        let fused = fusion.fuse("", "");
        assert_eq!(fused.context, "");
        assert_eq!(fused.rule, FusionRule::Empty);
        assert!(fused.is_empty());

        let fused = fusion.fuse("G", "");
        assert_eq!(fused.context, "G");
        assert_eq!(fused.rule, FusionRule::GraphOnly);

        let fused = fusion.fuse("", "D");
        assert_eq!(fused.context, "D");
        assert_eq!(fused.rule, FusionRule::DocumentOnly);

        let fused = fusion.fuse("G", "D");
        assert_eq!(fused.context, "D\n\nG");
        assert_eq!(fused.rule, FusionRule::Both);
        assert_eq!(fused.graph_context, "G");
        assert_eq!(fused.document_context, "D");
    }

    #[test]
    fn test_no_cross_source_dedup() {
        let fused = ContextFusion::new().fuse("毛泽东出生于湘潭。", "毛泽东出生于湘潭。");
        assert_eq!(fused.context, "毛泽东出生于湘潭。\n\n毛泽东出生于湘潭。");
    }

    #[test]
    fn test_fuse_chunks_joins_lines_and_dedups_sources() {
        let chunks = vec![
            chunk("第一段", "/data/docs/湖南史.pdf"),
            chunk("第二段", "湘潭志.md"),
            chunk("第三段", "/archive/湖南史.pdf"),
        ];

        let fused = ContextFusion::new().fuse_chunks("", &chunks);
        assert_eq!(fused.context, "第一段\n第二段\n第三段");
        assert_eq!(fused.relations, vec!["湖南史.pdf", "湘潭志.md"]);
    }

    #[test]
    fn test_fuse_chunks_without_chunks() {
        let fused = ContextFusion::new().fuse_chunks("G", &[]);
        assert_eq!(fused.rule, FusionRule::GraphOnly);
        assert!(fused.relations.is_empty());
    }
}
