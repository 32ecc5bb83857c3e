//! Citation payload for retrieved chunks
//!
//! Chunks are grouped by source document and rendered as a single
//! `<references title="References" references="[...]"/>` element that the UI
//! expands into a reference list below the answer.

use crate::retrieval::DocumentChunk;
use hybridqa_common::errors::{AppError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title attribute of the rendered reference block
pub const REFERENCES_TITLE: &str = "References";

/// One cited chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceChunk {
    pub id: Uuid,
    pub content: String,
    pub meta_info: String,
    pub recall_score: f64,
}

/// All cited chunks of one source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceEntry {
    pub name: String,
    pub chunks: Vec<ReferenceChunk>,
}

/// Groups chunks into reference entries and renders the reference block
#[derive(Debug, Clone, Default)]
pub struct CitationBuilder;

impl CitationBuilder {
    pub fn new() -> Self {
        Self
    }

    /// One entry per document name, documents and chunks in first-seen order
    pub fn build(&self, chunks_with_score: &[(DocumentChunk, f64)]) -> Vec<ReferenceEntry> {
        let mut entries: Vec<ReferenceEntry> = Vec::new();

        for (chunk, score) in chunks_with_score {
            let reference = ReferenceChunk {
                id: chunk.id,
                content: chunk.content.clone(),
                meta_info: chunk.meta_info.clone(),
                recall_score: *score,
            };

            match entries.iter_mut().find(|e| e.name == chunk.doc_name) {
                Some(entry) => entry.chunks.push(reference),
                None => entries.push(ReferenceEntry {
                    name: chunk.doc_name.clone(),
                    chunks: vec![reference],
                }),
            }
        }

        entries
    }

    /// Render entries as one self-closing markup element
    ///
    /// The JSON payload keeps non-ASCII text as-is; escaped newlines are
    /// removed so the element stays on a single line.
    pub fn render(&self, entries: &[ReferenceEntry]) -> Result<String> {
        let payload = serde_json::to_string(entries)?.replace("\\n", "");

        let mut element = BytesStart::new("references");
        element.push_attribute(("title", REFERENCES_TITLE));
        element.push_attribute(("references", payload.as_str()));

        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Empty(element))
            .map_err(|e| AppError::Internal {
                message: format!("Failed to render references: {}", e),
            })?;

        String::from_utf8(writer.into_inner()).map_err(|e| AppError::Internal {
            message: format!("Reference block is not UTF-8: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_chunk(id: u128, doc_name: &str, content: &str) -> DocumentChunk {
        DocumentChunk {
            id: Uuid::from_u128(id),
            doc_name: doc_name.to_string(),
            content: content.to_string(),
            meta_info: "{\"page\": 1}".to_string(),
        }
    }

    #[test]
    fn test_same_document_merged_in_append_order() {
        let chunks = vec![
            (doc_chunk(1, "湖南史.pdf", "第一段"), 0.9),
            (doc_chunk(2, "湖南史.pdf", "第二段"), 0.7),
        ];

        let entries = CitationBuilder::new().build(&chunks);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "湖南史.pdf");
        assert_eq!(entries[0].chunks.len(), 2);
        assert_eq!(entries[0].chunks[0].content, "第一段");
        assert_eq!(entries[0].chunks[1].recall_score, 0.7);
    }

    #[test]
    fn test_documents_in_first_seen_order() {
        let chunks = vec![
            (doc_chunk(1, "b.pdf", "x"), 0.9),
            (doc_chunk(2, "a.pdf", "y"), 0.8),
            (doc_chunk(3, "b.pdf", "z"), 0.5),
        ];

        let entries = CitationBuilder::new().build(&chunks);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
        assert_eq!(entries[0].chunks.len(), 2);
    }

    #[test]
    fn test_render_single_element() {
        let builder = CitationBuilder::new();
        let entries = builder.build(&[(doc_chunk(1, "湘潭志.md", "韶山冲\n位于湘潭"), 0.5)]);

        let block = builder.render(&entries).unwrap();
        assert!(block.starts_with("<references title=\"References\" references=\"[{&quot;name&quot;:&quot;湘潭志.md&quot;"));
        assert!(block.ends_with("\"/>"));
        assert!(block.contains("韶山冲位于湘潭"));
        assert!(!block.contains("\\n"));
        assert!(!block.contains('\n'));
    }

    #[test]
    fn test_render_empty() {
        let block = CitationBuilder::new().render(&[]).unwrap();
        assert_eq!(block, "<references title=\"References\" references=\"[]\"/>");
    }
}
