//! One knowledge-chat turn from question to fused context
//!
//! The graph path and the similarity path run concurrently. A failure on
//! either path only empties that path's contribution; fusion starts once
//! both have resolved.

use crate::citation::{CitationBuilder, ReferenceEntry};
use crate::fusion::{ContextFusion, FusedContext};
use crate::graph::{GraphQuery, GraphQueryMapper, GraphResultNormalizer, GraphStore};
use crate::retrieval::{ChunkLookup, DocumentChunk, ScoredChunk, SimilarityRetriever};
use futures::stream::{self, StreamExt};
use hybridqa_common::errors::Result;
use hybridqa_common::metrics::{record_source, record_turn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Inputs of one turn, resolved from the knowledge space at setup
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub question: String,
    pub top_k: usize,
    pub score_threshold: f32,
    /// Documents of the addressed space; citations are restricted to these
    pub document_ids: Vec<Uuid>,
}

/// Everything the answer generator and the caller need from a turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub fused: FusedContext,
    pub chunks: Vec<ScoredChunk>,
    pub references: Vec<ReferenceEntry>,
    pub reference_block: String,
    #[serde(skip)]
    pub graph_query: Option<GraphQuery>,
}

/// Hybrid retrieval pipeline
pub struct HybridPipeline {
    mapper: GraphQueryMapper,
    normalizer: GraphResultNormalizer,
    graph_store: Option<Arc<dyn GraphStore>>,
    chunk_lookup: Arc<dyn ChunkLookup>,
    fusion: ContextFusion,
    citations: CitationBuilder,
    graph_limit: usize,
    max_concurrency: usize,
}

impl HybridPipeline {
    pub fn new(
        graph_store: Option<Arc<dyn GraphStore>>,
        chunk_lookup: Arc<dyn ChunkLookup>,
        graph_limit: usize,
    ) -> Self {
        Self {
            mapper: GraphQueryMapper::new(),
            normalizer: GraphResultNormalizer::new(),
            graph_store,
            chunk_lookup,
            fusion: ContextFusion::new(),
            citations: CitationBuilder::new(),
            graph_limit,
            max_concurrency: 2,
        }
    }

    /// Replace the graph rule table
    pub fn with_mapper(mut self, mapper: GraphQueryMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Upper bound on concurrent chunk lookups
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Run retrieval, fusion and citation for one question
    #[instrument(skip(self, retriever, request), fields(question = %request.question))]
    pub async fn run(&self, retriever: &SimilarityRetriever, request: &TurnRequest) -> Result<TurnResult> {
        let start = Instant::now();

        let ((graph_text, graph_query), chunks) = tokio::join!(
            self.graph_context(&request.question),
            self.similar_chunks(retriever, request)
        );

        let fused = self.fusion.fuse_chunks(&graph_text, &chunks);

        let cited = self.resolve_chunks(&chunks, &request.document_ids).await;
        let references = self.citations.build(&cited);
        let reference_block = self.citations.render(&references)?;

        record_turn(start.elapsed().as_secs_f64(), fused.rule.as_str());
        info!(
            rule = fused.rule.as_str(),
            chunks = chunks.len(),
            references = references.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Turn context ready"
        );

        Ok(TurnResult {
            fused,
            chunks,
            references,
            reference_block,
            graph_query,
        })
    }

    /// Graph path: map, execute, normalize; empty on any failure
    async fn graph_context(&self, question: &str) -> (String, Option<GraphQuery>) {
        let Some(store) = &self.graph_store else {
            return (String::new(), None);
        };
        if !store.ensure_available().await {
            warn!("Graph store is not available, skipping graph query");
            return (String::new(), None);
        }

        let start = Instant::now();
        let query = self.mapper.map(question, self.graph_limit);

        match store.execute(&query).await {
            Ok(records) => {
                let text = self.normalizer.normalize(&records);
                record_source("graph", start.elapsed().as_secs_f64(), records.len(), false);
                if !text.is_empty() {
                    let preview: String = text.chars().take(200).collect();
                    info!(preview = %preview, "Graph context generated");
                }
                (text, Some(query))
            }
            Err(e) => {
                record_source("graph", start.elapsed().as_secs_f64(), 0, true);
                error!(error = %e, "Graph query failed, continuing without graph context");
                (String::new(), Some(query))
            }
        }
    }

    /// Similarity path; empty on any failure
    async fn similar_chunks(&self, retriever: &SimilarityRetriever, request: &TurnRequest) -> Vec<ScoredChunk> {
        let start = Instant::now();

        match retriever
            .retrieve(&request.question, request.top_k, request.score_threshold)
            .await
        {
            Ok(chunks) => {
                record_source("vector", start.elapsed().as_secs_f64(), chunks.len(), false);
                if chunks.is_empty() {
                    info!("No relevant documents retrieved");
                }
                chunks
            }
            Err(e) => {
                record_source("vector", start.elapsed().as_secs_f64(), 0, true);
                error!(error = %e, "Similarity retrieval failed, continuing without documents");
                Vec::new()
            }
        }
    }

    /// Attach persisted ids and metadata to raw hits, keeping hit order
    async fn resolve_chunks(&self, chunks: &[ScoredChunk], document_ids: &[Uuid]) -> Vec<(DocumentChunk, f64)> {
        let lookup = &self.chunk_lookup;

        let lookups: Vec<_> = chunks
            .iter()
            .map(|chunk| async move {
                match lookup.find_chunk(&chunk.content, document_ids).await {
                    Ok(found) => found.map(|doc| (doc, chunk.score)),
                    Err(e) => {
                        warn!(error = %e, "Chunk lookup failed, hit left uncited");
                        None
                    }
                }
            })
            .collect();

        stream::iter(lookups)
            .buffered(self.max_concurrency)
            .filter_map(|resolved| async move { resolved })
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::FusionRule;
    use crate::graph::{GraphElement, GraphRecord};
    use crate::retrieval::VectorIndex;
    use async_trait::async_trait;
    use hybridqa_common::errors::AppError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockGraph {
        records: Vec<GraphRecord>,
        available: bool,
        fail: bool,
    }

    #[async_trait]
    impl GraphStore for MockGraph {
        async fn execute(&self, _query: &GraphQuery) -> Result<Vec<GraphRecord>> {
            if self.fail {
                return Err(AppError::MalformedQuery { message: "Invalid input".into() });
            }
            Ok(self.records.clone())
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    /// Starts down and comes back on its first reconnection attempt
    struct RecoveringGraph {
        inner: MockGraph,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl GraphStore for RecoveringGraph {
        async fn execute(&self, query: &GraphQuery) -> Result<Vec<GraphRecord>> {
            self.inner.execute(query).await
        }

        fn is_available(&self) -> bool {
            false
        }

        async fn ensure_available(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct MockIndex {
        hits: Vec<ScoredChunk>,
        fail: bool,
    }

    #[async_trait]
    impl VectorIndex for MockIndex {
        async fn search(&self, _query: &str, top_k: usize, _score_floor: f32) -> Result<Vec<ScoredChunk>> {
            if self.fail {
                return Err(AppError::unavailable("vector index", "timeout"));
            }
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }
    }

    /// Persisted chunks keyed by content
    struct MockLookup {
        chunks: HashMap<String, DocumentChunk>,
    }

    #[async_trait]
    impl ChunkLookup for MockLookup {
        async fn find_chunk(&self, content: &str, document_ids: &[Uuid]) -> Result<Option<DocumentChunk>> {
            if document_ids.is_empty() {
                return Ok(None);
            }
            Ok(self.chunks.get(content).cloned())
        }
    }

    fn mao_graph() -> MockGraph {
        let node = GraphElement::Node {
            labels: vec!["人物".to_string()],
            properties: json!({"nodeName": "毛泽东", "出生地": "湘潭"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        MockGraph {
            records: vec![GraphRecord::single("n", node)],
            available: true,
            fail: false,
        }
    }

    fn hit(content: &str, doc_name: &str, score: f64) -> ScoredChunk {
        ScoredChunk {
            content: content.to_string(),
            doc_name: doc_name.to_string(),
            score,
        }
    }

    fn persisted(id: u128, content: &str, doc_name: &str) -> (String, DocumentChunk) {
        (
            content.to_string(),
            DocumentChunk {
                id: Uuid::from_u128(id),
                doc_name: doc_name.to_string(),
                content: content.to_string(),
                meta_info: String::new(),
            },
        )
    }

    fn request(question: &str) -> TurnRequest {
        TurnRequest {
            question: question.to_string(),
            top_k: 5,
            score_threshold: 0.0,
            document_ids: vec![Uuid::from_u128(42)],
        }
    }

    fn empty_lookup() -> Arc<dyn ChunkLookup> {
        Arc::new(MockLookup { chunks: HashMap::new() })
    }

    #[tokio::test]
    async fn test_graph_only_turn() {
        let pipeline = HybridPipeline::new(Some(Arc::new(mao_graph())), empty_lookup(), 5);
        let retriever = SimilarityRetriever::new(Arc::new(MockIndex { hits: vec![], fail: false }));

        let result = pipeline.run(&retriever, &request("毛泽东的出生地")).await.unwrap();

        assert_eq!(result.fused.context, "毛泽东，出生地为湘潭。");
        assert!(result.fused.context.contains("毛泽东"));
        assert!(result.fused.context.contains("湘潭"));
        assert_eq!(result.fused.rule, FusionRule::GraphOnly);
        assert!(result.references.is_empty());
        assert_eq!(result.graph_query.unwrap().rule, Some("person:毛泽东"));
    }

    #[tokio::test]
    async fn test_both_sources_with_citations() {
        let lookup = MockLookup {
            chunks: HashMap::from([
                persisted(1, "韶山冲位于湘潭县。", "湘潭志.md"),
                persisted(2, "1893年生于韶山。", "湘潭志.md"),
            ]),
        };
        let index = MockIndex {
            hits: vec![
                hit("韶山冲位于湘潭县。", "湘潭志.md", 0.92),
                hit("1893年生于韶山。", "湘潭志.md", 0.81),
                hit("未入库的片段", "other.md", 0.5),
            ],
            fail: false,
        };
        let pipeline = HybridPipeline::new(Some(Arc::new(mao_graph())), Arc::new(lookup), 5);
        let retriever = SimilarityRetriever::new(Arc::new(index));

        let result = pipeline.run(&retriever, &request("毛泽东的出生地")).await.unwrap();

        assert_eq!(
            result.fused.context,
            "韶山冲位于湘潭县。\n1893年生于韶山。\n未入库的片段\n\n毛泽东，出生地为湘潭。"
        );
        assert_eq!(result.fused.rule, FusionRule::Both);
        assert_eq!(result.fused.relations, vec!["湘潭志.md", "other.md"]);
        assert_eq!(result.references.len(), 1);
        assert_eq!(result.references[0].chunks.len(), 2);
        assert_eq!(result.references[0].chunks[1].recall_score, 0.81);
        assert!(result.reference_block.starts_with("<references title=\"References\""));
    }

    #[tokio::test]
    async fn test_source_failures_degrade_to_empty() {
        let graph = MockGraph { fail: true, ..mao_graph() };
        let pipeline = HybridPipeline::new(Some(Arc::new(graph)), empty_lookup(), 5);
        let retriever = SimilarityRetriever::new(Arc::new(MockIndex { hits: vec![], fail: true }));

        let result = pipeline.run(&retriever, &request("毛泽东的出生地")).await.unwrap();

        assert!(result.fused.is_empty());
        assert_eq!(result.fused.context, "");
        assert!(result.references.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_graph_is_skipped() {
        let graph = MockGraph { available: false, ..mao_graph() };
        let pipeline = HybridPipeline::new(Some(Arc::new(graph)), empty_lookup(), 5);
        let index = MockIndex { hits: vec![hit("D", "a.md", 0.9)], fail: false };
        let retriever = SimilarityRetriever::new(Arc::new(index));

        let result = pipeline.run(&retriever, &request("毛泽东的出生地")).await.unwrap();

        assert_eq!(result.fused.context, "D");
        assert_eq!(result.fused.rule, FusionRule::DocumentOnly);
        assert!(result.graph_query.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_graph_is_retried_each_turn() {
        let graph = Arc::new(RecoveringGraph {
            inner: mao_graph(),
            probes: AtomicUsize::new(0),
        });
        let pipeline = HybridPipeline::new(Some(graph.clone()), empty_lookup(), 5);
        let retriever = SimilarityRetriever::new(Arc::new(MockIndex { hits: vec![], fail: false }));

        for _ in 0..2 {
            let result = pipeline.run(&retriever, &request("毛泽东的出生地")).await.unwrap();
            assert_eq!(result.fused.context, "毛泽东，出生地为湘潭。");
        }
        assert_eq!(graph.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_without_graph_store() {
        let pipeline = HybridPipeline::new(None, empty_lookup(), 5);
        let retriever = SimilarityRetriever::new(Arc::new(MockIndex { hits: vec![], fail: false }));

        let result = pipeline.run(&retriever, &request("任何问题")).await.unwrap();
        assert_eq!(result.fused.rule, FusionRule::Empty);
    }
}
