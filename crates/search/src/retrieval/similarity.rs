//! Similarity retriever orchestration
//!
//! Strict order per call: optional rewrite, index lookup for the question
//! and each rewrite, optional rerank. With a reranker attached the index is
//! always asked for enough candidates to make reranking worthwhile.

use super::{QueryRewriter, Reranker, ScoredChunk, VectorIndex};
use futures::stream::{self, StreamExt};
use hybridqa_common::errors::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

struct RerankStage {
    reranker: Arc<dyn Reranker>,
    top_k: usize,
    candidate_floor: usize,
}

/// Retrieves scored chunks for a question
pub struct SimilarityRetriever {
    index: Arc<dyn VectorIndex>,
    rewriter: Option<Arc<dyn QueryRewriter>>,
    rerank: Option<RerankStage>,
    max_concurrency: usize,
}

impl SimilarityRetriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            rewriter: None,
            rerank: None,
            max_concurrency: 1,
        }
    }

    /// Search rewrites of the question alongside the question itself
    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Rerank candidates down to `top_k`, fetching at least `candidate_floor`
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>, top_k: usize, candidate_floor: usize) -> Self {
        self.rerank = Some(RerankStage { reranker, top_k, candidate_floor });
        self
    }

    /// Upper bound on concurrent index lookups
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Number of candidates requested from the index for a caller `top_k`
    pub fn candidate_top_k(&self, top_k: usize) -> usize {
        match &self.rerank {
            Some(stage) if top_k < stage.top_k || top_k < stage.candidate_floor => {
                stage.top_k.max(stage.candidate_floor)
            }
            _ => top_k,
        }
    }

    /// Retrieve chunks scoring at least `score_threshold`
    #[instrument(skip(self, question))]
    pub async fn retrieve(&self, question: &str, top_k: usize, score_threshold: f32) -> Result<Vec<ScoredChunk>> {
        let queries = self.queries_for(question).await;
        let candidate_k = self.candidate_top_k(top_k);

        debug!(queries = queries.len(), candidate_k, "Searching vector index");

        let index = &self.index;
        // Outcomes stay in query order so equal scores merge deterministically
        let searches: Vec<_> = queries
            .iter()
            .map(|query| index.search(query, candidate_k, score_threshold))
            .collect();
        let outcomes: Vec<Result<Vec<ScoredChunk>>> = stream::iter(searches)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut hits = Vec::new();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(found) => hits.push(found),
                Err(e) => {
                    warn!(error = %e, "Vector search failed for one query");
                    first_error.get_or_insert(e);
                }
            }
        }

        // Only a total outage is an error
        if hits.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let candidates = merge_by_content(hits);
        info!(candidates = candidates.len(), "Vector search complete");

        Ok(match &self.rerank {
            Some(stage) => self.apply_rerank(stage, question, candidates).await,
            None => {
                let mut candidates = candidates;
                candidates.truncate(top_k);
                candidates
            }
        })
    }

    async fn queries_for(&self, question: &str) -> Vec<String> {
        let mut queries = vec![question.to_string()];

        if let Some(rewriter) = &self.rewriter {
            match rewriter.rewrite(question).await {
                Ok(rewrites) => {
                    for rewrite in rewrites {
                        let rewrite = rewrite.trim().to_string();
                        if !rewrite.is_empty() && !queries.contains(&rewrite) {
                            queries.push(rewrite);
                        }
                    }
                    debug!(rewrites = queries.len() - 1, "Question rewritten");
                }
                Err(e) => warn!(error = %e, "Query rewrite failed, searching the question only"),
            }
        }

        queries
    }

    async fn apply_rerank(&self, stage: &RerankStage, question: &str, candidates: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        if candidates.is_empty() {
            return candidates;
        }

        let fallback: Vec<ScoredChunk> = candidates.iter().take(stage.top_k).cloned().collect();
        match stage.reranker.rerank(question, candidates, stage.top_k).await {
            Ok(mut reranked) => {
                reranked.truncate(stage.top_k);
                reranked
            }
            Err(e) => {
                warn!(
                    error = %e,
                    model = stage.reranker.model_name(),
                    "Rerank failed, keeping similarity order"
                );
                fallback
            }
        }
    }
}

/// Union of per-query hits, one entry per content with its best score, best first
fn merge_by_content(hits: Vec<Vec<ScoredChunk>>) -> Vec<ScoredChunk> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ScoredChunk> = Vec::new();

    for chunk in hits.into_iter().flatten() {
        match positions.get(&chunk.content) {
            Some(&i) => {
                if chunk.score > merged[i].score {
                    merged[i] = chunk;
                }
            }
            None => {
                positions.insert(chunk.content.clone(), merged.len());
                merged.push(chunk);
            }
        }
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}
