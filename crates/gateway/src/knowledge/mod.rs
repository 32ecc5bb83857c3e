//! Knowledge-chat turn setup and answer generation
//!
//! Setup resolves the addressed space and its retrieval parameters and is
//! the only place a turn can fail before retrieval starts.

pub mod prompt;

use crate::AppState;
use hybridqa_common::config::{AppConfig, RetrievalConfig};
use hybridqa_common::db::models::KnowledgeSpace;
use hybridqa_common::errors::{AppError, Result};
use hybridqa_common::llm::ChatClient;
use hybridqa_search::retrieval::{LlmQueryRewriter, PgVectorIndex, QueryRewriter};
use hybridqa_search::{FusedContext, SimilarityRetriever, TurnRequest};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Per-turn parameters resolved from the knowledge space
#[derive(Debug, Clone)]
pub struct TurnSetup {
    pub space: KnowledgeSpace,
    pub top_k: usize,
    pub score_threshold: f32,
    pub rerank_top_k: usize,
    pub document_ids: Vec<Uuid>,
    pub prompt_template: Option<String>,
}

impl TurnSetup {
    pub fn request(&self, question: &str) -> TurnRequest {
        TurnRequest {
            question: question.to_string(),
            top_k: self.top_k,
            score_threshold: self.score_threshold,
            document_ids: self.document_ids.clone(),
        }
    }
}

/// Resolve the space by name, then id; abort the turn when it does not exist
#[instrument(skip(state))]
pub async fn setup_turn(state: &AppState, space: &str) -> Result<TurnSetup> {
    let found = state
        .repo
        .find_space(space)
        .await?
        .ok_or_else(|| AppError::KnowledgeSpaceNotFound {
            space: space.to_string(),
        })?;

    let retrieval = &state.config.retrieval;
    let document_ids = state.repo.list_document_ids(found.id).await?;

    let setup = TurnSetup {
        top_k: resolve_top_k(&found, retrieval),
        score_threshold: resolve_score_threshold(&found, retrieval),
        rerank_top_k: retrieval.effective_rerank_top_k(),
        prompt_template: found.context_prompt().map(str::to_string),
        document_ids,
        space: found,
    };

    info!(
        space = %setup.space.name,
        top_k = setup.top_k,
        score_threshold = setup.score_threshold,
        documents = setup.document_ids.len(),
        "Turn setup complete"
    );

    Ok(setup)
}

/// Space `topk`, then the knowledge-graph default, then the configured overrides
pub fn resolve_top_k(space: &KnowledgeSpace, retrieval: &RetrievalConfig) -> usize {
    if let Some(top_k) = space.context_top_k() {
        return top_k;
    }
    if space.is_knowledge_graph() {
        return retrieval.kg_chunk_search_top_k;
    }
    retrieval
        .knowledge_retrieve_top_k
        .filter(|k| *k > 0)
        .unwrap_or(retrieval.similarity_top_k)
}

/// Space `recall_score`, then the configured threshold
pub fn resolve_score_threshold(space: &KnowledgeSpace, retrieval: &RetrievalConfig) -> f32 {
    space
        .context_recall_score()
        .unwrap_or(retrieval.similarity_score_threshold)
}

/// Query rewriter over the chat model, when rewriting is enabled and a model is configured
pub fn build_rewriter(config: &AppConfig, llm: Arc<ChatClient>) -> Option<Arc<dyn QueryRewriter>> {
    if !config.retrieval.query_rewrite {
        return None;
    }
    if config.llm.api_key.is_empty() {
        warn!("Query rewrite enabled without an LLM API key, searching questions as asked");
        return None;
    }

    Some(Arc::new(LlmQueryRewriter::new(
        llm,
        config.retrieval.language.clone(),
        config.retrieval.rewrite_count,
    )))
}

/// Similarity retriever over the space's vectors with the configured capabilities
pub fn build_retriever(state: &AppState, setup: &TurnSetup) -> SimilarityRetriever {
    let retrieval = &state.config.retrieval;
    let index = PgVectorIndex::new(state.repo.clone(), state.embedder.clone(), setup.space.id);

    let mut retriever = SimilarityRetriever::new(Arc::new(index))
        .with_max_concurrency(retrieval.max_concurrency);

    if retrieval.query_rewrite {
        if let Some(rewriter) = &state.rewriter {
            retriever = retriever.with_rewriter(rewriter.clone());
        }
    }
    if let Some(reranker) = &state.reranker {
        retriever = retriever.with_reranker(reranker.clone(), setup.rerank_top_k, retrieval.rerank_candidate_floor);
    }

    retriever
}

/// Model answer for the fused context, or the fixed answer when there is no evidence
pub async fn generate_answer(
    llm: &ChatClient,
    setup: &TurnSetup,
    fused: &FusedContext,
    question: &str,
    language: &str,
) -> Result<String> {
    if fused.is_empty() {
        info!("No evidence from either source, returning fixed answer");
        return Ok(prompt::no_evidence_answer(language).to_string());
    }

    let template = setup
        .prompt_template
        .as_deref()
        .unwrap_or_else(|| prompt::default_template(language));

    llm.complete(&prompt::build_messages(template, fused, question)).await
}

/// Answer text followed by the reference block
pub fn render_answer(answer: &str, reference_block: &str) -> String {
    format!("{}\n\n{}", answer, reference_block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridqa_common::config::LlmConfig;
    use hybridqa_search::ContextFusion;
    use serde_json::json;

    fn space(vector_type: &str, context: Option<serde_json::Value>) -> KnowledgeSpace {
        KnowledgeSpace {
            id: Uuid::nil(),
            name: "history".to_string(),
            vector_type: vector_type.to_string(),
            description: None,
            context,
            created_at: chrono::Utc::now().into(),
        }
    }

    fn setup(template: Option<&str>) -> TurnSetup {
        TurnSetup {
            space: space("VectorStore", None),
            top_k: 5,
            score_threshold: 0.0,
            rerank_top_k: 3,
            document_ids: vec![],
            prompt_template: template.map(str::to_string),
        }
    }

    #[test]
    fn test_top_k_prefers_space_context() {
        let retrieval = RetrievalConfig::default();
        let s = space("KnowledgeGraph", Some(json!({"embedding": {"topk": 8}})));
        assert_eq!(resolve_top_k(&s, &retrieval), 8);
    }

    #[test]
    fn test_top_k_for_knowledge_graph_space() {
        let retrieval = RetrievalConfig {
            knowledge_retrieve_top_k: Some(12),
            ..RetrievalConfig::default()
        };
        assert_eq!(resolve_top_k(&space("KnowledgeGraph", None), &retrieval), 5);
        assert_eq!(resolve_top_k(&space("VectorStore", None), &retrieval), 12);
    }

    #[test]
    fn test_top_k_defaults() {
        let retrieval = RetrievalConfig::default();
        assert_eq!(resolve_top_k(&space("VectorStore", None), &retrieval), 10);
    }

    #[test]
    fn test_score_threshold_resolution() {
        let retrieval = RetrievalConfig {
            similarity_score_threshold: 0.2,
            ..RetrievalConfig::default()
        };
        let with_context = space("VectorStore", Some(json!({"embedding": {"recall_score": "0.45"}})));

        assert_eq!(resolve_score_threshold(&with_context, &retrieval), 0.45);
        assert_eq!(resolve_score_threshold(&space("VectorStore", None), &retrieval), 0.2);
    }

    #[tokio::test]
    async fn test_no_evidence_skips_model() {
        let llm = ChatClient::new(LlmConfig::default()).unwrap();
        let fused = ContextFusion::new().fuse("", "");

        let answer = generate_answer(&llm, &setup(None), &fused, "毛泽东的出生地", "zh")
            .await
            .unwrap();
        assert_eq!(answer, prompt::NO_EVIDENCE_ANSWER_ZH);
    }

    #[tokio::test]
    async fn test_answer_from_model() {
        let llm = ChatClient::new(LlmConfig::default()).unwrap();
        let fused = ContextFusion::new().fuse("毛泽东，出生地为湘潭。", "");

        let answer = generate_answer(&llm, &setup(Some("{context}")), &fused, "毛泽东的出生地", "zh")
            .await
            .unwrap();
        assert!(answer.starts_with("[Mock response"));
        assert!(answer.ends_with("毛泽东的出生地"));
    }

    #[test]
    fn test_rewriter_needs_model_key() {
        let mut config = AppConfig::default();
        config.retrieval.query_rewrite = true;
        let llm = Arc::new(ChatClient::new(config.llm.clone()).unwrap());
        assert!(build_rewriter(&config, llm).is_none());

        config.llm.api_key = "sk-test".to_string();
        let llm = Arc::new(ChatClient::new(config.llm.clone()).unwrap());
        assert!(build_rewriter(&config, llm.clone()).is_some());

        config.retrieval.query_rewrite = false;
        assert!(build_rewriter(&config, llm).is_none());
    }

    #[test]
    fn test_render_answer() {
        let rendered = render_answer("湘潭。", "<references title=\"References\" references=\"[]\"/>");
        assert_eq!(rendered, "湘潭。\n\n<references title=\"References\" references=\"[]\"/>");
    }
}
