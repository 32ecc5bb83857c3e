//! Knowledge chat handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::knowledge::{build_retriever, generate_answer, render_answer, setup_turn};
use crate::AppState;
use hybridqa_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
};
use hybridqa_search::ReferenceEntry;

/// Knowledge chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    /// Knowledge space name or id
    #[validate(length(min = 1, max = 200))]
    pub space: String,

    #[validate(length(min = 1, max = 2000))]
    pub question: String,
}

/// Knowledge chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Model answer followed by the reference block
    pub answer: String,
    pub context: String,
    pub graph_context: String,
    pub document_context: String,
    pub fusion_rule: String,
    pub references: Vec<ReferenceEntry>,
    pub reference_block: String,
    pub processing_time_ms: u64,
}

/// Answer one question against a knowledge space
pub async fn knowledge_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let start = Instant::now();
    let request_metrics = RequestMetrics::start("POST", "/v1/chat/knowledge");

    let outcome = answer_turn(&state, request).await;
    let status = match &outcome {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    request_metrics.finish(status);

    let mut response = outcome?;
    response.processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        fusion_rule = %response.fusion_rule,
        references = response.references.len(),
        latency_ms = response.processing_time_ms,
        "Knowledge chat completed"
    );

    Ok(Json(response))
}

async fn answer_turn(state: &AppState, request: ChatRequest) -> Result<ChatResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation {
            message: "Question must not be blank".to_string(),
            field: Some("question".to_string()),
        });
    }

    let setup = setup_turn(state, &request.space).await?;
    let retriever = build_retriever(state, &setup);
    let turn = state.pipeline.run(&retriever, &setup.request(question)).await?;

    let answer = generate_answer(
        &state.llm,
        &setup,
        &turn.fused,
        question,
        &state.config.retrieval.language,
    )
    .await?;

    Ok(ChatResponse {
        answer: render_answer(&answer, &turn.reference_block),
        context: turn.fused.context,
        graph_context: turn.fused.graph_context,
        document_context: turn.fused.document_context,
        fusion_rule: turn.fused.rule.as_str().to_string(),
        references: turn.references,
        reference_block: turn.reference_block,
        processing_time_ms: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        let valid: ChatRequest =
            serde_json::from_str(r#"{"space": "history", "question": "毛泽东的出生地"}"#).unwrap();
        assert!(valid.validate().is_ok());

        let empty = ChatRequest {
            space: "history".to_string(),
            question: String::new(),
        };
        assert!(empty.validate().is_err());

        let too_long = ChatRequest {
            space: "history".to_string(),
            question: "问".repeat(2001),
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_request_requires_space() {
        let parsed = serde_json::from_str::<ChatRequest>(r#"{"question": "q"}"#);
        assert!(parsed.is_err());
    }
}
