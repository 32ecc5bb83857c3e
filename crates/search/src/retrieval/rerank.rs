//! Cross-encoder reranking over an HTTP rerank API
//!
//! Speaks the common `{model, query, documents, top_n}` →
//! `{results: [{index, relevance_score}]}` protocol served by bge/jina style
//! rerank endpoints.

use super::{Reranker, ScoredChunk};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use hybridqa_common::config::RerankConfig;
use hybridqa_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

/// Reranker client
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl HttpReranker {
    /// Build from configuration; `None` when no endpoint is configured
    pub fn from_config(config: &RerankConfig) -> Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.clone().filter(|e| !e.trim().is_empty()) else {
            return Ok(None);
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Some(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout,
        }))
    }

    async fn send(&self, query: &str, documents: &[&str], top_n: usize) -> Result<Vec<RerankResult>> {
        let request = RerankRequest {
            model: &self.model,
            query,
            documents: documents.to_vec(),
            top_n,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| AppError::RerankError {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RerankError {
                message: format!("API error {}: {}", status.as_u16(), body),
            });
        }

        let parsed: RerankResponse = response.json().await.map_err(|e| AppError::RerankError {
            message: format!("Failed to parse response: {}", e),
        })?;

        Ok(parsed.results)
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    #[instrument(skip(self, query, candidates), fields(count = candidates.len()))]
    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, top_k: usize) -> Result<Vec<ScoredChunk>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        let top_n = top_k.min(candidates.len());

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.timeout),
            ..ExponentialBackoff::default()
        };

        let outcome = retry(backoff, || async {
            self.send(query, &documents, top_n).await.map_err(|e| {
                let rejected = matches!(&e, AppError::RerankError { message } if message.starts_with("API error 4"));
                if rejected {
                    backoff::Error::permanent(e)
                } else {
                    warn!(error = %e, "Rerank request failed, retrying");
                    backoff::Error::transient(e)
                }
            })
        })
        .await;

        hybridqa_common::metrics::record_rerank(&self.model, outcome.is_ok());
        let results = outcome?;

        let reranked = apply_scores(candidates, results, top_k);
        debug!(kept = reranked.len(), "Candidates reranked");
        Ok(reranked)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Reorder candidates by relevance, replacing similarity with the rerank score
fn apply_scores(candidates: Vec<ScoredChunk>, mut results: Vec<RerankResult>, top_k: usize) -> Vec<ScoredChunk> {
    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut slots: Vec<Option<ScoredChunk>> = candidates.into_iter().map(Some).collect();
    results
        .into_iter()
        .filter_map(|r| {
            let mut chunk = slots.get_mut(r.index)?.take()?;
            chunk.score = r.relevance_score;
            Some(chunk)
        })
        .take(top_k)
        .collect()
}
