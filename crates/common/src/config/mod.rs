//! Configuration management for HybridQA services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Graph store configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Reranker service configuration
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Chat model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Disable to skip the graph path entirely
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base URL of the Neo4j HTTP endpoint
    #[serde(default = "default_graph_url")]
    pub url: String,

    #[serde(default = "default_graph_user")]
    pub user: String,

    pub password: Option<String>,

    #[serde(default = "default_graph_database")]
    pub database: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,

    /// Minimum seconds between reconnection probes while the store is down
    #[serde(default = "default_graph_reconnect_interval")]
    pub reconnect_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Default number of chunks to retrieve
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,

    /// Default similarity floor
    #[serde(default)]
    pub similarity_score_threshold: f32,

    /// Chunk count for spaces backed by a knowledge graph store
    #[serde(default = "default_kg_chunk_search_top_k")]
    pub kg_chunk_search_top_k: usize,

    /// Overrides `similarity_top_k` for knowledge chat
    pub knowledge_retrieve_top_k: Option<usize>,

    /// Overrides `rerank_top_k` for knowledge chat
    pub knowledge_retrieve_rerank_top_k: Option<usize>,

    /// Chunks kept after reranking
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,

    /// Minimum candidate pool handed to the reranker
    #[serde(default = "default_rerank_candidate_floor")]
    pub rerank_candidate_floor: usize,

    /// Enable LLM query rewriting
    #[serde(default)]
    pub query_rewrite: bool,

    /// Number of alternative queries requested from the rewriter
    #[serde(default = "default_rewrite_count")]
    pub rewrite_count: usize,

    /// Result limit for generated graph queries
    #[serde(default = "default_graph_result_limit")]
    pub graph_result_limit: usize,

    /// Upper bound on concurrently running retrieval tasks
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Prompt language: zh or en
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankConfig {
    /// Rerank endpoint; reranking is disabled when unset
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    #[serde(default = "default_rerank_model")]
    pub model: String,

    #[serde(default = "default_rerank_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key (empty key means mock responses)
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_timeout() -> u64 { 30 }
fn default_graph_url() -> String { "http://localhost:7474".to_string() }
fn default_graph_user() -> String { "neo4j".to_string() }
fn default_graph_database() -> String { "neo4j".to_string() }
fn default_graph_timeout() -> u64 { 10 }
fn default_graph_reconnect_interval() -> u64 { 30 }
fn default_similarity_top_k() -> usize { 10 }
fn default_kg_chunk_search_top_k() -> usize { 5 }
fn default_rerank_top_k() -> usize { 3 }
fn default_rerank_candidate_floor() -> usize { 20 }
fn default_rewrite_count() -> usize { 2 }
fn default_graph_result_limit() -> usize { 5 }
fn default_max_concurrency() -> usize { 2 }
fn default_language() -> String { "zh".to_string() }
fn default_rerank_model() -> String { "bge-reranker-base".to_string() }
fn default_rerank_timeout() -> u64 { 15 }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_max_tokens() -> usize { 1024 }
fn default_llm_temperature() -> f32 { 0.3 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "hybridqa".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            url: default_graph_url(),
            user: default_graph_user(),
            password: None,
            database: default_graph_database(),
            timeout_secs: default_graph_timeout(),
            reconnect_interval_secs: default_graph_reconnect_interval(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: default_similarity_top_k(),
            similarity_score_threshold: 0.0,
            kg_chunk_search_top_k: default_kg_chunk_search_top_k(),
            knowledge_retrieve_top_k: None,
            knowledge_retrieve_rerank_top_k: None,
            rerank_top_k: default_rerank_top_k(),
            rerank_candidate_floor: default_rerank_candidate_floor(),
            query_rewrite: false,
            rewrite_count: default_rewrite_count(),
            graph_result_limit: default_graph_result_limit(),
            max_concurrency: default_max_concurrency(),
            language: default_language(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: default_rerank_model(),
            timeout_secs: default_rerank_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl RetrievalConfig {
    /// Rerank cut-off, honouring the knowledge-chat override
    pub fn effective_rerank_top_k(&self) -> usize {
        self.knowledge_retrieve_rerank_top_k
            .filter(|k| *k > 0)
            .unwrap_or(self.rerank_top_k)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__GRAPH__URL=http://neo4j:7474
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/hybridqa".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig::default(),
            graph: GraphConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            llm: LlmConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
