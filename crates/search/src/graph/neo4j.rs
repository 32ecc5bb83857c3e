//! Neo4j graph store over the HTTP transactional API
//!
//! Every query runs in its own auto-commit transaction
//! (`POST /db/{database}/tx/commit`) with `row` and `graph` result contents,
//! so typed nodes and relationships can be rebuilt per column.

use super::{GraphElement, GraphQuery, GraphRecord, GraphStore};
use async_trait::async_trait;
use hybridqa_common::config::GraphConfig;
use hybridqa_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

const SOURCE_NAME: &str = "graph store";

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: Vec<TxStatement<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TxStatement<'a> {
    statement: &'a str,
    parameters: &'a Map<String, Value>,
    result_data_contents: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<Value>,
    #[serde(default)]
    meta: Vec<Value>,
    #[serde(default)]
    graph: TxGraph,
}

#[derive(Debug, Default, Deserialize)]
struct TxGraph {
    #[serde(default)]
    nodes: Vec<TxNode>,
    #[serde(default)]
    relationships: Vec<TxRelationship>,
}

#[derive(Debug, Deserialize)]
struct TxNode {
    id: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TxRelationship {
    id: String,
    #[serde(rename = "type")]
    rel_type: String,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Graph store client for Neo4j
pub struct Neo4jStore {
    client: reqwest::Client,
    commit_url: String,
    user: String,
    password: Option<String>,
    available: AtomicBool,
    reconnect_interval: Duration,
    /// Milliseconds since `created` at the start of the last probe
    last_probe_ms: AtomicU64,
    created: Instant,
}

impl Neo4jStore {
    /// Build the client and probe the server once
    ///
    /// An unreachable server is not an error here: the store starts out
    /// unavailable and turns retry it at most once per
    /// `reconnect_interval_secs` until it answers.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let store = Self {
            client,
            commit_url: format!(
                "{}/db/{}/tx/commit",
                config.url.trim_end_matches('/'),
                config.database
            ),
            user: config.user.clone(),
            password: config.password.clone(),
            available: AtomicBool::new(false),
            reconnect_interval: Duration::from_secs(config.reconnect_interval_secs),
            last_probe_ms: AtomicU64::new(0),
            created: Instant::now(),
        };

        let connected = store.probe().await;
        if connected {
            info!(url = %config.url, database = %config.database, "Graph store connected");
        } else {
            warn!(url = %config.url, "Graph store is not reachable, graph path disabled until it recovers");
        }

        Ok(store)
    }

    /// Run `RETURN 1` and refresh the availability flag
    pub async fn probe(&self) -> bool {
        self.last_probe_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        let query = GraphQuery {
            statement: "RETURN 1".to_string(),
            parameters: Map::new(),
            limit: 1,
            rule: None,
        };

        let ok = match self.commit(&query).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Graph store probe failed");
                false
            }
        };
        self.available.store(ok, Ordering::Relaxed);
        ok
    }

    fn elapsed_ms(&self) -> u64 {
        self.created.elapsed().as_millis() as u64
    }

    async fn commit(&self, query: &GraphQuery) -> Result<Vec<GraphRecord>> {
        let request = TxRequest {
            statements: vec![TxStatement {
                statement: &query.statement,
                parameters: &query.parameters,
                result_data_contents: ["row", "graph"],
            }],
        };

        let response = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.user, self.password.as_deref())
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::unavailable(SOURCE_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::unavailable(
                SOURCE_NAME,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        let body: TxResponse = response
            .json()
            .await
            .map_err(|e| AppError::unavailable(SOURCE_NAME, format!("Invalid response: {}", e)))?;

        parse_response(body)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    #[instrument(skip(self, query), fields(rule = ?query.rule))]
    async fn execute(&self, query: &GraphQuery) -> Result<Vec<GraphRecord>> {
        let start = Instant::now();
        info!(statement = %query.statement, "Executing graph query");

        let result = self.commit(query).await;
        match &result {
            Ok(records) => {
                self.available.store(true, Ordering::Relaxed);
                info!(
                    results = records.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Graph query succeeded"
                );
                if let Some(first) = records.first() {
                    let preview: String = format!("{:?}", first).chars().take(200).collect();
                    info!(preview = %preview, "Graph result preview");
                    debug!(records = ?records, "Complete graph result set");
                }
            }
            Err(e @ AppError::SourceUnavailable { .. }) => {
                self.available.store(false, Ordering::Relaxed);
                error!(error = %e, "Graph store unavailable");
            }
            Err(e) => error!(error = %e, "Graph query failed"),
        }

        result
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    async fn ensure_available(&self) -> bool {
        if self.is_available() {
            return true;
        }

        let now = self.elapsed_ms();
        let last = self.last_probe_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.reconnect_interval.as_millis() as u64 {
            return false;
        }
        // One concurrent turn claims the probe slot
        if self
            .last_probe_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return self.is_available();
        }

        let recovered = self.probe().await;
        if recovered {
            info!("Graph store reachable again");
        }
        recovered
    }
}

fn parse_response(body: TxResponse) -> Result<Vec<GraphRecord>> {
    if let Some(err) = body.errors.into_iter().next() {
        let message = format!("{}: {}", err.code, err.message);
        return Err(if err.code.starts_with("Neo.ClientError.Statement.") {
            AppError::MalformedQuery { message }
        } else {
            AppError::unavailable(SOURCE_NAME, message)
        });
    }

    let mut records = Vec::new();
    for result in body.results {
        for row in result.data {
            records.push(build_record(&result.columns, row));
        }
    }
    Ok(records)
}

fn build_record(columns: &[String], row: TxRow) -> GraphRecord {
    let nodes: HashMap<String, TxNode> =
        row.graph.nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
    let relationships: HashMap<String, TxRelationship> = row
        .graph
        .relationships
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();

    let fields = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = row.row.get(i).cloned().unwrap_or(Value::Null);
            let meta = row.meta.get(i).and_then(Value::as_object);

            let element = meta
                .and_then(|meta| {
                    let id = meta.get("id").map(id_text)?;
                    match meta.get("type").and_then(Value::as_str)? {
                        "node" => nodes.get(&id).map(|n| GraphElement::Node {
                            labels: n.labels.clone(),
                            properties: n.properties.clone(),
                        }),
                        "relationship" => relationships.get(&id).map(|r| GraphElement::Relationship {
                            rel_type: r.rel_type.clone(),
                            properties: r.properties.clone(),
                        }),
                        _ => None,
                    }
                })
                .unwrap_or(GraphElement::Value(value));

            (column.clone(), element)
        })
        .collect();

    GraphRecord::new(fields)
}

/// Meta ids are numbers, graph ids are strings
fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphQueryMapper, GraphResultNormalizer};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::{assert_err, assert_ok};

    const MAO_RESPONSE: &str = r#"{"results":[{"columns":["n"],"data":[{"row":[{}],"meta":[{"id":12,"type":"node"}],"graph":{"nodes":[{"id":"12","labels":["人物"],"properties":{"nodeName":"毛泽东","出生地":"湘潭"}}],"relationships":[]}}]}],"errors":[]}"#;

    /// Read one HTTP request, headers and body
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_string();
                let length = headers
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Local Neo4j stand-in answering every request with `body`
    async fn serve(listener: TcpListener, body: &'static str, requests: Arc<AtomicUsize>) {
        while let Ok((mut socket, _)) = listener.accept().await {
            requests.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    }

    /// A port nothing listens on yet
    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn local_config(port: u16, reconnect_interval_secs: u64) -> GraphConfig {
        GraphConfig {
            url: format!("http://127.0.0.1:{}", port),
            timeout_secs: 2,
            reconnect_interval_secs,
            ..GraphConfig::default()
        }
    }

    fn parse(value: Value) -> Result<Vec<GraphRecord>> {
        parse_response(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_parse_node_rows() {
        let records = parse(json!({
            "results": [{
                "columns": ["n"],
                "data": [{
                    "row": [{"nodeName": "毛泽东", "出生地": "湘潭"}],
                    "meta": [{"id": 12, "type": "node", "deleted": false}],
                    "graph": {
                        "nodes": [{
                            "id": "12",
                            "labels": ["人物"],
                            "properties": {"nodeName": "毛泽东", "出生地": "湘潭"}
                        }],
                        "relationships": []
                    }
                }]
            }],
            "errors": []
        }))
        .unwrap();

        assert_eq!(records.len(), 1);
        match &records[0].fields[0] {
            (column, GraphElement::Node { labels, properties }) => {
                assert_eq!(column, "n");
                assert_eq!(labels, &vec!["人物".to_string()]);
                assert_eq!(properties["出生地"], "湘潭");
            }
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn test_parse_mixed_columns() {
        let records = parse(json!({
            "results": [{
                "columns": ["name", "r", "m"],
                "data": [{
                    "row": ["曾国藩", {}, {"name": "湘军"}],
                    "meta": [null, {"id": 3, "type": "relationship"}, {"id": 7, "type": "node"}],
                    "graph": {
                        "nodes": [{"id": "7", "labels": ["组织"], "properties": {"name": "湘军"}}],
                        "relationships": [{
                            "id": "3", "type": "创建", "startNode": "1", "endNode": "7",
                            "properties": {}
                        }]
                    }
                }]
            }],
            "errors": []
        }))
        .unwrap();

        let fields = &records[0].fields;
        assert_eq!(fields[0].1, GraphElement::Value(json!("曾国藩")));
        assert_eq!(fields[1].1.primary_label(), Some("创建"));
        assert_eq!(fields[2].1.primary_label(), Some("组织"));
        assert_eq!(records[0].first_labeled().and_then(|e| e.primary_label()), Some("创建"));
    }

    #[test]
    fn test_syntax_error_is_malformed_query() {
        let err = assert_err!(parse(json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]
        })));

        assert!(matches!(err, AppError::MalformedQuery { .. }));
    }

    #[test]
    fn test_other_server_errors_are_unavailable() {
        let err = assert_err!(parse(json!({
            "errors": [{"code": "Neo.TransientError.General.DatabaseUnavailable", "message": "down"}]
        })));

        assert!(matches!(err, AppError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_store_starts_unavailable() {
        let config = GraphConfig {
            url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 1,
            ..GraphConfig::default()
        };

        let store = assert_ok!(Neo4jStore::connect(&config).await);
        assert!(!store.is_available());
        assert!(store.commit_url.ends_with("/db/neo4j/tx/commit"));
    }

    #[tokio::test]
    async fn test_store_recovers_on_next_turn() {
        let port = free_port().await;
        let store = assert_ok!(Neo4jStore::connect(&local_config(port, 0)).await);
        assert!(!store.is_available());

        let requests = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        tokio::spawn(serve(listener, MAO_RESPONSE, requests.clone()));

        assert!(store.ensure_available().await);
        assert!(store.is_available());

        let query = GraphQueryMapper::new().map("毛泽东的出生地", 5);
        let records = assert_ok!(store.execute(&query).await);
        assert_eq!(
            GraphResultNormalizer::new().normalize(&records),
            "毛泽东，出生地为湘潭。"
        );
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reconnect_attempts_are_throttled() {
        let port = free_port().await;
        let store = assert_ok!(Neo4jStore::connect(&local_config(port, 60)).await);

        let requests = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        tokio::spawn(serve(listener, MAO_RESPONSE, requests.clone()));

        assert!(!store.ensure_available().await);
        assert!(!store.ensure_available().await);
        assert_eq!(requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_repeated_node_column() {
        let records = parse(json!({
            "results": [{
                "columns": ["n", "m"],
                "data": [{
                    "row": [{"name": "湘军"}, {"name": "湘军"}],
                    "meta": [{"id": 7, "type": "node"}, {"id": 7, "type": "node"}],
                    "graph": {
                        "nodes": [{"id": "7", "labels": ["组织"], "properties": {"name": "湘军"}}],
                        "relationships": []
                    }
                }]
            }],
            "errors": []
        }))
        .unwrap();

        let fields = &records[0].fields;
        assert_eq!(fields[0].1.primary_label(), Some("组织"));
        assert_eq!(fields[1].1, fields[0].1);
    }
}
