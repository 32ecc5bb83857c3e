//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use std::time::Instant;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub graph: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up(latency_ms: u64) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn down(error: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    fn disabled() -> Self {
        Self {
            status: "disabled".to_string(),
            latency_ms: None,
            error: None,
        }
    }

    fn is_down(&self) -> bool {
        self.status == "down"
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: hybridqa_common::VERSION,
    })
}

/// Readiness probe - checks all dependencies
///
/// An unreachable graph store only degrades answers, so it is reported
/// but does not make the gateway unready.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let start = Instant::now();
    let database = match state.db.ping().await {
        Ok(_) => CheckResult::up(start.elapsed().as_millis() as u64),
        Err(e) => CheckResult::down(e.to_string()),
    };

    let graph = match &state.graph {
        Some(store) => {
            let start = Instant::now();
            if store.probe().await {
                CheckResult::up(start.elapsed().as_millis() as u64)
            } else {
                CheckResult::down("graph store unreachable")
            }
        }
        None => CheckResult::disabled(),
    };

    Json(ReadyResponse {
        status: readiness(&database).to_string(),
        checks: HealthChecks { database, graph },
    })
}

fn readiness(database: &CheckResult) -> &'static str {
    if database.is_down() {
        "not_ready"
    } else {
        "ready"
    }
}
