//! HTTP API数据模型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bankbot_core::api::{MemoryMatch, MirrorHealth, StateMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============= Chat =============

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// 缺省为已认证的客户
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub preferred_agent: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub agent_name: String,
    pub session_state: StateMap,
    pub suggestions: Vec<String>,
}

// ============= Sessions =============

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub customer_id: String,
    pub sessions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteSessionResponse {
    pub session_id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ArchiveSessionResponse {
    pub session_id: String,
    pub archived: bool,
}

// ============= Memory =============

#[derive(Debug, Deserialize)]
pub struct MemorySearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct MemorySearchResponse {
    pub success: bool,
    pub matches: Vec<MemoryMatch>,
}

// ============= Health =============

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub requests_handled: u64,
    pub database: MirrorHealth,
    pub services: BTreeMap<String, String>,
}

// ============= Error Handling =============

#[derive(Debug)]
pub enum HttpServerError {
    InvalidRequest(String),
    NotFound(String),
    Unauthorized(String),
    Internal(String),
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
            "error_code": error_code,
        });

        (status, Json(body)).into_response()
    }
}
