//! HTTP路由handlers

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use bankbot_core::api::{SessionError, SessionKey, TurnInput};
use chrono::Local;
use std::collections::BTreeMap;

use crate::http::{
    auth::CurrentCustomer,
    models::*,
    state::AppState,
    validation::{validate_id, validate_message},
};

const MAX_SEARCH_LIMIT: usize = 20;

/// 创建所有路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route(
            "/api/sessions/:session_id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/:session_id/archive", post(archive_session_handler))
        .route("/api/memory/search", post(memory_search_handler))
        .route("/api/health", get(health_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(state)
}

fn session_key(state: &AppState, customer: &str, session_id: &str) -> SessionKey {
    SessionKey::new(state.app_name(), customer, session_id)
}

/// POST /api/chat - 处理一轮对话
async fn chat_handler(
    State(state): State<AppState>,
    CurrentCustomer(customer): CurrentCustomer,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, HttpServerError> {
    state.record_request("/api/chat");

    validate_message(&req.message)?;
    let customer_id = req.customer_id.unwrap_or(customer);
    validate_id("customer_id", &customer_id)?;

    let mut input = TurnInput::new(state.app_name(), customer_id, req.message);
    if let Some(session_id) = req.session_id.filter(|s| !s.trim().is_empty()) {
        validate_id("session_id", &session_id)?;
        input = input.with_session(session_id);
    }
    if let Some(agent) = req.preferred_agent {
        input = input.with_agent(agent);
    }
    if let Some(context) = req.context {
        input = input.with_context(context);
    }

    match state.engine.handle_turn(input).await {
        Ok(out) => Ok(Json(ChatResponse {
            response: out.response,
            session_id: out.session_id,
            agent_name: out.agent_name,
            session_state: out.session_state,
            suggestions: out.suggestions,
        })),
        Err(e) => {
            state.record_error();
            Err(match e {
                SessionError::Invalid(msg) => HttpServerError::InvalidRequest(msg),
                other => HttpServerError::Internal(format!(
                    "Error processing chat request: {other}"
                )),
            })
        }
    }
}

/// GET /api/sessions - 当前客户的会话列表
async fn list_sessions_handler(
    State(state): State<AppState>,
    CurrentCustomer(customer): CurrentCustomer,
) -> Json<SessionListResponse> {
    state.record_request("/api/sessions");

    let sessions = state
        .engine
        .manager()
        .list_sessions(state.app_name(), &customer)
        .await;
    Json(SessionListResponse {
        customer_id: customer,
        sessions,
    })
}

/// GET /api/sessions/:session_id - 会话详情
async fn get_session_handler(
    State(state): State<AppState>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(session_id): Path<String>,
) -> Result<Json<bankbot_core::api::SessionInfo>, HttpServerError> {
    state.record_request("/api/sessions/:session_id");
    validate_id("session_id", &session_id)?;

    let key = session_key(&state, &customer, &session_id);
    state
        .engine
        .session_info(&key)
        .await
        .map(Json)
        .ok_or_else(|| HttpServerError::NotFound("Session not found".to_string()))
}

/// DELETE /api/sessions/:session_id - 删除会话（不存在时 deleted=false）
async fn delete_session_handler(
    State(state): State<AppState>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, HttpServerError> {
    state.record_request("/api/sessions/:session_id");
    validate_id("session_id", &session_id)?;

    let key = session_key(&state, &customer, &session_id);
    let deleted = state.engine.manager().delete_session(&key).await;
    Ok(Json(DeleteSessionResponse {
        session_id,
        deleted,
    }))
}

/// POST /api/sessions/:session_id/archive - 归档到长期记忆
async fn archive_session_handler(
    State(state): State<AppState>,
    CurrentCustomer(customer): CurrentCustomer,
    Path(session_id): Path<String>,
) -> Result<Json<ArchiveSessionResponse>, HttpServerError> {
    state.record_request("/api/sessions/:session_id/archive");
    validate_id("session_id", &session_id)?;

    let key = session_key(&state, &customer, &session_id);
    if state.engine.manager().get_session(&key).await.is_none() {
        return Err(HttpServerError::NotFound("Session not found".to_string()));
    }

    let archived = state.engine.archive_session(&key).await;
    if !archived {
        state.record_error();
    }
    Ok(Json(ArchiveSessionResponse {
        session_id,
        archived,
    }))
}

/// POST /api/memory/search - 检索当前客户的长期记忆
async fn memory_search_handler(
    State(state): State<AppState>,
    CurrentCustomer(customer): CurrentCustomer,
    Json(req): Json<MemorySearchRequest>,
) -> Result<Json<MemorySearchResponse>, HttpServerError> {
    state.record_request("/api/memory/search");

    if req.query.trim().is_empty() {
        return Err(HttpServerError::InvalidRequest(
            "Query cannot be empty".to_string(),
        ));
    }
    let limit = req.limit.clamp(1, MAX_SEARCH_LIMIT);

    let matches = state
        .engine
        .manager()
        .search_memory(state.app_name(), &customer, &req.query, limit)
        .await;
    Ok(Json(MemorySearchResponse {
        success: true,
        matches,
    }))
}

/// GET /api/health - 健康检查
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    state.record_request("/api/health");

    let manager = state.engine.manager();
    let mut services = BTreeMap::new();

    let session_ok = match manager.self_check("health_check").await {
        Ok(()) => {
            services.insert("session_service".to_string(), "healthy".to_string());
            true
        }
        Err(e) => {
            services.insert("session_service".to_string(), format!("unhealthy: {e}"));
            false
        }
    };

    let memory_status = match manager.memory() {
        Some(index) => format!("enabled ({})", index.name()),
        None => "disabled".to_string(),
    };
    services.insert("memory_index".to_string(), memory_status);
    services.insert("agent".to_string(), state.services.agent.name().to_string());

    let database = manager.mirror_health().await;
    let database_ok = database.is_healthy() || database.status == "disabled";
    let (uptime_seconds, requests_handled) = state.snapshot();

    Json(HealthResponse {
        status: if session_ok && database_ok {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: Local::now().to_rfc3339(),
        uptime_seconds,
        requests_handled,
        database,
        services,
    })
}

/// POST /api/shutdown - 触发优雅关闭
async fn shutdown_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let _ = state.shutdown_tx.send(());

    Json(serde_json::json!({
        "success": true,
        "message": "Shutdown signal sent"
    }))
}
