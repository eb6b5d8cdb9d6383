//! HTTP服务器生命周期管理

use super::{
    middleware::{create_middleware_stack, request_logger},
    routes::create_router,
    AppState,
};
use crate::commands::cli::ServeArgs;
use axum::middleware;
use bankbot_core::api::{AppContext, CliError, SessionManager, StateEvent};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

const STATE_FILE: &str = "bankbot.state";

/// HTTP服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    /// CLI 参数优先，配置文件作为默认值
    pub fn resolve(args: &ServeArgs, ctx: &AppContext) -> Self {
        let http = &ctx.cfg().http_server;
        Self {
            host: args.host.clone().unwrap_or_else(|| http.host.clone()),
            port: args.port.unwrap_or(http.port),
            allowed_origins: http.allowed_origins.clone(),
            request_timeout_secs: http.request_timeout_secs,
        }
    }
}

/// 获取服务器状态文件目录
fn get_servers_dir() -> Result<PathBuf, CliError> {
    let home = dirs::home_dir()
        .ok_or_else(|| CliError::Command("Cannot find home directory".to_string()))?;
    let servers_dir = home.join(".bankbot").join("servers");
    fs::create_dir_all(&servers_dir)
        .map_err(|e| CliError::Command(format!("Failed to create servers directory: {e}")))?;
    Ok(servers_dir)
}

/// 写入服务器状态文件
fn write_state_file(config: &ServerConfig) -> Result<PathBuf, CliError> {
    let state_file = get_servers_dir()?.join(STATE_FILE);

    let state = serde_json::json!({
        "port": config.port,
        "pid": std::process::id(),
        "url": format!("http://{}:{}", config.host, config.port),
        "started_at": chrono::Local::now().to_rfc3339()
    });
    let rendered = serde_json::to_string_pretty(&state)
        .map_err(|e| CliError::Command(format!("Failed to render state file: {e}")))?;

    fs::write(&state_file, rendered)
        .map_err(|e| CliError::Command(format!("Failed to write state file: {e}")))?;

    info!("State file written to: {}", state_file.display());
    Ok(state_file)
}

/// 处理 serve 命令
pub async fn handle_serve(args: ServeArgs, ctx: &AppContext) -> Result<(), CliError> {
    let config = ServerConfig::resolve(&args, ctx);

    // 构建 Services 并完成自检
    let (services, engine) = ctx.start().await?;
    let manager = engine.manager().clone();
    spawn_event_logger(&manager);

    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(engine, services, ctx.cfg().clone(), shutdown_tx);

    let state_file = match write_state_file(&config) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("{e}");
            None
        }
    };

    let result = start_server(config, state)
        .await
        .map_err(|e| CliError::Server(e.to_string()));

    manager.shutdown().await;

    if let Some(path) = state_file {
        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to remove state file: {}", e);
        } else {
            info!("State file removed: {}", path.display());
        }
    }

    result
}

/// 把会话生命周期事件转发到日志
fn spawn_event_logger(manager: &SessionManager) {
    let mut event_rx = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match event {
                StateEvent::SessionCreated { key, .. } => {
                    tracing::debug!("Session created: {}", key);
                }
                StateEvent::SessionEvicted { key, reason, .. } => {
                    info!("Session {} evicted ({:?})", key, reason);
                }
                StateEvent::StateUpdateFailed { key, error, .. } => {
                    warn!("Session {} update failed: {}", key, error);
                }
                StateEvent::MirrorWriteFailed {
                    session_id,
                    operation,
                    error,
                    ..
                } => {
                    warn!("Mirror {} failed for {}: {}", operation, session_id, error);
                }
                StateEvent::MemoryIndexFailed {
                    key,
                    operation,
                    error,
                    ..
                } => {
                    warn!("Memory {} failed for {}: {}", operation, key, error);
                }
                StateEvent::ServiceShutdown { .. } => break,
                _ => {}
            }
        }
    });
}

/// 启动HTTP服务器，直到收到关闭信号
pub async fn start_server(
    config: ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = create_router(state.clone());

    let app = router
        .layer(middleware::from_fn(request_logger))
        .layer(create_middleware_stack(
            &config.allowed_origins,
            config.request_timeout_secs,
        ));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);

    let mut shutdown_rx = state.shutdown_tx.subscribe();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal from API");
                }
                _ = wait_for_sigterm() => {
                    info!("Received SIGTERM signal");
                }
            }

            info!("Starting graceful shutdown...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// 等待 SIGTERM 信号（Unix系统）
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {e}");
            std::future::pending::<()>().await
        }
    }
}

/// Windows 系统不支持 SIGTERM
#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
