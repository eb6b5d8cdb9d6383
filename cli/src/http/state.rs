//! HTTP服务器状态管理

use bankbot_core::api::{AppConfig, ChatEngine, Services};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// 应用状态（在所有handlers间共享）
#[derive(Clone)]
pub struct AppState {
    pub engine: ChatEngine,
    pub services: Arc<Services>,
    pub config: Arc<AppConfig>,
    pub stats: Arc<RwLock<ServerStats>>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        engine: ChatEngine,
        services: Services,
        config: AppConfig,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            engine,
            services: Arc::new(services),
            config: Arc::new(config),
            stats: Arc::new(RwLock::new(ServerStats::new())),
            shutdown_tx,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.config.app_name
    }

    pub fn record_request(&self, endpoint: &str) {
        if let Ok(mut stats) = self.stats.write() {
            stats.increment_request(endpoint);
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.increment_error();
        }
    }

    /// (运行秒数, 请求总数)
    pub fn snapshot(&self) -> (f64, u64) {
        self.stats
            .read()
            .map(|s| (s.uptime_seconds(), s.requests_total))
            .unwrap_or_default()
    }
}

/// 服务器统计信息
pub struct ServerStats {
    pub requests_total: u64,
    pub requests_by_endpoint: HashMap<String, u64>,
    pub errors_total: u64,
    pub start_time: DateTime<Local>,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            requests_total: 0,
            requests_by_endpoint: HashMap::new(),
            errors_total: 0,
            start_time: Local::now(),
        }
    }

    pub fn increment_request(&mut self, endpoint: &str) {
        self.requests_total += 1;
        *self
            .requests_by_endpoint
            .entry(endpoint.to_string())
            .or_insert(0) += 1;
    }

    pub fn increment_error(&mut self) {
        self.errors_total += 1;
    }

    pub fn uptime_seconds(&self) -> f64 {
        let now = Local::now();
        (now - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_request_by_endpoint() {
        let mut stats = ServerStats::new();
        stats.increment_request("/api/chat");
        stats.increment_request("/api/chat");
        stats.increment_request("/api/health");
        stats.increment_error();

        assert_eq!(stats.requests_total, 3);
        assert_eq!(stats.requests_by_endpoint.get("/api/chat"), Some(&2));
        assert_eq!(stats.requests_by_endpoint.get("/api/health"), Some(&1));
        assert_eq!(stats.errors_total, 1);
        assert!(stats.uptime_seconds() < 1.0);
    }
}
