use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub mirror: MirrorConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_app_name() -> String {
    "tbc_bank_chatbot".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            logging: LoggingConfig::default(),
            http_server: HttpServerConfig::default(),
            session: SessionConfig::default(),
            memory: MemoryConfig::default(),
            mirror: MirrorConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// 为 true 时输出到 stderr
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// 为 true 时写入 `directory` 下的日志文件（未设置时用系统临时目录）
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter 字符串，例如 "info" 或 "bankbot_core=debug"
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// 日志目录；为空或未设置时使用系统临时目录
    #[serde(default)]
    pub directory: Option<String>,

    /// 以 info 级别记录对话消息正文（截断）
    #[serde(default = "default_chat_logging")]
    pub chat_logging: bool,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn default_chat_logging() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
            chat_logging: default_chat_logging(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 认证桩把 bearer token 解析成的客户
    #[serde(default = "default_customer_id")]
    pub default_customer_id: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://localhost:8080".to_string(),
    ]
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_customer_id() -> String {
    "CUST001".to_string()
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            request_timeout_secs: default_request_timeout_secs(),
            default_customer_id: default_customer_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 空闲超过该时长的会话由清理任务淘汰
    #[serde(default = "default_session_timeout_hours")]
    pub session_timeout_hours: u64,

    /// 用户会话数超过上限时，淘汰最久未更新的会话
    #[serde(default = "default_max_sessions_per_user")]
    pub max_sessions_per_user: usize,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// 镜像与记忆索引副作用的超时上限
    #[serde(default = "default_side_effect_timeout_ms")]
    pub side_effect_timeout_ms: u64,

    #[serde(default = "default_preferred_language")]
    pub preferred_language: String,

    #[serde(default = "default_broadcast_capacity")]
    pub event_channel_capacity: usize,
}

fn default_session_timeout_hours() -> u64 {
    24
}

fn default_max_sessions_per_user() -> usize {
    10
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_side_effect_timeout_ms() -> u64 {
    5_000
}

fn default_preferred_language() -> String {
    "en".to_string()
}

fn default_broadcast_capacity() -> usize {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_hours: default_session_timeout_hours(),
            max_sessions_per_user: default_max_sessions_per_user(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            side_effect_timeout_ms: default_side_effect_timeout_ms(),
            preferred_language: default_preferred_language(),
            event_channel_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub provider: MemoryProvider,

    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// 每轮召回进 agent 请求的条目数（0 关闭召回）
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
}

fn default_memory_enabled() -> bool {
    true
}

fn default_retention_days() -> u64 {
    365
}

fn default_recall_limit() -> usize {
    3
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            provider: MemoryProvider::default(),
            retention_days: default_retention_days(),
            recall_limit: default_recall_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum MemoryProvider {
    InMemory,
    Service(MemoryServiceConfig),
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::InMemory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryServiceConfig {
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_memory_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_memory_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default = "default_mirror_enabled")]
    pub enabled: bool,

    /// SQLite URL 或路径，例如 "sqlite://~/.bankbot/bankbot.db"
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_mirror_enabled() -> bool {
    true
}

fn default_database_url() -> String {
    "sqlite://./bankbot.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: default_mirror_enabled(),
            database_url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// agent 执行服务的基础 URL；为空时不发起远程调用
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_agent_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_model")]
    pub model: String,
}

fn default_agent_timeout_ms() -> u64 {
    30_000
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_ms: default_agent_timeout_ms(),
            model: default_model(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.app_name, "tbc_bank_chatbot");
        assert_eq!(cfg.session.max_sessions_per_user, 10);
        assert_eq!(cfg.session.session_timeout_hours, 24);
        assert_eq!(cfg.memory.retention_days, 365);
        assert!(matches!(cfg.memory.provider, MemoryProvider::InMemory));
        assert_eq!(cfg.http_server.port, 8000);
    }

    #[test]
    fn test_memory_service_provider_parses() {
        let raw = r#"
            [memory.provider]
            provider = "service"
            base_url = "http://localhost:9000"
            api_key = "k"
        "#;
        let cfg: AppConfig = toml::from_str(raw).unwrap();
        match cfg.memory.provider {
            MemoryProvider::Service(svc) => {
                assert_eq!(svc.base_url, "http://localhost:9000");
                assert_eq!(svc.api_key, "k");
                assert_eq!(svc.timeout_ms, 10_000);
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }
}
