use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AppConfig;
use crate::mirror::ChatMessageRecord;
use crate::state::StateMap;

/// 一轮入站对话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub preferred_agent: Option<String>,
    /// 新建会话时拷贝进状态的请求上下文
    #[serde(default)]
    pub context: Option<Value>,
}

impl TurnInput {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: None,
            message: message.into(),
            preferred_agent: None,
            context: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.preferred_agent = Some(agent.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutput {
    pub response: String,
    pub session_id: String,
    pub agent_name: String,
    pub session_state: StateMap,
    pub suggestions: Vec<String>,
    /// agent 失败并返回兜底文本时为 true
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub customer_id: String,
    pub created_at: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub state: StateMap,
    pub messages: Vec<ChatMessageRecord>,
    pub events_count: usize,
    /// 由专职 agent（非 coordinator）产生的回复数
    pub operations_count: usize,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub app_name: String,
    pub agent_timeout_ms: u64,
    pub memory_enabled: bool,
    pub recall_limit: usize,
    pub recall_max_chars: usize,
    pub preferred_language: String,
    /// 以 debug 级别记录消息正文
    pub chat_logging: bool,
}

impl EngineConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            app_name: cfg.app_name.clone(),
            agent_timeout_ms: cfg.agent.timeout_ms,
            memory_enabled: cfg.memory.enabled,
            recall_limit: cfg.memory.recall_limit,
            recall_max_chars: 600,
            preferred_language: cfg.session.preferred_language.clone(),
            chat_logging: cfg.logging.chat_logging,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}
