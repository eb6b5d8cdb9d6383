//! 状态类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 会话状态（字符串键 -> 任意 JSON 值）
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// 会话复合主键 (app_name, user_id, session_id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// 是否属于 (app, user) 范围
    pub fn in_scope(&self, app_name: &str, user_id: &str) -> bool {
        self.app_name == app_name && self.user_id == user_id
    }

    pub fn not_found(&self) -> crate::error::SessionError {
        crate::error::SessionError::NotFound {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
        }
    }

    pub fn conflict(&self) -> crate::error::SessionError {
        crate::error::SessionError::Conflict {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// 追加事件的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendOutcome {
    /// 已应用到会话状态
    Applied,
    /// invocation_id 已存在，忽略
    Duplicate,
}

/// 状态事件（广播给观察者，仅用于日志与监控）
#[derive(Debug, Clone, Serialize)]
pub enum StateEvent {
    /// 服务启动
    ServiceStarted { timestamp: DateTime<Utc> },
    /// 会话创建
    SessionCreated {
        key: SessionKey,
        timestamp: DateTime<Utc>,
    },
    /// 会话状态更新
    StateUpdated {
        key: SessionKey,
        invocation_id: String,
        author: String,
        keys: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    /// 状态更新失败
    StateUpdateFailed {
        key: SessionKey,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// 会话删除
    SessionDeleted {
        key: SessionKey,
        timestamp: DateTime<Utc>,
    },
    /// 会话过期或超出配额被淘汰
    SessionEvicted {
        key: SessionKey,
        reason: EvictionReason,
        timestamp: DateTime<Utc>,
    },
    /// 持久化镜像写入失败
    MirrorWriteFailed {
        session_id: String,
        operation: &'static str,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// 会话归档到长期记忆
    SessionArchived {
        key: SessionKey,
        timestamp: DateTime<Utc>,
    },
    /// 长期记忆操作失败
    MemoryIndexFailed {
        key: SessionKey,
        operation: &'static str,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// 服务关闭
    ServiceShutdown { timestamp: DateTime<Utc> },
}

/// 淘汰原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    /// 超过空闲时间
    Expired,
    /// 超过单用户会话上限
    UserLimit,
}

impl StateEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ServiceStarted { timestamp }
            | Self::SessionCreated { timestamp, .. }
            | Self::StateUpdated { timestamp, .. }
            | Self::StateUpdateFailed { timestamp, .. }
            | Self::SessionDeleted { timestamp, .. }
            | Self::SessionEvicted { timestamp, .. }
            | Self::MirrorWriteFailed { timestamp, .. }
            | Self::SessionArchived { timestamp, .. }
            | Self::MemoryIndexFailed { timestamp, .. }
            | Self::ServiceShutdown { timestamp } => *timestamp,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionCreated { key, .. }
            | Self::StateUpdated { key, .. }
            | Self::StateUpdateFailed { key, .. }
            | Self::SessionDeleted { key, .. }
            | Self::SessionEvicted { key, .. }
            | Self::SessionArchived { key, .. }
            | Self::MemoryIndexFailed { key, .. } => Some(&key.session_id),
            Self::MirrorWriteFailed { session_id, .. } => Some(session_id),
            Self::ServiceStarted { .. } | Self::ServiceShutdown { .. } => None,
        }
    }
}

/// 会话统计
#[derive(Debug, Default, Clone, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub created_total: u64,
    pub deleted_total: u64,
    pub evicted_total: u64,
    pub updates_total: u64,
    pub update_failures_total: u64,
    pub mirror_failures_total: u64,
    pub archived_total: u64,
}
